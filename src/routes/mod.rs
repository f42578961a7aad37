//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router carries the drawing websocket, the shape listing used by
//! late joiners, and a health probe. CORS is permissive; the websocket does
//! its own in-band authentication.

pub mod auth;
pub mod shapes;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/api/rooms/{room_id}/shapes", get(shapes::list_shapes))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
