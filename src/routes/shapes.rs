//! Shape routes — read path for late joiners.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use tracing::error;

use crate::routes::auth::AuthUser;
use crate::shape::Shape;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ShapesResponse {
    pub shapes: Vec<Shape>,
}

/// `GET /api/rooms/{room_id}/shapes` — every persisted shape in the room, in
/// persistence order.
pub async fn list_shapes(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<ShapesResponse>, StatusCode> {
    let records = state.store.list_shapes(&room_id).await.map_err(|e| {
        error!(error = %e, %room_id, user_id = %auth.user_id, "shapes: list failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(ShapesResponse { shapes: records.into_iter().map(|r| r.shape).collect() }))
}

#[cfg(test)]
#[path = "shapes_test.rs"]
mod tests;
