//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! handed to the drain worker at startup. It holds the connection registry,
//! the shape queue, and the two collaborator seams: the shape store and the
//! token verifier. Both seams are trait objects so tests run the full engine
//! without Postgres.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::services::identity::TokenVerifier;
use crate::services::persistence::ShapeStore;
use crate::services::queue::ShapeQueue;
use crate::services::registry::ConnectionRegistry;

/// Shared application state. Clone is required by Axum; every field is
/// `Arc`-backed.
#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub queue: ShapeQueue,
    pub store: Arc<dyn ShapeStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub engine: EngineConfig,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn ShapeStore>, verifier: Arc<dyn TokenVerifier>, engine: EngineConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            queue: ShapeQueue::new(engine.queue_capacity),
            store,
            verifier,
            engine,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
