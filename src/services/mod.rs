//! Domain services used by the websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the synchronization engine so route handlers stay
//! focused on transport. Inbound text flows `ingest` → `queue`; the drain
//! worker calls `persistence` then `broadcast`, which reads `registry`.

pub mod broadcast;
pub mod identity;
pub mod ingest;
pub mod persistence;
pub mod queue;
pub mod registry;
