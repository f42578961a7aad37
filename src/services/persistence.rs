//! Persistence service — durable shape records.
//!
//! ARCHITECTURE
//! ============
//! The engine talks to storage only through [`ShapeStore`]: one write
//! (`create_shape`, called by the queue drain) and one read (`list_shapes`,
//! used by late joiners through the REST route). [`PgShapeStore`] is the
//! Postgres implementation; tests plug in recording or failing stores.
//!
//! ERROR HANDLING
//! ==============
//! Callers treat every [`StoreError`] as a dropped event. Nothing here
//! retries: a failed shape is logged by the drain loop and never re-queued.
//!
//! `PgShapeStore` bounds each write inside Postgres with a transaction-local
//! `statement_timeout`. A write cancelled by the server rolls back, so
//! [`StoreError::Timeout`] means no row exists. [`StoreError::Unresponsive`]
//! is the caller's own deadline firing first; the write may or may not have
//! committed.

use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::shape::Shape;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("persistence timed out after {0:?}")]
    Timeout(Duration),
    #[error("store unresponsive after {0:?}; write outcome unknown")]
    Unresponsive(Duration),
}

/// SQLSTATE `query_canceled`, raised when `statement_timeout` fires.
const QUERY_CANCELED: &str = "57014";

/// One persisted drawing primitive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeRecord {
    pub id: Uuid,
    pub room_id: String,
    pub created_by_id: String,
    pub shape: Shape,
}

#[async_trait::async_trait]
pub trait ShapeStore: Send + Sync {
    /// Persist one shape.
    async fn create_shape(&self, room_id: &str, shape: &Shape, created_by_id: &str) -> Result<ShapeRecord, StoreError>;

    /// All shapes in a room, in persistence order.
    async fn list_shapes(&self, room_id: &str) -> Result<Vec<ShapeRecord>, StoreError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

pub struct PgShapeStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgShapeStore {
    #[must_use]
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self { pool, statement_timeout }
    }

    fn map_write_error(&self, err: sqlx::Error) -> StoreError {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(QUERY_CANCELED) {
                return StoreError::Timeout(self.statement_timeout);
            }
        }
        StoreError::Database(err)
    }
}

#[async_trait::async_trait]
impl ShapeStore for PgShapeStore {
    async fn create_shape(&self, room_id: &str, shape: &Shape, created_by_id: &str) -> Result<ShapeRecord, StoreError> {
        let id = Uuid::new_v4();
        let timeout_ms = self.statement_timeout.as_millis().max(1);

        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('statement_timeout', $1, true)")
            .bind(format!("{timeout_ms}ms"))
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO shapes (id, room_id, type, created_by_id, data) VALUES ($1, $2, $3, $4, $5)")
            .bind(id)
            .bind(room_id)
            .bind(shape.kind().as_str())
            .bind(created_by_id)
            .bind(shape.data())
            .execute(&mut *tx)
            .await
            .map_err(|e| self.map_write_error(e))?;
        tx.commit().await.map_err(|e| self.map_write_error(e))?;

        Ok(ShapeRecord {
            id,
            room_id: room_id.to_owned(),
            created_by_id: created_by_id.to_owned(),
            shape: shape.clone(),
        })
    }

    async fn list_shapes(&self, room_id: &str) -> Result<Vec<ShapeRecord>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, String, String, String, serde_json::Value)>(
            "SELECT id, room_id, type, created_by_id, data FROM shapes WHERE room_id = $1 ORDER BY seq ASC",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_rows(rows))
    }
}

/// Decode stored rows, skipping any whose type or payload no longer parses.
fn decode_rows(rows: Vec<(Uuid, String, String, String, serde_json::Value)>) -> Vec<ShapeRecord> {
    rows.into_iter()
        .filter_map(|(id, room_id, kind, created_by_id, data)| match Shape::from_parts(&kind, &data) {
            Ok(shape) => Some(ShapeRecord { id, room_id, created_by_id, shape }),
            Err(e) => {
                warn!(%id, %room_id, error = %e, "persistence: skipping undecodable shape row");
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
