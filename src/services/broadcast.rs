//! Broadcast — fan a persisted shape out to its room.
//!
//! Recipients are whoever is a member of the record's room at the moment
//! `fan_out` runs, the author included. Delivery is best-effort: a full or
//! closed client channel is skipped and never blocks the drain worker.

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::frame::{ServerFrame, ShapeBroadcast};
use crate::services::persistence::ShapeRecord;
use crate::services::registry::ConnectionRegistry;

/// Deliver `record` to every current member of its room. Returns the number
/// of channels that accepted the frame.
pub async fn fan_out(registry: &ConnectionRegistry, record: &ShapeRecord) -> usize {
    let members = registry.members_of(&record.room_id).await;
    if members.is_empty() {
        return 0;
    }

    let frame = ServerFrame::Shape(ShapeBroadcast::from(record));
    let mut delivered = 0;
    for member in &members {
        match member.tx.try_send(frame.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %member.connection_id, user_id = %member.user_id, room_id = %record.room_id, "broadcast: client channel full; frame dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection_id = %member.connection_id, room_id = %record.room_id, "broadcast: client channel closed");
            }
        }
    }
    delivered
}

#[cfg(test)]
#[path = "broadcast_test.rs"]
mod tests;
