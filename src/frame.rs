//! Frame — the JSON messages exchanged over the drawing websocket.
//!
//! ARCHITECTURE
//! ============
//! Inbound text is parsed in two steps. Bad JSON is a protocol error and is
//! reported as [`FrameError`]. Well-formed JSON is then decoded into the
//! [`ClientFrame`] discriminated union keyed by `type`; anything without a
//! known discriminant becomes [`ClientFrame::Unrecognized`] and never reaches
//! business logic.
//!
//! DESIGN
//! ======
//! Field values inside a known frame are decoded leniently (a non-string
//! `roomId` becomes `None`) so the ingestion layer, not serde, decides
//! whether a bad field is ignored, rejected with a notice, or fatal.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::services::persistence::ShapeRecord;

// =============================================================================
// CLOSE CODES
// =============================================================================

/// Close code used for every policy violation.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code for errors that are reported to clients.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid json: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload is not valid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

// =============================================================================
// INBOUND
// =============================================================================

/// A frame received from a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Authenticate {
        #[serde(default, deserialize_with = "lenient_string")]
        token: Option<String>,
    },
    JoinRoom {
        #[serde(rename = "roomId", default, deserialize_with = "lenient_string")]
        room_id: Option<String>,
    },
    LeaveRoom {
        #[serde(rename = "roomId", default, deserialize_with = "lenient_string")]
        room_id: Option<String>,
    },
    Shape(ShapeFrame),
    #[serde(other)]
    Unrecognized,
}

/// Raw fields of an inbound `shape` frame, prior to validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShapeFrame {
    #[serde(rename = "roomId", default, deserialize_with = "lenient_string")]
    pub room_id: Option<String>,
    #[serde(rename = "shapeType", default, deserialize_with = "lenient_string")]
    pub shape_type: Option<String>,
    #[serde(rename = "shapeData", default)]
    pub shape_data: Value,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Parse one inbound text message.
///
/// # Errors
///
/// Returns [`FrameError::Malformed`] if the text is not valid JSON. Valid JSON
/// that is not a recognized frame is returned as [`ClientFrame::Unrecognized`].
pub fn parse_client_frame(text: &str) -> Result<ClientFrame, FrameError> {
    let value: Value = serde_json::from_str(text)?;
    Ok(serde_json::from_value(value).unwrap_or(ClientFrame::Unrecognized))
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// A frame pushed to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Shape(ShapeBroadcast),
    Error(ErrorNotice),
}

/// A persisted shape, fanned out to every member of its room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "shape")]
pub struct ShapeBroadcast {
    #[serde(rename = "shapeType")]
    pub shape_type: String,
    #[serde(rename = "shapeData")]
    pub shape_data: Value,
    #[serde(rename = "roomId")]
    pub room_id: String,
}

impl From<&ShapeRecord> for ShapeBroadcast {
    fn from(record: &ShapeRecord) -> Self {
        Self {
            shape_type: record.shape.kind().as_str().to_owned(),
            shape_data: record.shape.data(),
            room_id: record.room_id.clone(),
        }
    }
}

/// Notice sent back to the sender when a well-formed frame is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub error: String,
    pub code: String,
}

impl ErrorNotice {
    #[must_use]
    pub fn from_error(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self { error: err.to_string(), code: err.error_code().to_owned() }
    }
}

impl ServerFrame {
    /// Serialize for the wire.
    ///
    /// # Errors
    ///
    /// Returns a serde error if the payload cannot be encoded.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
