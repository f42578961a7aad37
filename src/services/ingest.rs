//! Ingest — per-connection protocol state machine and shape admission.
//!
//! DESIGN
//! ======
//! Every connection starts `Unauthenticated`. The only frame accepted there
//! is `authenticate`; a verified token binds the identity in the registry
//! and moves the session to `Authenticated`, which it never leaves.
//!
//! `process_inbound_text` is pure dispatch: it mutates the registry or the
//! queue and returns an [`Outcome`]. The websocket layer owns the socket and
//! applies the outcome (nothing, a notice to the sender, or a close).
//!
//! ERROR HANDLING
//! ==============
//! - [`ProtocolViolation`]: malformed JSON, wrong state, bad token. Closes
//!   the connection with `1008`; the display text is the close reason.
//! - [`ValidationError`]: a well-formed `shape` frame with bad content.
//!   Answered with an error notice; the connection stays open and nothing
//!   is queued.
//! - Unrecognized frame types and `join_room`/`leave_room` frames without a
//!   usable `roomId` are ignored once authenticated.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{ClientFrame, ErrorCode, ErrorNotice, FrameError, ServerFrame, ShapeFrame, parse_client_frame};
use crate::services::identity::VerifyError;
use crate::services::queue::{PendingEvent, QueueError};
use crate::services::registry::RegistryError;
use crate::shape::{Shape, ShapeError};
use crate::state::AppState;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("Invalid token")]
    InvalidToken(#[from] VerifyError),
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Already authenticated")]
    AlreadyAuthenticated,
    #[error("Invalid message format")]
    MalformedFrame(#[from] FrameError),
    #[error("User not found")]
    UnknownConnection,
}

impl ErrorCode for ProtocolViolation {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidToken(_) => "E_INVALID_TOKEN",
            Self::NotAuthenticated => "E_NOT_AUTHENTICATED",
            Self::AlreadyAuthenticated => "E_ALREADY_AUTHENTICATED",
            Self::MalformedFrame(_) => "E_MALFORMED_FRAME",
            Self::UnknownConnection => "E_UNKNOWN_CONNECTION",
        }
    }
}

impl From<RegistryError> for ProtocolViolation {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownConnection(_) => Self::UnknownConnection,
            RegistryError::AlreadyAuthenticated(_) => Self::AlreadyAuthenticated,
            RegistryError::NotAuthenticated(_) => Self::NotAuthenticated,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("User not in room")]
    NotInRoom,
    #[error("Invalid shape data")]
    InvalidShape,
    #[error("Unknown shape type: {0}")]
    UnknownShapeType(String),
    #[error("Server busy, shape not accepted")]
    QueueFull(#[from] QueueError),
}

impl ErrorCode for ValidationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotInRoom => "E_NOT_IN_ROOM",
            Self::InvalidShape => "E_INVALID_SHAPE",
            Self::UnknownShapeType(_) => "E_UNKNOWN_SHAPE_TYPE",
            Self::QueueFull(_) => "E_QUEUE_FULL",
        }
    }
}

impl From<ShapeError> for ValidationError {
    fn from(err: ShapeError) -> Self {
        match err {
            ShapeError::UnknownType(kind) => Self::UnknownShapeType(kind),
            ShapeError::InvalidData { .. } => Self::InvalidShape,
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated { user_id: String },
}

/// Protocol state for one connection. Owned by its websocket task.
#[derive(Debug)]
pub struct Session {
    connection_id: Uuid,
    state: SessionState,
}

impl Session {
    #[must_use]
    pub fn new(connection_id: Uuid) -> Self {
        Self { connection_id, state: SessionState::Unauthenticated }
    }

    #[must_use]
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated { user_id } => Some(user_id),
            SessionState::Unauthenticated => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated { .. })
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// What the websocket layer should do after one inbound frame.
#[derive(Debug)]
pub enum Outcome {
    Continue,
    /// Send a frame to the sender only.
    Reply(ServerFrame),
    /// Close with `1008`. No further frames are processed.
    Close(ProtocolViolation),
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Parse and handle one inbound text message.
pub async fn process_inbound_text(state: &AppState, session: &mut Session, text: &str) -> Outcome {
    let connection_id = session.connection_id;
    let frame = match parse_client_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(%connection_id, error = %e, "ws: malformed frame");
            return Outcome::Close(e.into());
        }
    };

    let user_id = match &session.state {
        SessionState::Unauthenticated => return handle_unauthenticated(state, session, frame).await,
        SessionState::Authenticated { user_id } => user_id.clone(),
    };

    match frame {
        ClientFrame::Authenticate { .. } => Outcome::Close(ProtocolViolation::AlreadyAuthenticated),
        ClientFrame::JoinRoom { room_id } => {
            let Some(room_id) = room_id.filter(|r| !r.is_empty()) else {
                debug!(%connection_id, "ws: join_room without roomId ignored");
                return Outcome::Continue;
            };
            match state.registry.join_room(connection_id, &room_id).await {
                Ok(joined) => {
                    info!(%connection_id, %user_id, %room_id, joined, "ws: join room");
                    Outcome::Continue
                }
                Err(e) => Outcome::Close(e.into()),
            }
        }
        ClientFrame::LeaveRoom { room_id } => {
            let Some(room_id) = room_id.filter(|r| !r.is_empty()) else {
                debug!(%connection_id, "ws: leave_room without roomId ignored");
                return Outcome::Continue;
            };
            match state.registry.leave_room(connection_id, &room_id).await {
                Ok(left) => {
                    info!(%connection_id, %user_id, %room_id, left, "ws: leave room");
                    Outcome::Continue
                }
                Err(e) => Outcome::Close(e.into()),
            }
        }
        ClientFrame::Shape(shape) => match admit_shape(state, connection_id, &user_id, shape).await {
            Ok(depth) => {
                debug!(%connection_id, depth, "ws: shape queued");
                Outcome::Continue
            }
            Err(e) => {
                warn!(%connection_id, %user_id, error = %e, code = e.error_code(), "ws: shape rejected");
                Outcome::Reply(ServerFrame::Error(ErrorNotice::from_error(&e)))
            }
        },
        ClientFrame::Unrecognized => {
            debug!(%connection_id, "ws: unrecognized frame ignored");
            Outcome::Continue
        }
    }
}

async fn handle_unauthenticated(state: &AppState, session: &mut Session, frame: ClientFrame) -> Outcome {
    let ClientFrame::Authenticate { token } = frame else {
        return Outcome::Close(ProtocolViolation::NotAuthenticated);
    };
    match authenticate(state, session.connection_id, token.as_deref()).await {
        Ok(user_id) => {
            info!(connection_id = %session.connection_id, %user_id, "ws: authenticated");
            session.state = SessionState::Authenticated { user_id };
            Outcome::Continue
        }
        Err(e) => {
            warn!(connection_id = %session.connection_id, error = %e, "ws: authentication failed");
            Outcome::Close(e)
        }
    }
}

async fn authenticate(state: &AppState, connection_id: Uuid, token: Option<&str>) -> Result<String, ProtocolViolation> {
    let token = token.ok_or(VerifyError::Missing)?;
    let user_id = state.verifier.verify(token)?;
    state.registry.authenticate(connection_id, &user_id).await?;
    Ok(user_id)
}

/// Validate a shape frame and queue it. Returns the queue depth.
async fn admit_shape(
    state: &AppState,
    connection_id: Uuid,
    user_id: &str,
    frame: ShapeFrame,
) -> Result<usize, ValidationError> {
    let room_id = frame
        .room_id
        .filter(|r| !r.is_empty())
        .ok_or(ValidationError::NotInRoom)?;
    if !state.registry.is_member(connection_id, &room_id).await {
        return Err(ValidationError::NotInRoom);
    }

    let shape_type = frame.shape_type.ok_or(ValidationError::InvalidShape)?;
    if !(frame.shape_data.is_object() || frame.shape_data.is_array()) {
        return Err(ValidationError::InvalidShape);
    }
    let shape = Shape::from_parts(&shape_type, &frame.shape_data)?;

    let depth = state.queue.enqueue(PendingEvent {
        room_id,
        shape,
        author_user_id: user_id.to_owned(),
        connection_id,
    })?;
    Ok(depth)
}

#[cfg(test)]
#[path = "ingest_test.rs"]
mod tests;
