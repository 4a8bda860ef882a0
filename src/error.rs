//! Service-level error taxonomy.

use thiserror::Error;

use crate::{
    authority::AuthorityError, channel::ChannelError, state::participation::InvalidTransition,
};

/// Result alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the synchronization services.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The channel failed. Surfaced to the caller; retrying is the caller's
    /// decision, never the engine's.
    #[error("channel failure: {0}")]
    Channel(#[from] ChannelError),
    /// The answer authority rejected the call.
    #[error("authority rejected the call: {0}")]
    Authority(#[from] AuthorityError),
    /// An event arrived that the local state does not expect. Logged and
    /// ignored by the event loop; fatal only when a caller invokes an
    /// operation out of turn.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// The host cancelled the room. Terminal and non-retryable.
    #[error("the host cancelled the room")]
    Cancelled,
    /// The operation is not valid in the session's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl From<InvalidTransition> for SyncError {
    fn from(err: InvalidTransition) -> Self {
        SyncError::Protocol(err.to_string())
    }
}
