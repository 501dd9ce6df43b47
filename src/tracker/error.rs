use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// The command a failure belongs to; carried so the UI layer can decide
/// retry/backoff per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOp {
    Start,
    Pause,
    Resume,
    End,
    Refresh,
}

impl fmt::Display for SessionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionOp::Start => "start",
            SessionOp::Pause => "pause",
            SessionOp::Resume => "resume",
            SessionOp::End => "end",
            SessionOp::Refresh => "refresh",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// No valid credential, or the store rejected the one we had. In the
    /// latter case a forced logout has already cleared local state.
    #[error("authentication required")]
    AuthenticationRequired,

    /// Rejected locally, before any remote call.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The store failed an explicit command; never swallowed.
    #[error("{op} failed: {source}")]
    Store {
        op: SessionOp,
        #[source]
        source: StoreError,
    },

    /// The response landed after logout cleared the local state; its result
    /// was discarded rather than resurrecting the session.
    #[error("{op} response discarded: session state was cleared while the call was in flight")]
    Superseded { op: SessionOp },
}

impl TrackerError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        TrackerError::InvalidCommand(reason.into())
    }
}
