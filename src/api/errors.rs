use crate::api::results::OperationResult;
use crate::api::types::ElectionId;
use crate::entry::EntryError;
use std::fmt;
use tonic::codegen::http::uri;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport could not be established, or the device rejected the declared session
    /// parameters.
    #[error("Failed to establish gRIBI session: {0}")]
    Connection(String),

    #[error("Invalid target URI")]
    InvalidUri(#[from] uri::InvalidUri),

    #[error("Session has not been started")]
    NotStarted,

    #[error("Session is already started")]
    AlreadyStarted,

    #[error("Session has been stopped")]
    Stopped,

    // Session logic runs on a background task. This error is returned if the task has exited.
    #[error("Session task has exited")]
    SessionExited,
}

/// TimeoutError is returned when a wait's deadline elapsed before everything it waited for was
/// resolved. It carries every result observed so far, so a caller can tell "some failed" apart from
/// "nothing arrived yet".
#[derive(Debug)]
pub struct TimeoutError {
    pub partial: Vec<OperationResult>,
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timed out with {} partial results", self.partial.len())
    }
}

impl std::error::Error for TimeoutError {}

#[derive(Debug, thiserror::Error)]
pub enum AwaitError {
    #[error("{0}")]
    Timeout(TimeoutError),

    // The Modify stream failed. Not retried, the caller decides whether to reconnect.
    #[error("Modify stream failed: {0}")]
    Transport(String),

    #[error("Modify stream closed by server with {outstanding} operations outstanding")]
    StreamClosed { outstanding: usize },

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl AwaitError {
    /// Returns the partial results if this is a timeout.
    pub fn partial_results(&self) -> Option<&[OperationResult]> {
        match self {
            AwaitError::Timeout(e) => Some(&e.partial),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    // Authority error: another client holds the requested election id or a higher one.
    #[error("Not primary. Requested {requested}, server reports {server}")]
    NotPrimary { requested: ElectionId, server: ElectionId },

    #[error("Server did not echo an election id")]
    NoElectionIdEcho,

    #[error(transparent)]
    Await(#[from] AwaitError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    // Authority error: the flush's election id is below the current primary's.
    #[error("Flush rejected, client is not primary")]
    NotPrimary,

    #[error("Flush rejected, no such network instance")]
    NoSuchNetworkInstance,

    #[error("Flush RPC failed: {0}")]
    Rpc(String),

    #[error("Flush returned unspecified result")]
    UnspecifiedResult,

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error("Get RPC failed: {0}")]
    Rpc(String),

    #[error("Device returned malformed entry: {0}")]
    MalformedEntry(EntryError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Returned by the single-entry helpers, which build and submit a batch in one call.
#[derive(Debug, thiserror::Error)]
pub enum ModifyError {
    #[error("Invalid entry: {0}")]
    Entry(#[from] EntryError),

    #[error(transparent)]
    Session(#[from] SessionError),
}
