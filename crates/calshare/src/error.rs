/// Unified error type for the calshare crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// No user is signed in on this device.
    #[error("not signed in")]
    NotSignedIn,

    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input provided by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A remote document or persisted blob did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The remote document store rejected or failed a request.
    #[error("remote store error: {0}")]
    Remote(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Decode(error.to_string())
    }
}

/// Result type alias using [`SyncError`].
pub type SyncResult<T> = Result<T, SyncError>;
