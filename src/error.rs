//! Error types for BDDS client operations.

/// Errors returned by [`Client`](crate::Client) operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The identity endpoint rejected the password grant, or a resource call
    /// answered 401.
    #[error("authentication failed (status {status}): {body}")]
    Authentication { status: u16, body: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Reserved: no code path raises this yet.
    #[error("rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("empty response body from {url}")]
    EmptyResponse { url: String },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },
}

/// Coarse classification callers branch on for recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    NotFound,
    RateLimited,
    Config,
    /// Transport failures, unexpected statuses, malformed bodies, cancellation.
    Transport,
}

impl Error {
    /// Classifies the error, looking through a [`Error::RetriesExhausted`] wrapper.
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Error::Authentication { .. } => ErrorKind::Authentication,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::Config(_) => ErrorKind::Config,
            Error::Status { .. }
            | Error::EmptyResponse { .. }
            | Error::Transport(_)
            | Error::Parse(_)
            | Error::Io(_)
            | Error::Cancelled
            | Error::DeadlineExceeded
            | Error::RetriesExhausted { .. } => ErrorKind::Transport,
        }
    }

    /// The innermost error once retry wrappers are peeled off.
    pub fn root(&self) -> &Error {
        let mut err = self;
        while let Error::RetriesExhausted { source, .. } = err {
            err = source;
        }
        err
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// True for a 401 from either the identity endpoint or a resource call.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.root(), Error::Authentication { status: 401, .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self.root() {
            Error::Authentication { status, .. } | Error::Status { status, .. } => Some(*status),
            Error::NotFound { .. } => Some(404),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
