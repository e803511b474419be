use thiserror::Error;

/// Errors produced by the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A session id collision on register. Signals a bug in id generation,
    /// surfaced immediately rather than silently overwriting the entry.
    #[error("duplicate session: {0}")]
    DuplicateSession(String),

    /// A send to one recipient failed. Absorbed by the dispatcher (logged
    /// and skipped), never propagated to the sender or other recipients.
    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type RelayResult<T> = Result<T, RelayError>;
