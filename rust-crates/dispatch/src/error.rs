/// Construction and configuration faults. These are fatal at startup and never
/// surface on a caller's ticket.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no signers configured; the pool needs at least one signing identity")]
    NoSignersConfigured,
    #[error("invalid dispatch configuration for `{key}`: {reason}")]
    InvalidConfig { key: &'static str, reason: String },
    #[error("the dispatcher must be started from within a Tokio runtime")]
    NoRuntime,
    #[error("failed to read dispatch configuration")]
    ConfigIo(#[from] std::io::Error),
    #[error("failed to parse dispatch configuration")]
    ConfigParse(#[from] serde_json::Error),
}

/// Outcome delivered on a caller's [`Ticket`](crate::Ticket) when the work did
/// not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("admission queue is full (maximum {max_queue_size} requests)")]
    CapacityExceeded { max_queue_size: usize },
    #[error("signer operation failed: {0:#}")]
    SignerOperationFailed(anyhow::Error),
    #[error("queued request was cleared by an administrator")]
    AdminCleared,
    #[error("dispatcher shut down before the request was dispatched")]
    ShutDown,
    #[error("request was dropped before it reported an outcome")]
    Interrupted,
}

impl DispatchError {
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, DispatchError::CapacityExceeded { .. })
    }

    pub fn is_admin_cleared(&self) -> bool {
        matches!(self, DispatchError::AdminCleared)
    }

    /// The error returned by the work itself, if that is what failed.
    pub fn operation_error(&self) -> Option<&anyhow::Error> {
        match self {
            DispatchError::SignerOperationFailed(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_operation_error(self) -> Result<anyhow::Error, Self> {
        match self {
            DispatchError::SignerOperationFailed(err) => Ok(err),
            other => Err(other),
        }
    }
}
