use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The host transport gave up waiting for the remote side.
    #[error("Bridge operation timed out: {0}")]
    Timeout(String),

    /// The operation was cancelled, either by the user or by the host stack.
    #[error("Bridge operation cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether this error represents a cancellation or timeout raised by the host.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, BridgeError::Timeout(_) | BridgeError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
