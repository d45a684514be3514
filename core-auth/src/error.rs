use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The user dismissed the prompt or the identity provider reported a
    /// user cancellation.
    #[error("Authentication cancelled: {0}")]
    AuthenticationCancelled(String),

    /// The token endpoint answered with an OAuth error body.
    #[error("Token endpoint returned '{error}': {description}")]
    TokenEndpoint { error: String, description: String },

    #[error("OAuth state mismatch: expected '{expected}', got '{actual}'")]
    StateMismatch { expected: String, actual: String },

    #[error("Invalid authentication configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Network error: {0}")]
    NetworkError(#[source] BridgeError),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),
}

impl AuthError {
    /// Whether the user aborted, as opposed to the flow failing.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AuthError::AuthenticationCancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
