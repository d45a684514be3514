//! Error types for the OneDrive provider

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Error codes surfaced by the client. Codes the service sends that are not
/// listed here pass through verbatim as [`ErrorCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    AuthenticationFailure,
    AuthenticationCancelled,
    InvalidRequest,
    ItemNotFound,
    TooManyRedirects,
    Timeout,
    GeneralException,
    NotAllowed,
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::AuthenticationFailure => "authenticationFailure",
            ErrorCode::AuthenticationCancelled => "authenticationCancelled",
            ErrorCode::InvalidRequest => "invalidRequest",
            ErrorCode::ItemNotFound => "itemNotFound",
            ErrorCode::TooManyRedirects => "tooManyRedirects",
            ErrorCode::Timeout => "timeout",
            ErrorCode::GeneralException => "generalException",
            ErrorCode::NotAllowed => "notAllowed",
            ErrorCode::Other(code) => code,
        }
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "authenticationFailure" => ErrorCode::AuthenticationFailure,
            "authenticationCancelled" => ErrorCode::AuthenticationCancelled,
            "invalidRequest" => ErrorCode::InvalidRequest,
            "itemNotFound" => ErrorCode::ItemNotFound,
            "tooManyRedirects" => ErrorCode::TooManyRedirects,
            "timeout" => ErrorCode::Timeout,
            "generalException" => ErrorCode::GeneralException,
            "notAllowed" => ErrorCode::NotAllowed,
            other => ErrorCode::Other(other.to_string()),
        }
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        ErrorCode::from(code.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `error` object of a service error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "innererror", skip_serializing_if = "Option::is_none")]
    pub inner_error: Option<Box<ErrorDetail>>,
    #[serde(flatten)]
    pub additional_data: HashMap<String, serde_json::Value>,
}

impl ErrorDetail {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            inner_error: None,
            additional_data: HashMap::new(),
        }
    }

    /// True when this error or any nested inner error carries `code`.
    pub fn is_match(&self, code: &ErrorCode) -> bool {
        &self.code == code
            || self
                .inner_error
                .as_deref()
                .is_some_and(|inner| inner.is_match(code))
    }
}

/// Service error body: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

/// OneDrive provider errors
#[derive(Error, Debug)]
pub enum OneDriveError {
    /// The service or the client reported a coded error.
    #[error("{}: {}", .detail.code, .detail.message.as_deref().unwrap_or_default())]
    Service {
        detail: ErrorDetail,
        /// HTTP status, when the error came from a response
        status: Option<u16>,
    },

    /// No usable credentials.
    #[error("{code}: {source}")]
    Authentication {
        code: ErrorCode,
        #[source]
        source: AuthError,
    },

    /// Transport failure other than a timeout.
    #[error("generalException: {message}")]
    Transport {
        message: String,
        #[source]
        source: BridgeError,
    },

    #[error("timeout: {message}")]
    Timeout {
        message: String,
        #[source]
        source: Option<BridgeError>,
    },

    /// Response body could not be decoded.
    #[error("generalException: {message}")]
    Decode {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("generalException: {0}")]
    Config(#[from] core_runtime::Error),
}

impl OneDriveError {
    pub fn service(code: ErrorCode, message: impl Into<String>) -> Self {
        OneDriveError::Service {
            detail: ErrorDetail::new(code, message),
            status: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::service(ErrorCode::InvalidRequest, message)
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::service(ErrorCode::GeneralException, message)
    }

    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::service(ErrorCode::NotAllowed, message)
    }

    pub(crate) fn from_response(detail: ErrorDetail, status: u16) -> Self {
        OneDriveError::Service {
            detail,
            status: Some(status),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            OneDriveError::Service { detail, .. } => detail.code.clone(),
            OneDriveError::Authentication { code, .. } => code.clone(),
            OneDriveError::Timeout { .. } => ErrorCode::Timeout,
            OneDriveError::Transport { .. }
            | OneDriveError::Decode { .. }
            | OneDriveError::Config(_) => ErrorCode::GeneralException,
        }
    }

    /// Message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            OneDriveError::Service { detail, .. } => detail.message.clone().unwrap_or_default(),
            OneDriveError::Authentication { source, .. } => source.to_string(),
            OneDriveError::Transport { message, .. }
            | OneDriveError::Timeout { message, .. }
            | OneDriveError::Decode { message, .. } => message.clone(),
            OneDriveError::Config(e) => e.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            OneDriveError::Service { status, .. } => *status,
            _ => None,
        }
    }

    /// Checks the code, including nested inner errors of service errors.
    pub fn is_match(&self, code: &ErrorCode) -> bool {
        match self {
            OneDriveError::Service { detail, .. } => detail.is_match(code),
            other => &other.code() == code,
        }
    }
}

impl From<AuthError> for OneDriveError {
    fn from(error: AuthError) -> Self {
        let code = if error.is_cancellation() {
            ErrorCode::AuthenticationCancelled
        } else {
            ErrorCode::AuthenticationFailure
        };
        OneDriveError::Authentication {
            code,
            source: error,
        }
    }
}

impl From<BridgeError> for OneDriveError {
    fn from(error: BridgeError) -> Self {
        if error.is_cancellation() {
            OneDriveError::Timeout {
                message: "The request timed out or was cancelled".to_string(),
                source: Some(error),
            }
        } else {
            OneDriveError::Transport {
                message: "An error occurred sending the request".to_string(),
                source: error,
            }
        }
    }
}

/// Result type for OneDrive operations
pub type Result<T> = std::result::Result<T, OneDriveError>;
