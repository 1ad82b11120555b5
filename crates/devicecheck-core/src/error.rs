//! Error types for the DeviceCheck client

use thiserror::Error;

/// Result type alias using DeviceCheckError
pub type Result<T> = std::result::Result<T, DeviceCheckError>;

/// Errors that can occur while talking to DeviceCheck
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceCheckError {
    /// The private key could not be read, parsed or used for signing
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Required configuration is missing or out of range
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Apple answered with a non-200 status
    #[error("Apple rejected the request ({status_code}): {description}")]
    AppleRejection { status_code: u16, description: String },

    /// Apple refused a stale or replayed transaction
    #[error("Apple reported a transaction conflict ({status_code}): {description}")]
    Conflict { status_code: u16, description: String },

    /// No bits have ever been set for this device
    #[error("Bit state not found: {0}")]
    BitStateNotFound(String),

    /// Timeout, refused connection or an unreadable response
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The call was rejected locally before any request was sent
    #[error("Misconfigured request: {0}")]
    MisconfiguredRequest(String),
}

impl DeviceCheckError {
    /// HTTP status reported by Apple, if the error came from a response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DeviceCheckError::AppleRejection { status_code, .. }
            | DeviceCheckError::Conflict { status_code, .. } => Some(*status_code),
            DeviceCheckError::BitStateNotFound(_) => Some(200),
            _ => None,
        }
    }

    /// Whether the error is a construction-time failure
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DeviceCheckError::InvalidKeyMaterial(_) | DeviceCheckError::Config(_)
        )
    }
}

impl From<jsonwebtoken::errors::Error> for DeviceCheckError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        DeviceCheckError::InvalidKeyMaterial(err.to_string())
    }
}

impl From<std::io::Error> for DeviceCheckError {
    fn from(err: std::io::Error) -> Self {
        DeviceCheckError::InvalidKeyMaterial(err.to_string())
    }
}

impl From<serde_json::Error> for DeviceCheckError {
    fn from(err: serde_json::Error) -> Self {
        DeviceCheckError::TransportFailure(format!("malformed response: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code() {
        let err = DeviceCheckError::AppleRejection {
            status_code: 400,
            description: "Missing or incorrectly formatted device token payload".into(),
        };
        assert_eq!(err.status_code(), Some(400));
        assert_eq!(DeviceCheckError::TransportFailure("timeout".into()).status_code(), None);
    }

    #[test]
    fn test_fatal_errors() {
        assert!(DeviceCheckError::InvalidKeyMaterial("bad pem".into()).is_fatal());
        assert!(DeviceCheckError::Config("missing team id".into()).is_fatal());
        assert!(!DeviceCheckError::MisconfiguredRequest("no bits".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = DeviceCheckError::AppleRejection {
            status_code: 401,
            description: "Unable to verify authorization token".into(),
        };
        assert_eq!(
            err.to_string(),
            "Apple rejected the request (401): Unable to verify authorization token"
        );
    }
}
