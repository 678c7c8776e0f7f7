//! Cloud provider error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cloud provider errors
///
/// Every variant belongs to exactly one [`ErrorClass`]. Only transient errors
/// are worth re-issuing the same request for.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Provisioning failed: {0}")]
    ProvisioningFailed(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Unexpected provider response: {0}")]
    Parse(String),
}

/// Retry classification of a [`CloudError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Throttling, timeouts and 5xx: the same request may succeed later
    Transient,
    /// Not-found, conflict, bad parameter, quota: retrying will not help
    Permanent,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
        }
    }
}

impl CloudError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CloudError::Throttled(_)
            | CloudError::ServiceUnavailable(_)
            | CloudError::Timeout(_)
            | CloudError::Network(_) => ErrorClass::Transient,
            CloudError::NotFound(_)
            | CloudError::Conflict(_)
            | CloudError::InvalidParameter(_)
            | CloudError::QuotaExceeded(_)
            | CloudError::ProvisioningFailed(_)
            | CloudError::CommandFailed(_)
            | CloudError::Parse(_) => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }

    /// Stable short name used in persisted step records and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            CloudError::Throttled(_) => "throttled",
            CloudError::ServiceUnavailable(_) => "service_unavailable",
            CloudError::Timeout(_) => "timeout",
            CloudError::Network(_) => "network",
            CloudError::NotFound(_) => "not_found",
            CloudError::Conflict(_) => "conflict",
            CloudError::InvalidParameter(_) => "invalid_parameter",
            CloudError::QuotaExceeded(_) => "quota_exceeded",
            CloudError::ProvisioningFailed(_) => "provisioning_failed",
            CloudError::CommandFailed(_) => "command_failed",
            CloudError::Parse(_) => "parse",
        }
    }
}

impl From<std::io::Error> for CloudError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => CloudError::Timeout(err.to_string()),
            _ => CloudError::CommandFailed(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CloudError {
    fn from(err: serde_json::Error) -> Self {
        CloudError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CloudError::Throttled("429".into()).is_transient());
        assert!(CloudError::ServiceUnavailable("503".into()).is_transient());
        assert!(CloudError::Timeout("poll".into()).is_transient());
        assert!(CloudError::Network("reset".into()).is_transient());
    }

    #[test]
    fn test_permanent_classification() {
        for err in [
            CloudError::NotFound("disk".into()),
            CloudError::Conflict("lun 0".into()),
            CloudError::InvalidParameter("size".into()),
            CloudError::QuotaExceeded("cores".into()),
        ] {
            assert_eq!(err.class(), ErrorClass::Permanent, "{err}");
        }
    }

    #[test]
    fn test_io_timeout_maps_to_timeout() {
        let err: CloudError = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert_eq!(err.kind(), "timeout");
    }
}
