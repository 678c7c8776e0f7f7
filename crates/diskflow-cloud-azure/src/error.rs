//! Azure CLI error types

use diskflow_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("az CLI not found. Please install: https://aka.ms/installazurecli")]
    AzNotFound,

    #[error("az command failed: {0}")]
    CommandFailed(String),

    #[error("az command timed out after {0}s")]
    CommandTimeout(u64),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AzureError>;

impl From<AzureError> for CloudError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::AzNotFound => CloudError::CommandFailed(err.to_string()),
            AzureError::CommandFailed(stderr) => classify_stderr(&stderr),
            AzureError::CommandTimeout(_) => CloudError::Timeout(err.to_string()),
            AzureError::JsonError(e) => CloudError::Parse(e.to_string()),
            AzureError::IoError(e) => e.into(),
        }
    }
}

/// Map az CLI stderr onto the cloud error taxonomy
///
/// az prints `ERROR: (Code) message`. The code decides when present; the
/// message may quote resource names, so it is only searched for phrases when
/// there is no code, as for failures before a response arrives.
pub fn classify_stderr(stderr: &str) -> CloudError {
    let message = stderr.trim().trim_start_matches("ERROR:").trim().to_string();
    match error_code(&message) {
        Some(code) => classify_code(code, &message),
        None => classify_phrase(message),
    }
}

/// The `Code` of a leading `(Code)`
fn error_code(message: &str) -> Option<&str> {
    let rest = message.strip_prefix('(')?;
    let code = &rest[..rest.find(')')?];
    if !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
        Some(code)
    } else {
        None
    }
}

fn classify_code(code: &str, message: &str) -> CloudError {
    let detail = message.to_lowercase();
    let message = message.to_string();

    match code.to_ascii_lowercase().as_str() {
        "toomanyrequests" | "subscriptionrequeststhrottled" | "throttled" => {
            CloudError::Throttled(message)
        }
        "serviceunavailable" | "internalservererror" | "serverbusy" => {
            CloudError::ServiceUnavailable(message)
        }
        "gatewaytimeout" | "requesttimeout" | "operationtimedout" => CloudError::Timeout(message),
        "resourcenotfound" | "notfound" | "resourcegroupnotfound" => CloudError::NotFound(message),
        "conflict" | "resourceexists" | "attachdiskwhilebeingdetached" => {
            CloudError::Conflict(message)
        }
        "quotaexceeded" => CloudError::QuotaExceeded(message),
        "operationnotallowed" if detail.contains("quota") => CloudError::QuotaExceeded(message),
        "operationnotallowed" => CloudError::Conflict(message),
        // Azure reports an occupied LUN as InvalidParameter
        "invalidparameter" if detail.contains("lun") && detail.contains("already") => {
            CloudError::Conflict(message)
        }
        "invalidparameter" | "badrequest" | "invalidrequestcontent" => {
            CloudError::InvalidParameter(message)
        }
        _ => CloudError::CommandFailed(message),
    }
}

fn classify_phrase(message: String) -> CloudError {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["too many requests", "rate limit"]) {
        CloudError::Throttled(message)
    } else if has(&["service unavailable", "server busy"]) {
        CloudError::ServiceUnavailable(message)
    } else if has(&["timed out"]) {
        CloudError::Timeout(message)
    } else if has(&[
        "connection aborted",
        "connection reset",
        "connection refused",
        "max retries exceeded",
        "name resolution",
    ]) {
        CloudError::Network(message)
    } else if has(&["was not found", "could not be found"]) {
        CloudError::NotFound(message)
    } else if has(&["already exists"]) {
        CloudError::Conflict(message)
    } else {
        CloudError::CommandFailed(message)
    }
}
