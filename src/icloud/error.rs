use std::collections::BTreeMap;

use thiserror::Error;

/// Error codes in CloudKit's own error domain.
///
/// Mirrors the subset of `CKError.Code` that the web services API can
/// actually produce, plus the two transport conditions the native client
/// reports as CloudKit errors (`NetworkUnavailable`, `NetworkFailure`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    PartialFailure,
    UnknownItem,
    NotAuthenticated,
    PermissionFailure,
    NetworkUnavailable,
    NetworkFailure,
    BadContainer,
    ZoneNotFound,
    QuotaExceeded,
    RequestRateLimited,
    ServiceUnavailable,
    ServerRecordChanged,
    ServerRejectedRequest,
    InvalidArguments,
    InternalError,
    BatchRequestFailed,
    Unknown,
}

impl ErrorCode {
    /// Map a `serverErrorCode` string from a web services response.
    pub fn from_server_code(code: &str) -> Self {
        match code {
            "NOT_FOUND" => Self::UnknownItem,
            "AUTHENTICATION_REQUIRED" | "AUTHENTICATION_FAILED" => Self::NotAuthenticated,
            "ACCESS_DENIED" => Self::PermissionFailure,
            "ZONE_NOT_FOUND" => Self::ZoneNotFound,
            "QUOTA_EXCEEDED" => Self::QuotaExceeded,
            "THROTTLED" => Self::RequestRateLimited,
            "TRY_AGAIN_LATER" => Self::ServiceUnavailable,
            "CONFLICT" | "EXISTS" => Self::ServerRecordChanged,
            "BAD_REQUEST" => Self::InvalidArguments,
            "INTERNAL_ERROR" => Self::InternalError,
            "ATOMIC_ERROR" => Self::BatchRequestFailed,
            _ => Self::Unknown,
        }
    }

    /// Fallback used when an HTTP error carries no parseable error body.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 421 => Self::NotAuthenticated,
            403 => Self::PermissionFailure,
            // Web services answer 404 for an unknown container or environment.
            404 => Self::BadContainer,
            429 => Self::RequestRateLimited,
            503 => Self::ServiceUnavailable,
            _ => Self::ServerRejectedRequest,
        }
    }
}

/// A failure reported by CloudKit itself, either for a whole request or for
/// a single record inside a batch.
#[derive(Debug, Clone, Error)]
#[error("{reason} ({code:?})")]
pub struct CloudKitError {
    pub code: ErrorCode,
    pub reason: String,
    /// Raw `serverErrorCode`, when the server sent one.
    pub server_code: Option<String>,
    /// Per-item failures keyed by record name. Only populated for
    /// `ErrorCode::PartialFailure`.
    pub partial: BTreeMap<String, CloudKitError>,
}

impl CloudKitError {
    pub fn new(code: ErrorCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            server_code: None,
            partial: BTreeMap::new(),
        }
    }

    /// Build an error from a `serverErrorCode` / `reason` pair.
    pub fn from_server(server_code: &str, reason: Option<String>) -> Self {
        Self {
            code: ErrorCode::from_server_code(server_code),
            reason: reason.unwrap_or_else(|| server_code.to_string()),
            server_code: Some(server_code.to_string()),
            partial: BTreeMap::new(),
        }
    }

    /// Wrap per-item failures of a batch request.
    pub fn partial(errors: BTreeMap<String, CloudKitError>) -> Self {
        Self {
            code: ErrorCode::PartialFailure,
            reason: format!("{} item(s) in the batch failed", errors.len()),
            server_code: None,
            partial: errors,
        }
    }
}

#[derive(Error, Debug)]
pub enum ICloudError {
    #[error("CloudKit error: {0}")]
    CloudKit(#[from] CloudKitError),
    #[error("No result returned for record {0}")]
    MissingResult(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ICloudError {
    /// The CloudKit-domain error, if this failure came from CloudKit.
    pub fn as_cloudkit(&self) -> Option<&CloudKitError> {
        match self {
            ICloudError::CloudKit(e) => Some(e),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.as_cloudkit().map(|e| e.code)
    }
}
