//! Failure classification for record store errors.
//!
//! Every failed store call is passed through [`report_error`] before it is
//! returned to the caller. Classification only logs; it never changes what
//! the caller receives.

use tracing::warn;

use crate::icloud::{CloudKitError, ErrorCode, ICloudError};

/// Stable classification of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Did not come from CloudKit (decoding, local transport, missing result).
    NotARemoteStoreFailure,
    /// A batch in which individual items failed.
    PartialFailure,
    RecordNotFound,
    NotAuthenticated,
    PermissionFailure,
    NetworkUnavailable,
    Other,
}

impl From<ErrorCode> for FailureKind {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::PartialFailure => FailureKind::PartialFailure,
            ErrorCode::UnknownItem => FailureKind::RecordNotFound,
            ErrorCode::NotAuthenticated => FailureKind::NotAuthenticated,
            ErrorCode::PermissionFailure => FailureKind::PermissionFailure,
            ErrorCode::NetworkUnavailable => FailureKind::NetworkUnavailable,
            _ => FailureKind::Other,
        }
    }
}

impl ICloudError {
    /// Top-level classification, without logging.
    pub fn kind(&self) -> FailureKind {
        self.code()
            .map(FailureKind::from)
            .unwrap_or(FailureKind::NotARemoteStoreFailure)
    }
}

/// One logged classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub kind: FailureKind,
    /// Record name, for failures unpacked from a partial failure.
    pub item: Option<String>,
    pub message: String,
}

impl Report {
    fn log(&self, server_code: Option<&str>) {
        let message = &self.message;
        match (self.kind, self.item.as_deref()) {
            (FailureKind::NotARemoteStoreFailure, _) => {
                warn!("Not a CloudKit error: {message}")
            }
            (kind, Some(item)) => warn!(?kind, item, server_code, "CloudKit error: {message}"),
            (kind, None) => warn!(?kind, server_code, "CloudKit error: {message}"),
        }
    }
}

/// Log a classification for `error` and return what was logged.
///
/// A partial failure produces no entry of its own: each nested per-item
/// failure is classified and logged separately.
pub fn report_error(error: &ICloudError) -> Vec<Report> {
    let mut reports = Vec::new();
    match error.as_cloudkit() {
        Some(ck) => report_cloudkit(ck, None, &mut reports),
        None => {
            let report = Report {
                kind: FailureKind::NotARemoteStoreFailure,
                item: None,
                message: error.to_string(),
            };
            report.log(None);
            reports.push(report);
        }
    }
    reports
}

fn report_cloudkit(error: &CloudKitError, item: Option<&str>, reports: &mut Vec<Report>) {
    let kind = FailureKind::from(error.code);
    let message = match kind {
        FailureKind::PartialFailure => {
            for (nested_item, nested) in &error.partial {
                report_cloudkit(nested, Some(nested_item.as_str()), reports);
            }
            return;
        }
        FailureKind::RecordNotFound => "Record not found.".to_string(),
        FailureKind::NotAuthenticated => {
            "An iCloud account must be signed in to write to a private database.".to_string()
        }
        FailureKind::PermissionFailure => {
            "An iCloud account permission failure occurred.".to_string()
        }
        FailureKind::NetworkUnavailable => "The network is unavailable.".to_string(),
        FailureKind::Other | FailureKind::NotARemoteStoreFailure => error.to_string(),
    };

    let report = Report {
        kind,
        item: item.map(str::to_string),
        message,
    };
    report.log(error.server_code.as_deref());
    reports.push(report);
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn ck(code: ErrorCode, reason: &str) -> ICloudError {
        CloudKitError::new(code, reason).into()
    }

    #[test]
    fn test_kinds_for_codes() {
        assert_eq!(
            ck(ErrorCode::UnknownItem, "x").kind(),
            FailureKind::RecordNotFound
        );
        assert_eq!(
            ck(ErrorCode::NotAuthenticated, "x").kind(),
            FailureKind::NotAuthenticated
        );
        assert_eq!(
            ck(ErrorCode::PermissionFailure, "x").kind(),
            FailureKind::PermissionFailure
        );
        assert_eq!(
            ck(ErrorCode::NetworkUnavailable, "x").kind(),
            FailureKind::NetworkUnavailable
        );
        assert_eq!(ck(ErrorCode::NetworkFailure, "x").kind(), FailureKind::Other);
        assert_eq!(ck(ErrorCode::QuotaExceeded, "x").kind(), FailureKind::Other);
        assert_eq!(
            ck(ErrorCode::PartialFailure, "x").kind(),
            FailureKind::PartialFailure
        );
    }

    #[test]
    fn test_not_cloudkit() {
        let err = ICloudError::MissingResult("lastPerson".into());
        assert_eq!(err.kind(), FailureKind::NotARemoteStoreFailure);

        let reports = report_error(&err);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, FailureKind::NotARemoteStoreFailure);
        assert_eq!(reports[0].message, "No result returned for record lastPerson");
    }

    #[test]
    fn test_single_failure_one_entry() {
        let reports = report_error(&ck(ErrorCode::UnknownItem, "Record not found"));
        assert_eq!(
            reports,
            vec![Report {
                kind: FailureKind::RecordNotFound,
                item: None,
                message: "Record not found.".into(),
            }]
        );
    }

    #[test]
    fn test_other_logs_description_verbatim() {
        let err = ck(ErrorCode::QuotaExceeded, "Quota exceeded for container");
        let reports = report_error(&err);
        assert_eq!(reports[0].kind, FailureKind::Other);
        assert_eq!(
            reports[0].message,
            "Quota exceeded for container (QuotaExceeded)"
        );
    }

    #[test]
    fn test_partial_failure_unpacks_each_item() {
        let mut nested = BTreeMap::new();
        nested.insert(
            "first".to_string(),
            CloudKitError::new(ErrorCode::NotAuthenticated, "sign in"),
        );
        nested.insert(
            "second".to_string(),
            CloudKitError::new(ErrorCode::ServiceUnavailable, "try later"),
        );
        let err = ICloudError::from(CloudKitError::partial(nested));

        let reports = report_error(&err);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].kind, FailureKind::NotAuthenticated);
        assert_eq!(reports[0].item.as_deref(), Some("first"));
        assert_eq!(reports[1].kind, FailureKind::Other);
        assert_eq!(reports[1].item.as_deref(), Some("second"));
        assert_eq!(reports[1].message, "try later (ServiceUnavailable)");
    }

    #[test]
    fn test_nested_partial_failure_recurses() {
        let mut inner = BTreeMap::new();
        inner.insert(
            "inner".to_string(),
            CloudKitError::new(ErrorCode::NetworkUnavailable, "offline"),
        );
        let mut outer = BTreeMap::new();
        outer.insert("outer".to_string(), CloudKitError::partial(inner));
        outer.insert(
            "plain".to_string(),
            CloudKitError::new(ErrorCode::UnknownItem, "gone"),
        );

        let reports = report_error(&CloudKitError::partial(outer).into());
        let kinds: Vec<_> = reports.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![FailureKind::NetworkUnavailable, FailureKind::RecordNotFound]
        );
    }

    #[test]
    fn test_empty_partial_failure_logs_nothing() {
        let err = ICloudError::from(CloudKitError::partial(BTreeMap::new()));
        assert!(report_error(&err).is_empty());
    }
}
