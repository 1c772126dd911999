//! Pre-flight check that the configured container and account can reach the
//! private database at all.

use crate::icloud::{ErrorCode, ICloudError, RecordStore};

#[derive(Debug)]
pub enum Readiness {
    Ready { zones: usize },
    /// The container, environment, or default zone does not exist for these
    /// credentials.
    Misconfigured(ICloudError),
    /// No signed-in account, or the account may not use the container.
    SignInRequired(ICloudError),
    /// Anything else, typically a network or server problem.
    Unreachable(ICloudError),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }

    /// Advice to print for a failed check.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Readiness::Ready { .. } => None,
            Readiness::Misconfigured(_) => Some(
                "Check --container and --environment: the container was not found \
                 or has no private database for this API token.",
            ),
            Readiness::SignInRequired(_) => Some(
                "A signed-in iCloud account is required: pass a valid --web-auth-token \
                 (or CLOUDKIT_WEB_AUTH_TOKEN).",
            ),
            Readiness::Unreachable(_) => None,
        }
    }
}

pub async fn check_readiness(store: &dyn RecordStore) -> Readiness {
    match store.list_zones().await {
        Ok(zones) => {
            let live = zones.iter().filter(|z| !z.deleted.unwrap_or(false)).count();
            tracing::debug!(zones = live, "Private database is reachable");
            Readiness::Ready { zones: live }
        }
        Err(e) => match e.code() {
            Some(ErrorCode::BadContainer | ErrorCode::ZoneNotFound) => Readiness::Misconfigured(e),
            Some(ErrorCode::NotAuthenticated | ErrorCode::PermissionFailure) => {
                Readiness::SignInRequired(e)
            }
            _ => Readiness::Unreachable(e),
        },
    }
}
