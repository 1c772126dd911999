use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::cloudkit::{
    LookupRequest, ModifyRequest, Operation, OperationType, Record, RecordRef, RecordsResponse,
    ServerErrorBody, Zone, ZoneListResponse,
};
use super::error::{CloudKitError, ErrorCode, ICloudError};
use crate::config::Config;
use crate::types::Environment;

/// Per-record outcome of a save, keyed by record name.
pub type SaveResults = HashMap<String, Result<Record, CloudKitError>>;

/// How a save treats the server's copy of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePolicy {
    /// Reject the save if the server record changed since it was fetched.
    #[allow(dead_code)] // the sync controller always overwrites
    IfServerRecordUnchanged,
    /// Overwrite only the supplied fields, ignoring the change tag.
    #[allow(dead_code)]
    ChangedKeys,
    /// Replace the whole record unconditionally.
    AllKeys,
}

impl SavePolicy {
    fn operation_type(self) -> OperationType {
        match self {
            SavePolicy::IfServerRecordUnchanged => OperationType::Update,
            SavePolicy::ChangedKeys => OperationType::ForceUpdate,
            SavePolicy::AllKeys => OperationType::ForceReplace,
        }
    }
}

/// A per-account record database.
///
/// Object-safe so the controller can hold an `Arc<dyn RecordStore>` and tests
/// can swap in an in-memory store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Save a batch of records. A request-level failure is returned as `Err`;
    /// otherwise there is one entry per submitted record.
    async fn save(
        &self,
        records: Vec<Record>,
        policy: SavePolicy,
    ) -> Result<SaveResults, ICloudError>;

    async fn fetch(&self, record_name: &str) -> Result<Record, ICloudError>;

    /// Delete a record, returning the name of the deleted record.
    async fn delete(&self, record_name: &str) -> Result<String, ICloudError>;

    /// List the zones of the database. Only used to check that the container
    /// and account are usable.
    async fn list_zones(&self) -> Result<Vec<Zone>, ICloudError>;
}

/// The private database of a CloudKit container, reached through CloudKit
/// Web Services.
pub struct CloudKitDatabase {
    client: Client,
    service_endpoint: String,
    params: HashMap<String, String>,
}

impl std::fmt::Debug for CloudKitDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudKitDatabase")
            .field("service_endpoint", &self.service_endpoint)
            .field("params", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl CloudKitDatabase {
    pub fn new(client: Client, service_endpoint: String, params: HashMap<String, String>) -> Self {
        Self {
            client,
            service_endpoint,
            params,
        }
    }

    /// Build a database handle from the application configuration.
    pub fn from_config(config: &Config) -> Result<Self, ICloudError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let mut params = HashMap::new();
        params.insert("ckAPIToken".to_string(), config.api_token.clone());
        if let Some(token) = &config.web_auth_token {
            params.insert("ckWebAuthToken".to_string(), token.clone());
        }

        let service_endpoint =
            Self::build_service_endpoint(&config.api_root, &config.container, config.environment);
        Ok(Self::new(client, service_endpoint, params))
    }

    fn build_service_endpoint(api_root: &str, container: &str, environment: Environment) -> String {
        let api_root = api_root.trim_end_matches('/');
        format!(
            "{api_root}/database/1/{container}/{}/private",
            environment.as_str()
        )
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ICloudError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.service_endpoint, path);
        debug!(%url, "POST");
        let resp = self
            .client
            .post(&url)
            .query(&self.params)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(server_error(status.as_u16(), &bytes).into());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl RecordStore for CloudKitDatabase {
    async fn save(
        &self,
        records: Vec<Record>,
        policy: SavePolicy,
    ) -> Result<SaveResults, ICloudError> {
        // Batches go out atomically so a multi-record save never half-applies.
        let atomic = records.len() > 1;
        let request = ModifyRequest {
            operations: records
                .into_iter()
                .map(|record| Operation {
                    operation_type: policy.operation_type(),
                    record,
                })
                .collect(),
            atomic,
        };
        let response: RecordsResponse = self.post("records/modify", &request).await?;

        let results: SaveResults = response
            .records
            .into_iter()
            .map(|entry| (entry.record.record_name.clone(), entry.into_result()))
            .collect();

        let batch_rejected = results
            .values()
            .any(|r| matches!(r, Err(e) if e.code == ErrorCode::BatchRequestFailed));
        if atomic && batch_rejected {
            let errors: BTreeMap<String, CloudKitError> = results
                .into_iter()
                .filter_map(|(name, result)| result.err().map(|e| (name, e)))
                .collect();
            return Err(CloudKitError::partial(errors).into());
        }

        Ok(results)
    }

    async fn fetch(&self, record_name: &str) -> Result<Record, ICloudError> {
        let request = LookupRequest {
            records: vec![RecordRef {
                record_name: record_name.to_string(),
            }],
        };
        let response: RecordsResponse = self.post("records/lookup", &request).await?;
        let entry = response
            .records
            .into_iter()
            .next()
            .ok_or_else(|| ICloudError::MissingResult(record_name.to_string()))?;
        Ok(entry.into_result()?)
    }

    async fn delete(&self, record_name: &str) -> Result<String, ICloudError> {
        let request = ModifyRequest {
            operations: vec![Operation {
                operation_type: OperationType::ForceDelete,
                record: Record {
                    record_name: record_name.to_string(),
                    ..Record::default()
                },
            }],
            atomic: false,
        };
        let response: RecordsResponse = self.post("records/modify", &request).await?;
        let entry = response
            .records
            .into_iter()
            .next()
            .ok_or_else(|| ICloudError::MissingResult(record_name.to_string()))?;
        let confirmed = entry.deleted == Some(true);
        let name = entry.into_result()?.record_name;
        if !confirmed {
            debug!(record = %name, "Delete succeeded without a deleted flag");
        }
        Ok(name)
    }

    async fn list_zones(&self) -> Result<Vec<Zone>, ICloudError> {
        let response: ZoneListResponse = self.post("zones/list", &json!({})).await?;
        Ok(response.zones)
    }
}

/// Connection failures are reported in CloudKit's domain, the same way the
/// native client does; everything else stays a plain HTTP error.
fn transport_error(e: reqwest::Error) -> ICloudError {
    if e.is_connect() {
        CloudKitError::new(ErrorCode::NetworkUnavailable, e.to_string()).into()
    } else if e.is_timeout() {
        CloudKitError::new(ErrorCode::NetworkFailure, e.to_string()).into()
    } else {
        ICloudError::Http(e)
    }
}

fn server_error(status: u16, body: &[u8]) -> CloudKitError {
    match serde_json::from_slice::<ServerErrorBody>(body) {
        Ok(ServerErrorBody {
            server_error_code: Some(code),
            reason,
        }) => CloudKitError::from_server(&code, reason),
        _ => CloudKitError::new(
            ErrorCode::from_http_status(status),
            format!(
                "HTTP {status}: {}",
                String::from_utf8_lossy(body).trim()
            ),
        ),
    }
}
