use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::error::CloudKitError;

/// Response from `/zones/list`.
#[derive(Debug, Deserialize)]
pub struct ZoneListResponse {
    #[serde(default)]
    pub zones: Vec<Zone>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Zone {
    #[serde(rename = "zoneID")]
    pub zone_id: ZoneId,
    #[serde(default)]
    pub deleted: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneId {
    pub zone_name: String,
    #[serde(flatten)]
    pub extra: Value,
}

/// A CloudKit record. Fields are kept in the wire shape
/// (`{"name": {"value": "...", "type": "STRING"}}`) so records of any type
/// pass through untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default)]
    pub record_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_change_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(record_type: &str, record_name: &str) -> Self {
        Self {
            record_name: record_name.to_string(),
            record_type: record_type.to_string(),
            ..Self::default()
        }
    }

    /// Value of a field, or `None` when it is missing or not a string.
    pub fn string_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key)?.get("value")?.as_str()
    }

    pub fn set_string_field(&mut self, key: &str, value: &str) {
        self.fields
            .insert(key.to_string(), json!({"value": value, "type": "STRING"}));
    }
}

/// One entry of the `records` array returned by `/records/modify` and
/// `/records/lookup`. Successful entries carry the record; failed entries
/// carry `serverErrorCode` and `reason` next to the record name.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEntry {
    #[serde(flatten)]
    pub record: Record,
    #[serde(default)]
    pub server_error_code: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub deleted: Option<bool>,
}

impl RecordEntry {
    pub fn into_result(self) -> Result<Record, CloudKitError> {
        match self.server_error_code {
            Some(code) => Err(CloudKitError::from_server(&code, self.reason)),
            None => Ok(self.record),
        }
    }
}

/// Response from `/records/modify` and `/records/lookup`.
#[derive(Debug, Deserialize)]
pub struct RecordsResponse {
    #[serde(default)]
    pub records: Vec<RecordEntry>,
}

/// Body of a non-2xx response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerErrorBody {
    #[serde(default)]
    pub server_error_code: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    Update,
    ForceUpdate,
    ForceReplace,
    ForceDelete,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub operation_type: OperationType,
    pub record: Record,
}

/// Request for `/records/modify`.
#[derive(Debug, Serialize)]
pub struct ModifyRequest {
    pub operations: Vec<Operation>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub atomic: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRef {
    pub record_name: String,
}

/// Request for `/records/lookup`.
#[derive(Debug, Serialize)]
pub struct LookupRequest {
    pub records: Vec<RecordRef>,
}
