//! In-memory record store with fault injection, used by the test suite.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::cloudkit::{Record, Zone, ZoneId};
use super::database::{RecordStore, SavePolicy, SaveResults};
use super::error::{CloudKitError, ErrorCode, ICloudError};

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Record>>,
    failures: Mutex<VecDeque<CloudKitError>>,
    fetch_failures: Mutex<VecDeque<CloudKitError>>,
    record_failures: Mutex<VecDeque<CloudKitError>>,
    omit_result: AtomicBool,
    next_tag: AtomicU64,
    fetched: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next store call fail with `error`, before it touches any data.
    pub fn fail_next(&self, error: CloudKitError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Make the next fetch fail, leaving saves and deletes alone.
    pub fn fail_next_fetch(&self, error: CloudKitError) {
        self.fetch_failures.lock().unwrap().push_back(error);
    }

    /// Make the next saved record fail on its own while the request as a
    /// whole succeeds. Nothing is written for that record.
    pub fn fail_next_record(&self, error: CloudKitError) {
        self.record_failures.lock().unwrap().push_back(error);
    }

    /// Drop the per-record entries from the next save response. The records
    /// are still written.
    pub fn omit_next_result(&self) {
        self.omit_result.store(true, Ordering::SeqCst);
    }

    /// Write a record directly, as another client would.
    pub fn put(&self, mut record: Record) {
        record.record_change_tag = Some(self.tag());
        self.records
            .lock()
            .unwrap()
            .insert(record.record_name.clone(), record);
    }

    pub fn get(&self, record_name: &str) -> Option<Record> {
        self.records.lock().unwrap().get(record_name).cloned()
    }

    /// Resolves once a fetch has completed (successfully or not).
    pub async fn wait_for_fetch(&self) {
        self.fetched.notified().await;
    }

    fn tag(&self) -> String {
        format!("t{}", self.next_tag.fetch_add(1, Ordering::SeqCst))
    }

    fn injected_failure(&self) -> Result<(), ICloudError> {
        match self.failures.lock().unwrap().pop_front() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn save_one(&self, mut record: Record, policy: SavePolicy) -> Result<Record, CloudKitError> {
        let mut records = self.records.lock().unwrap();
        let existing = records.get(&record.record_name);
        match policy {
            SavePolicy::IfServerRecordUnchanged => {
                if let Some(current) = existing {
                    if current.record_change_tag != record.record_change_tag {
                        return Err(CloudKitError::from_server(
                            "CONFLICT",
                            Some("record to update is older than the server version".into()),
                        ));
                    }
                }
            }
            SavePolicy::ChangedKeys => {
                if let Some(current) = existing {
                    let mut merged = current.fields.clone();
                    merged.extend(record.fields);
                    record.fields = merged;
                }
            }
            SavePolicy::AllKeys => {}
        }
        record.record_change_tag = Some(self.tag());
        records.insert(record.record_name.clone(), record.clone());
        Ok(record)
    }
}

fn not_found() -> CloudKitError {
    CloudKitError::from_server("NOT_FOUND", Some("Record not found".to_string()))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn save(
        &self,
        records: Vec<Record>,
        policy: SavePolicy,
    ) -> Result<SaveResults, ICloudError> {
        self.injected_failure()?;
        let results: SaveResults = records
            .into_iter()
            .map(|record| {
                let name = record.record_name.clone();
                let result = match self.record_failures.lock().unwrap().pop_front() {
                    Some(e) => Err(e),
                    None => self.save_one(record, policy),
                };
                (name, result)
            })
            .collect();
        if self.omit_result.swap(false, Ordering::SeqCst) {
            return Ok(SaveResults::new());
        }
        Ok(results)
    }

    async fn fetch(&self, record_name: &str) -> Result<Record, ICloudError> {
        let fetch_failure = self.fetch_failures.lock().unwrap().pop_front();
        let result = match fetch_failure {
            Some(e) => Err(e.into()),
            None => self.injected_failure().and_then(|()| {
                self.get(record_name)
                    .ok_or_else(|| ICloudError::from(not_found()))
            }),
        };
        self.fetched.notify_one();
        result
    }

    async fn delete(&self, record_name: &str) -> Result<String, ICloudError> {
        self.injected_failure()?;
        match self.records.lock().unwrap().remove(record_name) {
            Some(_) => Ok(record_name.to_string()),
            None => Err(not_found().into()),
        }
    }

    async fn list_zones(&self) -> Result<Vec<Zone>, ICloudError> {
        self.injected_failure()?;
        Ok(vec![Zone {
            zone_id: ZoneId {
                zone_name: "_defaultZone".to_string(),
                extra: serde_json::json!({}),
            },
            deleted: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_rejects_stale_update() {
        let store = MemoryStore::new();
        let mut record = Record::new("Person", "lastPerson");
        record.set_string_field("name", "a");
        store.put(record.clone());

        let stale = store.save_one(record, SavePolicy::IfServerRecordUnchanged);
        assert_eq!(stale.unwrap_err().code, ErrorCode::ServerRecordChanged);
    }

    #[tokio::test]
    async fn test_record_failure_writes_nothing() {
        let store = MemoryStore::new();
        store.fail_next_record(CloudKitError::from_server("QUOTA_EXCEEDED", None));

        let results = store
            .save(vec![Record::new("Person", "lastPerson")], SavePolicy::AllKeys)
            .await
            .unwrap();
        assert!(results["lastPerson"].is_err());
        assert!(store.get("lastPerson").is_none());
    }
}
