//! Single-record synchronization controller.
//!
//! Keeps one CloudKit record (the "last person") and a local observable
//! mirror of its `name` field in step. Saves always overwrite the server copy
//! (last writer wins) and are followed by a re-fetch, so the mirror only ever
//! shows values the store has actually returned.
//!
//! Operations are not serialized against each other. Overlapping calls land
//! in whatever order the store completes them, and the mirror shows the last
//! successful fetch to finish.

pub mod report;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::icloud::{ICloudError, Record, RecordStore, SavePolicy};
pub use report::{report_error, FailureKind};

pub const RECORD_TYPE: &str = "Person";
pub const NAME_FIELD: &str = "name";

/// Name of the singleton record the controller manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordId(String);

impl RecordId {
    pub const PRODUCTION: &'static str = "lastPerson";
    pub const TESTING: &'static str = "lastPersonTest";

    /// Select the production or the testing record.
    pub fn for_testing(testing: bool) -> Self {
        Self::new(if testing {
            Self::TESTING
        } else {
            Self::PRODUCTION
        })
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type Observer = Arc<dyn Fn(&str) + Send + Sync>;

pub struct RecordSyncController {
    store: Arc<dyn RecordStore>,
    record_id: RecordId,
    /// The mirror. Every write goes through this sender.
    last_person: watch::Sender<String>,
    observers: Mutex<Vec<Observer>>,
}

impl fmt::Debug for RecordSyncController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSyncController")
            .field("record_id", &self.record_id)
            .field("last_person", &*self.last_person.borrow())
            .finish_non_exhaustive()
    }
}

impl RecordSyncController {
    /// Construct without touching the store.
    pub fn new(store: Arc<dyn RecordStore>, record_id: RecordId) -> Self {
        let (last_person, _) = watch::channel(String::new());
        Self {
            store,
            record_id,
            last_person,
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Construct and schedule a best-effort initial refresh.
    ///
    /// Must be called from within a tokio runtime. A failure of the initial
    /// refresh is logged by the classifier and otherwise dropped.
    pub fn create(store: Arc<dyn RecordStore>, record_id: RecordId) -> Arc<Self> {
        let controller = Arc::new(Self::new(store, record_id));
        let initial = Arc::clone(&controller);
        tokio::spawn(async move {
            if initial.refresh().await.is_err() {
                debug!(record = %initial.record_id, "Initial refresh failed");
            }
        });
        controller
    }

    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    /// Last known name. Empty when nothing has been fetched yet.
    pub fn current_value(&self) -> String {
        self.last_person.borrow().clone()
    }

    /// Receiver that is notified on every successful mirror update.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.last_person.subscribe()
    }

    /// Register a callback invoked with the new value on every successful
    /// mirror update.
    pub fn observe<F>(&self, observer: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    /// Save `name` as the last person, overwriting whatever the server has,
    /// then re-fetch so the mirror reflects the stored value.
    ///
    /// If the save succeeds but the follow-up fetch fails, the fetch error is
    /// returned and the mirror keeps its previous value.
    pub async fn save(&self, name: &str) -> Result<(), ICloudError> {
        let mut record = Record::new(RECORD_TYPE, self.record_id.as_str());
        record.set_string_field(NAME_FIELD, name);

        let saved = self
            .store
            .save(vec![record], SavePolicy::AllKeys)
            .await
            .and_then(|mut results| {
                results
                    .remove(self.record_id.as_str())
                    .ok_or_else(|| ICloudError::MissingResult(self.record_id.to_string()))
            })
            .and_then(|result| result.map_err(ICloudError::from))
            .inspect_err(|e| {
                report_error(e);
            })?;

        info!("Record with ID {} was saved.", saved.record_name);
        self.refresh().await
    }

    /// Fetch the record and update the mirror.
    ///
    /// A record without a text `name` field leaves the mirror untouched.
    pub async fn refresh(&self) -> Result<(), ICloudError> {
        let record = self
            .store
            .fetch(self.record_id.as_str())
            .await
            .inspect_err(|e| {
                report_error(e);
            })?;

        info!("Record with ID {} was fetched.", record.record_name);
        match record.string_field(NAME_FIELD) {
            Some(name) => self.publish(name.to_string()),
            None => debug!(record = %record.record_name, "Record has no text name field"),
        }
        Ok(())
    }

    /// Delete the record. The mirror is left showing the last known name.
    pub async fn delete(&self) -> Result<(), ICloudError> {
        let deleted = self
            .store
            .delete(self.record_id.as_str())
            .await
            .inspect_err(|e| {
                report_error(e);
            })?;

        info!("Record with ID {} was deleted.", deleted);
        Ok(())
    }

    /// Observers run outside the registry lock, so they may call `observe`.
    fn publish(&self, name: String) {
        self.last_person.send_replace(name.clone());
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            observer(&name);
        }
    }
}
