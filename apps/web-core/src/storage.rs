//! Browser-storage model: two named, versioned key-value stores.
//!
//! `DurableStore` survives reloads and new tabs (the analysis cache and the
//! entitlement record). `CheckoutStore` lives for one tab session and exists
//! only to carry the in-progress analysis across the external checkout
//! redirect. Every value is JSON. A value that fails to parse is dropped and
//! read as absent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cvlens_contract::ReportContract;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::entitlements::EntitlementState;

/// Storage keys. The `v1` segment is bumped whenever a stored shape changes.
pub mod keys {
    pub const LAST_ANALYSIS: &str = "cvlens.v1.lastAnalysis";
    pub const LAST_JOB_DESCRIPTION: &str = "cvlens.v1.lastJobDescription";
    pub const ENTITLEMENTS: &str = "cvlens.v1.entitlements";

    pub const CHECKOUT_ANALYSIS: &str = "cvlens.v1.checkout.analysis";
    pub const CHECKOUT_JOB_DESCRIPTION: &str = "cvlens.v1.checkout.jobDescription";
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded while writing '{key}'")]
    QuotaExceeded { key: String },

    #[error("failed to serialize value for '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// String key-value storage with the semantics of `window.localStorage`.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<(), StorageError>;
    fn remove(&self, key: &str);
}

/// In-memory store. An optional byte quota mimics the browser's storage limit.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut entries = self.lock();
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }
}

fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, "Discarding corrupt stored value: {e}");
            store.remove(key);
            None
        }
    }
}

fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Serialize {
        key: key.to_string(),
        source,
    })?;
    store.set(key, raw)
}

fn write_optional_text(
    store: &dyn KeyValueStore,
    key: &str,
    value: Option<&str>,
) -> Result<(), StorageError> {
    match value {
        Some(text) => write_json(store, key, text),
        None => {
            store.remove(key);
            Ok(())
        }
    }
}

/// Analysis cache and entitlement record that survive reloads.
#[derive(Clone)]
pub struct DurableStore {
    inner: Arc<dyn KeyValueStore>,
}

impl DurableStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub fn load_analysis(&self) -> Option<ReportContract> {
        read_json(self.inner.as_ref(), keys::LAST_ANALYSIS)
    }

    pub fn load_job_description(&self) -> Option<String> {
        read_json(self.inner.as_ref(), keys::LAST_JOB_DESCRIPTION)
    }

    /// Overwrites the cached analysis. A `None` job description clears the cached one.
    pub fn save_analysis(
        &self,
        report: &ReportContract,
        job_description: Option<&str>,
    ) -> Result<(), StorageError> {
        write_json(self.inner.as_ref(), keys::LAST_ANALYSIS, report)?;
        write_optional_text(self.inner.as_ref(), keys::LAST_JOB_DESCRIPTION, job_description)?;
        debug!("Analysis snapshot written to durable storage");
        Ok(())
    }

    pub fn clear_analysis(&self) {
        self.inner.remove(keys::LAST_ANALYSIS);
        self.inner.remove(keys::LAST_JOB_DESCRIPTION);
    }

    pub fn load_entitlements(&self) -> Option<EntitlementState> {
        read_json::<EntitlementState>(self.inner.as_ref(), keys::ENTITLEMENTS)
            .map(EntitlementState::normalized)
    }

    pub fn save_entitlements(&self, state: &EntitlementState) -> Result<(), StorageError> {
        write_json(self.inner.as_ref(), keys::ENTITLEMENTS, state)
    }

    pub fn clear_entitlements(&self) {
        self.inner.remove(keys::ENTITLEMENTS);
    }
}

/// What the page looked like right before leaving for checkout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckoutSnapshot {
    pub analysis: Option<ReportContract>,
    pub job_description: Option<String>,
}

/// Short-lived pre-checkout store, kept apart from the durable cache.
#[derive(Clone)]
pub struct CheckoutStore {
    inner: Arc<dyn KeyValueStore>,
}

impl CheckoutStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub fn save_snapshot(&self, snapshot: &CheckoutSnapshot) -> Result<(), StorageError> {
        match &snapshot.analysis {
            Some(report) => write_json(self.inner.as_ref(), keys::CHECKOUT_ANALYSIS, report)?,
            None => self.inner.remove(keys::CHECKOUT_ANALYSIS),
        }
        write_optional_text(
            self.inner.as_ref(),
            keys::CHECKOUT_JOB_DESCRIPTION,
            snapshot.job_description.as_deref(),
        )
    }

    /// Reads and removes the snapshot. `None` when nothing was saved.
    pub fn take_snapshot(&self) -> Option<CheckoutSnapshot> {
        let analysis = read_json(self.inner.as_ref(), keys::CHECKOUT_ANALYSIS);
        let job_description = read_json(self.inner.as_ref(), keys::CHECKOUT_JOB_DESCRIPTION);
        self.clear();

        if analysis.is_none() && job_description.is_none() {
            return None;
        }
        Some(CheckoutSnapshot {
            analysis,
            job_description,
        })
    }

    pub fn clear(&self) {
        self.inner.remove(keys::CHECKOUT_ANALYSIS);
        self.inner.remove(keys::CHECKOUT_JOB_DESCRIPTION);
    }
}

/// Privacy cleanup: removes every key this crate owns from both stores.
pub fn clear_all(durable: &DurableStore, checkout: &CheckoutStore) {
    durable.clear_analysis();
    durable.clear_entitlements();
    checkout.clear();
    debug!("All client storage cleared");
}


#[cfg(test)]
mod tests {
    use super::fixtures::{report, stores};
    use super::*;

    #[test]
    fn test_analysis_round_trips_through_durable_store() {
        let (_, durable, _) = stores();
        let original = report("Jane Doe");
        durable.save_analysis(&original, Some("Rust engineer")).unwrap();

        assert_eq!(durable.load_analysis(), Some(original));
        assert_eq!(durable.load_job_description().as_deref(), Some("Rust engineer"));
    }

    #[test]
    fn test_saving_without_job_description_clears_the_old_one() {
        let (_, durable, _) = stores();
        durable.save_analysis(&report("A"), Some("Old JD")).unwrap();
        durable.save_analysis(&report("B"), None).unwrap();
        assert_eq!(durable.load_job_description(), None);
    }

    #[test]
    fn test_corrupt_value_reads_as_absent_and_is_removed() {
        let (local, durable, _) = stores();
        local.set(keys::LAST_ANALYSIS, "{not json".to_string()).unwrap();
        local.set(keys::ENTITLEMENTS, "[1,2".to_string()).unwrap();

        assert_eq!(durable.load_analysis(), None);
        assert_eq!(durable.load_entitlements(), None);
        assert!(local.get(keys::LAST_ANALYSIS).is_none());
        assert!(local.get(keys::ENTITLEMENTS).is_none());
    }

    #[test]
    fn test_checkout_snapshot_is_consumed_once() {
        let (_, _, checkout) = stores();
        let snapshot = CheckoutSnapshot {
            analysis: Some(report("Jane")),
            job_description: Some("Platform engineer".to_string()),
        };
        checkout.save_snapshot(&snapshot).unwrap();

        assert_eq!(checkout.take_snapshot(), Some(snapshot));
        assert_eq!(checkout.take_snapshot(), None);
    }

    #[test]
    fn test_quota_exceeded_is_reported() {
        let durable = DurableStore::new(Arc::new(MemoryStorage::with_quota(64)));
        let err = durable.save_analysis(&report("Jane"), None).unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
    }

    #[test]
    fn test_clear_all_wipes_both_stores() {
        let local = Arc::new(MemoryStorage::new());
        let session = Arc::new(MemoryStorage::new());
        let durable = DurableStore::new(local.clone());
        let checkout = CheckoutStore::new(session.clone());

        durable.save_analysis(&report("Jane"), Some("JD")).unwrap();
        durable
            .save_entitlements(&EntitlementState {
                has_cover_letter_access: true,
                ..Default::default()
            })
            .unwrap();
        checkout
            .save_snapshot(&CheckoutSnapshot {
                analysis: None,
                job_description: Some("JD".to_string()),
            })
            .unwrap();

        clear_all(&durable, &checkout);
        assert!(local.is_empty());
        assert!(session.is_empty());
    }
}
