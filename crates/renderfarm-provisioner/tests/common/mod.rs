//! In-memory provider for orchestrator tests
//!
//! Resources live in a shared map keyed by the `Name` field of their desired
//! document. Found state adds a provider-assigned `Id`, standing in for the
//! URLs and ARNs real services hand back.

#![allow(dead_code)]

use renderfarm_provisioner::reconcile::{Document, ReconcileError, ResourceDriver};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Shared provider state plus a log of every call made against it
#[derive(Clone, Default)]
pub struct Store {
    resources: Arc<Mutex<HashMap<String, Document>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Store {
    pub fn get(&self, name: &str) -> Option<Document> {
        self.resources.lock().unwrap().get(name).cloned()
    }

    /// Change a resource behind the provisioner's back
    pub fn tamper(&self, name: &str, key: &str, value: Value) {
        let mut resources = self.resources.lock().unwrap();
        let doc = resources.get_mut(name).expect("resource exists");
        doc[key] = value;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Calls whose operation is `op` (`find`, `create`, `update`)
    pub fn count(&self, op: &str) -> usize {
        let prefix = format!("{op} ");
        self.calls().iter().filter(|c| c.starts_with(&prefix)).count()
    }

    fn record(&self, op: &str, key: &str) {
        self.calls.lock().unwrap().push(format!("{op} {key}"));
    }
}

/// Driver over a [`Store`] with optional failure modes
pub struct MemoryDriver {
    store: Store,
    /// Number of upcoming finds that report the resource missing
    lag: AtomicU32,
    /// Every find fails with a retryable error
    unavailable: bool,
}

impl MemoryDriver {
    pub fn new(store: &Store) -> Self {
        Self {
            store: store.clone(),
            lag: AtomicU32::new(0),
            unavailable: false,
        }
    }

    pub fn with_lag(self, lag: u32) -> Self {
        self.lag.store(lag, Ordering::SeqCst);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn name_of(desired: &Document) -> Result<String, ReconcileError> {
        desired["Name"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ReconcileError::malformed("memory resource", "missing Name"))
    }

    fn stored(name: &str, desired: &Document) -> Document {
        let mut doc = desired.clone();
        doc["Id"] = json!(format!("id-{name}"));
        doc
    }
}

impl ResourceDriver for MemoryDriver {
    async fn find(&self, key: &str) -> Result<Option<Document>, ReconcileError> {
        self.store.record("find", key);
        if self.unavailable {
            return Err(ReconcileError::TransientLookup {
                resource: key.to_string(),
                message: "Service unavailable".to_string(),
            });
        }
        if self.lag.load(Ordering::SeqCst) > 0 {
            self.lag.fetch_sub(1, Ordering::SeqCst);
            return Ok(None);
        }
        Ok(self.store.get(key))
    }

    async fn create(&self, desired: &Document) -> Result<Document, ReconcileError> {
        let name = Self::name_of(desired)?;
        self.store.record("create", &name);
        let doc = Self::stored(&name, desired);
        self.store
            .resources
            .lock()
            .unwrap()
            .insert(name, doc.clone());
        Ok(doc)
    }

    async fn update(&self, key: &str, desired: &Document) -> Result<Document, ReconcileError> {
        self.store.record("update", key);
        let doc = Self::stored(key, desired);
        self.store
            .resources
            .lock()
            .unwrap()
            .insert(key.to_string(), doc.clone());
        Ok(doc)
    }
}
