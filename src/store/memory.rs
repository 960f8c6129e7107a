use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::models::ProjectRecord;
use crate::store::{Attribute, RecordStore, StoreError, WriteCondition};

/// In-memory record store for tests and embedding.
///
/// Failures queued with [`MemoryStore::inject_failure`] are returned, one per
/// call and in order, before any real work happens.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, ProjectRecord>,
    failures: VecDeque<StoreError>,
    calls: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for the next store call
    pub fn inject_failure(&self, err: StoreError) {
        self.lock().failures.push_back(err);
    }

    /// Total get/put/update calls seen, including failed ones
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn begin(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let mut inner = self.lock();
        inner.calls += 1;
        match inner.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(inner),
        }
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<ProjectRecord>, StoreError> {
        let inner = self.begin()?;
        Ok(inner.records.get(id).cloned())
    }

    fn put(&self, record: &ProjectRecord, condition: WriteCondition) -> Result<u64, StoreError> {
        let mut inner = self.begin()?;
        let current = inner.records.get(&record.id).map(|r| r.version);
        match (condition, current) {
            (WriteCondition::IfAbsent, Some(actual)) => {
                return Err(StoreError::Conflict { id: record.id.clone(), expected: 0, actual: Some(actual) });
            }
            (WriteCondition::IfVersion(expected), actual) if actual != Some(expected) => {
                return Err(StoreError::Conflict { id: record.id.clone(), expected, actual });
            }
            _ => {}
        }
        let version = current.unwrap_or(0) + 1;
        let mut stored = record.clone();
        stored.version = version;
        inner.records.insert(record.id.clone(), stored);
        Ok(version)
    }

    fn update(&self, id: &str, attributes: &[Attribute]) -> Result<u64, StoreError> {
        let mut inner = self.begin()?;
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        for attribute in attributes {
            attribute.apply(record);
        }
        record.version += 1;
        Ok(record.version)
    }
}
