//! Record store access layer.
//!
//! A [`RecordStore`] holds one [`ProjectRecord`] per project id and offers three
//! calls: `get`, `put` (full replace, optionally conditional on the version the
//! caller read) and `update` (partial attribute write). Every write bumps the
//! record version.
//!
//! Retry behaviour is not baked into the backends. Wrap a backend in
//! [`RetryingStore`] to apply a [`RetryPolicy`] to every call.

pub mod error;
pub mod memory;
pub mod retry;
pub mod sqlite;

pub use error::*;
pub use memory::MemoryStore;
pub use retry::RetryPolicy;
pub use sqlite::SqliteStore;

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use crate::models::{ErrorInfo, ProjectRecord, ProjectStatus};

/// Precondition for a full-record write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// Blind overwrite (or create)
    Always,
    /// Only if no record exists yet
    IfAbsent,
    /// Only if the stored version still equals the one read
    IfVersion(u64),
}

/// One attribute of a partial update
///
/// The tracker itself only writes `Name`, `Error` and `UpdatedTs` this way.
/// The remaining top-level fields are exposed for external control
/// operations (pause, resume, stop) that change them without touching stages.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Status(ProjectStatus),
    Progress(f64),
    Error(Option<ErrorInfo>),
    Name(Option<String>),
    Tags(Vec<String>),
    UpdatedTs(i64),
    CompletedTs(Option<i64>),
}

impl Attribute {
    /// Apply this attribute to an in-memory record
    pub fn apply(&self, record: &mut ProjectRecord) {
        match self {
            Attribute::Status(status) => record.status = *status,
            Attribute::Progress(progress) => record.progress = *progress,
            Attribute::Error(error) => record.error = error.clone(),
            Attribute::Name(name) => record.name = name.clone(),
            Attribute::Tags(tags) => record.tags = tags.clone(),
            Attribute::UpdatedTs(ts) => record.updated_ts = *ts,
            Attribute::CompletedTs(ts) => record.completed_ts = *ts,
        }
    }
}

/// Storage backend for project records.
///
/// Implementations must be safe to share across threads.
pub trait RecordStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<ProjectRecord>, StoreError>;

    /// Replace the whole record. Returns the version now stored.
    fn put(&self, record: &ProjectRecord, condition: WriteCondition) -> Result<u64, StoreError>;

    /// Write a subset of top-level attributes. Fails with `NotFound` when
    /// the record does not exist. Returns the version now stored.
    fn update(&self, id: &str, attributes: &[Attribute]) -> Result<u64, StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn get(&self, id: &str) -> Result<Option<ProjectRecord>, StoreError> {
        (**self).get(id)
    }

    fn put(&self, record: &ProjectRecord, condition: WriteCondition) -> Result<u64, StoreError> {
        (**self).put(record, condition)
    }

    fn update(&self, id: &str, attributes: &[Attribute]) -> Result<u64, StoreError> {
        (**self).update(id, attributes)
    }
}

/// Client-level interceptor applying a retry policy to every call
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: RecordStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: RecordStore> RecordStore for RetryingStore<S> {
    fn get(&self, id: &str) -> Result<Option<ProjectRecord>, StoreError> {
        self.policy.run("store.get", || self.inner.get(id))
    }

    fn put(&self, record: &ProjectRecord, condition: WriteCondition) -> Result<u64, StoreError> {
        self.policy.run("store.put", || self.inner.put(record, condition))
    }

    fn update(&self, id: &str, attributes: &[Attribute]) -> Result<u64, StoreError> {
        self.policy.run("store.update", || self.inner.update(id, attributes))
    }
}

static SHARED_SQLITE: OnceLock<Arc<SqliteStore>> = OnceLock::new();
static SHARED_INIT: Mutex<()> = Mutex::new(());

/// Process-wide SQLite store, opened once.
///
/// The first successful call opens `path`; later calls return the same client
/// regardless of the path they pass. Callers hand the returned `Arc` to the
/// tracker and dashboard rather than calling this again.
pub fn shared_sqlite(path: &Path) -> Result<Arc<SqliteStore>, StoreError> {
    if let Some(store) = SHARED_SQLITE.get() {
        return Ok(Arc::clone(store));
    }
    let _guard = SHARED_INIT.lock().unwrap_or_else(|err| err.into_inner());
    if let Some(store) = SHARED_SQLITE.get() {
        return Ok(Arc::clone(store));
    }
    log::debug!("opening record store at {}", path.display());
    let store = Arc::new(SqliteStore::open(path)?);
    let _ = SHARED_SQLITE.set(Arc::clone(&store));
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrying_store_retries_transient_get() {
        let memory = MemoryStore::new();
        memory.put(&ProjectRecord::new("p1", "Build X", "u1", vec![]), WriteCondition::Always).unwrap();
        memory.inject_failure(StoreError::transient(TransientKind::Throttled, "slow down"));
        memory.inject_failure(StoreError::transient(TransientKind::Unavailable, "blip"));

        let before = memory.call_count();

        let store = RetryingStore::new(memory, RetryPolicy::immediate(3));
        let record = store.get("p1").unwrap();
        assert!(record.is_some());
        // Two failed attempts, then the successful read
        assert_eq!(store.inner().call_count() - before, 3);
    }

    #[test]
    fn test_retrying_store_surfaces_permanent_immediately() {
        let memory = MemoryStore::new();
        memory.inject_failure(StoreError::permanent(PermanentKind::Validation, "bad attribute"));
        let store = RetryingStore::new(memory, RetryPolicy::immediate(3));
        let err = store.update("p1", &[Attribute::Progress(10.0)]).unwrap_err();
        assert!(matches!(err, StoreError::Permanent { kind: PermanentKind::Validation, .. }));
        assert_eq!(store.inner().call_count(), 1);
    }

    #[test]
    fn test_attribute_apply() {
        let mut record = ProjectRecord::new("p1", "Build X", "u1", vec![]);
        Attribute::Status(ProjectStatus::Paused).apply(&mut record);
        Attribute::Name(Some("X".to_string())).apply(&mut record);
        assert_eq!(record.status, ProjectStatus::Paused);
        assert_eq!(record.name.as_deref(), Some("X"));

        Attribute::Tags(vec!["demo".to_string()]).apply(&mut record);
        Attribute::CompletedTs(Some(1_700_000_000)).apply(&mut record);
        assert_eq!(record.tags, vec!["demo".to_string()]);
        assert_eq!(record.completed_ts, Some(1_700_000_000));
    }

    #[test]
    fn test_shared_sqlite_opens_once() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let first = shared_sqlite(&temp_dir.path().join("a.db")).unwrap();
        let second = shared_sqlite(&temp_dir.path().join("b.db")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
