use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::db::DbConnection;
use crate::models::{
    ErrorInfo, ProjectRecord, ProjectStatus, StageEntry, StageName, StageStatus, SubStageEntry, SubStageName,
};
use crate::store::{Attribute, RecordStore, StoreError, WriteCondition};

/// SQLite-backed record store
///
/// The snapshot is stored normalized: one `projects` row, one `stages` row per
/// pipeline stage keyed by position, and `sub_stages` rows for development.
/// Conditional writes run inside an IMMEDIATE transaction so the version check
/// and the write are atomic even across processes sharing the file.
///
/// # Example
///
/// ```no_run
/// use pipetrack::store::{RecordStore, SqliteStore, WriteCondition};
/// use pipetrack::models::ProjectRecord;
///
/// let store = SqliteStore::open(std::path::Path::new("/tmp/pipeline.db")).unwrap();
/// let record = ProjectRecord::new("p1", "Build a weather agent", "u1", vec![]);
/// store.put(&record, WriteCondition::IfAbsent).unwrap();
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

struct ProjectRow {
    id: String,
    name: Option<String>,
    requirement: String,
    requester: String,
    tags_json: String,
    status: String,
    progress: f64,
    total_stages: i64,
    completed_stages: i64,
    error_json: Option<String>,
    created_ts: i64,
    updated_ts: i64,
    completed_ts: Option<i64>,
    version: i64,
}

impl SqliteStore {
    /// Open (and migrate) the database file at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = DbConnection::open(path).map_err(store_error_from_anyhow)?;
        Ok(Self::from_connection(conn))
    }

    /// Fresh in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = DbConnection::connect_in_memory().map_err(store_error_from_anyhow)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn load(conn: &Connection, id: &str) -> Result<Option<ProjectRecord>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, name, requirement, requester, tags_json, status, progress, total_stages,
                    completed_stages, error_json, created_ts, updated_ts, completed_ts, version
             FROM projects WHERE id = ?1",
        )?;
        let row = stmt
            .query_row([id], |row| {
                Ok(ProjectRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    requirement: row.get(2)?,
                    requester: row.get(3)?,
                    tags_json: row.get(4)?,
                    status: row.get(5)?,
                    progress: row.get(6)?,
                    total_stages: row.get(7)?,
                    completed_stages: row.get(8)?,
                    error_json: row.get(9)?,
                    created_ts: row.get(10)?,
                    updated_ts: row.get(11)?,
                    completed_ts: row.get(12)?,
                    version: row.get(13)?,
                })
            })
            .optional()?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let mut stages = Self::load_stages(conn, id)?;
        let sub_stages = Self::load_sub_stages(conn, id)?;
        if let Some(dev) = stages.iter_mut().find(|s| s.name.is_compound()) {
            if !sub_stages.is_empty() {
                dev.sub_stages = Some(sub_stages);
            }
        }

        let status = ProjectStatus::from_str(&row.status)
            .ok_or_else(|| StoreError::Other(format!("invalid project status '{}' for {}", row.status, row.id)))?;
        let error: Option<ErrorInfo> = match row.error_json {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };

        Ok(Some(ProjectRecord {
            id: row.id,
            name: row.name,
            requirement: row.requirement,
            requester: row.requester,
            tags: serde_json::from_str(&row.tags_json)?,
            status,
            progress: row.progress,
            stages,
            total_stages: row.total_stages as u32,
            completed_stages: row.completed_stages as u32,
            error,
            created_ts: row.created_ts,
            updated_ts: row.updated_ts,
            completed_ts: row.completed_ts,
            version: row.version as u64,
        }))
    }

    fn load_stages(conn: &Connection, id: &str) -> Result<Vec<StageEntry>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT name, status, started_ts, completed_ts, duration_secs, error, logs_json
             FROM stages WHERE project_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut stages = Vec::new();
        for row in rows {
            let (name, status, started_ts, completed_ts, duration_secs, error, logs_json) = row?;
            let name = StageName::from_str(&name)
                .ok_or_else(|| StoreError::Other(format!("unknown stage '{}' stored for {}", name, id)))?;
            let mut entry = StageEntry::new(name);
            entry.status = parse_stage_status(&status)?;
            entry.started_ts = started_ts;
            entry.completed_ts = completed_ts;
            entry.duration_secs = duration_secs;
            entry.error = error;
            entry.logs = serde_json::from_str(&logs_json)?;
            stages.push(entry);
        }
        Ok(stages)
    }

    fn load_sub_stages(conn: &Connection, id: &str) -> Result<Vec<SubStageEntry>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT name, status, artifacts_json, started_ts, completed_ts
             FROM sub_stages WHERE project_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<i64>>(4)?,
            ))
        })?;

        let mut subs = Vec::new();
        for row in rows {
            let (name, status, artifacts_json, started_ts, completed_ts) = row?;
            let name = SubStageName::from_str(&name)
                .ok_or_else(|| StoreError::Other(format!("unknown sub-stage '{}' stored for {}", name, id)))?;
            subs.push(SubStageEntry {
                name,
                status: parse_stage_status(&status)?,
                artifacts: serde_json::from_str(&artifacts_json)?,
                started_ts,
                completed_ts,
            });
        }
        Ok(subs)
    }

    fn current_version(tx: &Transaction, id: &str) -> Result<Option<u64>, StoreError> {
        let version: Option<i64> = tx
            .query_row("SELECT version FROM projects WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        Ok(version.map(|v| v as u64))
    }

    fn write_record(tx: &Transaction, record: &ProjectRecord, exists: bool, version: u64) -> Result<(), StoreError> {
        let tags_json = serde_json::to_string(&record.tags)?;
        let error_json = match &record.error {
            Some(error) => Some(serde_json::to_string(error)?),
            None => None,
        };
        let status = record.status.as_str();
        let version = version as i64;

        let sql = if exists {
            "UPDATE projects SET name = ?2, requirement = ?3, requester = ?4, tags_json = ?5, status = ?6,
                    progress = ?7, total_stages = ?8, completed_stages = ?9, error_json = ?10,
                    created_ts = ?11, updated_ts = ?12, completed_ts = ?13, version = ?14
             WHERE id = ?1"
        } else {
            "INSERT INTO projects (id, name, requirement, requester, tags_json, status, progress, total_stages,
                                   completed_stages, error_json, created_ts, updated_ts, completed_ts, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        };
        tx.execute(
            sql,
            rusqlite::params![
                record.id,
                record.name,
                record.requirement,
                record.requester,
                tags_json,
                status,
                record.progress,
                record.total_stages,
                record.completed_stages,
                error_json,
                record.created_ts,
                record.updated_ts,
                record.completed_ts,
                version,
            ],
        )?;

        tx.execute("DELETE FROM stages WHERE project_id = ?1", [&record.id])?;
        tx.execute("DELETE FROM sub_stages WHERE project_id = ?1", [&record.id])?;

        for stage in &record.stages {
            tx.execute(
                "INSERT INTO stages (project_id, position, name, status, started_ts, completed_ts,
                                     duration_secs, error, logs_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    record.id,
                    stage.order() as i64,
                    stage.name.as_str(),
                    stage.status.as_str(),
                    stage.started_ts,
                    stage.completed_ts,
                    stage.duration_secs,
                    stage.error,
                    serde_json::to_string(&stage.logs)?,
                ],
            )?;

            for sub in stage.sub_stages.iter().flatten() {
                tx.execute(
                    "INSERT INTO sub_stages (project_id, position, name, status, artifacts_json,
                                             started_ts, completed_ts)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        record.id,
                        sub.name.order() as i64,
                        sub.name.as_str(),
                        sub.status.as_str(),
                        serde_json::to_string(&sub.artifacts)?,
                        sub.started_ts,
                        sub.completed_ts,
                    ],
                )?;
            }
        }
        Ok(())
    }
}

impl RecordStore for SqliteStore {
    fn get(&self, id: &str) -> Result<Option<ProjectRecord>, StoreError> {
        let conn = self.lock();
        Self::load(&conn, id)
    }

    fn put(&self, record: &ProjectRecord, condition: WriteCondition) -> Result<u64, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = Self::current_version(&tx, &record.id)?;
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
        Self::write_record(&tx, record, current.is_some(), version)?;
        tx.commit()?;
        Ok(version)
    }

    fn update(&self, id: &str, attributes: &[Attribute]) -> Result<u64, StoreError> {
        // Build dynamic update
        let mut sets: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        for attribute in attributes {
            match attribute {
                Attribute::Status(status) => {
                    sets.push("status = ?");
                    params.push(Box::new(status.as_str()));
                }
                Attribute::Progress(progress) => {
                    sets.push("progress = ?");
                    params.push(Box::new(*progress));
                }
                Attribute::Error(error) => {
                    sets.push("error_json = ?");
                    let json = match error {
                        Some(error) => Some(serde_json::to_string(error)?),
                        None => None,
                    };
                    params.push(Box::new(json));
                }
                Attribute::Name(name) => {
                    sets.push("name = ?");
                    params.push(Box::new(name.clone()));
                }
                Attribute::Tags(tags) => {
                    sets.push("tags_json = ?");
                    params.push(Box::new(serde_json::to_string(tags)?));
                }
                Attribute::UpdatedTs(ts) => {
                    sets.push("updated_ts = ?");
                    params.push(Box::new(*ts));
                }
                Attribute::CompletedTs(ts) => {
                    sets.push("completed_ts = ?");
                    params.push(Box::new(*ts));
                }
            }
        }

        // Number the parameters
        let mut numbered_sets: Vec<String> = Vec::new();
        for (i, set) in sets.iter().enumerate() {
            numbered_sets.push(set.replace('?', &format!("?{}", i + 1)));
        }
        numbered_sets.push("version = version + 1".to_string());
        let id_param = params.len() + 1;
        let sql = format!(
            "UPDATE projects SET {} WHERE id = ?{}",
            numbered_sets.join(", "),
            id_param
        );
        params.push(Box::new(id.to_string()));

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let updated = tx.execute(&sql, param_refs.as_slice())?;
        if updated == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let version = Self::current_version(&tx, id)?.unwrap_or(0);
        tx.commit()?;
        Ok(version)
    }
}

fn parse_stage_status(s: &str) -> Result<StageStatus, StoreError> {
    StageStatus::from_str(s).ok_or_else(|| StoreError::Other(format!("invalid stage status '{}'", s)))
}

fn store_error_from_anyhow(err: anyhow::Error) -> StoreError {
    let context = format!("{:#}", err);
    match err.downcast::<rusqlite::Error>() {
        Ok(sqlite_err) => StoreError::from(sqlite_err),
        Err(_) => StoreError::Other(context),
    }
}
