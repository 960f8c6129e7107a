//! Stage snapshot state machine.
//!
//! [`PipelineTracker`] is the façade an executor calls to move stages through
//! `pending -> running -> {completed, failed}`. Every call is a read-modify-write
//! of the whole project record, conditional on the version that was read; when
//! another writer got there first the cycle is repeated under the tracker's
//! [`RetryPolicy`].

use std::sync::Arc;
use chrono::Utc;
use thiserror::Error;

use crate::errors::record_and_continue;
use crate::models::{
    ErrorInfo, ProjectRecord, ProjectStatus, StageEntry, StageName, StageRef, StageStatus, SubStageEntry,
    SubStageName,
};
use crate::progress::ProgressWeights;
use crate::store::{Attribute, RecordStore, RetryPolicy, StoreError, WriteCondition};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("project '{0}' not found")]
    NotFound(String),

    #[error("unknown stage '{0}'")]
    InvalidStage(String),

    /// Optimistic retries ran out while other writers kept winning
    #[error("project '{id}' kept changing concurrently; gave up after {attempts} attempts")]
    Conflict { id: String, attempts: u32 },

    #[error(transparent)]
    Store(StoreError),
}

impl TrackerError {
    /// Errors caused by the caller's input rather than the store
    pub fn is_user_error(&self) -> bool {
        matches!(self, TrackerError::NotFound(_) | TrackerError::InvalidStage(_))
    }
}

impl From<StoreError> for TrackerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => TrackerError::NotFound(id),
            other => TrackerError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Parse a stage argument into a [`StageRef`]
pub fn parse_stage(stage: &str) -> Result<StageRef> {
    StageRef::parse(stage).ok_or_else(|| TrackerError::InvalidStage(stage.to_string()))
}

#[derive(Clone)]
pub struct PipelineTracker {
    store: Arc<dyn RecordStore>,
    policy: RetryPolicy,
    weights: ProgressWeights,
}

impl PipelineTracker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    /// `policy` bounds the optimistic read-modify-write retries
    pub fn with_policy(store: Arc<dyn RecordStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            weights: ProgressWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: ProgressWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Load a project, failing with NotFound when absent
    pub fn get(&self, id: &str) -> Result<ProjectRecord> {
        self.store
            .get(id)?
            .ok_or_else(|| TrackerError::NotFound(id.to_string()))
    }

    /// Create (or reset) a project: every stage pending, status building, progress 0.
    ///
    /// An existing record with the same id is overwritten.
    pub fn initialize(&self, id: &str, requirement: &str, requester: &str, tags: &[String]) -> Result<ProjectRecord> {
        let mut record = ProjectRecord::new(id, requirement, requester, tags.to_vec());
        let now = record.created_ts;
        self.recompute(&mut record, now);
        record.version = self.store.put(&record, WriteCondition::Always)?;
        log::debug!("initialized project {} (version {})", id, record.version);
        Ok(record)
    }

    /// Set or clear the project's display name
    pub fn rename(&self, id: &str, name: Option<&str>) -> Result<u64> {
        let attributes = [
            Attribute::Name(name.map(str::to_string)),
            Attribute::UpdatedTs(Utc::now().timestamp()),
        ];
        Ok(self.store.update(id, &attributes)?)
    }

    /// Mark a stage (or `development.<sub>`) running.
    ///
    /// Earlier stages that are not completed are forced to completed.
    pub fn mark_stage_running(&self, id: &str, stage: &str) -> Result<ProjectRecord> {
        let target = parse_stage(stage)?;
        self.mutate(id, "start", |record, now| {
            let name = target.stage();
            catch_up(record, name, now);
            let entry = stage_entry(record, name)?;
            match target {
                StageRef::Stage(_) => start_stage(entry, now),
                StageRef::SubStage(sub) => {
                    if entry.status != StageStatus::Running {
                        start_stage(entry, now);
                    }
                    entry.logs.push(log_line(now, &format!("{} started", sub.display_name())));
                    start_sub_stage(sub_stage_entry(entry, sub)?, now);
                }
            }
            if record.status == ProjectStatus::Pending {
                record.status = ProjectStatus::Building;
            }
            Ok(())
        })
    }

    /// Mark a stage (or `development.<sub>`) completed.
    ///
    /// Completing the last stage with every other stage completed completes the project.
    pub fn mark_stage_completed(&self, id: &str, stage: &str) -> Result<ProjectRecord> {
        let target = parse_stage(stage)?;
        self.mutate(id, "complete", |record, now| {
            let entry = stage_entry(record, target.stage())?;
            match target {
                StageRef::Stage(_) => complete_stage(entry, now),
                StageRef::SubStage(sub) => {
                    entry.logs.push(log_line(now, &format!("{} completed", sub.display_name())));
                    complete_sub_stage(sub_stage_entry(entry, sub)?, now);
                }
            }
            let last = matches!(target, StageRef::Stage(name) if name.is_last());
            if last && record.all_stages_completed() {
                finish_project(record, now);
            }
            Ok(())
        })
    }

    /// Mark a stage (or `development.<sub>`) failed and fail the project.
    ///
    /// The project's error info is written afterwards as a best-effort
    /// annotation; losing it does not fail the call.
    pub fn mark_stage_failed(&self, id: &str, stage: &str, message: &str) -> Result<ProjectRecord> {
        let target = parse_stage(stage)?;
        let mut record = self.mutate(id, "fail", |record, now| {
            let entry = stage_entry(record, target.stage())?;
            if let StageRef::SubStage(sub) = target {
                fail_sub_stage(sub_stage_entry(entry, sub)?, now);
            }
            fail_stage(entry, message, now);
            record.status = ProjectStatus::Failed;
            Ok(())
        })?;

        let info = ErrorInfo {
            stage: target.to_string(),
            message: message.to_string(),
            occurred_ts: record.updated_ts,
        };
        let annotation = self.store.update(id, &[Attribute::Error(Some(info.clone()))]);
        if let Some(version) = record_and_continue("failed to annotate project error", annotation) {
            record.error = Some(info);
            record.version = version;
        }
        Ok(record)
    }

    /// Force-complete every stage and sub-stage, then the project
    pub fn mark_project_completed(&self, id: &str) -> Result<ProjectRecord> {
        self.mutate(id, "finish", |record, now| {
            for entry in record.stages.iter_mut() {
                if entry.status != StageStatus::Completed {
                    complete_stage(entry, now);
                }
            }
            finish_project(record, now);
            Ok(())
        })
    }

    /// Read-modify-write loop conditional on the version read
    fn mutate<F>(&self, id: &str, action: &str, mut apply: F) -> Result<ProjectRecord>
    where
        F: FnMut(&mut ProjectRecord, i64) -> Result<()>,
    {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 0..attempts {
            let mut record = self.get(id)?;
            let expected = record.version;
            let now = Utc::now().timestamp();
            apply(&mut record, now)?;
            self.recompute(&mut record, now);

            match self.store.put(&record, WriteCondition::IfVersion(expected)) {
                Ok(version) => {
                    record.version = version;
                    log::debug!("{} {}: stored version {}", action, id, version);
                    return Ok(record);
                }
                Err(err) if err.is_conflict() => {
                    log::debug!("{} {}: attempt {}/{} lost a race ({})", action, id, attempt + 1, attempts, err);
                    if attempt + 1 < attempts {
                        std::thread::sleep(self.policy.delay_for(attempt));
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
        log::warn!("{} {}: giving up after {} conflicting attempts", action, id, attempts);
        Err(TrackerError::Conflict { id: id.to_string(), attempts })
    }

    /// Derived fields written with every mutation
    fn recompute(&self, record: &mut ProjectRecord, now: i64) {
        record.total_stages = record.stages.len() as u32;
        record.completed_stages = record.count_completed();
        record.progress = if record.status == ProjectStatus::Completed {
            100.0
        } else {
            self.weights.calculate(&record.stages)
        };
        record.updated_ts = record.updated_ts.max(now);
    }
}

fn stage_entry(record: &mut ProjectRecord, name: StageName) -> Result<&mut StageEntry> {
    let id = record.id.clone();
    record
        .stage_mut(name)
        .ok_or_else(|| TrackerError::InvalidStage(format!("{} (missing from project '{}')", name.as_str(), id)))
}

fn sub_stage_entry(entry: &mut StageEntry, sub: SubStageName) -> Result<&mut SubStageEntry> {
    entry
        .sub_stage_mut(sub)
        .ok_or_else(|| TrackerError::InvalidStage(format!("development.{}", sub.as_str())))
}

fn log_line(now: i64, message: &str) -> String {
    let stamp = chrono::DateTime::from_timestamp(now, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| now.to_string());
    format!("[{}] {}", stamp, message)
}

fn duration_between(started: Option<i64>, finished: Option<i64>) -> Option<i64> {
    match (started, finished) {
        (Some(start), Some(end)) => Some((end - start).max(0)),
        _ => None,
    }
}

/// Complete every stage before `target` that is not already completed
fn catch_up(record: &mut ProjectRecord, target: StageName, now: i64) {
    for entry in record.stages.iter_mut() {
        if entry.name.order() < target.order() && entry.status != StageStatus::Completed {
            complete_stage(entry, now);
            entry.logs.push(log_line(now, "completed by catch-up"));
        }
    }
}

fn start_stage(entry: &mut StageEntry, now: i64) {
    entry.status = StageStatus::Running;
    entry.started_ts.get_or_insert(now);
    entry.completed_ts = None;
    entry.duration_secs = None;
    entry.error = None;
    entry.logs.push(log_line(now, "started"));
}

/// A completed compound stage carries completed sub-stages
fn complete_stage(entry: &mut StageEntry, now: i64) {
    entry.status = StageStatus::Completed;
    let completed = *entry.completed_ts.get_or_insert(now);
    entry.duration_secs = duration_between(entry.started_ts, Some(completed));
    entry.error = None;
    if let Some(subs) = entry.sub_stages.as_mut() {
        for sub in subs.iter_mut().filter(|s| s.status != StageStatus::Completed) {
            complete_sub_stage(sub, now);
        }
    }
    entry.logs.push(log_line(now, "completed"));
}

fn fail_stage(entry: &mut StageEntry, message: &str, now: i64) {
    entry.status = StageStatus::Failed;
    let failed = entry.completed_ts.map_or(now, |ts| ts.max(now));
    entry.completed_ts = Some(failed);
    entry.duration_secs = duration_between(entry.started_ts, Some(failed));
    entry.error = Some(message.to_string());
    entry.logs.push(log_line(now, &format!("failed: {}", message)));
}

fn start_sub_stage(sub: &mut SubStageEntry, now: i64) {
    sub.status = StageStatus::Running;
    sub.started_ts.get_or_insert(now);
    sub.completed_ts = None;
}

fn complete_sub_stage(sub: &mut SubStageEntry, now: i64) {
    sub.status = StageStatus::Completed;
    sub.completed_ts.get_or_insert(now);
}

fn fail_sub_stage(sub: &mut SubStageEntry, now: i64) {
    sub.status = StageStatus::Failed;
    sub.completed_ts = Some(sub.completed_ts.map_or(now, |ts| ts.max(now)));
}

fn finish_project(record: &mut ProjectRecord, now: i64) {
    record.status = ProjectStatus::Completed;
    record.completed_ts.get_or_insert(now);
}
