//! Dashboard aggregation.
//!
//! A [`DashboardView`] starts from the record store snapshot and is then
//! overlaid, in increasing precedence, with the progress report, the status
//! document and the config document. A source only overwrites a field when it
//! has a value for it. Nothing here writes back to the store.

pub mod artifacts;
pub mod config_doc;
pub mod report;
pub mod status_doc;

pub use artifacts::{ArtifactKind, ArtifactStore, DirArtifactStore, NoArtifacts};
pub use config_doc::{parse_config_document, ConfigDocument};
pub use report::{parse_report, ProgressReport, ReportStageRow};
pub use status_doc::{parse_status_document, StageDocument, StatusDocument};

use std::sync::Arc;
use thiserror::Error;

use crate::errors::record_and_continue;
use crate::models::{
    DashboardView, ProjectRecord, RunMetrics, SourceKind, StageName, StageRef, StageStatus, StageView,
    SubStageName, SubStageView,
};
use crate::store::{RecordStore, StoreError};
use crate::utils::date::latest;

/// Why an artifact could not be used. Never surfaces from `get_dashboard`.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} has no recognizable content")]
    NoContent(&'static str),
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("project '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Store(StoreError),
}

impl DashboardError {
    pub fn is_user_error(&self) -> bool {
        matches!(self, DashboardError::NotFound(_))
    }
}

impl From<StoreError> for DashboardError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => DashboardError::NotFound(id),
            other => DashboardError::Store(other),
        }
    }
}

/// Parsed artifacts for one project; `None` means the source is absent or unusable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactSet {
    pub report: Option<ProgressReport>,
    pub status: Option<StatusDocument>,
    pub config: Option<ConfigDocument>,
}

pub struct DashboardAggregator {
    store: Arc<dyn RecordStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl DashboardAggregator {
    pub fn new(store: Arc<dyn RecordStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { store, artifacts }
    }

    /// Merged view of a project. Fails only when the record is missing or the
    /// store fails; unreadable artifacts are skipped with a warning.
    pub fn get_dashboard(&self, id: &str) -> Result<DashboardView, DashboardError> {
        let record = self
            .store
            .get(id)?
            .ok_or_else(|| DashboardError::NotFound(id.to_string()))?;
        let artifacts = self.load_artifacts(id);
        Ok(merge(&record, &artifacts))
    }

    pub fn load_artifacts(&self, id: &str) -> ArtifactSet {
        ArtifactSet {
            report: self.load(id, ArtifactKind::Report, parse_report),
            status: self.load(id, ArtifactKind::StatusDocument, parse_status_document),
            config: self.load(id, ArtifactKind::Config, parse_config_document),
        }
    }

    fn load<T>(&self, id: &str, kind: ArtifactKind, parse: fn(&str) -> Result<T, ParseError>) -> Option<T> {
        let read = self.artifacts.read(id, kind);
        let text = record_and_continue(&format!("cannot read {} for project '{}'", kind.file_name(), id), read)??;
        record_and_continue(&format!("ignoring {} for project '{}'", kind.file_name(), id), parse(&text))
    }
}

/// Merge a snapshot with its artifacts. Pure and deterministic.
pub fn merge(record: &ProjectRecord, artifacts: &ArtifactSet) -> DashboardView {
    let mut view = DashboardView::from_record(record);
    let mut stage_signal = false;
    let mut progress_candidates = vec![record.progress];

    if let Some(report) = &artifacts.report {
        stage_signal |= apply_report(&mut view, report);
        view.sources.push(SourceKind::Report);
    }
    if let Some(status) = &artifacts.status {
        stage_signal |= apply_status_document(&mut view, status);
        if let Some(progress) = &status.progress {
            progress_candidates.extend(progress.percentage());
            progress_candidates.extend(progress.ratio_percentage());
        }
        view.sources.push(SourceKind::StatusDocument);
    }
    if let Some(config) = &artifacts.config {
        apply_config(&mut view, config);
        view.sources.push(SourceKind::Config);
    }

    if stage_signal {
        view.total_stages = view.stages.len() as u32;
        view.completed_stages = view.stages.iter().filter(|s| s.status == StageStatus::Completed).count() as u32;
        if view.total_stages > 0 {
            progress_candidates.push(view.completed_stages as f64 / view.total_stages as f64 * 100.0);
        }
    } else if let Some((completed, total)) = artifacts.status.as_ref().and_then(|s| s.progress.as_ref()?.counts()) {
        view.completed_stages = completed;
        view.total_stages = total;
    }

    view.progress = progress_candidates.into_iter().fold(0.0, f64::max).clamp(0.0, 100.0);
    view
}

fn overlay_metrics(target: &mut RunMetrics, source: &RunMetrics) {
    target.elapsed_secs = source.elapsed_secs.or(target.elapsed_secs);
    target.input_tokens = source.input_tokens.or(target.input_tokens);
    target.output_tokens = source.output_tokens.or(target.output_tokens);
    target.tool_calls = source.tool_calls.or(target.tool_calls);
    if source.cost.is_some() {
        target.cost = source.cost.clone();
    }
}

fn sub_stage_view(view: &mut DashboardView, sub: SubStageName) -> Option<&mut SubStageView> {
    view.stage_mut(StageName::Development)?
        .sub_stages
        .iter_mut()
        .find(|s| s.name == sub)
}

/// Returns whether the report carried any stage status
fn apply_report(view: &mut DashboardView, report: &ProgressReport) -> bool {
    overlay_metrics(&mut view.metrics, &report.metrics);

    let mut signal = false;
    for row in &report.stages {
        match row.target {
            StageRef::Stage(name) => {
                let Some(stage) = view.stage_mut(name) else { continue };
                if row.status != StageStatus::Pending {
                    stage.status = row.status;
                    signal = true;
                }
                stage.duration_secs = row.duration_secs.or(stage.duration_secs);
                stage.input_tokens = row.input_tokens.or(stage.input_tokens);
                stage.output_tokens = row.output_tokens.or(stage.output_tokens);
                if row.efficiency.is_some() {
                    stage.efficiency = row.efficiency.clone();
                }
            }
            StageRef::SubStage(sub) => {
                let Some(entry) = sub_stage_view(view, sub) else { continue };
                if row.status != StageStatus::Pending {
                    entry.status = row.status;
                    signal = true;
                }
            }
        }
    }
    signal
}

/// Returns whether the document carried any stage status
fn apply_status_document(view: &mut DashboardView, doc: &StatusDocument) -> bool {
    if let Some(updated) = latest([Some(view.updated_ts), doc.updated_ts()]) {
        view.updated_ts = updated;
    }

    let mut signal = false;
    for (key, entry) in &doc.stages {
        let Some(name) = StageName::from_label(key) else {
            log::debug!("status document: ignoring unknown stage '{}'", key);
            continue;
        };
        let Some(stage) = view.stage_mut(name) else { continue };
        signal |= apply_stage_document(stage, entry);
    }
    signal
}

fn apply_stage_document(stage: &mut StageView, entry: &StageDocument) -> bool {
    let mut signal = false;
    if let Some(status) = entry.status() {
        stage.status = status;
        signal = true;
    }
    if let Some(description) = entry.description() {
        stage.description = Some(description.to_string());
    }
    if !entry.artifacts.is_empty() {
        stage.artifacts = entry.artifacts.clone();
    }
    stage.started_ts = latest([stage.started_ts, entry.started_ts()]);
    stage.completed_ts = latest([stage.completed_ts, entry.completed_ts()]);

    for (key, sub_entry) in &entry.sub_stages {
        let Some(sub) = SubStageName::from_label(key) else { continue };
        let Some(view) = stage.sub_stages.iter_mut().find(|s| s.name == sub) else { continue };
        if let Some(status) = sub_entry.status() {
            view.status = status;
            signal = true;
        }
        if !sub_entry.artifacts.is_empty() {
            view.artifacts = sub_entry.artifacts.clone();
        }
        view.started_ts = latest([view.started_ts, sub_entry.started_ts()]);
        view.completed_ts = latest([view.completed_ts, sub_entry.completed_ts()]);
    }
    signal
}

/// Descriptive fallbacks only
fn apply_config(view: &mut DashboardView, config: &ConfigDocument) {
    if view.name.is_none() {
        view.name = config.name().map(str::to_string);
    }
    view.tool_count = config.tool_count().or(view.tool_count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectStatus;
    use crate::store::{MemoryStore, PermanentKind, WriteCondition};
    use tempfile::TempDir;

    fn record_at(progress: f64) -> ProjectRecord {
        let mut record = ProjectRecord::new("p1", "Build X", "u1", vec!["demo".to_string()]);
        record.progress = progress;
        record.updated_ts = 1_700_000_000;
        record
    }

    fn status_doc(json: &str) -> StatusDocument {
        parse_status_document(json).unwrap()
    }

    #[test]
    fn test_identity_without_artifacts() {
        let mut record = record_at(37.5);
        record.stages[0].status = StageStatus::Completed;
        record.completed_stages = 1;
        let view = merge(&record, &ArtifactSet::default());
        assert_eq!(view, DashboardView::from_record(&record));
        assert_eq!(view.sources, vec![SourceKind::Record]);
    }

    #[test]
    fn test_document_percentage_beats_lower_baseline() {
        let record = record_at(60.0);
        let artifacts = ArtifactSet {
            status: Some(status_doc(r#"{"progress": {"percentage": 80}}"#)),
            ..Default::default()
        };
        assert_eq!(merge(&record, &artifacts).progress, 80.0);
    }

    #[test]
    fn test_baseline_beats_lower_document_percentage() {
        let record = record_at(60.0);
        let artifacts = ArtifactSet {
            status: Some(status_doc(r#"{"progress": {"percentage": 40, "completed": 1, "total": 6}}"#)),
            ..Default::default()
        };
        assert_eq!(merge(&record, &artifacts).progress, 60.0);
    }

    #[test]
    fn test_document_counter_fills_counts_without_stage_signal() {
        let record = record_at(0.0);
        let doc = status_doc(r#"{"progress": {"completed": 5, "total": 6}}"#);
        let view = merge(&record, &ArtifactSet { status: Some(doc), ..Default::default() });
        assert_eq!(view.completed_stages, 5);
        assert_eq!(view.total_stages, 6);
        assert!((view.progress - 500.0 / 6.0).abs() < 1e-9);

        // A stage signal recounts from the merged stages instead
        let doc = status_doc(r#"{"stages": {"orchestration": {"completed": true}}, "progress": {"completed": 5, "total": 6}}"#);
        let view = merge(&record, &ArtifactSet { status: Some(doc), ..Default::default() });
        assert_eq!(view.completed_stages, 1);
        assert_eq!(view.total_stages, 6);
    }

    #[test]
    fn test_merged_ratio_counts_only_with_stage_signal() {
        let record = record_at(0.0);
        let doc = status_doc(
            r#"{"stages": {"orchestration": {"status": "completed"}, "requirements": {"completed": true},
                           "architecture": {"status": "completed"}}}"#,
        );
        let view = merge(&record, &ArtifactSet { status: Some(doc), ..Default::default() });
        assert_eq!(view.completed_stages, 3);
        assert_eq!(view.progress, 50.0);

        // Pending-only rows carry no stage signal
        let quiet = status_doc(r#"{"stages": {"design": {"status": "pending"}}}"#);
        let view = merge(&record, &ArtifactSet { status: Some(quiet), ..Default::default() });
        assert_eq!(view.progress, 0.0);
        assert_eq!(view.completed_stages, 0);
    }

    #[test]
    fn test_status_document_overrides_report() {
        let record = record_at(10.0);
        let report = parse_report(
            "| Stage | Status |\n|---|---|\n| Detailed Design | ⏳ |\n| Deployment | ✅ |\n- **Tool Calls**: 5\n",
        )
        .unwrap();
        let doc = status_doc(r#"{"stages": {"design": {"status": "failed", "description": "Rejected"}}}"#);
        let view = merge(&record, &ArtifactSet { report: Some(report), status: Some(doc), config: None });

        let design = view.stage(StageName::Design).unwrap();
        assert_eq!(design.status, StageStatus::Failed);
        assert_eq!(design.description.as_deref(), Some("Rejected"));
        assert_eq!(view.stage(StageName::Deployment).unwrap().status, StageStatus::Completed);
        assert_eq!(view.metrics.tool_calls, Some(5));
        assert_eq!(view.sources, vec![SourceKind::Record, SourceKind::Report, SourceKind::StatusDocument]);
    }

    #[test]
    fn test_absent_values_never_overwrite() {
        let mut record = record_at(20.0);
        record.stages[1].status = StageStatus::Completed;
        record.stages[1].duration_secs = Some(42);
        let report = parse_report("| Stage | Status | Duration |\n|---|---|---|\n| Requirements | - | - |\n").unwrap();
        let view = merge(&record, &ArtifactSet { report: Some(report), ..Default::default() });

        let requirements = view.stage(StageName::Requirements).unwrap();
        assert_eq!(requirements.status, StageStatus::Completed);
        assert_eq!(requirements.duration_secs, Some(42));
        assert_eq!(view.progress, 20.0);
    }

    #[test]
    fn test_timestamps_take_maximum() {
        let mut record = record_at(0.0);
        record.stages[0].started_ts = Some(1_700_000_500);
        let doc = status_doc(
            r#"{"updated_at": "2020-01-01T00:00:00Z",
                "stages": {"orchestration": {"started_at": 1700000100, "completed_at": "garbage"}}}"#,
        );
        let view = merge(&record, &ArtifactSet { status: Some(doc), ..Default::default() });
        assert_eq!(view.updated_ts, 1_700_000_000);
        let stage = view.stage(StageName::Orchestration).unwrap();
        assert_eq!(stage.started_ts, Some(1_700_000_500));
        assert_eq!(stage.completed_ts, None);

        let later = status_doc(r#"{"updated_at": 1800000000}"#);
        let view = merge(&record, &ArtifactSet { status: Some(later), ..Default::default() });
        assert_eq!(view.updated_ts, 1_800_000_000);
    }

    #[test]
    fn test_sub_stage_overlay() {
        let record = record_at(0.0);
        let doc = status_doc(
            r#"{"stages": {"development": {"sub_stages": {"tools": {"completed": true, "artifacts": ["tools.py"]}}}}}"#,
        );
        let view = merge(&record, &ArtifactSet { status: Some(doc), ..Default::default() });
        let dev = view.stage(StageName::Development).unwrap();
        let tools = dev.sub_stages.iter().find(|s| s.name == SubStageName::Tools).unwrap();
        assert_eq!(tools.status, StageStatus::Completed);
        assert_eq!(tools.artifacts, vec!["tools.py".to_string()]);
        assert_eq!(dev.status, StageStatus::Pending);
    }

    #[test]
    fn test_config_is_fallback_only() {
        let mut record = record_at(0.0);
        let config = parse_config_document(r#"{"name": "From config", "tools": ["a", "b", "c"]}"#).unwrap();
        let artifacts = ArtifactSet { config: Some(config), ..Default::default() };

        let view = merge(&record, &artifacts);
        assert_eq!(view.name.as_deref(), Some("From config"));
        assert_eq!(view.tool_count, Some(3));
        assert_eq!(view.progress, 0.0);

        record.name = Some("From record".to_string());
        assert_eq!(merge(&record, &artifacts).name.as_deref(), Some("From record"));
    }

    #[test]
    fn test_merge_is_idempotent_and_deterministic() {
        let record = record_at(25.0);
        let doc = status_doc(r#"{"stages": {"design": {"status": "running", "started_at": 1700000300}}}"#);

        let mut once = DashboardView::from_record(&record);
        apply_status_document(&mut once, &doc);
        let mut twice = once.clone();
        apply_status_document(&mut twice, &doc);
        assert_eq!(once, twice);

        let artifacts = ArtifactSet { status: Some(doc), ..Default::default() };
        assert_eq!(merge(&record, &artifacts), merge(&record, &artifacts));
    }

    #[test]
    fn test_get_dashboard_reads_directory() {
        let temp_dir = TempDir::new().unwrap();
        let project_dir = temp_dir.path().join("p1");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("status.json"), r#"{"progress": {"percentage": 80}}"#).unwrap();
        std::fs::write(project_dir.join("config.json"), "{ this is not json").unwrap();
        std::fs::write(project_dir.join("PROGRESS.md"), "nothing to see").unwrap();

        let store = Arc::new(MemoryStore::new());
        store.put(&record_at(60.0), WriteCondition::Always).unwrap();
        let aggregator = DashboardAggregator::new(store, Arc::new(DirArtifactStore::new(temp_dir.path())));

        let view = aggregator.get_dashboard("p1").unwrap();
        assert_eq!(view.progress, 80.0);
        assert_eq!(view.status, ProjectStatus::Building);
        assert_eq!(view.sources, vec![SourceKind::Record, SourceKind::StatusDocument]);
    }

    #[test]
    fn test_get_dashboard_survives_out_of_range_values() {
        let temp_dir = TempDir::new().unwrap();
        let project_dir = temp_dir.path().join("p1");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(
            project_dir.join("PROGRESS.md"),
            "| Stage | Status | Duration |\n|---|---|---|\n| Detailed Design | ✅ | 200000000000000d |\n",
        )
        .unwrap();
        std::fs::write(project_dir.join("status.json"), r#"{"updated_at": -9223372036854775808}"#).unwrap();

        let store = Arc::new(MemoryStore::new());
        store.put(&record_at(10.0), WriteCondition::Always).unwrap();
        let aggregator = DashboardAggregator::new(store, Arc::new(DirArtifactStore::new(temp_dir.path())));

        let view = aggregator.get_dashboard("p1").unwrap();
        let design = view.stage(StageName::Design).unwrap();
        assert_eq!(design.status, StageStatus::Completed);
        assert_eq!(design.duration_secs, None);
        assert_eq!(view.updated_ts, 1_700_000_000);
    }

    #[test]
    fn test_get_dashboard_missing_project() {
        let aggregator = DashboardAggregator::new(Arc::new(MemoryStore::new()), Arc::new(NoArtifacts));
        let err = aggregator.get_dashboard("ghost").unwrap_err();
        assert!(matches!(err, DashboardError::NotFound(ref id) if id == "ghost"));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_get_dashboard_store_failure() {
        let store = Arc::new(MemoryStore::new());
        store.inject_failure(StoreError::permanent(PermanentKind::AccessDenied, "no"));
        let aggregator = DashboardAggregator::new(store, Arc::new(NoArtifacts));
        assert!(matches!(aggregator.get_dashboard("p1"), Err(DashboardError::Store(_))));
    }
}
