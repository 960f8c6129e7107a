use serde::Serialize;
use crate::models::project::{ErrorInfo, ProjectRecord, ProjectStatus};
use crate::models::stage::{StageEntry, StageName, StageStatus, SubStageEntry, SubStageName};

/// Which inputs contributed to a dashboard view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Record,
    Report,
    StatusDocument,
    Config,
}

/// Estimated spend as stated by the progress report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub total: f64,
    pub currency: String,
    pub input: Option<f64>,
    pub output: Option<f64>,
}

/// Aggregate run metrics from the progress report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMetrics {
    pub elapsed_secs: Option<i64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub tool_calls: Option<u64>,
    pub cost: Option<CostEstimate>,
}

impl RunMetrics {
    pub fn is_empty(&self) -> bool {
        *self == RunMetrics::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubStageView {
    pub name: SubStageName,
    pub display_name: String,
    pub status: StageStatus,
    pub artifacts: Vec<String>,
    pub started_ts: Option<i64>,
    pub completed_ts: Option<i64>,
}

impl From<&SubStageEntry> for SubStageView {
    fn from(entry: &SubStageEntry) -> Self {
        Self {
            name: entry.name,
            display_name: entry.name.display_name().to_string(),
            status: entry.status,
            artifacts: entry.artifacts.clone(),
            started_ts: entry.started_ts,
            completed_ts: entry.completed_ts,
        }
    }
}

/// One stage row of the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageView {
    pub name: StageName,
    pub display_name: String,
    pub order: usize,
    pub status: StageStatus,
    pub started_ts: Option<i64>,
    pub completed_ts: Option<i64>,
    pub duration_secs: Option<i64>,
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub description: Option<String>,
    pub artifacts: Vec<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub efficiency: Option<String>,
    pub sub_stages: Vec<SubStageView>,
}

impl From<&StageEntry> for StageView {
    fn from(entry: &StageEntry) -> Self {
        Self {
            name: entry.name,
            display_name: entry.display_name().to_string(),
            order: entry.order(),
            status: entry.status,
            started_ts: entry.started_ts,
            completed_ts: entry.completed_ts,
            duration_secs: entry.duration_secs,
            error: entry.error.clone(),
            logs: entry.logs.clone(),
            description: None,
            artifacts: Vec::new(),
            input_tokens: None,
            output_tokens: None,
            efficiency: None,
            sub_stages: entry
                .sub_stages
                .as_ref()
                .map(|subs| subs.iter().map(SubStageView::from).collect())
                .unwrap_or_default(),
        }
    }
}

/// Read-only, merged presentation of a project. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub project_id: String,
    pub name: Option<String>,
    pub requirement: String,
    pub requester: String,
    pub tags: Vec<String>,
    pub status: ProjectStatus,
    pub progress: f64,
    pub completed_stages: u32,
    pub total_stages: u32,
    pub stages: Vec<StageView>,
    pub metrics: RunMetrics,
    pub tool_count: Option<u64>,
    pub error: Option<ErrorInfo>,
    pub created_ts: i64,
    pub updated_ts: i64,
    pub completed_ts: Option<i64>,
    pub sources: Vec<SourceKind>,
}

impl DashboardView {
    /// Baseline view straight from the record, with no artifact input
    pub fn from_record(record: &ProjectRecord) -> Self {
        Self {
            project_id: record.id.clone(),
            name: record.name.clone(),
            requirement: record.requirement.clone(),
            requester: record.requester.clone(),
            tags: record.tags.clone(),
            status: record.status,
            progress: record.progress,
            completed_stages: record.completed_stages,
            total_stages: record.total_stages,
            stages: record.stages.iter().map(StageView::from).collect(),
            metrics: RunMetrics::default(),
            tool_count: None,
            error: record.error.clone(),
            created_ts: record.created_ts,
            updated_ts: record.updated_ts,
            completed_ts: record.completed_ts,
            sources: vec![SourceKind::Record],
        }
    }

    pub fn stage_mut(&mut self, name: StageName) -> Option<&mut StageView> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    pub fn stage(&self, name: StageName) -> Option<&StageView> {
        self.stages.iter().find(|s| s.name == name)
    }
}
