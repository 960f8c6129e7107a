use serde::{Deserialize, Serialize};
use crate::models::stage::{StageEntry, StageName, StageStatus};

/// Project status (lifecycle state)
///
/// - Pending: record exists, pipeline not started
/// - Building: pipeline in progress
/// - Paused: held by an external control request
/// - Completed / Failed: terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Pending,
    Building,
    Paused,
    Completed,
    Failed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::Building => "building",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProjectStatus::Pending),
            "building" => Some(ProjectStatus::Building),
            "paused" => Some(ProjectStatus::Paused),
            "completed" => Some(ProjectStatus::Completed),
            "failed" => Some(ProjectStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Failure annotation attached to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub stage: String,
    pub message: String,
    pub occurred_ts: i64,
}

/// Project record as held by the record store.
///
/// `stages` is always the full pipeline in order, indexed by `StageName::order()`.
/// `version` is bumped by the store on every write and is what conditional
/// writes compare against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub name: Option<String>,
    pub requirement: String,
    pub requester: String,
    pub tags: Vec<String>,
    pub status: ProjectStatus,
    pub progress: f64,
    pub stages: Vec<StageEntry>,
    pub total_stages: u32,
    pub completed_stages: u32,
    pub error: Option<ErrorInfo>,
    pub created_ts: i64,
    pub updated_ts: i64,
    pub completed_ts: Option<i64>,
    pub version: u64,
}

impl ProjectRecord {
    /// Create a fresh record: every stage pending, status building, progress 0
    pub fn new(id: &str, requirement: &str, requester: &str, tags: Vec<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        let stages: Vec<StageEntry> = StageName::ALL.iter().map(|s| StageEntry::new(*s)).collect();
        Self {
            id: id.to_string(),
            name: None,
            requirement: requirement.to_string(),
            requester: requester.to_string(),
            tags,
            status: ProjectStatus::Building,
            progress: 0.0,
            total_stages: stages.len() as u32,
            completed_stages: 0,
            stages,
            error: None,
            created_ts: now,
            updated_ts: now,
            completed_ts: None,
            version: 0,
        }
    }

    pub fn stage(&self, name: StageName) -> Option<&StageEntry> {
        self.stages.get(name.order()).filter(|s| s.name == name)
    }

    pub fn stage_mut(&mut self, name: StageName) -> Option<&mut StageEntry> {
        self.stages.get_mut(name.order()).filter(|s| s.name == name)
    }

    /// Number of stages currently completed
    pub fn count_completed(&self) -> u32 {
        self.stages.iter().filter(|s| s.status == StageStatus::Completed).count() as u32
    }

    pub fn all_stages_completed(&self) -> bool {
        !self.stages.is_empty() && self.stages.iter().all(|s| s.status == StageStatus::Completed)
    }
}
