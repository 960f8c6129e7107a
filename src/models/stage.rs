use serde::{Deserialize, Serialize};

/// Stage status (shared by stages and sub-stages)
///
/// Lifecycle: pending -> running -> {completed, failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StageStatus::Pending),
            "running" => Some(StageStatus::Running),
            "completed" => Some(StageStatus::Completed),
            "failed" => Some(StageStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The fixed, ordered set of pipeline stages.
///
/// Declaration order is pipeline order; `ALL` mirrors it for iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Orchestration,
    Requirements,
    Architecture,
    Design,
    Development,
    Deployment,
}

impl StageName {
    pub const ALL: [StageName; 6] = [
        StageName::Orchestration,
        StageName::Requirements,
        StageName::Architecture,
        StageName::Design,
        StageName::Development,
        StageName::Deployment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Orchestration => "orchestration",
            StageName::Requirements => "requirements",
            StageName::Architecture => "architecture",
            StageName::Design => "design",
            StageName::Development => "development",
            StageName::Deployment => "deployment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "orchestration" => Some(StageName::Orchestration),
            "requirements" => Some(StageName::Requirements),
            "architecture" => Some(StageName::Architecture),
            "design" => Some(StageName::Design),
            "development" => Some(StageName::Development),
            "deployment" => Some(StageName::Deployment),
            _ => None,
        }
    }

    /// Match a stage by key or display name, ignoring case and separators.
    /// Used for free-form artifact labels ("Requirements Analysis", "DEPLOYMENT").
    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = normalize_label(label);
        if wanted.is_empty() {
            return None;
        }
        Self::ALL.iter().copied().find(|stage| {
            normalize_label(stage.as_str()) == wanted || normalize_label(stage.display_name()) == wanted
        })
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StageName::Orchestration => "Orchestration",
            StageName::Requirements => "Requirements Analysis",
            StageName::Architecture => "System Architecture",
            StageName::Design => "Detailed Design",
            StageName::Development => "Development",
            StageName::Deployment => "Deployment",
        }
    }

    /// Zero-based position in the pipeline
    pub fn order(&self) -> usize {
        match self {
            StageName::Orchestration => 0,
            StageName::Requirements => 1,
            StageName::Architecture => 2,
            StageName::Design => 3,
            StageName::Development => 4,
            StageName::Deployment => 5,
        }
    }

    /// Reference progress weight; the pipeline total is 100.
    pub fn weight(&self) -> f64 {
        match self {
            StageName::Orchestration => 5.0,
            StageName::Requirements => 10.0,
            StageName::Architecture => 15.0,
            StageName::Design => 15.0,
            StageName::Development => 45.0,
            StageName::Deployment => 10.0,
        }
    }

    /// Only development is tracked at sub-stage granularity.
    pub fn is_compound(&self) -> bool {
        matches!(self, StageName::Development)
    }

    pub fn is_last(&self) -> bool {
        self.order() == Self::ALL.len() - 1
    }
}

/// Sub-stages of the compound development stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubStageName {
    Tools,
    Agent,
    Tests,
}

impl SubStageName {
    pub const ALL: [SubStageName; 3] = [SubStageName::Tools, SubStageName::Agent, SubStageName::Tests];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubStageName::Tools => "tools",
            SubStageName::Agent => "agent",
            SubStageName::Tests => "tests",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "tools" => Some(SubStageName::Tools),
            "agent" => Some(SubStageName::Agent),
            "tests" => Some(SubStageName::Tests),
            _ => None,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = normalize_label(label);
        Self::ALL.iter().copied().find(|sub| {
            normalize_label(sub.as_str()) == wanted || normalize_label(sub.display_name()) == wanted
        })
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SubStageName::Tools => "Tool Generation",
            SubStageName::Agent => "Agent Assembly",
            SubStageName::Tests => "Test Suite",
        }
    }

    /// Share of the development weight; the three fractions sum to 1.0.
    pub fn fraction(&self) -> f64 {
        match self {
            SubStageName::Tools => 0.40,
            SubStageName::Agent => 0.30,
            SubStageName::Tests => 0.30,
        }
    }

    pub fn order(&self) -> usize {
        match self {
            SubStageName::Tools => 0,
            SubStageName::Agent => 1,
            SubStageName::Tests => 2,
        }
    }
}

/// A parsed stage argument: either a pipeline stage or `development.<sub>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRef {
    Stage(StageName),
    SubStage(SubStageName),
}

impl StageRef {
    /// Parse `"design"`, `"development.tools"` or `"development/tools"`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        if let Some((parent, child)) = s.split_once(|c: char| c == '.' || c == '/') {
            if StageName::from_str(parent)? != StageName::Development {
                return None;
            }
            return SubStageName::from_str(child).map(StageRef::SubStage);
        }
        StageName::from_str(&s).map(StageRef::Stage)
    }

    /// The top-level stage this reference lives under
    pub fn stage(&self) -> StageName {
        match self {
            StageRef::Stage(name) => *name,
            StageRef::SubStage(_) => StageName::Development,
        }
    }
}

impl std::fmt::Display for StageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageRef::Stage(name) => write!(f, "{}", name.as_str()),
            StageRef::SubStage(sub) => write!(f, "development.{}", sub.as_str()),
        }
    }
}

fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubStageEntry {
    pub name: SubStageName,
    pub status: StageStatus,
    #[serde(default)]
    pub artifacts: Vec<String>,
    pub started_ts: Option<i64>,
    pub completed_ts: Option<i64>,
}

impl SubStageEntry {
    pub fn new(name: SubStageName) -> Self {
        Self {
            name,
            status: StageStatus::Pending,
            artifacts: Vec::new(),
            started_ts: None,
            completed_ts: None,
        }
    }
}

/// One stage of a project's snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEntry {
    pub name: StageName,
    pub status: StageStatus,
    pub started_ts: Option<i64>,
    pub completed_ts: Option<i64>,
    pub duration_secs: Option<i64>,
    pub error: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    /// Present only for the compound stage
    pub sub_stages: Option<Vec<SubStageEntry>>,
}

impl StageEntry {
    /// Create a pending stage. Sub-stages are attached only to the compound stage.
    pub fn new(name: StageName) -> Self {
        let sub_stages = if name.is_compound() {
            Some(SubStageName::ALL.iter().map(|s| SubStageEntry::new(*s)).collect())
        } else {
            None
        };
        Self {
            name,
            status: StageStatus::Pending,
            started_ts: None,
            completed_ts: None,
            duration_secs: None,
            error: None,
            logs: Vec::new(),
            sub_stages,
        }
    }

    pub fn display_name(&self) -> &'static str {
        self.name.display_name()
    }

    pub fn order(&self) -> usize {
        self.name.order()
    }

    pub fn sub_stage(&self, name: SubStageName) -> Option<&SubStageEntry> {
        self.sub_stages.as_ref()?.iter().find(|s| s.name == name)
    }

    pub fn sub_stage_mut(&mut self, name: SubStageName) -> Option<&mut SubStageEntry> {
        self.sub_stages.as_mut()?.iter_mut().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_conversion() {
        for status in [StageStatus::Pending, StageStatus::Running, StageStatus::Completed, StageStatus::Failed] {
            assert_eq!(StageStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(StageStatus::from_str("done"), None);
        assert!(StageStatus::Failed.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
    }

    #[test]
    fn test_pipeline_order_and_weights() {
        let total: f64 = StageName::ALL.iter().map(|s| s.weight()).sum();
        assert_eq!(total, 100.0);
        for (i, stage) in StageName::ALL.iter().enumerate() {
            assert_eq!(stage.order(), i);
            assert_eq!(StageName::from_str(stage.as_str()), Some(*stage));
        }
        assert!(StageName::Deployment.is_last());
        assert!(!StageName::Development.is_last());
    }

    #[test]
    fn test_sub_stage_fractions_sum_to_one() {
        let total: f64 = SubStageName::ALL.iter().map(|s| s.fraction()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_label() {
        assert_eq!(StageName::from_label("Requirements Analysis"), Some(StageName::Requirements));
        assert_eq!(StageName::from_label("DEPLOYMENT"), Some(StageName::Deployment));
        assert_eq!(StageName::from_label("system_architecture"), Some(StageName::Architecture));
        assert_eq!(StageName::from_label("Lunch"), None);
        assert_eq!(StageName::from_label(""), None);
        assert_eq!(SubStageName::from_label("Tool Generation"), Some(SubStageName::Tools));
    }

    #[test]
    fn test_stage_ref_parse() {
        assert_eq!(StageRef::parse("design"), Some(StageRef::Stage(StageName::Design)));
        assert_eq!(StageRef::parse("Development.Tools"), Some(StageRef::SubStage(SubStageName::Tools)));
        assert_eq!(StageRef::parse("development/tests"), Some(StageRef::SubStage(SubStageName::Tests)));
        assert_eq!(StageRef::parse("design.tools"), None);
        assert_eq!(StageRef::parse("development.lint"), None);
        assert_eq!(StageRef::parse("stage9"), None);
        assert_eq!(StageRef::SubStage(SubStageName::Agent).to_string(), "development.agent");
    }

    #[test]
    fn test_only_compound_stage_has_sub_stages() {
        for stage in StageName::ALL {
            let entry = StageEntry::new(stage);
            assert_eq!(entry.sub_stages.is_some(), stage.is_compound());
        }
        let dev = StageEntry::new(StageName::Development);
        assert_eq!(dev.sub_stages.as_ref().unwrap().len(), 3);
        assert!(dev.sub_stage(SubStageName::Agent).is_some());
    }
}
