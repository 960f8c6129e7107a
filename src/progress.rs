//! Weighted progress calculator.
//!
//! Pure: the result depends only on the stage list and the weight table.

use std::collections::HashMap;
use crate::models::{StageEntry, StageName, StageStatus, SubStageEntry, SubStageName};

/// Credit given to a running non-compound stage
const RUNNING_CREDIT: f64 = 0.5;

/// Stage weights and compound sub-stage fractions
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressWeights {
    pub stages: HashMap<StageName, f64>,
    pub sub_stages: HashMap<SubStageName, f64>,
}

impl Default for ProgressWeights {
    fn default() -> Self {
        Self {
            stages: StageName::ALL.iter().map(|s| (*s, s.weight())).collect(),
            sub_stages: SubStageName::ALL.iter().map(|s| (*s, s.fraction())).collect(),
        }
    }
}

impl ProgressWeights {
    pub fn stage_weight(&self, name: StageName) -> f64 {
        self.stages.get(&name).copied().unwrap_or(0.0)
    }

    pub fn sub_stage_fraction(&self, name: SubStageName) -> f64 {
        self.sub_stages.get(&name).copied().unwrap_or(0.0)
    }

    /// Progress in [0, 100] for an ordered stage list
    pub fn calculate(&self, stages: &[StageEntry]) -> f64 {
        let total: f64 = stages.iter().map(|stage| self.stage_contribution(stage)).sum();
        total.clamp(0.0, 100.0)
    }

    /// Weighted contribution of a single stage
    pub fn stage_contribution(&self, stage: &StageEntry) -> f64 {
        let weight = self.stage_weight(stage.name);
        match stage.status {
            StageStatus::Completed => weight,
            StageStatus::Pending | StageStatus::Failed => 0.0,
            StageStatus::Running => match &stage.sub_stages {
                Some(subs) if stage.name.is_compound() => weight * self.sub_stage_credit(subs),
                _ => weight * RUNNING_CREDIT,
            },
        }
    }

    /// Σ(fraction_i * credit_i) over the compound stage's sub-stages
    fn sub_stage_credit(&self, subs: &[SubStageEntry]) -> f64 {
        subs.iter()
            .map(|sub| {
                let credit = match sub.status {
                    StageStatus::Completed => 1.0,
                    StageStatus::Running => RUNNING_CREDIT,
                    StageStatus::Pending | StageStatus::Failed => 0.0,
                };
                self.sub_stage_fraction(sub.name) * credit
            })
            .sum()
    }
}

/// Progress using the reference weight table
pub fn calculate_progress(stages: &[StageEntry]) -> f64 {
    ProgressWeights::default().calculate(stages)
}
