//! Structured status document (`status.json`).
//!
//! Every field is optional. Stage and sub-stage keys are matched by key or
//! display name; unknown keys are ignored. Timestamps may be strings in any
//! format `parse_timestamp` accepts, or unix seconds/milliseconds.

use std::collections::BTreeMap;
use serde::Deserialize;
use serde_json::Value;

use crate::dashboard::ParseError;
use crate::models::StageStatus;
use crate::utils::date::parse_timestamp;
use crate::utils::glyph::parse_status_glyph;

/// Unix values above this are taken as milliseconds
const MILLIS_THRESHOLD: u64 = 100_000_000_000;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StatusDocument {
    pub updated_at: Option<Value>,
    pub stages: BTreeMap<String, StageDocument>,
    pub progress: Option<ProgressDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StageDocument {
    pub status: Option<String>,
    pub completed: Option<bool>,
    pub in_progress: Option<bool>,
    pub failed: Option<bool>,
    pub description: Option<String>,
    pub artifacts: Vec<String>,
    pub started_at: Option<Value>,
    pub completed_at: Option<Value>,
    pub sub_stages: BTreeMap<String, StageDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProgressDocument {
    pub completed: Option<Value>,
    pub total: Option<Value>,
    pub percentage: Option<Value>,
}

pub fn parse_status_document(text: &str) -> Result<StatusDocument, ParseError> {
    Ok(serde_json::from_str(text)?)
}

impl StatusDocument {
    pub fn updated_ts(&self) -> Option<i64> {
        self.updated_at.as_ref().and_then(value_timestamp)
    }
}

impl StageDocument {
    /// Status signalled by this entry. Pending is no signal and yields `None`.
    ///
    /// An explicit `status` string wins; otherwise the flags are checked
    /// completed, failed, then in-progress.
    pub fn status(&self) -> Option<StageStatus> {
        let explicit = self.status.as_deref().map(|s| {
            StageStatus::from_str(&s.trim().to_lowercase()).unwrap_or_else(|| parse_status_glyph(s))
        });
        let status = match explicit {
            Some(status) if status != StageStatus::Pending => status,
            _ if self.completed == Some(true) => StageStatus::Completed,
            _ if self.failed == Some(true) => StageStatus::Failed,
            _ if self.in_progress == Some(true) => StageStatus::Running,
            _ => return None,
        };
        Some(status)
    }

    pub fn started_ts(&self) -> Option<i64> {
        self.started_at.as_ref().and_then(value_timestamp)
    }

    pub fn completed_ts(&self) -> Option<i64> {
        self.completed_at.as_ref().and_then(value_timestamp)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }
}

impl ProgressDocument {
    /// Explicit percentage, with or without a trailing `%`
    pub fn percentage(&self) -> Option<f64> {
        self.percentage.as_ref().and_then(value_number)
    }

    /// completed / total as a percentage, when both are present and total > 0
    pub fn ratio_percentage(&self) -> Option<f64> {
        let completed = self.completed.as_ref().and_then(value_number)?;
        let total = self.total.as_ref().and_then(value_number)?;
        (total > 0.0).then(|| completed / total * 100.0)
    }

    /// Whole `(completed, total)` stage counts, when both are present and sane
    pub fn counts(&self) -> Option<(u32, u32)> {
        let completed = self.completed.as_ref().and_then(value_number)?;
        let total = self.total.as_ref().and_then(value_number)?;
        if completed < 0.0 || total <= 0.0 || total > u32::MAX as f64 {
            return None;
        }
        let total = total.round() as u32;
        Some((completed.round().min(total as f64) as u32, total))
    }
}

fn value_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Some(if secs.unsigned_abs() > MILLIS_THRESHOLD { secs / 1000 } else { secs })
        }
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

fn value_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_document() {
        let text = r#"{
            "updated_at": "2024-01-02T03:04:05Z",
            "stages": {
                "requirements": {"status": "completed", "description": "Gathered", "artifacts": ["req.md"]},
                "development": {
                    "in_progress": true,
                    "started_at": 1704164645,
                    "sub_stages": {"tools": {"completed": true}, "agent": {"status": "⏳"}}
                },
                "moon_landing": {"status": "completed"}
            },
            "progress": {"completed": 2, "total": 6, "percentage": "80%"}
        }"#;
        let doc = parse_status_document(text).unwrap();
        assert_eq!(doc.updated_ts(), Some(1704164645));

        let requirements = &doc.stages["requirements"];
        assert_eq!(requirements.status(), Some(StageStatus::Completed));
        assert_eq!(requirements.description(), Some("Gathered"));

        let development = &doc.stages["development"];
        assert_eq!(development.status(), Some(StageStatus::Running));
        assert_eq!(development.started_ts(), Some(1704164645));
        assert_eq!(development.sub_stages["tools"].status(), Some(StageStatus::Completed));
        assert_eq!(development.sub_stages["agent"].status(), Some(StageStatus::Running));

        let progress = doc.progress.unwrap();
        assert_eq!(progress.percentage(), Some(80.0));
        assert!((progress.ratio_percentage().unwrap() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_pending_is_no_signal() {
        let doc = StageDocument {
            status: Some("pending".to_string()),
            ..Default::default()
        };
        assert_eq!(doc.status(), None);
        assert_eq!(StageDocument::default().status(), None);
    }

    #[test]
    fn test_flag_order() {
        let doc = StageDocument {
            completed: Some(true),
            failed: Some(true),
            ..Default::default()
        };
        assert_eq!(doc.status(), Some(StageStatus::Completed));
    }

    #[test]
    fn test_millisecond_timestamps() {
        let doc: StageDocument = serde_json::from_str(r#"{"completed_at": 1704164645000}"#).unwrap();
        assert_eq!(doc.completed_ts(), Some(1704164645));
    }

    #[test]
    fn test_progress_counts() {
        let doc = parse_status_document(r#"{"progress": {"completed": "5", "total": 6}}"#).unwrap();
        assert_eq!(doc.progress.unwrap().counts(), Some((5, 6)));

        let doc = parse_status_document(r#"{"progress": {"completed": 9, "total": 6}}"#).unwrap();
        assert_eq!(doc.progress.unwrap().counts(), Some((6, 6)));

        let doc = parse_status_document(r#"{"progress": {"completed": 1, "total": 0}}"#).unwrap();
        assert_eq!(doc.progress.unwrap().counts(), None);

        let doc = parse_status_document(r#"{"progress": {"completed": -1, "total": 6}}"#).unwrap();
        assert_eq!(doc.progress.unwrap().counts(), None);
    }

    #[test]
    fn test_extreme_numeric_timestamps() {
        let doc: StatusDocument = serde_json::from_str(r#"{"updated_at": -9223372036854775808}"#).unwrap();
        assert_eq!(doc.updated_ts(), Some(i64::MIN / 1000));

        let doc: StageDocument = serde_json::from_str(r#"{"started_at": -1e19, "completed_at": 1e300}"#).unwrap();
        assert_eq!(doc.started_ts(), Some(i64::MIN / 1000));
        assert_eq!(doc.completed_ts(), Some(i64::MAX / 1000));
    }

    #[test]
    fn test_unparsable_values_dropped() {
        let doc: StatusDocument =
            serde_json::from_str(r#"{"updated_at": "whenever", "progress": {"percentage": "most", "total": 0, "completed": 1}}"#)
                .unwrap();
        assert_eq!(doc.updated_ts(), None);
        let progress = doc.progress.unwrap();
        assert_eq!(progress.percentage(), None);
        assert_eq!(progress.ratio_percentage(), None);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(matches!(parse_status_document("{not json"), Err(ParseError::Json(_))));
        assert!(parse_status_document(r#"{"stages": []}"#).is_err());
    }
}
