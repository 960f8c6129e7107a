// Status glyph recognition for report tables

use crate::models::StageStatus;

const SUCCESS_MARKERS: &[&str] = &["✅", "✔", "✓", "☑", "🟢"];
const FAILURE_MARKERS: &[&str] = &["❌", "✗", "✘", "✖", "🔴", "⛔"];
const RUNNING_MARKERS: &[&str] = &["⏳", "⌛", "🔄", "▶", "🚧", "🟡"];

const SUCCESS_WORDS: &[&str] = &["done", "complete", "completed", "success", "succeeded", "passed", "ok"];
const FAILURE_WORDS: &[&str] = &["failed", "failure", "error", "errored", "broken"];
const RUNNING_WORDS: &[&str] = &["running", "inprogress", "started", "active", "building"];

/// Map a status cell to a stage status. Never fails: unrecognized text is pending.
///
/// Marker sets are checked success, failure, then in-progress.
pub fn parse_status_glyph(cell: &str) -> StageStatus {
    let words = words(cell);
    let matches = |markers: &[&str], vocabulary: &[&str]| {
        markers.iter().any(|m| cell.contains(m)) || words.iter().any(|w| vocabulary.contains(&w.as_str()))
    };

    if matches(SUCCESS_MARKERS, SUCCESS_WORDS) {
        StageStatus::Completed
    } else if matches(FAILURE_MARKERS, FAILURE_WORDS) {
        StageStatus::Failed
    } else if matches(RUNNING_MARKERS, RUNNING_WORDS) {
        StageStatus::Running
    } else {
        StageStatus::Pending
    }
}

/// Glyph used when rendering a status
pub fn status_glyph(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Completed => "✅",
        StageStatus::Failed => "❌",
        StageStatus::Running => "⏳",
        StageStatus::Pending => "⬜",
    }
}

/// Lowercase words; "in progress" and "in_progress" collapse to "inprogress"
fn words(cell: &str) -> Vec<String> {
    let lowered = cell.to_lowercase().replace("in progress", "inprogress").replace("in_progress", "inprogress");
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glyphs() {
        assert_eq!(parse_status_glyph("✅"), StageStatus::Completed);
        assert_eq!(parse_status_glyph("⏳"), StageStatus::Running);
        assert_eq!(parse_status_glyph("❌"), StageStatus::Failed);
        assert_eq!(parse_status_glyph("✅ Done"), StageStatus::Completed);
    }

    #[test]
    fn test_words() {
        assert_eq!(parse_status_glyph("Completed"), StageStatus::Completed);
        assert_eq!(parse_status_glyph("FAILED"), StageStatus::Failed);
        assert_eq!(parse_status_glyph("In Progress"), StageStatus::Running);
        assert_eq!(parse_status_glyph("in_progress"), StageStatus::Running);
        assert_eq!(parse_status_glyph("incomplete"), StageStatus::Pending);
    }

    #[test]
    fn test_unknown_is_pending() {
        assert_eq!(parse_status_glyph("🤷"), StageStatus::Pending);
        assert_eq!(parse_status_glyph(""), StageStatus::Pending);
        assert_eq!(parse_status_glyph("-"), StageStatus::Pending);
    }

    #[test]
    fn test_success_checked_before_failure() {
        assert_eq!(parse_status_glyph("✅ ❌"), StageStatus::Completed);
        assert_eq!(parse_status_glyph("❌ ⏳"), StageStatus::Failed);
    }
}
