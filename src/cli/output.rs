// Output formatting utilities

use std::io::IsTerminal;
use crate::models::{
    DashboardView, ProjectRecord, ProjectStatus, StageName, StageRef, StageStatus, SubStageName,
};
use crate::progress::ProgressWeights;
use crate::utils::date::format_timestamp;
use crate::utils::duration::{format_duration, format_duration_short};
use crate::utils::glyph::status_glyph;

// ANSI escape codes
const ANSI_BOLD: &str = "\x1b[1m";
const ANSI_RESET: &str = "\x1b[0m";
const ANSI_FG_RED: &str = "\x1b[31m";
const ANSI_FG_GREEN: &str = "\x1b[32m";
const ANSI_FG_YELLOW: &str = "\x1b[33m";
const ANSI_FG_BRIGHT_BLACK: &str = "\x1b[90m";

const BAR_WIDTH: usize = 30;
const MIN_NOTE_WIDTH: usize = 12;

/// Check if stdout is a terminal (TTY)
pub fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}

/// Colors are used only on a terminal, and never when NO_COLOR is set
pub fn colors_enabled() -> bool {
    is_tty() && std::env::var_os("NO_COLOR").is_none()
}

/// Get terminal width dynamically
///
/// Uses the `terminal_size` crate, with fallback to the COLUMNS environment
/// variable and a default.
pub fn get_terminal_width() -> usize {
    if let Some((terminal_size::Width(w), _)) = terminal_size::terminal_size() {
        if w > 0 {
            return w as usize;
        }
    }

    if let Ok(cols) = std::env::var("COLUMNS") {
        if let Ok(width) = cols.parse::<usize>() {
            if width > 0 && width < 10000 {
                return width;
            }
        }
    }

    120
}

#[derive(Debug, Clone, Copy)]
pub struct DashboardOptions {
    pub width: usize,
    pub color: bool,
}

impl DashboardOptions {
    /// Options for the current stdout
    pub fn detect() -> Self {
        Self {
            width: get_terminal_width(),
            color: colors_enabled(),
        }
    }
}

fn bold(text: &str, color: bool) -> String {
    if color {
        format!("{}{}{}", ANSI_BOLD, text, ANSI_RESET)
    } else {
        text.to_string()
    }
}

fn stage_color(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Completed => ANSI_FG_GREEN,
        StageStatus::Failed => ANSI_FG_RED,
        StageStatus::Running => ANSI_FG_YELLOW,
        StageStatus::Pending => ANSI_FG_BRIGHT_BLACK,
    }
}

fn project_color(status: ProjectStatus) -> &'static str {
    match status {
        ProjectStatus::Completed => ANSI_FG_GREEN,
        ProjectStatus::Failed => ANSI_FG_RED,
        ProjectStatus::Building => ANSI_FG_YELLOW,
        ProjectStatus::Pending | ProjectStatus::Paused => ANSI_FG_BRIGHT_BLACK,
    }
}

/// Pad first, then color, so escape codes do not disturb alignment
fn paint(text: &str, width: usize, ansi: &str, color: bool) -> String {
    let padded = format!("{:<width$}", text, width = width);
    if color {
        format!("{}{}{}", ansi, padded, ANSI_RESET)
    } else {
        padded
    }
}

/// Truncate by character count to avoid cutting multi-byte chars
fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let truncated: String = text.chars().take(width.saturating_sub(2)).collect();
    format!("{}..", truncated)
}

/// `[###########-------------------] 37.5%`
pub fn format_progress_bar(progress: f64, width: usize) -> String {
    let progress = progress.clamp(0.0, 100.0);
    let filled = ((progress / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("[{}{}] {:.1}%", "#".repeat(filled), "-".repeat(width - filled), progress)
}

fn format_tokens(input: Option<u64>, output: Option<u64>) -> String {
    match (input, output) {
        (None, None) => String::new(),
        (input, output) => format!(
            "{}/{}",
            input.map(format_count).unwrap_or_else(|| "-".to_string()),
            output.map(format_count).unwrap_or_else(|| "-".to_string())
        ),
    }
}

/// Compact count: 950, 12.5K, 1.2M
pub fn format_count(count: u64) -> String {
    if count >= 1_000_000_000 {
        format!("{:.1}B", count as f64 / 1e9)
    } else if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1e6)
    } else if count >= 10_000 {
        format!("{:.1}K", count as f64 / 1e3)
    } else {
        count.to_string()
    }
}

/// Full dashboard: header block, then one row per stage with sub-stages indented
pub fn format_dashboard(view: &DashboardView, options: &DashboardOptions) -> String {
    let color = options.color;
    let mut output = String::new();

    let title = match &view.name {
        Some(name) => format!("Project {}: {}", view.project_id, name),
        None => format!("Project {}", view.project_id),
    };
    output.push_str(&bold(&title, color));
    output.push('\n');
    output.push_str(&format!("Requirement: {}\n", view.requirement));
    if view.tags.is_empty() {
        output.push_str(&format!("Requester:   {}\n", view.requester));
    } else {
        output.push_str(&format!("Requester:   {}    Tags: {}\n", view.requester, view.tags.join(", ")));
    }
    let status = view.status.as_str();
    output.push_str(&format!(
        "Status:      {}\n",
        paint(status, status.len(), project_color(view.status), color)
    ));
    output.push_str(&format!(
        "Progress:    {}  ({}/{} stages)\n",
        format_progress_bar(view.progress, BAR_WIDTH),
        view.completed_stages,
        view.total_stages
    ));
    output.push_str(&format!("Created:     {}\n", format_timestamp(view.created_ts)));
    output.push_str(&format!("Updated:     {}\n", format_timestamp(view.updated_ts)));
    if let Some(completed) = view.completed_ts {
        output.push_str(&format!("Completed:   {}\n", format_timestamp(completed)));
    }

    let mut metrics = Vec::new();
    if let Some(elapsed) = view.metrics.elapsed_secs {
        metrics.push(format!("Elapsed: {}", format_duration(elapsed)));
    }
    let tokens = format_tokens(view.metrics.input_tokens, view.metrics.output_tokens);
    if !tokens.is_empty() {
        metrics.push(format!("Tokens (in/out): {}", tokens));
    }
    if let Some(calls) = view.metrics.tool_calls {
        metrics.push(format!("Tool calls: {}", calls));
    }
    if let Some(tools) = view.tool_count {
        metrics.push(format!("Tools: {}", tools));
    }
    if !metrics.is_empty() {
        output.push_str(&format!("Metrics:     {}\n", metrics.join("  ")));
    }
    if let Some(cost) = &view.metrics.cost {
        let mut line = format!("Cost:        {:.2} {}", cost.total, cost.currency);
        let parts: Vec<String> = [("input", cost.input), ("output", cost.output)]
            .iter()
            .filter_map(|(label, amount)| amount.map(|a| format!("{} {:.2}", label, a)))
            .collect();
        if !parts.is_empty() {
            line.push_str(&format!(" ({})", parts.join(", ")));
        }
        output.push_str(&line);
        output.push('\n');
    }
    if let Some(error) = &view.error {
        let line = format!("Error:       [{}] {}", error.stage, error.message);
        output.push_str(&paint(&line, 0, ANSI_FG_RED, color));
        output.push('\n');
    }
    output.push('\n');
    output.push_str(&format_stage_table(view, options));
    output
}

fn format_stage_table(view: &DashboardView, options: &DashboardOptions) -> String {
    let color = options.color;
    let name_width = view
        .stages
        .iter()
        .flat_map(|stage| {
            std::iter::once(stage.display_name.chars().count())
                .chain(stage.sub_stages.iter().map(|sub| sub.display_name.chars().count() + 2))
        })
        .max()
        .unwrap_or(5)
        .max("Stage".len());
    let status_width = "completed".len();
    let duration_width = 10;
    let tokens_width = 15;

    // glyph (2 cols) + space, then columns separated by two spaces
    let fixed = 3 + name_width + 2 + status_width + 2 + duration_width + 2 + tokens_width + 2;
    let note_width = options.width.saturating_sub(fixed).max(MIN_NOTE_WIDTH);

    let mut output = String::new();
    let header = format!(
        "   {:<name_width$}  {:<status_width$}  {:<duration_width$}  {:<tokens_width$}  {}",
        "Stage",
        "Status",
        "Duration",
        "Tokens in/out",
        "Note",
        name_width = name_width,
        status_width = status_width,
        duration_width = duration_width,
        tokens_width = tokens_width,
    );
    output.push_str(&bold(header.trim_end(), color));
    output.push('\n');

    for stage in &view.stages {
        let note = stage
            .error
            .as_deref()
            .or(stage.description.as_deref())
            .or(stage.efficiency.as_deref())
            .unwrap_or("");
        let duration = stage.duration_secs.map(format_duration_short).unwrap_or_default();
        let line = format!(
            "{} {:<name_width$}  {}  {:<duration_width$}  {:<tokens_width$}  {}",
            status_glyph(stage.status),
            stage.display_name,
            paint(stage.status.as_str(), status_width, stage_color(stage.status), color),
            duration,
            format_tokens(stage.input_tokens, stage.output_tokens),
            truncate(note, note_width),
            name_width = name_width,
            duration_width = duration_width,
            tokens_width = tokens_width,
        );
        output.push_str(line.trim_end());
        output.push('\n');

        for sub in &stage.sub_stages {
            let label = format!("  {}", sub.display_name);
            let note = if sub.artifacts.is_empty() {
                String::new()
            } else {
                sub.artifacts.join(", ")
            };
            let line = format!(
                "{} {:<name_width$}  {}  {:<duration_width$}  {:<tokens_width$}  {}",
                status_glyph(sub.status),
                label,
                paint(sub.status.as_str(), status_width, stage_color(sub.status), color),
                "",
                "",
                truncate(&note, note_width),
                name_width = name_width,
                duration_width = duration_width,
                tokens_width = tokens_width,
            );
            output.push_str(line.trim_end());
            output.push('\n');
        }
    }
    output
}

/// Pipeline stages with their weights
pub fn format_stage_list(weights: &ProgressWeights) -> String {
    let mut output = String::new();
    output.push_str(&format!("{:<3} {:<24} {:<24} {:>6}\n", "#", "Key", "Name", "Weight"));
    for stage in StageName::ALL {
        output.push_str(&format!(
            "{:<3} {:<24} {:<24} {:>6.1}\n",
            stage.order() + 1,
            stage.as_str(),
            stage.display_name(),
            weights.stage_weight(stage)
        ));
        if stage.is_compound() {
            for sub in SubStageName::ALL {
                let key = format!("{}.{}", stage.as_str(), sub.as_str());
                output.push_str(&format!(
                    "    {:<24} {:<24} {:>5.0}%\n",
                    key,
                    sub.display_name(),
                    weights.sub_stage_fraction(sub) * 100.0
                ));
            }
        }
    }
    output
}

/// One-line summary after a state change
pub fn format_transition(record: &ProjectRecord, target: &StageRef) -> String {
    let status = match target {
        StageRef::Stage(name) => record.stage(*name).map(|s| s.status),
        StageRef::SubStage(sub) => record
            .stage(StageName::Development)
            .and_then(|dev| dev.sub_stage(*sub))
            .map(|s| s.status),
    };
    let mut line = format!(
        "Stage '{}' is {} for project '{}' (progress {:.1}%)",
        target,
        status.map(|s| s.as_str()).unwrap_or("unknown"),
        record.id,
        record.progress
    );
    match record.status {
        ProjectStatus::Completed => line.push_str(&format!("\nProject '{}' completed", record.id)),
        ProjectStatus::Failed => line.push_str(&format!("\nProject '{}' failed", record.id)),
        _ => {}
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CostEstimate, ErrorInfo};

    fn plain() -> DashboardOptions {
        DashboardOptions { width: 100, color: false }
    }

    fn view() -> DashboardView {
        let mut record = ProjectRecord::new("p1", "Build X", "u1", vec!["demo".to_string()]);
        record.name = Some("Inventory bot".to_string());
        record.progress = 37.5;
        record.completed_stages = 3;
        DashboardView::from_record(&record)
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(format_progress_bar(0.0, 10), "[----------] 0.0%");
        assert_eq!(format_progress_bar(50.0, 10), "[#####-----] 50.0%");
        assert_eq!(format_progress_bar(100.0, 10), "[##########] 100.0%");
        assert_eq!(format_progress_bar(250.0, 4), "[####] 100.0%");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(950), "950");
        assert_eq!(format_count(12_500), "12.5K");
        assert_eq!(format_count(1_234_567), "1.2M");
    }

    #[test]
    fn test_dashboard_header_and_rows() {
        let mut view = view();
        view.metrics.tool_calls = Some(87);
        view.metrics.cost = Some(CostEstimate { total: 12.34, currency: "USD".to_string(), input: Some(8.0), output: None });
        let text = format_dashboard(&view, &plain());

        assert!(text.starts_with("Project p1: Inventory bot\n"));
        assert!(text.contains("Tags: demo"));
        assert!(text.contains("37.5%  (3/6 stages)"));
        assert!(text.contains("Tool calls: 87"));
        assert!(text.contains("Cost:        12.34 USD (input 8.00)"));
        assert!(text.contains("Requirements Analysis"));
        assert!(text.contains("⬜   Tool Generation"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_dashboard_shows_error_note() {
        let mut view = view();
        view.stages[2].status = StageStatus::Failed;
        view.stages[2].error = Some("model refused".to_string());
        view.error = Some(ErrorInfo { stage: "architecture".to_string(), message: "model refused".to_string(), occurred_ts: 0 });
        let text = format_dashboard(&view, &plain());
        assert!(text.contains("Error:       [architecture] model refused"));
        assert!(text.contains("❌ System Architecture"));
    }

    #[test]
    fn test_colors_only_when_asked() {
        let colored = format_dashboard(&view(), &DashboardOptions { width: 100, color: true });
        assert!(colored.contains(ANSI_RESET));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer note", 8), "a much..");
    }

    #[test]
    fn test_stage_list() {
        let text = format_stage_list(&ProgressWeights::default());
        assert!(text.contains("development.tools"));
        assert!(text.contains("Deployment"));
        assert!(text.contains("45.0"));
        assert!(text.contains("40%"));
    }

    #[test]
    fn test_transition_line() {
        let mut record = ProjectRecord::new("p1", "Build X", "u1", vec![]);
        record.stages[3].status = StageStatus::Running;
        record.progress = 37.5;
        let line = format_transition(&record, &StageRef::Stage(StageName::Design));
        assert_eq!(line, "Stage 'design' is running for project 'p1' (progress 37.5%)");

        record.status = ProjectStatus::Completed;
        let line = format_transition(&record, &StageRef::Stage(StageName::Design));
        assert!(line.ends_with("Project 'p1' completed"));
    }
}
