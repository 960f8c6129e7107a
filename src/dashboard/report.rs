//! Free-form progress report (`PROGRESS.md`) parser.
//!
//! Two parts are recognized, both optional:
//! - summary lines of the form `- **Label**: value`
//! - a markdown table whose header row starts with `Stage`
//!
//! Everything else is ignored. A field that is present but unreadable is
//! dropped with a warning rather than failing the whole report.

use std::sync::OnceLock;
use regex::Regex;

use crate::dashboard::ParseError;
use crate::models::{CostEstimate, RunMetrics, StageName, StageRef, StageStatus, SubStageName};
use crate::utils::duration::parse_duration;
use crate::utils::glyph::parse_status_glyph;
use crate::utils::units::{parse_money, parse_scaled_count};

/// One row of the report's stage table
#[derive(Debug, Clone, PartialEq)]
pub struct ReportStageRow {
    pub target: StageRef,
    pub status: StageStatus,
    pub duration_secs: Option<i64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub efficiency: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressReport {
    pub metrics: RunMetrics,
    pub stages: Vec<ReportStageRow>,
}

fn summary_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*+]\s*)?\*\*(?P<label>[^*]+?)\s*:?\s*\*\*\s*:?\s*(?P<value>.*?)\s*$")
            .expect("summary pattern is valid")
    })
}

fn cost_part() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?P<part>input|output)\s*:\s*(?P<amount>[$€£]?\s*[\d.,]+[KMB]?)")
            .expect("cost pattern is valid")
    })
}

fn separator_cell() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^:?-{2,}:?$").expect("separator pattern is valid"))
}

/// Column positions taken from the table header
#[derive(Debug, Default)]
struct Columns {
    stage: usize,
    status: Option<usize>,
    duration: Option<usize>,
    input_tokens: Option<usize>,
    output_tokens: Option<usize>,
    efficiency: Option<usize>,
}

impl Columns {
    fn from_header(cells: &[String]) -> Option<Self> {
        let mut columns = Columns::default();
        let mut saw_stage = false;
        for (i, cell) in cells.iter().enumerate() {
            match cell.to_lowercase().as_str() {
                "stage" | "phase" => {
                    columns.stage = i;
                    saw_stage = true;
                }
                "status" | "state" => columns.status = Some(i),
                "duration" | "time" | "elapsed" => columns.duration = Some(i),
                "input tokens" | "input" | "tokens in" => columns.input_tokens = Some(i),
                "output tokens" | "output" | "tokens out" => columns.output_tokens = Some(i),
                "efficiency" => columns.efficiency = Some(i),
                _ => {}
            }
        }
        saw_stage.then_some(columns)
    }
}

/// Parse a progress report.
///
/// Fails only when nothing at all was recognized.
pub fn parse_report(text: &str) -> Result<ProgressReport, ParseError> {
    let mut report = ProgressReport::default();
    let mut columns: Option<Columns> = None;
    let mut recognized = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('|') {
            let cells = split_row(trimmed);
            if cells.iter().all(|c| separator_cell().is_match(c)) {
                continue;
            }
            if let Some(header) = Columns::from_header(&cells) {
                columns = Some(header);
                recognized = true;
                continue;
            }
            if let Some(cols) = &columns {
                if let Some(row) = parse_row(cols, &cells) {
                    report.stages.push(row);
                }
            }
            continue;
        }

        columns = None;
        if let Some(caps) = summary_line().captures(trimmed) {
            recognized |= apply_summary(&mut report.metrics, &caps["label"], &caps["value"]);
        }
    }

    if !recognized {
        return Err(ParseError::NoContent("progress report"));
    }
    Ok(report)
}

fn split_row(line: &str) -> Vec<String> {
    let inner = line.trim_start_matches('|').trim_end_matches('|');
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

/// A cell that is blank or a placeholder dash
fn is_blank(cell: &str) -> bool {
    matches!(cell, "" | "-" | "—" | "n/a" | "N/A")
}

fn cell<'a>(cells: &'a [String], index: Option<usize>) -> Option<&'a str> {
    index
        .and_then(|i| cells.get(i))
        .map(String::as_str)
        .filter(|c| !is_blank(c))
}

fn parse_row(columns: &Columns, cells: &[String]) -> Option<ReportStageRow> {
    let label = cells.get(columns.stage)?;
    let target = match StageName::from_label(label) {
        Some(stage) => StageRef::Stage(stage),
        None => match SubStageName::from_label(label) {
            Some(sub) => StageRef::SubStage(sub),
            None => {
                log::debug!("progress report: ignoring unknown stage row '{}'", label);
                return None;
            }
        },
    };

    let status = cell(cells, columns.status).map_or(StageStatus::Pending, parse_status_glyph);
    let duration_secs = cell(cells, columns.duration).and_then(|value| {
        parse_duration(value)
            .map_err(|err| log::warn!("progress report: {} duration: {}", label, err))
            .ok()
    });
    let input_tokens = cell(cells, columns.input_tokens).and_then(|value| count_field(label, "input tokens", value));
    let output_tokens = cell(cells, columns.output_tokens).and_then(|value| count_field(label, "output tokens", value));
    let efficiency = cell(cells, columns.efficiency).map(str::to_string);

    Some(ReportStageRow {
        target,
        status,
        duration_secs,
        input_tokens,
        output_tokens,
        efficiency,
    })
}

fn count_field(context: &str, field: &str, value: &str) -> Option<u64> {
    let parsed = parse_scaled_count(value);
    if parsed.is_none() {
        log::warn!("progress report: {} {}: cannot read '{}'", context, field, value);
    }
    parsed
}

/// Apply one summary line. Returns whether the label was one we know.
fn apply_summary(metrics: &mut RunMetrics, label: &str, value: &str) -> bool {
    let label = label.trim().trim_end_matches(':').to_lowercase();
    match label.as_str() {
        "elapsed" | "elapsed time" | "total time" | "duration" => {
            metrics.elapsed_secs = parse_duration(value)
                .map_err(|err| log::warn!("progress report: elapsed: {}", err))
                .ok()
                .or(metrics.elapsed_secs);
        }
        "input tokens" => metrics.input_tokens = count_field("summary", "input tokens", value).or(metrics.input_tokens),
        "output tokens" => {
            metrics.output_tokens = count_field("summary", "output tokens", value).or(metrics.output_tokens)
        }
        "tool calls" => metrics.tool_calls = count_field("summary", "tool calls", value).or(metrics.tool_calls),
        "estimated cost" | "cost" | "total cost" => match parse_cost(value) {
            Some(cost) => metrics.cost = Some(cost),
            None => log::warn!("progress report: cannot read cost '{}'", value),
        },
        _ => return false,
    }
    true
}

/// `$12.34 USD (input: $8.00, output: $4.34)`
fn parse_cost(value: &str) -> Option<CostEstimate> {
    let head = value.split('(').next().unwrap_or(value);
    let (total, currency) = parse_money(head)?;

    let mut cost = CostEstimate {
        total,
        currency,
        input: None,
        output: None,
    };
    for caps in cost_part().captures_iter(value) {
        let amount = parse_money(&caps["amount"]).map(|(amount, _)| amount);
        match caps["part"].to_lowercase().as_str() {
            "input" => cost.input = amount,
            _ => cost.output = amount,
        }
    }
    Some(cost)
}
