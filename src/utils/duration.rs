// Duration parsing and formatting

use anyhow::Result;

/// Parse a duration expression and return seconds.
///
/// Accepts unit runs with optional whitespace: `30s`, `10m`, `1h30m`,
/// `1h 2m 3s`, `2d 4h`. A bare number is seconds.
pub fn parse_duration(expr: &str) -> Result<i64> {
    let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        anyhow::bail!("Invalid duration format: '{}'", expr);
    }
    if let Ok(secs) = compact.parse::<i64>() {
        if secs < 0 {
            anyhow::bail!("Duration cannot be negative: '{}'", expr);
        }
        return Ok(secs);
    }

    let mut total_secs = 0i64;
    let mut digits = String::new();
    for c in compact.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let multiplier = match c.to_ascii_lowercase() {
            'd' => 86400,
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => anyhow::bail!("Invalid duration format: '{}'", expr),
        };
        let value: i64 = digits
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration format: '{}'", expr))?;
        total_secs = match value.checked_mul(multiplier).and_then(|secs| total_secs.checked_add(secs)) {
            Some(total) => total,
            None => anyhow::bail!("Duration out of range: '{}'", expr),
        };
        digits.clear();
    }
    if !digits.is_empty() {
        anyhow::bail!("Invalid duration format: '{}' (missing unit)", expr);
    }

    Ok(total_secs)
}

/// Format duration for display (e.g., "1h 2m 3s", "2m 10s", "15s")
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Format duration for narrow columns (e.g., "2h30m", "45m", "15s")
pub fn format_duration_short(secs: i64) -> String {
    let secs = secs.max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h{}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}
