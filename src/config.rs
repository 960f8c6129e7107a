// Configuration file (~/.pipetrack/rc)
//
// key=value lines, '#' comments, unknown keys ignored. Relative paths resolve
// against the directory holding the rc file.

use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use crate::store::RetryPolicy;

const APP_DIR: &str = ".pipetrack";
const RC_FILE: &str = "rc";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite database holding project records
    pub data_location: PathBuf,
    /// Root of the per-project artifact directories
    pub artifacts_location: PathBuf,
    pub retry: RetryPolicy,
}

impl Config {
    /// Defaults for an application directory
    pub fn defaults(app_dir: &Path) -> Self {
        Self {
            data_location: app_dir.join("pipeline.db"),
            artifacts_location: app_dir.join("artifacts"),
            retry: RetryPolicy::default(),
        }
    }

    /// $HOME, falling back to the platform home directory
    pub fn home_dir() -> Result<PathBuf> {
        match std::env::var_os("HOME") {
            Some(home) if !home.is_empty() => Ok(PathBuf::from(home)),
            _ => dirs::home_dir().context("Cannot determine home directory (HOME is not set)"),
        }
    }

    pub fn app_dir() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join(APP_DIR))
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join(RC_FILE))
    }

    /// Load from the rc file under the home directory, or defaults if it does not exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        if !config_path.exists() {
            return Ok(Self::defaults(base_dir));
        }
        let text = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        Self::parse(&text, base_dir).with_context(|| format!("Invalid config file: {}", config_path.display()))
    }

    pub fn parse(text: &str, base_dir: &Path) -> Result<Self> {
        let mut config = Self::defaults(base_dir);
        let mut max_attempts = config.retry.max_attempts;
        let mut base_delay = config.retry.base_delay;
        let mut backoff = config.retry.backoff;

        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                log::warn!("config line {}: ignoring '{}' (expected key=value)", number + 1, line);
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "data.location" => config.data_location = resolve(base_dir, value),
                "artifacts.location" => config.artifacts_location = resolve(base_dir, value),
                "retry.max_attempts" => {
                    max_attempts = parse_value(key, value)?;
                    if max_attempts == 0 {
                        anyhow::bail!("{} must be at least 1", key);
                    }
                }
                "retry.base_delay_ms" => base_delay = Duration::from_millis(parse_value(key, value)?),
                "retry.backoff" => {
                    backoff = parse_value(key, value)?;
                    if !backoff.is_finite() || backoff < 1.0 {
                        anyhow::bail!("{} must be a number >= 1.0, got '{}'", key, value);
                    }
                }
                _ => log::debug!("config: ignoring unknown key '{}'", key),
            }
        }

        config.retry = RetryPolicy::new(max_attempts, base_delay, backoff);
        Ok(config)
    }
}

fn resolve(base_dir: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_relative() {
        base_dir.join(path)
    } else {
        path
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid value for {}: '{}'", key, value))
}
