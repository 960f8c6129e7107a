use std::sync::Arc;
use clap::{Parser, Subcommand};
use anyhow::{Context, Result};

use crate::cli::error::{validate_non_empty, validate_project_id, validate_tag};
use crate::cli::output::{format_dashboard, format_stage_list, format_transition, DashboardOptions};
use crate::config::Config;
use crate::dashboard::{DashboardAggregator, DirArtifactStore};
use crate::progress::ProgressWeights;
use crate::store::{shared_sqlite, RecordStore, RetryingStore};
use crate::tracker::{parse_stage, PipelineTracker};

#[derive(Parser)]
#[command(name = "pipetrack")]
#[command(about = "Pipeline Tracker - track build pipeline stages, progress and dashboards")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a project with every stage pending (resets an existing one)
    Init {
        /// Natural-language requirement
        #[arg(required = true)]
        requirement: Vec<String>,
        /// Who asked for the build
        #[arg(long)]
        requester: String,
        /// Project id (defaults to a new UUID)
        #[arg(long)]
        id: Option<String>,
        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
    /// Mark a stage running (earlier stages are completed)
    Start {
        id: String,
        /// Stage key, or development.<tools|agent|tests>
        stage: String,
    },
    /// Mark a stage completed
    Complete {
        id: String,
        /// Stage key, or development.<tools|agent|tests>
        stage: String,
    },
    /// Mark a stage failed, failing the project
    Fail {
        id: String,
        /// Stage key, or development.<tools|agent|tests>
        stage: String,
        /// Failure message
        #[arg(required = true, allow_hyphen_values = true)]
        message: Vec<String>,
    },
    /// Force-complete every stage and the project
    Finish {
        id: String,
    },
    /// Show the merged dashboard for a project
    Show {
        id: String,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// List pipeline stages and their weights
    Stages,
}

/// Store-backed services shared by the commands
struct App {
    tracker: PipelineTracker,
    dashboard: DashboardAggregator,
}

impl App {
    fn open(config: &Config) -> Result<Self> {
        let sqlite = shared_sqlite(&config.data_location)
            .with_context(|| format!("Failed to open record store: {}", config.data_location.display()))?;
        let store: Arc<dyn RecordStore> = Arc::new(RetryingStore::new(sqlite, config.retry));
        let artifacts = Arc::new(DirArtifactStore::new(&config.artifacts_location));
        Ok(Self {
            tracker: PipelineTracker::with_policy(Arc::clone(&store), config.retry),
            dashboard: DashboardAggregator::new(store, artifacts),
        })
    }
}

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .try_init();
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    if let Commands::Stages = cli.command {
        print!("{}", format_stage_list(&ProgressWeights::default()));
        return Ok(());
    }

    let config = Config::load()?;
    log::debug!("using record store {}", config.data_location.display());
    let app = App::open(&config)?;

    match cli.command {
        Commands::Init { requirement, requester, id, tags, name } => {
            handle_init(&app, &requirement.join(" "), &requester, id, &tags, name.as_deref())
        }
        Commands::Start { id, stage } => {
            let target = parse_stage(&stage)?;
            let record = app.tracker.mark_stage_running(&id, &stage)?;
            println!("{}", format_transition(&record, &target));
            Ok(())
        }
        Commands::Complete { id, stage } => {
            let target = parse_stage(&stage)?;
            let record = app.tracker.mark_stage_completed(&id, &stage)?;
            println!("{}", format_transition(&record, &target));
            Ok(())
        }
        Commands::Fail { id, stage, message } => {
            let target = parse_stage(&stage)?;
            let message = message.join(" ");
            validate_non_empty(&message, "Failure message").map_err(anyhow::Error::msg)?;
            let record = app.tracker.mark_stage_failed(&id, &stage, &message)?;
            println!("{}", format_transition(&record, &target));
            Ok(())
        }
        Commands::Finish { id } => {
            let record = app.tracker.mark_project_completed(&id)?;
            println!("Project '{}' completed (progress {:.1}%)", record.id, record.progress);
            Ok(())
        }
        Commands::Show { id, json } => handle_show(&app, &id, json),
        Commands::Stages => Ok(()),
    }
}

fn handle_init(
    app: &App,
    requirement: &str,
    requester: &str,
    id: Option<String>,
    tags: &[String],
    name: Option<&str>,
) -> Result<()> {
    validate_non_empty(requirement, "Requirement").map_err(anyhow::Error::msg)?;
    validate_non_empty(requester, "Requester").map_err(anyhow::Error::msg)?;
    for tag in tags {
        validate_tag(tag).map_err(anyhow::Error::msg)?;
    }
    let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    validate_project_id(&id).map_err(anyhow::Error::msg)?;

    let record = app.tracker.initialize(&id, requirement.trim(), requester.trim(), tags)?;
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        app.tracker.rename(&record.id, Some(name))?;
    }
    println!("{}", record.id);
    Ok(())
}

fn handle_show(app: &App, id: &str, json: bool) -> Result<()> {
    let view = app.dashboard.get_dashboard(id)?;
    if json {
        let text = serde_json::to_string_pretty(&view).context("Failed to encode dashboard")?;
        println!("{}", text);
    } else {
        print!("{}", format_dashboard(&view, &DashboardOptions::detect()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_init_with_interleaved_options() {
        let cli = Cli::try_parse_from([
            "pipetrack", "init", "Build", "an", "inventory", "bot", "--requester", "u1", "--tag", "demo", "--id", "p1",
        ])
        .unwrap();
        match cli.command {
            Commands::Init { requirement, requester, id, tags, name } => {
                assert_eq!(requirement.join(" "), "Build an inventory bot");
                assert_eq!(requester, "u1");
                assert_eq!(id.as_deref(), Some("p1"));
                assert_eq!(tags, vec!["demo".to_string()]);
                assert_eq!(name, None);
            }
            _ => panic!("expected init"),
        }
    }

    #[test]
    fn test_parse_fail_message() {
        let cli = Cli::try_parse_from(["pipetrack", "fail", "p1", "design", "diagram", "rejected"]).unwrap();
        match cli.command {
            Commands::Fail { id, stage, message } => {
                assert_eq!(id, "p1");
                assert_eq!(stage, "design");
                assert_eq!(message.join(" "), "diagram rejected");
            }
            _ => panic!("expected fail"),
        }
    }

    #[test]
    fn test_init_requires_requester() {
        assert!(Cli::try_parse_from(["pipetrack", "init", "Build X"]).is_err());
    }
}
