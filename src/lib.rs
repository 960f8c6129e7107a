//! Pipetrack (Pipeline Tracker) - state tracking for multi-stage build pipelines
//!
//! This library provides the core functionality for Pipetrack, including:
//! - A stage state machine applied as versioned read-modify-write against a record store
//! - A weighted progress calculator
//! - Dashboard aggregation of the stored snapshot with report, status and config artifacts
//! - SQLite and in-memory record stores with retry and conflict handling
//! - CLI command parsing and execution
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pipetrack::store::MemoryStore;
//! use pipetrack::tracker::PipelineTracker;
//!
//! let tracker = PipelineTracker::new(Arc::new(MemoryStore::new()));
//! tracker.initialize("p1", "Build an inventory bot", "u1", &[]).unwrap();
//! let record = tracker.mark_stage_running("p1", "design").unwrap();
//! assert_eq!(record.completed_stages, 3);
//! ```

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod models;
pub mod progress;
pub mod store;
pub mod tracker;
pub mod utils;
