// Core data models for pipetrack
// These structs represent the domain entities

pub mod stage;
pub mod project;
pub mod dashboard;

pub use stage::*;
pub use project::*;
pub use dashboard::*;
