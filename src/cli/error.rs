// Input validation and error classification for the CLI

use crate::dashboard::DashboardError;
use crate::store::StoreError;
use crate::tracker::TrackerError;

/// Validate that a string is not empty
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} cannot be empty", field_name))
    } else {
        Ok(())
    }
}

/// Validate a project id (alphanumeric, dots, underscores, hyphens).
///
/// Ids double as artifact directory names, so path-like ids are refused.
pub fn validate_project_id(id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err("Project id cannot be empty".to_string());
    }
    if id == "." || id == ".." {
        return Err(format!("Invalid project id: '{}'", id));
    }
    if id.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '_' || c == '-') {
        Ok(())
    } else {
        Err(format!("Invalid project id: '{}'. Project ids can only contain letters, numbers, dots, underscores, and hyphens.", id))
    }
}

/// Validate tag format
pub fn validate_tag(tag: &str) -> Result<(), String> {
    if tag.trim().is_empty() {
        return Err("Tag cannot be empty".to_string());
    }

    // Tag charset: [A-Za-z0-9_\-\.]+
    if tag.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.') {
        Ok(())
    } else {
        Err(format!("Invalid tag: '{}'. Tags can only contain letters, numbers, underscores, hyphens, and dots.", tag))
    }
}

/// Whether an error is a system failure (exit 2) rather than bad input (exit 1)
pub fn is_internal_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(tracker) = cause.downcast_ref::<TrackerError>() {
            return !tracker.is_user_error();
        }
        if let Some(dashboard) = cause.downcast_ref::<DashboardError>() {
            return !dashboard.is_user_error();
        }
        if let Some(store) = cause.downcast_ref::<StoreError>() {
            return !matches!(store, StoreError::NotFound(_));
        }
        cause.is::<rusqlite::Error>() || cause.is::<std::io::Error>()
    })
}
