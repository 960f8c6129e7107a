// Best-effort error handling shared by the tracker and dashboard

use std::fmt::Display;

/// Log a failed best-effort operation at warn and carry on.
///
/// Returns the value on success so callers can still use it when present.
pub fn record_and_continue<T, E: Display>(context: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("{}: {}", context, err);
            None
        }
    }
}
