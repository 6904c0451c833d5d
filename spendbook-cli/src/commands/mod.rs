//! CLI command implementations

pub mod history;
pub mod import;
pub mod list;
pub mod logs;
pub mod migrate;
pub mod report;
pub mod status;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use spendbook_core::services::{LogEvent, LoggingService};
use spendbook_core::SpendbookContext;

/// Environment variable overriding the data directory
const DATA_DIR_ENV: &str = "SPENDBOOK_DIR";

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    match LoggingService::new(&data_dir, env!("CARGO_PKG_VERSION")) {
        Ok(logger) => Some(logger),
        Err(e) => {
            tracing::debug!(error = %e, "event log unavailable");
            None
        }
    }
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        if let Err(e) = l.log(event) {
            tracing::debug!(error = %e, "failed to write event log");
        }
    }
}

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".spendbook"))
        .ok_or_else(|| anyhow!("Could not find home directory; set {}", DATA_DIR_ENV))
}

/// Get or create spendbook context
pub fn get_context() -> Result<SpendbookContext> {
    let data_dir = get_data_dir()?;

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    SpendbookContext::new(&data_dir).context("Failed to initialize spendbook context")
}

/// Error message plus its cause chain, for the event log
pub fn error_details(error: &(dyn std::error::Error + 'static)) -> Option<String> {
    let mut causes = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    (!causes.is_empty()).then(|| causes.join(": "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "outer")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_error_details_collects_causes() {
        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        assert_eq!(error_details(&err), Some("disk gone".to_string()));
    }

    #[test]
    fn test_error_details_without_cause() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "plain");
        assert_eq!(error_details(&err), None);
    }

    #[test]
    fn test_log_event_without_logger_is_noop() {
        log_event(&None, LogEvent::new("report_generated"));
    }
}
