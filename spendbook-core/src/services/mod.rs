//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on one use case.

pub mod import;
pub mod logging;
pub mod migration;
pub mod normalizer;
mod report;
pub mod status;

pub use import::{
    DetectedColumns, ImportAborted, ImportOptions, ImportResult, ImportService, ImportSummary,
    InvalidRowPolicy, PreviewRow, RejectedRow,
};
pub use logging::{EventCount, LogEntry, LogEvent, LogFilter, LogStats, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use normalizer::{Normalized, RawRow, RecordNormalizer, SkipReason};
pub use report::ReportService;
pub use status::{DateRange, StatusService, StatusSummary};
