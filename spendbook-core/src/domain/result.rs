//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
///
/// Duplicates are deliberately absent: a natural-key collision is reported
/// as [`InsertOutcome::AlreadyExists`](crate::domain::InsertOutcome), never
/// as an error.
#[derive(Error, Debug)]
pub enum Error {
    /// A single field could not be parsed (row is skipped, not fatal)
    #[error("Parse error: cannot read {field} from '{value}'")]
    Parse { field: &'static str, value: String },

    /// Required fields are missing, empty or out of range (row is rejected)
    #[error("Validation error: missing or invalid field(s): {}", .fields.join(", "))]
    Validation { fields: Vec<&'static str> },

    /// Connection or transport failure (fatal for the current batch)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    /// The store was opened against a schema that lacks required columns
    #[error("Schema mismatch: table '{table}' is missing column(s): {}", .missing.join(", "))]
    SchemaMismatch { table: String, missing: Vec<String> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a parse error for a named field
    pub fn parse(field: &'static str, value: impl Into<String>) -> Self {
        Self::Parse {
            field,
            value: value.into(),
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_fields() {
        let err = Error::Validation {
            fields: vec!["sender", "receiver"],
        };
        assert_eq!(
            err.to_string(),
            "Validation error: missing or invalid field(s): sender, receiver"
        );
    }

    #[test]
    fn test_schema_mismatch_message() {
        let err = Error::SchemaMismatch {
            table: "bank_transactions".to_string(),
            missing: vec!["sender".to_string()],
        };
        assert!(err.to_string().contains("bank_transactions"));
        assert!(err.to_string().ends_with("sender"));
    }
}
