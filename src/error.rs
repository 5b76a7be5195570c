// ABOUTME: Error taxonomy for the migration pipeline
// ABOUTME: Separates table-scoped failures from migration-fatal ones

use crate::migration::report::MigrationReport;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors raised while migrating a SQLite database into MySQL.
///
/// Every variant except [`MigrationError::Connection`], [`MigrationError::Config`]
/// and [`MigrationError::Cancelled`] is scoped to a single table: the
/// orchestrator records it in the report and moves on.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// A source column type has no MySQL counterpart
    #[error("unsupported source type '{declared}' for column `{table}`.`{column}`")]
    UnsupportedType {
        table: String,
        column: String,
        declared: String,
    },

    /// The destination rejected the table's DDL (duplicate table, reserved word, ...)
    #[error("schema translation failed for table `{table}`: {message}")]
    SchemaTranslation { table: String, message: String },

    /// A value cannot be represented in its destination column type
    #[error("cannot convert row {row} column `{column}` of table `{table}`: {message}")]
    RowConversion {
        table: String,
        row: usize,
        column: String,
        message: String,
    },

    /// The destination rejected an insert
    #[error("write to table `{table}` rejected: {message}")]
    DestinationWrite { table: String, message: String },

    /// Reading one table from the source failed
    #[error("failed to read table `{table}` from source: {message}")]
    SourceRead { table: String, message: String },

    /// Cannot reach, or lost, the source or destination
    #[error("connection error ({endpoint}): {message}")]
    Connection { endpoint: Endpoint, message: String },

    /// Invalid settings
    #[error("configuration error: {0}")]
    Config(String),

    /// Interrupted by the user
    #[error("migration cancelled")]
    Cancelled,
}

/// Which side of the migration a connection error concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Source,
    Destination,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Source => write!(f, "source"),
            Endpoint::Destination => write!(f, "destination"),
        }
    }
}

/// Coarse classification of a [`MigrationError`], as shown in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    UnsupportedType,
    SchemaTranslation,
    RowConversion,
    DestinationWrite,
    SourceRead,
    Connection,
    Config,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedType => "UnsupportedTypeError",
            ErrorKind::SchemaTranslation => "SchemaTranslationError",
            ErrorKind::RowConversion => "RowConversionError",
            ErrorKind::DestinationWrite => "DestinationWriteError",
            ErrorKind::SourceRead => "SourceReadError",
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

impl MigrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrationError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            MigrationError::SchemaTranslation { .. } => ErrorKind::SchemaTranslation,
            MigrationError::RowConversion { .. } => ErrorKind::RowConversion,
            MigrationError::DestinationWrite { .. } => ErrorKind::DestinationWrite,
            MigrationError::SourceRead { .. } => ErrorKind::SourceRead,
            MigrationError::Connection { .. } => ErrorKind::Connection,
            MigrationError::Config(_) => ErrorKind::Config,
            MigrationError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether this error ends the whole run rather than a single table.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrationError::Connection { .. } | MigrationError::Config(_)
        )
    }

    pub fn connection(endpoint: Endpoint, message: impl Into<String>) -> Self {
        MigrationError::Connection {
            endpoint,
            message: message.into(),
        }
    }

    pub fn source_read(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrationError::SourceRead {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn destination_write(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrationError::DestinationWrite {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn schema_translation(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrationError::SchemaTranslation {
            table: table.into(),
            message: message.into(),
        }
    }
}

/// A migration-fatal error together with the report accumulated up to that point.
///
/// Tables that were never reached are already marked "not attempted" in
/// `report`.
#[derive(Error, Debug)]
#[error("migration aborted: {cause}")]
pub struct MigrationAborted {
    #[source]
    pub cause: MigrationError,
    pub report: MigrationReport,
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_and_config_errors_are_fatal() {
        assert!(MigrationError::connection(Endpoint::Destination, "gone").is_fatal());
        assert!(MigrationError::Config("bad".into()).is_fatal());
        assert!(!MigrationError::destination_write("users", "dup key").is_fatal());
        assert!(!MigrationError::schema_translation("users", "exists").is_fatal());
        assert!(!MigrationError::Cancelled.is_fatal());
    }

    #[test]
    fn test_kind_display_uses_taxonomy_names() {
        let err = MigrationError::UnsupportedType {
            table: "t".into(),
            column: "c".into(),
            declared: "".into(),
        };
        assert_eq!(err.kind().to_string(), "UnsupportedTypeError");
        assert!(err.to_string().contains("`t`.`c`"));
    }
}
