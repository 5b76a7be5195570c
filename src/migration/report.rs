// ABOUTME: Per-table outcome report accumulated across a migration run
// ABOUTME: Serialisable to JSON and rendered as a human-readable table

use crate::error::{ErrorKind, MigrationError};
use serde::Serialize;
use std::fmt;

/// Outcome of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    /// Created and every row copied
    Migrated { rows: u64 },
    /// Stopped by a table-scoped error; `rows_written` rows had been committed
    Failed {
        kind: ErrorKind,
        detail: String,
        rows_written: u64,
    },
    /// Never reached because the run ended first
    NotAttempted,
    /// Filtered out by the table filter
    Skipped,
}

/// Schema and row count comparison after the copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Verification {
    Matched {
        rows: u64,
    },
    Mismatched {
        source_rows: u64,
        destination_rows: u64,
    },
    /// Destination columns differ from the translated source table
    SchemaMismatch {
        differences: Vec<String>,
    },
    Failed {
        detail: String,
    },
}

impl Verification {
    pub fn compare(source_rows: u64, destination_rows: u64) -> Self {
        if source_rows == destination_rows {
            Verification::Matched { rows: source_rows }
        } else {
            Verification::Mismatched {
                source_rows,
                destination_rows,
            }
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Verification::Matched { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    #[serde(flatten)]
    pub outcome: TableOutcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
}

impl TableReport {
    fn new(table: impl Into<String>, outcome: TableOutcome) -> Self {
        Self {
            table: table.into(),
            outcome,
            warnings: Vec::new(),
            verification: None,
        }
    }

    /// Migrated (and verified, when verification ran) or skipped.
    pub fn is_success(&self) -> bool {
        let outcome_ok = matches!(
            self.outcome,
            TableOutcome::Migrated { .. } | TableOutcome::Skipped
        );
        let verification_ok = self
            .verification
            .as_ref()
            .map(Verification::is_match)
            .unwrap_or(true);
        outcome_ok && verification_ok
    }

    pub fn rows(&self) -> u64 {
        match self.outcome {
            TableOutcome::Migrated { rows } => rows,
            TableOutcome::Failed { rows_written, .. } => rows_written,
            TableOutcome::NotAttempted | TableOutcome::Skipped => 0,
        }
    }
}

/// Mapping from table name to outcome, in processing order.
///
/// Every source table has exactly one entry from the moment the run plan is
/// known, so an aborted run still enumerates the tables it never reached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub tables: Vec<TableReport>,
    pub cancelled: bool,
}

impl MigrationReport {
    /// Build a report in which every planned table is "not attempted" and
    /// every filtered table is "skipped".
    pub fn planned<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let tables = tables
            .into_iter()
            .map(|(name, included)| {
                let outcome = if included {
                    TableOutcome::NotAttempted
                } else {
                    TableOutcome::Skipped
                };
                TableReport::new(name, outcome)
            })
            .collect();

        Self {
            tables,
            cancelled: false,
        }
    }

    pub fn get(&self, table: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == table)
    }

    pub fn get_mut(&mut self, table: &str) -> Option<&mut TableReport> {
        self.tables.iter_mut().find(|t| t.table == table)
    }

    pub fn record_success(&mut self, table: &str, rows: u64) {
        self.set_outcome(table, TableOutcome::Migrated { rows });
    }

    pub fn record_failure(&mut self, table: &str, error: &MigrationError, rows_written: u64) {
        self.set_outcome(
            table,
            TableOutcome::Failed {
                kind: error.kind(),
                detail: error.to_string(),
                rows_written,
            },
        );
    }

    pub fn add_warning(&mut self, table: &str, warning: impl Into<String>) {
        if let Some(entry) = self.get_mut(table) {
            entry.warnings.push(warning.into());
        }
    }

    pub fn set_verification(&mut self, table: &str, verification: Verification) {
        if let Some(entry) = self.get_mut(table) {
            entry.verification = Some(verification);
        }
    }

    fn set_outcome(&mut self, table: &str, outcome: TableOutcome) {
        match self.get_mut(table) {
            Some(entry) => entry.outcome = outcome,
            None => self.tables.push(TableReport::new(table, outcome)),
        }
    }

    /// True only when every table was migrated (and verified) or skipped.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.tables.iter().all(TableReport::is_success)
    }

    pub fn migrated_count(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Migrated { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Failed { .. }))
    }

    pub fn not_attempted_count(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::NotAttempted))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Skipped))
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(TableReport::rows).sum()
    }

    fn count(&self, predicate: impl Fn(&TableOutcome) -> bool) -> usize {
        self.tables.iter().filter(|t| predicate(&t.outcome)).count()
    }
}

impl fmt::Display for TableOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableOutcome::Migrated { rows } => write!(f, "migrated ({} rows)", rows),
            TableOutcome::Failed {
                kind,
                detail,
                rows_written,
            } => write!(
                f,
                "failed [{}] {} ({} rows written)",
                kind, detail, rows_written
            ),
            TableOutcome::NotAttempted => write!(f, "not attempted"),
            TableOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verification::Matched { rows } => write!(f, "verified ({} rows)", rows),
            Verification::Mismatched {
                source_rows,
                destination_rows,
            } => write!(
                f,
                "row count mismatch: source {} vs destination {}",
                source_rows, destination_rows
            ),
            Verification::SchemaMismatch { differences } => {
                write!(f, "schema mismatch: {}", differences.join("; "))
            }
            Verification::Failed { detail } => write!(f, "verification failed: {}", detail),
        }
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .tables
            .iter()
            .map(|t| t.table.chars().count())
            .max()
            .unwrap_or(0)
            .max(5);

        writeln!(f, "Migration report")?;
        writeln!(f, "========================================")?;
        for entry in &self.tables {
            writeln!(f, "  {:<width$}  {}", entry.table, entry.outcome, width = width)?;
            if let Some(verification) = &entry.verification {
                writeln!(f, "  {:<width$}    {}", "", verification, width = width)?;
            }
            for warning in &entry.warnings {
                writeln!(f, "  {:<width$}    warning: {}", "", warning, width = width)?;
            }
        }
        writeln!(f, "========================================")?;
        if self.cancelled {
            writeln!(f, "Run cancelled by user")?;
        }
        write!(
            f,
            "{} migrated, {} failed, {} not attempted, {} skipped; {} rows copied",
            self.migrated_count(),
            self.failed_count(),
            self.not_attempted_count(),
            self.skipped_count(),
            self.total_rows()
        )
    }
}
