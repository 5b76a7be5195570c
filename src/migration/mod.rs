// ABOUTME: Migration pipeline: descriptors, type mapping, schema translation, batching, orchestration
// ABOUTME: Defines the source and destination collaborator traits the pipeline runs against

pub mod batcher;
pub mod descriptor;
pub mod orchestrator;
pub mod report;
pub mod schema;
pub mod typemap;
pub mod verify;

use crate::error::Result;
use async_trait::async_trait;

pub use batcher::{RowBatch, RowBatcher};
pub use descriptor::{
    ColumnDescriptor, ForeignKey, IndexDescriptor, IntegerWidth, SourceType, TableDescriptor,
};
pub use orchestrator::{migrate, CancelFlag, MigrationOptions, OnTableError};
pub use report::{MigrationReport, TableOutcome, TableReport, Verification};
pub use schema::{translate_table, CreateTable, InsertStatement, TableTranslation};
pub use typemap::{map_type, DestinationType, UnsupportedTypeError};
pub use verify::verify_tables;

/// Raw value read from the source.
pub type SourceValue = rusqlite::types::Value;

/// Read-only handle on the source database.
///
/// Implementations classify their own failures: anything that means the
/// source is gone is a [`crate::error::MigrationError::Connection`], anything
/// scoped to one table is a [`crate::error::MigrationError::SourceRead`].
pub trait SourceDatabase {
    /// Names of all user tables, in the order they will be migrated.
    fn list_tables(&self) -> Result<Vec<String>>;

    fn describe_table(&self, table: &str) -> Result<TableDescriptor>;

    /// Rows `offset..offset + limit` in stable order, positionally aligned to
    /// `table.columns`.
    fn fetch_rows(
        &self,
        table: &TableDescriptor,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Vec<SourceValue>>>;

    fn count_rows(&self, table: &str) -> Result<u64>;

    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Read-write handle on the destination database.
#[async_trait]
pub trait Destination: Send {
    /// Execute one DDL statement on behalf of `table`.
    ///
    /// A statement the server rejects is a
    /// [`crate::error::MigrationError::SchemaTranslation`]; a lost connection
    /// is a [`crate::error::MigrationError::Connection`].
    async fn execute_ddl(&mut self, table: &str, statement: &str) -> Result<()>;

    /// Insert all rows of `batch` atomically, returning the number written.
    async fn insert_batch(&mut self, insert: &InsertStatement, batch: RowBatch) -> Result<u64>;

    async fn count_rows(&mut self, table: &str) -> Result<u64>;

    /// Column names and MySQL column types of `table` as they exist now.
    ///
    /// A missing table yields an empty list rather than an error.
    async fn describe_columns(&mut self, table: &str) -> Result<Vec<(String, String)>>;

    /// Release the connection. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}
