// ABOUTME: MySQL destination writer executing DDL and transactional batched inserts
// ABOUTME: Implements the Destination collaborator on top of a single mysql_async connection

use super::{destination_error, reader};
use crate::error::{Endpoint, MigrationError, Result};
use crate::migration::{Destination, InsertStatement, RowBatch};
use async_trait::async_trait;
use mysql_async::{prelude::*, Conn, Opts, TxOpts, Value};

/// MySQL's limit on placeholders in one prepared statement.
pub const MAX_PLACEHOLDERS: usize = 65_535;

/// Rows per multi-row INSERT so a statement stays under [`MAX_PLACEHOLDERS`].
pub fn rows_per_statement(columns: usize) -> usize {
    (MAX_PLACEHOLDERS / columns.max(1)).max(1)
}

/// Insert a batch inside one transaction
///
/// The batch is split into as many multi-row INSERTs as the placeholder limit
/// requires; either all of them commit or none do.
pub async fn write_batch(
    conn: &mut Conn,
    insert: &InsertStatement,
    batch: RowBatch,
) -> std::result::Result<u64, mysql_async::Error> {
    if batch.is_empty() {
        return Ok(0);
    }

    let total = batch.len() as u64;
    let per_statement = rows_per_statement(insert.columns.len());

    let mut tx = conn.start_transaction(TxOpts::default()).await?;
    let mut rows = batch.rows.into_iter().peekable();
    while rows.peek().is_some() {
        let chunk: Vec<Vec<Value>> = rows.by_ref().take(per_statement).collect();
        let sql = insert.sql_for_rows(chunk.len());
        let params: Vec<Value> = chunk.into_iter().flatten().collect();
        tx.exec_drop(sql, params).await?;
    }
    tx.commit().await?;

    Ok(total)
}

/// Read-write MySQL handle used as the migration destination
pub struct MysqlDestination {
    conn: Option<Conn>,
    database: String,
}

impl MysqlDestination {
    /// Connect with `opts`, retrying transient failures `retries` times.
    pub async fn connect(opts: Opts, retries: u32) -> anyhow::Result<Self> {
        let database = super::require_database(&opts)?.to_string();
        let conn = super::connect_mysql(opts, retries).await?;
        Ok(Self {
            conn: Some(conn),
            database,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Tables that already exist in the destination database.
    pub async fn existing_tables(&mut self) -> Result<Vec<String>> {
        let database = self.database.clone();
        let conn = self.conn()?;
        reader::list_tables(conn, &database)
            .await
            .map_err(|e| destination_error(e, |m| MigrationError::destination_write(&database, m)))
    }

    fn conn(&mut self) -> Result<&mut Conn> {
        self.conn.as_mut().ok_or_else(|| {
            MigrationError::connection(Endpoint::Destination, "connection already closed")
        })
    }
}

#[async_trait]
impl Destination for MysqlDestination {
    async fn execute_ddl(&mut self, table: &str, statement: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.query_drop(statement)
            .await
            .map_err(|e| destination_error(e, |m| MigrationError::schema_translation(table, m)))
    }

    async fn insert_batch(&mut self, insert: &InsertStatement, batch: RowBatch) -> Result<u64> {
        let table = batch.table.clone();
        let conn = self.conn()?;
        write_batch(conn, insert, batch)
            .await
            .map_err(|e| destination_error(e, |m| MigrationError::destination_write(&table, m)))
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64> {
        let conn = self.conn()?;
        reader::count_rows(conn, table)
            .await
            .map_err(|e| destination_error(e, |m| MigrationError::destination_write(table, m)))
    }

    async fn describe_columns(&mut self, table: &str) -> Result<Vec<(String, String)>> {
        let conn = self.conn()?;
        reader::describe_columns(conn, table)
            .await
            .map_err(|e| destination_error(e, |m| MigrationError::destination_write(table, m)))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.disconnect().await.map_err(|e| {
                MigrationError::connection(Endpoint::Destination, e.to_string())
            })?;
            tracing::debug!("Closed MySQL connection");
        }
        Ok(())
    }
}
