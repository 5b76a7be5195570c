// ABOUTME: MySQL destination introspection
// ABOUTME: Lists existing tables, describes their columns, and counts rows for verification

use crate::utils::quote_mysql_identifier;
use mysql_async::{prelude::*, Conn};

/// List all base tables in a MySQL database, alphabetically
///
/// # Examples
///
/// ```no_run
/// # use sqlite_mysql_migrator::mysql::{connect_mysql, reader::list_tables, validate_mysql_url};
/// # async fn example() -> anyhow::Result<()> {
/// let opts = validate_mysql_url("mysql://localhost:3306/mydb")?;
/// let mut conn = connect_mysql(opts, 0).await?;
/// let tables = list_tables(&mut conn, "mydb").await?;
/// println!("Found {} tables", tables.len());
/// # Ok(())
/// # }
/// ```
pub async fn list_tables(conn: &mut Conn, db_name: &str) -> Result<Vec<String>, mysql_async::Error> {
    tracing::debug!("Listing tables from MySQL database '{}'", db_name);

    let query = r#"
        SELECT TABLE_NAME
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = ?
        AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
    "#;

    let tables: Vec<String> = conn.exec(query, (db_name,)).await?;

    tracing::debug!("Found {} table(s) in database '{}'", tables.len(), db_name);

    Ok(tables)
}

/// Column names and full column types of a table, in declaration order
///
/// Types come back as MySQL spells them in `COLUMN_TYPE`, e.g. `varchar(64)`
/// or `int(11)` on servers that still report display widths. A table that
/// does not exist yields an empty list.
pub async fn describe_columns(
    conn: &mut Conn,
    table_name: &str,
) -> Result<Vec<(String, String)>, mysql_async::Error> {
    tracing::debug!("Describing columns of table '{}'", table_name);

    let query = r#"
        SELECT COLUMN_NAME, COLUMN_TYPE
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE()
        AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
    "#;

    conn.exec(query, (table_name,)).await
}

/// Get row count for a table in the connection's current database
pub async fn count_rows(conn: &mut Conn, table_name: &str) -> Result<u64, mysql_async::Error> {
    tracing::debug!("Getting row count for table '{}'", table_name);

    let query = format!("SELECT COUNT(*) FROM {}", quote_mysql_identifier(table_name));
    let count: Option<u64> = conn.query_first(query).await?;

    Ok(count.unwrap_or(0))
}
