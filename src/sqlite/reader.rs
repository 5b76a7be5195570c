// ABOUTME: SQLite database introspection and data reading
// ABOUTME: Functions to list tables, describe their structure, count rows, and page through rows

use super::source_error;
use crate::error::{MigrationError, Result};
use crate::migration::descriptor::{
    ColumnDescriptor, ForeignKey, IndexDescriptor, SourceType, TableDescriptor,
};
use crate::migration::SourceValue;
use crate::utils::quote_sqlite_identifier;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;

/// List all user tables in a SQLite database
///
/// Queries sqlite_master for user-created tables, excluding the `sqlite_*`
/// internal tables (sqlite_sequence, sqlite_stat1, ...). The alphabetical
/// order returned here is the order tables are migrated in.
///
/// # Examples
///
/// ```no_run
/// # use sqlite_mysql_migrator::sqlite::{open_sqlite, reader::list_tables};
/// # fn example() -> anyhow::Result<()> {
/// let conn = open_sqlite("database.db")?;
/// let tables = list_tables(&conn)?;
/// for table in tables {
///     println!("Table: {}", table);
/// }
/// # Ok(())
/// # }
/// ```
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    tracing::debug!("Listing tables from SQLite database");

    let list = || -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type='table' \
             AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tables)
    };

    // Without a table list there is nothing to migrate, so any failure here ends the run
    let tables = list().map_err(|e| {
        MigrationError::connection(
            crate::error::Endpoint::Source,
            format!("failed to list tables: {}", e),
        )
    })?;

    tracing::info!("Found {} user tables in SQLite database", tables.len());

    Ok(tables)
}

/// Describe a table's columns, primary key, foreign keys and indexes
///
/// With `infer_booleans`, plain `INTEGER`/`INT` columns that are neither key
/// nor foreign-key columns and hold only 0/1 (and at least one non-null
/// value) are tagged as booleans.
pub fn describe_table(
    conn: &Connection,
    table: &str,
    infer_booleans: bool,
) -> Result<TableDescriptor> {
    tracing::debug!("Describing table '{}'", table);

    let create_sql: Option<Option<String>> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type='table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| source_error(table, e))?;
    let create_sql = match create_sql {
        Some(sql) => sql.unwrap_or_default(),
        None => {
            return Err(MigrationError::source_read(
                table,
                "table does not exist in the source",
            ))
        }
    };

    let quoted = quote_sqlite_identifier(table);
    let mut columns = Vec::new();
    let mut key_positions: Vec<(i64, String)> = Vec::new();

    {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", quoted))
            .map_err(|e| source_error(table, e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })
            .map_err(|e| source_error(table, e))?;

        for row in rows {
            let (name, declared, notnull, default, pk) = row.map_err(|e| source_error(table, e))?;
            let mut column = ColumnDescriptor::new(name.clone(), declared);
            column.nullable = notnull == 0;
            column.default = default;
            if pk > 0 {
                key_positions.push((pk, name));
            }
            columns.push(column);
        }
    }

    key_positions.sort();
    let primary_key: Vec<String> = key_positions.into_iter().map(|(_, name)| name).collect();

    let upper_sql = create_sql.to_ascii_uppercase();
    let autoincrement = upper_sql.contains("AUTOINCREMENT");
    let without_rowid = upper_sql
        .rsplit(')')
        .next()
        .map(|tail| tail.contains("WITHOUT ROWID"))
        .unwrap_or(false);

    let foreign_keys = read_foreign_keys(conn, table)?;
    let indexes = read_indexes(conn, table)?;

    if infer_booleans {
        for column in columns.iter_mut() {
            let plain_integer = matches!(
                column.declared_type.trim().to_ascii_uppercase().as_str(),
                "INTEGER" | "INT"
            );
            let in_key = primary_key.contains(&column.name);
            let in_foreign_key = foreign_keys
                .iter()
                .any(|fk| fk.columns.contains(&column.name));

            if plain_integer
                && !in_key
                && !in_foreign_key
                && holds_only_booleans(conn, table, &column.name)?
            {
                tracing::debug!(
                    "Column '{}.{}' holds only 0/1, treating it as boolean",
                    table,
                    column.name
                );
                column.source_type = SourceType::Boolean;
            }
        }
    }

    let mut descriptor = TableDescriptor::new(table, columns).with_primary_key(primary_key);
    descriptor.autoincrement = autoincrement;
    descriptor.without_rowid = without_rowid;
    descriptor.foreign_keys = foreign_keys;
    descriptor.indexes = indexes;

    Ok(descriptor)
}

/// Secondary indexes and UNIQUE constraints, sorted by name.
///
/// The primary key's own index (origin `pk`) is left out; it is rendered
/// from the primary key columns.
fn read_indexes(conn: &Connection, table: &str) -> Result<Vec<IndexDescriptor>> {
    let listed: Vec<(String, bool, String, bool)> = {
        let mut stmt = conn
            .prepare(&format!(
                "PRAGMA index_list({})",
                quote_sqlite_identifier(table)
            ))
            .map_err(|e| source_error(table, e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? != 0,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)? != 0,
                ))
            })
            .map_err(|e| source_error(table, e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| source_error(table, e))?
    };

    let mut indexes = Vec::new();
    for (name, unique, origin, partial) in listed {
        if origin == "pk" {
            continue;
        }

        let mut stmt = conn
            .prepare(&format!(
                "PRAGMA index_info({})",
                quote_sqlite_identifier(&name)
            ))
            .map_err(|e| source_error(table, e))?;
        let mut columns: Vec<(i64, Option<String>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(2)?)))
            .map_err(|e| source_error(table, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| source_error(table, e))?;
        columns.sort_by_key(|(seqno, _)| *seqno);

        indexes.push(IndexDescriptor {
            name,
            columns: columns.into_iter().map(|(_, column)| column).collect(),
            unique,
            from_constraint: origin == "u",
            partial,
        });
    }

    indexes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(indexes)
}

fn read_foreign_keys(conn: &Connection, table: &str) -> Result<Vec<ForeignKey>> {
    let mut stmt = conn
        .prepare(&format!(
            "PRAGMA foreign_key_list({})",
            quote_sqlite_identifier(table)
        ))
        .map_err(|e| source_error(table, e))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })
        .map_err(|e| source_error(table, e))?;

    let mut grouped: BTreeMap<i64, Vec<(i64, ForeignKey)>> = BTreeMap::new();
    for row in rows {
        let (id, seq, parent, from, to, on_update, on_delete) =
            row.map_err(|e| source_error(table, e))?;
        grouped.entry(id).or_default().push((
            seq,
            ForeignKey {
                id,
                columns: vec![from],
                referenced_table: parent,
                referenced_columns: to.into_iter().collect(),
                on_update,
                on_delete,
            },
        ));
    }

    let foreign_keys = grouped
        .into_values()
        .filter_map(|mut parts| {
            parts.sort_by_key(|(seq, _)| *seq);
            let mut parts = parts.into_iter().map(|(_, fk)| fk);
            let mut merged = parts.next()?;
            for part in parts {
                merged.columns.extend(part.columns);
                merged.referenced_columns.extend(part.referenced_columns);
            }
            Some(merged)
        })
        .collect();

    Ok(foreign_keys)
}

fn holds_only_booleans(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let column = quote_sqlite_identifier(column);
    let query = format!(
        "SELECT COUNT(*), \
         COALESCE(SUM(CASE WHEN typeof({c}) != 'integer' OR {c} NOT IN (0, 1) THEN 1 ELSE 0 END), 0) \
         FROM {t} WHERE {c} IS NOT NULL",
        c = column,
        t = quote_sqlite_identifier(table)
    );

    let (non_null, non_boolean): (i64, i64) = conn
        .query_row(&query, [], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(|e| source_error(table, e))?;

    Ok(non_null > 0 && non_boolean == 0)
}

/// Get row count for a specific table
pub fn count_rows(conn: &Connection, table: &str) -> Result<u64> {
    tracing::debug!("Getting row count for table '{}'", table);

    let query = format!("SELECT COUNT(*) FROM {}", quote_sqlite_identifier(table));
    let count: i64 = conn
        .query_row(&query, [], |row| row.get(0))
        .map_err(|e| source_error(table, e))?;

    Ok(count as u64)
}

/// Read one page of rows in stable order
///
/// Rowid tables are ordered by `_rowid_`, `WITHOUT ROWID` tables by their
/// primary key. Values are positionally aligned to `table.columns`.
pub fn read_rows(
    conn: &Connection,
    table: &TableDescriptor,
    offset: u64,
    limit: usize,
) -> Result<Vec<Vec<SourceValue>>> {
    let columns = table
        .columns
        .iter()
        .map(|c| quote_sqlite_identifier(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let order_by = if table.without_rowid && !table.primary_key.is_empty() {
        table
            .primary_key
            .iter()
            .map(|c| quote_sqlite_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        "_rowid_".to_string()
    };

    let query = format!(
        "SELECT {} FROM {} ORDER BY {} LIMIT ?1 OFFSET ?2",
        columns,
        quote_sqlite_identifier(&table.name),
        order_by
    );

    let width = table.columns.len();
    let mut stmt = conn
        .prepare_cached(&query)
        .map_err(|e| source_error(&table.name, e))?;
    let rows = stmt
        .query_map(params![limit as i64, offset as i64], |row| {
            (0..width)
                .map(|i| row.get::<_, SourceValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .map_err(|e| source_error(&table.name, e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| source_error(&table.name, e))?;

    tracing::debug!(
        "Read {} rows from '{}' at offset {}",
        rows.len(),
        table.name,
        offset
    );

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::descriptor::IntegerWidth;

    fn create_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();

        conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email VARCHAR(120) DEFAULT 'none',
                active INTEGER,
                score REAL
            );
            INSERT INTO users (name, email, active, score) VALUES ('Alice', 'alice@example.com', 1, 1.5);
            INSERT INTO users (name, email, active, score) VALUES ('Bob', 'bob@example.com', 0, NULL);

            CREATE TABLE orders (
                id INTEGER PRIMARY KEY,
                user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
                quantity INTEGER
            );
            INSERT INTO orders (user_id, quantity) VALUES (1, 3);
            INSERT INTO orders (user_id, quantity) VALUES (1, 1);

            CREATE TABLE tags (
                a TEXT,
                b TEXT,
                PRIMARY KEY (b, a)
            ) WITHOUT ROWID;
            INSERT INTO tags VALUES ('x', '2');
            INSERT INTO tags VALUES ('y', '1');",
        )
        .unwrap();

        conn
    }

    #[test]
    fn test_list_tables_is_alphabetical_and_skips_internal_tables() {
        let conn = create_test_db();
        let tables = list_tables(&conn).unwrap();

        // sqlite_sequence exists because of AUTOINCREMENT but is excluded
        assert_eq!(tables, vec!["orders", "tags", "users"]);
    }

    #[test]
    fn test_describe_table_columns_and_key() {
        let conn = create_test_db();
        let users = describe_table(&conn, "users", true).unwrap();

        assert_eq!(
            users.column_names(),
            vec!["id", "name", "email", "active", "score"]
        );
        assert_eq!(users.primary_key, vec!["id"]);
        assert!(users.autoincrement);
        assert!(!users.without_rowid);

        let name = users.column("name").unwrap();
        assert!(!name.nullable);
        let email = users.column("email").unwrap();
        assert_eq!(email.source_type, SourceType::Text { length: Some(120) });
        assert_eq!(email.default.as_deref(), Some("'none'"));
    }

    #[test]
    fn test_boolean_inference() {
        let conn = create_test_db();

        let users = describe_table(&conn, "users", true).unwrap();
        assert_eq!(users.column("active").unwrap().source_type, SourceType::Boolean);
        // Key column is never inferred
        assert_eq!(
            users.column("id").unwrap().source_type,
            SourceType::Integer(IntegerWidth::Standard)
        );

        let orders = describe_table(&conn, "orders", true).unwrap();
        // Foreign key column is never inferred, even when it holds only 1
        assert_eq!(
            orders.column("user_id").unwrap().source_type,
            SourceType::Integer(IntegerWidth::Standard)
        );
        assert_eq!(
            orders.column("quantity").unwrap().source_type,
            SourceType::Integer(IntegerWidth::Standard)
        );

        let plain = describe_table(&conn, "users", false).unwrap();
        assert_eq!(
            plain.column("active").unwrap().source_type,
            SourceType::Integer(IntegerWidth::Standard)
        );
    }

    #[test]
    fn test_boolean_inference_needs_a_value() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (flag INTEGER); INSERT INTO t VALUES (NULL);")
            .unwrap();

        let t = describe_table(&conn, "t", true).unwrap();
        assert_eq!(
            t.column("flag").unwrap().source_type,
            SourceType::Integer(IntegerWidth::Standard)
        );
    }

    #[test]
    fn test_foreign_keys() {
        let conn = create_test_db();
        let orders = describe_table(&conn, "orders", true).unwrap();

        assert_eq!(orders.foreign_keys.len(), 1);
        let fk = &orders.foreign_keys[0];
        assert_eq!(fk.columns, vec!["user_id"]);
        assert_eq!(fk.referenced_table, "users");
        assert_eq!(fk.referenced_columns, vec!["id"]);
        assert_eq!(fk.on_delete, "CASCADE");
    }

    #[test]
    fn test_without_rowid_table_orders_by_key() {
        let conn = create_test_db();
        let tags = describe_table(&conn, "tags", true).unwrap();

        assert!(tags.without_rowid);
        assert_eq!(tags.primary_key, vec!["b", "a"]);

        let rows = read_rows(&conn, &tags, 0, 10).unwrap();
        assert_eq!(rows[0][0], SourceValue::Text("y".into()));
        assert_eq!(rows[1][0], SourceValue::Text("x".into()));
    }

    #[test]
    fn test_indexes_and_unique_constraints() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE u (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                a INT,
                b INT,
                UNIQUE (a, b)
            );
            CREATE INDEX ix_b_a ON u (b, a);
            CREATE INDEX ix_lower ON u (lower(email));
            CREATE INDEX ix_recent ON u (a) WHERE a > 10;",
        )
        .unwrap();

        let u = describe_table(&conn, "u", true).unwrap();
        let names: Vec<&str> = u.indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "ix_b_a",
                "ix_lower",
                "ix_recent",
                "sqlite_autoindex_u_1",
                "sqlite_autoindex_u_2"
            ]
        );

        let ix_b_a = &u.indexes[0];
        assert!(!ix_b_a.unique);
        assert!(!ix_b_a.from_constraint);
        assert_eq!(
            ix_b_a.columns,
            vec![Some("b".to_string()), Some("a".to_string())]
        );

        assert_eq!(u.indexes[1].columns, vec![None]);
        assert!(u.indexes[2].partial);

        let email = &u.indexes[3];
        assert!(email.unique && email.from_constraint);
        assert_eq!(email.columns, vec![Some("email".to_string())]);
        assert_eq!(
            u.indexes[4].columns,
            vec![Some("a".to_string()), Some("b".to_string())]
        );
    }

    #[test]
    fn test_without_rowid_key_index_is_not_listed() {
        let conn = create_test_db();
        let tags = describe_table(&conn, "tags", true).unwrap();
        assert!(tags.indexes.is_empty());
    }

    #[test]
    fn test_describe_missing_table() {
        let conn = create_test_db();
        let err = describe_table(&conn, "ghost", true).unwrap_err();
        assert!(matches!(err, MigrationError::SourceRead { .. }));
    }

    #[test]
    fn test_read_rows_pages_in_rowid_order() {
        let conn = create_test_db();
        let users = describe_table(&conn, "users", true).unwrap();

        let first = read_rows(&conn, &users, 0, 1).unwrap();
        let second = read_rows(&conn, &users, 1, 1).unwrap();
        let past_end = read_rows(&conn, &users, 2, 1).unwrap();

        assert_eq!(first[0][1], SourceValue::Text("Alice".into()));
        assert_eq!(second[0][1], SourceValue::Text("Bob".into()));
        assert_eq!(second[0][4], SourceValue::Null);
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_count_rows() {
        let conn = create_test_db();
        assert_eq!(count_rows(&conn, "users").unwrap(), 2);
        assert!(count_rows(&conn, "ghost").is_err());
    }

    #[test]
    fn test_quoted_table_names() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE \"order items\" (\"select\" INTEGER, note TEXT);
             INSERT INTO \"order items\" VALUES (5, 'x');",
        )
        .unwrap();

        let table = describe_table(&conn, "order items", true).unwrap();
        assert_eq!(table.column_names(), vec!["select", "note"]);
        assert_eq!(count_rows(&conn, "order items").unwrap(), 1);
        assert_eq!(read_rows(&conn, &table, 0, 10).unwrap().len(), 1);
    }
}
