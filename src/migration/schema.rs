// ABOUTME: Schema translation from SQLite table descriptors to MySQL statements
// ABOUTME: Builds structured CREATE TABLE, INSERT and foreign key statements

use super::descriptor::{IndexDescriptor, TableDescriptor};
use super::typemap::{map_column, DestinationType, INDEX_PREFIX_LENGTH, MAX_KEY_CHARACTERS};
use crate::error::{MigrationError, Result};
use crate::utils::{
    constraint_name, quote_mysql_identifier, validate_mysql_identifier,
    MAX_MYSQL_IDENTIFIER_LENGTH,
};
use serde::Serialize;
use std::fmt;

/// Table options appended to every CREATE TABLE.
pub const TABLE_OPTIONS: &str = "ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci";

/// A translated column default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DefaultValue {
    Null,
    Integer(i64),
    /// Decimal literal kept as written to avoid float round-off
    Real(String),
    Text(String),
    CurrentTimestamp,
    CurrentDate,
    CurrentTime,
}

/// One column of a MySQL CREATE TABLE.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DestinationType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub auto_increment: bool,
}

/// One column of an index, with the prefix length MySQL needs for TEXT and BLOB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexColumn {
    pub name: String,
    pub prefix: Option<u32>,
}

/// `KEY` or `UNIQUE KEY` clause inside a CREATE TABLE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDefinition {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<IndexColumn>,
}

impl fmt::Display for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = self
            .columns
            .iter()
            .map(|c| match c.prefix {
                Some(n) => format!("{}({})", quote_mysql_identifier(&c.name), n),
                None => quote_mysql_identifier(&c.name),
            })
            .collect::<Vec<_>>()
            .join(", ");

        write!(
            f,
            "{}KEY {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            quote_mysql_identifier(&self.name),
            columns
        )
    }
}

/// Structured MySQL `CREATE TABLE` statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateTable {
    pub table: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexDefinition>,
}

impl CreateTable {
    pub fn column_types(&self) -> Vec<DestinationType> {
        self.columns.iter().map(|c| c.data_type).collect()
    }

    pub fn insert_statement(&self) -> InsertStatement {
        InsertStatement {
            table: self.table.clone(),
            columns: self.columns.iter().map(|c| c.name.clone()).collect(),
        }
    }
}

impl fmt::Display for CreateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines: Vec<String> = self.columns.iter().map(render_column).collect();

        if !self.primary_key.is_empty() {
            let key = self
                .primary_key
                .iter()
                .map(|c| quote_mysql_identifier(c))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("PRIMARY KEY ({})", key));
        }
        lines.extend(self.indexes.iter().map(ToString::to_string));

        write!(
            f,
            "CREATE TABLE {} (\n  {}\n) {}",
            quote_mysql_identifier(&self.table),
            lines.join(",\n  "),
            TABLE_OPTIONS
        )
    }
}

fn render_column(column: &ColumnDefinition) -> String {
    let mut sql = format!(
        "{} {}",
        quote_mysql_identifier(&column.name),
        column.data_type
    );

    if !column.nullable {
        sql.push_str(" NOT NULL");
    }

    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&render_default(default, column.data_type));
    }

    if column.auto_increment {
        sql.push_str(" AUTO_INCREMENT");
    }

    sql
}

fn render_default(default: &DefaultValue, data_type: DestinationType) -> String {
    let literal = match default {
        DefaultValue::Null => return "NULL".to_string(),
        DefaultValue::Integer(i) if is_textual(data_type) => quote_mysql_string(&i.to_string()),
        DefaultValue::Integer(i) => i.to_string(),
        DefaultValue::Real(r) if is_textual(data_type) => quote_mysql_string(r),
        DefaultValue::Real(r) => r.clone(),
        DefaultValue::Text(s) => quote_mysql_string(s),
        DefaultValue::CurrentTimestamp => return "CURRENT_TIMESTAMP".to_string(),
        DefaultValue::CurrentDate => return "(CURRENT_DATE)".to_string(),
        DefaultValue::CurrentTime => return "(CURRENT_TIME)".to_string(),
    };

    if data_type.requires_expression_default() {
        format!("({})", literal)
    } else {
        literal
    }
}

fn is_textual(data_type: DestinationType) -> bool {
    matches!(
        data_type,
        DestinationType::Varchar(_) | DestinationType::Text | DestinationType::Blob
    )
}

/// Quote a string literal for MySQL's default SQL mode.
pub fn quote_mysql_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// Parameterised multi-row `INSERT` for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
}

impl InsertStatement {
    /// Render the statement for `rows` rows, one `?` per value.
    pub fn sql_for_rows(&self, rows: usize) -> String {
        let tuple = format!("({})", vec!["?"; self.columns.len()].join(", "));
        let columns = self
            .columns
            .iter()
            .map(|c| quote_mysql_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_mysql_identifier(&self.table),
            columns,
            vec![tuple; rows].join(", ")
        )
    }
}

/// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY` statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddForeignKey {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: String,
    pub on_update: String,
}

impl fmt::Display for AddForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |names: &[String]| {
            names
                .iter()
                .map(|c| quote_mysql_identifier(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        write!(
            f,
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            quote_mysql_identifier(&self.table),
            quote_mysql_identifier(&self.name),
            join(&self.columns),
            quote_mysql_identifier(&self.referenced_table),
            join(&self.referenced_columns),
            self.on_delete,
            self.on_update
        )
    }
}

/// Result of translating one table: the statement plus any degradations.
#[derive(Debug, Clone, PartialEq)]
pub struct TableTranslation {
    pub create: CreateTable,
    /// Defaults that could not be carried over, one message each
    pub warnings: Vec<String>,
}

/// Translate a source table into a MySQL `CREATE TABLE`.
///
/// Every column is mapped through the type mapper; the first column whose
/// type cannot be mapped fails the table with an `UnsupportedType` error
/// naming table and column.
pub fn translate_table(table: &TableDescriptor) -> Result<TableTranslation> {
    validate_mysql_identifier(&table.name)
        .map_err(|e| MigrationError::schema_translation(&table.name, e.to_string()))?;

    if table.columns.is_empty() {
        return Err(MigrationError::schema_translation(
            &table.name,
            "table has no columns",
        ));
    }

    let single_column_key = table.primary_key.len() == 1;
    let key_length_cap = key_varchar_cap(table);
    let mut columns = Vec::with_capacity(table.columns.len());
    let mut warnings = Vec::new();

    for column in &table.columns {
        validate_mysql_identifier(&column.name).map_err(|e| {
            MigrationError::schema_translation(
                &table.name,
                format!("column `{}`: {}", column.name, e),
            )
        })?;

        let in_key = table.is_primary_key(&column.name);
        let mut data_type =
            map_column(column, in_key).map_err(|e| MigrationError::UnsupportedType {
                table: table.name.clone(),
                column: column.name.clone(),
                declared: e.tag,
            })?;

        if let DestinationType::Varchar(n) = data_type {
            if in_key && n > key_length_cap {
                let message = format!(
                    "primary key column `{}` narrowed from VARCHAR({}) to VARCHAR({}) to fit the index key limit",
                    column.name, n, key_length_cap
                );
                tracing::warn!("Table '{}': {}", table.name, message);
                warnings.push(message);
                data_type = DestinationType::Varchar(key_length_cap);
            }
        }

        let default = match &column.default {
            Some(raw) => {
                let translated = translate_default(raw, data_type, column.nullable);
                if translated.is_none() {
                    let message = format!(
                        "default {} of column `{}` has no MySQL equivalent for {} and was dropped",
                        raw, column.name, data_type
                    );
                    tracing::warn!("Table '{}': {}", table.name, message);
                    warnings.push(message);
                }
                translated
            }
            None => None,
        };

        columns.push(ColumnDefinition {
            name: column.name.clone(),
            data_type,
            nullable: column.nullable,
            default,
            auto_increment: table.autoincrement
                && single_column_key
                && in_key
                && data_type.is_integer(),
        });
    }

    let indexes = translate_indexes(table, &columns, &mut warnings);

    Ok(TableTranslation {
        create: CreateTable {
            table: table.name.clone(),
            columns,
            primary_key: table.primary_key.clone(),
            indexes,
        },
        warnings,
    })
}

/// Longest VARCHAR a primary key column may keep.
///
/// Textual key columns share the utf8mb4 key budget evenly.
fn key_varchar_cap(table: &TableDescriptor) -> u32 {
    let textual = table
        .columns
        .iter()
        .filter(|c| table.is_primary_key(&c.name))
        .filter(|c| matches!(map_column(c, true), Ok(DestinationType::Varchar(_))))
        .count() as u32;

    MAX_KEY_CHARACTERS / textual.max(1)
}

/// Translate secondary indexes and UNIQUE constraints.
///
/// Expression and partial indexes have no MySQL equivalent and are skipped
/// with a warning. TEXT, BLOB and long VARCHAR columns are indexed by prefix.
fn translate_indexes(
    table: &TableDescriptor,
    columns: &[ColumnDefinition],
    warnings: &mut Vec<String>,
) -> Vec<IndexDefinition> {
    let mut indexes = Vec::new();
    let mut constraint_ordinal = 0;

    for (position, index) in table.indexes.iter().enumerate() {
        let skip = |reason: &str, warnings: &mut Vec<String>| {
            let message = format!("index `{}` skipped: {}", index.name, reason);
            tracing::warn!("Table '{}': {}", table.name, message);
            warnings.push(message);
        };

        if index.partial {
            skip("partial indexes are not supported by MySQL", warnings);
            continue;
        }

        let mut index_columns = Vec::with_capacity(index.columns.len());
        for column in &index.columns {
            let Some(name) = column else {
                break;
            };
            let Some(definition) = columns.iter().find(|c| &c.name == name) else {
                break;
            };
            index_columns.push(IndexColumn {
                name: name.clone(),
                prefix: index_prefix(definition.data_type),
            });
        }
        if index_columns.len() != index.columns.len() || index_columns.is_empty() {
            skip("indexes on expressions are not supported", warnings);
            continue;
        }

        if index.unique && index_columns.iter().any(|c| c.prefix.is_some()) {
            let message = format!(
                "unique index `{}` covers a long text or blob column and only enforces uniqueness on its first {} characters",
                index.name, INDEX_PREFIX_LENGTH
            );
            tracing::warn!("Table '{}': {}", table.name, message);
            warnings.push(message);
        }

        indexes.push(IndexDefinition {
            name: index_name(table, index, position, &mut constraint_ordinal),
            unique: index.unique,
            columns: index_columns,
        });
    }

    indexes
}

fn index_prefix(data_type: DestinationType) -> Option<u32> {
    match data_type {
        DestinationType::Text | DestinationType::Blob => Some(INDEX_PREFIX_LENGTH),
        DestinationType::Varchar(n) if n > MAX_KEY_CHARACTERS => Some(INDEX_PREFIX_LENGTH),
        _ => None,
    }
}

/// SQLite names constraint indexes `sqlite_autoindex_*`; those become `uq_<table>_<n>`.
fn index_name(
    table: &TableDescriptor,
    index: &IndexDescriptor,
    position: usize,
    constraint_ordinal: &mut usize,
) -> String {
    if index.from_constraint {
        let name = constraint_name("uq", &table.name, *constraint_ordinal);
        *constraint_ordinal += 1;
        return name;
    }

    if index.name.chars().count() > MAX_MYSQL_IDENTIFIER_LENGTH
        || validate_mysql_identifier(&index.name).is_err()
    {
        return constraint_name("ix", &table.name, position);
    }

    index.name.clone()
}

/// Translate a SQLite default expression for a column of `data_type`.
///
/// Returns `None` when MySQL has no equivalent.
pub fn translate_default(
    raw: &str,
    data_type: DestinationType,
    nullable: bool,
) -> Option<DefaultValue> {
    let mut expr = raw.trim();
    while expr.starts_with('(') && expr.ends_with(')') && expr.len() >= 2 {
        expr = expr[1..expr.len() - 1].trim();
    }

    let upper = expr.to_ascii_uppercase();
    let parsed = match upper.as_str() {
        "NULL" => return nullable.then_some(DefaultValue::Null),
        "TRUE" => DefaultValue::Integer(1),
        "FALSE" => DefaultValue::Integer(0),
        "CURRENT_TIMESTAMP" | "DATETIME('NOW')" | "DATETIME(\"NOW\")" => {
            DefaultValue::CurrentTimestamp
        }
        "CURRENT_DATE" | "DATE('NOW')" => DefaultValue::CurrentDate,
        "CURRENT_TIME" | "TIME('NOW')" => DefaultValue::CurrentTime,
        _ => parse_literal(expr)?,
    };

    let compatible = match (&parsed, data_type) {
        (DefaultValue::CurrentTimestamp, DestinationType::DateTime) => true,
        (DefaultValue::CurrentDate, DestinationType::Date) => true,
        (DefaultValue::CurrentTime, DestinationType::Time) => true,
        (
            DefaultValue::CurrentTimestamp | DefaultValue::CurrentDate | DefaultValue::CurrentTime,
            _,
        ) => false,
        (DefaultValue::Text(s), t) if t.is_integer() => {
            return s.trim().parse::<i64>().ok().map(DefaultValue::Integer)
        }
        (DefaultValue::Text(s), DestinationType::Double | DestinationType::Decimal { .. }) => {
            return s
                .trim()
                .parse::<f64>()
                .ok()
                .map(|_| DefaultValue::Real(s.trim().to_string()))
        }
        (DefaultValue::Real(_), t) if t.is_integer() => false,
        (
            DefaultValue::Integer(_) | DefaultValue::Real(_),
            DestinationType::Date | DestinationType::DateTime | DestinationType::Time,
        ) => false,
        _ => true,
    };

    compatible.then_some(parsed)
}

fn parse_literal(expr: &str) -> Option<DefaultValue> {
    for quote in ['\'', '"'] {
        if expr.len() >= 2 && expr.starts_with(quote) && expr.ends_with(quote) {
            let inner = &expr[1..expr.len() - 1];
            let doubled = format!("{}{}", quote, quote);
            return Some(DefaultValue::Text(inner.replace(&doubled, &quote.to_string())));
        }
    }

    let unsigned = expr.strip_prefix('+').unwrap_or(expr);
    if let Ok(i) = unsigned.parse::<i64>() {
        return Some(DefaultValue::Integer(i));
    }
    if unsigned.parse::<f64>().map(|f| f.is_finite()).unwrap_or(false) {
        return Some(DefaultValue::Real(unsigned.to_string()));
    }

    None
}

/// Translate a table's foreign keys into `ALTER TABLE` statements.
///
/// `parent` resolves a referenced table's descriptor so that implicit
/// references to its primary key can be spelled out. Constraints that cannot
/// be expressed are skipped and reported through the returned warnings.
pub fn translate_foreign_keys<'a, F>(
    table: &TableDescriptor,
    parent: F,
) -> (Vec<AddForeignKey>, Vec<String>)
where
    F: Fn(&str) -> Option<&'a TableDescriptor>,
{
    let mut statements = Vec::new();
    let mut warnings = Vec::new();

    for fk in &table.foreign_keys {
        let referenced_columns = if fk.referenced_columns.iter().all(|c| !c.is_empty())
            && !fk.referenced_columns.is_empty()
        {
            fk.referenced_columns.clone()
        } else {
            match parent(&fk.referenced_table) {
                Some(p) if p.primary_key.len() == fk.columns.len() => p.primary_key.clone(),
                _ => {
                    warnings.push(format!(
                        "foreign key {} on ({}) references `{}` without explicit columns and the parent key could not be resolved",
                        fk.id,
                        fk.columns.join(", "),
                        fk.referenced_table
                    ));
                    continue;
                }
            }
        };

        if referenced_columns.len() != fk.columns.len() {
            warnings.push(format!(
                "foreign key {} on ({}) has mismatched column counts",
                fk.id,
                fk.columns.join(", ")
            ));
            continue;
        }

        let on_delete = translate_action(&fk.on_delete, &mut warnings, &table.name);
        let on_update = translate_action(&fk.on_update, &mut warnings, &table.name);

        statements.push(AddForeignKey {
            table: table.name.clone(),
            name: constraint_name("fk", &table.name, fk.id),
            columns: fk.columns.clone(),
            referenced_table: fk.referenced_table.clone(),
            referenced_columns,
            on_delete,
            on_update,
        });
    }

    (statements, warnings)
}

fn translate_action(action: &str, warnings: &mut Vec<String>, table: &str) -> String {
    match action.trim().to_ascii_uppercase().as_str() {
        "CASCADE" => "CASCADE".to_string(),
        "SET NULL" => "SET NULL".to_string(),
        "RESTRICT" => "RESTRICT".to_string(),
        "SET DEFAULT" => {
            warnings.push(format!(
                "table `{}`: ON ... SET DEFAULT is not supported by InnoDB, using NO ACTION",
                table
            ));
            "NO ACTION".to_string()
        }
        _ => "NO ACTION".to_string(),
    }
}
