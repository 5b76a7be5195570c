// ABOUTME: Schema command printing the MySQL DDL a migration would execute
// ABOUTME: Needs only the SQLite source; untranslatable tables are reported inline

use crate::config::Settings;
use crate::filters::TableFilter;
use crate::migration::schema::translate_foreign_keys;
use crate::migration::{translate_table, SourceDatabase, TableDescriptor};
use crate::sqlite::SqliteSource;
use anyhow::{bail, Result};

/// DDL for the selected tables plus the tables that could not be translated.
#[derive(Debug, Default)]
pub struct SchemaDump {
    pub sql: String,
    pub failures: Vec<(String, String)>,
}

/// Translate every selected table without touching a destination
///
/// `CREATE TABLE` statements come first, in migration order, followed by the
/// `ALTER TABLE` statements adding foreign keys between translated tables.
pub fn render_schema<S: SourceDatabase>(source: &S, filter: &TableFilter) -> Result<SchemaDump> {
    let mut dump = SchemaDump::default();
    let mut translated: Vec<TableDescriptor> = Vec::new();

    for table in source.list_tables()? {
        if !filter.should_migrate_table(&table) {
            continue;
        }

        let descriptor = match source.describe_table(&table) {
            Ok(descriptor) => descriptor,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                dump.failures.push((table, e.to_string()));
                continue;
            }
        };

        match translate_table(&descriptor) {
            Ok(translation) => {
                for warning in &translation.warnings {
                    dump.sql.push_str(&format!("-- warning: {}\n", warning));
                }
                dump.sql.push_str(&format!("{};\n\n", translation.create));
                translated.push(descriptor);
            }
            Err(e) => {
                dump.sql
                    .push_str(&format!("-- table `{}` skipped: {}\n\n", table, e));
                dump.failures.push((table, e.to_string()));
            }
        }
    }

    let lookup = |name: &str| translated.iter().find(|t| t.name == name);
    for table in &translated {
        let (statements, warnings) = translate_foreign_keys(table, lookup);
        for warning in warnings {
            dump.sql.push_str(&format!("-- warning: {}\n", warning));
        }
        for statement in statements {
            if lookup(&statement.referenced_table).is_some() {
                dump.sql.push_str(&format!("{};\n", statement));
            }
        }
    }

    Ok(dump)
}

/// Print the DDL for the configured source
///
/// Exits non-zero when any selected table cannot be translated.
pub fn schema(settings: &Settings) -> Result<()> {
    let source = SqliteSource::open(&settings.source_path, settings.infer_booleans)?;
    let dump = render_schema(&source, &settings.options.table_filter)?;
    source.close()?;

    println!("{}", dump.sql.trim_end());

    if !dump.failures.is_empty() {
        for (table, reason) in &dump.failures {
            tracing::error!("✗ Table '{}': {}", table, reason);
        }
        bail!("{} table(s) cannot be translated", dump.failures.len());
    }

    Ok(())
}
