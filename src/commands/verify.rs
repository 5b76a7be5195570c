// ABOUTME: Verify command comparing schema and row counts between SQLite and MySQL
// ABOUTME: Reports each selected table and fails on any mismatch

use crate::config::Settings;
use crate::migration::{verify_tables, Destination, SourceDatabase};
use crate::mysql::MysqlDestination;
use crate::sqlite::SqliteSource;
use anyhow::{bail, Result};

/// Compare destination schema and row counts with the source for the selected tables.
pub async fn verify(settings: &Settings) -> Result<()> {
    let target = settings.require_destination()?;

    let source = SqliteSource::open(&settings.source_path, settings.infer_booleans)?;
    let tables: Vec<String> = source
        .list_tables()?
        .into_iter()
        .filter(|t| settings.options.table_filter.should_migrate_table(t))
        .collect();

    let mut destination = MysqlDestination::connect(target.clone(), settings.connect_retries).await?;
    let results = verify_tables(&source, &mut destination, &tables).await;

    if let Err(e) = destination.close().await {
        tracing::warn!("Failed to close destination connection: {}", e);
    }
    source.close()?;

    let results = results?;
    let mut mismatches = 0;
    for (table, verification) in &results {
        if verification.is_match() {
            tracing::info!("✓ {}: {}", table, verification);
        } else {
            mismatches += 1;
            tracing::error!("✗ {}: {}", table, verification);
        }
    }

    if mismatches > 0 {
        bail!(
            "Verification failed for {} of {} table(s)",
            mismatches,
            results.len()
        );
    }

    tracing::info!("✓ All {} table(s) verified", results.len());
    Ok(())
}
