// ABOUTME: Migrate command copying a SQLite database into MySQL
// ABOUTME: Confirms the plan, runs the orchestrator, and prints or saves the report

use crate::config::Settings;
use crate::error::MigrationError;
use crate::migration::{self, CancelFlag, MigrationReport, SourceDatabase};
use crate::mysql::MysqlDestination;
use crate::sqlite::SqliteSource;
use crate::utils::sanitize_identifier;
use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::io::IsTerminal;
use std::path::Path;

/// Run a full migration
///
/// 1. Opens the SQLite source read-only and lists the tables to migrate;
///    when the filters leave nothing to do, prints an all-skipped report
/// 2. Connects to MySQL (with retries) and checks for tables that already exist
/// 3. Asks for confirmation unless `yes` is set
/// 4. Runs the migration and prints the per-table report
///
/// # Errors
///
/// Returns an error when the run aborts on a connection failure, and also
/// when it completes but any table failed, was not attempted, or did not
/// verify, so the process exits non-zero.
pub async fn migrate(
    settings: Settings,
    yes: bool,
    report_json: Option<&Path>,
    cancel: CancelFlag,
) -> Result<()> {
    let target = settings.require_destination()?.clone();

    let source = SqliteSource::open(&settings.source_path, settings.infer_booleans)?;
    let tables = source.list_tables()?;
    let selected: Vec<&String> = tables
        .iter()
        .filter(|t| settings.options.table_filter.should_migrate_table(t))
        .collect();

    if selected.is_empty() {
        tracing::warn!("No tables selected for migration; nothing to copy");
        let report = MigrationReport::planned(tables.iter().map(|t| (t.as_str(), false)));
        source.close()?;
        return finish(report, None, report_json);
    }

    let mut destination = MysqlDestination::connect(target, settings.connect_retries).await?;
    let existing = destination.existing_tables().await?;
    let conflicts: Vec<&String> = selected
        .iter()
        .copied()
        .filter(|t| existing.contains(*t))
        .collect();

    println!();
    println!("========================================");
    println!("Migration plan");
    println!("========================================");
    println!("Source:      {}", settings.source_path);
    println!("Destination: database '{}'", destination.database());
    println!(
        "Tables:      {} of {} ({} rows per batch)",
        selected.len(),
        tables.len(),
        settings.options.batch_size
    );
    for table in &selected {
        println!("  - {}", sanitize_identifier(table));
    }
    if !conflicts.is_empty() {
        println!();
        println!("These tables already exist in the destination and will fail:");
        for table in &conflicts {
            println!("  - {}", sanitize_identifier(table));
        }
    }
    println!("========================================");
    println!();

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Proceed with this migration?")
            .default(true)
            .interact()
            .context("Failed to get confirmation")?;

        if !confirmed {
            tracing::warn!("⚠ User cancelled operation");
            if let Err(e) = migration::Destination::close(&mut destination).await {
                tracing::warn!("Failed to close destination connection: {}", e);
            }
            bail!("Migration cancelled by user");
        }
    }

    let mut options = settings.options.clone();
    options.show_progress = std::io::stderr().is_terminal();

    let (report, aborted) = match migration::migrate(source, destination, &options, &cancel).await
    {
        Ok(report) => (report, None),
        Err(aborted) => (aborted.report, Some(aborted.cause)),
    };

    finish(report, aborted, report_json)
}

/// Print the report, save it when asked, and turn the outcome into the exit status.
fn finish(
    report: MigrationReport,
    aborted: Option<MigrationError>,
    report_json: Option<&Path>,
) -> Result<()> {
    println!("{}", report);

    if let Some(path) = report_json {
        write_report_json(&report, path)?;
        tracing::info!("Report written to {}", path.display());
    }

    if let Some(cause) = aborted {
        return Err(anyhow::Error::new(cause).context("Migration aborted"));
    }

    if !report.is_success() {
        bail!(
            "Migration incomplete: {} failed, {} not attempted{}",
            report.failed_count(),
            report.not_attempted_count(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
    }

    tracing::info!("✓ Migration completed successfully");
    Ok(())
}

/// Write the report as pretty-printed JSON.
pub fn write_report_json(report: &MigrationReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialise report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}
