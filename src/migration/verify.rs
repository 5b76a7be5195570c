// ABOUTME: Post-migration verification of destination schema and row counts
// ABOUTME: Connection loss propagates; per-table failures are recorded as results

use super::report::Verification;
use super::schema::translate_table;
use super::{Destination, SourceDatabase};
use crate::error::Result;

/// Verify `tables` between source and destination.
///
/// Each table is checked in two steps. First the destination's columns are
/// compared with what the source table translates to: same names, same
/// order, same types. A table whose schema differs is reported as
/// [`Verification::SchemaMismatch`] and its rows are not counted. Otherwise
/// the row counts are compared.
///
/// A check that cannot be completed for one table yields
/// [`Verification::Failed`] for that table; a connection-level error ends
/// verification.
pub async fn verify_tables<S, D>(
    source: &S,
    destination: &mut D,
    tables: &[String],
) -> Result<Vec<(String, Verification)>>
where
    S: SourceDatabase + ?Sized,
    D: Destination + ?Sized,
{
    let mut results = Vec::with_capacity(tables.len());

    for table in tables {
        let verification = match verify_table(source, destination, table).await {
            Ok(verification) => verification,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => Verification::Failed {
                detail: e.to_string(),
            },
        };
        tracing::info!("Verified '{}': {}", table, verification);
        results.push((table.clone(), verification));
    }

    Ok(results)
}

async fn verify_table<S, D>(source: &S, destination: &mut D, table: &str) -> Result<Verification>
where
    S: SourceDatabase + ?Sized,
    D: Destination + ?Sized,
{
    let descriptor = source.describe_table(table)?;
    let expected: Vec<(String, String)> = translate_table(&descriptor)?
        .create
        .columns
        .iter()
        .map(|c| (c.name.clone(), c.data_type.to_string()))
        .collect();
    let actual = destination.describe_columns(table).await?;

    let differences = schema_differences(&expected, &actual);
    if !differences.is_empty() {
        return Ok(Verification::SchemaMismatch { differences });
    }

    let source_rows = source.count_rows(table)?;
    let destination_rows = destination.count_rows(table).await?;
    Ok(Verification::compare(source_rows, destination_rows))
}

/// Differences between expected and actual `(column, type)` lists.
pub fn schema_differences(expected: &[(String, String)], actual: &[(String, String)]) -> Vec<String> {
    if actual.is_empty() {
        return vec!["table missing in destination".to_string()];
    }

    let mut differences = Vec::new();

    for (position, (name, data_type)) in expected.iter().enumerate() {
        match actual.iter().position(|(n, _)| n == name) {
            None => differences.push(format!("column `{}` missing", name)),
            Some(found) => {
                let actual_type = &actual[found].1;
                if normalize_type(actual_type) != normalize_type(data_type) {
                    differences.push(format!(
                        "column `{}` is {} but expected {}",
                        name, actual_type, data_type
                    ));
                }
                if found != position {
                    differences.push(format!(
                        "column `{}` at position {} but expected {}",
                        name,
                        found + 1,
                        position + 1
                    ));
                }
            }
        }
    }

    for (name, _) in actual {
        if !expected.iter().any(|(n, _)| n == name) {
            differences.push(format!("unexpected column `{}`", name));
        }
    }

    differences
}

/// Lowercase without whitespace; integer display widths other than
/// `tinyint(1)` are dropped, as older servers report `int(11)`.
fn normalize_type(data_type: &str) -> String {
    let compact: String = data_type
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    for integer in ["int", "bigint"] {
        if let Some(rest) = compact.strip_prefix(integer) {
            if rest.starts_with('(') && rest.ends_with(')') {
                return integer.to_string();
            }
        }
    }

    compact
}
