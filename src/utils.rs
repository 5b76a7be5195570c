// ABOUTME: Utility functions for identifier handling and retries
// ABOUTME: Provides SQL identifier quoting/validation, display sanitising, and backoff retry

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use std::fmt::Display;
use std::time::Duration;

/// MySQL's identifier length limit.
pub const MAX_MYSQL_IDENTIFIER_LENGTH: usize = 64;

/// Retry an operation with exponential backoff
///
/// Executes an async operation with automatic retry on failure. Each retry doubles
/// the delay to ride out transient failures such as a server restart.
///
/// # Arguments
///
/// * `operation` - Async function to retry (FnMut returning Future\<Output = Result\<T, E\>\>)
/// * `max_retries` - Maximum number of retry attempts (0 = no retries, just initial attempt)
/// * `initial_delay` - Delay before first retry (doubles each subsequent retry)
///
/// # Returns
///
/// Returns the successful result or the last error after all retries are exhausted.
///
/// # Examples
///
/// ```no_run
/// # use std::time::Duration;
/// # use sqlite_mysql_migrator::utils::retry_with_backoff;
/// # async fn example() -> anyhow::Result<()> {
/// let result = retry_with_backoff(
///     || async { Ok::<_, anyhow::Error>("success") },
///     3,
///     Duration::from_secs(1),
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries => {
                tracing::warn!(
                    "Operation failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt + 1,
                    max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Quote an identifier for MySQL
///
/// Wraps the name in backticks and doubles any embedded backtick, so reserved
/// words and unusual names survive intact.
///
/// # Examples
///
/// ```
/// # use sqlite_mysql_migrator::utils::quote_mysql_identifier;
/// assert_eq!(quote_mysql_identifier("users"), "`users`");
/// assert_eq!(quote_mysql_identifier("odd`name"), "`odd``name`");
/// ```
pub fn quote_mysql_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote an identifier for SQLite
///
/// # Examples
///
/// ```
/// # use sqlite_mysql_migrator::utils::quote_sqlite_identifier;
/// assert_eq!(quote_sqlite_identifier("users"), "\"users\"");
/// assert_eq!(quote_sqlite_identifier("say \"hi\""), "\"say \"\"hi\"\"\"");
/// ```
pub fn quote_sqlite_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Validate that a table or column name can be created in MySQL
///
/// MySQL accepts nearly any character inside a quoted identifier, so only the
/// hard limits are checked here:
/// - not empty, and not ending in a space
/// - at most 64 characters
/// - no NUL or other control characters
///
/// Reserved words are fine because every identifier is quoted.
///
/// # Examples
///
/// ```
/// # use sqlite_mysql_migrator::utils::validate_mysql_identifier;
/// assert!(validate_mysql_identifier("users").is_ok());
/// assert!(validate_mysql_identifier("order").is_ok());
/// assert!(validate_mysql_identifier("").is_err());
/// assert!(validate_mysql_identifier(&"x".repeat(65)).is_err());
/// ```
pub fn validate_mysql_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        bail!("Identifier cannot be empty");
    }

    let length = identifier.chars().count();
    if length > MAX_MYSQL_IDENTIFIER_LENGTH {
        bail!(
            "Identifier '{}' exceeds MySQL's maximum length of {} characters (got {})",
            sanitize_identifier(identifier),
            MAX_MYSQL_IDENTIFIER_LENGTH,
            length
        );
    }

    if identifier.ends_with(' ') {
        bail!(
            "Identifier '{}' ends with a space, which MySQL does not allow",
            sanitize_identifier(identifier)
        );
    }

    if let Some(c) = identifier.chars().find(|c| c.is_control()) {
        bail!(
            "Identifier '{}' contains control character \\x{:02x}",
            sanitize_identifier(identifier),
            c as u32
        );
    }

    Ok(())
}

/// Sanitize an identifier for display
///
/// Removes control characters and limits length to prevent log injection
/// and keep error messages readable.
///
/// **Note**: This is for display purposes only. For SQL safety, quote the
/// identifier and bind values as parameters.
///
/// # Examples
///
/// ```
/// # use sqlite_mysql_migrator::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("normal_table"), "normal_table");
/// assert_eq!(sanitize_identifier("table\x00name"), "tablename");
/// assert_eq!(sanitize_identifier("table\nname"), "tablename");
///
/// let long_name = "a".repeat(200);
/// assert_eq!(sanitize_identifier(&long_name).len(), 100);
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Name a generated constraint or index, e.g. `fk_orders_0`
///
/// When the plain name would exceed MySQL's limit, the table part is
/// shortened and an 8-digit hash of the full table name is inserted, so the
/// ordinal always survives and long tables sharing a prefix stay distinct.
///
/// # Examples
///
/// ```
/// # use sqlite_mysql_migrator::utils::constraint_name;
/// assert_eq!(constraint_name("fk", "orders", 0), "fk_orders_0");
///
/// let long = "t".repeat(62);
/// let first = constraint_name("fk", &long, 0);
/// assert!(first.chars().count() <= 64);
/// assert!(first.ends_with("_0"));
/// assert_ne!(first, constraint_name("fk", &long, 1));
/// ```
pub fn constraint_name(prefix: &str, table: &str, ordinal: impl Display) -> String {
    let plain = format!("{}_{}_{}", prefix, table, ordinal);
    if plain.chars().count() <= MAX_MYSQL_IDENTIFIER_LENGTH {
        return plain;
    }

    let digest = format!("{:x}", Sha256::digest(table.as_bytes()));
    let suffix = format!("_{}_{}", &digest[..8], ordinal);
    let budget = MAX_MYSQL_IDENTIFIER_LENGTH
        .saturating_sub(prefix.chars().count() + 1 + suffix.chars().count());
    let shortened: String = table.chars().take(budget).collect();

    format!("{}_{}{}", prefix, shortened, suffix)
}
