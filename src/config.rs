// ABOUTME: Parses migration configuration files and merges command-line overrides
// ABOUTME: Converts TOML [source]/[destination]/[migration] tables into resolved Settings

use crate::filters::TableFilter;
use crate::migration::orchestrator::{MigrationOptions, OnTableError, DEFAULT_BATCH_SIZE};
use crate::sqlite::converter::TimestampUnit;
use crate::mysql::validate_mysql_url;
use anyhow::{bail, Context, Result};
use mysql_async::{Opts, OptsBuilder};
use serde::Deserialize;
use std::fs;

/// Connection attempts after the first failure, when not configured.
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;

const DEFAULT_MYSQL_PORT: u16 = 3306;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub path: Option<String>,
}

/// Destination as a URL or as separate connection fields.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    pub batch_size: Option<usize>,
    pub tables: Option<Vec<String>>,
    pub exclude_tables: Option<Vec<String>>,
    pub on_table_error: Option<OnTableError>,
    pub infer_booleans: Option<bool>,
    pub foreign_keys: Option<bool>,
    pub verify: Option<bool>,
    pub timestamp_unit: Option<TimestampUnit>,
    pub connect_retries: Option<u32>,
}

impl DestinationConfig {
    /// Connection options from `url`, or from the separate fields when no
    /// `url` is given.
    ///
    /// Field values go to the driver as they are, so passwords and user names
    /// need no escaping and IPv6 hosts are written without brackets.
    pub fn to_opts(&self) -> Result<Option<Opts>> {
        if let Some(url) = &self.url {
            if self.host.is_some() || self.database.is_some() {
                bail!("[destination] takes either 'url' or 'host'/'database' fields, not both");
            }
            return validate_mysql_url(url)
                .context("Invalid [destination] url")
                .map(Some);
        }

        let (host, database) = match (&self.host, &self.database) {
            (None, None) => return Ok(None),
            (Some(host), Some(database)) if !host.is_empty() && !database.is_empty() => {
                (host, database)
            }
            _ => bail!("[destination] needs both 'host' and 'database'"),
        };

        if self.password.is_some() && self.user.is_none() {
            bail!("[destination] 'password' given without 'user'");
        }

        let opts = OptsBuilder::default()
            .ip_or_hostname(host.as_str())
            .tcp_port(self.port.unwrap_or(DEFAULT_MYSQL_PORT))
            .user(self.user.as_deref())
            .pass(self.password.as_deref())
            .db_name(Some(database.as_str()));

        Ok(Some(opts.into()))
    }
}

pub fn load_config_file(path: &str) -> Result<ConfigFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path))?;
    let parsed: ConfigFile =
        toml::from_str(&raw).with_context(|| format!("Failed to parse TOML config at {}", path))?;
    Ok(parsed)
}

/// Values given on the command line (or through env fallbacks). `None` and
/// `false` mean "not given" and leave the config file value in place.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub source: Option<String>,
    pub target: Option<String>,
    pub batch_size: Option<usize>,
    pub tables: Option<Vec<String>>,
    pub exclude_tables: Option<Vec<String>>,
    pub on_table_error: Option<OnTableError>,
    pub no_foreign_keys: bool,
    pub no_verify: bool,
    pub no_infer_booleans: bool,
    pub timestamp_unit: Option<TimestampUnit>,
    pub connect_retries: Option<u32>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source_path: String,
    pub destination: Option<Opts>,
    pub infer_booleans: bool,
    pub connect_retries: u32,
    pub options: MigrationOptions,
}

impl Settings {
    /// Merge the optional config file with command-line overrides.
    ///
    /// Command-line values win. The source path is always required; the
    /// destination only by commands that write or compare.
    pub fn resolve(file: Option<ConfigFile>, cli: CliOverrides) -> Result<Self> {
        let file = file.unwrap_or_default();
        let migration = file.migration;

        let source_path = match cli.source.or(file.source.path) {
            Some(path) => path,
            None => bail!("No source database given. Use --source, SQLITE_PATH, or [source] path"),
        };

        let destination = match cli.target {
            Some(url) => Some(validate_mysql_url(&url)?),
            None => file.destination.to_opts()?,
        };

        let batch_size = cli
            .batch_size
            .or(migration.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            bail!("batch_size must be at least 1");
        }

        let tables = cli.tables.or(migration.tables);
        let exclude_tables = cli.exclude_tables.or(migration.exclude_tables);
        let table_filter = TableFilter::new(tables, exclude_tables)?;

        let options = MigrationOptions {
            batch_size,
            table_filter,
            on_table_error: cli
                .on_table_error
                .or(migration.on_table_error)
                .unwrap_or_default(),
            foreign_keys: !cli.no_foreign_keys && migration.foreign_keys.unwrap_or(true),
            verify: !cli.no_verify && migration.verify.unwrap_or(true),
            timestamp_unit: cli
                .timestamp_unit
                .or(migration.timestamp_unit)
                .unwrap_or_default(),
            show_progress: false,
        };

        Ok(Self {
            source_path,
            destination,
            infer_booleans: !cli.no_infer_booleans && migration.infer_booleans.unwrap_or(true),
            connect_retries: cli
                .connect_retries
                .or(migration.connect_retries)
                .unwrap_or(DEFAULT_CONNECT_RETRIES),
            options,
        })
    }

    /// The destination connection options, or an error naming the ways to provide them.
    pub fn require_destination(&self) -> Result<&Opts> {
        match &self.destination {
            Some(opts) => Ok(opts),
            None => bail!(
                "No destination database given. Use --target, MYSQL_URL, or a [destination] section"
            ),
        }
    }
}
