// ABOUTME: Table filtering for selective migration
// ABOUTME: Handles table include (allow-list) and exclude patterns

use anyhow::{bail, Result};

/// Represents table filtering rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    include_tables: Option<Vec<String>>,
    exclude_tables: Option<Vec<String>>,
}

impl TableFilter {
    /// Creates a filter from CLI or config values
    ///
    /// Empty lists are treated as absent.
    pub fn new(
        include_tables: Option<Vec<String>>,
        exclude_tables: Option<Vec<String>>,
    ) -> Result<Self> {
        let include_tables = include_tables.filter(|t| !t.is_empty());
        let exclude_tables = exclude_tables.filter(|t| !t.is_empty());

        // Validate mutually exclusive flags
        if include_tables.is_some() && exclude_tables.is_some() {
            bail!("Cannot use both --tables and --exclude-tables");
        }

        for table in include_tables
            .iter()
            .flatten()
            .chain(exclude_tables.iter().flatten())
        {
            if table.trim().is_empty() {
                bail!("Table names in filters cannot be empty");
            }
        }

        Ok(Self {
            include_tables,
            exclude_tables,
        })
    }

    /// Creates an empty filter (migrate everything)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Checks if any filters are active
    pub fn is_empty(&self) -> bool {
        self.include_tables.is_none() && self.exclude_tables.is_none()
    }

    /// Determines if a table should be migrated
    pub fn should_migrate_table(&self, table_name: &str) -> bool {
        // If include list exists, table must be in it
        if let Some(ref include) = self.include_tables {
            if !include.iter().any(|t| t == table_name) {
                return false;
            }
        }

        // If exclude list exists, table must not be in it
        if let Some(ref exclude) = self.exclude_tables {
            if exclude.iter().any(|t| t == table_name) {
                return false;
            }
        }

        true
    }

    /// Allow-list entries that match none of `tables`
    pub fn unmatched_includes(&self, tables: &[String]) -> Vec<String> {
        self.include_tables
            .iter()
            .flatten()
            .filter(|wanted| !tables.contains(wanted))
            .cloned()
            .collect()
    }
}
