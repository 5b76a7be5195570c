// ABOUTME: Structural description of source tables and columns
// ABOUTME: Classifies SQLite declared types into a fixed set of source type tags

use serde::Serialize;

/// Integer width hint carried by an INTEGER source column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IntegerWidth {
    Standard,
    Wide,
}

/// Source type tag of a column, derived from its declared SQLite type.
///
/// SQLite columns have an affinity rather than a fixed type. The
/// classification follows SQLite's affinity rules, refined so that boolean
/// and date/time declarations keep their meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SourceType {
    Integer(IntegerWidth),
    /// INTEGER affinity used as 0/1
    Boolean,
    Real,
    Text { length: Option<u32> },
    Blob,
    Numeric { precision: Option<(u32, u32)> },
    Date,
    DateTime,
    Time,
    /// No declared type, or one with no known meaning
    Unknown(String),
}

impl SourceType {
    /// Classify a declared column type such as `VARCHAR(255)` or `UNSIGNED BIG INT`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sqlite_mysql_migrator::migration::descriptor::{IntegerWidth, SourceType};
    /// assert_eq!(SourceType::classify("INTEGER"), SourceType::Integer(IntegerWidth::Standard));
    /// assert_eq!(SourceType::classify("varchar(40)"), SourceType::Text { length: Some(40) });
    /// assert_eq!(SourceType::classify(""), SourceType::Unknown(String::new()));
    /// ```
    pub fn classify(declared: &str) -> SourceType {
        let upper = declared.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return SourceType::Unknown(String::new());
        }

        let (base, args) = split_type_arguments(&upper);

        if matches!(base.as_str(), "BOOL" | "BOOLEAN" | "BIT")
            || (base == "TINYINT" && args.first() == Some(&1))
        {
            return SourceType::Boolean;
        }

        if base.contains("INT") {
            let wide = base.contains("BIG")
                || base == "INT8"
                || args.first().map(|w| *w >= 10).unwrap_or(false);
            return SourceType::Integer(if wide {
                IntegerWidth::Wide
            } else {
                IntegerWidth::Standard
            });
        }

        if base.contains("CHAR") || base.contains("CLOB") || base.contains("TEXT") {
            return SourceType::Text {
                length: args.first().copied(),
            };
        }

        if base.contains("BLOB") {
            return SourceType::Blob;
        }

        if base.contains("REAL") || base.contains("FLOA") || base.contains("DOUB") {
            return SourceType::Real;
        }

        match base.as_str() {
            "NUMERIC" | "DECIMAL" => SourceType::Numeric {
                precision: match args.as_slice() {
                    [p] => Some((*p, 0)),
                    [p, s] => Some((*p, *s)),
                    _ => None,
                },
            },
            "DATE" => SourceType::Date,
            "DATETIME" | "TIMESTAMP" => SourceType::DateTime,
            "TIME" => SourceType::Time,
            _ => SourceType::Unknown(declared.trim().to_string()),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, SourceType::Integer(_) | SourceType::Boolean)
    }
}

/// Split `DECIMAL(10, 2)` into `("DECIMAL", [10, 2])`.
///
/// Unparseable arguments are dropped.
fn split_type_arguments(upper: &str) -> (String, Vec<u32>) {
    match upper.find('(') {
        Some(open) => {
            let base = upper[..open].trim().to_string();
            let inner = upper[open + 1..].trim_end_matches(')');
            let args = inner
                .split(',')
                .filter_map(|arg| arg.trim().parse::<u32>().ok())
                .collect();
            (base, args)
        }
        None => (upper.to_string(), Vec::new()),
    }
}

/// One column of a source table. Immutable once read from the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type exactly as written in the source schema
    pub declared_type: String,
    pub source_type: SourceType,
    pub nullable: bool,
    /// Default expression as SQLite reports it (e.g. `'abc'`, `0`, `CURRENT_TIMESTAMP`)
    pub default: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        let declared_type = declared_type.into();
        Self {
            name: name.into(),
            source_type: SourceType::classify(&declared_type),
            declared_type,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Foreign key declared on a source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    /// Position of the constraint within its table (SQLite's `id`)
    pub id: i64,
    pub columns: Vec<String>,
    pub referenced_table: String,
    /// Empty when the constraint references the parent's primary key implicitly
    pub referenced_columns: Vec<String>,
    pub on_update: String,
    pub on_delete: String,
}

/// Secondary index or UNIQUE constraint on a source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDescriptor {
    pub name: String,
    /// Indexed column names; `None` where SQLite indexes an expression
    pub columns: Vec<Option<String>>,
    pub unique: bool,
    /// Declared through a UNIQUE constraint rather than `CREATE INDEX`
    pub from_constraint: bool,
    /// Has a WHERE clause
    pub partial: bool,
}

/// Structural description of one source table.
///
/// Created by introspecting the source, consumed by the schema translator
/// and the row batcher, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    /// Primary key column names in key order
    pub primary_key: Vec<String>,
    /// Declared with AUTOINCREMENT
    pub autoincrement: bool,
    /// Declared WITHOUT ROWID; rows are then ordered by primary key
    pub without_rowid: bool,
    pub foreign_keys: Vec<ForeignKey>,
    /// Secondary indexes, primary key excluded
    pub indexes: Vec<IndexDescriptor>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: Vec::new(),
            autoincrement: false,
            without_rowid: false,
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key.iter().any(|pk| pk == column)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}
