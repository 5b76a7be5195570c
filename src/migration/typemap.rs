// ABOUTME: Type mapping between SQLite source tags and MySQL column types
// ABOUTME: Total over the source enumeration; unknown types fail loudly

use super::descriptor::{ColumnDescriptor, IntegerWidth, SourceType};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Longest VARCHAR that still fits a utf8mb4 row (65 535 bytes / 4).
pub const MAX_VARCHAR_LENGTH: u32 = 16_383;

/// Length used for unbounded TEXT columns that take part in a primary key.
pub const KEY_VARCHAR_LENGTH: u32 = 255;

/// Characters of utf8mb4 text that fit InnoDB's 3072-byte index key limit.
pub const MAX_KEY_CHARACTERS: u32 = 768;

/// Prefix length indexed for TEXT, BLOB and over-long VARCHAR columns.
pub const INDEX_PREFIX_LENGTH: u32 = 191;

/// Byte capacity of MySQL TEXT and BLOB columns.
pub const TEXT_BLOB_CAPACITY: usize = 65_535;

const MAX_DECIMAL_PRECISION: u32 = 65;
const MAX_DECIMAL_SCALE: u32 = 30;

/// MySQL column type a source column is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DestinationType {
    Int,
    BigInt,
    /// `TINYINT(1)`, MySQL's boolean
    TinyIntBool,
    Double,
    Decimal { precision: u32, scale: u32 },
    Varchar(u32),
    Text,
    Blob,
    Date,
    DateTime,
    Time,
}

impl DestinationType {
    /// Whether MySQL requires the expression form `DEFAULT (...)` for literal defaults.
    pub fn requires_expression_default(&self) -> bool {
        matches!(self, DestinationType::Text | DestinationType::Blob)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DestinationType::Int | DestinationType::BigInt | DestinationType::TinyIntBool
        )
    }
}

impl fmt::Display for DestinationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationType::Int => write!(f, "INT"),
            DestinationType::BigInt => write!(f, "BIGINT"),
            DestinationType::TinyIntBool => write!(f, "TINYINT(1)"),
            DestinationType::Double => write!(f, "DOUBLE"),
            DestinationType::Decimal { precision, scale } => {
                write!(f, "DECIMAL({},{})", precision, scale)
            }
            DestinationType::Varchar(n) => write!(f, "VARCHAR({})", n),
            DestinationType::Text => write!(f, "TEXT"),
            DestinationType::Blob => write!(f, "BLOB"),
            DestinationType::Date => write!(f, "DATE"),
            DestinationType::DateTime => write!(f, "DATETIME"),
            DestinationType::Time => write!(f, "TIME"),
        }
    }
}

/// A source type tag with no MySQL counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported source type '{tag}'")]
pub struct UnsupportedTypeError {
    pub tag: String,
}

/// Map a source type tag to its MySQL type.
///
/// `in_primary_key` narrows unbounded TEXT to `VARCHAR(255)`, since MySQL
/// cannot index a TEXT column without a prefix length.
///
/// # Examples
///
/// ```
/// # use sqlite_mysql_migrator::migration::descriptor::{IntegerWidth, SourceType};
/// # use sqlite_mysql_migrator::migration::typemap::{map_type, DestinationType};
/// let mapped = map_type(&SourceType::Integer(IntegerWidth::Standard), false).unwrap();
/// assert_eq!(mapped, DestinationType::Int);
/// assert!(map_type(&SourceType::Unknown(String::new()), false).is_err());
/// ```
pub fn map_type(
    source: &SourceType,
    in_primary_key: bool,
) -> Result<DestinationType, UnsupportedTypeError> {
    let mapped = match source {
        SourceType::Integer(IntegerWidth::Standard) => DestinationType::Int,
        SourceType::Integer(IntegerWidth::Wide) => DestinationType::BigInt,
        SourceType::Boolean => DestinationType::TinyIntBool,
        SourceType::Real => DestinationType::Double,
        SourceType::Text { length: Some(n) } if *n > 0 && *n <= MAX_VARCHAR_LENGTH => {
            DestinationType::Varchar(*n)
        }
        SourceType::Text { .. } if in_primary_key => DestinationType::Varchar(KEY_VARCHAR_LENGTH),
        SourceType::Text { .. } => DestinationType::Text,
        SourceType::Blob => DestinationType::Blob,
        SourceType::Numeric { precision: None } => DestinationType::Double,
        SourceType::Numeric {
            precision: Some((precision, scale)),
        } => {
            if *precision == 0
                || *precision > MAX_DECIMAL_PRECISION
                || *scale > MAX_DECIMAL_SCALE
                || scale > precision
            {
                return Err(UnsupportedTypeError {
                    tag: format!("NUMERIC({},{})", precision, scale),
                });
            }
            DestinationType::Decimal {
                precision: *precision,
                scale: *scale,
            }
        }
        SourceType::Date => DestinationType::Date,
        SourceType::DateTime => DestinationType::DateTime,
        SourceType::Time => DestinationType::Time,
        SourceType::Unknown(declared) => {
            return Err(UnsupportedTypeError {
                tag: if declared.is_empty() {
                    "<no declared type>".to_string()
                } else {
                    declared.clone()
                },
            })
        }
    };

    Ok(mapped)
}

/// Map a column, taking its primary key membership into account.
pub fn map_column(
    column: &ColumnDescriptor,
    in_primary_key: bool,
) -> Result<DestinationType, UnsupportedTypeError> {
    map_type(&column.source_type, in_primary_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_mapping_table() {
        let cases = vec![
            (
                SourceType::Integer(IntegerWidth::Standard),
                DestinationType::Int,
            ),
            (
                SourceType::Integer(IntegerWidth::Wide),
                DestinationType::BigInt,
            ),
            (SourceType::Real, DestinationType::Double),
            (SourceType::Text { length: None }, DestinationType::Text),
            (
                SourceType::Text { length: Some(80) },
                DestinationType::Varchar(80),
            ),
            (SourceType::Blob, DestinationType::Blob),
            (SourceType::Boolean, DestinationType::TinyIntBool),
        ];

        for (source, expected) in cases {
            assert_eq!(
                map_type(&source, false).unwrap(),
                expected,
                "mapping of {:?}",
                source
            );
        }
    }

    #[test]
    fn test_unbounded_text_is_never_varchar_outside_keys() {
        assert_eq!(
            map_type(&SourceType::Text { length: None }, false).unwrap(),
            DestinationType::Text
        );
        assert_eq!(
            map_type(&SourceType::Text { length: Some(100_000) }, false).unwrap(),
            DestinationType::Text
        );
    }

    #[test]
    fn test_key_text_becomes_varchar() {
        assert_eq!(
            map_type(&SourceType::Text { length: None }, true).unwrap(),
            DestinationType::Varchar(KEY_VARCHAR_LENGTH)
        );
        assert_eq!(
            map_type(&SourceType::Text { length: Some(36) }, true).unwrap(),
            DestinationType::Varchar(36)
        );
    }

    #[test]
    fn test_numeric_precision() {
        assert_eq!(
            map_type(&SourceType::Numeric { precision: None }, false).unwrap(),
            DestinationType::Double
        );
        assert_eq!(
            map_type(
                &SourceType::Numeric {
                    precision: Some((10, 2))
                },
                false
            )
            .unwrap(),
            DestinationType::Decimal {
                precision: 10,
                scale: 2
            }
        );
        assert!(map_type(
            &SourceType::Numeric {
                precision: Some((70, 2))
            },
            false
        )
        .is_err());
    }

    #[test]
    fn test_unknown_types_fail_naming_the_tag() {
        let err = map_type(&SourceType::Unknown("GEOMETRY".into()), false).unwrap_err();
        assert_eq!(err.tag, "GEOMETRY");

        let err = map_type(&SourceType::Unknown(String::new()), false).unwrap_err();
        assert!(err.to_string().contains("no declared type"));
    }

    #[test]
    fn test_render() {
        assert_eq!(DestinationType::TinyIntBool.to_string(), "TINYINT(1)");
        assert_eq!(DestinationType::Varchar(12).to_string(), "VARCHAR(12)");
        assert_eq!(
            DestinationType::Decimal {
                precision: 8,
                scale: 3
            }
            .to_string(),
            "DECIMAL(8,3)"
        );
    }
}
