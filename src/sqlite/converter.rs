// ABOUTME: SQLite to MySQL value conversion for batched inserts
// ABOUTME: Explicit per-type coercions with range checks instead of silent truncation

use crate::migration::typemap::{DestinationType, TEXT_BLOB_CAPACITY};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::Value as MysqlValue;
use rusqlite::types::Value as SqliteValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unit of integer epoch values stored in date/time columns.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TimestampUnit {
    #[default]
    #[serde(alias = "ms")]
    #[value(alias = "ms")]
    Milliseconds,
    #[serde(alias = "s")]
    #[value(alias = "s")]
    Seconds,
}

/// Why a value could not be represented in its destination column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConversionError(String);

impl ConversionError {
    fn new(message: impl Into<String>) -> Self {
        ConversionError(message.into())
    }
}

type ConversionResult = Result<MysqlValue, ConversionError>;

/// Convert a single SQLite value for a MySQL column of type `target`
///
/// Conversions by destination type:
/// - INT / BIGINT / TINYINT(1) → integers, range-checked; integral reals and numeric text accepted
/// - DOUBLE → floats; integers widened; NaN and infinities rejected
/// - DECIMAL(p,s) → decimal text with at most `p - s` integer digits
/// - VARCHAR(n) / TEXT → UTF-8 text within the column's capacity
/// - BLOB → bytes within the column's capacity
/// - DATE / DATETIME / TIME → ISO-8601 text or integer Unix epochs
/// - NULL → NULL for every type
///
/// Boolean-as-integer values pass through unchanged.
///
/// # Examples
///
/// ```
/// # use sqlite_mysql_migrator::sqlite::converter::{convert_value, TimestampUnit};
/// # use sqlite_mysql_migrator::migration::typemap::DestinationType;
/// # use rusqlite::types::Value;
/// let converted =
///     convert_value(Value::Integer(1), DestinationType::TinyIntBool, TimestampUnit::Seconds).unwrap();
/// assert_eq!(converted, mysql_async::Value::Int(1));
///
/// let overflow = convert_value(Value::Integer(300), DestinationType::TinyIntBool, TimestampUnit::Seconds);
/// assert!(overflow.is_err());
/// ```
pub fn convert_value(
    value: SqliteValue,
    target: DestinationType,
    unit: TimestampUnit,
) -> ConversionResult {
    if let SqliteValue::Null = value {
        return Ok(MysqlValue::NULL);
    }

    match target {
        DestinationType::Int => to_integer(value, i32::MIN as i64, i32::MAX as i64, "INT"),
        DestinationType::BigInt => to_integer(value, i64::MIN, i64::MAX, "BIGINT"),
        DestinationType::TinyIntBool => {
            to_integer(value, i8::MIN as i64, i8::MAX as i64, "TINYINT(1)")
        }
        DestinationType::Double => to_double(value),
        DestinationType::Decimal { precision, scale } => to_decimal(value, precision, scale),
        DestinationType::Varchar(length) => {
            let text = to_text(value)?;
            let chars = text.chars().count();
            if chars > length as usize {
                return Err(ConversionError::new(format!(
                    "text of {} characters exceeds VARCHAR({})",
                    chars, length
                )));
            }
            Ok(MysqlValue::Bytes(text.into_bytes()))
        }
        DestinationType::Text => {
            let text = to_text(value)?;
            check_capacity(text.len(), "TEXT")?;
            Ok(MysqlValue::Bytes(text.into_bytes()))
        }
        DestinationType::Blob => {
            let bytes = match value {
                SqliteValue::Blob(b) => b,
                SqliteValue::Text(s) => s.into_bytes(),
                SqliteValue::Integer(i) => i.to_string().into_bytes(),
                SqliteValue::Real(f) => f.to_string().into_bytes(),
                SqliteValue::Null => return Ok(MysqlValue::NULL),
            };
            check_capacity(bytes.len(), "BLOB")?;
            Ok(MysqlValue::Bytes(bytes))
        }
        DestinationType::Date => {
            let dt = to_datetime(value, unit)?;
            Ok(MysqlValue::Date(
                dt.year() as u16,
                dt.month() as u8,
                dt.day() as u8,
                0,
                0,
                0,
                0,
            ))
        }
        DestinationType::DateTime => {
            let dt = to_datetime(value, unit)?;
            Ok(MysqlValue::Date(
                dt.year() as u16,
                dt.month() as u8,
                dt.day() as u8,
                dt.hour() as u8,
                dt.minute() as u8,
                dt.second() as u8,
                dt.nanosecond() / 1_000,
            ))
        }
        DestinationType::Time => {
            let time = to_time(value)?;
            Ok(MysqlValue::Time(
                false,
                0,
                time.hour() as u8,
                time.minute() as u8,
                time.second() as u8,
                time.nanosecond() / 1_000,
            ))
        }
    }
}

fn to_integer(value: SqliteValue, min: i64, max: i64, type_name: &str) -> ConversionResult {
    let int = match value {
        SqliteValue::Integer(i) => i,
        SqliteValue::Real(f) => {
            if f.fract() != 0.0 || !f.is_finite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
                return Err(ConversionError::new(format!(
                    "real value {} is not an integer",
                    f
                )));
            }
            f as i64
        }
        SqliteValue::Text(s) => s.trim().parse::<i64>().map_err(|_| {
            ConversionError::new(format!("text '{}' is not an integer", truncate(&s)))
        })?,
        SqliteValue::Blob(_) => {
            return Err(ConversionError::new(format!(
                "BLOB value cannot be stored in {}",
                type_name
            )))
        }
        SqliteValue::Null => return Ok(MysqlValue::NULL),
    };

    if int < min || int > max {
        return Err(ConversionError::new(format!(
            "value {} is out of range for {}",
            int, type_name
        )));
    }

    Ok(MysqlValue::Int(int))
}

fn to_double(value: SqliteValue) -> ConversionResult {
    let float = match value {
        SqliteValue::Integer(i) => i as f64,
        SqliteValue::Real(f) => f,
        SqliteValue::Text(s) => s.trim().parse::<f64>().map_err(|_| {
            ConversionError::new(format!("text '{}' is not a number", truncate(&s)))
        })?,
        SqliteValue::Blob(_) => {
            return Err(ConversionError::new("BLOB value cannot be stored in DOUBLE"))
        }
        SqliteValue::Null => return Ok(MysqlValue::NULL),
    };

    if !float.is_finite() {
        return Err(ConversionError::new(format!(
            "non-finite value {} cannot be stored in DOUBLE",
            float
        )));
    }

    Ok(MysqlValue::Double(float))
}

fn to_decimal(value: SqliteValue, precision: u32, scale: u32) -> ConversionResult {
    let text = match value {
        SqliteValue::Integer(i) => i.to_string(),
        SqliteValue::Real(f) if f.is_finite() => format!("{:.*}", scale as usize, f),
        SqliteValue::Real(f) => {
            return Err(ConversionError::new(format!(
                "non-finite value {} cannot be stored in DECIMAL",
                f
            )))
        }
        SqliteValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.parse::<f64>().map(|f| !f.is_finite()).unwrap_or(true)
                || trimmed.contains(['e', 'E'])
            {
                return Err(ConversionError::new(format!(
                    "text '{}' is not a decimal number",
                    truncate(&s)
                )));
            }
            trimmed.to_string()
        }
        SqliteValue::Blob(_) => {
            return Err(ConversionError::new("BLOB value cannot be stored in DECIMAL"))
        }
        SqliteValue::Null => return Ok(MysqlValue::NULL),
    };

    let integer_part = text
        .trim_start_matches(['-', '+'])
        .split('.')
        .next()
        .unwrap_or("")
        .trim_start_matches('0');
    let allowed = precision.saturating_sub(scale) as usize;
    if integer_part.len() > allowed {
        return Err(ConversionError::new(format!(
            "value {} has more than {} integer digits for DECIMAL({},{})",
            text, allowed, precision, scale
        )));
    }

    Ok(MysqlValue::Bytes(text.into_bytes()))
}

fn to_text(value: SqliteValue) -> Result<String, ConversionError> {
    match value {
        SqliteValue::Text(s) => Ok(s),
        SqliteValue::Integer(i) => Ok(i.to_string()),
        SqliteValue::Real(f) => Ok(f.to_string()),
        SqliteValue::Blob(b) => String::from_utf8(b)
            .map_err(|_| ConversionError::new("BLOB value is not valid UTF-8 text")),
        SqliteValue::Null => Ok(String::new()),
    }
}

fn check_capacity(len: usize, type_name: &str) -> Result<(), ConversionError> {
    if len > TEXT_BLOB_CAPACITY {
        return Err(ConversionError::new(format!(
            "{} bytes exceed the {} byte capacity of {}",
            len, TEXT_BLOB_CAPACITY, type_name
        )));
    }
    Ok(())
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

fn to_datetime(value: SqliteValue, unit: TimestampUnit) -> Result<NaiveDateTime, ConversionError> {
    let parsed = match value {
        SqliteValue::Integer(epoch) => {
            let dt = match unit {
                TimestampUnit::Milliseconds => DateTime::from_timestamp_millis(epoch),
                TimestampUnit::Seconds => DateTime::from_timestamp(epoch, 0),
            };
            dt.map(|dt| dt.naive_utc()).ok_or_else(|| {
                ConversionError::new(format!("epoch {} is out of range", epoch))
            })?
        }
        SqliteValue::Text(s) => parse_datetime_text(s.trim())
            .ok_or_else(|| ConversionError::new(format!("text '{}' is not a date/time", truncate(&s))))?,
        SqliteValue::Real(f) => {
            return Err(ConversionError::new(format!(
                "real value {} cannot be interpreted as a date/time",
                f
            )))
        }
        SqliteValue::Blob(_) => {
            return Err(ConversionError::new(
                "BLOB value cannot be interpreted as a date/time",
            ))
        }
        SqliteValue::Null => {
            return Err(ConversionError::new("NULL has no date/time representation"))
        }
    };

    if !(1000..=9999).contains(&parsed.year()) {
        return Err(ConversionError::new(format!(
            "date {} is outside MySQL's supported range",
            parsed
        )));
    }

    Ok(parsed)
}

fn parse_datetime_text(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }

    let text = text.strip_suffix('Z').unwrap_or(text);
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn to_time(value: SqliteValue) -> Result<NaiveTime, ConversionError> {
    match value {
        SqliteValue::Text(s) => {
            let trimmed = s.trim();
            NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
                .map_err(|_| {
                    ConversionError::new(format!("text '{}' is not a time of day", truncate(&s)))
                })
        }
        other => Err(ConversionError::new(format!(
            "{} value cannot be stored in TIME",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &SqliteValue) -> &'static str {
    match value {
        SqliteValue::Null => "NULL",
        SqliteValue::Integer(_) => "INTEGER",
        SqliteValue::Real(_) => "REAL",
        SqliteValue::Text(_) => "TEXT",
        SqliteValue::Blob(_) => "BLOB",
    }
}

fn truncate(text: &str) -> String {
    crate::utils::sanitize_identifier(&text.chars().take(40).collect::<String>())
}
