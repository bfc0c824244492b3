//! Untyped MySQL row decoding into JSON values

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Number, Value};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

// `%.f` prints nothing for whole seconds and 3, 6 or 9 digits otherwise.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// How a column is decoded, derived from the driver's type name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Signed,
    Unsigned,
    Float,
    Double,
    Decimal,
    Date,
    Time,
    DateTime,
    Timestamp,
    Json,
    Bit,
    Binary,
    Text,
}

impl ValueKind {
    pub fn from_type_name(name: &str) -> Self {
        let name = name.to_ascii_uppercase();
        if name.ends_with(" UNSIGNED") || name == "YEAR" {
            return ValueKind::Unsigned;
        }
        match name.as_str() {
            "BOOLEAN" => ValueKind::Bool,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => ValueKind::Signed,
            "FLOAT" => ValueKind::Float,
            "DOUBLE" => ValueKind::Double,
            "DECIMAL" => ValueKind::Decimal,
            "DATE" => ValueKind::Date,
            "TIME" => ValueKind::Time,
            "DATETIME" => ValueKind::DateTime,
            "TIMESTAMP" => ValueKind::Timestamp,
            "JSON" => ValueKind::Json,
            "BIT" => ValueKind::Bit,
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB"
            | "GEOMETRY" => ValueKind::Binary,
            _ => ValueKind::Text,
        }
    }
}

/// All columns of a row, in order
pub fn row_values(row: &MySqlRow) -> Vec<Value> {
    (0..row.len()).map(|i| column_value(row, i)).collect()
}

/// A row as a column name to value object
pub fn row_object(row: &MySqlRow) -> Map<String, Value> {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), column_value(row, column.ordinal())))
        .collect()
}

fn column_value(row: &MySqlRow, index: usize) -> Value {
    let kind = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => ValueKind::from_type_name(raw.type_info().name()),
        Err(_) => return Value::Null,
    };
    or_raw(decode(row, index, kind), || {
        row.try_get_unchecked::<Vec<u8>, _>(index).ok()
    })
}

/// Values the typed decode rejects (zero dates, TIME beyond 24h) keep their
/// raw text instead of turning into NULL.
fn or_raw(typed: Option<Value>, raw: impl FnOnce() -> Option<Vec<u8>>) -> Value {
    typed
        .or_else(|| raw().map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
        .unwrap_or(Value::Null)
}

fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

fn format_time(value: &NaiveTime) -> String {
    value.format(TIME_FORMAT).to_string()
}

fn decode(row: &MySqlRow, index: usize, kind: ValueKind) -> Option<Value> {
    let value = match kind {
        ValueKind::Bool => Value::Bool(row.try_get::<bool, _>(index).ok()?),
        ValueKind::Signed => Value::from(row.try_get::<i64, _>(index).ok()?),
        ValueKind::Unsigned => Value::from(row.try_get_unchecked::<u64, _>(index).ok()?),
        ValueKind::Float => float(row.try_get::<f32, _>(index).ok()? as f64),
        ValueKind::Double => float(row.try_get::<f64, _>(index).ok()?),
        ValueKind::Decimal => Value::String(row.try_get_unchecked::<String, _>(index).ok()?),
        ValueKind::Date => Value::String(
            row.try_get::<NaiveDate, _>(index)
                .ok()?
                .format("%Y-%m-%d")
                .to_string(),
        ),
        ValueKind::Time => Value::String(format_time(&row.try_get::<NaiveTime, _>(index).ok()?)),
        ValueKind::DateTime => {
            Value::String(format_datetime(&row.try_get::<NaiveDateTime, _>(index).ok()?))
        }
        ValueKind::Timestamp => Value::String(format_datetime(
            &row.try_get::<DateTime<Utc>, _>(index).ok()?.naive_utc(),
        )),
        ValueKind::Json => {
            let text = row.try_get_unchecked::<String, _>(index).ok()?;
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        }
        ValueKind::Bit => Value::from(bits_to_u64(
            &row.try_get_unchecked::<Vec<u8>, _>(index).ok()?,
        )),
        ValueKind::Binary => Value::String(
            String::from_utf8_lossy(&row.try_get_unchecked::<Vec<u8>, _>(index).ok()?)
                .into_owned(),
        ),
        ValueKind::Text => Value::String(row.try_get_unchecked::<String, _>(index).ok()?),
    };
    Some(value)
}

/// Non-finite floats have no JSON form
fn float(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// BIT(n) columns arrive big-endian
fn bits_to_u64(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .take(8)
        .rev()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}
