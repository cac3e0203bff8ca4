//! Driver-native scalar values → JSON-safe values.
//!
//! One rule set, three drivers: SQL NULL becomes the empty string, byte
//! sequences decode lossily to text, timestamps take the fixed
//! `YYYY-MM-DD HH:MM:SS` form, dates `YYYY-MM-DD`, and everything else
//! passes through as its JSON-native type. Dispatch is on the driver's own
//! type names so each backend keeps its native decode path.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Number, Value};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo};

/// A normalized result row: column name → JSON-safe value.
pub type ResultRow = Map<String, Value>;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn empty() -> Value {
    Value::String(String::new())
}

fn opt<T>(value: Option<T>, f: impl FnOnce(T) -> Value) -> Value {
    value.map(f).unwrap_or_else(empty)
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or_else(empty)
}

fn datetime(v: NaiveDateTime) -> Value {
    Value::String(v.format(DATETIME_FORMAT).to_string())
}

fn datetime_utc(v: DateTime<Utc>) -> Value {
    Value::String(v.format(DATETIME_FORMAT).to_string())
}

fn date(v: NaiveDate) -> Value {
    Value::String(v.format(DATE_FORMAT).to_string())
}

fn time(v: NaiveTime) -> Value {
    Value::String(v.format(TIME_FORMAT).to_string())
}

fn text(v: String) -> Value {
    Value::String(v)
}

fn bytes(v: Vec<u8>) -> Value {
    Value::String(String::from_utf8_lossy(&v).into_owned())
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

pub fn sqlite_row(row: &SqliteRow) -> Result<ResultRow, sqlx::Error> {
    let mut out = ResultRow::new();
    for column in row.columns() {
        let i = column.ordinal();
        let value = match column.type_info().name() {
            "NULL" => empty(),
            "INTEGER" | "INT" | "INT4" | "INT8" | "BIGINT" => {
                opt(row.try_get::<Option<i64>, _>(i)?, |v| Value::Number(v.into()))
            }
            "REAL" => opt(row.try_get::<Option<f64>, _>(i)?, float),
            "BOOLEAN" => opt(row.try_get::<Option<bool>, _>(i)?, Value::Bool),
            "DATETIME" | "TIMESTAMP" => opt(row.try_get::<Option<NaiveDateTime>, _>(i)?, datetime),
            "DATE" => opt(row.try_get::<Option<NaiveDate>, _>(i)?, date),
            "TIME" => opt(row.try_get::<Option<NaiveTime>, _>(i)?, time),
            "BLOB" => opt(row.try_get::<Option<Vec<u8>>, _>(i)?, bytes),
            _ => opt(row.try_get::<Option<String>, _>(i)?, text),
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// MySQL
// ---------------------------------------------------------------------------

pub fn mysql_row(row: &MySqlRow) -> Result<ResultRow, sqlx::Error> {
    let mut out = ResultRow::new();
    for column in row.columns() {
        let i = column.ordinal();
        let value = match column.type_info().name() {
            "BOOLEAN" | "TINYINT(1)" => opt(row.try_get::<Option<bool>, _>(i)?, Value::Bool),
            "TINYINT" => opt(row.try_get::<Option<i8>, _>(i)?, |v| {
                Value::Number(i64::from(v).into())
            }),
            "SMALLINT" => opt(row.try_get::<Option<i16>, _>(i)?, |v| {
                Value::Number(i64::from(v).into())
            }),
            "MEDIUMINT" | "INT" => opt(row.try_get::<Option<i32>, _>(i)?, |v| {
                Value::Number(i64::from(v).into())
            }),
            "BIGINT" => opt(row.try_get::<Option<i64>, _>(i)?, |v| Value::Number(v.into())),
            "TINYINT UNSIGNED" => opt(row.try_get::<Option<u8>, _>(i)?, |v| {
                Value::Number(u64::from(v).into())
            }),
            "SMALLINT UNSIGNED" => opt(row.try_get::<Option<u16>, _>(i)?, |v| {
                Value::Number(u64::from(v).into())
            }),
            "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => opt(row.try_get::<Option<u32>, _>(i)?, |v| {
                Value::Number(u64::from(v).into())
            }),
            "BIGINT UNSIGNED" => {
                opt(row.try_get::<Option<u64>, _>(i)?, |v| Value::Number(v.into()))
            }
            "FLOAT" => opt(row.try_get::<Option<f32>, _>(i)?, |v| float(f64::from(v))),
            "DOUBLE" => opt(row.try_get::<Option<f64>, _>(i)?, float),
            "DATETIME" => opt(row.try_get::<Option<NaiveDateTime>, _>(i)?, datetime),
            "TIMESTAMP" => opt(row.try_get::<Option<DateTime<Utc>>, _>(i)?, datetime_utc),
            "DATE" => opt(row.try_get::<Option<NaiveDate>, _>(i)?, date),
            "TIME" => opt(row.try_get::<Option<NaiveTime>, _>(i)?, time),
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                opt(row.try_get::<Option<Vec<u8>>, _>(i)?, bytes)
            }
            "JSON" => opt(row.try_get::<Option<Value>, _>(i)?, |v| v),
            _ => opt(row.try_get::<Option<String>, _>(i)?, text),
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

pub fn postgres_row(row: &PgRow) -> Result<ResultRow, sqlx::Error> {
    let mut out = ResultRow::new();
    for column in row.columns() {
        let i = column.ordinal();
        let value = match column.type_info().name() {
            "BOOL" => opt(row.try_get::<Option<bool>, _>(i)?, Value::Bool),
            "INT2" => opt(row.try_get::<Option<i16>, _>(i)?, |v| {
                Value::Number(i64::from(v).into())
            }),
            "INT4" => opt(row.try_get::<Option<i32>, _>(i)?, |v| {
                Value::Number(i64::from(v).into())
            }),
            "INT8" => opt(row.try_get::<Option<i64>, _>(i)?, |v| Value::Number(v.into())),
            "FLOAT4" => opt(row.try_get::<Option<f32>, _>(i)?, |v| float(f64::from(v))),
            "FLOAT8" => opt(row.try_get::<Option<f64>, _>(i)?, float),
            "TIMESTAMP" => opt(row.try_get::<Option<NaiveDateTime>, _>(i)?, datetime),
            "TIMESTAMPTZ" => opt(row.try_get::<Option<DateTime<Utc>>, _>(i)?, datetime_utc),
            "DATE" => opt(row.try_get::<Option<NaiveDate>, _>(i)?, date),
            "TIME" => opt(row.try_get::<Option<NaiveTime>, _>(i)?, time),
            "BYTEA" => opt(row.try_get::<Option<Vec<u8>>, _>(i)?, bytes),
            "JSON" | "JSONB" => opt(row.try_get::<Option<Value>, _>(i)?, |v| v),
            "UUID" => opt(row.try_get::<Option<sqlx::types::Uuid>, _>(i)?, |v| {
                Value::String(v.to_string())
            }),
            _ => opt(row.try_get::<Option<String>, _>(i)?, text),
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}
