//! Conversion of store-native values into transmission-safe JSON values.
//!
//! Temporal values of every flavour are rendered as `YYYY-MM-DD`; numeric
//! (arbitrary precision) values become `f64` numbers. Everything else passes
//! through untouched. Normalization never fails.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};

/// A column value as decoded from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Decimal(Decimal),
    /// NUMERIC outside `Decimal`'s range, as exact decimal text.
    WideDecimal(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
}

impl StoreValue {
    /// Calendar day of a temporal value, if this is one.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            StoreValue::Date(d) => Some(*d),
            StoreValue::Timestamp(ts) => Some(ts.date()),
            StoreValue::TimestampTz(ts) => Some(ts.date_naive()),
            _ => None,
        }
    }
}

/// One row as returned by the store, columns in relation order.
pub type RawRecord = Vec<(String, StoreValue)>;

/// One normalized row, columns in relation order.
pub type Record = Map<String, Value>;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn normalize_value(value: StoreValue) -> Value {
    match value {
        StoreValue::Null => Value::Null,
        StoreValue::Bool(b) => Value::Bool(b),
        StoreValue::Int(i) => Value::from(i),
        StoreValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        StoreValue::Text(s) => Value::String(s),
        StoreValue::Decimal(d) => d
            .to_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(d.to_string())),
        StoreValue::WideDecimal(text) => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::String(text)),
        StoreValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
        StoreValue::Timestamp(ts) => Value::String(ts.format(DATE_FORMAT).to_string()),
        StoreValue::TimestampTz(ts) => Value::String(ts.format(DATE_FORMAT).to_string()),
    }
}

pub fn normalize_record(raw: RawRecord) -> Record {
    raw.into_iter()
        .map(|(column, value)| (column, normalize_value(value)))
        .collect()
}

pub fn normalize_records(raw: Vec<RawRecord>) -> Vec<Record> {
    raw.into_iter().map(normalize_record).collect()
}
