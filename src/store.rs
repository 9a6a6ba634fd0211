//! store.rs
//!
//! The read/count boundary to the backing database, and its Postgres
//! implementation built on dynamic `sqlx` queries.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::types::BigDecimal;
use sqlx::{Column, PgPool, Postgres, QueryBuilder, Row, TypeInfo, ValueRef};
use tracing::{debug, warn};

use crate::errors::{StoreError, StoreOp};
use crate::metrics::{STORE_QUERY_COUNTER, STORE_QUERY_HISTOGRAM};
use crate::normalize::{RawRecord, StoreValue};
use crate::query::{Predicate, PredicateValue};
use crate::table::LogicalTable;

/// Generic read/count access to one logical table at a time.
///
/// Implementations must apply `predicate` identically in every operation so
/// that a count always describes the same row set a read would return.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// At most `limit` matching rows, skipping the first `offset`.
    async fn read_window(
        &self,
        table: LogicalTable,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RawRecord>, StoreError>;

    /// Every matching row, or the first `cap` of them when a cap is given.
    async fn read_all(
        &self,
        table: LogicalTable,
        predicate: &Predicate,
        cap: Option<u64>,
    ) -> Result<Vec<RawRecord>, StoreError>;

    /// Number of matching rows, ignoring any paging.
    async fn count(&self, table: LogicalTable, predicate: &Predicate) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    async fn read_window(
        &self,
        table: LogicalTable,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RawRecord>, StoreError> {
        (**self).read_window(table, predicate, offset, limit).await
    }

    async fn read_all(
        &self,
        table: LogicalTable,
        predicate: &Predicate,
        cap: Option<u64>,
    ) -> Result<Vec<RawRecord>, StoreError> {
        (**self).read_all(table, predicate, cap).await
    }

    async fn count(&self, table: LogicalTable, predicate: &Predicate) -> Result<u64, StoreError> {
        (**self).count(table, predicate).await
    }
}

/// Postgres-backed store over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn read_window(
        &self,
        table: LogicalTable,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RawRecord>, StoreError> {
        let mut qb = select(table, predicate, "*");
        qb.push(" OFFSET ").push_bind(to_i64(offset));
        qb.push(" LIMIT ").push_bind(to_i64(limit));

        let start = Instant::now();
        STORE_QUERY_COUNTER.inc();
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::new(StoreOp::ReadWindow, table, predicate, e))?;
        STORE_QUERY_HISTOGRAM.observe(start.elapsed().as_secs_f64());

        rows.iter()
            .map(decode_row)
            .collect::<Result<_, _>>()
            .map_err(|e| StoreError::new(StoreOp::ReadWindow, table, predicate, e))
    }

    async fn read_all(
        &self,
        table: LogicalTable,
        predicate: &Predicate,
        cap: Option<u64>,
    ) -> Result<Vec<RawRecord>, StoreError> {
        let mut qb = select(table, predicate, "*");
        if let Some(cap) = cap {
            qb.push(" LIMIT ").push_bind(to_i64(cap));
        }

        let start = Instant::now();
        STORE_QUERY_COUNTER.inc();

        // Decode while streaming so only normalized-ready rows are buffered.
        let mut out = Vec::new();
        let mut rows = qb.build().fetch(&self.pool);
        while let Some(row) = rows
            .try_next()
            .await
            .map_err(|e| StoreError::new(StoreOp::ReadAll, table, predicate, e))?
        {
            out.push(
                decode_row(&row).map_err(|e| StoreError::new(StoreOp::ReadAll, table, predicate, e))?,
            );
        }
        STORE_QUERY_HISTOGRAM.observe(start.elapsed().as_secs_f64());

        debug!(table = %table, rows = out.len(), "Streamed full result set");
        Ok(out)
    }

    async fn count(&self, table: LogicalTable, predicate: &Predicate) -> Result<u64, StoreError> {
        let mut qb = select(table, predicate, "COUNT(*)");

        let start = Instant::now();
        STORE_QUERY_COUNTER.inc();
        let total = qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::new(StoreOp::Count, table, predicate, e))?;
        STORE_QUERY_HISTOGRAM.observe(start.elapsed().as_secs_f64());

        Ok(u64::try_from(total).unwrap_or_default())
    }
}

/// `SELECT <projection> FROM <relation> [WHERE col = $n AND ...]`
///
/// Column names come from the fixed table constants, never from callers;
/// every value goes through a bind parameter.
pub(crate) fn select(
    table: LogicalTable,
    predicate: &Predicate,
    projection: &str,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {projection} FROM {}", table.relation()));
    for (i, clause) in predicate.clauses().iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(format!("\"{}\" = ", clause.column));
        match &clause.value {
            PredicateValue::Date(d) => qb.push_bind(*d),
            PredicateValue::Text(s) => qb.push_bind(s.clone()),
        };
    }
    qb
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Decode a row of unknown shape by inspecting each column's Postgres type.
fn decode_row(row: &PgRow) -> Result<RawRecord, sqlx::Error> {
    let mut record = Vec::with_capacity(row.columns().len());
    for column in row.columns() {
        let idx = column.ordinal();
        let value = if row.try_get_raw(idx)?.is_null() {
            StoreValue::Null
        } else {
            decode_value(row, idx, column.type_info().name())?
        };
        record.push((column.name().to_string(), value));
    }
    Ok(record)
}

fn decode_value(row: &PgRow, idx: usize, type_name: &str) -> Result<StoreValue, sqlx::Error> {
    let value = match type_name {
        "BOOL" => StoreValue::Bool(row.try_get(idx)?),
        "INT2" => StoreValue::Int(row.try_get::<i16, _>(idx)?.into()),
        "INT4" => StoreValue::Int(row.try_get::<i32, _>(idx)?.into()),
        "INT8" => StoreValue::Int(row.try_get(idx)?),
        "FLOAT4" => StoreValue::Float(row.try_get::<f32, _>(idx)?.into()),
        "FLOAT8" => StoreValue::Float(row.try_get(idx)?),
        "NUMERIC" => numeric_value(row.try_get::<Decimal, _>(idx), || {
            row.try_get::<BigDecimal, _>(idx)
        }),
        "DATE" => StoreValue::Date(row.try_get::<NaiveDate, _>(idx)?),
        "TIMESTAMP" => StoreValue::Timestamp(row.try_get::<NaiveDateTime, _>(idx)?),
        "TIMESTAMPTZ" => StoreValue::TimestampTz(row.try_get::<DateTime<Utc>, _>(idx)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => StoreValue::Text(row.try_get(idx)?),
        other => match row.try_get::<String, _>(idx) {
            Ok(text) => StoreValue::Text(text),
            Err(_) => {
                let raw = row.try_get_raw(idx)?;
                if raw.is_null() {
                    StoreValue::Null
                } else {
                    raw_value(other, raw.as_bytes().map_err(sqlx::Error::Decode)?)
                }
            }
        },
    };
    Ok(value)
}

/// NUMERIC is arbitrary precision: values outside `rust_decimal`'s range are
/// kept as decimal text, and only NaN (undecodable either way) becomes null.
fn numeric_value(
    narrow: Result<Decimal, sqlx::Error>,
    wide: impl FnOnce() -> Result<BigDecimal, sqlx::Error>,
) -> StoreValue {
    match narrow {
        Ok(d) => StoreValue::Decimal(d),
        Err(_) => match wide() {
            Ok(big) => StoreValue::WideDecimal(big.to_string()),
            Err(e) => {
                warn!(error = %e, "NUMERIC value not representable, emitting null");
                StoreValue::Null
            }
        },
    }
}

/// Fallback for column types with no dedicated decoder: UTF-8 payloads pass
/// through as text, anything else is rendered as `\x`-prefixed hex.
fn raw_value(pg_type: &str, bytes: &[u8]) -> StoreValue {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            debug!(pg_type, "Decoded unsupported column type as text");
            StoreValue::Text(text.to_string())
        }
        Err(_) => {
            warn!(pg_type, len = bytes.len(), "Unsupported binary column type, emitting hex");
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            StoreValue::Text(format!("\\x{hex}"))
        }
    }
}
