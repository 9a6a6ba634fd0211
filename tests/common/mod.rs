//! Shared fixtures: an in-memory `RecordStore` that records every call.

#![allow(dead_code)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use output_viewer::auth::password_digest;
use output_viewer::config::{Settings, UserCredential};
use output_viewer::errors::{StoreCause, StoreError, StoreOp};
use output_viewer::normalize::{RawRecord, StoreValue};
use output_viewer::query::{Predicate, PredicateValue};
use output_viewer::store::RecordStore;
use output_viewer::table::LogicalTable;

/// One store operation as seen by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ReadWindow {
        table: LogicalTable,
        predicate: Predicate,
        offset: u64,
        limit: u64,
    },
    ReadAll {
        table: LogicalTable,
        predicate: Predicate,
        cap: Option<u64>,
    },
    Count {
        table: LogicalTable,
        predicate: Predicate,
    },
}

#[derive(Default)]
pub struct MemoryStore {
    tables: HashMap<LogicalTable, Vec<RawRecord>>,
    accesses: AtomicUsize,
    calls: Mutex<Vec<Call>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, table: LogicalTable, rows: Vec<RawRecord>) -> Self {
        self.tables.insert(table, rows);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Make every subsequent store operation fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn accesses(&self) -> usize {
        self.accesses.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn enter(
        &self,
        call: Call,
        op: StoreOp,
        table: LogicalTable,
        predicate: &Predicate,
    ) -> Result<Vec<RawRecord>, StoreError> {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(call);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::new(
                op,
                table,
                predicate,
                StoreCause::Other("connection refused".into()),
            ));
        }
        Ok(self
            .tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| matches(r, predicate)).cloned().collect())
            .unwrap_or_default())
    }
}

fn matches(record: &RawRecord, predicate: &Predicate) -> bool {
    predicate.clauses().iter().all(|clause| {
        let value = record
            .iter()
            .find(|(column, _)| column == clause.column)
            .map(|(_, v)| v);
        match (&clause.value, value) {
            (PredicateValue::Date(d), Some(v)) => v.as_date() == Some(*d),
            (PredicateValue::Text(s), Some(StoreValue::Text(t))) => s == t,
            _ => false,
        }
    })
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn read_window(
        &self,
        table: LogicalTable,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RawRecord>, StoreError> {
        let call = Call::ReadWindow {
            table,
            predicate: predicate.clone(),
            offset,
            limit,
        };
        let rows = self.enter(call, StoreOp::ReadWindow, table, predicate)?;
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn read_all(
        &self,
        table: LogicalTable,
        predicate: &Predicate,
        cap: Option<u64>,
    ) -> Result<Vec<RawRecord>, StoreError> {
        let call = Call::ReadAll {
            table,
            predicate: predicate.clone(),
            cap,
        };
        let rows = self.enter(call, StoreOp::ReadAll, table, predicate)?;
        Ok(match cap {
            Some(cap) => rows.into_iter().take(cap as usize).collect(),
            None => rows,
        })
    }

    async fn count(&self, table: LogicalTable, predicate: &Predicate) -> Result<u64, StoreError> {
        let call = Call::Count {
            table,
            predicate: predicate.clone(),
        };
        Ok(self.enter(call, StoreOp::Count, table, predicate)?.len() as u64)
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// A CM_Output-shaped row.
pub fn row(trade_date: &str, symbol: &str, close: &str) -> RawRecord {
    vec![
        ("TradDt".to_string(), StoreValue::Date(date(trade_date))),
        ("TckrSymb".to_string(), StoreValue::Text(symbol.to_string())),
        ("ClsPric".to_string(), StoreValue::Decimal(Decimal::from_str(close).unwrap())),
    ]
}

/// 37 INFY rows on 2024-01-02, 5 INFY rows on 2024-01-03, 8 TCS rows on 2024-01-02.
pub fn market_rows() -> Vec<RawRecord> {
    let mut rows = Vec::new();
    for i in 0..37 {
        rows.push(row("2024-01-02", "INFY", &format!("{}.25", 1500 + i)));
    }
    for i in 0..5 {
        rows.push(row("2024-01-03", "INFY", &format!("{}.50", 1600 + i)));
    }
    for i in 0..8 {
        rows.push(row("2024-01-02", "TCS", &format!("{}.75", 3800 + i)));
    }
    rows
}

pub fn market_store() -> Arc<MemoryStore> {
    MemoryStore::new()
        .with_rows(LogicalTable::CmOutput, market_rows())
        .with_rows(
            LogicalTable::FnoOutput,
            vec![row("2024-01-02", "NIFTY", "21700.10")],
        )
        .shared()
}

pub const USERNAME: &str = "analyst";
pub const PASSWORD: &str = "s3cret";

pub fn settings() -> Settings {
    Settings {
        database_url: "postgres://unused".into(),
        server_bind: "127.0.0.1:0".into(),
        max_connections: 1,
        default_page_size: 10,
        max_page_size: 20,
        export_row_cap: None,
        session_ttl: Duration::from_secs(60),
        users: vec![UserCredential {
            username: USERNAME.into(),
            password_sha256: password_digest(PASSWORD),
        }],
    }
}
