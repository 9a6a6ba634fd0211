//! Filter inputs, the predicate derived from them, and page descriptors.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::errors::{FilterError, ServiceError};
use crate::table::{SYMBOL_COLUMN, TRADE_DATE_COLUMN};

/// Raw filter values as supplied by a caller. Blank values mean "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Filters {
    pub date: Option<String>,
    pub symbol: Option<String>,
}

impl Filters {
    pub fn new(date: Option<&str>, symbol: Option<&str>) -> Self {
        Filters {
            date: date.map(str::to_string),
            symbol: symbol.map(str::to_string),
        }
    }

    /// Build the exact-match predicate from the non-blank fields only.
    pub fn to_predicate(&self) -> Result<Predicate, FilterError> {
        let mut clauses = Vec::new();

        if let Some(date) = non_blank(self.date.as_deref()) {
            clauses.push(Clause {
                column: TRADE_DATE_COLUMN,
                value: PredicateValue::Date(parse_date(date.trim())?),
            });
        }
        if let Some(symbol) = non_blank(self.symbol.as_deref()) {
            clauses.push(Clause {
                column: SYMBOL_COLUMN,
                value: PredicateValue::Text(symbol.to_string()),
            });
        }

        Ok(Predicate { clauses })
    }
}

/// Blankness is judged on the trimmed value; the value itself is kept as given.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Accepts a plain calendar date or an RFC 3339 timestamp (taken in UTC).
fn parse_date(raw: &str) -> Result<NaiveDate, FilterError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc).date_naive()))
        .map_err(|_| FilterError::InvalidDate(raw.to_string()))
}

/// Value side of one equality clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateValue {
    Date(NaiveDate),
    Text(String),
}

impl fmt::Display for PredicateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            PredicateValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// `column = value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub column: &'static str,
    pub value: PredicateValue,
}

/// Conjunction of equality clauses. Empty means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn value_for(&self, column: &str) -> Option<&PredicateValue> {
        self.clauses
            .iter()
            .find(|c| c.column == column)
            .map(|c| &c.value)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} = {}", clause.column, clause.value)?;
        }
        f.write_str("}")
    }
}

/// A 1-based page number and a page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDescriptor {
    page: u32,
    page_size: u32,
}

impl PageDescriptor {
    pub fn new(page: u32, page_size: u32) -> Result<Self, ServiceError> {
        if page == 0 || page_size == 0 {
            return Err(ServiceError::InvalidPage { page, page_size });
        }
        Ok(PageDescriptor { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }

    /// Number of pages needed to show `total` rows.
    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit())
    }
}
