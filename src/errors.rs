//! Centralised error types for the viewer.
//!
//! Two layers are kept apart on purpose: [`StoreError`] carries everything
//! needed to diagnose a failed store operation and is only ever logged, while
//! [`ServiceError`] is what crosses the boundary to callers.

use std::fmt;

use thiserror::Error;

use crate::query::Predicate;
use crate::table::LogicalTable;

/// Startup and server-level failures.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Invalid bind address {0}: {1}")]
    Addr(String, #[source] std::net::AddrParseError),

    #[error("HTTP server error: {0}")]
    Server(#[from] hyper::Error),
}

/// Errors surfaced to callers of the retrieval and export services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    #[error("Invalid page descriptor: page={page}, page_size={page_size}")]
    InvalidPage { page: u32, page_size: u32 },

    #[error("Export exceeds the configured limit of {cap} rows")]
    ExportTooLarge { cap: u64 },

    #[error("Failed to fetch data")]
    FetchFailed,
}

/// The store operation that was running when a [`StoreError`] occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    BuildPredicate,
    ReadWindow,
    ReadAll,
    Count,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::BuildPredicate => "build_predicate",
            StoreOp::ReadWindow => "read_window",
            StoreOp::ReadAll => "read_all",
            StoreOp::Count => "count",
        };
        f.write_str(name)
    }
}

/// Underlying cause of a store failure.
#[derive(Error, Debug)]
pub enum StoreCause {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("{0}")]
    Other(String),
}

/// Internal, structured description of a failed store access.
///
/// Never returned to callers; the services log it and answer with
/// [`ServiceError::FetchFailed`].
#[derive(Error, Debug)]
#[error("{op} on {table} failed (predicate: {predicate}): {cause}")]
pub struct StoreError {
    pub op: StoreOp,
    pub table: LogicalTable,
    pub predicate: Predicate,
    #[source]
    pub cause: StoreCause,
}

impl StoreError {
    pub fn new(
        op: StoreOp,
        table: LogicalTable,
        predicate: &Predicate,
        cause: impl Into<StoreCause>,
    ) -> Self {
        StoreError {
            op,
            table,
            predicate: predicate.clone(),
            cause: cause.into(),
        }
    }
}

/// Filter values that cannot be turned into a predicate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Unparseable date filter {0:?}")]
    InvalidDate(String),
}

/// Login and session verification failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid Credentials")]
    InvalidCredentials,

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Unknown or expired session")]
    InvalidSession,
}
