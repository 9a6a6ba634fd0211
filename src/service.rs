//! service.rs
//!
//! Retrieval and export over the closed table set. Both operations validate
//! the table before touching the store, derive one predicate from the
//! filters, and collapse any store failure into [`ServiceError::FetchFailed`]
//! after logging the structured cause.

use tracing::{error, info, warn};

use crate::errors::{ServiceError, StoreError, StoreOp};
use crate::metrics::{EXPORTED_ROWS_COUNTER, FETCH_FAILURE_COUNTER};
use crate::normalize::{normalize_records, Record};
use crate::query::{Filters, PageDescriptor, Predicate};
use crate::store::RecordStore;
use crate::table::LogicalTable;

/// One page of normalized rows plus the size of the whole matching set.
///
/// Rows come back in the store's default order. No sort is requested, so
/// consecutive pages are only consistent if that order is stable; `total_count`
/// is read separately from the page and may disagree with it under concurrent
/// writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    pub rows: Vec<Record>,
    pub total_count: u64,
    pub page: PageDescriptor,
}

impl ResultPage {
    pub fn total_pages(&self) -> u64 {
        self.page.total_pages(self.total_count)
    }
}

/// Retrieval and export front-end over a [`RecordStore`].
#[derive(Debug, Clone)]
pub struct Viewer<S> {
    store: S,
    export_row_cap: Option<u64>,
}

impl<S: RecordStore> Viewer<S> {
    pub fn new(store: S) -> Self {
        Viewer {
            store,
            export_row_cap: None,
        }
    }

    /// Refuse exports that would return more than `cap` rows.
    pub fn with_export_row_cap(mut self, cap: Option<u64>) -> Self {
        self.export_row_cap = cap;
        self
    }

    pub fn tables(&self) -> &'static [LogicalTable] {
        &LogicalTable::ALL
    }

    /// Fetch one page of `table` matching `filters`, plus the total match count.
    pub async fn fetch_page(
        &self,
        table: &str,
        filters: &Filters,
        page: u32,
        page_size: u32,
    ) -> Result<ResultPage, ServiceError> {
        let table: LogicalTable = table.parse()?;
        let page = PageDescriptor::new(page, page_size)?;
        let predicate = self.predicate(table, filters)?;

        let raw = self
            .store
            .read_window(table, &predicate, page.offset(), page.limit())
            .await
            .map_err(fetch_failed)?;
        let total_count = self
            .store
            .count(table, &predicate)
            .await
            .map_err(fetch_failed)?;

        info!(
            table = %table,
            page = page.page(),
            page_size = page.page_size(),
            rows = raw.len(),
            total = total_count,
            "Fetched page"
        );

        Ok(ResultPage {
            rows: normalize_records(raw),
            total_count,
            page,
        })
    }

    /// Fetch every row of `table` matching `filters`.
    pub async fn export_all(
        &self,
        table: &str,
        filters: &Filters,
    ) -> Result<Vec<Record>, ServiceError> {
        let table: LogicalTable = table.parse()?;
        let predicate = self.predicate(table, filters)?;

        // Read one row past the cap so an oversized export is detected, not truncated.
        let read_limit = self.export_row_cap.map(|cap| cap.saturating_add(1));
        let raw = self
            .store
            .read_all(table, &predicate, read_limit)
            .await
            .map_err(fetch_failed)?;

        if let Some(cap) = self.export_row_cap {
            if raw.len() as u64 > cap {
                warn!(table = %table, cap, predicate = %predicate, "Export exceeds row cap");
                return Err(ServiceError::ExportTooLarge { cap });
            }
        }

        info!(table = %table, rows = raw.len(), predicate = %predicate, "Exported rows");
        EXPORTED_ROWS_COUNTER.inc_by(raw.len() as u64);

        Ok(normalize_records(raw))
    }

    fn predicate(&self, table: LogicalTable, filters: &Filters) -> Result<Predicate, ServiceError> {
        filters.to_predicate().map_err(|e| {
            fetch_failed(StoreError::new(
                StoreOp::BuildPredicate,
                table,
                &Predicate::default(),
                e,
            ))
        })
    }
}

/// Log the internal failure in full and hand back the opaque public error.
fn fetch_failed(err: StoreError) -> ServiceError {
    FETCH_FAILURE_COUNTER.inc();
    error!(
        op = %err.op,
        table = %err.table,
        predicate = %err.predicate,
        error = %err.cause,
        "Store access failed"
    );
    ServiceError::FetchFailed
}
