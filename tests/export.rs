//! Unpaged export against the in-memory store.

mod common;

use common::{market_store, Call};
use output_viewer::errors::ServiceError;
use output_viewer::query::Filters;
use output_viewer::service::Viewer;
use output_viewer::table::LogicalTable;

#[tokio::test]
async fn export_contains_every_page() {
    let viewer = Viewer::new(market_store());
    let filters = Filters::new(Some("2024-01-02"), None);

    let all = viewer.export_all("CM_Output", &filters).await.unwrap();
    assert_eq!(all.len(), 45);

    for page in 1..=5 {
        let result = viewer.fetch_page("CM_Output", &filters, page, 10).await.unwrap();
        for row in &result.rows {
            assert!(all.contains(row), "page {page} row {row:?} missing from export");
        }
    }
}

#[tokio::test]
async fn export_is_a_single_unbounded_read() {
    let store = market_store();
    let viewer = Viewer::new(store.clone());
    let filters = Filters::new(None, Some("INFY"));

    let rows = viewer.export_all("CM_Output", &filters).await.unwrap();

    assert_eq!(rows.len(), 42);
    assert_eq!(
        store.calls(),
        vec![Call::ReadAll {
            table: LogicalTable::CmOutput,
            predicate: filters.to_predicate().unwrap(),
            cap: None,
        }]
    );
}

#[tokio::test]
async fn export_within_cap_succeeds() {
    let store = market_store();
    let viewer = Viewer::new(store.clone()).with_export_row_cap(Some(8));

    let rows = viewer
        .export_all("CM_Output", &Filters::new(None, Some("TCS")))
        .await
        .unwrap();

    assert_eq!(rows.len(), 8);
    assert!(matches!(
        store.calls().as_slice(),
        [Call::ReadAll { cap: Some(9), .. }]
    ));
}

#[tokio::test]
async fn export_over_cap_is_refused() {
    let viewer = Viewer::new(market_store()).with_export_row_cap(Some(7));

    let err = viewer
        .export_all("CM_Output", &Filters::new(None, Some("TCS")))
        .await
        .unwrap_err();

    assert_eq!(err, ServiceError::ExportTooLarge { cap: 7 });
}

#[tokio::test]
async fn export_rejects_unknown_table_without_store_access() {
    let store = market_store();
    let viewer = Viewer::new(store.clone());

    let err = viewer
        .export_all("Table2", &Filters::default())
        .await
        .unwrap_err();

    assert_eq!(err, ServiceError::InvalidTable("Table2".into()));
    assert_eq!(store.accesses(), 0);
}

#[tokio::test]
async fn export_failure_is_generic() {
    let store = market_store();
    store.fail();
    let viewer = Viewer::new(store.clone());

    let err = viewer
        .export_all("FnO_Output", &Filters::default())
        .await
        .unwrap_err();

    assert_eq!(err, ServiceError::FetchFailed);
}
