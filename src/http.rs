//! http.rs
//!
//! The HTTP surface: login/logout, table listing, paged rows, CSV export,
//! plus `/metrics` and `/healthz`. Routing is a plain `(method, path)` match.

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::auth::{bearer_token, SessionStore};
use crate::config::Settings;
use crate::csv_export::to_csv;
use crate::errors::{AuthError, ServiceError};
use crate::metrics::{self, HTTP_REQUESTS};
use crate::normalize::Record;
use crate::query::Filters;
use crate::search::filter_rows;
use crate::service::Viewer;
use crate::store::RecordStore;

/// Everything a request handler needs.
pub struct AppState<S> {
    pub viewer: Viewer<S>,
    pub sessions: SessionStore,
    pub settings: Settings,
}

impl<S: RecordStore> AppState<S> {
    pub fn new(store: S, settings: Settings) -> Self {
        AppState {
            viewer: Viewer::new(store).with_export_row_cap(settings.export_row_cap),
            sessions: SessionStore::new(settings.users.clone(), settings.session_ttl),
            settings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Health,
    Metrics,
    Login,
    Logout,
    Tables,
    Rows(String),
    Export(String),
    NotFound,
}

impl Route {
    fn resolve(method: &Method, path: &str) -> Self {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match (method, segments.as_slice()) {
            (&Method::GET, ["healthz"]) => Route::Health,
            (&Method::GET, ["metrics"]) => Route::Metrics,
            (&Method::POST, ["api", "login"]) => Route::Login,
            (&Method::POST, ["api", "logout"]) => Route::Logout,
            (&Method::GET, ["api", "tables"]) => Route::Tables,
            (&Method::GET, ["api", "tables", table, "rows"]) => Route::Rows(table.to_string()),
            (&Method::GET, ["api", "tables", table, "export"]) => Route::Export(table.to_string()),
            _ => Route::NotFound,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Route::Health => "healthz",
            Route::Metrics => "metrics",
            Route::Login => "login",
            Route::Logout => "logout",
            Route::Tables => "tables",
            Route::Rows(_) => "rows",
            Route::Export(_) => "export",
            Route::NotFound => "not_found",
        }
    }

    fn requires_session(&self) -> bool {
        matches!(
            self,
            Route::Logout | Route::Tables | Route::Rows(_) | Route::Export(_)
        )
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RowsResponse {
    data: Vec<Record>,
    total_rows: u64,
    page: u32,
    page_size: u32,
    total_pages: u64,
}

/// Serve one request. Never fails at the hyper level; every error becomes a
/// status code.
pub async fn handle<S: RecordStore>(
    state: Arc<AppState<S>>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let route = Route::resolve(req.method(), req.uri().path());

    let response = if route.requires_session() {
        match authorize(&state, &req) {
            Ok(_) => dispatch(&state, &route, req).await,
            Err(e) => error_response(StatusCode::UNAUTHORIZED, &e.to_string()),
        }
    } else {
        dispatch(&state, &route, req).await
    };

    HTTP_REQUESTS
        .with_label_values(&[route.label(), response.status().as_str()])
        .inc();
    Ok(response)
}

fn authorize<S>(state: &AppState<S>, req: &Request<Body>) -> Result<String, AuthError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = bearer_token(header)?;
    state.sessions.verify(token)
}

async fn dispatch<S: RecordStore>(
    state: &AppState<S>,
    route: &Route,
    req: Request<Body>,
) -> Response<Body> {
    match route {
        Route::Health => text_response(StatusCode::OK, "OK"),
        Route::Metrics => {
            let mut resp = Response::new(Body::from(metrics::gather_metrics()));
            if let Ok(mime) = HeaderValue::from_str(TextEncoder::new().format_type()) {
                resp.headers_mut().insert(CONTENT_TYPE, mime);
            }
            resp
        }
        Route::Login => login(state, req).await,
        Route::Logout => {
            let header = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok());
            if let Ok(token) = bearer_token(header) {
                state.sessions.revoke(token);
            }
            Response::builder()
                .status(StatusCode::NO_CONTENT)
                .body(Body::empty())
                .unwrap_or_default()
        }
        Route::Tables => {
            let names: Vec<&str> = state.viewer.tables().iter().map(|t| t.name()).collect();
            json_response(StatusCode::OK, &names)
        }
        Route::Rows(table) => rows(state, table, query_params(&req)).await,
        Route::Export(table) => export(state, table, query_params(&req)).await,
        Route::NotFound => error_response(StatusCode::NOT_FOUND, "Not found"),
    }
}

async fn login<S>(state: &AppState<S>, req: Request<Body>) -> Response<Body> {
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to read login body");
            return error_response(StatusCode::BAD_REQUEST, "Unreadable request body");
        }
    };
    let creds: LoginRequest = match serde_json::from_slice(&body) {
        Ok(creds) => creds,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Expected {username, password}"),
    };

    match state.sessions.login(&creds.username, &creds.password) {
        Ok(issued) => json_response(
            StatusCode::OK,
            &json!({
                "token": issued.token,
                "expiresInSecs": issued.expires_in.as_secs(),
            }),
        ),
        Err(e) => error_response(StatusCode::UNAUTHORIZED, &e.to_string()),
    }
}

async fn rows<S: RecordStore>(
    state: &AppState<S>,
    table: &str,
    params: HashMap<String, String>,
) -> Response<Body> {
    let page = match parse_u32(&params, "page") {
        Ok(page) => page.unwrap_or(1),
        Err(resp) => return resp,
    };
    let page_size = match parse_u32(&params, "page_size") {
        Ok(size) => state.settings.effective_page_size(size),
        Err(resp) => return resp,
    };
    let filters = filters_from(&params);

    match state.viewer.fetch_page(table, &filters, page, page_size).await {
        Ok(result) => {
            let total_pages = result.total_pages();
            let data = match params.get("q") {
                Some(term) => filter_rows(result.rows, term),
                None => result.rows,
            };
            json_response(
                StatusCode::OK,
                &RowsResponse {
                    data,
                    total_rows: result.total_count,
                    page: result.page.page(),
                    page_size: result.page.page_size(),
                    total_pages,
                },
            )
        }
        Err(e) => service_error_response(&e),
    }
}

async fn export<S: RecordStore>(
    state: &AppState<S>,
    table: &str,
    params: HashMap<String, String>,
) -> Response<Body> {
    let filters = filters_from(&params);

    let rows = match state.viewer.export_all(table, &filters).await {
        Ok(rows) => rows,
        Err(e) => return service_error_response(&e),
    };
    let csv = match to_csv(&rows) {
        Ok(csv) => csv,
        Err(e) => {
            error!(table, error = %e, "Failed to serialize export");
            return service_error_response(&ServiceError::FetchFailed);
        }
    };
    info!(table, rows = rows.len(), bytes = csv.len(), "Serving CSV export");

    let mut resp = Response::new(Body::from(csv));
    let headers = resp.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8"));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{table}.csv\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    headers.insert(CONTENT_DISPOSITION, disposition);
    resp
}

fn query_params(req: &Request<Body>) -> HashMap<String, String> {
    req.uri()
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn filters_from(params: &HashMap<String, String>) -> Filters {
    Filters {
        date: params.get("date").cloned(),
        symbol: params.get("symbol").cloned(),
    }
}

fn parse_u32(params: &HashMap<String, String>, key: &str) -> Result<Option<u32>, Response<Body>> {
    match params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            error_response(
                StatusCode::BAD_REQUEST,
                &format!("Query parameter `{key}` must be a non-negative integer"),
            )
        }),
    }
}

fn service_error_response(err: &ServiceError) -> Response<Body> {
    let status = match err {
        ServiceError::InvalidTable(_) => StatusCode::NOT_FOUND,
        ServiceError::InvalidPage { .. } => StatusCode::BAD_REQUEST,
        ServiceError::ExportTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ServiceError::FetchFailed => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match err {
        ServiceError::InvalidTable(_) => "Invalid table name".to_string(),
        other => other.to_string(),
    };
    error_response(status, &message)
}

fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    json_response(status, &json!({ "error": message }))
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut resp = Response::new(Body::from(bytes));
            *resp.status_mut() = status;
            resp.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            resp
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize response body");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "")
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    resp
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<S, F>(
    state: Arc<AppState<S>>,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), hyper::Error>
where
    S: RecordStore + 'static,
    F: Future<Output = ()>,
{
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| handle(state.clone(), req)))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    info!(%addr, "Starting HTTP server");
    server.with_graceful_shutdown(shutdown).await
}
