use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use histsync_shared::constants::*;
use histsync_shared::{DeletionRequest, DumpRequest, EncHistoryEntry, UpdateInfo};
use histsync_store::Database;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::verify_basic_auth;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::janitor;
use crate::release::ReleaseResolver;


type Params = Query<HashMap<String, String>>;

/// Everything a handler needs. Built once in `main` and cloned per request;
/// the relay keeps no other process-wide state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub release: Arc<ReleaseResolver>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn lock_db(&self) -> Result<MutexGuard<'_, Database>, ServerError> {
        self.db
            .lock()
            .map_err(|e| ServerError::Internal(format!("Database lock poisoned: {e}")))
    }

    /// Run `f` against the database on the blocking pool, so large writes
    /// and lock waits never stall a runtime worker.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&mut Database) -> Result<T, ServerError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|e| ServerError::Internal(format!("Database lock poisoned: {e}")))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| ServerError::Internal(format!("Database task failed: {e}")))?
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route(PATH_SUBMIT, post(submit))
        .route(PATH_REGISTER, get(register).post(register))
        .route(PATH_BOOTSTRAP, get(bootstrap))
        .route(PATH_QUERY, get(query))
        .route(PATH_GET_DUMP_REQUESTS, get(get_dump_requests))
        .route(PATH_SUBMIT_DUMP, post(submit_dump))
        .route(PATH_ADD_DELETION_REQUEST, post(add_deletion_request))
        .route(PATH_GET_DELETION_REQUESTS, get(get_deletion_requests))
        .route(PATH_DOWNLOAD, get(download))
        .route(PATH_BANNER, get(banner))
        .route(PATH_TRIGGER_CRON, get(trigger_cron).post(trigger_cron))
        .route(PATH_USAGE_STATS, get(usage_stats));

    if state.config.test_mode {
        router = router.route(PATH_WIPE_DB, get(wipe_db).post(wipe_db));
    }

    router
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Decode a JSON request body. Content-Type is not checked; clients are
/// not required to send one.
fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ServerError> {
    serde_json::from_slice(body)
        .map_err(|e| ServerError::BadRequest(format!("invalid json body: {e}")))
}

/// A query parameter that must be present and non-empty.
fn required<'a>(params: &'a HashMap<String, String>, name: &str) -> Result<&'a str, ServerError> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::BadRequest(format!("missing required query param={name:?}")))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ─── Entry relay ───

async fn submit(State(state): State<AppState>, body: Bytes) -> Result<(), ServerError> {
    let entries: Vec<EncHistoryEntry> = parse_json_body(&body)?;
    let count = entries.len();

    let inserted = state
        .with_db(move |db| Ok(db.submit_entries(&entries)?))
        .await?;
    info!(entries = count, rows = inserted, "Fanned out submitted entries");
    Ok(())
}

async fn register(
    State(state): State<AppState>,
    Query(params): Params,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<(), ServerError> {
    let user_id = required(&params, "user_id")?;
    let device_id = required(&params, "device_id")?;
    let trust_proxy = state.config.trust_proxy_headers;
    let source_ip = client_ip(&headers, connect_info.as_ref(), trust_proxy)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let needs_dump = state
        .lock_db()?
        .register_device(user_id, device_id, &source_ip)?;
    info!(user_id, device_id, ip = %source_ip, needs_dump, "Registered device");
    Ok(())
}

async fn bootstrap(
    State(state): State<AppState>,
    Query(params): Params,
) -> Result<Json<Vec<EncHistoryEntry>>, ServerError> {
    let user_id = required(&params, "user_id")?;
    let device_id = required(&params, "device_id")?;

    let db = state.lock_db()?;
    db.record_usage(user_id, device_id, 0)?;
    let entries = db.bootstrap_entries(user_id)?;
    debug!(user_id, device_id, entries = entries.len(), "Bootstrap");
    Ok(Json(entries))
}

async fn query(
    State(state): State<AppState>,
    Query(params): Params,
) -> Result<Json<Vec<EncHistoryEntry>>, ServerError> {
    let user_id = required(&params, "user_id")?;
    let device_id = required(&params, "device_id")?;

    let mut db = state.lock_db()?;
    db.record_usage(user_id, device_id, 0)?;
    let entries = db.query_entries(user_id, device_id)?;
    debug!(user_id, device_id, entries = entries.len(), "Query");
    Ok(Json(entries))
}

// ─── Dump exchange ───

async fn get_dump_requests(
    State(state): State<AppState>,
    Query(params): Params,
) -> Result<Json<Vec<DumpRequest>>, ServerError> {
    let user_id = required(&params, "user_id")?;
    let device_id = required(&params, "device_id")?;

    let requests = state.lock_db()?.pending_dump_requests(user_id, device_id)?;
    Ok(Json(requests))
}

async fn submit_dump(
    State(state): State<AppState>,
    Query(params): Params,
    body: Bytes,
) -> Result<(), ServerError> {
    let user_id = required(&params, "user_id")?.to_string();
    let source_device_id = required(&params, "source_device_id")?.to_string();
    let requesting_device_id = required(&params, "requesting_device_id")?.to_string();
    let entries: Vec<EncHistoryEntry> = parse_json_body(&body)?;

    state
        .with_db(move |db| {
            let inserted =
                db.submit_dump(&user_id, &source_device_id, &requesting_device_id, &entries)?;
            info!(
                user_id = %user_id,
                source_device_id = %source_device_id,
                requesting_device_id = %requesting_device_id,
                entries = inserted,
                "Applied dump"
            );
            Ok(())
        })
        .await
}

// ─── Deletion propagation ───

async fn add_deletion_request(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(), ServerError> {
    let request: DeletionRequest = parse_json_body(&body)?;
    let user_id = request.user_id.clone();
    let messages = request.messages.ids.len();

    let deleted = state
        .with_db(move |db| Ok(db.add_deletion_request(&request)?))
        .await?;
    info!(
        user_id = %user_id,
        messages,
        deleted,
        "Stored deletion request"
    );
    Ok(())
}

async fn get_deletion_requests(
    State(state): State<AppState>,
    Query(params): Params,
) -> Result<Json<Vec<DeletionRequest>>, ServerError> {
    let user_id = required(&params, "user_id")?;
    let device_id = required(&params, "device_id")?;

    let requests = state
        .lock_db()?
        .pending_deletion_requests(user_id, device_id)?;
    Ok(Json(requests))
}

// ─── Releases and maintenance ───

async fn download(State(state): State<AppState>) -> Json<UpdateInfo> {
    Json(state.release.update_info().await)
}

async fn banner(Query(params): Params) -> Result<String, ServerError> {
    let commit_hash = required(&params, "commit_hash")?;
    let device_id = required(&params, "device_id")?;
    let forced_banner = params.get("forced_banner").cloned().unwrap_or_default();

    debug!(commit_hash, device_id, forced_banner = %forced_banner, "Banner");
    Ok(forced_banner)
}

async fn trigger_cron(State(state): State<AppState>) {
    janitor::run_cycle(&state).await;
}

async fn wipe_db(State(state): State<AppState>) -> Result<(), ServerError> {
    if !state.config.test_mode {
        return Err(ServerError::NotFound);
    }
    let deleted = state.lock_db()?.wipe_entries()?;
    info!(deleted, "Wiped entry store");
    Ok(())
}

/// Tab-delimited per-user report, one line per user.
async fn usage_stats(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServerError> {
    verify_basic_auth(&headers, &state.config)?;

    let report = state.lock_db()?.usage_report()?;
    let mut body = String::new();
    for row in report {
        body.push_str(&format!(
            "Registered: {}\tNumDevices: {}\tNumEntries: {}\tLastUsed: {}\n",
            row.registration_date.format("%Y-%m-%d"),
            row.num_devices,
            row.num_entries,
            row.last_used.format("%Y-%m-%d"),
        ));
    }

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}

/// Address of the caller. Proxy headers (first X-Forwarded-For hop, then
/// X-Real-IP) are only consulted when `trust_proxy_headers` is set;
/// otherwise the socket peer is used.
fn client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy_headers: bool,
) -> Option<IpAddr> {
    let header_ip = |name: &str, first_hop: bool| -> Option<IpAddr> {
        if !trust_proxy_headers {
            return None;
        }
        let value = headers.get(name)?.to_str().ok()?;
        let candidate = if first_hop {
            value.split(',').next()?
        } else {
            value
        };
        candidate.trim().parse().ok()
    };

    header_ip("x-forwarded-for", true)
        .or_else(|| header_ip("x-real-ip", false))
        .or_else(|| connect_info.map(|info| info.0.ip()))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
