//! HTTP and WebSocket API over a shared [`Monitor`].
//!
//! Every JSON endpoint answers with `{"status":"success","data":...}` or,
//! on failure, a non-2xx code and `{"status":"error","detail":"..."}`.
//! Collection blocks (process spawns, CPU sampling), so handlers run it on
//! the blocking pool.

mod ws;

pub use ws::{Topic, WsCommand, parse_command};

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, Query, Request, State, WebSocketUpgrade,
        rejection::{PathRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use hostwatch_core::{
    DiskInfo, HostwatchError, JobAction, JobControlError, Monitor, PortEntry, RamInfo,
};

/// Shared server state.
pub struct AppState {
    monitor: Arc<Monitor>,
}

type SharedState = Arc<AppState>;

#[derive(Serialize)]
struct Envelope<T> {
    status: &'static str,
    data: T,
}

#[derive(Serialize)]
struct MessageResponse {
    status: &'static str,
    message: String,
}

#[derive(Serialize)]
struct MemoryResponse {
    ram: RamInfo,
    disk: DiskInfo,
}

#[derive(Serialize)]
struct ForeignResponse {
    foreign_connections: Vec<PortEntry>,
    alert: bool,
}

#[derive(Deserialize)]
struct PriceParams {
    price_per_kwh: f64,
}

fn success<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        status: "success",
        data,
    })
}

fn message(text: String) -> Json<MessageResponse> {
    Json(MessageResponse {
        status: "success",
        message: text,
    })
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failed request, rendered as `{"status":"error","detail":...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<HostwatchError> for ApiError {
    fn from(err: HostwatchError) -> Self {
        let status = match &err {
            HostwatchError::InvalidPrice(_) => StatusCode::BAD_REQUEST,
            HostwatchError::JobControl(JobControlError::NotTracked(_))
            | HostwatchError::JobControl(JobControlError::NoSuchProcess(_)) => {
                StatusCode::NOT_FOUND
            }
            HostwatchError::JobControl(JobControlError::PermissionDenied(_)) => {
                StatusCode::FORBIDDEN
            }
            HostwatchError::JobControl(JobControlError::Unsupported) => {
                StatusCode::NOT_IMPLEMENTED
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        log::error!("collection task failed: {err}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "collection task failed")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "status": "error",
            "detail": self.detail,
        });
        (self.status, Json(body)).into_response()
    }
}

/// Run `f` against the monitor on the blocking pool.
async fn collect<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Monitor) -> T + Send + 'static,
{
    let monitor = state.monitor.clone();
    Ok(tokio::task::spawn_blocking(move || f(&monitor)).await?)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle_index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "running",
        "name": "hostwatch",
        "version": hostwatch_core::VERSION,
        "endpoints": {
            "/health": "Health check",
            "/api/system": "CPU, RAM, disk and GPU snapshot",
            "/api/system/gpu": "GPUs only",
            "/api/system/cpu": "CPU only",
            "/api/system/memory": "RAM and disk",
            "/api/energy": "Power draw and electricity cost",
            "/api/energy/price": "POST ?price_per_kwh=<f64> to change the price",
            "/api/ports": "Full port report",
            "/api/ports/listening": "Listening sockets",
            "/api/ports/established": "Established connections",
            "/api/ports/foreign": "Connections from non-local peers",
            "/api/training": "Detected training jobs",
            "/api/training/{action}/{pid}": "POST stop, pause or resume a training job",
            "/ws": "WebSocket: system, energy, ports, training, all, interval:<secs>, stop",
        }
    }))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn handle_system(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(success(collect(&state, Monitor::system).await?))
}

async fn handle_gpu(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let gpus = collect(&state, |m| m.system_monitor().gpu().gpus()).await?;
    Ok(success(gpus))
}

async fn handle_cpu(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let cpu = collect(&state, |m| m.system_monitor().cpu()).await?;
    Ok(success(cpu))
}

async fn handle_memory(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let memory = collect(&state, |m| MemoryResponse {
        ram: m.system_monitor().ram(),
        disk: m.system_monitor().disk(),
    })
    .await?;
    Ok(success(memory))
}

async fn handle_energy(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(success(collect(&state, Monitor::energy).await?))
}

async fn handle_set_price(
    State(state): State<SharedState>,
    params: Result<Query<PriceParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) =
        params.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    state.monitor.set_electricity_price(params.price_per_kwh)?;
    Ok(message(format!(
        "electricity price set to {} {}/kWh",
        params.price_per_kwh, state.monitor.config().energy.currency
    )))
}

async fn handle_ports(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(success(collect(&state, Monitor::ports).await?))
}

async fn handle_listening(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let entries = collect(&state, |m| {
        m.ports().listening_ports().cloned().collect::<Vec<_>>()
    })
    .await?;
    Ok(success(entries))
}

async fn handle_established(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = collect(&state, |m| {
        m.ports()
            .established_connections()
            .cloned()
            .collect::<Vec<_>>()
    })
    .await?;
    Ok(success(entries))
}

async fn handle_foreign(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let foreign = collect(&state, |m| {
        let report = m.ports();
        ForeignResponse {
            foreign_connections: report.foreign_connections().cloned().collect(),
            alert: report.foreign_alert(),
        }
    })
    .await?;
    Ok(success(foreign))
}

async fn handle_training(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(success(collect(&state, Monitor::training).await?))
}

async fn handle_job_control(
    State(state): State<SharedState>,
    path: Result<Path<(String, u32)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((action, pid)) =
        path.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    let action: JobAction = action
        .parse()
        .map_err(|e: String| ApiError::new(StatusCode::NOT_FOUND, e))?;
    collect(&state, move |m| m.control_job(pid, action)).await??;
    Ok(message(format!("job {pid} {}", action.past_tense())))
}

async fn handle_ws(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    let monitor = state.monitor.clone();
    ws.on_upgrade(move |socket| ws::session(socket, monitor))
}

// ---------------------------------------------------------------------------
// CORS
// ---------------------------------------------------------------------------

fn add_cors_headers(headers: &mut HeaderMap) {
    let any = HeaderValue::from_static("*");
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, any.clone());
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, any.clone());
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, any);
}

/// Permissive CORS. Preflight requests never reach the handlers.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    add_cors_headers(response.headers_mut());
    response
}

// ---------------------------------------------------------------------------
// Router / serving
// ---------------------------------------------------------------------------

/// Build the axum router.
pub fn build_router(monitor: Arc<Monitor>) -> Router {
    let state = Arc::new(AppState { monitor });

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/api/system", get(handle_system))
        .route("/api/system/gpu", get(handle_gpu))
        .route("/api/system/cpu", get(handle_cpu))
        .route("/api/system/memory", get(handle_memory))
        .route("/api/energy", get(handle_energy))
        .route("/api/energy/price", post(handle_set_price))
        .route("/api/ports", get(handle_ports))
        .route("/api/ports/listening", get(handle_listening))
        .route("/api/ports/established", get(handle_established))
        .route("/api/ports/foreign", get(handle_foreign))
        .route("/api/training", get(handle_training))
        .route("/api/training/{action}/{pid}", post(handle_job_control))
        .route("/ws", get(handle_ws))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    monitor: Arc<Monitor>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, build_router(monitor))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Run the HTTP server until Ctrl+C.
pub async fn run_server(monitor: Arc<Monitor>, host: &str, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    log::info!("hostwatch API listening on http://{}", listener.local_addr()?);
    serve(listener, monitor, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("cannot listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        log::info!("shutting down");
    })
    .await
}
