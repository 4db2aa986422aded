use crate::admin::{AdminAuth, AuthOutcome};
use crate::config::Config;
use crate::models::ApplicationStatus;
use crate::notifier::Notifier;
use crate::pipeline::{Acknowledgement, SubmissionError, SubmissionPipeline};
use crate::store::{ApplicationStore, SqliteStore};
use crate::validation::RawSubmission;
use anyhow::{Context, Result};
use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::{ConnectInfo, DefaultBodyLimit, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::Utc;
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

const ADMIN_PAGE_SIZE: u32 = 20;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SubmissionPipeline>,
    pub store: Arc<dyn ApplicationStore>,
    pub admin: Arc<AdminAuth>,
    pub trust_proxy_headers: bool,
}

impl AppState {
    pub fn from_config(config: &Config, store: Arc<dyn ApplicationStore>) -> Self {
        let notifier = Notifier::from_config(config);
        Self {
            pipeline: Arc::new(SubmissionPipeline::new(
                &config.submissions,
                store.clone(),
                notifier,
            )),
            store,
            admin: Arc::new(AdminAuth::from_config(config.admin.as_ref())),
            trust_proxy_headers: config.server.trust_proxy_headers,
        }
    }
}

pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(
            "/api/v1/applications",
            post(submit_json).get(list_applications),
        )
        .route("/api/v1/applications/:id", get(get_application))
        .route("/api/v1/applications/:id/process", post(process_application))
        .route("/api/v1/admin/stats", get(admin_stats))
        .route("/api/v1/health", get(health))
        .route("/api/v1/status", get(status))
        .route("/contacts", post(submit_form))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Serve `router` on an already bound listener, exposing peer addresses to handlers.
pub async fn serve(listener: TcpListener, router: Router) -> Result<()> {
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;
    Ok(())
}

pub async fn run(config: &Config) -> Result<()> {
    let store: Arc<dyn ApplicationStore> = Arc::new(SqliteStore::open(&config.database.path)?);
    let state = AppState::from_config(config, store);
    if !state.admin.is_enabled() {
        warn!("Admin credentials are not configured; admin API is disabled");
    }

    let router = build_router(state, config.server.max_body_bytes);
    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    info!("Listening on {}", config.server.bind_address);

    serve(listener, router).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server");
}

/// First X-Forwarded-For hop, then X-Real-IP, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: SocketAddr, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded.or(real_ip) {
            return ip.to_string();
        }
    }
    peer.ip().to_string()
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

async fn submit_json(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<RawSubmission>, JsonRejection>,
) -> Response {
    let Json(raw) = match payload {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Rejecting submission: unreadable JSON body: {e}");
            return error_body(StatusCode::BAD_REQUEST, "No data provided");
        }
    };
    let ip = client_ip(&headers, peer, state.trust_proxy_headers);
    submission_response(state.pipeline.submit(&raw, &ip).await)
}

async fn submit_form(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Form<RawSubmission>, FormRejection>,
) -> Response {
    let Form(raw) = match payload {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Rejecting submission: unreadable form body: {e}");
            return error_body(StatusCode::BAD_REQUEST, "No data provided");
        }
    };
    let ip = client_ip(&headers, peer, state.trust_proxy_headers);
    submission_response(state.pipeline.submit(&raw, &ip).await)
}

fn submission_response(result: Result<Acknowledgement, SubmissionError>) -> Response {
    let err = match result {
        Ok(ack) => {
            return (
                StatusCode::CREATED,
                Json(json!({ "success": true, "id": ack.id, "message": ack.message })),
            )
                .into_response()
        }
        Err(err) => err,
    };

    let message = err.user_message();
    match err {
        SubmissionError::Invalid(errors) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": message,
                "errors": errors.by_field(),
            })),
        )
            .into_response(),
        SubmissionError::RateLimited { .. } => error_body(StatusCode::TOO_MANY_REQUESTS, &message),
        SubmissionError::Storage(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "error": "Internal server error",
                "message": message,
            })),
        )
            .into_response(),
    }
}

/// Request-scoped admin check; the `Err` side is the response to send back.
fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> Result<(), Response> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match state.admin.check(authorization) {
        AuthOutcome::Granted => Ok(()),
        outcome => {
            match outcome {
                AuthOutcome::Denied { username } => warn!(
                    "Security event: failed_login - Failed login attempt for username: {username} from IP: {}",
                    client_ip(headers, peer, state.trust_proxy_headers)
                ),
                AuthOutcome::Disabled => {
                    warn!("Admin API requested but admin credentials are not configured")
                }
                _ => {}
            }
            let mut response = error_body(StatusCode::UNAUTHORIZED, "Authentication required");
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Basic realm=\"admin\""),
            );
            Err(response)
        }
    }
}

fn internal_error(context: &str, e: anyhow::Error) -> Response {
    error!("{context}: {e:#}");
    error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

#[derive(Debug, Deserialize)]
struct ListParams {
    status: Option<String>,
    page: Option<u32>,
}

async fn list_applications(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(response) = authorize(&state, &headers, peer) {
        return response;
    }

    let status = match params.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => match raw.parse::<ApplicationStatus>() {
            Ok(status) => Some(status),
            Err(_) => return error_body(StatusCode::BAD_REQUEST, "Unknown status filter"),
        },
        None => None,
    };

    match state
        .store
        .list(status, params.page.unwrap_or(1), ADMIN_PAGE_SIZE)
    {
        Ok(page) => Json(page).into_response(),
        Err(e) => internal_error("Error listing applications", e),
    }
}

async fn get_application(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(response) = authorize(&state, &headers, peer) {
        return response;
    }

    match state.store.get(id) {
        Ok(Some(application)) => Json(application).into_response(),
        Ok(None) => error_body(StatusCode::NOT_FOUND, "Application not found"),
        Err(e) => internal_error("Error loading application", e),
    }
}

async fn process_application(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(response) = authorize(&state, &headers, peer) {
        return response;
    }

    match state.store.mark_processed(id) {
        Ok(Some(application)) => {
            info!("Application #{id} marked as processed");
            Json(application).into_response()
        }
        Ok(None) => error_body(StatusCode::NOT_FOUND, "Application not found"),
        Err(e) => internal_error("Error updating application", e),
    }
}

async fn admin_stats(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize(&state, &headers, peer) {
        return response;
    }

    match state.store.stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => internal_error("Error computing application stats", e),
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let database = match state.store.ping() {
        Ok(()) => "healthy".to_string(),
        Err(e) => format!("unhealthy: {e}"),
    };

    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "services": { "database": database },
    }))
    .into_response()
}

async fn status(State(state): State<AppState>) -> Response {
    match state.store.stats() {
        Ok(stats) => Json(json!({
            "status": "ok",
            "timestamp": Utc::now().to_rfc3339(),
            "database_stats": { "applications": stats.total },
        }))
        .into_response(),
        Err(e) => {
            error!("Status check failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "error": "Internal server error",
                    "timestamp": Utc::now().to_rfc3339(),
                })),
            )
                .into_response()
        }
    }
}
