/*
* HTTP API
* --------
* Thin JSON layer over the session manager, ledger and report dispatcher.
* Paths are relative to server.api_prefix (default /api/v1):
*
* GET  /health            - liveness
* POST /session/start     - start a billing session
* POST /session/end       - end it and return the session record
* GET  /session/status    - live usage and cost estimate
* GET  /billing/history   - every completed session and the running total
* GET  /billing/invoice   - invoice for ?session_id=... or for all sessions
* POST /billing/report    - invoice + simulated delivery to {destination}
*
* All routes share one per-minute limiter; the report route has its own,
* stricter one on top.
*/

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::info;

use crate::api::error::ApiError;
use crate::api::middleware::rate_limit::{self, GlobalRateLimit};
use crate::billing::{BillingHistory, Invoice, SessionRecord};
use crate::config::Settings;
use crate::core::{SessionHandle, SessionManager, SessionStatus};
use crate::reporting::{DeliveryReceipt, ReportDispatcher};
use crate::with_context;

/// Largest JSON body any route accepts.
const MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<Mutex<SessionManager>>,
    pub reports: Arc<ReportDispatcher>,
}

impl AppState {
    pub fn new(sessions: SessionManager, reports: ReportDispatcher) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(sessions)),
            reports: Arc::new(reports),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            SessionManager::from_settings(settings),
            ReportDispatcher::from_settings(&settings.reporting),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct InvoiceQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportRequest {
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

pub fn create_router(
    app_state: AppState,
    api_prefix: &str,
    rate_limits: &GlobalRateLimit,
) -> Router {
    let report_router = Router::new()
        .route("/billing/report", post(send_report))
        .layer(middleware::from_fn_with_state(
            rate_limits.reports.limiter(),
            rate_limit::enforce,
        ));

    let api_router = Router::new()
        .route("/health", get(health))
        .route("/session/start", post(start_session))
        .route("/session/end", post(end_session))
        .route("/session/status", get(session_status))
        .route("/billing/history", get(billing_history))
        .route("/billing/invoice", get(build_invoice))
        .merge(report_router)
        .layer(middleware::from_fn_with_state(
            rate_limits.api.limiter(),
            rate_limit::enforce,
        ));

    let prefix = api_prefix.trim_matches('/');
    let router = if prefix.is_empty() {
        api_router
    } else {
        Router::new().nest(&format!("/{}", prefix), api_router)
    };

    router.with_state(app_state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
    )
}

pub async fn serve(settings: &Settings, port: u16) -> anyhow::Result<()> {
    let state = AppState::from_settings(settings);
    let app = create_router(
        state,
        &settings.server.api_prefix,
        &GlobalRateLimit::from(&settings.rate_limits),
    );

    let addr = format!("{}:{}", settings.server.host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn start_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionHandle>), ApiError> {
    let mut sessions = state.sessions.lock().await;
    let handle = with_context!(sessions.start_session().await, "start_session")?;
    Ok((StatusCode::CREATED, Json(handle)))
}

async fn end_session(State(state): State<AppState>) -> Result<Json<SessionRecord>, ApiError> {
    let mut sessions = state.sessions.lock().await;
    let record = with_context!(sessions.end_session().await, "end_session")?;
    Ok(Json(record))
}

async fn session_status(State(state): State<AppState>) -> Result<Json<SessionStatus>, ApiError> {
    let sessions = state.sessions.lock().await;
    let status = with_context!(sessions.status().await, "session_status")?;
    Ok(Json(status))
}

async fn billing_history(State(state): State<AppState>) -> Json<BillingHistory> {
    let sessions = state.sessions.lock().await;
    Json(sessions.ledger().history())
}

async fn build_invoice(
    State(state): State<AppState>,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<Invoice>, ApiError> {
    let sessions = state.sessions.lock().await;
    let invoice = with_context!(
        sessions.ledger().build_invoice(query.session_id.as_deref()),
        "build_invoice"
    )?;
    Ok(Json(invoice))
}

async fn send_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> Result<Json<DeliveryReceipt>, ApiError> {
    // Build under the lock, deliver without it.
    let invoice = {
        let sessions = state.sessions.lock().await;
        with_context!(
            sessions.ledger().build_invoice(request.session_id.as_deref()),
            "send_report"
        )?
    };
    let receipt = with_context!(
        state.reports.dispatch(&request.destination, invoice).await,
        "send_report"
    )?;
    Ok(Json(receipt))
}
