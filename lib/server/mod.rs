pub mod monitoring;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use prometheus_client::encoding::text::encode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::auth::{Role, RoleResolver};
use crate::queue::engine::active_call;
use crate::queue::segments::compute_display_segments;
use crate::queue::types::{Barber, BarberId, Command, EntryId, QueueEntry, QueueStatus};
use crate::service::ServiceError;
use crate::state::AppState;
use monitoring::QUEUE_METRICS;

/// Service error carried to the HTTP boundary.
///
/// Every rejection maps to a specific status and a machine-readable kind so
/// the kiosk and staff console can render an actionable message.
struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use crate::queue::types::TransitionError as Te;
        let status = match &self.0 {
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Transition(Te::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Transition(Te::NotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Transition(_) => StatusCode::CONFLICT,
            ServiceError::Contention => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Store(err) if err.is_version_conflict() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::Store(crate::store::StoreError::DuplicateBarberId(_)) => {
                StatusCode::CONFLICT
            }
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "ok": false,
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Reads the bearer token, if any, and resolves it to a role.
fn bearer_role(state: &AppState, headers: &HeaderMap) -> Option<Role> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;
    state.sessions.resolve_role(Some(token))
}

#[derive(Debug, Serialize)]
struct CommandResponse {
    ok: bool,
    version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    entry_id: Option<EntryId>,
}

/// Public-surface projection of an entry: display name only, no full name.
#[derive(Debug, Serialize)]
struct EntryView {
    id: EntryId,
    display_name: String,
    preferred_barber_id: Option<BarberId>,
    status: QueueStatus,
    created_at: DateTime<Utc>,
    called_at: Option<DateTime<Utc>>,
    called_by_barber_id: Option<BarberId>,
    skipped_at: Option<DateTime<Utc>>,
}

impl From<&QueueEntry> for EntryView {
    fn from(entry: &QueueEntry) -> Self {
        Self {
            id: entry.id,
            display_name: entry.display_name(),
            preferred_barber_id: entry.preferred_barber_id.clone(),
            status: entry.status,
            created_at: entry.created_at,
            called_at: entry.called_at,
            called_by_barber_id: entry.called_by_barber_id.clone(),
            skipped_at: entry.skipped_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    pin: String,
}

#[derive(Debug, Deserialize)]
struct CheckInRequest {
    first_name: String,
    last_initial: String,
    #[serde(default)]
    preferred_barber_id: Option<BarberId>,
}

#[derive(Debug, Deserialize)]
struct AcceptRequest {
    entry_id: EntryId,
    barber_id: BarberId,
}

#[derive(Debug, Deserialize)]
struct CallNextRequest {
    barber_id: BarberId,
}

#[derive(Debug, Deserialize)]
struct EntryRequest {
    entry_id: EntryId,
}

#[derive(Debug, Deserialize)]
struct PreferenceRequest {
    entry_id: EntryId,
    #[serde(default)]
    barber_id: Option<BarberId>,
}

#[derive(Debug, Deserialize)]
struct VisibleCountRequest {
    visible_count: usize,
}

async fn health_handler() -> String {
    "Healthy".to_string()
}

async fn expose_metrics(state: State<Arc<AppState>>) -> String {
    let mut buffer = String::new();
    let registry = state.registry.read().await;
    encode(&mut buffer, &registry).unwrap();
    buffer
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    match state.sessions.login(&request.pin) {
        Some((token, role)) => Json(json!({ "token": token, "role": role })).into_response(),
        None => ApiError(ServiceError::Unauthorized).into_response(),
    }
}

async fn logout_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        state.sessions.logout(token);
    }
    StatusCode::NO_CONTENT
}

async fn run_command(
    state: &AppState,
    headers: &HeaderMap,
    command: Command,
) -> Result<Json<CommandResponse>, ApiError> {
    let role = bearer_role(state, headers);
    let receipt = state.service.execute(&command, role)?;
    Ok(Json(CommandResponse {
        ok: true,
        version: receipt.version,
        entry_id: receipt.entry_id,
    }))
}

async fn check_in_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CheckInRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(
        &state,
        &headers,
        Command::CheckIn {
            first_name: request.first_name,
            last_initial: request.last_initial,
            preferred_barber_id: request.preferred_barber_id,
        },
    )
    .await
}

async fn accept_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AcceptRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(
        &state,
        &headers,
        Command::Accept {
            entry_id: request.entry_id,
            barber_id: request.barber_id,
        },
    )
    .await
}

async fn call_next_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CallNextRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(
        &state,
        &headers,
        Command::CallNext {
            barber_id: request.barber_id,
        },
    )
    .await
}

async fn skip_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<EntryRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(
        &state,
        &headers,
        Command::Skip {
            entry_id: request.entry_id,
        },
    )
    .await
}

async fn undo_skip_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<EntryRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(
        &state,
        &headers,
        Command::UndoSkip {
            entry_id: request.entry_id,
        },
    )
    .await
}

async fn recall_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(&state, &headers, Command::Recall).await
}

async fn served_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<EntryRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(
        &state,
        &headers,
        Command::MarkServed {
            entry_id: request.entry_id,
        },
    )
    .await
}

async fn no_show_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<EntryRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(
        &state,
        &headers,
        Command::MarkNoShow {
            entry_id: request.entry_id,
        },
    )
    .await
}

async fn preference_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<PreferenceRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    run_command(
        &state,
        &headers,
        Command::AssignPreferredBarber {
            entry_id: request.entry_id,
            barber_id: request.barber_id,
        },
    )
    .await
}

/// Staff console read: the full snapshot plus the derived active call.
async fn queue_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if bearer_role(&state, &headers).is_none() {
        return Err(ApiError(ServiceError::Unauthorized));
    }

    let snapshot = state.service.snapshot();
    let active_call_id = active_call(&snapshot.entries).map(|entry| entry.id);
    Ok(Json(json!({
        "version": snapshot.version,
        "entries": snapshot.entries,
        "active_call_id": active_call_id,
        "config": snapshot.config,
    }))
    .into_response())
}

/// Display board read: segmentation output with public display names.
///
/// Unauthenticated on purpose: the board hangs on a wall.
async fn display_handler(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.service.snapshot();
    let segments = compute_display_segments(&snapshot.entries, &snapshot.config);
    let active = active_call(&snapshot.entries).map(EntryView::from);

    let views = |entries: &[QueueEntry]| -> Vec<EntryView> {
        entries.iter().map(EntryView::from).collect()
    };

    Json(json!({
        "version": snapshot.version,
        "active_call": active,
        "held": views(&segments.held),
        "highlight": views(&segments.highlight),
        "overflow": views(&segments.overflow),
        "highlight_window_size": segments.highlight_window_size,
        "visible_count": segments.visible_count,
        "barber_count": segments.barber_count,
        "barbers": snapshot.config.barbers,
    }))
    .into_response()
}

async fn replace_barbers_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(barbers): Json<Vec<Barber>>,
) -> Result<Json<CommandResponse>, ApiError> {
    let role = bearer_role(&state, &headers);
    let version = state.service.replace_barbers(role, barbers)?;
    Ok(Json(CommandResponse {
        ok: true,
        version,
        entry_id: None,
    }))
}

async fn visible_count_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<VisibleCountRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let role = bearer_role(&state, &headers);
    let version = state.service.set_visible_count(role, request.visible_count)?;
    Ok(Json(CommandResponse {
        ok: true,
        version,
        entry_id: None,
    }))
}

/// SSE stream of change events; each event is a re-fetch trigger for the
/// subscriber. Lagged subscribers skip ahead rather than fail.
async fn events_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let receiver = state.notifier.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|result| async move {
        match result {
            Ok(change) => Some(Event::default().event("change").json_data(change)),
            Err(BroadcastStreamRecvError::Lagged(_)) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Builds the full application router. Shared by the server entrypoint and
/// the HTTP integration tests.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(expose_metrics))
        .route("/api/login", post(login_handler))
        .route("/api/logout", post(logout_handler))
        .route("/api/checkin", post(check_in_handler))
        .route("/api/queue", get(queue_handler))
        .route("/api/queue/accept", post(accept_handler))
        .route("/api/queue/call-next", post(call_next_handler))
        .route("/api/queue/skip", post(skip_handler))
        .route("/api/queue/undo-skip", post(undo_skip_handler))
        .route("/api/queue/recall", post(recall_handler))
        .route("/api/queue/served", post(served_handler))
        .route("/api/queue/no-show", post(no_show_handler))
        .route("/api/queue/preference", post(preference_handler))
        .route("/api/display", get(display_handler))
        .route("/api/settings/barbers", put(replace_barbers_handler))
        .route("/api/settings/visible-count", put(visible_count_handler))
        .route("/api/events", get(events_handler))
        .with_state(state)
}

/// Starts the HTTP server on the supplied socket address.
pub async fn setup_server(
    state: Arc<AppState>,
    addr: SocketAddr,
) -> Result<tokio::task::JoinHandle<()>, std::io::Error> {
    {
        let mut registry = state.registry.write().await;
        QUEUE_METRICS
            .get_or_init(|| async { monitoring::QueueMetrics::register(&mut registry, "queue") })
            .await;
        monitoring::register_build_info_metric(&mut registry, "shopline");
    }

    let shutdown_token = state.shutdown_token.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            })
            .await
            .unwrap();
    });

    Ok(server_handle)
}
