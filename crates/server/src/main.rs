use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use server_api::{
    confirm_claim, go_home, mark_recovered, open_nets, open_nets_map, prepare_claim, report_net,
    select_role, ApiContext, SessionState,
};
use shared::{
    domain::{NetId, Outcome, SessionId},
    error::{ApiError, ErrorCode},
    protocol::{
        ConfirmClaimRequest, MapMarker, NetSummary, Notice, OutcomeResponse, PrepareClaimRequest,
        ReportNetRequest, SelectRoleRequest, SessionCreated, SessionSnapshot,
    },
};
use storage::Storage;
use tokio::sync::Mutex;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod app_state;
mod config;

use app_state::{AppState, SessionRegistry};
use config::{load_settings, prepare_database_url};

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings()?;
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let sessions = SessionRegistry::new(
        Duration::from_secs(settings.session_idle_secs),
        settings.max_sessions,
    );
    tokio::spawn(sweep_idle_sessions(sessions.clone()));

    let state = AppState {
        api: ApiContext { storage },
        sessions,
    };
    let app = build_router(Arc::new(state), settings.max_body_bytes);

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn sweep_idle_sessions(sessions: SessionRegistry) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let evicted = sessions.evict_idle_at(Instant::now()).await;
        if evicted > 0 {
            info!(evicted, "idle sessions dropped");
        }
    }
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/nets/open", get(http_open_nets))
        .route("/nets/map", get(http_open_nets_map))
        .route("/sessions", post(create_session))
        .route("/sessions/:session_id", get(get_session).delete(end_session))
        .route("/sessions/:session_id/report", post(http_report_net))
        .route("/sessions/:session_id/claims/prepare", post(http_prepare_claim))
        .route("/sessions/:session_id/claims/confirm", post(http_confirm_claim))
        .route(
            "/sessions/:session_id/nets/:net_id/recovered",
            post(http_mark_recovered),
        )
        .route("/sessions/:session_id/role", post(http_select_role))
        .route("/sessions/:session_id/home", post(http_go_home))
        .route("/sessions/:session_id/messages", get(http_drain_messages))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn http_error(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

async fn load_session(
    state: &AppState,
    session_id: SessionId,
) -> Result<Arc<Mutex<SessionState>>, HttpError> {
    state.sessions.get(session_id).await.ok_or_else(|| {
        http_error(ApiError::new(
            ErrorCode::NotFound,
            format!("session {session_id} not found"),
        ))
    })
}

fn respond(outcome: Option<Outcome>, session: &mut SessionState) -> Json<OutcomeResponse> {
    Json(OutcomeResponse {
        outcome,
        messages: session.drain_messages(),
    })
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state.api.storage.health_check().await.map_err(|error| {
        error!(%error, "health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok("ok")
}

async fn http_open_nets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<NetSummary>>, HttpError> {
    let nets = open_nets(&state.api).await.map_err(http_error)?;
    Ok(Json(nets))
}

async fn http_open_nets_map(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MapMarker>>, HttpError> {
    let markers = open_nets_map(&state.api).await.map_err(http_error)?;
    Ok(Json(markers))
}

async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<SessionCreated>), HttpError> {
    let Some(session_id) = state.sessions.create().await else {
        warn!("session limit reached");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, "too many open sessions")),
        ));
    };
    info!(%session_id, "session opened");
    Ok((StatusCode::CREATED, Json(SessionCreated { session_id })))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, HttpError> {
    let session_id = SessionId(session_id);
    let session = load_session(&state, session_id).await?;
    let snapshot = session.lock().await.snapshot(session_id);
    Ok(Json(snapshot))
}

async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> StatusCode {
    if state.sessions.remove(SessionId(session_id)).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn http_report_net(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<ReportNetRequest>,
) -> Result<Json<OutcomeResponse>, HttpError> {
    let session = load_session(&state, SessionId(session_id)).await?;
    let mut session = session.lock().await;
    session.new_net = req.net;
    session.anonymous = req.anonymous;
    session.reporter = req.reporter;

    let outcome = report_net(&state.api, &mut session)
        .await
        .map_err(http_error)?;
    Ok(respond(Some(outcome), &mut session))
}

async fn http_prepare_claim(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<PrepareClaimRequest>,
) -> Result<Json<OutcomeResponse>, HttpError> {
    let session = load_session(&state, SessionId(session_id)).await?;
    let mut session = session.lock().await;
    let outcome = prepare_claim(&mut session, req.net_id);
    Ok(respond(Some(outcome), &mut session))
}

async fn http_confirm_claim(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<ConfirmClaimRequest>,
) -> Result<Json<OutcomeResponse>, HttpError> {
    let session = load_session(&state, SessionId(session_id)).await?;
    let mut session = session.lock().await;
    session.salvager = req.salvager;

    let outcome = confirm_claim(&state.api, &mut session)
        .await
        .map_err(http_error)?;
    Ok(respond(Some(outcome), &mut session))
}

async fn http_mark_recovered(
    State(state): State<Arc<AppState>>,
    Path((session_id, net_id)): Path<(Uuid, i64)>,
) -> Result<Json<OutcomeResponse>, HttpError> {
    let session = load_session(&state, SessionId(session_id)).await?;
    let mut session = session.lock().await;
    mark_recovered(&state.api, &mut session, NetId(net_id))
        .await
        .map_err(http_error)?;
    Ok(respond(None, &mut session))
}

async fn http_select_role(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SelectRoleRequest>,
) -> Result<Json<OutcomeResponse>, HttpError> {
    let session = load_session(&state, SessionId(session_id)).await?;
    let mut session = session.lock().await;
    let outcome = select_role(&mut session, req.role);
    Ok(respond(Some(outcome), &mut session))
}

async fn http_go_home(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<OutcomeResponse>, HttpError> {
    let session = load_session(&state, SessionId(session_id)).await?;
    let mut session = session.lock().await;
    Ok(respond(Some(go_home()), &mut session))
}

async fn http_drain_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<Notice>>, HttpError> {
    let session = load_session(&state, SessionId(session_id)).await?;
    let messages = session.lock().await.drain_messages();
    Ok(Json(messages))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
