use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use server_api::{
    create_feedback, create_interview, current_user, get_feedback_by_interview_id,
    get_interview_by_id, latest_interviews, list_user_interviews, review_feedback,
    scoring::{FeedbackScorer, MissingFeedbackScorer},
    session::SessionConfig,
    sign_in, ApiContext,
};
use shared::{
    domain::{Feedback, Interview, InterviewId, User, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        CreateFeedbackRequest, CreateFeedbackResponse, CreateInterviewRequest, FeedbackReview,
        InterviewSummary, LoginRequest, LoginResponse, ServerEvent,
    },
};
use storage::Storage;
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod scorer;

use app_state::AppState;
use config::{load_settings, prepare_database_url};
use scorer::HttpFeedbackScorer;

type HttpResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

const SESSION_COOKIE: &str = "session";
const MAX_REQUEST_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: UserId,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let scorer: Arc<dyn FeedbackScorer> = match settings.scorer_url.as_deref() {
        Some(url) => Arc::new(HttpFeedbackScorer::new(url, settings.scorer_api_key.clone())?),
        None => {
            warn!("no scorer_url configured; feedback generation will fail open");
            Arc::new(MissingFeedbackScorer)
        }
    };
    let api = ApiContext {
        storage,
        scorer,
        sessions: SessionConfig {
            secret: settings.session_secret,
            ttl_seconds: settings.session_ttl_seconds,
        },
    };
    let (events, _) = broadcast::channel(256);

    let state = AppState { api, events };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/interviews", post(http_create_interview).get(http_list_interviews))
        .route("/interviews/latest", get(http_latest_interviews))
        .route("/interviews/:interview_id", get(http_get_interview))
        .route("/interviews/:interview_id/feedback", get(http_get_feedback))
        .route("/interviews/:interview_id/review", get(http_review_feedback))
        .route("/feedback", post(http_create_feedback))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    (status_for(err.code), Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state.api.storage.health_check().await.map_err(|error| {
        error!(%error, "health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok("ok")
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> HttpResult<LoginResponse> {
    sign_in(&state.api, &req).await.map(Json).map_err(reject)
}

/// `RUST_LOG` when set, `info` otherwise.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
}

/// Bearer token first, then the `session` cookie.
fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

async fn me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> HttpResult<User> {
    let token = session_token(&headers);
    current_user(&state.api, token.as_deref())
        .await
        .map(Json)
        .ok_or_else(|| {
            reject(ApiError::new(
                ErrorCode::Unauthorized,
                "not signed in",
            ))
        })
}

async fn http_create_interview(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateInterviewRequest>,
) -> HttpResult<Interview> {
    let interview = create_interview(&state.api, &req).await.map_err(reject)?;
    info!(interview_id = %interview.id, user_id = %interview.user_id, "interview created");
    state.publish(ServerEvent::InterviewCreated {
        interview: interview.clone(),
    });
    Ok(Json(interview))
}

async fn http_list_interviews(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
) -> HttpResult<Vec<InterviewSummary>> {
    list_user_interviews(&state.api, &q.user_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_latest_interviews(
    State(state): State<Arc<AppState>>,
    Query(q): Query<UserQuery>,
) -> HttpResult<Vec<InterviewSummary>> {
    latest_interviews(&state.api, &q.user_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_get_interview(
    State(state): State<Arc<AppState>>,
    Path(interview_id): Path<InterviewId>,
) -> HttpResult<Interview> {
    get_interview_by_id(&state.api, &interview_id)
        .await
        .map_err(reject)?
        .map(Json)
        .ok_or_else(|| reject(ApiError::not_found("interview not found")))
}

async fn http_get_feedback(
    State(state): State<Arc<AppState>>,
    Path(interview_id): Path<InterviewId>,
    headers: HeaderMap,
) -> HttpResult<Feedback> {
    let token = session_token(&headers);
    let user = current_user(&state.api, token.as_deref())
        .await
        .ok_or_else(|| reject(ApiError::new(ErrorCode::Unauthorized, "not signed in")))?;
    get_feedback_by_interview_id(&state.api, &interview_id, &user.id)
        .await
        .map_err(reject)?
        .map(Json)
        .ok_or_else(|| reject(ApiError::not_found("feedback not found")))
}

/// Anonymous callers get `RedirectHome`; the viewer is always the session user.
async fn http_review_feedback(
    State(state): State<Arc<AppState>>,
    Path(interview_id): Path<InterviewId>,
    headers: HeaderMap,
) -> HttpResult<FeedbackReview> {
    let token = session_token(&headers);
    let user = current_user(&state.api, token.as_deref()).await;
    review_feedback(&state.api, &interview_id, user.as_ref().map(|u| &u.id))
        .await
        .map(Json)
        .map_err(reject)
}

/// Always answers 200; failures are reported in the body as `success: false`.
async fn http_create_feedback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateFeedbackRequest>,
) -> Json<CreateFeedbackResponse> {
    let response = create_feedback(&state.api, &req).await;

    if let Some(feedback_id) = response.created_id() {
        match state.api.storage.feedback_by_id(feedback_id).await {
            Ok(Some(feedback)) => state.publish(ServerEvent::FeedbackCreated { feedback }),
            Ok(None) => warn!(%feedback_id, "created feedback not found for broadcast"),
            Err(error) => warn!(%feedback_id, %error, "failed to load feedback for broadcast"),
        }
    }

    Json(response)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};
    use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.events.subscribe());

    let send_task = tokio::spawn(async move {
        while let Some(next) = events.next().await {
            let event = match next {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket listener lagged; events dropped");
                    continue;
                }
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
