//! HTTP surface for the story engine.

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use trial_core::{
    Action, EndingQuery, EngineError, MemoryStore, Segment, SessionId, StoryEngine,
};

#[derive(Clone)]
struct AppState {
    engine: Arc<StoryEngine>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidAction(_) => Self::bad_request(err.to_string()),
            EngineError::NotStarted(_) => Self {
                status: StatusCode::CONFLICT,
                message: err.to_string(),
            },
            EngineError::Store(e) => {
                error!("Session store failure: {e}");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Failed to advance the story".to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EndingParams {
    outcome: Option<String>,
    situation: Option<String>,
}

#[derive(Debug, Serialize)]
struct EndingResponse {
    success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: SessionId,
}

pub fn router(engine: Arc<StoryEngine>) -> Router {
    Router::new()
        .route("/api/story", post(post_story).get(get_ending))
        .route("/api/session", post(post_session))
        .route("/health", get(health))
        .with_state(AppState { engine })
}

/// Serve until the process is stopped, sweeping idle sessions in the
/// background.
pub async fn serve(
    addr: SocketAddr,
    engine: Arc<StoryEngine>,
    store: Arc<MemoryStore>,
    sweep_interval: Duration,
) -> Result<()> {
    anyhow::ensure!(!sweep_interval.is_zero(), "sweep interval must be positive");
    let sweeper = tokio::spawn(sweep(engine.clone(), store, sweep_interval));

    let listener = TcpListener::bind(addr).await?;
    info!(
        "Trial of Fire listening on {addr} (generator: {})",
        if engine.has_generator() { "on" } else { "off" }
    );
    let served = axum::serve(listener, router(engine)).await;

    sweeper.abort();
    Ok(served?)
}

async fn sweep(engine: Arc<StoryEngine>, store: Arc<MemoryStore>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let purged = store.purge_expired().await;
        let pruned = engine.sessions().prune_locks();
        if purged > 0 || pruned > 0 {
            info!("Swept {purged} expired sessions and {pruned} idle locks");
        }
    }
}

async fn post_story(
    State(state): State<AppState>,
    Json(body): Json<StoryRequest>,
) -> Result<Json<Segment>, ApiError> {
    let id = body
        .session_id
        .as_deref()
        .and_then(|raw| SessionId::parse(raw))
        .ok_or_else(|| ApiError::bad_request("sessionId is required"))?;
    let action: Action = body.action.as_deref().unwrap_or_default().parse()?;

    let segment = state.engine.next_segment(&id, action).await?;
    Ok(Json(segment))
}

async fn get_ending(
    State(state): State<AppState>,
    Query(params): Query<EndingParams>,
) -> Result<Json<EndingResponse>, ApiError> {
    let query = match (params.outcome, params.situation) {
        (Some(outcome), _) => EndingQuery::Outcome(outcome),
        (None, Some(situation)) => EndingQuery::Situation(situation),
        (None, None) => return Err(ApiError::bad_request("pass outcome or situation")),
    };
    Ok(Json(EndingResponse {
        success: state.engine.check_ending(&query),
    }))
}

async fn post_session(State(state): State<AppState>) -> Result<Json<SessionResponse>, ApiError> {
    let session_id = state.engine.new_session().await?;
    Ok(Json(SessionResponse { session_id }))
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use trial_core::{Outcome, StoryConfig};

    fn state() -> AppState {
        AppState {
            engine: Arc::new(StoryEngine::new(StoryConfig::default()).unwrap()),
        }
    }

    fn body(session_id: &str, action: &str) -> Json<StoryRequest> {
        Json(StoryRequest {
            session_id: Some(session_id.to_string()),
            action: Some(action.to_string()),
        })
    }

    #[tokio::test]
    async fn test_story_round() {
        let state = state();
        let Json(opening) = post_story(State(state.clone()), body("web-1", "start"))
            .await
            .unwrap();
        assert_eq!(opening.outcome, Outcome::Continue);

        let Json(next) = post_story(State(state.clone()), body("web-1", "chooseB"))
            .await
            .unwrap();
        assert_ne!(next.narrative, opening.narrative);

        let json = serde_json::to_value(&next).unwrap();
        assert_eq!(json["options"].as_array().unwrap().len(), 2);
        assert_eq!(json["outcome"], "continue");
    }

    #[tokio::test]
    async fn test_serve_rejects_zero_sweep_interval() {
        let engine = state().engine;
        let store = Arc::new(MemoryStore::new());
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        assert!(serve(addr, engine, store, Duration::ZERO).await.is_err());
    }

    #[tokio::test]
    async fn test_story_rejects_bad_input() {
        let err = post_story(State(state()), body("  ", "start"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = post_story(State(state()), Json(StoryRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = post_story(State(state()), body("web-1", "dance"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("dance"));
    }

    #[tokio::test]
    async fn test_choose_before_start_conflicts() {
        let err = post_story(State(state()), body("web-1", "chooseA"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_ending_check() {
        let check = |outcome: Option<&str>, situation: Option<&str>| {
            get_ending(
                State(state()),
                Query(EndingParams {
                    outcome: outcome.map(str::to_string),
                    situation: situation.map(str::to_string),
                }),
            )
        };

        assert!(check(Some("escaped"), None).await.unwrap().success);
        assert!(!check(Some("death"), None).await.unwrap().success);
        assert!(check(None, Some("You reach the exit")).await.unwrap().success);
        assert_eq!(
            check(None, None).await.unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_new_session() {
        let state = state();
        let Json(created) = post_session(State(state.clone())).await.unwrap();
        let session = state.engine.session(&created.session_id).await.unwrap();
        assert_eq!(session.step(), 0);
    }

    #[test]
    fn test_api_error_body() {
        let response = ApiError::bad_request("nope").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
