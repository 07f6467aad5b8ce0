//! HTTP route handlers for the hybrid RAG API.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::rag::core::chunk::Chunk;
use crate::rag::core::errors::RagError;
use crate::rag::core::ids::UserId;
use crate::rag::engine::{Answer, EngineStatus};

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/ask", post(ask))
        .route("/api/chunks", post(index_chunks))
        .route("/api/status", get(status))
        .route("/api/users/{user_id}", delete(clear_user))
        .with_state(state)
}

/// Error body returned by every failing route.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            tracing::error!(%err, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "hybrid-rag",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Question request.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    /// Asking user; selects the cache shard and conversation thread.
    pub user_id: String,
    /// Question text.
    pub text: String,
}

/// Answer a question for a user.
async fn ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, ApiError> {
    let Json(request) = payload?;
    let user = UserId::new(&request.user_id).map_err(RagError::from)?;
    let answer = state.engine.ask(&user, &request.text).await?;
    Ok(Json(answer))
}

/// Pre-chunked document ingestion request.
#[derive(Debug, Deserialize)]
pub struct ChunkBatchRequest {
    /// Source document the chunks come from.
    pub source: String,
    /// Chunk texts in document order.
    pub chunks: Vec<String>,
}

/// Ingestion response.
#[derive(Debug, Serialize)]
pub struct ChunkBatchResponse {
    /// Number of indexed chunks.
    pub indexed: usize,
}

/// Index a batch of chunks.
async fn index_chunks(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChunkBatchRequest>, JsonRejection>,
) -> Result<Json<ChunkBatchResponse>, ApiError> {
    let Json(request) = payload?;
    let chunks = Chunk::batch(&request.source, &request.chunks)?;
    let indexed = state.engine.index_chunks(chunks).await?;
    Ok(Json(ChunkBatchResponse { indexed }))
}

/// Engine status.
async fn status(State(state): State<Arc<AppState>>) -> Json<EngineStatus> {
    Json(state.engine.status().await)
}

/// Clear a user's cache and conversation.
async fn clear_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = UserId::new(&user_id).map_err(RagError::from)?;
    state.engine.clear_user(&user).await?;
    Ok(Json(serde_json::json!({ "cleared": user })))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::rag::engine::core::testing::test_engine;

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn router() -> (Router, std::path::PathBuf) {
        let (engine, dir) = test_engine().await;
        (create_router(AppState::new(Arc::new(engine))), dir)
    }

    #[tokio::test]
    async fn test_health() {
        let (router, dir) = router().await;
        let (status, body) = send(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_index_then_ask_twice() {
        let (router, dir) = router().await;
        let (status, body) = send(
            &router,
            Method::POST,
            "/api/chunks",
            Some(json!({
                "source": "guide.md",
                "chunks": ["Reciprocal rank fusion merges rankings", "", "Caches live per user"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["indexed"], 2);

        let question = json!({ "user_id": "alice", "text": "How does rank fusion merge rankings?" });
        let (status, first) = send(&router, Method::POST, "/api/ask", Some(question.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["cache_hit"], false);
        assert_eq!(first["mode"], "hybrid");

        let (_, second) = send(&router, Method::POST, "/api/ask", Some(question)).await;
        assert_eq!(second["cache_hit"], true);
        assert_eq!(second["text"], first["text"]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_validation_errors_are_bad_requests() {
        let (router, dir) = router().await;

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/ask",
            Some(json!({ "user_id": "../etc", "text": "hello there friend" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid user id"));

        let (status, _) = send(
            &router,
            Method::POST,
            "/api/ask",
            Some(json!({ "user_id": "alice", "text": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &router,
            Method::POST,
            "/api/chunks",
            Some(json!({ "source": "empty.md", "chunks": ["  "] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let _ = std::fs::remove_dir_all(dir);
    }

    async fn send_raw(router: &Router, uri: &str, content_type: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_malformed_bodies_get_json_errors() {
        let (router, dir) = router().await;

        let (status, body) = send_raw(&router, "/api/ask", "application/json", "{ not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) =
            send_raw(&router, "/api/ask", "application/json", r#"{ "user_id": "alice" }"#).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("text"));

        let (status, body) = send_raw(&router, "/api/chunks", "text/plain", "hello").await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(body["error"].is_string());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_status_and_clear_user() {
        let (router, dir) = router().await;
        send(
            &router,
            Method::POST,
            "/api/chunks",
            Some(json!({ "source": "a.md", "chunks": ["tokio runtime basics"] })),
        )
        .await;
        send(
            &router,
            Method::POST,
            "/api/ask",
            Some(json!({ "user_id": "alice", "text": "explain tokio runtime basics" })),
        )
        .await;

        let (status, body) = send(&router, Method::GET, "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["indexed_chunks"], 1);
        assert_eq!(body["cache"]["entries"], 1);
        assert_eq!(body["model"], "echo");
        assert!(body["uptime_seconds"].as_i64().unwrap() >= 0);
        assert!(body["started_at"].is_string());

        let (status, body) = send(&router, Method::DELETE, "/api/users/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cleared"], "alice");

        let (_, body) = send(&router, Method::GET, "/api/status", None).await;
        assert_eq!(body["conversations"], 0);
        let _ = std::fs::remove_dir_all(dir);
    }
}
