mod threads;
mod users;

use crate::comments::CommentLinker;
use crate::config::ThreadweaveConfig;
use crate::database::Database;
use crate::error::ThreadError;
use crate::invalidation::{BroadcastSignal, SharedSignal};
use crate::threading::ThreadService;
use crate::user_index::UserIndex;
use crate::users::UserService;
use anyhow::Result;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub config: ThreadweaveConfig,
    pub database: Database,
    pub threads: ThreadService,
    pub comments: CommentLinker,
    pub users: UserService,
    pub user_index: UserIndex,
}

impl AppState {
    pub fn new(config: ThreadweaveConfig, database: Database, signal: SharedSignal) -> Self {
        let threads = ThreadService::new(database.clone(), signal.clone())
            .with_max_depth(config.listing.max_depth);
        Self {
            comments: CommentLinker::new(database.clone(), signal),
            users: UserService::new(database.clone()),
            user_index: UserIndex::new(database.clone()),
            threads,
            config,
            database,
        }
    }
}

pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl ApiError {
    fn into_response_parts(self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse { message: msg }),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse { message: msg }),
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        message: "internal server error".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.into_response_parts();
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<ThreadError> for ApiError {
    fn from(err: ThreadError) -> Self {
        match err {
            ThreadError::Validation(_) => ApiError::BadRequest(err.to_string()),
            ThreadError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            ThreadError::Persistence { .. } => ApiError::Internal(anyhow::Error::new(err)),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

/// Builds the REST router over an already-assembled state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(threads::health))
        .route("/users", post(users::upsert_user))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id/threads", get(users::list_user_threads))
        .route("/threads", get(threads::list_threads).post(threads::create_post))
        .route("/threads/:id", get(threads::get_thread))
        .route("/threads/:id/comments", post(threads::add_comment))
        .route("/maintenance/reconcile", post(threads::reconcile))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn serve_http(
    config: ThreadweaveConfig,
    database: Database,
    signal: BroadcastSignal,
) -> Result<()> {
    let state = AppState::new(config.clone(), database, Arc::new(signal));
    let router = router(state);

    let (listener, actual_port) = find_available_port(config.api_port).await?;
    let addr = SocketAddr::from(([0, 0, 0, 0], actual_port));

    if config.api_port != 0 && actual_port != config.api_port {
        tracing::warn!(
            requested_port = config.api_port,
            actual_port,
            "configured port was in use, bound to next available port"
        );
    }

    tracing::info!(?addr, "HTTP server listening");
    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}

/// Binds the configured port, walking upward through a small window when it
/// is taken. Port 0 asks the OS for an ephemeral port.
async fn find_available_port(start_port: u16) -> Result<(TcpListener, u16)> {
    const PORT_WINDOW: u16 = 100;

    let last_port = start_port.saturating_add(PORT_WINDOW - 1);
    for port in start_port..=last_port {
        match TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await {
            Ok(listener) => {
                let bound = listener.local_addr()?.port();
                return Ok((listener, bound));
            }
            Err(err) => tracing::debug!(port, error = %err, "port unavailable"),
        }
    }

    anyhow::bail!("no free port in {start_port}-{last_port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn taken_port_falls_through_to_the_next_one() {
        let (held, held_port) = find_available_port(0).await.unwrap();
        assert_ne!(held_port, 0);
        let (_next, next_port) = find_available_port(held_port).await.unwrap();
        assert!(next_port > held_port);
        drop(held);
    }

    #[test]
    fn thread_errors_map_to_status_codes() {
        let (status, _) = ApiError::from(ThreadError::validation("empty")).into_response_parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = ApiError::from(ThreadError::thread_not_found("t1")).into_response_parts();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.message, "thread t1 not found");

        let persistence = ThreadError::persistence("fetching posts", anyhow::anyhow!("disk gone"));
        let (status, body) = ApiError::from(persistence).into_response_parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "internal server error");
    }
}
