use super::{ApiError, ApiResult, AppState};
use crate::comments::AddCommentInput;
use crate::database::repositories::ThreadRepository;
use crate::threading::{CreatePostInput, ExpandedThread, ThreadPage};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
pub(crate) struct ListThreadsParams {
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    page_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetThreadParams {
    #[serde(default)]
    max_depth: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddCommentRequest {
    text: String,
    author_id: String,
    #[serde(default)]
    invalidation_topic: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatedResponse {
    id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReconcileResponse {
    relinked: Vec<String>,
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    version: &'static str,
    api_port: u16,
    thread_count: usize,
    max_depth: usize,
}

pub(crate) async fn health(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    let thread_count = state
        .database
        .call(|repos| repos.threads().count())
        .await?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        api_port: state.config.api_port,
        thread_count,
        max_depth: state.threads.max_depth(),
    }))
}

pub(crate) async fn list_threads(
    State(state): State<AppState>,
    Query(params): Query<ListThreadsParams>,
) -> ApiResult<ThreadPage> {
    let page = params.page.unwrap_or(1);
    let page_size = params
        .page_size
        .unwrap_or(state.config.listing.default_page_size)
        .min(MAX_PAGE_SIZE);
    let listing = state.threads.list_top_level(page, page_size).await?;
    Ok(Json(listing))
}

pub(crate) async fn create_post(
    State(state): State<AppState>,
    Json(mut input): Json<CreatePostInput>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    if input.invalidation_topic.is_empty() {
        input.invalidation_topic = "/".into();
    }
    let id = state.threads.create_post(input).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub(crate) async fn get_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<GetThreadParams>,
) -> ApiResult<ExpandedThread> {
    let thread = match params.max_depth {
        Some(depth) => state.threads.get_by_id_with_depth(&id, depth).await?,
        None => state.threads.get_by_id(&id).await?,
    };
    Ok(Json(thread))
}

pub(crate) async fn add_comment(
    State(state): State<AppState>,
    Path(parent_id): Path<String>,
    Json(request): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let invalidation_topic = request
        .invalidation_topic
        .unwrap_or_else(|| format!("/thread/{parent_id}"));
    let id = state
        .comments
        .add_comment(AddCommentInput {
            parent_id,
            text: request.text,
            author_id: request.author_id,
            invalidation_topic,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub(crate) async fn reconcile(State(state): State<AppState>) -> ApiResult<ReconcileResponse> {
    let relinked = state.comments.reconcile().await?;
    Ok(Json(ReconcileResponse { relinked }))
}
