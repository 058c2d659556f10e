use super::{ApiResult, AppState};
use crate::threading::ExpandedThread;
use crate::users::{UpsertUserInput, UserView};
use axum::extract::{Path, State};
use axum::Json;

pub(crate) async fn upsert_user(
    State(state): State<AppState>,
    Json(input): Json<UpsertUserInput>,
) -> ApiResult<UserView> {
    let user = state.users.upsert_user(input).await?;
    Ok(Json(user))
}

pub(crate) async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<UserView> {
    Ok(Json(state.users.get_user(&id).await?))
}

/// Top-level posts by the user, newest first.
pub(crate) async fn list_user_threads(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<ExpandedThread>> {
    Ok(Json(state.user_index.list_authored(&id).await?))
}
