//! Commit endpoints of the user API.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use super::AppState;
use super::auth::CurrentUser;
use super::error::ApiError;
use crate::store::{Page, PageRequest};
use crate::types::{Commit, CommitId, RepositoryId};

/// `?repository=&limit=&offset=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct CommitFilter {
    pub repository: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// `GET /api/commits`
///
/// Newest first. A `repository` the caller does not own yields an empty page.
pub async fn list_commits(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<CommitFilter>,
) -> Result<Json<Page<Commit>>, ApiError> {
    let page = app_state
        .store()
        .list_commits(
            user.id,
            filter.repository.map(RepositoryId),
            PageRequest::new(filter.limit, filter.offset),
        )
        .await?;
    Ok(Json(page))
}

/// `GET /api/commits/{id}`
pub async fn get_commit(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Commit>, ApiError> {
    app_state
        .store()
        .commit_for_owner(CommitId(id), user.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("commit {id} not found")))
}
