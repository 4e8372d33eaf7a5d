//! Repository endpoints of the user API.

use std::collections::HashMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Form, FromRequest, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::AppState;
use super::auth::CurrentUser;
use super::error::ApiError;
use crate::ingest::{BackfillWindow, bulk_insert_from_backfill};
use crate::registry::{WebhookStatus, add_webhook, register};
use crate::store::{Page, PageRequest};
use crate::types::{Repository, RepositoryId};

/// `?limit=&offset=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl PageParams {
    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.limit, self.offset)
    }
}

/// `GET /api/repositories`
pub async fn list_repositories(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<Repository>>, ApiError> {
    let page = app_state
        .store()
        .list_repositories(user.id, params.page())
        .await?;
    Ok(Json(page))
}

/// `GET /api/repositories/{id}`
pub async fn get_repository(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Repository>, ApiError> {
    app_state
        .store()
        .repository_for_owner(RepositoryId(id), user.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("repository {id} not found")))
}

/// `POST /api/repositories` with body `{"name": "owner/project"}`, JSON or
/// form-encoded.
///
/// Answers 201 for a new registration and 200 when the name was already
/// registered. If the service has a public URL, a push webhook is installed
/// on repositories owned by the caller; installation failures are logged and
/// do not change the response.
pub async fn create_repository(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    request: Request,
) -> Result<(StatusCode, Json<Repository>), ApiError> {
    let fields = body_fields(request).await?;
    let name = match fields.get("name") {
        Some(Value::String(name)) => name.trim(),
        _ => {
            return Err(ApiError::BadRequest(
                "name must be a string of the form owner/project".to_string(),
            ));
        }
    };

    let registration = register(app_state.store(), app_state.github(), name, &user).await?;
    let mut repository = registration.repository;

    if let Some(callback_url) = app_state.webhook_callback_url() {
        if repository.owner == user.id {
            let status = add_webhook(
                app_state.store(),
                app_state.github(),
                &mut repository,
                &user.github_token,
                callback_url,
            )
            .await;
            if let WebhookStatus::Failed { reason } = &status {
                info!(repo = %repository.name, %reason, "repository registered without webhook");
            }
        } else {
            debug!(repo = %repository.name, "not installing webhook on another user's repository");
        }
    }

    let status = if registration.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(repository)))
}

/// `POST /api/repositories/{id}/bulk_insert_commits` with body `{"days": n}`,
/// JSON or form-encoded.
///
/// `days` is validated before anything else happens, so a bad request never
/// reaches GitHub.
pub async fn bulk_insert_commits(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    let window = parse_window(&body_fields(request).await?)?;

    let repository = app_state
        .store()
        .repository_for_owner(RepositoryId(id), user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("repository {id} not found")))?;

    let summary = bulk_insert_from_backfill(
        app_state.store(),
        app_state.github(),
        &repository,
        &user.github_token,
        window,
    )
    .await?;
    Ok(Json(json!({ "inserted": summary.inserted })))
}

/// Reads the fields of a form-encoded or JSON object body.
///
/// Form values are all strings; JSON values keep their types.
async fn body_fields(request: Request) -> Result<Map<String, Value>, ApiError> {
    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        return Ok(fields
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect());
    }

    let body = Bytes::from_request(request, &())
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
    json_fields(&body)
}

fn json_fields(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        _ => Err(ApiError::BadRequest("expected a JSON object".to_string())),
    }
}

/// Reads `days` from the body fields. Integers and integer strings are
/// accepted.
fn parse_window(fields: &Map<String, Value>) -> Result<BackfillWindow, ApiError> {
    let days = match fields.get("days") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(Value::Null) | None => {
            return Err(ApiError::BadRequest("days is required".to_string()));
        }
        Some(_) => None,
    };
    let days = days.ok_or_else(|| ApiError::BadRequest("days must be an integer".to_string()))?;
    Ok(BackfillWindow::new(days)?)
}
