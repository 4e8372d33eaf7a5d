//! Webhook endpoint handler.
//!
//! Classifies GitHub deliveries by their `X-GitHub-Event` header and handles
//! them inline: `ping` is acknowledged, `push` commits are stored before the
//! response is sent.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::ingest::ingest_from_webhook_push;
use crate::store::StoreError;
use crate::webhooks::{EventKind, HEADER_EVENT, ParseError, parse_push};

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No `X-GitHub-Event` header.
    #[error("missing required header: {header}", header = HEADER_EVENT)]
    MissingEvent,

    /// An event this service does not handle.
    #[error("unsupported event: {0}")]
    UnsupportedEvent(String),

    /// The push payload is not usable.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] ParseError),

    /// The push is for a repository nobody registered.
    #[error("unknown repository: {0}")]
    UnknownRepository(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebhookError::MissingEvent => (StatusCode::FORBIDDEN, self.to_string()),
            WebhookError::UnsupportedEvent(_) => (StatusCode::FORBIDDEN, self.to_string()),
            WebhookError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            WebhookError::UnknownRepository(_) => (StatusCode::NOT_FOUND, self.to_string()),
            WebhookError::Store(e) => {
                error!(error = %e, "storage failure while handling webhook");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal storage error".to_string(),
                )
            }
        };

        (status, message).into_response()
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Required headers:
///   - `X-GitHub-Event`: `ping` or `push`
/// - Body: JSON webhook payload
///
/// # Response
///
/// - 200 OK: `ping`, with the request body echoed back
/// - 201 Created: `push` stored, body `{"inserted": n}`
/// - 400 Bad Request: malformed `push` payload
/// - 403 Forbidden: missing or unsupported event header
/// - 404 Not Found: `push` for an unregistered repository
/// - 500 Internal Server Error: storage failure
///
/// # Example
///
/// ```ignore
/// POST /api/webhook HTTP/1.1
/// X-GitHub-Event: push
/// Content-Type: application/json
///
/// {"repository": {"full_name": "octocat/hello-world"}, "commits": [...]}
///
/// HTTP/1.1 201 Created
///
/// {"inserted": 2}
/// ```
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let header = headers.get(HEADER_EVENT).ok_or_else(|| {
        warn!("webhook without event header");
        WebhookError::MissingEvent
    })?;
    let event_name = String::from_utf8_lossy(header.as_bytes()).into_owned();
    let event = EventKind::from_header(&event_name).ok_or_else(|| {
        warn!(event_type = %event_name, "unsupported webhook event");
        WebhookError::UnsupportedEvent(event_name.clone())
    })?;

    debug!(event_type = %event, size = body.len(), "received webhook");

    match event {
        EventKind::Ping => Ok(echo(headers.get(CONTENT_TYPE), body)),
        EventKind::Push => {
            let push = parse_push(&body).inspect_err(|e| {
                warn!(error = %e, "rejected push payload");
            })?;

            let repository = app_state
                .store()
                .repository_by_name(&push.full_name)
                .await?
                .ok_or_else(|| {
                    debug!(repo = %push.full_name, "push for unregistered repository");
                    WebhookError::UnknownRepository(push.full_name.clone())
                })?;

            let received = push.commits.len();
            let summary =
                ingest_from_webhook_push(app_state.store(), &repository, push.commits).await?;
            info!(
                repo = %repository.name,
                received,
                inserted = summary.inserted,
                "push handled"
            );
            Ok((
                StatusCode::CREATED,
                Json(json!({ "inserted": summary.inserted })),
            )
                .into_response())
        }
    }
}

/// Sends `body` back unchanged, keeping the request's content type.
fn echo(content_type: Option<&HeaderValue>, body: Bytes) -> Response {
    let content_type = content_type
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    (StatusCode::OK, [(CONTENT_TYPE, content_type)], body).into_response()
}
