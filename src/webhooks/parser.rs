//! GitHub webhook payload parser.
//!
//! Push payloads are validated once, here, and turned into a typed
//! [`PushEvent`]. Anything the service relies on later is checked up front:
//!
//! - `repository.full_name` must be a string
//! - `commits` must be a list
//! - every commit needs a string `id`; `url` and `message` may be missing or
//!   null, `timestamp` may be missing or null but must parse if present
//!
//! Unknown fields are ignored.

use serde::Deserialize;
use thiserror::Error;

use super::events::{PushCommit, PushEvent};
use crate::ingest::parse_timestamp;

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Field has invalid value (e.g., malformed timestamp).
    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Debug, Deserialize)]
struct RawPushPayload {
    repository: RawRepository,
    commits: Vec<RawPushCommit>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct RawPushCommit {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Parses a `push` payload.
///
/// # Examples
///
/// ```
/// use repo_monitor::webhooks::parse_push;
///
/// let payload = br#"{
///     "repository": { "full_name": "octocat/hello-world" },
///     "commits": [
///         { "id": "387393", "url": "https://example.com/387393",
///           "timestamp": "2019-02-10T00:00:00Z", "message": "Hello World" }
///     ]
/// }"#;
///
/// let push = parse_push(payload).unwrap();
/// assert_eq!(push.full_name, "octocat/hello-world");
/// assert_eq!(push.commits.len(), 1);
/// ```
pub fn parse_push(payload: &[u8]) -> Result<PushEvent, ParseError> {
    let raw: RawPushPayload = serde_json::from_slice(payload)?;

    let commits = raw
        .commits
        .into_iter()
        .map(|c| {
            let timestamp = c
                .timestamp
                .map(|t| {
                    parse_timestamp(&t).map_err(|_| ParseError::InvalidField {
                        field: "commits[].timestamp",
                        value: t,
                    })
                })
                .transpose()?;
            Ok(PushCommit::new(
                c.id,
                c.url.unwrap_or_default(),
                c.message.unwrap_or_default(),
                timestamp,
            ))
        })
        .collect::<Result<Vec<_>, ParseError>>()?;

    Ok(PushEvent {
        full_name: raw.repository.full_name,
        commits,
    })
}
