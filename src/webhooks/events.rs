//! GitHub webhook event types.
//!
//! The service handles two events:
//!
//! - `ping` - sent by GitHub when a hook is created; acknowledged, no effect
//! - `push` - commits pushed to the repository; ingested

use std::fmt;

use chrono::{DateTime, Utc};

use crate::types::{CommitCode, NewCommit};

/// Header name for the GitHub event type.
pub const HEADER_EVENT: &str = "x-github-event";

/// The recognized values of the `X-GitHub-Event` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ping,
    Push,
}

impl EventKind {
    /// Classifies a header value; `None` for anything unrecognized.
    ///
    /// Matching is exact: GitHub always sends lowercase event names.
    pub fn from_header(value: &str) -> Option<Self> {
        match value {
            "ping" => Some(EventKind::Ping),
            "push" => Some(EventKind::Push),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Ping => "ping",
            EventKind::Push => "push",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated `push` delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    /// `repository.full_name`, e.g. `octocat/hello-world`.
    pub full_name: String,
    pub commits: Vec<PushCommit>,
}

/// One commit of a `push` delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushCommit {
    pub id: CommitCode,
    pub url: String,
    pub message: String,
    /// `None` when the payload carried no timestamp.
    pub timestamp: Option<DateTime<Utc>>,
}

impl PushCommit {
    pub fn new(
        id: impl Into<CommitCode>,
        url: impl Into<String>,
        message: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        PushCommit {
            id: id.into(),
            url: url.into(),
            message: message.into(),
            timestamp,
        }
    }

    /// Converts to a storable commit, dating it `now` if it has no timestamp.
    pub fn into_new_commit(self, now: DateTime<Utc>) -> NewCommit {
        NewCommit::new(
            self.id,
            self.url,
            &self.message,
            self.timestamp.unwrap_or(now),
        )
    }
}
