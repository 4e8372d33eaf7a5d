//! Stored records: users, repositories and commits.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ids::{CommitCode, CommitId, RepositoryId, UserId};

/// Maximum number of characters kept from a commit message.
pub const MAX_MESSAGE_CHARS: usize = 255;

/// A user as supplied by the identity provider.
///
/// The GitHub token is never serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub github_token: String,
}

/// A repository registered by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    pub id: RepositoryId,
    /// Full name, `owner/project`. Unique across all users.
    pub name: String,
    pub owner: UserId,
    /// Remote hook id; present iff a push webhook has been installed.
    pub webhook_id: Option<u64>,
}

/// A commit mirrored from GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub id: CommitId,
    pub code: CommitCode,
    pub url: String,
    pub message: String,
    pub date: DateTime<Utc>,
    pub repository: RepositoryId,
}

/// A commit about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub code: CommitCode,
    pub url: String,
    pub message: String,
    pub date: DateTime<Utc>,
}

impl NewCommit {
    /// Builds a commit record, truncating the message to
    /// [`MAX_MESSAGE_CHARS`] characters.
    pub fn new(
        code: impl Into<CommitCode>,
        url: impl Into<String>,
        message: &str,
        date: DateTime<Utc>,
    ) -> Self {
        NewCommit {
            code: code.into(),
            url: url.into(),
            message: truncate_chars(message, MAX_MESSAGE_CHARS).to_string(),
            date,
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
