//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! `UserId` where a `RepositoryId` is expected) and make the code more
//! self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Local primary key of a user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local primary key of a repository row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(pub i64);

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local primary key of a commit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub i64);

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The remote identifier of a commit (a SHA on GitHub).
///
/// Codes are unique across the whole store, not just within one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitCode(pub String);

impl CommitCode {
    pub fn new(s: impl Into<String>) -> Self {
        CommitCode(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CommitCode {
    fn from(s: String) -> Self {
        CommitCode(s)
    }
}

impl From<&str> for CommitCode {
    fn from(s: &str) -> Self {
        CommitCode(s.to_string())
    }
}

/// Error returned when a repository full name is not `owner/project`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("repository name must be of the form owner/project, got {0:?}")]
pub struct InvalidRepoName(pub String);

/// A GitHub repository full name, split into its owner and project parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoName {
    pub owner: String,
    pub project: String,
}

impl RepoName {
    pub fn new(owner: impl Into<String>, project: impl Into<String>) -> Self {
        RepoName {
            owner: owner.into(),
            project: project.into(),
        }
    }

    /// Parses a full name such as `octocat/hello-world`.
    ///
    /// Exactly two non-empty segments are accepted; surrounding whitespace is
    /// not trimmed.
    pub fn parse(full_name: &str) -> Result<Self, InvalidRepoName> {
        let invalid = || InvalidRepoName(full_name.to_string());
        let (owner, project) = full_name.split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || project.is_empty() || project.contains('/') {
            return Err(invalid());
        }
        Ok(RepoName::new(owner, project))
    }

    /// The full name as stored locally and used in GitHub API paths.
    pub fn full_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.project)
    }
}
