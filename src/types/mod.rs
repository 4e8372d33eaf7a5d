//! Core domain types for the repository monitor.
//!
//! This module contains the identifiers and stored records used throughout
//! the application.

pub mod ids;
pub mod records;

// Re-export commonly used types at the module level
pub use ids::{CommitCode, CommitId, InvalidRepoName, RepoName, RepositoryId, UserId};
pub use records::{Commit, MAX_MESSAGE_CHARS, NewCommit, Repository, User};
