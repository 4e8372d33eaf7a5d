//! Persistent storage for users, repositories and commits.
//!
//! The store is the only shared mutable resource in the service. Uniqueness
//! of repository names and commit codes is enforced by the database itself
//! (UNIQUE constraints plus `ON CONFLICT DO NOTHING`), so concurrent requests
//! racing to insert the same row resolve to exactly one winner and the loser
//! observes "already present" rather than an error.

mod sqlite;

use serde::Serialize;
use thiserror::Error;

use crate::types::Repository;

pub use sqlite::SqliteStore;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected or failed an operation.
    #[error("storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    /// A stored value could not be decoded.
    #[error("corrupt {what} in database")]
    Corruption { what: &'static str },
}

impl StoreError {
    pub fn storage(operation: &'static str, message: impl ToString) -> Self {
        StoreError::Storage {
            operation,
            message: message.to_string(),
        }
    }

    pub fn corruption(what: &'static str) -> Self {
        StoreError::Corruption { what }
    }
}

/// Outcome of inserting a repository row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryInsert {
    /// A new row was created.
    Created(Repository),
    /// A row with the same name already existed and was left untouched.
    Existing(Repository),
}

impl RepositoryInsert {
    pub fn into_repository(self) -> Repository {
        match self {
            RepositoryInsert::Created(repo) | RepositoryInsert::Existing(repo) => repo,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, RepositoryInsert::Created(_))
    }
}

/// Limit/offset window over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    /// Builds a window from optional query parameters, applying the default
    /// limit and clamping to the maximum.
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        PageRequest {
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::new(None, None)
    }
}

/// One page of a listing together with the total number of matching rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub count: u64,
    pub results: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn page_request_defaults() {
        assert_eq!(
            PageRequest::default(),
            PageRequest {
                limit: 10,
                offset: 0
            }
        );
    }

    proptest! {
        #[test]
        fn page_request_limit_is_clamped(limit: u32, offset: u32) {
            let page = PageRequest::new(Some(limit), Some(offset));
            prop_assert!(page.limit >= 1);
            prop_assert!(page.limit <= PageRequest::MAX_LIMIT);
            prop_assert_eq!(page.offset, offset);
        }
    }

    #[test]
    fn storage_error_display() {
        let err = StoreError::storage("insert commit", "disk I/O error");
        assert_eq!(
            err.to_string(),
            "storage error during insert commit: disk I/O error"
        );
    }
}
