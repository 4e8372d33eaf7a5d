//! GitHub API client.
//!
//! This module provides the request executor used by the repository registry
//! and the commit ingestion engine. Key features:
//! - A trait seam ([`GitHubClient`]) so tests can script GitHub's responses
//! - Per-request bearer tokens (each user's own OAuth token)
//! - A bounded timeout on every call; no retries

mod client;
mod error;

pub use client::{GitHubClient, GitHubResponse, OctocrabClient, RequestMethod};
pub use error::GitHubApiError;
