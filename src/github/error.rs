//! GitHub API error types.
//!
//! Only failures to obtain a response are errors here. A response with a
//! non-2xx status is returned to the caller as-is; interpreting the status is
//! the caller's job.

use std::time::Duration;

use thiserror::Error;

/// A failure to get any response out of the GitHub API.
#[derive(Debug, Error)]
pub enum GitHubApiError {
    /// The request could not be built (bad endpoint, bad token, bad API root).
    #[error("invalid GitHub request for {endpoint}: {message}")]
    InvalidRequest { endpoint: String, message: String },

    /// No response arrived within the configured timeout.
    #[error("GitHub request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    /// Transport-level failure (DNS, connection reset, TLS, ...).
    #[error("GitHub request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: octocrab::Error,
    },
}

impl GitHubApiError {
    pub fn invalid_request(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        GitHubApiError::InvalidRequest {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn transport(endpoint: impl Into<String>, source: octocrab::Error) -> Self {
        GitHubApiError::Transport {
            endpoint: endpoint.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_mentions_endpoint_and_duration() {
        let err = GitHubApiError::Timeout {
            endpoint: "repos/foo/bar".into(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(
            err.to_string(),
            "GitHub request to repos/foo/bar timed out after 10s"
        );
    }

    #[test]
    fn invalid_request_display_mentions_endpoint() {
        let err = GitHubApiError::invalid_request("repos/ foo", "bad uri");
        assert!(matches!(err, GitHubApiError::InvalidRequest { .. }));
        assert!(err.to_string().contains("repos/ foo"), "{err}");
    }
}
