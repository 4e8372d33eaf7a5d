//! Thin request executor for the GitHub REST API.
//!
//! [`GitHubClient`] is the seam between the core logic and GitHub: it takes
//! an endpoint, a method, a bearer token and an optional JSON body, and hands
//! back the status code and parsed body. It never interprets the status.
//! [`OctocrabClient`] is the real implementation; tests substitute a scripted
//! mock.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use octocrab::Octocrab;
use serde_json::Value;
use tracing::debug;

use super::error::GitHubApiError;

/// HTTP methods used against the GitHub API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl RequestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Patch => "PATCH",
            RequestMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw outcome of a GitHub API call.
#[derive(Debug, Clone, PartialEq)]
pub struct GitHubResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed body; `Value::Null` when the body was empty or not JSON.
    pub json: Value,
}

impl GitHubResponse {
    pub fn new(status: u16, json: Value) -> Self {
        GitHubResponse { status, json }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes authenticated requests against the GitHub REST API.
#[async_trait]
pub trait GitHubClient: Send + Sync {
    /// Issues one request.
    ///
    /// * `endpoint` - API path relative to the API root, without a leading
    ///   slash (e.g. `repos/octocat/hello-world`); may carry a query string
    /// * `method` - HTTP verb
    /// * `token` - bearer token of the user on whose behalf the call is made
    /// * `body` - JSON body, ignored for GET
    async fn request(
        &self,
        endpoint: &str,
        method: RequestMethod,
        token: &str,
        body: Option<&Value>,
    ) -> Result<GitHubResponse, GitHubApiError>;
}

/// A [`GitHubClient`] backed by octocrab's raw request API.
///
/// Tokens belong to individual users, so an authenticated octocrab instance
/// is built per request.
#[derive(Clone)]
pub struct OctocrabClient {
    api_root: String,
    timeout: Duration,
}

impl OctocrabClient {
    /// Creates a client for the given API root (e.g. `https://api.github.com`).
    pub fn new(api_root: impl Into<String>, timeout: Duration) -> Self {
        OctocrabClient {
            api_root: api_root.into(),
            timeout,
        }
    }

    fn authenticated(&self, endpoint: &str, token: &str) -> Result<Octocrab, GitHubApiError> {
        Octocrab::builder()
            .base_uri(self.api_root.as_str())
            .map_err(|e| GitHubApiError::invalid_request(endpoint, e.to_string()))?
            .personal_token(token.to_owned())
            .build()
            .map_err(|e| GitHubApiError::invalid_request(endpoint, e.to_string()))
    }

    async fn execute(
        &self,
        endpoint: &str,
        method: RequestMethod,
        token: &str,
        body: Option<&Value>,
    ) -> Result<GitHubResponse, GitHubApiError> {
        let client = self.authenticated(endpoint, token)?;
        let uri = request_path(endpoint);

        let response = match method {
            RequestMethod::Get => client._get(uri).await,
            RequestMethod::Post => client._post(uri, body).await,
            RequestMethod::Patch => client._patch(uri, body).await,
            RequestMethod::Delete => client._delete(uri, body).await,
        }
        .map_err(|e| GitHubApiError::transport(endpoint, e))?;

        let status = response.status().as_u16();
        let text = client
            .body_to_string(response)
            .await
            .map_err(|e| GitHubApiError::transport(endpoint, e))?;

        Ok(GitHubResponse::new(status, parse_body(&text)))
    }
}

impl fmt::Debug for OctocrabClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OctocrabClient")
            .field("api_root", &self.api_root)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl GitHubClient for OctocrabClient {
    async fn request(
        &self,
        endpoint: &str,
        method: RequestMethod,
        token: &str,
        body: Option<&Value>,
    ) -> Result<GitHubResponse, GitHubApiError> {
        debug!(%method, endpoint, "GitHub request");

        let response = tokio::time::timeout(self.timeout, self.execute(endpoint, method, token, body))
            .await
            .map_err(|_| GitHubApiError::Timeout {
                endpoint: endpoint.to_string(),
                timeout: self.timeout,
            })??;

        debug!(%method, endpoint, status = response.status, "GitHub response");
        Ok(response)
    }
}

/// Turns a relative endpoint into an absolute path under the API root.
fn request_path(endpoint: &str) -> String {
    format!("/{}", endpoint.trim_start_matches('/'))
}

/// Parses a response body, falling back to `null` for empty or non-JSON bodies
/// (e.g. an HTML error page from a proxy).
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|e| {
        debug!(error = %e, "GitHub response body is not JSON");
        Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_path_adds_single_leading_slash() {
        assert_eq!(request_path("repos/foo/bar"), "/repos/foo/bar");
        assert_eq!(request_path("/repos/foo/bar"), "/repos/foo/bar");
        assert_eq!(
            request_path("repos/foo/bar/commits?since=2026-01-01T00:00:00Z"),
            "/repos/foo/bar/commits?since=2026-01-01T00:00:00Z"
        );
    }

    #[test]
    fn parse_body_handles_json_empty_and_garbage() {
        assert_eq!(parse_body(r#"{"id": 7}"#), json!({"id": 7}));
        assert_eq!(parse_body("[]"), json!([]));
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("  \n"), Value::Null);
        assert_eq!(parse_body("<html>bad gateway</html>"), Value::Null);
    }

    #[test]
    fn success_is_2xx() {
        assert!(GitHubResponse::new(200, Value::Null).is_success());
        assert!(GitHubResponse::new(201, Value::Null).is_success());
        assert!(!GitHubResponse::new(404, Value::Null).is_success());
        assert!(!GitHubResponse::new(500, Value::Null).is_success());
    }

    #[test]
    fn method_display() {
        assert_eq!(RequestMethod::Get.to_string(), "GET");
        assert_eq!(RequestMethod::Post.to_string(), "POST");
    }

    #[test]
    fn debug_does_not_leak_anything_but_config() {
        let client = OctocrabClient::new("https://api.github.com", Duration::from_secs(5));
        let rendered = format!("{:?}", client);
        assert!(rendered.contains("api.github.com"));
    }

    #[tokio::test]
    async fn unreachable_api_root_is_an_error_not_a_hang() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let client = OctocrabClient::new("http://127.0.0.1:9", Duration::from_secs(5));
        let result = client
            .request("repos/foo/bar", RequestMethod::Get, "token", None)
            .await;
        assert!(result.is_err());
    }
}
