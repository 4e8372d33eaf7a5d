//! Shared test utilities: a scripted GitHub client and store fixtures.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::github::{GitHubApiError, GitHubClient, GitHubResponse, RequestMethod};
use crate::store::SqliteStore;
use crate::types::User;

/// A request observed by [`MockGitHub`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub endpoint: String,
    pub method: RequestMethod,
    pub token: String,
    pub body: Option<Value>,
}

/// A [`GitHubClient`] that answers from a script and records every call.
///
/// Responses are keyed by method and endpoint path (query string ignored).
/// Unscripted requests get a 404 with an empty body.
#[derive(Default)]
pub struct MockGitHub {
    responses: Mutex<HashMap<(RequestMethod, String), Result<GitHubResponse, String>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a response for `method` on `path`.
    pub fn respond(self, method: RequestMethod, path: &str, status: u16, json: Value) -> Self {
        self.responses.lock().unwrap().insert(
            (method, path.to_string()),
            Ok(GitHubResponse::new(status, json)),
        );
        self
    }

    /// Scripts a transport failure for `method` on `path`.
    pub fn fail(self, method: RequestMethod, path: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert((method, path.to_string()), Err(path.to_string()));
        self
    }

    /// All requests made so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GitHubClient for MockGitHub {
    async fn request(
        &self,
        endpoint: &str,
        method: RequestMethod,
        token: &str,
        body: Option<&Value>,
    ) -> Result<GitHubResponse, GitHubApiError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            endpoint: endpoint.to_string(),
            method,
            token: token.to_string(),
            body: body.cloned(),
        });

        let path = endpoint.split('?').next().unwrap_or(endpoint).to_string();
        match self.responses.lock().unwrap().get(&(method, path)) {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(endpoint)) => Err(GitHubApiError::invalid_request(
                endpoint.clone(),
                "scripted failure",
            )),
            None => Ok(GitHubResponse::new(404, Value::Null)),
        }
    }
}

/// An in-memory store with `foo-user` and `bar-user` provisioned.
pub async fn store_with_users() -> (SqliteStore, User, User) {
    let store = SqliteStore::open_in_memory().unwrap();
    let foo = store
        .upsert_user("foo-user", "foo-api-token", "foo-github-token")
        .await
        .unwrap();
    let bar = store
        .upsert_user("bar-user", "bar-api-token", "bar-github-token")
        .await
        .unwrap();
    (store, foo, bar)
}
