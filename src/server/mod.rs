//! HTTP server for the repository monitor.
//!
//! This module implements the HTTP server that:
//! - Accepts `ping` and `push` webhooks from GitHub and stores pushed commits
//! - Lets authenticated users register repositories, backfill their history
//!   and browse the stored commits
//! - Provides health checks for liveness probes
//!
//! # Endpoints
//!
//! - `POST /api/webhook` - GitHub webhook deliveries
//! - `GET /api/repositories` - The caller's repositories, paginated
//! - `POST /api/repositories` - Register a repository
//! - `GET /api/repositories/{id}` - One of the caller's repositories
//! - `POST /api/repositories/{id}/bulk_insert_commits` - Backfill history
//! - `GET /api/commits` - The caller's commits, newest first, paginated
//! - `GET /api/commits/{id}` - One of the caller's commits
//! - `GET /health` - Returns 200 if the server and database are up
//!
//! Every `/api` route except the webhook requires
//! `Authorization: Bearer <api_token>`.

use std::sync::Arc;

use crate::github::GitHubClient;
use crate::store::SqliteStore;

pub mod auth;
pub mod commits;
pub mod error;
pub mod health;
pub mod repositories;
pub mod webhook;

pub use error::ApiError;
pub use health::health_handler;
pub use webhook::{WebhookError, webhook_handler};

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: SqliteStore,
    github: Arc<dyn GitHubClient>,

    /// Where GitHub should deliver push events; webhooks are not installed
    /// when unset.
    webhook_callback_url: Option<String>,
}

impl AppState {
    pub fn new(
        store: SqliteStore,
        github: Arc<dyn GitHubClient>,
        webhook_callback_url: Option<String>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                store,
                github,
                webhook_callback_url,
            }),
        }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.inner.store
    }

    pub fn github(&self) -> &dyn GitHubClient {
        self.inner.github.as_ref()
    }

    pub fn webhook_callback_url(&self) -> Option<&str> {
        self.inner.webhook_callback_url.as_deref()
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/api/webhook", post(webhook_handler))
        .route(
            "/api/repositories",
            get(repositories::list_repositories).post(repositories::create_repository),
        )
        .route("/api/repositories/{id}", get(repositories::get_repository))
        .route(
            "/api/repositories/{id}/bulk_insert_commits",
            post(repositories::bulk_insert_commits),
        )
        .route("/api/commits", get(commits::list_commits))
        .route("/api/commits/{id}", get(commits::get_commit))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
