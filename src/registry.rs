//! Repository registration and webhook installation.
//!
//! A repository can only be registered after GitHub confirms it exists and
//! is visible to the registering user. Names are unique across all users;
//! registering a name that is already known returns the existing row instead
//! of failing.

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::github::{GitHubClient, RequestMethod};
use crate::store::{SqliteStore, StoreError};
use crate::types::{InvalidRepoName, RepoName, Repository, User};

/// Errors from registering a repository.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The name is not `owner/project`.
    #[error(transparent)]
    InvalidName(#[from] InvalidRepoName),

    /// GitHub does not know the repository, or would not tell us about it.
    #[error("repository {name} was not found on GitHub")]
    NotFound { name: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub repository: Repository,
    /// False when the name was already registered.
    pub created: bool,
}

/// Result of a webhook installation attempt.
///
/// Installation failures are not errors: the repository simply stays without
/// a webhook, and a later attempt may succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookStatus {
    /// A webhook was already recorded; nothing was sent to GitHub.
    AlreadyInstalled(u64),
    /// GitHub created the hook and its id was recorded.
    Installed(u64),
    /// GitHub did not create the hook.
    Failed { reason: String },
}

/// Body of GitHub's response to a hook creation.
#[derive(Debug, Deserialize)]
struct CreatedHook {
    id: u64,
}

/// Asks GitHub whether `name` exists and is accessible with `token`.
///
/// Only a 200 counts as existing. Every other status, and every transport
/// failure, is reported as "does not exist": callers cannot distinguish a
/// missing repository from an unreachable GitHub.
pub async fn repository_exists(github: &dyn GitHubClient, name: &RepoName, token: &str) -> bool {
    let endpoint = format!("repos/{}/{}", name.owner, name.project);
    match github
        .request(&endpoint, RequestMethod::Get, token, None)
        .await
    {
        Ok(response) => {
            debug!(repo = %name, status = response.status, "repository existence check");
            response.status == 200
        }
        Err(e) => {
            warn!(repo = %name, error = %e, "repository existence check failed");
            false
        }
    }
}

/// Registers `name` for `owner`.
///
/// If the name is already registered (by anyone) the existing row is
/// returned with `created = false` and GitHub is not consulted.
pub async fn register(
    store: &SqliteStore,
    github: &dyn GitHubClient,
    name: &str,
    owner: &User,
) -> Result<Registration, RegistryError> {
    if let Some(repository) = store.repository_by_name(name).await? {
        debug!(repo = %repository.name, "repository already registered");
        return Ok(Registration {
            repository,
            created: false,
        });
    }

    let parsed = RepoName::parse(name)?;
    if !repository_exists(github, &parsed, &owner.github_token).await {
        return Err(RegistryError::NotFound {
            name: name.to_string(),
        });
    }

    let insert = store.insert_repository(&parsed.full_name(), owner.id).await?;
    let created = insert.was_created();
    let repository = insert.into_repository();
    if created {
        info!(repo = %repository.name, owner = %owner.login, "registered repository");
    }
    Ok(Registration {
        repository,
        created,
    })
}

/// Installs a push webhook on `repository` pointing at `callback_url`.
///
/// Does nothing if a webhook is already recorded. On success the remote hook
/// id is persisted and written back into `repository`. Every failure,
/// including failing to record the id, is logged and reported as
/// [`WebhookStatus::Failed`].
pub async fn add_webhook(
    store: &SqliteStore,
    github: &dyn GitHubClient,
    repository: &mut Repository,
    token: &str,
    callback_url: &str,
) -> WebhookStatus {
    if let Some(id) = repository.webhook_id {
        return WebhookStatus::AlreadyInstalled(id);
    }

    let endpoint = format!("repos/{}/hooks", repository.name);
    let payload = json!({
        "name": "web",
        "active": true,
        "events": ["push"],
        "config": {
            "url": callback_url,
            "content_type": "json",
        },
    });

    let response = match github
        .request(&endpoint, RequestMethod::Post, token, Some(&payload))
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(repo = %repository.name, error = %e, "webhook installation failed");
            return WebhookStatus::Failed {
                reason: e.to_string(),
            };
        }
    };

    if response.status != 201 {
        warn!(
            repo = %repository.name,
            status = response.status,
            "GitHub refused to create webhook"
        );
        return WebhookStatus::Failed {
            reason: format!("GitHub answered HTTP {}", response.status),
        };
    }

    let hook: CreatedHook = match serde_json::from_value(response.json) {
        Ok(hook) => hook,
        Err(e) => {
            warn!(repo = %repository.name, error = %e, "webhook response has no id");
            return WebhookStatus::Failed {
                reason: format!("malformed hook response: {e}"),
            };
        }
    };

    match record_webhook(store, repository, hook.id).await {
        Ok(status) => status,
        Err(e) => {
            warn!(
                repo = %repository.name,
                webhook_id = hook.id,
                error = %e,
                "could not record webhook id"
            );
            WebhookStatus::Failed {
                reason: e.to_string(),
            }
        }
    }
}

async fn record_webhook(
    store: &SqliteStore,
    repository: &mut Repository,
    webhook_id: u64,
) -> Result<WebhookStatus, StoreError> {
    if store.set_webhook_id(repository.id, webhook_id).await? {
        info!(repo = %repository.name, webhook_id, "installed webhook");
        repository.webhook_id = Some(webhook_id);
        return Ok(WebhookStatus::Installed(webhook_id));
    }

    // Another request recorded a webhook first; report the one that won.
    let stored = store
        .repository_by_name(&repository.name)
        .await?
        .and_then(|r| r.webhook_id);
    match stored {
        Some(id) => {
            debug!(repo = %repository.name, webhook_id = id, "webhook recorded concurrently");
            repository.webhook_id = Some(id);
            Ok(WebhookStatus::AlreadyInstalled(id))
        }
        None => Ok(WebhookStatus::Failed {
            reason: "repository disappeared while recording webhook".to_string(),
        }),
    }
}
