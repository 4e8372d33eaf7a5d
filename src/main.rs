use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use repo_monitor::config::{Opt, Settings, load_users};
use repo_monitor::github::OctocrabClient;
use repo_monitor::server::{AppState, build_router};
use repo_monitor::store::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repo_monitor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from(Opt::parse());

    let store = SqliteStore::open(&settings.database)
        .with_context(|| format!("opening database {}", settings.database.display()))?;

    let users = load_users(&settings.users)?;
    for (login, credentials) in &users {
        store
            .upsert_user(login, &credentials.api_token, &credentials.github_token)
            .await
            .with_context(|| format!("provisioning user {login}"))?;
    }
    tracing::info!(users = users.len(), "users provisioned");

    let github = OctocrabClient::new(settings.github_api_root.clone(), settings.github_timeout);
    let callback_url = settings.webhook_callback_url();
    match &callback_url {
        Some(url) => tracing::info!(callback_url = %url, "webhooks will be installed"),
        None => tracing::warn!("no public URL configured, webhooks will not be installed"),
    }

    let state = AppState::new(store, Arc::new(github), callback_url);
    let app = build_router(state)
        .layer(TimeoutLayer::new(settings.request_timeout))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("binding {}", settings.bind))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
