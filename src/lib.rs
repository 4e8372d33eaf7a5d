//! Repository Monitor - mirrors the commit history of GitHub repositories.
//!
//! Users register repositories they can see on GitHub. The service installs a
//! push webhook on each one, backfills recent history on request, and stores
//! every commit it hears about exactly once.

pub mod config;
pub mod github;
pub mod ingest;
pub mod registry;
pub mod server;
pub mod store;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod test_utils;
