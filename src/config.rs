//! Command line and environment configuration.
//!
//! Everything is parsed once at startup into [`Settings`]; components receive
//! the values they need from it rather than reading the environment.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use serde_json::Deserializer;
use thiserror::Error;
use tracing::instrument;

/// Route GitHub deliveries are posted to, relative to the public URL.
pub const WEBHOOK_PATH: &str = "/api/webhook";

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Opt {
    /// SQLite database file, created if missing
    #[arg(long, env = "REPO_MONITOR_DATABASE", default_value = "repo-monitor.sqlite3")]
    pub database: PathBuf,
    /// Users configuration, JSON data sent either through a file or
    /// through stdin (if `-`), should be a map of login to
    /// `{"api_token": ..., "github_token": ...}`
    #[arg(long, env = "REPO_MONITOR_USERS")]
    pub users: PathBuf,
    /// Address on which to bind the server
    #[arg(long, env = "REPO_MONITOR_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,
    /// Root of the GitHub REST API
    #[arg(long, env = "GITHUB_API_ROOT", default_value = "https://api.github.com")]
    pub github_api_root: String,
    /// Externally reachable base URL of this service; webhooks are only
    /// installed when set
    #[arg(long, env = "REPO_MONITOR_PUBLIC_URL")]
    pub public_url: Option<String>,
    /// Timeout for each outbound GitHub request, in seconds
    #[arg(long, default_value_t = 10)]
    pub github_timeout_secs: u64,
    /// Timeout for each inbound request, in seconds
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: PathBuf,
    pub users: PathBuf,
    pub bind: SocketAddr,
    pub github_api_root: String,
    pub public_url: Option<String>,
    pub github_timeout: Duration,
    pub request_timeout: Duration,
}

impl From<Opt> for Settings {
    fn from(opt: Opt) -> Self {
        Settings {
            database: opt.database,
            users: opt.users,
            bind: opt.bind,
            github_api_root: opt.github_api_root,
            public_url: opt
                .public_url
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
            github_timeout: Duration::from_secs(opt.github_timeout_secs),
            request_timeout: Duration::from_secs(opt.request_timeout_secs),
        }
    }
}

impl Settings {
    /// URL GitHub should deliver push events to, if the service is reachable.
    pub fn webhook_callback_url(&self) -> Option<String> {
        self.public_url
            .as_ref()
            .map(|base| format!("{base}{WEBHOOK_PATH}"))
    }
}

/// Credentials of one configured user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserCredentials {
    /// Token presented by API clients as `Authorization: Bearer ...`.
    pub api_token: String,
    /// Token used for GitHub calls made on the user's behalf.
    pub github_token: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read users file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("users file {path} is not a map of login to credentials: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("user {login:?} has an empty api_token")]
    EmptyApiToken { login: String },
}

/// Loads the users map from `path`, or from stdin if `path` is `-`.
#[instrument(level = "debug")]
pub fn load_users(path: &Path) -> Result<BTreeMap<String, UserCredentials>, ConfigError> {
    let users = if path == Path::new("-") {
        let mut de = Deserializer::from_reader(io::stdin());
        BTreeMap::<String, UserCredentials>::deserialize(&mut de)
    } else {
        let file = fs::File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut de = Deserializer::from_reader(io::BufReader::new(file));
        BTreeMap::<String, UserCredentials>::deserialize(&mut de)
    }
    .map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some((login, _)) = users.iter().find(|(_, c)| c.api_token.is_empty()) {
        return Err(ConfigError::EmptyApiToken {
            login: login.clone(),
        });
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Settings {
        let mut argv = vec!["repo-monitor"];
        argv.extend_from_slice(args);
        Opt::try_parse_from(argv).unwrap().into()
    }

    #[test]
    fn defaults() {
        let settings = parse(&["--users", "users.json"]);
        assert_eq!(settings.bind, "127.0.0.1:8000".parse().unwrap());
        assert_eq!(settings.github_timeout, Duration::from_secs(10));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.webhook_callback_url(), None);
    }

    #[test]
    fn callback_url_joins_public_url() {
        let settings = parse(&[
            "--users",
            "u.json",
            "--public-url",
            "https://monitor.example.com/",
        ]);
        assert_eq!(
            settings.webhook_callback_url().as_deref(),
            Some("https://monitor.example.com/api/webhook")
        );
    }

    #[test]
    fn empty_public_url_disables_webhooks() {
        let settings = parse(&["--users", "u.json", "--public-url", ""]);
        assert_eq!(settings.public_url, None);
    }

    #[test]
    fn load_users_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"foo": {{"api_token": "a", "github_token": "g"}},
                "bar": {{"api_token": "b", "github_token": "h"}}}}"#
        )
        .unwrap();

        let users = load_users(file.path()).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users["foo"].api_token, "a");
        assert_eq!(users["bar"].github_token, "h");
    }

    #[test]
    fn load_users_rejects_empty_token() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"foo": {{"api_token": "", "github_token": "g"}}}}"#).unwrap();
        assert!(matches!(
            load_users(file.path()),
            Err(ConfigError::EmptyApiToken { login }) if login == "foo"
        ));
    }

    #[test]
    fn load_users_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["not", "a", "map"]"#).unwrap();
        assert!(matches!(
            load_users(file.path()),
            Err(ConfigError::Json { .. })
        ));
    }

    #[test]
    fn load_users_reports_missing_file() {
        assert!(matches!(
            load_users(Path::new("/nonexistent/users.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}
