//! SQLite-backed store.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`.
//!
//! # Timestamps
//!
//! Commit dates are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix), so lexical order is chronological order.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use super::{Page, PageRequest, RepositoryInsert, StoreError};
use crate::types::{
    Commit, CommitCode, CommitId, NewCommit, Repository, RepositoryId, User, UserId,
};

const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Store over a single SQLite connection.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and runs migrations.
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL`
    /// - `foreign_keys = ON` (not persistent, so set on every open)
    /// - `busy_timeout = 5000ms`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::storage(
                        "create database directory",
                        format!("{}: {}", parent.display(), e),
                    )
                })?;
            }
        }

        let conn =
            Connection::open(path).map_err(|e| StoreError::storage("open database", e))?;
        Self::from_connection(conn, false)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::storage("open database", e))?;
        Self::from_connection(conn, true)
    }

    fn from_connection(conn: Connection, in_memory: bool) -> Result<Self, StoreError> {
        // SQLite silently keeps another journal mode on filesystems without
        // shared memory support; in-memory databases always report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| StoreError::storage("set journal_mode", e))?;
        let expected = if in_memory { "memory" } else { "wal" };
        if !journal_mode.eq_ignore_ascii_case(expected) {
            return Err(StoreError::storage(
                "set journal_mode",
                format!("SQLite returned '{journal_mode}' instead of '{expected}'"),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::storage("configure database", e))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::storage("get schema version", e))?
            .unwrap_or(0);

        run_migrations(&conn, current_version)?;

        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::storage(operation, e))?
    }

    /// Checks that the database still answers queries.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.with_conn("ping", |conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| StoreError::storage("ping", e))
        })
        .await
    }

    // ─── Users ───

    /// Creates or updates a user by login and returns it.
    pub async fn upsert_user(
        &self,
        login: &str,
        api_token: &str,
        github_token: &str,
    ) -> Result<User, StoreError> {
        let (login, api_token, github_token) =
            (login.to_owned(), api_token.to_owned(), github_token.to_owned());
        self.with_conn("upsert user", move |conn| {
            conn.query_row(
                "INSERT INTO users (login, api_token, github_token) VALUES (?1, ?2, ?3)
                 ON CONFLICT(login) DO UPDATE SET
                     api_token = excluded.api_token,
                     github_token = excluded.github_token
                 RETURNING id, login, github_token",
                params![login, api_token, github_token],
                user_from_row,
            )
            .map_err(|e| StoreError::storage("upsert user", e))
        })
        .await
    }

    /// Looks up the user owning an API token.
    pub async fn user_by_api_token(&self, api_token: &str) -> Result<Option<User>, StoreError> {
        let api_token = api_token.to_owned();
        self.with_conn("get user", move |conn| {
            conn.query_row(
                "SELECT id, login, github_token FROM users WHERE api_token = ?1",
                params![api_token],
                user_from_row,
            )
            .optional()
            .map_err(|e| StoreError::storage("get user", e))
        })
        .await
    }

    // ─── Repositories ───

    /// Finds a repository by its full name, whoever owns it.
    pub async fn repository_by_name(&self, name: &str) -> Result<Option<Repository>, StoreError> {
        let name = name.to_owned();
        self.with_conn("get repository", move |conn| select_repository_by_name(conn, &name))
            .await
    }

    /// Finds a repository by id, only if `owner` owns it.
    pub async fn repository_for_owner(
        &self,
        id: RepositoryId,
        owner: UserId,
    ) -> Result<Option<Repository>, StoreError> {
        self.with_conn("get repository", move |conn| {
            conn.query_row(
                "SELECT id, name, owner, webhook_id FROM repositories
                 WHERE id = ?1 AND owner = ?2",
                params![id.0, owner.0],
                repository_from_row,
            )
            .optional()
            .map_err(|e| StoreError::storage("get repository", e))
        })
        .await
    }

    /// Inserts a repository unless one with the same name exists.
    ///
    /// The name's uniqueness is enforced by the database, so a concurrent
    /// insert of the same name yields `Existing` with the winner's row.
    pub async fn insert_repository(
        &self,
        name: &str,
        owner: UserId,
    ) -> Result<RepositoryInsert, StoreError> {
        let name = name.to_owned();
        self.with_conn("insert repository", move |conn| {
            let created = conn
                .query_row(
                    "INSERT INTO repositories (name, owner) VALUES (?1, ?2)
                     ON CONFLICT(name) DO NOTHING
                     RETURNING id, name, owner, webhook_id",
                    params![name, owner.0],
                    repository_from_row,
                )
                .optional()
                .map_err(|e| StoreError::storage("insert repository", e))?;

            match created {
                Some(repo) => Ok(RepositoryInsert::Created(repo)),
                None => select_repository_by_name(conn, &name)?
                    .map(RepositoryInsert::Existing)
                    .ok_or_else(|| {
                        StoreError::storage("insert repository", "conflicting row vanished")
                    }),
            }
        })
        .await
    }

    /// Records the remote webhook id, only if none is recorded yet.
    ///
    /// Returns false if the repository already had a webhook id.
    pub async fn set_webhook_id(
        &self,
        id: RepositoryId,
        webhook_id: u64,
    ) -> Result<bool, StoreError> {
        let webhook_id = i64::try_from(webhook_id)
            .map_err(|e| StoreError::storage("set webhook id", e))?;
        self.with_conn("set webhook id", move |conn| {
            let changed = conn
                .execute(
                    "UPDATE repositories SET webhook_id = ?1
                     WHERE id = ?2 AND webhook_id IS NULL",
                    params![webhook_id, id.0],
                )
                .map_err(|e| StoreError::storage("set webhook id", e))?;
            Ok(changed == 1)
        })
        .await
    }

    /// Lists the repositories owned by `owner`, ordered by id.
    pub async fn list_repositories(
        &self,
        owner: UserId,
        page: PageRequest,
    ) -> Result<Page<Repository>, StoreError> {
        self.with_conn("list repositories", move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM repositories WHERE owner = ?1",
                    params![owner.0],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::storage("count repositories", e))?;

            let mut stmt = conn
                .prepare(
                    "SELECT id, name, owner, webhook_id FROM repositories
                     WHERE owner = ?1
                     ORDER BY id
                     LIMIT ?2 OFFSET ?3",
                )
                .map_err(|e| StoreError::storage("list repositories", e))?;
            let results = stmt
                .query_map(
                    params![owner.0, page.limit, page.offset],
                    repository_from_row,
                )
                .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
                .map_err(|e| StoreError::storage("list repositories", e))?;

            Ok(Page {
                count: count as u64,
                results,
            })
        })
        .await
    }

    // ─── Commits ───

    /// Inserts a commit unless its code is already stored, in any repository.
    ///
    /// Returns true if a row was inserted.
    pub async fn insert_commit(
        &self,
        repository: RepositoryId,
        commit: NewCommit,
    ) -> Result<bool, StoreError> {
        self.with_conn("insert commit", move |conn| {
            let inserted = conn
                .execute(
                    "INSERT INTO commits (code, url, message, date, repository)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(code) DO NOTHING",
                    params![
                        commit.code.as_str(),
                        commit.url,
                        commit.message,
                        encode_date(&commit.date),
                        repository.0
                    ],
                )
                .map_err(|e| StoreError::storage("insert commit", e))?;
            if inserted == 0 {
                debug!(code = %commit.code, "commit already stored, skipping");
            }
            Ok(inserted == 1)
        })
        .await
    }

    /// Lists commits in repositories owned by `owner`, newest first,
    /// optionally restricted to one repository.
    pub async fn list_commits(
        &self,
        owner: UserId,
        repository: Option<RepositoryId>,
        page: PageRequest,
    ) -> Result<Page<Commit>, StoreError> {
        let repository = repository.map(|r| r.0);
        self.with_conn("list commits", move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM commits c
                     JOIN repositories r ON r.id = c.repository
                     WHERE r.owner = ?1 AND (?2 IS NULL OR c.repository = ?2)",
                    params![owner.0, repository],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::storage("count commits", e))?;

            let mut stmt = conn
                .prepare(
                    "SELECT c.id, c.code, c.url, c.message, c.date, c.repository
                     FROM commits c
                     JOIN repositories r ON r.id = c.repository
                     WHERE r.owner = ?1 AND (?2 IS NULL OR c.repository = ?2)
                     ORDER BY c.date DESC, c.id DESC
                     LIMIT ?3 OFFSET ?4",
                )
                .map_err(|e| StoreError::storage("list commits", e))?;
            let results = stmt
                .query_map(
                    params![owner.0, repository, page.limit, page.offset],
                    commit_from_row,
                )
                .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
                .map_err(|e| StoreError::storage("list commits", e))?;

            Ok(Page {
                count: count as u64,
                results,
            })
        })
        .await
    }

    /// Finds a commit by id, only if it belongs to a repository `owner` owns.
    pub async fn commit_for_owner(
        &self,
        id: CommitId,
        owner: UserId,
    ) -> Result<Option<Commit>, StoreError> {
        self.with_conn("get commit", move |conn| {
            conn.query_row(
                "SELECT c.id, c.code, c.url, c.message, c.date, c.repository
                 FROM commits c
                 JOIN repositories r ON r.id = c.repository
                 WHERE c.id = ?1 AND r.owner = ?2",
                params![id.0, owner.0],
                commit_from_row,
            )
            .optional()
            .map_err(|e| StoreError::storage("get commit", e))
        })
        .await
    }
}

fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), StoreError> {
    if from_version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::storage(
            "schema version",
            format!(
                "database schema version {from_version} is newer than supported version \
                 {CURRENT_SCHEMA_VERSION}"
            ),
        ));
    }

    if from_version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    if from_version < 1 {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                login TEXT NOT NULL UNIQUE,
                api_token TEXT NOT NULL UNIQUE,
                github_token TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS repositories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                owner INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                webhook_id INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_repositories_owner ON repositories(owner);

            CREATE TABLE IF NOT EXISTS commits (
                id INTEGER PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL DEFAULT '',
                message TEXT NOT NULL,
                date TEXT NOT NULL,
                repository INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_commits_repository_date
                ON commits(repository, date DESC);
            "#,
        )
        .map_err(|e| StoreError::storage("migration v1", e))?;
    }

    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
        params![CURRENT_SCHEMA_VERSION],
    )
    .map_err(|e| StoreError::storage("update schema version", e))?;

    Ok(())
}

fn select_repository_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<Repository>, StoreError> {
    conn.query_row(
        "SELECT id, name, owner, webhook_id FROM repositories WHERE name = ?1",
        params![name],
        repository_from_row,
    )
    .optional()
    .map_err(|e| StoreError::storage("get repository", e))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get("id")?),
        login: row.get("login")?,
        github_token: row.get("github_token")?,
    })
}

fn repository_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    let webhook_id = row
        .get::<_, Option<i64>>("webhook_id")?
        .map(|id| {
            u64::try_from(id).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(3, Type::Integer, Box::new(e))
            })
        })
        .transpose()?;
    Ok(Repository {
        id: RepositoryId(row.get("id")?),
        name: row.get("name")?,
        owner: UserId(row.get("owner")?),
        webhook_id,
    })
}

fn commit_from_row(row: &Row<'_>) -> rusqlite::Result<Commit> {
    let date: String = row.get("date")?;
    Ok(Commit {
        id: CommitId(row.get("id")?),
        code: CommitCode(row.get("code")?),
        url: row.get("url")?,
        message: row.get("message")?,
        date: decode_date(&date).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
        })?,
        repository: RepositoryId(row.get("repository")?),
    })
}

fn encode_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_date(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc))
}
