//! Commit ingestion: historical backfill and webhook pushes.
//!
//! Both entry points share one rule: a commit is inserted if and only if its
//! code is not already stored anywhere. Duplicates are skipped, never errors.
//! Each commit is inserted on its own; a failure part-way through a batch
//! leaves the commits already inserted in place.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::github::{GitHubApiError, GitHubClient, RequestMethod};
use crate::store::{SqliteStore, StoreError};
use crate::types::{NewCommit, Repository};
use crate::webhooks::PushCommit;

/// Longest accepted backfill window, in days.
pub const MAX_BACKFILL_DAYS: u32 = 36_500;

/// Errors from ingesting commits.
#[derive(Debug, Error)]
pub enum IngestError {
    /// GitHub answered the commit listing with a non-2xx status.
    #[error("GitHub answered the commit listing with HTTP {status}")]
    UpstreamStatus { status: u16 },

    /// GitHub answered 2xx but the body is not a list of commits.
    #[error("GitHub commit listing is malformed: {0}")]
    MalformedListing(#[source] serde_json::Error),

    /// No response from GitHub at all.
    #[error(transparent)]
    GitHub(#[from] GitHubApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error for a backfill window outside `1..=MAX_BACKFILL_DAYS`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("days must be an integer between 1 and {max}, got {0}", max = MAX_BACKFILL_DAYS)]
pub struct InvalidWindow(pub i64);

/// How far back a backfill reaches, in whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillWindow {
    days: u32,
}

impl BackfillWindow {
    pub fn new(days: i64) -> Result<Self, InvalidWindow> {
        match u32::try_from(days) {
            Ok(d) if (1..=MAX_BACKFILL_DAYS).contains(&d) => Ok(BackfillWindow { days: d }),
            _ => Err(InvalidWindow(days)),
        }
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    /// Oldest commit date still inside the window.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.days))
    }
}

/// Counts from one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Commits newly stored.
    pub inserted: usize,
    /// Commits whose code was already stored.
    pub duplicates: usize,
    /// Backfilled commits older than the window.
    pub outside_window: usize,
}

/// One element of GitHub's `GET repos/{owner}/{repo}/commits` response.
#[derive(Debug, Deserialize)]
struct ListedCommit {
    sha: String,
    #[serde(default)]
    html_url: Option<String>,
    commit: ListedCommitDetail,
}

#[derive(Debug, Deserialize)]
struct ListedCommitDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    author: Option<ListedSignature>,
}

#[derive(Debug, Deserialize)]
struct ListedSignature {
    #[serde(default)]
    date: Option<String>,
}

/// Error for a timestamp that is neither RFC 3339 nor RFC 3339 with a space
/// separator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid timestamp {0:?}")]
pub struct InvalidTimestamp(pub String);

/// Parses a GitHub timestamp into UTC.
///
/// Accepts RFC 3339 (`2019-02-10T00:00:00Z`, `2019-02-10T00:00:00-03:00`) and
/// the same with a space instead of `T`.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, InvalidTimestamp> {
    let parse = |candidate: &str| {
        DateTime::parse_from_rfc3339(candidate).map(|d| d.with_timezone(&Utc))
    };
    parse(s)
        .or_else(|_| match s.get(10..11) {
            Some(" ") => parse(&format!("{}T{}", &s[..10], &s[11..])),
            _ => parse(s),
        })
        .map_err(|_| InvalidTimestamp(s.to_string()))
}

/// Backfills up to `window` days of history for `repository`.
///
/// Fetches the repository's commit listing from GitHub with the user's token
/// and stores every commit dated inside the window. If GitHub fails or answers
/// with anything but a commit list, nothing is stored.
pub async fn bulk_insert_from_backfill(
    store: &SqliteStore,
    github: &dyn GitHubClient,
    repository: &Repository,
    token: &str,
    window: BackfillWindow,
) -> Result<IngestSummary, IngestError> {
    let now = Utc::now();
    let cutoff = window.cutoff(now);
    let endpoint = format!(
        "repos/{}/commits?since={}",
        repository.name,
        cutoff.to_rfc3339_opts(SecondsFormat::Secs, true)
    );

    let response = github
        .request(&endpoint, RequestMethod::Get, token, None)
        .await?;
    if !response.is_success() {
        warn!(
            repo = %repository.name,
            status = response.status,
            "GitHub refused commit listing"
        );
        return Err(IngestError::UpstreamStatus {
            status: response.status,
        });
    }

    let listed: Vec<ListedCommit> =
        serde_json::from_value(response.json).map_err(IngestError::MalformedListing)?;
    debug!(repo = %repository.name, fetched = listed.len(), "fetched commit listing");

    let mut summary = IngestSummary::default();
    let mut candidates = Vec::with_capacity(listed.len());
    for item in listed {
        let date = match item.commit.author.and_then(|a| a.date) {
            Some(raw) => match parse_timestamp(&raw) {
                Ok(date) => date,
                Err(e) => {
                    warn!(repo = %repository.name, sha = %item.sha, error = %e, "skipping commit");
                    continue;
                }
            },
            None => now,
        };
        if date < cutoff {
            summary.outside_window += 1;
            continue;
        }
        candidates.push(NewCommit::new(
            item.sha,
            item.html_url.unwrap_or_default(),
            item.commit.message.as_deref().unwrap_or_default(),
            date,
        ));
    }

    insert_all(store, repository, candidates, &mut summary).await?;
    info!(
        repo = %repository.name,
        days = window.days(),
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        outside_window = summary.outside_window,
        "backfill finished"
    );
    Ok(summary)
}

/// Stores the commits of a push delivery for `repository`.
///
/// No date filtering: pushes are assumed recent. Commits without a timestamp
/// are dated at ingestion time.
pub async fn ingest_from_webhook_push(
    store: &SqliteStore,
    repository: &Repository,
    commits: Vec<PushCommit>,
) -> Result<IngestSummary, StoreError> {
    let now = Utc::now();
    let candidates = commits.into_iter().map(|c| c.into_new_commit(now));

    let mut summary = IngestSummary::default();
    insert_all(store, repository, candidates, &mut summary).await?;
    info!(
        repo = %repository.name,
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        "push ingested"
    );
    Ok(summary)
}

async fn insert_all(
    store: &SqliteStore,
    repository: &Repository,
    commits: impl IntoIterator<Item = NewCommit>,
    summary: &mut IngestSummary,
) -> Result<(), StoreError> {
    for commit in commits {
        if store.insert_commit(repository.id, commit).await? {
            summary.inserted += 1;
        } else {
            summary.duplicates += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PageRequest;
    use crate::test_utils::{MockGitHub, store_with_users};
    use crate::types::{CommitCode, User};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::{Value, json};

    const LISTING: &str = "repos/foo-user/test-repo/commits";

    async fn setup() -> (SqliteStore, User, Repository) {
        let (store, foo, _) = store_with_users().await;
        let repo = store
            .insert_repository("foo-user/test-repo", foo.id)
            .await
            .unwrap()
            .into_repository();
        (store, foo, repo)
    }

    fn listed(sha: &str, date: DateTime<Utc>, message: &str) -> Value {
        json!({
            "sha": sha,
            "html_url": format!("https://github.com/foo-user/test-repo/commit/{sha}"),
            "commit": {
                "message": message,
                "author": { "date": date.to_rfc3339_opts(SecondsFormat::Secs, true) }
            }
        })
    }

    async fn stored_codes(store: &SqliteStore, owner: &User) -> Vec<CommitCode> {
        store
            .list_commits(owner.id, None, PageRequest::new(Some(100), None))
            .await
            .unwrap()
            .results
            .into_iter()
            .map(|c| c.code)
            .collect()
    }

    fn thirty_days() -> BackfillWindow {
        BackfillWindow::new(30).unwrap()
    }

    #[test]
    fn window_bounds() {
        assert!(BackfillWindow::new(1).is_ok());
        assert!(BackfillWindow::new(i64::from(MAX_BACKFILL_DAYS)).is_ok());
        assert_eq!(BackfillWindow::new(0), Err(InvalidWindow(0)));
        assert_eq!(BackfillWindow::new(-3), Err(InvalidWindow(-3)));
        assert!(BackfillWindow::new(i64::from(MAX_BACKFILL_DAYS) + 1).is_err());
    }

    #[test]
    fn cutoff_is_days_before_now() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        let cutoff = thirty_days().cutoff(now);
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2026, 9, 17, 12, 0, 0).unwrap());
    }

    #[test]
    fn timestamps_accept_space_separator() {
        let expected = Utc.with_ymd_and_hms(2019, 2, 10, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2019-02-10T00:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2019-02-10 00:00:00Z").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2019-02-09T21:00:00-03:00").unwrap(),
            expected
        );
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp("").is_err());
    }

    proptest! {
        #[test]
        fn timestamps_roundtrip(secs in 0i64..4_000_000_000) {
            let date = Utc.timestamp_opt(secs, 0).unwrap();
            let rfc = date.to_rfc3339_opts(SecondsFormat::Secs, true);
            prop_assert_eq!(parse_timestamp(&rfc).unwrap(), date);
            let spaced = rfc.replacen('T', " ", 1);
            prop_assert_eq!(parse_timestamp(&spaced).unwrap(), date);
        }

        #[test]
        fn timestamp_parser_never_panics(s in "\\PC{0,40}") {
            let _ = parse_timestamp(&s);
        }
    }

    #[tokio::test]
    async fn backfill_inserts_recent_commits_once() {
        let (store, foo, repo) = setup().await;
        let now = Utc::now();
        let github = MockGitHub::new().respond(
            RequestMethod::Get,
            LISTING,
            200,
            json!([
                listed("749353593", now - Duration::days(2), "Hello World"),
                listed("31389494", now - Duration::days(5), "Bye World"),
            ]),
        );

        let first = bulk_insert_from_backfill(&store, &github, &repo, "tok", thirty_days())
            .await
            .unwrap();
        assert_eq!(first.inserted, 2);

        let second = bulk_insert_from_backfill(&store, &github, &repo, "tok", thirty_days())
            .await
            .unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);

        assert_eq!(stored_codes(&store, &foo).await.len(), 2);
    }

    #[tokio::test]
    async fn backfill_requests_window_with_users_token() {
        let (store, _, repo) = setup().await;
        let github = MockGitHub::new().respond(RequestMethod::Get, LISTING, 200, json!([]));

        bulk_insert_from_backfill(&store, &github, &repo, "the-token", thirty_days())
            .await
            .unwrap();

        let request = &github.requests()[0];
        assert_eq!(request.token, "the-token");
        assert_eq!(request.method, RequestMethod::Get);
        assert!(request.endpoint.starts_with("repos/foo-user/test-repo/commits?since="));
    }

    #[tokio::test]
    async fn backfill_skips_commits_older_than_window() {
        let (store, foo, repo) = setup().await;
        let now = Utc::now();
        let github = MockGitHub::new().respond(
            RequestMethod::Get,
            LISTING,
            200,
            json!([
                listed("recent", now - Duration::days(1), "new"),
                listed("ancient", now - Duration::days(31), "old"),
            ]),
        );

        let summary = bulk_insert_from_backfill(&store, &github, &repo, "tok", thirty_days())
            .await
            .unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.outside_window, 1);
        assert_eq!(stored_codes(&store, &foo).await, vec![CommitCode::new("recent")]);
    }

    #[tokio::test]
    async fn backfill_upstream_failure_stores_nothing() {
        let (store, foo, repo) = setup().await;
        let github = MockGitHub::new().respond(RequestMethod::Get, LISTING, 500, Value::Null);

        let err = bulk_insert_from_backfill(&store, &github, &repo, "tok", thirty_days())
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::UpstreamStatus { status: 500 }));
        assert!(stored_codes(&store, &foo).await.is_empty());
    }

    #[tokio::test]
    async fn backfill_transport_failure_is_upstream() {
        let (store, _, repo) = setup().await;
        let github = MockGitHub::new().fail(RequestMethod::Get, LISTING);

        let err = bulk_insert_from_backfill(&store, &github, &repo, "tok", thirty_days())
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::GitHub(_)));
    }

    #[tokio::test]
    async fn backfill_rejects_malformed_listing() {
        let (store, foo, repo) = setup().await;
        let github = MockGitHub::new().respond(
            RequestMethod::Get,
            LISTING,
            200,
            json!({"message": "not a list"}),
        );

        let err = bulk_insert_from_backfill(&store, &github, &repo, "tok", thirty_days())
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::MalformedListing(_)));
        assert!(stored_codes(&store, &foo).await.is_empty());
    }

    #[tokio::test]
    async fn backfill_truncates_messages_and_defaults_missing_fields() {
        let (store, foo, repo) = setup().await;
        let long_message = "x".repeat(400);
        let github = MockGitHub::new().respond(
            RequestMethod::Get,
            LISTING,
            200,
            json!([{ "sha": "nodate", "commit": { "message": long_message } }]),
        );

        let summary = bulk_insert_from_backfill(&store, &github, &repo, "tok", thirty_days())
            .await
            .unwrap();
        assert_eq!(summary.inserted, 1);

        let stored = store
            .list_commits(foo.id, None, PageRequest::default())
            .await
            .unwrap()
            .results
            .remove(0);
        assert_eq!(stored.url, "");
        assert_eq!(stored.message.len(), crate::types::MAX_MESSAGE_CHARS);
        assert!(Utc::now() - stored.date < Duration::minutes(5));
    }

    #[tokio::test]
    async fn push_inserts_all_without_date_filter() {
        let (store, foo, repo) = setup().await;
        let commits = vec![
            PushCommit::new(
                "387393",
                "https://www.foo.com/387393",
                "Hello World",
                Some(parse_timestamp("2019-02-10 00:00:00Z").unwrap()),
            ),
            PushCommit::new(
                "759358035",
                "https://www.foo.com/759358035",
                "Bye World",
                None,
            ),
        ];

        let summary = ingest_from_webhook_push(&store, &repo, commits.clone())
            .await
            .unwrap();
        assert_eq!(summary.inserted, 2);

        let again = ingest_from_webhook_push(&store, &repo, commits).await.unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.duplicates, 2);

        let mut codes = stored_codes(&store, &foo).await;
        codes.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(
            codes,
            vec![CommitCode::new("387393"), CommitCode::new("759358035")]
        );
    }

    #[tokio::test]
    async fn duplicates_within_one_push_are_skipped() {
        let (store, _, repo) = setup().await;
        let commits = vec![
            PushCommit::new("same", "", "first", None),
            PushCommit::new("same", "", "second", None),
        ];

        let summary = ingest_from_webhook_push(&store, &repo, commits).await.unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.duplicates, 1);
    }
}
