//! The issue fetch cycle.
//!
//! ```text
//! IssueQuery ──► effective query ──► cache lookup ──hit──► FetchOutcome { cached: true }
//!                                         │ miss
//!                                         ▼
//!                   search pages, batch_size at a time (join_all, paced)
//!                                         ▼
//!                   drop pull requests, non-open items, duplicate ids
//!                                         ▼
//!                   repository languages (buffer_unordered, capped)
//!                                         ▼
//!                   transform ─► cap at max_issues ─► cache write ─► FetchOutcome
//! ```
//!
//! Failures never escape [`IssueFetcher::fetch_issues`]; they come back as an
//! outcome with an empty issue list and a user-facing message.
//!
//! `cycle_timeout_secs` is a deadline shared by every request in the cycle.
//! Work still pending at the deadline is abandoned and recorded as failed;
//! what already arrived is kept.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;

use super::http::{HttpClient, ReqwestTransport, Transport};
use super::models::{RawIssue, RepoDetails, SearchResponse};
use super::query::{repository_api_url, repository_name, search_url};
use crate::cache::TtlCache;
use crate::config::{BitbugConfig, SearchSection};
use crate::errors::FetchError;
use crate::filters::IssueQuery;
use crate::issue::{Issue, IssueState, TransformOptions};

const ACCEPT: &str = "application/vnd.github.v3+json";
const API_VERSION: &str = "2022-11-28";

/// Whether a fetch may be answered from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Use,
    /// Skip the cache read; the fresh result is still written back.
    Refresh,
}

/// What happened during one fetch cycle, beyond the issues themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchDiagnostics {
    pub authenticated: bool,
    pub succeeded_pages: Vec<u32>,
    pub failed_pages: Vec<u32>,
    pub raw_items: usize,
    pub pull_requests_skipped: usize,
    pub closed_skipped: usize,
    pub duplicates_skipped: usize,
    pub repositories_requested: usize,
    pub repositories_enriched: usize,
    pub repositories_failed: usize,
    /// Issues cut by the `max_issues` cap.
    pub truncated: usize,
    pub elapsed_ms: u64,
}

/// Result of [`IssueFetcher::fetch_issues`].
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub issues: Vec<Issue>,
    pub error: Option<String>,
    pub cached: bool,
    /// When the issues were fetched; for cache hits, the time of the fetch that filled the entry.
    pub timestamp: DateTime<Utc>,
    pub diagnostics: FetchDiagnostics,
}

impl FetchOutcome {
    fn failure(err: &FetchError, diagnostics: FetchDiagnostics) -> Self {
        Self {
            issues: Vec::new(),
            error: Some(err.user_message()),
            cached: false,
            timestamp: Utc::now(),
            diagnostics,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Cached result bundle. Only successful cycles are cached.
#[derive(Debug, Clone)]
struct CachedResult {
    issues: Arc<Vec<Issue>>,
    timestamp: DateTime<Utc>,
    diagnostics: FetchDiagnostics,
}

/// Fetches, enriches and caches issues for a filter set.
///
/// Owns its cache; construct one per process and share it by reference.
pub struct IssueFetcher {
    client: HttpClient,
    cache: Mutex<TtlCache<CachedResult>>,
    api_base: String,
    search: SearchSection,
    authenticated: bool,
    require_token: bool,
}

impl IssueFetcher {
    /// Production fetcher over `reqwest`.
    pub fn new(config: &BitbugConfig, token: Option<String>) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(&config.github.user_agent)?;
        Ok(Self::with_transport(config, token, Arc::new(transport)))
    }

    pub fn with_transport(
        config: &BitbugConfig,
        token: Option<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let token = token.filter(|t| !t.trim().is_empty());
        let mut client = HttpClient::new(transport, config.http.retry_policy())
            .with_header("Accept", ACCEPT)
            .with_header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &token {
            client = client.with_header("Authorization", format!("Bearer {}", token.trim()));
        }

        let cache = TtlCache::new(config.cache.capacity, config.result_ttl())
            .with_allow_stale(config.cache.allow_stale);

        Self {
            client,
            cache: Mutex::new(cache),
            api_base: config.github.api_base.clone(),
            search: config.search.clone(),
            authenticated: token.is_some(),
            require_token: config.github.require_token,
        }
    }

    pub async fn fetch_issues(&self, query: &IssueQuery) -> FetchOutcome {
        self.fetch_issues_with(query, CacheMode::Use).await
    }

    pub async fn fetch_issues_with(&self, query: &IssueQuery, mode: CacheMode) -> FetchOutcome {
        let query = query.effective(self.search.language_mode);
        let key = query.cache_key();

        let hit = match mode {
            CacheMode::Use => self.lock_cache().get(&key),
            CacheMode::Refresh => None,
        };
        if let Some(hit) = hit {
            tracing::debug!(key = %key, issues = hit.issues.len(), "cache hit");
            return FetchOutcome {
                issues: hit.issues.as_ref().clone(),
                error: None,
                cached: true,
                timestamp: hit.timestamp,
                diagnostics: hit.diagnostics,
            };
        }

        let mut diagnostics = FetchDiagnostics {
            authenticated: self.authenticated,
            ..FetchDiagnostics::default()
        };

        if !self.authenticated {
            if self.require_token {
                tracing::warn!("no GitHub token configured, refusing to fetch");
                return FetchOutcome::failure(&FetchError::NotConfigured, diagnostics);
            }
            tracing::warn!("no GitHub token configured, fetching unauthenticated");
        }

        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.search.cycle_timeout_secs);
        let result = self.run_cycle(&query, deadline, &mut diagnostics).await;
        diagnostics.elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(issues) => {
                let timestamp = Utc::now();
                tracing::info!(
                    key = %key,
                    issues = issues.len(),
                    pages = diagnostics.succeeded_pages.len(),
                    failed_pages = diagnostics.failed_pages.len(),
                    elapsed_ms = diagnostics.elapsed_ms,
                    "fetch cycle complete"
                );
                let issues = Arc::new(issues);
                self.lock_cache().set(
                    key,
                    CachedResult {
                        issues: Arc::clone(&issues),
                        timestamp,
                        diagnostics: diagnostics.clone(),
                    },
                );
                FetchOutcome {
                    issues: Arc::unwrap_or_clone(issues),
                    error: None,
                    cached: false,
                    timestamp,
                    diagnostics,
                }
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "fetch cycle failed");
                FetchOutcome::failure(&err, diagnostics)
            }
        }
    }

    async fn run_cycle(
        &self,
        query: &IssueQuery,
        deadline: Instant,
        diagnostics: &mut FetchDiagnostics,
    ) -> Result<Vec<Issue>, FetchError> {
        let raw = self.collect_pages(query, deadline, diagnostics).await?;
        diagnostics.raw_items = raw.len();

        let raw = screen(raw, diagnostics);
        let languages = self.repository_languages(&raw, deadline, diagnostics).await;

        let opts = TransformOptions {
            description_chars: self.search.description_chars,
            inject_type_label: self.search.inject_type_label,
        };
        let mut issues: Vec<Issue> = raw
            .into_iter()
            .map(|item| {
                let language = languages
                    .get(&item.repository_url)
                    .and_then(|l| l.as_deref());
                Issue::from_raw(item, language, &opts)
            })
            .collect();

        if issues.len() > self.search.max_issues {
            diagnostics.truncated = issues.len() - self.search.max_issues;
            issues.truncate(self.search.max_issues);
        }
        Ok(issues)
    }

    /// Page through the search endpoint in paced batches.
    ///
    /// A 401 or 403 on any page aborts the cycle. Other page failures are
    /// dropped; if no page succeeds the last failure is returned. Pages
    /// unfinished or not yet started at `deadline` count as failed.
    async fn collect_pages(
        &self,
        query: &IssueQuery,
        deadline: Instant,
        diagnostics: &mut FetchDiagnostics,
    ) -> Result<Vec<RawIssue>, FetchError> {
        let per_page = self.search.per_page;
        let max_pages = self.search.max_pages;
        let batch_size = self.search.batch_size.max(1) as u32;
        let batch_delay = Duration::from_millis(self.search.batch_delay_ms);

        let mut raw = Vec::new();
        let mut last_error = None;
        let mut first = 1;

        while first <= max_pages {
            let last = (first + batch_size - 1).min(max_pages);
            let urls = (first..=last)
                .map(|page| search_url(&self.api_base, query, per_page, page).map(|url| (page, url)))
                .collect::<Result<Vec<_>, _>>()?;

            let results = join_all(urls.iter().map(|(page, url)| async move {
                let result = tokio::time::timeout_at(deadline, self.fetch_page(url))
                    .await
                    .unwrap_or_else(|_| Err(self.cycle_timeout()));
                (*page, result)
            }))
            .await;

            let mut exhausted = false;
            for (page, result) in results {
                match result {
                    Ok(resp) => {
                        tracing::debug!(page, items = resp.items.len(), "search page fetched");
                        exhausted |= resp.items.len() < per_page as usize;
                        diagnostics.succeeded_pages.push(page);
                        raw.extend(resp.items);
                    }
                    Err(err) if err.aborts_cycle() => return Err(err),
                    Err(err) => {
                        tracing::warn!(page, error = %err, "dropping failed search page");
                        diagnostics.failed_pages.push(page);
                        last_error = Some(err);
                    }
                }
            }

            first = last + 1;
            if exhausted || first > max_pages {
                break;
            }
            tokio::time::sleep(batch_delay).await;

            if Instant::now() >= deadline {
                tracing::warn!(
                    pages = ?(first..=max_pages),
                    "cycle deadline reached, skipping remaining pages"
                );
                diagnostics.failed_pages.extend(first..=max_pages);
                last_error = Some(self.cycle_timeout());
                break;
            }
        }

        match last_error {
            Some(err) if diagnostics.succeeded_pages.is_empty() => Err(err),
            _ => Ok(raw),
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<SearchResponse, FetchError> {
        self.client.fetch_with_retry(url).await?.json(url)
    }

    /// Primary language per repository URL, for at most `max_repositories`
    /// repositories in order of first appearance. Failed lookups, and lookups
    /// cut off by `deadline`, map to `None`.
    async fn repository_languages(
        &self,
        issues: &[RawIssue],
        deadline: Instant,
        diagnostics: &mut FetchDiagnostics,
    ) -> HashMap<String, Option<String>> {
        let mut seen = HashSet::new();
        let repositories: Vec<&str> = issues
            .iter()
            .map(|i| i.repository_url.as_str())
            .filter(|url| seen.insert(*url))
            .take(self.search.max_repositories)
            .collect();
        diagnostics.repositories_requested = repositories.len();

        let results: Vec<(String, Result<RepoDetails, FetchError>)> =
            futures::stream::iter(repositories)
                .map(|repository_url| async move {
                    let details = if Instant::now() >= deadline {
                        Err(self.cycle_timeout())
                    } else {
                        tokio::time::timeout_at(deadline, self.fetch_repository(repository_url))
                            .await
                            .unwrap_or_else(|_| Err(self.cycle_timeout()))
                    };
                    (repository_url.to_string(), details)
                })
                .buffer_unordered(self.search.repository_concurrency.max(1))
                .collect()
                .await;

        let mut languages = HashMap::with_capacity(results.len());
        for (repository_url, details) in results {
            match details {
                Ok(details) => {
                    diagnostics.repositories_enriched += 1;
                    languages.insert(repository_url, details.language);
                }
                Err(err) => {
                    tracing::warn!(repository = %repository_url, error = %err, "repository lookup failed");
                    diagnostics.repositories_failed += 1;
                    languages.insert(repository_url, None);
                }
            }
        }
        languages
    }

    async fn fetch_repository(&self, repository_url: &str) -> Result<RepoDetails, FetchError> {
        let url = repository_api_url(&self.api_base, &repository_name(repository_url));
        self.client.fetch_with_retry(&url).await?.json(&url)
    }

    fn cycle_timeout(&self) -> FetchError {
        FetchError::Timeout(Duration::from_secs(self.search.cycle_timeout_secs))
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, TtlCache<CachedResult>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drop pull requests, non-open items and repeated ids, keeping first occurrences.
fn screen(raw: Vec<RawIssue>, diagnostics: &mut FetchDiagnostics) -> Vec<RawIssue> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|item| {
            if item.is_pull_request() {
                diagnostics.pull_requests_skipped += 1;
                false
            } else if IssueState::parse(&item.state) != Some(IssueState::Open) {
                diagnostics.closed_skipped += 1;
                false
            } else if !seen.insert(item.id) {
                diagnostics.duplicates_skipped += 1;
                false
            } else {
                true
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{LanguageMode, SortBy};
    use crate::github::mock::{MockTransport, Reply};
    use crate::issue::{NO_DESCRIPTION, UNKNOWN_LANGUAGE};
    use serde_json::{Value, json};

    const API: &str = "https://api.test";
    const TOKEN: &str = "ghp_testtoken";

    fn config() -> BitbugConfig {
        let mut config = BitbugConfig::default();
        config.github.api_base = API.to_string();
        config.http.base_delay_ms = 0;
        config.http.max_delay_ms = 0;
        config.search.max_pages = 1;
        config.search.batch_delay_ms = 0;
        config
    }

    fn fetcher(config: &BitbugConfig, mock: &Arc<MockTransport>) -> IssueFetcher {
        IssueFetcher::with_transport(config, Some(TOKEN.to_string()), mock.clone())
    }

    fn query() -> IssueQuery {
        IssueQuery::new(
            vec!["rust".to_string()],
            vec!["good first issue".to_string()],
            SortBy::Newest,
        )
    }

    fn page_url(config: &BitbugConfig, page: u32) -> String {
        search_url(API, &query(), config.search.per_page, page).unwrap()
    }

    fn repo_url(full_name: &str) -> String {
        repository_api_url(API, full_name)
    }

    fn raw(id: u64, repo: &str) -> Value {
        json!({
            "id": id,
            "number": id % 1000,
            "title": format!("Issue {id}"),
            "body": "Something is broken",
            "labels": [{"name": "good first issue", "color": "7057ff"}],
            "user": {"login": "octocat", "avatar_url": "https://a.test/u", "html_url": "https://github.com/octocat"},
            "repository_url": format!("https://api.github.com/repos/{repo}"),
            "html_url": format!("https://github.com/{repo}/issues/{id}"),
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "comments": 3,
            "state": "open"
        })
    }

    fn page(items: Vec<Value>) -> Reply {
        Reply::json(json!({"total_count": items.len(), "incomplete_results": false, "items": items}).to_string())
    }

    fn repo(language: &str) -> Reply {
        Reply::json(json!({"full_name": "x/y", "language": language}).to_string())
    }

    #[tokio::test]
    async fn test_fetch_transforms_and_enriches() {
        let config = config();
        let mock = Arc::new(MockTransport::new());
        mock.push(&page_url(&config, 1), page(vec![raw(1, "acme/widgets"), raw(2, "acme/gears")]));
        mock.push(&repo_url("acme/widgets"), repo("Rust"));
        mock.push(&repo_url("acme/gears"), repo("Go"));

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert!(outcome.error.is_none(), "{:?}", outcome.error);
        assert!(!outcome.cached);
        assert_eq!(outcome.issues.len(), 2);
        assert_eq!(outcome.issues[0].repository_name, "acme/widgets");
        assert_eq!(outcome.issues[0].repository_language, "Rust");
        assert_eq!(outcome.issues[1].repository_language, "Go");
        assert_eq!(outcome.diagnostics.succeeded_pages, vec![1]);
        assert_eq!(outcome.diagnostics.repositories_enriched, 2);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let config = config();
        let mock = Arc::new(MockTransport::new());
        mock.push(&page_url(&config, 1), page(vec![raw(1, "acme/widgets")]));
        mock.push(&repo_url("acme/widgets"), repo("Rust"));
        let fetcher = fetcher(&config, &mock);

        let first = fetcher.fetch_issues(&query()).await;
        let calls = mock.total_calls();

        let second = fetcher.fetch_issues(&query()).await;
        assert!(second.cached);
        assert!(second.error.is_none());
        assert_eq!(second.issues, first.issues);
        assert_eq!(second.timestamp, first.timestamp);
        assert_eq!(mock.total_calls(), calls);
    }

    #[tokio::test]
    async fn test_cache_key_ignores_filter_order() {
        let config = config();
        let mock = Arc::new(MockTransport::new());
        let q = IssueQuery::new(
            vec!["rust".to_string(), "go".to_string()],
            vec!["bug".to_string(), "help wanted".to_string()],
            SortBy::Newest,
        );
        let url = search_url(API, &q.effective(LanguageMode::All), 100, 1).unwrap();
        mock.push(&url, page(vec![raw(1, "acme/widgets")]));
        let fetcher = fetcher(&config, &mock);
        fetcher.fetch_issues(&q).await;

        let reordered = IssueQuery::new(
            vec!["go".to_string(), "rust".to_string()],
            vec!["help wanted".to_string(), "bug".to_string()],
            SortBy::Newest,
        );
        assert!(fetcher.fetch_issues(&reordered).await.cached);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache_read() {
        let config = config();
        let mock = Arc::new(MockTransport::new());
        mock.set_fallback(&page_url(&config, 1), page(vec![raw(1, "acme/widgets")]));
        let fetcher = fetcher(&config, &mock);

        fetcher.fetch_issues(&query()).await;
        let refreshed = fetcher.fetch_issues_with(&query(), CacheMode::Refresh).await;
        assert!(!refreshed.cached);
        assert_eq!(mock.calls(&page_url(&config, 1)), 2);

        assert!(fetcher.fetch_issues(&query()).await.cached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_result_expires_after_result_ttl() {
        let config = config();
        let mock = Arc::new(MockTransport::new());
        mock.set_fallback(&page_url(&config, 1), page(vec![raw(1, "acme/widgets")]));
        let fetcher = fetcher(&config, &mock);

        fetcher.fetch_issues(&query()).await;
        tokio::time::advance(Duration::from_secs(7 * 60)).await;
        assert!(fetcher.fetch_issues(&query()).await.cached);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert!(!fetcher.fetch_issues(&query()).await.cached);
        assert_eq!(mock.calls(&page_url(&config, 1)), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_returns_auth_error_without_retry() {
        let mut config = config();
        config.http.max_retries = 3;
        let mock = Arc::new(MockTransport::new());
        mock.set_fallback(&page_url(&config, 1), Reply::status(401));

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert!(outcome.issues.is_empty());
        assert_eq!(
            outcome.error.as_deref(),
            Some("Authentication failed. Please check your GitHub token.")
        );
        assert_eq!(mock.calls(&page_url(&config, 1)), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let config = config();
        let mock = Arc::new(MockTransport::new());
        mock.push(&page_url(&config, 1), Reply::status(401));
        mock.push(&page_url(&config, 1), page(vec![raw(1, "acme/widgets")]));
        let fetcher = fetcher(&config, &mock);

        assert!(fetcher.fetch_issues(&query()).await.is_error());
        let retry = fetcher.fetch_issues(&query()).await;
        assert!(!retry.cached);
        assert_eq!(retry.issues.len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_on_any_page_aborts_cycle() {
        let mut config = config();
        config.search.per_page = 1;
        config.search.max_pages = 3;
        let mock = Arc::new(MockTransport::new());
        mock.push(&page_url(&config, 1), page(vec![raw(1, "acme/widgets")]));
        mock.push(&page_url(&config, 2), Reply::rate_limited(1_704_112_245));
        mock.push(&page_url(&config, 3), page(vec![raw(3, "acme/widgets")]));

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert!(outcome.issues.is_empty());
        assert_eq!(
            outcome.error.as_deref(),
            Some("Rate limit exceeded. Resets at 12:30:45 UTC.")
        );
    }

    #[tokio::test]
    async fn test_missing_token_is_reported_without_network() {
        let config = config();
        let mock = Arc::new(MockTransport::new());
        let fetcher = IssueFetcher::with_transport(&config, None, mock.clone());

        let outcome = fetcher.fetch_issues(&query()).await;
        assert!(outcome.issues.is_empty());
        assert_eq!(
            outcome.error.as_deref(),
            Some("GitHub token not configured. Set GITHUB_PAT or GITHUB_TOKEN in your environment.")
        );
        assert!(!outcome.diagnostics.authenticated);
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_optional_token_fetches_unauthenticated() {
        let mut config = config();
        config.github.require_token = false;
        let mock = Arc::new(MockTransport::new());
        mock.push(&page_url(&config, 1), page(vec![raw(1, "acme/widgets")]));
        let fetcher = IssueFetcher::with_transport(&config, Some("  ".to_string()), mock.clone());

        let outcome = fetcher.fetch_issues(&query()).await;
        assert!(outcome.error.is_none());
        assert!(!outcome.diagnostics.authenticated);
        let headers = mock.last_headers(&page_url(&config, 1)).unwrap();
        assert!(!headers.iter().any(|(k, _)| k == "Authorization"));
    }

    #[tokio::test]
    async fn test_request_headers() {
        let config = config();
        let mock = Arc::new(MockTransport::new());
        mock.push(&page_url(&config, 1), page(vec![]));
        fetcher(&config, &mock).fetch_issues(&query()).await;

        let headers = mock.last_headers(&page_url(&config, 1)).unwrap();
        let has = |name: &str, value: &str| headers.iter().any(|(k, v)| k == name && v == value);
        assert!(has("Authorization", "Bearer ghp_testtoken"));
        assert!(has("Accept", ACCEPT));
        assert!(has("X-GitHub-Api-Version", API_VERSION));
    }

    #[tokio::test]
    async fn test_pull_requests_are_excluded() {
        let config = config();
        let mock = Arc::new(MockTransport::new());
        let mut pr = raw(2, "acme/widgets");
        pr["pull_request"] = json!({"url": "https://api.github.com/repos/acme/widgets/pulls/2"});
        mock.push(
            &page_url(&config, 1),
            page(vec![raw(1, "acme/widgets"), pr, raw(3, "acme/widgets")]),
        );

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        let ids: Vec<u64> = outcome.issues.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(outcome.diagnostics.pull_requests_skipped, 1);
    }

    #[tokio::test]
    async fn test_closed_and_duplicate_items_are_dropped() {
        let mut config = config();
        config.search.per_page = 2;
        config.search.max_pages = 2;
        let mock = Arc::new(MockTransport::new());
        let mut closed = raw(2, "acme/widgets");
        closed["state"] = json!("closed");
        mock.push(&page_url(&config, 1), page(vec![raw(1, "acme/widgets"), closed]));
        mock.push(&page_url(&config, 2), page(vec![raw(1, "acme/widgets"), raw(4, "acme/widgets")]));

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        let ids: Vec<u64> = outcome.issues.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(outcome.diagnostics.closed_skipped, 1);
        assert_eq!(outcome.diagnostics.duplicates_skipped, 1);
    }

    #[tokio::test]
    async fn test_body_handling() {
        let config = config();
        let mock = Arc::new(MockTransport::new());
        let mut empty = raw(1, "acme/widgets");
        empty["body"] = Value::Null;
        let mut long = raw(2, "acme/widgets");
        long["body"] = json!("x".repeat(500));
        mock.push(&page_url(&config, 1), page(vec![empty, long]));

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert_eq!(outcome.issues[0].body, "");
        assert_eq!(outcome.issues[0].description, NO_DESCRIPTION);
        assert_eq!(outcome.issues[1].description, format!("{}...", "x".repeat(150)));
    }

    #[tokio::test]
    async fn test_failed_page_is_dropped() {
        let mut config = config();
        config.http.max_retries = 0;
        config.search.per_page = 1;
        config.search.max_pages = 3;
        let mock = Arc::new(MockTransport::new());
        mock.push(&page_url(&config, 1), page(vec![raw(1, "acme/widgets")]));
        mock.push(&page_url(&config, 2), Reply::status(500));
        mock.push(&page_url(&config, 3), page(vec![raw(3, "acme/widgets")]));

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert!(outcome.error.is_none());
        let ids: Vec<u64> = outcome.issues.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(outcome.diagnostics.succeeded_pages, vec![1, 3]);
        assert_eq!(outcome.diagnostics.failed_pages, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_pages_timing_out_reports_timeout() {
        let mut config = config();
        config.http.max_retries = 1;
        config.search.max_pages = 2;
        let mock = Arc::new(MockTransport::new());
        mock.set_fallback(&page_url(&config, 1), Reply::hang());
        mock.set_fallback(&page_url(&config, 2), Reply::hang());

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.error.as_deref(), Some("Request timed out. Please try again."));
        assert_eq!(outcome.diagnostics.failed_pages, vec![1, 2]);
        assert_eq!(mock.calls(&page_url(&config, 1)), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_timeout_bounds_the_whole_fetch() {
        let mut config = config();
        config.search.cycle_timeout_secs = 5;
        let mock = Arc::new(MockTransport::new());
        mock.set_fallback(&page_url(&config, 1), Reply::hang());

        let started = Instant::now();
        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert_eq!(outcome.error.as_deref(), Some("Request timed out. Please try again."));
        assert_eq!(outcome.diagnostics.failed_pages, vec![1]);
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_deadline_keeps_pages_already_fetched() {
        let mut config = config();
        config.search.per_page = 1;
        config.search.max_pages = 8;
        let mock = Arc::new(MockTransport::new());
        for p in 1..=3u32 {
            mock.push(&page_url(&config, p), page(vec![raw(p as u64, "a/b")]));
        }
        for p in 4..=8u32 {
            mock.set_fallback(&page_url(&config, p), Reply::hang());
        }

        let started = Instant::now();
        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert!(outcome.error.is_none(), "{:?}", outcome.error);
        let ids: Vec<u64> = outcome.issues.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(outcome.diagnostics.succeeded_pages, vec![1, 2, 3]);
        assert_eq!(outcome.diagnostics.failed_pages, vec![4, 5, 6, 7, 8]);
        assert!(started.elapsed() <= Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_deadline_skips_repository_lookups() {
        let mut config = config();
        config.search.cycle_timeout_secs = 5;
        let mock = Arc::new(MockTransport::new());
        mock.push(&page_url(&config, 1), page(vec![raw(1, "acme/widgets"), raw(2, "acme/gears")]));
        mock.push(&repo_url("acme/widgets"), repo("Rust"));
        mock.set_fallback(&repo_url("acme/gears"), Reply::hang());

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.issues[0].repository_language, "Rust");
        assert_eq!(outcome.issues[1].repository_language, UNKNOWN_LANGUAGE);
        assert_eq!(outcome.diagnostics.repositories_failed, 1);
    }

    #[tokio::test]
    async fn test_short_page_stops_pagination() {
        let mut config = config();
        config.search.per_page = 2;
        config.search.max_pages = 6;
        config.search.batch_size = 1;
        let mock = Arc::new(MockTransport::new());
        mock.push(&page_url(&config, 1), page(vec![raw(1, "a/b"), raw(2, "a/b")]));
        mock.push(&page_url(&config, 2), page(vec![raw(3, "a/b")]));

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert_eq!(outcome.issues.len(), 3);
        assert_eq!(mock.calls(&page_url(&config, 3)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_are_fetched_in_bounded_batches() {
        let mut config = config();
        config.search.per_page = 1;
        config.search.max_pages = 6;
        config.search.batch_size = 3;
        config.search.batch_delay_ms = 50;
        let mock = Arc::new(MockTransport::new());
        for p in 1..=6u32 {
            mock.push(
                &page_url(&config, p),
                Reply::delayed(Duration::from_millis(10), page(vec![raw(p as u64, "a/b")])),
            );
        }

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert_eq!(outcome.issues.len(), 6);
        assert_eq!(mock.max_in_flight(), 3);

        let batch_one = mock.call_times(&page_url(&config, 3))[0];
        let batch_two = mock.call_times(&page_url(&config, 4))[0];
        assert!(batch_two - batch_one >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_repository_failure_defaults_to_unknown() {
        let config = config();
        let mock = Arc::new(MockTransport::new());
        mock.push(&page_url(&config, 1), page(vec![raw(1, "acme/widgets"), raw(2, "acme/gears")]));
        mock.push(&repo_url("acme/widgets"), Reply::status(404));
        mock.push(&repo_url("acme/gears"), repo("Go"));

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.issues[0].repository_language, UNKNOWN_LANGUAGE);
        assert_eq!(outcome.issues[1].repository_language, "Go");
        assert_eq!(outcome.diagnostics.repositories_failed, 1);
    }

    #[tokio::test]
    async fn test_repository_lookups_are_capped() {
        let mut config = config();
        config.search.max_repositories = 2;
        let mock = Arc::new(MockTransport::new());
        mock.push(
            &page_url(&config, 1),
            page(vec![raw(1, "o/one"), raw(2, "o/two"), raw(3, "o/one"), raw(4, "o/three")]),
        );
        mock.push(&repo_url("o/one"), repo("Rust"));
        mock.push(&repo_url("o/two"), repo("C"));

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert_eq!(outcome.diagnostics.repositories_requested, 2);
        assert_eq!(mock.calls(&repo_url("o/three")), 0);
        let languages: Vec<&str> = outcome
            .issues
            .iter()
            .map(|i| i.repository_language.as_str())
            .collect();
        assert_eq!(languages, vec!["Rust", "C", "Rust", UNKNOWN_LANGUAGE]);
    }

    #[tokio::test]
    async fn test_issue_list_is_capped() {
        let mut config = config();
        config.search.max_issues = 2;
        let mock = Arc::new(MockTransport::new());
        mock.push(
            &page_url(&config, 1),
            page(vec![raw(1, "a/b"), raw(2, "a/b"), raw(3, "a/b")]),
        );

        let outcome = fetcher(&config, &mock).fetch_issues(&query()).await;
        assert_eq!(outcome.issues.len(), 2);
        assert_eq!(outcome.diagnostics.truncated, 1);
    }

    #[tokio::test]
    async fn test_first_language_mode_sends_one_language() {
        let mut config = config();
        config.search.language_mode = LanguageMode::First;
        let mock = Arc::new(MockTransport::new());
        let q = IssueQuery::new(
            vec!["rust".to_string(), "go".to_string()],
            vec![],
            SortBy::Comments,
        );
        let url = search_url(
            API,
            &IssueQuery::new(vec!["rust".to_string()], vec![], SortBy::Comments),
            100,
            1,
        )
        .unwrap();
        mock.push(&url, page(vec![raw(1, "a/b")]));

        let outcome = fetcher(&config, &mock).fetch_issues(&q).await;
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(mock.calls(&url), 1);
    }
}
