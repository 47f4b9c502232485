//! Filter, sort and pagination state over the fetched issue list.
//!
//! [`IssueStore`] is a synchronous state machine. Network work happens in
//! [`refresh`], which takes a [`FetchTicket`] under the lock, fetches without
//! it, then hands the outcome back. A ticket whose generation has been
//! superseded by a later filter change is discarded on completion.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BitbugConfig;
use crate::filters::{DateRange, IssueQuery, LanguageMode, LocalOrder, SortBy};
use crate::github::pipeline::{CacheMode, FetchDiagnostics, FetchOutcome, IssueFetcher};
use crate::issue::Issue;

pub const DEFAULT_PAGE_SIZE: usize = 24;

/// User-selected filters.
///
/// Only `languages`, `labels` and `sort_by` are sent upstream. The rest
/// narrow or reorder the held issues locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub languages: Vec<String>,
    pub labels: Vec<String>,
    pub sort_by: SortBy,
    pub search_term: String,
    /// `owner/name` values; empty keeps every repository.
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub created: DateRange,
    /// `None` keeps the order the API returned.
    #[serde(default)]
    pub order: Option<LocalOrder>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            languages: vec!["javascript".to_string()],
            labels: vec!["good first issue".to_string()],
            sort_by: SortBy::Newest,
            search_term: String::new(),
            repositories: Vec::new(),
            created: DateRange::default(),
            order: None,
        }
    }
}

impl FilterState {
    /// The part of the filters the pipeline sees.
    pub fn query(&self) -> IssueQuery {
        IssueQuery::new(self.languages.clone(), self.labels.clone(), self.sort_by)
    }
}

/// Handle for one in-flight fetch.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    generation: u64,
    pub query: IssueQuery,
}

#[derive(Debug)]
pub struct IssueStore {
    filters: FilterState,
    language_mode: LanguageMode,
    page_size: usize,
    display_count: usize,
    issues: Vec<Issue>,
    error: Option<String>,
    cached: bool,
    last_updated: Option<DateTime<Utc>>,
    diagnostics: Option<FetchDiagnostics>,
    /// Bumped on every change that alters the upstream query.
    generation: u64,
    loading: bool,
    loading_more: bool,
    stale: bool,
}

impl Default for IssueStore {
    fn default() -> Self {
        Self::new(FilterState::default(), DEFAULT_PAGE_SIZE)
    }
}

impl IssueStore {
    pub fn new(filters: FilterState, page_size: usize) -> Self {
        Self {
            filters,
            language_mode: LanguageMode::default(),
            page_size: page_size.max(1),
            display_count: page_size.max(1),
            issues: Vec::new(),
            error: None,
            cached: false,
            last_updated: None,
            diagnostics: None,
            generation: 0,
            loading: false,
            loading_more: false,
            stale: true,
        }
    }

    /// Store seeded from `[defaults]`.
    pub fn from_config(config: &BitbugConfig) -> Self {
        let filters = FilterState {
            languages: config.defaults.languages.clone(),
            labels: config.defaults.labels.clone(),
            sort_by: config.defaults.sort,
            ..FilterState::default()
        };
        Self::new(filters, config.defaults.page_size)
            .with_language_mode(config.search.language_mode)
    }

    /// Must match the fetcher's mode so equivalent selections are recognised.
    pub fn with_language_mode(mut self, mode: LanguageMode) -> Self {
        self.language_mode = mode;
        self
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn display_count(&self) -> usize {
        self.display_count
    }

    /// Every issue held from the last accepted fetch.
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn diagnostics(&self) -> Option<&FetchDiagnostics> {
        self.diagnostics.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_loading_more(&self) -> bool {
        self.loading_more
    }

    /// True when the held issues no longer reflect the current filters.
    pub fn needs_fetch(&self) -> bool {
        self.stale
    }

    // ── Filter setters ───────────────────────────────────────────────

    pub fn set_languages(&mut self, languages: Vec<String>) {
        self.update_query(|filters| filters.languages = languages);
    }

    /// Add `language` if absent, otherwise remove it.
    pub fn toggle_language(&mut self, language: &str) {
        let mut languages = self.filters.languages.clone();
        toggle(&mut languages, language);
        self.set_languages(languages);
    }

    pub fn set_labels(&mut self, labels: Vec<String>) {
        self.update_query(|filters| filters.labels = labels);
    }

    pub fn toggle_label(&mut self, label: &str) {
        let mut labels = self.filters.labels.clone();
        toggle(&mut labels, label);
        self.set_labels(labels);
    }

    pub fn set_sort_by(&mut self, sort_by: SortBy) {
        self.update_query(|filters| filters.sort_by = sort_by);
    }

    /// Narrow the held issues. Resets pagination but does not refetch.
    pub fn set_search_term(&mut self, term: impl Into<String>) {
        let term = term.into();
        if self.filters.search_term != term {
            self.filters.search_term = term;
            self.reset_pagination();
        }
    }

    /// Keep only issues from these repositories. Local; never refetches.
    pub fn set_repositories(&mut self, repositories: Vec<String>) {
        if self.filters.repositories != repositories {
            self.filters.repositories = repositories;
            self.reset_pagination();
        }
    }

    /// Keep only issues created within `range`. Local; never refetches.
    pub fn set_created_range(&mut self, range: DateRange) {
        if self.filters.created != range {
            self.filters.created = range;
            self.reset_pagination();
        }
    }

    /// Reorder the held issues. Local; never refetches.
    pub fn set_order(&mut self, order: Option<LocalOrder>) {
        if self.filters.order != order {
            self.filters.order = order;
            self.reset_pagination();
        }
    }

    /// Apply `change`, then bump the generation only if the query actually
    /// sent upstream differs. Reordering a selection is not a change.
    fn update_query(&mut self, change: impl FnOnce(&mut FilterState)) {
        let before = self.upstream_key();
        change(&mut self.filters);
        if self.upstream_key() != before {
            self.generation += 1;
            self.stale = true;
            self.reset_pagination();
            tracing::debug!(generation = self.generation, "filters changed");
        }
    }

    fn upstream_key(&self) -> String {
        self.filters.query().effective(self.language_mode).cache_key()
    }

    // ── Fetch lifecycle ──────────────────────────────────────────────

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.loading = true;
        self.stale = false;
        FetchTicket {
            generation: self.generation,
            query: self.filters.query(),
        }
    }

    /// Apply a finished fetch. Returns `false` when the ticket was superseded
    /// by a filter change and the outcome was dropped.
    pub fn complete_fetch(&mut self, ticket: FetchTicket, outcome: FetchOutcome) -> bool {
        if ticket.generation != self.generation {
            tracing::debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding superseded fetch"
            );
            return false;
        }

        self.loading = false;
        self.issues = outcome.issues;
        self.error = outcome.error;
        self.cached = outcome.cached;
        self.last_updated = Some(outcome.timestamp);
        self.diagnostics = Some(outcome.diagnostics);
        self.reset_pagination();
        true
    }

    // ── Derived views and pagination ─────────────────────────────────

    /// Held issues that pass the local filters, in display order.
    pub fn matching_issues(&self) -> Vec<&Issue> {
        let filters = &self.filters;
        let needle = filters.search_term.trim().to_lowercase();

        let mut matching: Vec<&Issue> = self
            .issues
            .iter()
            .filter(|issue| needle.is_empty() || issue.matches_term(&needle))
            .filter(|issue| {
                filters.repositories.is_empty()
                    || filters
                        .repositories
                        .iter()
                        .any(|repo| repo.trim().eq_ignore_ascii_case(&issue.repository_name))
            })
            .filter(|issue| filters.created.contains(issue.created_date))
            .collect();

        if let Some(order) = filters.order {
            matching.sort_by(|a, b| order.compare(a, b));
        }
        matching
    }

    /// The slice currently shown.
    pub fn visible_issues(&self) -> Vec<&Issue> {
        let mut matching = self.matching_issues();
        matching.truncate(self.display_count);
        matching
    }

    pub fn has_more(&self) -> bool {
        self.matching_issues().len() > self.display_count
    }

    /// Show one more page of already-fetched issues.
    ///
    /// Ignored while a previous load-more is in flight or when everything is
    /// already shown. Never fetches. Call [`finish_load_more`] when done.
    ///
    /// [`finish_load_more`]: IssueStore::finish_load_more
    pub fn load_more(&mut self) -> bool {
        if self.loading_more {
            return false;
        }
        let available = self.matching_issues().len();
        if available <= self.display_count {
            return false;
        }
        self.loading_more = true;
        self.display_count = (self.display_count + self.page_size).min(available);
        true
    }

    pub fn finish_load_more(&mut self) {
        self.loading_more = false;
    }

    pub fn reset_pagination(&mut self) {
        self.display_count = self.page_size;
        self.loading_more = false;
    }
}

fn toggle(values: &mut Vec<String>, value: &str) {
    if let Some(pos) = values.iter().position(|v| v == value) {
        values.remove(pos);
    } else {
        values.push(value.to_string());
    }
}

fn lock(store: &Mutex<IssueStore>) -> MutexGuard<'_, IssueStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fetch for the store's current filters and apply the result.
///
/// Returns `false` when the result was superseded before it arrived.
pub async fn refresh(store: &Mutex<IssueStore>, fetcher: &IssueFetcher, mode: CacheMode) -> bool {
    let ticket = lock(store).begin_fetch();
    let outcome = fetcher.fetch_issues_with(&ticket.query, mode).await;
    lock(store).complete_fetch(ticket, outcome)
}
