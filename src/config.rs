//! Configuration for bitbug, read from `bitbug.toml`.
//!
//! Layering is file → environment → CLI. The file is looked up at an
//! explicit `--config` path, then `./bitbug.toml`, then
//! `$XDG_CONFIG_HOME/bitbug/bitbug.toml`; if none exists the defaults apply.
//!
//! # Configuration File Format
//!
//! ```toml
//! [github]
//! api_base = "https://api.github.com"
//! token_vars = ["GITHUB_PAT", "GITHUB_TOKEN"]
//! require_token = true
//!
//! [http]
//! timeout_ms = 8000
//! max_retries = 3
//! base_delay_ms = 500
//! max_delay_ms = 2000
//!
//! [search]
//! per_page = 100
//! max_pages = 8
//! batch_size = 3
//! language_mode = "all"
//!
//! [cache]
//! capacity = 50
//! result_ttl_secs = 480
//! allow_stale = false
//!
//! [defaults]
//! languages = ["javascript"]
//! labels = ["good first issue"]
//! sort = "newest"
//! page_size = 24
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::FetchError;
use crate::filters::{LanguageMode, SortBy};
use crate::github::http::RetryPolicy;
use crate::github::query::is_valid_github_token;

pub const CONFIG_FILE_NAME: &str = "bitbug.toml";
/// Overrides `github.api_base` when set.
pub const API_BASE_ENV: &str = "BITBUG_API_BASE";

/// The Search API never serves results past this many items.
const SEARCH_RESULT_WINDOW: u64 = 1000;

/// GitHub API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubSection {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variables consulted for the bearer token, in order.
    #[serde(default = "default_token_vars")]
    pub token_vars: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Refuse to fetch without a token instead of running unauthenticated.
    #[serde(default = "default_true")]
    pub require_token: bool,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_token_vars() -> Vec<String> {
    vec!["GITHUB_PAT".to_string(), "GITHUB_TOKEN".to_string()]
}

fn default_user_agent() -> String {
    format!("bitbug/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_vars: default_token_vars(),
            user_agent: default_user_agent(),
            require_token: true,
        }
    }
}

/// Per-request timeout and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_timeout_ms() -> u64 {
    8000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    2000
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl HttpSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            attempt_timeout: Duration::from_millis(self.timeout_ms),
            retryable: FetchError::is_transient,
        }
    }
}

/// Pagination, enrichment and transform limits for one fetch cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Pages requested concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches, for the secondary rate limit.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Distinct repositories enriched per cycle.
    #[serde(default = "default_max_repositories")]
    pub max_repositories: usize,
    #[serde(default = "default_repository_concurrency")]
    pub repository_concurrency: usize,
    #[serde(default = "default_max_issues")]
    pub max_issues: usize,
    #[serde(default = "default_description_chars")]
    pub description_chars: usize,
    #[serde(default)]
    pub language_mode: LanguageMode,
    #[serde(default)]
    pub inject_type_label: bool,
    /// Upper bound on a whole fetch cycle, retries included.
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,
}

fn default_per_page() -> u32 {
    100
}

fn default_max_pages() -> u32 {
    8
}

fn default_batch_size() -> usize {
    3
}

fn default_batch_delay_ms() -> u64 {
    50
}

fn default_max_repositories() -> usize {
    30
}

fn default_repository_concurrency() -> usize {
    10
}

fn default_max_issues() -> usize {
    800
}

fn default_description_chars() -> usize {
    crate::issue::DEFAULT_DESCRIPTION_CHARS
}

fn default_cycle_timeout_secs() -> u64 {
    60
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            max_pages: default_max_pages(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            max_repositories: default_max_repositories(),
            repository_concurrency: default_repository_concurrency(),
            max_issues: default_max_issues(),
            description_chars: default_description_chars(),
            language_mode: LanguageMode::default(),
            inject_type_label: false,
            cycle_timeout_secs: default_cycle_timeout_secs(),
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// TTL for fetched issue lists.
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,
    #[serde(default)]
    pub allow_stale: bool,
}

fn default_capacity() -> usize {
    crate::cache::DEFAULT_CAPACITY
}

fn default_result_ttl_secs() -> u64 {
    8 * 60
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            result_ttl_secs: default_result_ttl_secs(),
            allow_stale: false,
        }
    }
}

/// Initial filter state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub sort: SortBy,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_languages() -> Vec<String> {
    vec!["javascript".to_string()]
}

fn default_labels() -> Vec<String> {
    vec!["good first issue".to_string()]
}

fn default_page_size() -> usize {
    crate::store::DEFAULT_PAGE_SIZE
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            labels: default_labels(),
            sort: SortBy::default(),
            page_size: default_page_size(),
        }
    }
}

/// Root of `bitbug.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BitbugConfig {
    #[serde(default)]
    pub github: GithubSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
}

impl BitbugConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse bitbug.toml")
    }

    /// Resolve and load the configuration file.
    ///
    /// Returns the path that was loaded, or `None` when defaults are in use.
    /// An explicit path that does not exist is an error.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        for candidate in Self::search_paths() {
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "loading configuration");
                return Ok((Self::load(&candidate)?, Some(candidate)));
            }
        }
        Ok((Self::default(), None))
    }

    /// Candidate locations, most specific first.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("bitbug").join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize bitbug.toml")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// API base URL (env → file).
    pub fn api_base(&self) -> String {
        self.api_base_from(|name| std::env::var(name).ok())
    }

    pub fn api_base_from(&self, lookup: impl Fn(&str) -> Option<String>) -> String {
        lookup(API_BASE_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.github.api_base.clone())
    }

    /// Bearer token from the first non-empty variable in `token_vars`.
    pub fn github_token(&self) -> Option<String> {
        self.github_token_from(|name| std::env::var(name).ok())
    }

    pub fn github_token_from(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.github
            .token_vars
            .iter()
            .filter_map(|name| lookup(name.as_str()))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.result_ttl_secs)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        self.validate_with_token(self.github_token().as_deref())
    }

    pub fn validate_with_token(&self, token: Option<&str>) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.defaults.page_size == 0 {
            warnings.push("defaults.page_size is 0; no issues would ever be shown".to_string());
        }
        if self.cache.capacity == 0 {
            warnings.push("cache.capacity is 0; it will be treated as 1".to_string());
        }
        if self.search.batch_size == 0 {
            warnings.push("search.batch_size is 0; it will be treated as 1".to_string());
        }
        if self.search.repository_concurrency == 0 {
            warnings.push("search.repository_concurrency is 0; it will be treated as 1".to_string());
        }
        if self.http.max_delay_ms < self.http.base_delay_ms {
            warnings.push(format!(
                "http.max_delay_ms ({}) is below http.base_delay_ms ({}); every retry waits {}ms",
                self.http.max_delay_ms, self.http.base_delay_ms, self.http.max_delay_ms
            ));
        }
        if self.search.per_page > 100 {
            warnings.push(format!(
                "search.per_page ({}) exceeds the API maximum of 100",
                self.search.per_page
            ));
        }
        let window = u64::from(self.search.max_pages) * u64::from(self.search.per_page);
        if window > SEARCH_RESULT_WINDOW {
            warnings.push(format!(
                "search.max_pages * search.per_page ({}) exceeds the {} results the Search API serves",
                window, SEARCH_RESULT_WINDOW
            ));
        }
        if self.cache.result_ttl_secs == 0 {
            warnings.push("cache.result_ttl_secs is 0; fetched results will never be reused".to_string());
        }

        match token {
            Some(token) if !is_valid_github_token(token) => warnings.push(
                "GitHub token does not look like a GitHub token (expected ghp_, github_pat_, gho_, ghu_, ghs_ or ghr_ prefix)"
                    .to_string(),
            ),
            None if self.github.require_token => warnings.push(format!(
                "No GitHub token found in {}; searches will fail until one is set",
                self.github.token_vars.join(" or ")
            )),
            None => warnings.push(
                "No GitHub token found; searches will run unauthenticated with lower rate limits"
                    .to_string(),
            ),
            _ => {}
        }

        warnings
    }
}
