//! Wire payloads of the GitHub Search and Repository endpoints.
//!
//! Only the fields the pipeline consumes are modelled; everything else in
//! the response is ignored by serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response of `GET /search/issues`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<RawIssue>,
}

/// A search hit (subset of fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawIssue {
    pub id: u64,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<RawLabel>,
    /// `null` for deleted ("ghost") accounts.
    #[serde(default)]
    pub user: Option<RawUser>,
    pub repository_url: String,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub comments: Option<u64>,
    pub state: String,
    /// Pull requests also come through the search endpoint; filter them out.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl RawIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLabel {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUser {
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub html_url: String,
}

/// Response of `GET /repos/{owner}/{repo}`. Only `language` is consumed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoDetails {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}
