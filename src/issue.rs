//! The UI-facing issue entity and its construction from a search hit.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::github::models::{RawIssue, RawLabel, RawUser};
use crate::github::query::repository_name;

/// Description used when an issue has no body.
pub const NO_DESCRIPTION: &str = "No description available.";
/// Language shown when repository metadata is missing.
pub const UNKNOWN_LANGUAGE: &str = "Unknown";
/// Default description budget, in characters.
pub const DEFAULT_DESCRIPTION_CHARS: usize = 150;

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub avatar_url: String,
    pub html_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Some(IssueState::Open),
            "closed" => Some(IssueState::Closed),
            _ => None,
        }
    }
}

/// Coarse classification derived from label names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Bug,
    Feature,
    Other,
}

impl IssueType {
    /// First match wins: any label containing `bug`, then any containing
    /// `feature` or `enhancement`.
    pub fn classify<'a>(label_names: impl IntoIterator<Item = &'a str>) -> Self {
        let lowered: Vec<String> = label_names.into_iter().map(str::to_lowercase).collect();
        if lowered.iter().any(|n| n.contains("bug")) {
            IssueType::Bug
        } else if lowered
            .iter()
            .any(|n| n.contains("feature") || n.contains("enhancement"))
        {
            IssueType::Feature
        } else {
            IssueType::Other
        }
    }

    /// Name and color of the label injected for this type, if any.
    fn synthetic_label(self) -> Option<(&'static str, &'static str)> {
        match self {
            IssueType::Bug => Some(("bug", "d73a4a")),
            IssueType::Feature => Some(("feature", "a2eeef")),
            IssueType::Other => None,
        }
    }
}

/// Knobs for [`Issue::from_raw`].
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub description_chars: usize,
    pub inject_type_label: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            description_chars: DEFAULT_DESCRIPTION_CHARS,
            inject_type_label: false,
        }
    }
}

/// An open issue as presented to the caller. Never a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub description: String,
    pub labels: Vec<Label>,
    pub user: User,
    pub repository_name: String,
    pub repository_url: String,
    pub repository_language: String,
    pub issue_link: String,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
    pub comments: u64,
    pub state: IssueState,
    pub issue_type: IssueType,
}

impl Issue {
    /// Build an issue from a search hit and the repository's primary language.
    pub fn from_raw(raw: RawIssue, language: Option<&str>, opts: &TransformOptions) -> Self {
        let body = raw.body.unwrap_or_default();
        let description = describe(&body, opts.description_chars);

        let mut seen = HashSet::new();
        let mut labels: Vec<Label> = raw
            .labels
            .into_iter()
            .filter(|l| seen.insert(l.name.clone()))
            .map(Label::from)
            .collect();

        let issue_type = IssueType::classify(labels.iter().map(|l| l.name.as_str()));
        if opts.inject_type_label
            && let Some((name, color)) = issue_type.synthetic_label()
            && !labels.iter().any(|l| l.name == name)
        {
            labels.push(Label {
                name: name.to_string(),
                color: Some(color.to_string()),
                description: None,
            });
        }

        let user = raw.user.map(User::from).unwrap_or_else(User::ghost);
        let repository_language = language
            .filter(|l| !l.is_empty())
            .unwrap_or(UNKNOWN_LANGUAGE)
            .to_string();

        Self {
            id: raw.id,
            number: raw.number,
            title: raw.title,
            body,
            description,
            labels,
            user,
            repository_name: repository_name(&raw.repository_url),
            repository_url: raw.repository_url,
            repository_language,
            issue_link: raw.html_url,
            created_date: raw.created_at,
            updated_date: raw.updated_at,
            comments: raw.comments.unwrap_or(0),
            state: IssueState::parse(&raw.state).unwrap_or(IssueState::Open),
            issue_type,
        }
    }

    /// Case-insensitive match against the fields a user would search by.
    /// `needle` must already be lowercased.
    pub fn matches_term(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.repository_name.to_lowercase().contains(needle)
            || self.repository_language.to_lowercase().contains(needle)
            || self.user.login.to_lowercase().contains(needle)
            || self
                .labels
                .iter()
                .any(|l| l.name.to_lowercase().contains(needle))
    }
}

impl From<RawLabel> for Label {
    fn from(raw: RawLabel) -> Self {
        Self {
            name: raw.name,
            color: raw.color,
            description: raw.description,
        }
    }
}

impl From<RawUser> for User {
    fn from(raw: RawUser) -> Self {
        Self {
            login: raw.login,
            avatar_url: raw.avatar_url,
            html_url: raw.html_url,
        }
    }
}

impl User {
    fn ghost() -> Self {
        Self {
            login: "ghost".to_string(),
            avatar_url: String::new(),
            html_url: "https://github.com/ghost".to_string(),
        }
    }
}

/// Truncate `body` to `limit` characters with a trailing ellipsis, or the
/// placeholder when the body is empty.
pub fn describe(body: &str, limit: usize) -> String {
    if body.is_empty() {
        return NO_DESCRIPTION.to_string();
    }
    match body.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{}", &body[..cut], ELLIPSIS),
        None => body.to_string(),
    }
}
