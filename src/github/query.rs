//! Search-query and URL construction for the GitHub REST API.

use reqwest::Url;

use crate::errors::FetchError;
use crate::filters::{IssueQuery, SORT_ORDER};

/// Every search is restricted to open issues.
pub const BASE_QUALIFIERS: &str = "is:issue is:open";

/// Known GitHub token prefixes.
/// See: https://github.blog/2021-04-05-behind-githubs-new-authentication-token-formats/
const GITHUB_TOKEN_PREFIXES: &[&str] = &[
    "ghp_",        // Personal access tokens (classic)
    "github_pat_", // Fine-grained personal access tokens
    "gho_",        // OAuth access tokens
    "ghu_",        // GitHub App user-to-server tokens
    "ghs_",        // GitHub App server-to-server tokens
    "ghr_",        // GitHub App refresh tokens
];

/// Format check only; it does not verify the token is active.
pub fn is_valid_github_token(token: &str) -> bool {
    !token.is_empty()
        && GITHUB_TOKEN_PREFIXES
            .iter()
            .any(|prefix| token.starts_with(prefix))
}

/// Build the `q` parameter: base qualifiers, then one `language:` clause per
/// language and one quoted `label:` clause per label, space-joined (ANDed).
///
/// Callers pass an already-effective query; see [`IssueQuery::effective`].
pub fn build_search_query(query: &IssueQuery) -> String {
    let mut q = String::from(BASE_QUALIFIERS);
    for language in &query.languages {
        q.push_str(" language:");
        q.push_str(&language.replace(' ', "-"));
    }
    for label in &query.labels {
        q.push_str(&format!(" label:\"{}\"", label.replace('"', "")));
    }
    q
}

/// URL for one page of `GET /search/issues`.
pub fn search_url(
    api_base: &str,
    query: &IssueQuery,
    per_page: u32,
    page: u32,
) -> Result<String, FetchError> {
    let endpoint = format!("{}/search/issues", api_base.trim_end_matches('/'));
    let url = Url::parse_with_params(
        &endpoint,
        &[
            ("q", build_search_query(query)),
            ("sort", query.sort_by.api_sort().to_string()),
            ("order", SORT_ORDER.to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ],
    )
    .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
    Ok(url.into())
}

/// URL for `GET /repos/{owner}/{name}`.
pub fn repository_api_url(api_base: &str, full_name: &str) -> String {
    format!("{}/repos/{}", api_base.trim_end_matches('/'), full_name)
}

/// `owner/name` from the last two path segments of a repository URL.
///
/// Works for both `https://api.github.com/repos/owner/name` and
/// `https://github.com/owner/name`.
pub fn repository_name(repository_url: &str) -> String {
    let trimmed = repository_url.trim_end_matches('/');
    let mut segments = trimmed.rsplit('/');
    match (segments.next(), segments.next()) {
        (Some(name), Some(owner)) if !name.is_empty() && !owner.is_empty() => {
            format!("{}/{}", owner, name)
        }
        _ => trimmed.to_string(),
    }
}
