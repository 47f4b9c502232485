//! Filter vocabulary shared by the pipeline and the state layer.
//!
//! [`IssueQuery`] is the filter object handed to
//! [`IssueFetcher::fetch_issues`](crate::github::IssueFetcher::fetch_issues);
//! its [`cache_key`](IssueQuery::cache_key) identifies a result set.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::issue::Issue;

/// Sort order for the search results. Always descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Most recently created first.
    #[default]
    Newest,
    /// Most commented first.
    Comments,
    /// Most recently updated first.
    Activity,
}

/// The Search API only ever receives descending order.
pub const SORT_ORDER: &str = "desc";

impl SortBy {
    /// The Search API `sort` parameter for this order.
    pub fn api_sort(self) -> &'static str {
        match self {
            SortBy::Newest => "created",
            SortBy::Comments => "comments",
            SortBy::Activity => "updated",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortBy::Newest => "newest",
            SortBy::Comments => "comments",
            SortBy::Activity => "activity",
        }
    }
}

impl std::fmt::Display for SortBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortBy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "newest" => Ok(SortBy::Newest),
            "comments" => Ok(SortBy::Comments),
            "activity" => Ok(SortBy::Activity),
            _ => anyhow::bail!(
                "Invalid sort '{}'. Valid values: newest, comments, activity",
                s
            ),
        }
    }
}

/// How several selected languages turn into search qualifiers.
///
/// `All` ANDs one `language:` clause per selection, which narrows the
/// results. `First` sends only the first selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageMode {
    #[default]
    All,
    First,
}

impl std::fmt::Display for LanguageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LanguageMode::All => write!(f, "all"),
            LanguageMode::First => write!(f, "first"),
        }
    }
}

/// Filters sent to the pipeline. The client-side search term is not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueQuery {
    pub languages: Vec<String>,
    pub labels: Vec<String>,
    pub sort_by: SortBy,
}

impl IssueQuery {
    pub fn new(languages: Vec<String>, labels: Vec<String>, sort_by: SortBy) -> Self {
        Self {
            languages,
            labels,
            sort_by,
        }
    }

    /// The query actually sent upstream: values trimmed, blanks dropped,
    /// duplicates removed and sorted. Under [`LanguageMode::First`] only the
    /// first selected language survives.
    pub fn effective(&self, mode: LanguageMode) -> IssueQuery {
        let languages = match mode {
            LanguageMode::All => normalize(&self.languages),
            LanguageMode::First => self
                .languages
                .iter()
                .map(|l| l.trim())
                .find(|l| !l.is_empty())
                .map(|l| vec![l.to_string()])
                .unwrap_or_default(),
        };

        IssueQuery {
            languages,
            labels: normalize(&self.labels),
            sort_by: self.sort_by,
        }
    }

    /// Deterministic cache key for this filter set.
    ///
    /// Array values are normalized (sorted, de-duplicated) before joining so
    /// logically identical filters share a key. Each list is JSON-encoded,
    /// which keeps values containing `,` or `:` from colliding.
    pub fn cache_key(&self) -> String {
        let languages = normalize(&self.languages);
        let labels = normalize(&self.labels);
        format!(
            "issues:{}:{}:{}",
            self.sort_by,
            serde_json::Value::from(languages),
            serde_json::Value::from(labels),
        )
    }
}

/// Field the held issues are re-sorted by on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderField {
    Created,
    Updated,
    Comments,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

/// Client-side ordering of the held issues, written `field[:asc|desc]`.
///
/// Unlike [`SortBy`] this never reaches the API; it reorders what was
/// already fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalOrder {
    pub field: OrderField,
    pub direction: Direction,
}

impl LocalOrder {
    pub fn new(field: OrderField, direction: Direction) -> Self {
        Self { field, direction }
    }

    pub fn compare(&self, a: &Issue, b: &Issue) -> Ordering {
        let ordering = match self.field {
            OrderField::Created => a.created_date.cmp(&b.created_date),
            OrderField::Updated => a.updated_date.cmp(&b.updated_date),
            OrderField::Comments => a.comments.cmp(&b.comments),
            OrderField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        };
        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

impl std::fmt::Display for LocalOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let field = match self.field {
            OrderField::Created => "created",
            OrderField::Updated => "updated",
            OrderField::Comments => "comments",
            OrderField::Title => "title",
        };
        let direction = match self.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        write!(f, "{}:{}", field, direction)
    }
}

impl std::str::FromStr for LocalOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let (field, direction) = match lowered.split_once(':') {
            Some((field, direction)) => (field, Some(direction)),
            None => (lowered.as_str(), None),
        };

        let field = match field {
            "created" => OrderField::Created,
            "updated" => OrderField::Updated,
            "comments" => OrderField::Comments,
            "title" => OrderField::Title,
            _ => anyhow::bail!(
                "Invalid order '{}'. Valid fields: created, updated, comments, title",
                s
            ),
        };
        let direction = match direction {
            None | Some("desc") => Direction::Desc,
            Some("asc") => Direction::Asc,
            Some(_) => anyhow::bail!("Invalid order '{}'. Direction must be asc or desc", s),
        };
        Ok(Self { field, direction })
    }
}

/// Inclusive range of creation dates (UTC calendar days). Open ends match everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(since: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        Self { since, until }
    }

    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.since.is_none_or(|since| day >= since) && self.until.is_none_or(|until| day <= until)
    }
}

fn normalize(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn query(languages: &[&str], labels: &[&str], sort_by: SortBy) -> IssueQuery {
        IssueQuery::new(strings(languages), strings(labels), sort_by)
    }

    #[test]
    fn sort_maps_to_api_fields() {
        assert_eq!(SortBy::Newest.api_sort(), "created");
        assert_eq!(SortBy::Comments.api_sort(), "comments");
        assert_eq!(SortBy::Activity.api_sort(), "updated");
        assert_eq!(SORT_ORDER, "desc");
    }

    #[test]
    fn sort_from_str_round_trips_display() {
        for sort in [SortBy::Newest, SortBy::Comments, SortBy::Activity] {
            assert_eq!(sort.to_string().parse::<SortBy>().unwrap(), sort);
        }
        assert_eq!("ACTIVITY".parse::<SortBy>().unwrap(), SortBy::Activity);
        assert!("stars".parse::<SortBy>().is_err());
    }

    #[test]
    fn cache_key_ignores_array_order() {
        let a = query(&["rust", "go"], &["bug", "help wanted"], SortBy::Newest);
        let b = query(&["go", "rust"], &["help wanted", "bug"], SortBy::Newest);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_ignores_duplicates_and_blanks() {
        let a = query(&["rust"], &["bug"], SortBy::Newest);
        let b = query(&["rust", " rust ", ""], &["bug", "bug"], SortBy::Newest);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_distinguishes_sort() {
        let a = query(&["rust"], &[], SortBy::Newest);
        let b = query(&["rust"], &[], SortBy::Comments);
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_distinguishes_languages_from_labels() {
        let a = query(&["bug"], &[], SortBy::Newest);
        let b = query(&[], &["bug"], SortBy::Newest);
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_does_not_collide_on_embedded_separators() {
        let joined = query(&[], &["a,b"], SortBy::Newest);
        let split = query(&[], &["a", "b"], SortBy::Newest);
        assert_ne!(joined.cache_key(), split.cache_key());

        let colon = query(&["x:y"], &[], SortBy::Newest);
        let spread = query(&["x"], &["y"], SortBy::Newest);
        assert_ne!(colon.cache_key(), spread.cache_key());
    }

    #[test]
    fn cache_key_format() {
        let q = query(&["javascript"], &["good first issue"], SortBy::Newest);
        assert_eq!(
            q.cache_key(),
            r#"issues:newest:["javascript"]:["good first issue"]"#
        );
    }

    #[test]
    fn effective_first_mode_keeps_only_first_language() {
        let q = query(&["  ", "rust", "go"], &["bug"], SortBy::Newest);
        let eff = q.effective(LanguageMode::First);
        assert_eq!(eff.languages, strings(&["rust"]));
        assert_eq!(eff.labels, strings(&["bug"]));
    }

    #[test]
    fn effective_first_mode_distinguishes_selection_order() {
        let a = query(&["rust", "go"], &[], SortBy::Newest).effective(LanguageMode::First);
        let b = query(&["go", "rust"], &[], SortBy::Newest).effective(LanguageMode::First);
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn effective_all_mode_sorts_languages() {
        let q = query(&["rust", "go"], &[], SortBy::Activity);
        let eff = q.effective(LanguageMode::All);
        assert_eq!(eff.languages, strings(&["go", "rust"]));
        assert_eq!(eff.sort_by, SortBy::Activity);
    }

    #[test]
    fn local_order_parses_field_and_direction() {
        let order: LocalOrder = "comments".parse().unwrap();
        assert_eq!(order, LocalOrder::new(OrderField::Comments, Direction::Desc));

        let order: LocalOrder = "Title:ASC".parse().unwrap();
        assert_eq!(order, LocalOrder::new(OrderField::Title, Direction::Asc));
        assert_eq!(order.to_string(), "title:asc");

        assert!("stars".parse::<LocalOrder>().is_err());
        assert!("created:sideways".parse::<LocalOrder>().is_err());
    }

    #[test]
    fn date_range_is_inclusive_by_day() {
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d);
        let at = |s: &str| s.parse::<DateTime<Utc>>().unwrap();
        let range = DateRange::new(day(2024, 1, 10), day(2024, 1, 20));

        assert!(range.contains(at("2024-01-10T00:00:00Z")));
        assert!(range.contains(at("2024-01-20T23:59:59Z")));
        assert!(!range.contains(at("2024-01-09T23:59:59Z")));
        assert!(!range.contains(at("2024-01-21T00:00:00Z")));

        let open = DateRange::default();
        assert!(open.is_unbounded());
        assert!(open.contains(at("1999-01-01T00:00:00Z")));
        assert!(DateRange::new(None, day(2024, 1, 1)).contains(at("2020-05-05T00:00:00Z")));
    }

    #[test]
    fn query_serializes_with_camel_case_sort() {
        let q = query(&["rust"], &[], SortBy::Comments);
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["sortBy"], "comments");
        assert_eq!(json["languages"][0], "rust");
    }
}
