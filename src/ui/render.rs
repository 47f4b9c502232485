//! Text rendering of issues and fetch results.
//!
//! Every function returns a `String` so output can be tested without a
//! terminal; colors come from `console::style` and vanish when stdout is
//! not a TTY.

use chrono::{DateTime, Utc};
use console::style;
use terminal_size::{Width, terminal_size};

use super::icons::{AUTHOR, BUG, CACHED, CLOCK, COMMENTS, FEATURE, LANGUAGE};
use crate::github::FetchDiagnostics;
use crate::issue::{Issue, IssueType};

const DEFAULT_WIDTH: usize = 80;
const MAX_WIDTH: usize = 110;
const INDENT: &str = "    ";

/// Usable output width, clamped to keep cards readable on wide terminals.
pub fn terminal_width() -> usize {
    terminal_size()
        .map(|(Width(w), _)| w as usize)
        .unwrap_or(DEFAULT_WIDTH)
        .clamp(40, MAX_WIDTH)
}

/// Coarse "time ago" label: `just now`, `5m ago`, `3h ago`, `2d ago`,
/// `4mo ago`, `1y ago`. Timestamps in the future read as `just now`.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h ago", hours);
    }
    let days = hours / 24;
    if days < 30 {
        return format!("{}d ago", days);
    }
    if days < 365 {
        return format!("{}mo ago", days / 30);
    }
    format!("{}y ago", days / 365)
}

/// One issue as a multi-line card.
pub fn render_issue(issue: &Issue, now: DateTime<Utc>, width: usize) -> String {
    let marker = match issue.issue_type {
        IssueType::Bug => BUG.to_string(),
        IssueType::Feature => FEATURE.to_string(),
        IssueType::Other => String::new(),
    };

    let mut out = format!(
        "{}{} {} {}\n",
        marker,
        style(&issue.repository_name).cyan(),
        style(format!("#{}", issue.number)).dim(),
        style(&issue.title).bold()
    );

    let options = textwrap::Options::new(width.max(INDENT.len() + 10))
        .initial_indent(INDENT)
        .subsequent_indent(INDENT);
    for line in textwrap::wrap(&issue.description, options) {
        out.push_str(&line);
        out.push('\n');
    }

    out.push_str(&format!(
        "{}{}{}  {}{}  {}{}  {}{}\n",
        INDENT,
        LANGUAGE,
        issue.repository_language,
        COMMENTS,
        issue.comments,
        AUTHOR,
        issue.user.login,
        CLOCK,
        relative_time(issue.updated_date, now)
    ));

    if !issue.labels.is_empty() {
        let labels: Vec<String> = issue
            .labels
            .iter()
            .map(|l| format!("{}", style(format!("[{}]", l.name)).yellow()))
            .collect();
        out.push_str(&format!("{}{}\n", INDENT, labels.join(" ")));
    }

    out.push_str(&format!("{}{}\n", INDENT, style(&issue.issue_link).dim().underlined()));
    out
}

/// Footer line: how much is shown, and whether it came from the cache.
pub fn render_summary(
    shown: usize,
    matching: usize,
    total: usize,
    cached: bool,
    fetched_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    let mut line = format!("Showing {} of {} issues", shown, matching);
    if matching != total {
        line.push_str(&format!(" ({} fetched)", total));
    }
    if let Some(at) = fetched_at {
        line.push_str(&format!(", fetched {}", relative_time(at, now)));
    }
    if cached {
        line.push_str(&format!(" {}", CACHED));
    }
    line
}

pub fn render_diagnostics(d: &FetchDiagnostics) -> String {
    let pages = |pages: &[u32]| {
        if pages.is_empty() {
            "-".to_string()
        } else {
            pages
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",")
        }
    };

    [
        format!("{}", style("Diagnostics").bold()),
        format!("  authenticated          {}", d.authenticated),
        format!("  pages ok / failed      {} / {}", pages(&d.succeeded_pages), pages(&d.failed_pages)),
        format!("  raw items              {}", d.raw_items),
        format!("  pull requests skipped  {}", d.pull_requests_skipped),
        format!("  closed skipped         {}", d.closed_skipped),
        format!("  duplicates skipped     {}", d.duplicates_skipped),
        format!(
            "  repositories           {} requested, {} enriched, {} failed",
            d.repositories_requested, d.repositories_enriched, d.repositories_failed
        ),
        format!("  truncated              {}", d.truncated),
        format!("  elapsed                {}ms", d.elapsed_ms),
    ]
    .join("\n")
}
