//! Issue search: `bitbug search`.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::Utc;
use console::style;
use serde::Serialize;

use bitbug::config::BitbugConfig;
use bitbug::filters::DateRange;
use bitbug::github::{CacheMode, FetchDiagnostics, IssueFetcher};
use bitbug::issue::Issue;
use bitbug::store::{IssueStore, refresh};
use bitbug::ui::{self, FetchSpinner};

use super::super::SearchArgs;

/// JSON shape of `bitbug search --json`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchOutput<'a> {
    issues: Vec<&'a Issue>,
    error: Option<&'a str>,
    cached: bool,
    total: usize,
    has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<&'a FetchDiagnostics>,
}

pub async fn cmd_search(config_path: Option<&Path>, args: SearchArgs) -> Result<()> {
    if let (Some(since), Some(until)) = (args.since, args.until)
        && since > until
    {
        anyhow::bail!("--since {} is after --until {}", since, until);
    }

    let (mut config, loaded_from) = BitbugConfig::discover(config_path)?;
    if let Some(path) = &loaded_from {
        tracing::info!(path = %path.display(), "using configuration file");
    }
    config.github.api_base = config.api_base();
    if let Some(page_size) = args.page_size {
        config.defaults.page_size = page_size;
    }
    for warning in config.validate() {
        tracing::debug!("config: {}", warning);
    }

    let fetcher = IssueFetcher::new(&config, config.github_token())?;
    let store = Mutex::new(IssueStore::from_config(&config));
    apply_filters(&mut store.lock().unwrap_or_else(PoisonError::into_inner), &args);

    let mode = if args.refresh {
        CacheMode::Refresh
    } else {
        CacheMode::Use
    };
    let interactive = !args.json && console::Term::stderr().is_term();
    let spinner = FetchSpinner::start("Fetching issues from GitHub...", interactive);
    refresh(&store, &fetcher, mode).await;
    spinner.clear();

    let mut store = store.into_inner().unwrap_or_else(PoisonError::into_inner);
    if args.all {
        while store.load_more() {
            store.finish_load_more();
        }
    } else {
        for _ in 1..args.pages {
            if !store.load_more() {
                break;
            }
            store.finish_load_more();
        }
    }

    if args.json {
        print_json(&store, args.diagnostics)?;
    } else {
        print_text(&store, args.diagnostics);
    }

    if let Some(error) = store.error() {
        anyhow::bail!("{}", error);
    }
    Ok(())
}

fn apply_filters(store: &mut IssueStore, args: &SearchArgs) {
    if args.any_language {
        store.set_languages(Vec::new());
    } else if !args.languages.is_empty() {
        store.set_languages(args.languages.clone());
    }
    if args.any_label {
        store.set_labels(Vec::new());
    } else if !args.labels.is_empty() {
        store.set_labels(args.labels.clone());
    }
    if let Some(sort) = args.sort {
        store.set_sort_by(sort);
    }
    if let Some(term) = &args.term {
        store.set_search_term(term.clone());
    }
    if !args.repositories.is_empty() {
        store.set_repositories(args.repositories.clone());
    }
    store.set_created_range(DateRange::new(args.since, args.until));
    store.set_order(args.order);
}

fn print_json(store: &IssueStore, with_diagnostics: bool) -> Result<()> {
    let output = SearchOutput {
        issues: store.visible_issues(),
        error: store.error(),
        cached: store.is_cached(),
        total: store.matching_issues().len(),
        has_more: store.has_more(),
        diagnostics: store.diagnostics().filter(|_| with_diagnostics),
    };
    let json = serde_json::to_string_pretty(&output).context("Failed to serialize results")?;
    println!("{}", json);
    Ok(())
}

fn print_text(store: &IssueStore, with_diagnostics: bool) {
    let now = Utc::now();
    let width = ui::terminal_width();
    let visible = store.visible_issues();

    if store.error().is_none() {
        if visible.is_empty() {
            println!("No issues match the current filters.");
        } else {
            for issue in &visible {
                println!("{}", ui::render_issue(issue, now, width));
            }
            println!(
                "{}",
                ui::render_summary(
                    visible.len(),
                    store.matching_issues().len(),
                    store.issues().len(),
                    store.is_cached(),
                    store.last_updated(),
                    now,
                )
            );
            if store.has_more() {
                println!(
                    "{}",
                    style("More issues available: use --pages or --all to show them.").dim()
                );
            }
        }
    }

    if with_diagnostics && let Some(diagnostics) = store.diagnostics() {
        println!();
        println!("{}", ui::render_diagnostics(diagnostics));
    }
}
