use anyhow::Result;
use bitbug::filters::{LocalOrder, SortBy};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "bitbug")]
#[command(version, about = "Find open, actively discussed GitHub issues to work on")]
pub struct Cli {
    /// Increase log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to bitbug.toml. Defaults to ./bitbug.toml, then the user config dir.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search open issues by language and label
    Search(SearchArgs),
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct SearchArgs {
    /// Repository language (repeatable). Replaces the configured defaults.
    #[arg(short, long = "language", value_name = "LANG")]
    pub languages: Vec<String>,

    /// Issue label (repeatable). Replaces the configured defaults.
    #[arg(short = 'L', long = "label", value_name = "LABEL")]
    pub labels: Vec<String>,

    /// Search every language instead of the configured defaults
    #[arg(long, conflicts_with = "languages")]
    pub any_language: bool,

    /// Do not restrict by label
    #[arg(long, conflicts_with = "labels")]
    pub any_label: bool,

    /// Sort order: newest, comments or activity
    #[arg(short, long)]
    pub sort: Option<SortBy>,

    /// Only show issues whose text matches (applied locally)
    #[arg(short, long)]
    pub term: Option<String>,

    /// Only show issues from this owner/name repository (repeatable, applied locally)
    #[arg(long = "repo", value_name = "OWNER/NAME")]
    pub repositories: Vec<String>,

    /// Only show issues created on or after this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub since: Option<NaiveDate>,

    /// Only show issues created on or before this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub until: Option<NaiveDate>,

    /// Reorder fetched issues: created, updated, comments or title, with optional :asc or :desc
    #[arg(long, value_name = "FIELD[:DIR]")]
    pub order: Option<LocalOrder>,

    /// Number of pages to show
    #[arg(long, default_value_t = 1)]
    pub pages: usize,

    /// Issues per page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Show every fetched issue
    #[arg(long, conflicts_with = "pages")]
    pub all: bool,

    /// Ignore cached results
    #[arg(long)]
    pub refresh: bool,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Include fetch diagnostics in the output
    #[arg(long)]
    pub diagnostics: bool,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default bitbug.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    bitbug::logging::init(cli.verbose);

    match cli.command {
        Commands::Search(args) => cmd::cmd_search(cli.config.as_deref(), args).await?,
        Commands::Config { command } => cmd::cmd_config(cli.config.as_deref(), command)?,
    }

    Ok(())
}
