//! Configuration view and validation commands: `bitbug config`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;

use bitbug::config::{BitbugConfig, CONFIG_FILE_NAME};
use bitbug::ui::icons::{CHECK, WARNING};

use super::super::ConfigCommands;

pub fn cmd_config(config_path: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => show(config_path),
        Some(ConfigCommands::Validate) => validate(config_path),
        Some(ConfigCommands::Init { force }) => init(config_path, force),
    }
}

fn show(config_path: Option<&Path>) -> Result<()> {
    let (config, loaded_from) = BitbugConfig::discover(config_path)?;

    println!();
    println!("{}", style("bitbug configuration").bold());
    println!("====================");
    println!();
    match &loaded_from {
        Some(path) => println!("Config file: {}", path.display()),
        None => {
            println!("No {} found; using defaults.", CONFIG_FILE_NAME);
            println!("Run 'bitbug config init' to create one.");
        }
    }
    println!();

    let rendered = toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
    println!("{}", rendered.trim_end());
    println!();

    println!("Effective values (with env overrides):");
    println!("  api_base = \"{}\"", config.api_base());
    let token = match config.github_token() {
        Some(token) => format!("set ({})", mask(&token)),
        None => "not set".to_string(),
    };
    println!("  token = {}", token);
    println!();
    Ok(())
}

fn validate(config_path: Option<&Path>) -> Result<()> {
    println!();
    println!("Validating configuration...");
    println!();

    let (config, loaded_from) = BitbugConfig::discover(config_path)?;
    if loaded_from.is_none() {
        println!("No {} found. Checking defaults.", CONFIG_FILE_NAME);
    }

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("{}Configuration is valid.", CHECK);
    } else {
        println!("Configuration warnings:");
        for warning in warnings {
            println!("  {}{}", WARNING, warning);
        }
    }
    println!();
    Ok(())
}

fn init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

    if path.exists() && !force {
        println!("{} already exists at {}", CONFIG_FILE_NAME, path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    BitbugConfig::default().save(&path)?;

    println!("Created {} at {}", CONFIG_FILE_NAME, path.display());
    println!();
    println!("You can now customize:");
    println!("  - [defaults] languages, labels, sort, page_size");
    println!("  - [search] pagination limits and language_mode");
    println!("  - [github] token_vars and require_token");
    println!();
    Ok(())
}

/// First four characters, then asterisks.
fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{}****", visible)
}
