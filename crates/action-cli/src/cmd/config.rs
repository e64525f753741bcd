use crate::output::{print_json, print_table};
use action_core::config::{DispatcherConfig, WarnLevel};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;

use super::load_config;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective config (file + environment overrides)
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Write a default config file
    Init {
        /// API root to write instead of the default
        #[arg(long)]
        api_root: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(config_path: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(config_path, json),
        ConfigSubcommand::Validate => validate(config_path, json),
        ConfigSubcommand::Init { api_root } => init(config_path, api_root),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    // Never echo the secret itself.
    if config.auth_token.is_some() {
        config.auth_token = Some("***".to_string());
    }

    if json {
        return print_json(&config);
    }

    let rows = vec![
        vec!["file".to_string(), config_path.display().to_string()],
        vec!["api_root".to_string(), config.api_root.clone()],
        vec![
            "auth_token".to_string(),
            config.auth_token.clone().unwrap_or_else(|| "(none)".into()),
        ],
        vec!["user_agent".to_string(), config.user_agent.clone()],
        vec![
            "relay_timeout_secs".to_string(),
            config
                .relay_timeout_secs
                .map(|s| s.to_string())
                .unwrap_or_else(|| "(none)".into()),
        ],
        vec!["track_locally".to_string(), config.track_locally.to_string()],
    ];
    print_table(&["KEY", "VALUE"], &rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let warnings = config.validate();
    let errors = warnings
        .iter()
        .filter(|w| w.level == WarnLevel::Error)
        .count();

    if json {
        print_json(&warnings)?;
    } else if warnings.is_empty() {
        println!("Config OK: {}", config_path.display());
    } else {
        for w in &warnings {
            let tag = match w.level {
                WarnLevel::Error => "error",
                WarnLevel::Warning => "warning",
            };
            println!("{tag}: {}", w.message);
        }
    }

    if errors > 0 {
        anyhow::bail!("config has {errors} error(s)");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

fn init(config_path: &Path, api_root: Option<String>) -> anyhow::Result<()> {
    if config_path.exists() {
        anyhow::bail!("{} already exists", config_path.display());
    }
    let mut config = DispatcherConfig::default();
    if let Some(root) = api_root {
        config.api_root = root;
    }
    config
        .save(config_path)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    println!("Wrote {}", config_path.display());
    Ok(())
}
