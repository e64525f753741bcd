mod cmd;
mod config_path;
mod output;

use action_core::KnownAction;
use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use cmd::ContextArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "jah-actions",
    about = "Record analytics actions against the patient action endpoint, strictly in order",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest jah-actions.yaml, else ./jah-actions.yaml)
    #[arg(long, global = true, env = "JAH_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one or more actions, in argument order, and wait for delivery
    #[command(after_help = known_actions_help())]
    Send {
        /// Action names
        #[arg(required = true)]
        names: Vec<String>,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// Send every action in a JSONL file, in file order
    Replay {
        /// One JSON object per line: {"action", "screen"?, "extra"?, "section_uid"?, "client_timestamp"?}
        file: PathBuf,
    },

    /// Print the request body that would be sent, without sending it
    #[command(after_help = known_actions_help())]
    Payload {
        name: String,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// Show, validate, or create the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Any name is accepted; the built-in ones are listed for discoverability.
fn known_actions_help() -> String {
    let names: Vec<&str> = KnownAction::BUILTIN.iter().map(KnownAction::as_str).collect();
    format!("Known actions: {}", names.join(", "))
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Send { .. } | Commands::Replay { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = config_path::resolve_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Send { names, context } => {
            cmd::send::run(&config_path, &names, context, cli.json)
        }
        Commands::Replay { file } => cmd::replay::run(&config_path, &file, cli.json),
        Commands::Payload { name, context } => cmd::payload::run(&name, context),
        Commands::Config { subcommand } => cmd::config::run(&config_path, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
