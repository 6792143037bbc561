//! Skyreel CLI - sends commands to a running Skyreel server.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{clip, config, health, resource};
use output::OutputFormat;

/// Skyreel - recurring clip scheduler CLI
#[derive(Parser)]
#[command(
    name = "skyreel",
    version,
    about = "Skyreel - recurring clip scheduler and watchdog",
    long_about = "Schedule clip jobs, request clips on demand and check the health of a Skyreel server.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format (defaults to the saved setting, then table)
    #[arg(short, long, global = true)]
    output: Option<OutputFormat>,

    /// Server URL
    #[arg(long, global = true, env = "SKYREEL_API_URL")]
    api_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resource scheduling
    #[command(subcommand)]
    Resource(resource::ResourceCommands),

    /// On-demand clips
    #[command(subcommand)]
    Clip(clip::ClipCommands),

    /// Check server health
    Health(health::HealthArgs),

    /// CLI settings
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let format = cli
        .output
        .or_else(config::saved_output_format)
        .unwrap_or_default();

    let result = match cli.command {
        Commands::Config(cmd) => config::execute(cmd, format).await,
        command => {
            let api_url = cli
                .api_url
                .or_else(|| config::load_config().ok().and_then(|c| c.api_url))
                .unwrap_or_else(|| "http://localhost:8080".to_string());
            match client::ApiClient::new(&api_url) {
                Ok(client) => run(command, &client, format).await,
                Err(e) => Err(e),
            }
        }
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands, client: &client::ApiClient, format: OutputFormat) -> Result<()> {
    match command {
        Commands::Resource(cmd) => resource::execute(cmd, client, format).await,
        Commands::Clip(cmd) => clip::execute(cmd, client, format).await,
        Commands::Health(args) => health::execute(args, client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    }
}
