mod client;
mod commands;
mod output;

use clap::{Parser, Subcommand};
use client::SkymmichClient;
use output::{OutputConfig, OutputFormat};
use skymmich::config;
use std::process;

/// Default server URL when neither the flag nor the config file sets one
const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

/// CLI for the Skymmich astrophotography gallery
#[derive(Parser, Debug)]
#[clap(name = "skymmich-cli", about = "CLI for the Skymmich astrophotography gallery")]
struct Cli {
    /// Server URL to connect to
    #[clap(long, env = "SKYMMICH_URL", global = true)]
    server_url: Option<String>,

    /// Output format
    #[clap(long, value_enum, default_value_t = OutputFormat::Human, global = true)]
    format: OutputFormat,

    /// Quiet mode: minimal output (just IDs or counts)
    #[clap(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Browse and edit images
    #[command(subcommand)]
    Image(commands::image::ImageCommands),
    /// Manage tags
    #[command(subcommand)]
    Tag(commands::tag::TagCommands),
    /// Manage the equipment catalog
    #[command(subcommand)]
    Equipment(commands::equipment::EquipmentCommands),
    /// Inspect and retry plate-solving jobs
    #[command(subcommand)]
    Job(commands::job::JobCommands),
    /// Sync the gallery with Immich now
    Sync,
    /// Show gallery statistics
    Stats,
    /// List plate-solved images with their sky coordinates
    SkyMap,
    /// Show or change admin settings
    #[command(subcommand)]
    Settings(commands::settings::SettingsCommands),
}

/// Resolves the server URL from CLI args, config file, or defaults
///
/// Precedence: CLI flag / env var > config file > default
fn resolve_server_url(cli_url: Option<String>) -> String {
    if let Some(url) = cli_url {
        return url;
    }

    if let Some(dir) = config::get_config_dir_path() {
        let config_path = dir.join("config.toml");
        if let Ok(update) = config::config_from_file(Some(config_path)) {
            if let Some(url) = update.server_url {
                return url;
            }
        }
    }

    DEFAULT_SERVER_URL.to_string()
}

/// Formats an error for human-readable stderr output
fn format_error(err: &dyn std::error::Error) -> String {
    let err_string = err.to_string();

    if err_string.contains("error sending request")
        || err_string.contains("onnection refused")
        || err_string.contains("tcp connect error")
    {
        return format!("Could not connect to server. Is skymmich running?\n  {}", err_string);
    }

    // Server errors already read "Server error (STATUS): message"
    err_string
}

async fn run(client: &SkymmichClient, command: Commands, config: &OutputConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Image(cmd) => commands::image::execute(client, cmd, config).await,
        Commands::Tag(cmd) => commands::tag::execute(client, cmd, config).await,
        Commands::Equipment(cmd) => commands::equipment::execute(client, cmd, config).await,
        Commands::Job(cmd) => commands::job::execute(client, cmd, config).await,
        Commands::Settings(cmd) => commands::settings::execute(client, cmd, config).await,
        Commands::Sync => {
            let report = client.sync().await?;
            output::print_sync_report(&report, config);
            Ok(())
        }
        Commands::Stats => {
            let stats = client.stats().await?;
            output::print_stats(&stats, config);
            Ok(())
        }
        Commands::SkyMap => {
            let points = client.sky_map().await?;
            output::print_sky_map(&points, config);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let server_url = resolve_server_url(cli.server_url);
    let client = SkymmichClient::new(server_url);
    let output_config = OutputConfig {
        format: cli.format,
        quiet: cli.quiet,
    };

    if let Err(e) = run(&client, cli.command, &output_config).await {
        eprintln!("Error: {}", format_error(e.as_ref()));
        process::exit(1);
    }
}
