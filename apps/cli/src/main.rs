//! Braid CLI - chat with several model providers at once
//!
//! Fans a single prompt out to every enabled platform and streams the
//! replies back as they arrive.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use config::BraidConfig;

/// Braid CLI - one prompt, every model
#[derive(Parser, Debug)]
#[command(
    name = "braid",
    author,
    version,
    about = "Braid - chat with several model providers at once",
    long_about = "Braid fans a single prompt out to every enabled platform (OpenAI, Anthropic,\nGoogle, and OpenAI-compatible endpoints) and streams the replies back as they\narrive, with web search and MCP tools available to the models."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Config file path (overrides ~/.braid/config.toml and ./.braidrc)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chat with the enabled platforms
    ///
    /// Sends the prompt to every enabled platform concurrently and renders
    /// each reply as it streams in. With no prompt, opens an interactive
    /// session that keeps the conversation going.
    Chat {
        /// Prompt to send (omit for an interactive session)
        prompt: Vec<String>,

        /// Attach an image file to the first prompt
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// List configured platforms
    ///
    /// Shows every platform table found in the config, whether enabled or
    /// not, with its model, endpoint, and token status.
    Platforms,

    /// List the tools models can call
    ///
    /// Shows the built-in tools and any MCP server entries from the config.
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => BraidConfig::load_from_file(path)?,
        None => BraidConfig::discover_and_load(),
    };

    match args.command {
        Command::Chat { prompt, image } => commands::chat::execute(config, prompt, image).await,
        Command::Platforms => commands::platforms::execute(&config),
        Command::Tools => commands::tools::execute(&config).await,
    }
}
