//! Quarry CLI - Command line interface for the directory server core

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{completions, decode, encode, filter, modify, search, validate};
use config::Config;
use quarry_core::SchemaRegistry;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(author, version, about = "Directory entry, schema and filter tools")]
pub struct Cli {
    /// Config file (default: ~/.quarry/config.toml)
    #[arg(long, env = "QUARRY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format: table, json
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the config file path
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config::config_file_path)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a search filter and print its canonical form
    Filter(filter::FilterArgs),
    /// Search entries in a JSON file
    Search(search::SearchArgs),
    /// Encode entries into the binary storage format
    Encode(encode::EncodeArgs),
    /// Decode entries written by `encode`
    Decode(decode::DecodeArgs),
    /// Check entries against the schema
    Validate(validate::ValidateArgs),
    /// Apply modifications to an entry
    Modify(modify::ModifyArgs),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Schema and settings shared by the commands
pub struct AppContext {
    pub schema: Arc<SchemaRegistry>,
    pub config: Config,
}

impl AppContext {
    pub fn new(cli: &Cli) -> anyhow::Result<Self> {
        let config_path = cli.config_path();
        tracing::debug!("Using config at: {:?}", config_path);

        Ok(Self {
            schema: Arc::new(SchemaRegistry::core()?),
            config: Config::load(&config_path)?,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting quarry CLI");

    match &cli.command {
        Commands::Config(args) => commands::config::run(args, &cli)?,
        Commands::Completions(args) => completions::run(args)?,
        command => {
            let ctx = AppContext::new(&cli)?;
            match command {
                Commands::Filter(args) => filter::run(args, &cli, &ctx)?,
                Commands::Search(args) => search::run(args, &cli, &ctx).await?,
                Commands::Encode(args) => encode::run(args, &cli, &ctx).await?,
                Commands::Decode(args) => decode::run(args, &cli, &ctx)?,
                Commands::Validate(args) => validate::run(args, &cli, &ctx).await?,
                Commands::Modify(args) => modify::run(args, &cli, &ctx)?,
                Commands::Config(_) | Commands::Completions(_) => {}
            }
        }
    }

    Ok(())
}
