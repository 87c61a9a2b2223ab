//! Config command for managing CLI configuration

use std::path::Path;

use clap::{Args, Subcommand};

use crate::config::Config;
use crate::output::{format_json, OutputFormat};
use crate::Cli;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print one setting
    Get {
        /// Dotted key, e.g. codec.deflate
        key: String,
    },
    /// Change one setting and save the file
    Set {
        /// Dotted key, e.g. codec.deflate
        key: String,
        /// New value
        value: String,
    },
    /// Print every setting
    List,
    /// Print the config file location
    Path,
    /// Write a config file with default settings
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(args: &ConfigArgs, cli: &Cli) -> anyhow::Result<()> {
    let path = cli.config_path();
    match &args.command {
        ConfigCommands::Get { key } => run_get(&path, key),
        ConfigCommands::Set { key, value } => run_set(&path, key, value),
        ConfigCommands::List => run_list(&path, cli.format.as_str().into()),
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Init { force } => run_init(&path, *force),
    }
}

fn run_get(path: &Path, key: &str) -> anyhow::Result<()> {
    let config = Config::load(path)?;
    let Some(value) = config.get(key) else {
        eprintln!("Unknown config key: {}", key);
        eprintln!("Available keys: {}", Config::keys().join(", "));
        std::process::exit(1);
    };
    println!("{}", value);
    Ok(())
}

fn run_set(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let mut config = Config::load(path)?;
    config.set(key, value)?;
    config.save(path)?;
    println!("Set {} = {}", key, config.get(key).unwrap_or_default());
    Ok(())
}

fn run_list(path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let config = Config::load(path)?;
    if format == OutputFormat::Json {
        println!("{}", format_json(&config)?);
        return Ok(());
    }

    println!("Config file: {}", path.display());
    println!();
    for key in Config::keys() {
        println!("{} = {}", key, config.get(key).unwrap_or_default());
    }
    Ok(())
}

fn run_init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("Config file already exists at {}. Use --force to overwrite.", path.display());
    }
    Config::default().save(path)?;
    println!("Created config file at {}", path.display());
    Ok(())
}
