//! Decode command

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crate::commands::encode::read_archive;
use crate::commands::to_records;
use crate::output::format_entries;
use crate::{AppContext, Cli};

#[derive(Args)]
pub struct DecodeArgs {
    /// File written by `quarry encode -o`
    pub input: PathBuf,
}

pub fn run(args: &DecodeArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.input).with_context(|| format!("reading {}", args.input.display()))?;
    let entries = read_archive(ctx.schema.as_ref(), &bytes)?;
    tracing::info!("Decoded {} entries from {:?}", entries.len(), args.input);
    print!("{}", format_entries(&to_records(&entries), cli.format.as_str().into())?);
    Ok(())
}
