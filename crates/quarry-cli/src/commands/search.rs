//! Search command

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use quarry_core::{ConstantValueProvider, Dn, EntryDnProvider, Schema, VirtualAttributeRule};
use quarry_search::{Filter, FilterSearchEngine, SearchEngine, SearchRequest, SearchScope};

use crate::commands::{read_entries, to_records};
use crate::output::{format_entries, OutputFormat};
use crate::{AppContext, Cli};

#[derive(Args)]
pub struct SearchArgs {
    /// JSON file of entry records
    pub file: PathBuf,

    /// Filter in RFC 4515 string form
    pub filter: String,

    /// Search base DN (default: the root, covering every entry)
    #[arg(short, long, default_value = "")]
    pub base: String,

    /// Search scope: base, one, sub
    #[arg(short, long, default_value = "sub")]
    pub scope: SearchScope,

    /// Maximum number of entries (0 = no limit)
    #[arg(short, long, default_value = "0")]
    pub limit: usize,

    /// Attributes to return (default: all user attributes)
    #[arg(short, long, value_delimiter = ',')]
    pub attributes: Vec<String>,

    /// Return attribute names without values
    #[arg(long)]
    pub types_only: bool,

    /// Add the virtual entryDN attribute to every entry
    #[arg(long)]
    pub entry_dn: bool,

    /// Add a constant virtual attribute, as name=value
    #[arg(long = "virtual", value_name = "NAME=VALUE")]
    pub virtual_attributes: Vec<String>,

    /// Print only the number of matching entries
    #[arg(long)]
    pub count: bool,
}

pub async fn run(args: &SearchArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let schema = ctx.schema.as_ref();
    let entries = read_entries(&args.file, schema)?;
    let filter = Filter::parse(schema, &args.filter)?;
    let base = Dn::parse(&args.base)?;

    let mut engine = FilterSearchEngine::new(ctx.schema.clone())
        .with_default_conflict_behavior(ctx.config.conflict_behavior()?);
    if args.entry_dn {
        let entry_dn = schema
            .attribute_type("entryDN")
            .ok_or_else(|| anyhow::anyhow!("entryDN is not defined in the schema"))?;
        engine = engine.with_virtual_rule(VirtualAttributeRule::new(entry_dn, Arc::new(EntryDnProvider)));
    }
    for assignment in &args.virtual_attributes {
        let (name, value) = split_assignment(assignment)?;
        let rule = VirtualAttributeRule::new(
            schema.attribute_type_or_default(name),
            Arc::new(ConstantValueProvider::new([value])),
        );
        engine = engine.with_virtual_rule(rule);
    }

    let request = SearchRequest::new(base, filter)
        .with_scope(args.scope)
        .with_size_limit(args.limit)
        .with_attributes(args.attributes.iter().cloned())
        .with_types_only(args.types_only);

    tracing::info!(
        "Searching {} entries under '{}' scope={} filter={}",
        entries.len(),
        request.base,
        request.scope,
        request.filter
    );

    if args.count {
        println!("{}", engine.count(&request, &entries).await?);
        return Ok(());
    }

    let results = engine.search(&request, &entries).await?;
    let format = OutputFormat::from(cli.format.as_str());
    if results.is_empty() && format == OutputFormat::Table {
        if !cli.quiet {
            eprintln!("No entries found");
        }
        return Ok(());
    }
    print!("{}", format_entries(&to_records(&results), format)?);
    Ok(())
}

/// Split `name=value` at the first `=`
pub fn split_assignment(assignment: &str) -> anyhow::Result<(&str, &str)> {
    match assignment.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => anyhow::bail!("expected NAME=VALUE, got '{}'", assignment),
    }
}
