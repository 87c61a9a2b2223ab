//! Validate command

use std::collections::HashSet;
use std::path::PathBuf;

use clap::Args;
use quarry_core::{AcceptRejectWarn, Dn, Entry, SchemaValidator};
use quarry_storage::{MemoryStorage, StorageBackend};
use serde::Serialize;

use crate::commands::read_entries;
use crate::output::{format_json, OutputFormat};
use crate::{AppContext, Cli};

#[derive(Args)]
pub struct ValidateArgs {
    /// JSON file of entry records
    pub file: PathBuf,

    /// Override validation.structural_class: reject, warn, accept
    #[arg(long)]
    pub structural_class: Option<AcceptRejectWarn>,

    /// Skip name form checks
    #[arg(long)]
    pub no_name_forms: bool,

    /// Skip structure rule checks
    #[arg(long)]
    pub no_structure_rules: bool,

    /// Naming context root (default: every entry whose parent is not in the file)
    #[arg(long)]
    pub suffix: Vec<String>,
}

#[derive(Serialize)]
struct Verdict {
    dn: String,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

pub async fn run(args: &ValidateArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let entries = read_entries(&args.file, ctx.schema.as_ref())?;

    // Parents for structure rules come from the same file
    let storage = MemoryStorage::new(ctx.schema.clone());
    storage.put_entries(&entries).await?;

    let mut policy = ctx.config.validation_policy();
    if let Some(structural_class) = args.structural_class {
        policy = policy.with_structural_class(structural_class);
    }
    if args.no_name_forms {
        policy = policy.with_name_forms(false);
    }
    if args.no_structure_rules {
        policy = policy.with_structure_rules(false);
    }
    let suffixes = if args.suffix.is_empty() {
        naming_contexts(&entries)
    } else {
        args.suffix.iter().map(|s| Dn::parse(s)).collect::<Result<Vec<_>, _>>()?
    };
    tracing::debug!("Validating {} entries below {} suffixes", entries.len(), suffixes.len());

    let validator = SchemaValidator::new(ctx.schema.as_ref())
        .with_policy(policy)
        .with_lookup(&storage)
        .with_suffixes(suffixes);

    let verdicts: Vec<Verdict> = entries
        .iter()
        .map(|entry| match validator.validate(entry, None) {
            Ok(()) => Verdict {
                dn: entry.dn().to_string(),
                valid: true,
                result_code: None,
                reason: None,
            },
            Err(e) => Verdict {
                dn: entry.dn().to_string(),
                valid: false,
                result_code: Some(e.result_code().code()),
                reason: Some(e.to_string()),
            },
        })
        .collect();

    match OutputFormat::from(cli.format.as_str()) {
        OutputFormat::Json => println!("{}", format_json(&verdicts)?),
        OutputFormat::Table if !cli.quiet => {
            for verdict in &verdicts {
                match &verdict.reason {
                    None => println!("ok      {}", verdict.dn),
                    Some(reason) => println!("invalid {}: {}", verdict.dn, reason),
                }
            }
        }
        OutputFormat::Table => {}
    }

    let failed = verdicts.iter().filter(|v| !v.valid).count();
    if failed > 0 {
        anyhow::bail!("{} of {} entries failed schema validation", failed, verdicts.len());
    }
    Ok(())
}

/// Entries whose parent the file does not hold
fn naming_contexts(entries: &[Entry]) -> Vec<Dn> {
    let present: HashSet<String> = entries.iter().map(|e| e.dn().normalized()).collect();
    entries
        .iter()
        .filter(|e| {
            e.dn()
                .parent()
                .map_or(true, |parent| !present.contains(&parent.normalized()))
        })
        .map(|e| e.dn().clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::EntryRecord;
    use quarry_core::SchemaRegistry;

    #[test]
    fn test_naming_contexts() {
        let schema = SchemaRegistry::core().unwrap();
        let entries: Vec<Entry> = [
            "dc=example,dc=com",
            "ou=people,dc=example,dc=com",
            "ou=groups,o=other",
        ]
        .into_iter()
        .map(|dn| EntryRecord::new(dn).into_entry(&schema).unwrap())
        .collect();

        let suffixes: Vec<String> = naming_contexts(&entries).iter().map(Dn::to_string).collect();
        assert_eq!(suffixes, vec!["dc=example,dc=com", "ou=groups,o=other"]);
    }
}
