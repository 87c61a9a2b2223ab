//! Modify command

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use quarry_core::{
    parse_attribute_description, Attribute, Dn, EntryRecord, Modification, ModificationType, Schema, SchemaValidator,
};

use crate::commands::read_entries;
use crate::output::format_entries;
use crate::{AppContext, Cli};

#[derive(Args)]
pub struct ModifyArgs {
    /// JSON file of entry records
    pub file: PathBuf,

    /// Entry to modify (default: the only entry in the file)
    #[arg(long)]
    pub dn: Option<String>,

    /// Add a value, as name=value
    #[arg(long, value_name = "NAME=VALUE")]
    pub add: Vec<String>,

    /// Delete a value, or the whole attribute when given only a name
    #[arg(long, value_name = "NAME[=VALUE]")]
    pub delete: Vec<String>,

    /// Replace all values; a bare name removes the attribute
    #[arg(long, value_name = "NAME[=VALUE]")]
    pub replace: Vec<String>,

    /// Add an integer to every value, as name=amount
    #[arg(long, value_name = "NAME=AMOUNT")]
    pub increment: Vec<String>,

    /// Ignore adds of existing values and deletes of missing ones
    #[arg(long)]
    pub relax: bool,

    /// Check the modified entry against the schema
    #[arg(long)]
    pub validate: bool,

    /// Write the modified entry as JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &ModifyArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let schema = ctx.schema.as_ref();
    let entries = read_entries(&args.file, schema)?;

    let mut entry = match &args.dn {
        Some(dn) => {
            let dn = Dn::parse(dn)?;
            entries
                .into_iter()
                .find(|e| e.dn() == &dn)
                .ok_or_else(|| anyhow::anyhow!("No entry {} in {}", dn, args.file.display()))?
        }
        None => {
            let count = entries.len();
            let mut entries = entries.into_iter();
            match (entries.next(), count) {
                (Some(entry), 1) => entry,
                _ => anyhow::bail!("{} holds {} entries; choose one with --dn", args.file.display(), count),
            }
        }
    };

    let modifications = build_modifications(schema, args)?;
    if modifications.is_empty() {
        anyhow::bail!("No changes given; use --add, --delete, --replace or --increment");
    }
    for modification in &modifications {
        tracing::info!("Applying {} to {}", modification, entry.dn());
    }
    entry
        .apply_modifications(schema, &modifications, args.relax)
        .with_context(|| format!("modifying {}", entry.dn()))?;

    if args.validate {
        SchemaValidator::new(schema)
            .with_policy(ctx.config.validation_policy())
            .validate(&entry, None)?;
    }

    let record = EntryRecord::from_entry(&entry);
    match &args.output {
        Some(path) => {
            std::fs::write(path, serde_json::to_string_pretty(&record)?)
                .with_context(|| format!("writing {}", path.display()))?;
            if !cli.quiet {
                println!("Wrote {} to {}", record.dn, path.display());
            }
        }
        None => print!("{}", format_entries(&[record], cli.format.as_str().into())?),
    }
    Ok(())
}

/// Changes in the order add, delete, replace, increment; values given for
/// the same attribute description under one flag form a single change
fn build_modifications(schema: &dyn Schema, args: &ModifyArgs) -> anyhow::Result<Vec<Modification>> {
    let groups = [
        (ModificationType::Add, &args.add, true),
        (ModificationType::Delete, &args.delete, false),
        (ModificationType::Replace, &args.replace, false),
        (ModificationType::Increment, &args.increment, true),
    ];

    let mut modifications = Vec::new();
    for (kind, items, needs_value) in groups {
        let mut changes: Vec<(String, Vec<String>)> = Vec::new();
        for item in items.iter() {
            let (description, value) = match item.split_once('=') {
                Some((description, value)) => (description.trim(), Some(value)),
                None if !needs_value => (item.trim(), None),
                None => anyhow::bail!("--{} expects NAME=VALUE, got '{}'", kind, item),
            };
            if description.is_empty() {
                anyhow::bail!("--{} has an empty attribute name in '{}'", kind, item);
            }

            let index = match changes.iter().position(|(d, _)| d.eq_ignore_ascii_case(description)) {
                Some(index) => index,
                None => {
                    changes.push((description.to_string(), Vec::new()));
                    changes.len() - 1
                }
            };
            changes[index].1.extend(value.map(str::to_string));
        }

        for (description, values) in changes {
            let (name, options) = parse_attribute_description(&description);
            let attribute = Attribute::new(schema.attribute_type_or_default(name))
                .with_name(name)
                .with_options(options)
                .with_values(values);
            modifications.push(Modification::new(kind, attribute));
        }
    }
    Ok(modifications)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::SchemaRegistry;

    fn modify_args() -> ModifyArgs {
        ModifyArgs {
            file: PathBuf::from("entry.json"),
            dn: None,
            add: Vec::new(),
            delete: Vec::new(),
            replace: Vec::new(),
            increment: Vec::new(),
            relax: false,
            validate: false,
            output: None,
        }
    }

    #[test]
    fn test_build_modifications_groups_values() {
        let schema = SchemaRegistry::core().unwrap();
        let mut args = modify_args();
        args.add = vec!["mail=a@example.com".into(), "MAIL=b@example.com".into()];
        args.delete = vec!["description".into()];
        args.increment = vec!["uidNumber=5".into()];

        let mods = build_modifications(&schema, &args).unwrap();
        assert_eq!(mods.len(), 3);
        assert_eq!(mods[0].kind(), ModificationType::Add);
        assert_eq!(mods[0].attribute().len(), 2);
        assert_eq!(mods[1].kind(), ModificationType::Delete);
        assert!(mods[1].attribute().is_empty());
        assert_eq!(mods[2].kind(), ModificationType::Increment);
    }

    #[test]
    fn test_build_modifications_requires_values() {
        let schema = SchemaRegistry::core().unwrap();
        let mut args = modify_args();
        args.add = vec!["mail".into()];
        assert!(build_modifications(&schema, &args).is_err());

        let mut args = modify_args();
        args.replace = vec!["=x".into()];
        assert!(build_modifications(&schema, &args).is_err());
    }
}
