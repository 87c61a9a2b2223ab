//! Filter command

use clap::Args;
use quarry_search::{Filter, FilterTree};
use serde::Serialize;

use crate::output::{format_json, OutputFormat};
use crate::{AppContext, Cli};

#[derive(Args)]
pub struct FilterArgs {
    /// Filter in RFC 4515 string form, e.g. "(&(cn=Bob)(sn=J*))"
    pub expr: String,

    /// Also print the parsed tree
    #[arg(long)]
    pub tree: bool,
}

#[derive(Serialize)]
struct ParsedFilter {
    filter: String,
    depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    tree: Option<FilterTree>,
}

pub fn run(args: &FilterArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let filter = Filter::parse(ctx.schema.as_ref(), &args.expr)?;
    tracing::info!("Parsed filter of type {} and depth {}", filter.filter_type(), filter.depth());

    match OutputFormat::from(cli.format.as_str()) {
        OutputFormat::Json => {
            let parsed = ParsedFilter {
                filter: filter.to_string(),
                depth: filter.depth(),
                tree: args.tree.then(|| filter.tree()),
            };
            println!("{}", format_json(&parsed)?);
        }
        OutputFormat::Table => {
            println!("{}", filter);
            if args.tree {
                let mut out = String::new();
                render_tree(&filter.tree(), 0, &mut out);
                print!("{}", out);
            }
        }
    }
    Ok(())
}

/// One line per node, children indented beneath their parent
fn render_tree(node: &FilterTree, indent: usize, out: &mut String) {
    out.push_str(&"  ".repeat(indent));
    out.push_str(node.filter_type.as_str());
    if let Some(attribute) = &node.attribute {
        out.push(' ');
        out.push_str(attribute);
    }
    if let Some(rule) = &node.matching_rule {
        out.push_str(&format!(" rule={}", rule));
    }
    if node.dn_attributes {
        out.push_str(" dn");
    }
    if let Some(value) = &node.value {
        out.push_str(&format!(" \"{}\"", value));
    }
    out.push('\n');
    for child in &node.children {
        render_tree(child, indent + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::SchemaRegistry;

    #[test]
    fn test_render_tree() {
        let schema = SchemaRegistry::core().unwrap();
        let filter = Filter::parse(&schema, "(&(cn=Bob)(!(sn=*)))").unwrap();

        let mut out = String::new();
        render_tree(&filter.tree(), 0, &mut out);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], filter.tree().filter_type.as_str());
        assert!(lines[1].starts_with("  "));
        assert!(out.contains("\"Bob\""));
    }
}
