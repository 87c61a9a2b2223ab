//! CLI command implementations

pub mod completions;
pub mod config;
pub mod decode;
pub mod encode;
pub mod filter;
pub mod modify;
pub mod search;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use quarry_core::{Entry, EntryRecord, Schema};
use serde::Deserialize;

/// A file holds either one record or an array of them
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    Many(Vec<EntryRecord>),
    One(EntryRecord),
}

/// Read JSON entry records from `path`
pub fn read_records(path: &Path) -> anyhow::Result<Vec<EntryRecord>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let records = match serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))? {
        RecordFile::Many(records) => records,
        RecordFile::One(record) => vec![record],
    };
    tracing::debug!("Read {} records from {:?}", records.len(), path);
    Ok(records)
}

/// Read JSON entry records from `path` and resolve them against `schema`
pub fn read_entries(path: &Path, schema: &dyn Schema) -> anyhow::Result<Vec<Entry>> {
    read_records(path)?
        .into_iter()
        .map(|record| {
            let dn = record.dn.clone();
            record.into_entry(schema).with_context(|| format!("entry {}", dn))
        })
        .collect()
}

/// Records for display, in input order
pub fn to_records(entries: &[Entry]) -> Vec<EntryRecord> {
    entries.iter().map(EntryRecord::from_entry).collect()
}
