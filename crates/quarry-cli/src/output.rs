//! Output formatting utilities

use quarry_core::EntryRecord;
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Serialize as pretty JSON
pub fn format_json<T: Serialize>(data: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// Render records as `dn:` blocks, one `name: value` line per value
pub fn format_records(records: &[EntryRecord]) -> String {
    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("dn: {}\n", record.dn));
        for (name, values) in &record.attributes {
            if values.is_empty() {
                out.push_str(&format!("{}:\n", name));
            }
            for value in values {
                out.push_str(&format!("{}: {}\n", name, value));
            }
        }
    }
    out
}

/// Records in the requested format, newline terminated
pub fn format_entries(records: &[EntryRecord], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(format_json(&records)? + "\n"),
        OutputFormat::Table => Ok(format_records(records)),
    }
}
