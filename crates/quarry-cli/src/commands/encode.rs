//! Encode command
//!
//! An encoded file is a sequence of records, each a length-prefixed DN
//! followed by the length-prefixed envelope of the encoded entry.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use quarry_core::{Dn, Entry, Schema};
use quarry_storage::ber::{append_length_prefixed, ByteReader};
use quarry_storage::{EncodeConfig, EntryCodec, EntryEnvelope, MemoryStorage, StorageBackend};
use serde::Serialize;

use crate::commands::read_entries;
use crate::output::{format_json, OutputFormat};
use crate::{AppContext, Cli};

#[derive(Args)]
pub struct EncodeArgs {
    /// JSON file of entry records
    pub file: PathBuf,

    /// Output file (print encoded sizes if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Deflate encoded entries regardless of codec.deflate
    #[arg(long)]
    pub deflate: bool,
}

#[derive(Serialize)]
struct EncodedSize {
    dn: String,
    bytes: usize,
}

pub async fn run(args: &EncodeArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let schema = ctx.schema.as_ref();
    let entries = read_entries(&args.file, schema)?;
    let config = ctx.config.encode_config();
    let envelope = if args.deflate { EntryEnvelope::new(true) } else { ctx.config.envelope() };

    match &args.output {
        Some(path) => {
            let archive = write_archive(schema, &entries, &config, &envelope)?;
            std::fs::write(path, &archive).with_context(|| format!("writing {}", path.display()))?;
            tracing::info!("Encoded {} entries to {:?}", entries.len(), path);
            if !cli.quiet {
                println!("Encoded {} entries ({} bytes) to {}", entries.len(), archive.len(), path.display());
            }
        }
        None => {
            let storage = MemoryStorage::new(ctx.schema.clone())
                .with_encode_config(config)
                .with_envelope(envelope);
            storage.put_entries(&entries).await?;

            let mut sizes = Vec::with_capacity(entries.len());
            for entry in &entries {
                let bytes = storage.stored_size(entry.dn())?.unwrap_or_default();
                sizes.push(EncodedSize {
                    dn: entry.dn().to_string(),
                    bytes,
                });
            }
            print_sizes(&sizes, cli.format.as_str().into())?;
        }
    }
    Ok(())
}

fn print_sizes(sizes: &[EncodedSize], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", format_json(&sizes)?);
        return Ok(());
    }
    println!("{:>8}  DN", "BYTES");
    for size in sizes {
        println!("{:>8}  {}", size.bytes, size.dn);
    }
    println!("{:>8}  total", sizes.iter().map(|s| s.bytes).sum::<usize>());
    Ok(())
}

/// Encode `entries` into the record file layout
pub fn write_archive(
    schema: &dyn Schema,
    entries: &[Entry],
    config: &EncodeConfig,
    envelope: &EntryEnvelope,
) -> anyhow::Result<Vec<u8>> {
    if config.uses_dictionary() {
        anyhow::bail!(
            "compressed schema tokens only live for one process and cannot be written to a file; \
             set codec.compress_attribute_descriptions and codec.compress_object_classes to false"
        );
    }

    let codec = EntryCodec::new(schema);
    let mut out = Vec::new();
    for entry in entries {
        let encoded = codec
            .encode(entry, config)
            .with_context(|| format!("encoding {}", entry.dn()))?;
        append_length_prefixed(&mut out, entry.dn().to_string().as_bytes())?;
        append_length_prefixed(&mut out, &envelope.wrap(&encoded)?)?;
    }
    Ok(out)
}

/// Decode a record file written by [`write_archive`]
pub fn read_archive(schema: &dyn Schema, bytes: &[u8]) -> anyhow::Result<Vec<Entry>> {
    let codec = EntryCodec::new(schema);
    let mut reader = ByteReader::new(bytes);
    let mut entries = Vec::new();
    while !reader.is_empty() {
        let dn_text = std::str::from_utf8(reader.get_length_prefixed()?).context("record DN is not UTF-8")?;
        let dn = Dn::parse(dn_text)?;
        let payload = EntryEnvelope::open(reader.get_length_prefixed()?)?;
        let mut entry = codec.decode(&payload).with_context(|| format!("decoding {}", dn))?;
        if entry.dn().is_root() {
            entry.set_dn(dn);
        }
        entries.push(entry);
    }
    tracing::debug!("Decoded {} entries", entries.len());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{EntryRecord, SchemaRegistry};

    fn entries(schema: &SchemaRegistry) -> Vec<Entry> {
        ["ana", "bob"]
            .iter()
            .map(|uid| {
                EntryRecord::new(format!("uid={},dc=example,dc=com", uid))
                    .with_attribute("objectClass", ["top", "person"])
                    .with_attribute("cn", [*uid])
                    .with_attribute("sn", ["Example"])
                    .into_entry(schema)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_archive_keeps_excluded_dns() {
        let schema = SchemaRegistry::core().unwrap();
        let entries = entries(&schema);
        let config = EncodeConfig::default().with_exclude_dn(true);

        let bytes = write_archive(&schema, &entries, &config, &EntryEnvelope::new(true)).unwrap();
        let decoded = read_archive(&schema, &bytes).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn test_archive_rejects_dictionary() {
        let schema = SchemaRegistry::core().unwrap();
        let config = EncodeConfig::default().with_compressed_object_classes(true);
        assert!(write_archive(&schema, &entries(&schema), &config, &EntryEnvelope::default()).is_err());
    }

    #[test]
    fn test_truncated_archive() {
        let schema = SchemaRegistry::core().unwrap();
        let bytes = write_archive(&schema, &entries(&schema), &EncodeConfig::default(), &EntryEnvelope::default())
            .unwrap();
        assert!(read_archive(&schema, &bytes[..bytes.len() - 3]).is_err());
    }
}
