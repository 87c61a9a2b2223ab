//! In-memory storage backend
//!
//! Entries are kept encoded, exactly as a persistent backend would write
//! them, so every read goes through the codec.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use quarry_core::{Dn, Entry, EntryLookup, Schema};
use tracing::{debug, warn};

use crate::codec::{EncodeConfig, EntryCodec};
use crate::compressed::MemoryCompressedSchema;
use crate::envelope::EntryEnvelope;
use crate::error::{StorageError, StorageResult};
use crate::traits::StorageBackend;

/// In-memory storage backend
///
/// Useful for testing and for the CLI.
pub struct MemoryStorage {
    schema: Arc<dyn Schema>,
    compressed: MemoryCompressedSchema,
    config: EncodeConfig,
    envelope: EntryEnvelope,
    entries: RwLock<BTreeMap<String, (Dn, Vec<u8>)>>,
}

impl MemoryStorage {
    pub fn new(schema: Arc<dyn Schema>) -> Self {
        Self {
            schema,
            compressed: MemoryCompressedSchema::new(),
            config: EncodeConfig::default(),
            envelope: EntryEnvelope::default(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_encode_config(mut self, config: EncodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_envelope(mut self, envelope: EntryEnvelope) -> Self {
        self.envelope = envelope;
        self
    }

    fn codec(&self) -> EntryCodec<'_> {
        EntryCodec::new(self.schema.as_ref()).with_compressed_schema(&self.compressed)
    }

    fn encode(&self, entry: &Entry) -> StorageResult<Vec<u8>> {
        let encoded = self.codec().encode(entry, &self.config)?;
        self.envelope.wrap(&encoded)
    }

    fn decode(&self, dn: &Dn, bytes: &[u8]) -> StorageResult<Entry> {
        let encoded = EntryEnvelope::open(bytes)?;
        let mut entry = self.codec().decode(&encoded)?;
        if self.config.exclude_dn {
            entry.set_dn(dn.clone());
        }
        Ok(entry)
    }

    /// Size of the stored form of an entry
    pub fn stored_size(&self, dn: &Dn) -> StorageResult<Option<usize>> {
        let entries = self.entries.read().map_err(StorageError::lock)?;
        Ok(entries.get(&dn.normalized()).map(|(_, bytes)| bytes.len()))
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        Ok(true)
    }

    async fn add_entry(&self, entry: &Entry) -> StorageResult<()> {
        let bytes = self.encode(entry)?;
        let mut entries = self.entries.write().map_err(StorageError::lock)?;
        let key = entry.dn().normalized();
        if entries.contains_key(&key) {
            return Err(StorageError::DuplicateEntry(entry.dn().to_string()));
        }
        debug!("Adding entry {} ({} bytes)", entry.dn(), bytes.len());
        entries.insert(key, (entry.dn().clone(), bytes));
        Ok(())
    }

    async fn put_entry(&self, entry: &Entry) -> StorageResult<()> {
        let bytes = self.encode(entry)?;
        let mut entries = self.entries.write().map_err(StorageError::lock)?;
        entries.insert(entry.dn().normalized(), (entry.dn().clone(), bytes));
        Ok(())
    }

    async fn get_entry(&self, dn: &Dn) -> StorageResult<Option<Entry>> {
        let entries = self.entries.read().map_err(StorageError::lock)?;
        entries
            .get(&dn.normalized())
            .map(|(stored_dn, bytes)| self.decode(stored_dn, bytes))
            .transpose()
    }

    async fn delete_entry(&self, dn: &Dn) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(StorageError::lock)?;
        entries
            .remove(&dn.normalized())
            .map(|_| ())
            .ok_or_else(|| StorageError::EntryNotFound(dn.to_string()))
    }

    async fn get_all_entries(&self) -> StorageResult<Vec<Entry>> {
        let entries = self.entries.read().map_err(StorageError::lock)?;
        entries
            .values()
            .map(|(dn, bytes)| self.decode(dn, bytes))
            .collect()
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.entries.read().map_err(StorageError::lock)?.len())
    }
}

impl EntryLookup for MemoryStorage {
    fn lookup(&self, dn: &Dn) -> Option<Entry> {
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Entry lookup for {} failed: {}", dn, e);
                return None;
            }
        };
        let (stored_dn, bytes) = entries.get(&dn.normalized())?;
        match self.decode(stored_dn, bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Stored entry {} could not be decoded: {}", dn, e);
                None
            }
        }
    }
}
