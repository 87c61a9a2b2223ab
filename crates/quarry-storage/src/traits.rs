//! Storage backend trait definitions

use async_trait::async_trait;
use quarry_core::{Dn, Entry};

use crate::error::StorageResult;

/// Trait for storage backend implementations
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Initialize the storage
    async fn initialize(&self) -> StorageResult<()>;

    /// Close the storage
    async fn close(&self) -> StorageResult<()>;

    /// Health check
    async fn health_check(&self) -> StorageResult<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Entry Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a new entry; fails if one already exists at the DN
    async fn add_entry(&self, entry: &Entry) -> StorageResult<()>;

    /// Store an entry, replacing any entry at the same DN
    async fn put_entry(&self, entry: &Entry) -> StorageResult<()>;

    /// Get an entry by DN
    async fn get_entry(&self, dn: &Dn) -> StorageResult<Option<Entry>>;

    /// Delete an entry by DN
    async fn delete_entry(&self, dn: &Dn) -> StorageResult<()>;

    /// All entries, in DN order
    async fn get_all_entries(&self) -> StorageResult<Vec<Entry>>;

    /// Number of stored entries
    async fn count(&self) -> StorageResult<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Bulk Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Entries at or beneath `base`
    async fn get_subtree(&self, base: &Dn) -> StorageResult<Vec<Entry>> {
        let entries = self.get_all_entries().await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.dn().is_descendant_of(base))
            .collect())
    }

    /// Store every entry, replacing existing ones
    async fn put_entries(&self, entries: &[Entry]) -> StorageResult<()> {
        for entry in entries {
            self.put_entry(entry).await?;
        }
        Ok(())
    }
}
