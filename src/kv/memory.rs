//! `DashMap`-backed record backend for tests and single-process runs.
//!
//! Records live only as long as the process.

use super::KvStore;
use crate::Result;
use dashmap::DashMap;

/// In-memory backend shared by every coordinator task.
///
/// Writes never fail, so a batch always lands in full and satisfies the
/// all-or-nothing contract of [`KvStore::batch_set`].
///
/// # Example
///
/// ```rust
/// use public_goods::kv::{KvStore, MemoryKvStore};
///
/// # async fn example() -> public_goods::Result<()> {
/// let kv = MemoryKvStore::new();
/// kv.batch_set(vec![
///     ("participant:2", b"{}".to_vec()),
///     ("experiment:1", b"{}".to_vec()),
/// ])
/// .await?;
/// assert_eq!(kv.scan_prefix("experiment:").await?, vec!["experiment:1"]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    records: DashMap<String, Vec<u8>>,
}

impl MemoryKvStore {
    /// Empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.get(key).map(|record| record.value().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.records.insert(key.to_owned(), value);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .records
            .iter()
            .filter_map(|record| {
                record
                    .key()
                    .starts_with(prefix)
                    .then(|| record.key().clone())
            })
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }

    async fn batch_set(&self, pairs: Vec<(&str, Vec<u8>)>) -> Result<()> {
        for (key, value) in pairs {
            self.records.insert(key.to_owned(), value);
        }
        Ok(())
    }
}
