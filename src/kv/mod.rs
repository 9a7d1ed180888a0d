//! Key-Value Store Module
//!
//! Physical storage under the record gateway:
//! - Async-first trait so durable backends can be plugged in
//! - In-memory `DashMap` backend for tests and single-process deployments
//! - Values are opaque bytes; encoding belongs to the record layer
//!
//! # Example
//!
//! ```rust
//! use public_goods::kv::{KvStore, MemoryKvStore};
//!
//! # async fn example() -> public_goods::Result<()> {
//! let store = MemoryKvStore::new();
//!
//! store.set("participant:1", b"{}".to_vec()).await?;
//! assert_eq!(store.get("participant:1").await?, Some(b"{}".to_vec()));
//!
//! let keys = store.scan_prefix("participant:").await?;
//! assert_eq!(keys, vec!["participant:1".to_string()]);
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::MemoryKvStore;

use crate::Result;
use std::future::Future;

/// Key-value store the record gateway is built on.
///
/// Implementations must provide read-after-write consistency per key.
/// Durable backends must also make [`KvStore::batch_set`] all-or-nothing:
/// a round transition rewrites the whole cohort in one batch, and a partial
/// write would leave the experiment and its participants disagreeing.
pub trait KvStore: Send + Sync {
    /// Get a value by key.
    ///
    /// Returns `None` if the key doesn't exist.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Set a value for a key.
    ///
    /// Overwrites any existing value.
    fn set(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// List every key starting with `prefix`, in ascending order.
    fn scan_prefix(&self, prefix: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Get multiple keys in a batch.
    ///
    /// Returns values in the same order as keys. Missing keys return `None`.
    fn batch_get(
        &self,
        keys: &[&str],
    ) -> impl Future<Output = Result<Vec<Option<Vec<u8>>>>> + Send {
        async move {
            let mut results = Vec::with_capacity(keys.len());
            for key in keys {
                results.push(self.get(key).await?);
            }
            Ok(results)
        }
    }

    /// Set multiple key-value pairs in a batch.
    ///
    /// Either every pair is stored or none is. The default loops over
    /// [`KvStore::set`] and is only all-or-nothing for backends whose
    /// writes cannot fail; durable backends must override it.
    fn batch_set(&self, pairs: Vec<(&str, Vec<u8>)>) -> impl Future<Output = Result<()>> + Send {
        async move {
            for (key, value) in pairs {
                self.set(key, value).await?;
            }
            Ok(())
        }
    }
}
