//! Durable per-actor key/value storage.
//!
//! Each actor instance gets its own store, scoped to that instance and kept
//! by the namespace across re-activations. The RoutingActor keeps its
//! assignment and load tables here.
//!
//! # Design
//!
//! - `ActorStorage` is a trait so implementations can range from an
//!   in-memory map (testing/simulation) to a real database backend.
//! - Values are opaque bytes; [`StorageExt`] layers `serde_json` on top.
//! - `list` returns entries in key order so table scans are deterministic.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Serialization or deserialization failed.
    #[error("serialization error on {key}: {source}")]
    Serialization {
        /// The key being read or written.
        key: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// Generic backend error.
    #[error("store error: {0}")]
    Backend(String),
}

/// Durable key/value store for one actor instance.
///
/// # Single-core
///
/// No Send bounds: the mesh runs on a single thread.
#[async_trait::async_trait(?Send)]
pub trait ActorStorage: fmt::Debug {
    /// Read a value. `Ok(None)` if the key was never written or was deleted.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Delete a value. Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// All entries whose key starts with `prefix`, in key order.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;
}

/// Typed JSON access on top of any [`ActorStorage`].
#[async_trait::async_trait(?Send)]
pub trait StorageExt {
    /// Read and decode a value.
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError>;

    /// Encode and write a value.
    async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError>;

    /// Decode every entry under `prefix`, with the prefix stripped from keys.
    async fn list_json<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, T)>, StorageError>;
}

#[async_trait::async_trait(?Send)]
impl<S: ActorStorage + ?Sized> StorageExt for S {
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get(key).await? {
            Some(bytes) => decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value).map_err(|source| StorageError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.put(key, bytes).await
    }

    async fn list_json<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, T)>, StorageError> {
        let entries = self.list(prefix).await?;
        entries
            .into_iter()
            .map(|(key, bytes)| {
                let value = decode(&key, &bytes)?;
                let suffix = key.strip_prefix(prefix).unwrap_or(&key).to_string();
                Ok((suffix, value))
            })
            .collect()
    }
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|source| StorageError::Serialization {
        key: key.to_string(),
        source,
    })
}

/// In-memory store for testing and simulation.
///
/// No persistence across process restarts.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: RefCell<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[async_trait::async_trait(?Send)]
impl ActorStorage for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.borrow_mut().remove(key).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        Ok(self
            .entries
            .borrow()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
