//! In-process blob store
//!
//! Backs tests and local runs without a blob store. Counts requests so
//! callers can observe whether a fetch actually happened.

use crate::blob::{BlobStore, RemoteObject};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use unitgate_common::{Error, ObjectMetadata, Result};

type ObjectKey = (String, String, String);

/// Blob store held entirely in memory
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<ObjectKey, RemoteObject>>,
    gets: AtomicU64,
    heads: AtomicU64,
}

impl MemoryBlobStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object
    pub fn put(
        &self,
        account: &str,
        container: &str,
        name: &str,
        body: impl Into<Bytes>,
        metadata: ObjectMetadata,
    ) {
        self.objects.write().insert(
            key(account, container, name),
            RemoteObject {
                body: body.into(),
                metadata,
            },
        );
    }

    /// Remove an object
    pub fn remove(&self, account: &str, container: &str, name: &str) -> Option<RemoteObject> {
        self.objects.write().remove(&key(account, container, name))
    }

    /// Number of `get_object` calls served or refused
    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Number of `head_object` calls served or refused
    pub fn head_count(&self) -> u64 {
        self.heads.load(Ordering::Relaxed)
    }

    fn lookup(&self, account: &str, container: &str, name: &str) -> Result<RemoteObject> {
        self.objects
            .read()
            .get(&key(account, container, name))
            .cloned()
            .ok_or_else(|| Error::remote_fetch(container, name, "object not found"))
    }
}

fn key(account: &str, container: &str, name: &str) -> ObjectKey {
    (account.to_string(), container.to_string(), name.to_string())
}

impl BlobStore for MemoryBlobStore {
    fn get_object(&self, account: &str, container: &str, name: &str) -> Result<RemoteObject> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.lookup(account, container, name)
    }

    fn head_object(&self, account: &str, container: &str, name: &str) -> Result<ObjectMetadata> {
        self.heads.fetch_add(1, Ordering::Relaxed);
        self.lookup(account, container, name).map(|obj| obj.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unitgate_common::TIMESTAMP_KEY;

    #[test]
    fn test_put_and_get() {
        let store = MemoryBlobStore::new();
        let metadata: ObjectMetadata = [(TIMESTAMP_KEY, "100.0")].into_iter().collect();
        store.put("AUTH_a", "units", "hello", &b"payload"[..], metadata.clone());

        let obj = store.get_object("AUTH_a", "units", "hello").unwrap();
        assert_eq!(obj.body, Bytes::from_static(b"payload"));
        assert_eq!(obj.metadata, metadata);
        assert_eq!(store.head_object("AUTH_a", "units", "hello").unwrap(), metadata);
        assert_eq!(store.get_count(), 1);
        assert_eq!(store.head_count(), 1);
    }

    #[test]
    fn test_missing_object() {
        let store = MemoryBlobStore::new();
        let err = store.get_object("AUTH_a", "units", "nope").unwrap_err();
        assert!(matches!(err, Error::RemoteFetchFailed { .. }));
        assert_eq!(store.get_count(), 1);
    }

    #[test]
    fn test_objects_are_scoped_by_account() {
        let store = MemoryBlobStore::new();
        store.put("AUTH_a", "units", "hello", "a", ObjectMetadata::new());

        assert!(store.get_object("AUTH_b", "units", "hello").is_err());
        assert!(store.remove("AUTH_a", "units", "hello").is_some());
        assert!(store.get_object("AUTH_a", "units", "hello").is_err());
    }
}
