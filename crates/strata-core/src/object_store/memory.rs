//! In-memory object store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use sha2::{Digest, Sha256};

use super::{ObjectStat, ObjectStore, ObjectStoreProvider};
use crate::error::{Error, Result, poison_err};
use crate::region::StorageLocation;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn new(data: Bytes) -> Self {
        let etag = format!("\"{}\"", hex(&Sha256::digest(&data)[..16]));
        Self {
            data,
            etag,
            last_modified: Utc::now(),
        }
    }

    fn stat(&self, path: &str) -> ObjectStat {
        ObjectStat {
            path: path.to_string(),
            size: self.data.len() as u64,
            etag: Some(self.etag.clone()),
            last_modified: self.last_modified,
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// In-memory [`ObjectStore`] with content-derived etags.
///
/// Identical content yields identical etags, so copies are detectable as
/// up to date by comparing stats.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored objects.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the store is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.objects.read().map_err(poison_err)?.len())
    }

    /// Returns true if the store holds no objects.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the store is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn stat(&self, path: &str) -> Result<Option<ObjectStat>> {
        let objects = self.objects.read().map_err(poison_err)?;
        Ok(objects.get(path).map(|obj| obj.stat(path)))
    }

    async fn copy(&self, src: &str, dst: &str, overwrite: bool) -> Result<bool> {
        let mut objects = self.objects.write().map_err(poison_err)?;
        let source = objects
            .get(src)
            .cloned()
            .ok_or_else(|| Error::not_found("object", src))?;
        if !overwrite && objects.contains_key(dst) {
            return Ok(false);
        }
        objects.insert(
            dst.to_string(),
            StoredObject {
                last_modified: Utc::now(),
                ..source
            },
        );
        Ok(true)
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let mut objects = self.objects.write().map_err(poison_err)?;
        Ok(objects.remove(path).is_some())
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, Result<ObjectStat>> {
        let listed: Result<Vec<ObjectStat>> = self
            .objects
            .read()
            .map_err(poison_err)
            .map(|objects| {
                objects
                    .range(prefix.to_string()..)
                    .take_while(|(path, _)| path.starts_with(prefix))
                    .map(|(path, obj)| obj.stat(path))
                    .collect()
            });
        match listed {
            Ok(stats) => stream::iter(stats.into_iter().map(Ok)).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<ObjectStat> {
        let object = StoredObject::new(data);
        let stat = object.stat(path);
        let mut objects = self.objects.write().map_err(poison_err)?;
        objects.insert(path.to_string(), object);
        Ok(stat)
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(poison_err)?;
        objects
            .get(path)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| Error::not_found("object", path))
    }
}

/// Maps storage location URIs to in-memory stores.
#[derive(Default)]
pub struct InMemoryStoreProvider {
    stores: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl std::fmt::Debug for InMemoryStoreProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStoreProvider").finish_non_exhaustive()
    }
}

impl InMemoryStoreProvider {
    /// Creates a provider with no stores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `uri` to `store`, replacing any previous binding.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the provider is poisoned.
    pub fn register(&self, uri: impl Into<String>, store: Arc<dyn ObjectStore>) -> Result<()> {
        self.stores
            .write()
            .map_err(poison_err)?
            .insert(uri.into(), store);
        Ok(())
    }
}

impl ObjectStoreProvider for InMemoryStoreProvider {
    fn store_for(&self, location: &StorageLocation) -> Result<Arc<dyn ObjectStore>> {
        let stores = self.stores.read().map_err(poison_err)?;
        stores
            .get(&location.uri)
            .cloned()
            .ok_or_else(|| Error::not_found("object store", &location.uri))
    }
}
