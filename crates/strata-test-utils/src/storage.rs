//! Object store wrapper with failure injection and operation recording.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::{self, BoxStream};

use strata_core::error::{Error, Result};
use strata_core::object_store::{MemoryObjectStore, ObjectStat, ObjectStore};

/// Record of a storage operation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Stat call.
    Stat {
        /// Path probed.
        path: String,
    },
    /// Copy call.
    Copy {
        /// Source path.
        src: String,
        /// Destination path.
        dst: String,
    },
    /// Delete call.
    Delete {
        /// Path deleted.
        path: String,
    },
    /// List call.
    List {
        /// Prefix listed.
        prefix: String,
    },
    /// Put call.
    Put {
        /// Path written.
        path: String,
        /// Bytes written.
        size: usize,
    },
    /// Get call.
    Get {
        /// Path read.
        path: String,
    },
}

/// Wraps a [`MemoryObjectStore`], failing any call whose path starts with an
/// injected prefix.
///
/// Injected failures surface as [`Error::Storage`], the transient class.
#[derive(Debug, Clone, Default)]
pub struct FailingObjectStore {
    inner: Arc<MemoryObjectStore>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_paths: Arc<Mutex<Vec<String>>>,
}

impl FailingObjectStore {
    /// Creates an empty store with no injected failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing store.
    #[must_use]
    pub fn wrapping(inner: Arc<MemoryObjectStore>) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// The wrapped store, for seeding data without tripping injected failures.
    #[must_use]
    pub fn inner(&self) -> &Arc<MemoryObjectStore> {
        &self.inner
    }

    /// Fails every operation on paths starting with `prefix`.
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        self.fail_paths.lock().expect("lock").push(prefix.into());
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.fail_paths.lock().expect("lock").clear();
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Number of stat calls recorded.
    #[must_use]
    pub fn stat_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, StoreOp::Stat { .. }))
            .count()
    }

    fn record(&self, op: StoreOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, path: &str) -> Result<()> {
        let fail_paths = self.fail_paths.lock().expect("lock");
        if fail_paths.iter().any(|p| path.starts_with(p.as_str())) {
            return Err(Error::storage(format!("injected failure for path: {path}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FailingObjectStore {
    async fn stat(&self, path: &str) -> Result<Option<ObjectStat>> {
        self.record(StoreOp::Stat {
            path: path.to_string(),
        });
        self.check_failure(path)?;
        self.inner.stat(path).await
    }

    async fn copy(&self, src: &str, dst: &str, overwrite: bool) -> Result<bool> {
        self.record(StoreOp::Copy {
            src: src.to_string(),
            dst: dst.to_string(),
        });
        self.check_failure(src)?;
        self.check_failure(dst)?;
        self.inner.copy(src, dst, overwrite).await
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        self.record(StoreOp::Delete {
            path: path.to_string(),
        });
        self.check_failure(path)?;
        self.inner.delete(path).await
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, Result<ObjectStat>> {
        self.record(StoreOp::List {
            prefix: prefix.to_string(),
        });
        match self.check_failure(prefix) {
            Ok(()) => self.inner.list(prefix),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<ObjectStat> {
        self.record(StoreOp::Put {
            path: path.to_string(),
            size: data.len(),
        });
        self.check_failure(path)?;
        self.inner.put(path, data).await
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        self.record(StoreOp::Get {
            path: path.to_string(),
        });
        self.check_failure(path)?;
        self.inner.get(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn injected_prefix_fails_and_others_pass() {
        let store = FailingObjectStore::new();
        store.inject_failure("bad/");

        store.put("good/a", Bytes::from_static(b"a")).await.unwrap();
        let err = store.put("bad/a", Bytes::from_static(b"a")).await.unwrap_err();
        assert!(err.is_retryable());

        store.clear_failures();
        store.put("bad/a", Bytes::from_static(b"a")).await.unwrap();
        assert_eq!(store.operations().len(), 3);
    }
}
