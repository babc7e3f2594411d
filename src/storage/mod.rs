//! Storage backend abstraction layer
//!
//! Provides a unified read-only interface over the object stores a remote
//! can point at (local disk, memory, AWS S3, Azure Blob Storage, Google
//! Cloud Storage) using the object_store crate, plus the cache that builds
//! one backend per configured remote on first use.

mod aws;
mod azure;
mod gcp;
mod local;

use async_trait::async_trait;
use object_store::path::Path;
use object_store::{GetResult, ObjectMeta, ObjectStore};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::{BackendType, RemoteConfig};
use crate::errors::{RcError, Result};

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    /// Path relative to the remote root, without a trailing slash
    pub remote: String,
    pub is_dir: bool,
}

/// Storage backend trait for browsing a remote
///
/// All paths are relative to the remote root and use `/` separators.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Immediate children of `dir`, sorted by path
    async fn list_dir(&self, dir: &str) -> std::result::Result<Vec<DirEntry>, object_store::Error>;

    /// Object metadata (HEAD operation)
    async fn head(&self, path: &str) -> std::result::Result<ObjectMeta, object_store::Error>;

    /// Open an object for streaming
    async fn open(&self, path: &str) -> std::result::Result<GetResult, object_store::Error>;
}

/// `StorageBackend` over any object_store implementation
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store, prefix: None }
    }

    /// Set the prefix for this backend
    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        self
    }

    /// Apply prefix to path if configured
    fn apply_prefix(&self, path: &str) -> Path {
        let full_path = if let Some(prefix) = &self.prefix {
            format!("{}/{}", prefix, path)
        } else {
            path.to_string()
        };
        Path::from(full_path)
    }

    /// Inverse of `apply_prefix`
    fn strip_prefix<'a>(&self, location: &'a Path) -> &'a str {
        let location = location.as_ref();
        match &self.prefix {
            Some(prefix) => location
                .strip_prefix(prefix.as_str())
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or(location),
            None => location,
        }
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn list_dir(&self, dir: &str) -> std::result::Result<Vec<DirEntry>, object_store::Error> {
        let prefix = self.apply_prefix(dir.trim_matches('/'));
        let listing = if prefix.as_ref().is_empty() {
            self.store.list_with_delimiter(None).await?
        } else {
            self.store.list_with_delimiter(Some(&prefix)).await?
        };

        let dirs = listing.common_prefixes.iter().map(|p| DirEntry {
            remote: self.strip_prefix(p).to_string(),
            is_dir: true,
        });
        let objects = listing.objects.iter().map(|o| DirEntry {
            remote: self.strip_prefix(&o.location).to_string(),
            is_dir: false,
        });

        let mut entries: Vec<DirEntry> = dirs.chain(objects).collect();
        entries.sort_by(|a, b| a.remote.cmp(&b.remote));
        Ok(entries)
    }

    async fn head(&self, path: &str) -> std::result::Result<ObjectMeta, object_store::Error> {
        self.store.head(&self.apply_prefix(path)).await
    }

    async fn open(&self, path: &str) -> std::result::Result<GetResult, object_store::Error> {
        self.store.get(&self.apply_prefix(path)).await
    }
}

/// Create a storage backend for a configured remote
pub fn create_backend(remote: &RemoteConfig) -> Result<Arc<dyn StorageBackend>> {
    let store = match remote.backend_type {
        BackendType::Local => local::build(remote)?,
        BackendType::Memory => local::build_memory(),
        BackendType::Aws => aws::build(remote)?,
        BackendType::Azure => azure::build(remote)?,
        BackendType::Gcp => gcp::build(remote)?,
    };
    Ok(Arc::new(
        ObjectStoreBackend::new(store).with_prefix(remote.prefix.clone()),
    ))
}

/// Backends by remote name, built lazily and kept for the process lifetime
pub struct RemoteCache {
    remotes: BTreeMap<String, RemoteConfig>,
    backends: RwLock<HashMap<String, Arc<dyn StorageBackend>>>,
}

impl RemoteCache {
    pub fn new(remotes: BTreeMap<String, RemoteConfig>) -> Self {
        Self {
            remotes,
            backends: RwLock::new(HashMap::new()),
        }
    }

    /// Register an already built backend under `name`
    pub async fn insert(&self, name: impl Into<String>, backend: Arc<dyn StorageBackend>) {
        self.backends.write().await.insert(name.into(), backend);
    }

    /// Fetch the backend for `name`, building it on first use
    pub async fn get(&self, name: &str) -> Result<Arc<dyn StorageBackend>> {
        if let Some(backend) = self.backends.read().await.get(name) {
            return Ok(backend.clone());
        }

        let remote = self
            .remotes
            .get(name)
            .ok_or_else(|| RcError::UnknownRemote(name.to_string()))?;

        let mut backends = self.backends.write().await;
        // Another request may have built it while we waited for the lock
        if let Some(backend) = backends.get(name) {
            return Ok(backend.clone());
        }
        let backend = create_backend(remote)?;
        info!(remote = name, backend = ?remote.backend_type, "Storage backend initialized");
        backends.insert(name.to_string(), backend.clone());
        Ok(backend)
    }

    /// Names of all addressable remotes, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.remotes.keys().cloned().collect();
        for name in self.backends.read().await.keys() {
            if !self.remotes.contains_key(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use object_store::memory::InMemory;

    async fn store_with(files: &[&str]) -> Arc<dyn ObjectStore> {
        let store = Arc::new(InMemory::new());
        for file in files {
            store
                .put(&Path::from(*file), Bytes::from(format!("content of {}", file)).into())
                .await
                .unwrap();
        }
        store
    }

    fn memory_remote() -> RemoteConfig {
        RemoteConfig {
            backend_type: BackendType::Memory,
            root: None,
            container_or_bucket: None,
            prefix: None,
            region: None,
            endpoint: None,
            allow_http: false,
        }
    }

    #[tokio::test]
    async fn test_list_dir_sorted_and_flagged() {
        let store = store_with(&["b.txt", "a/one.txt", "c/deep/x", "a.txt"]).await;
        let backend = ObjectStoreBackend::new(store);

        let entries = backend.list_dir("").await.unwrap();
        let got: Vec<(&str, bool)> = entries.iter().map(|e| (e.remote.as_str(), e.is_dir)).collect();
        assert_eq!(
            got,
            vec![("a", true), ("a.txt", false), ("b.txt", false), ("c", true)]
        );

        let entries = backend.list_dir("c/").await.unwrap();
        assert_eq!(
            entries,
            vec![DirEntry {
                remote: "c/deep".to_string(),
                is_dir: true
            }]
        );
    }

    #[tokio::test]
    async fn test_prefix_is_hidden() {
        let store = store_with(&["root/dir/file.txt", "other/file.txt"]).await;
        let backend = ObjectStoreBackend::new(store).with_prefix(Some("/root/".to_string()));

        let entries = backend.list_dir("dir").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].remote, "dir/file.txt");

        let meta = backend.head("dir/file.txt").await.unwrap();
        assert_eq!(meta.location.as_ref(), "root/dir/file.txt");
    }

    #[tokio::test]
    async fn test_open_missing_object() {
        let backend = ObjectStoreBackend::new(store_with(&[]).await);
        let err = backend.open("nope").await.unwrap_err();
        assert!(matches!(err, object_store::Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cache_builds_once() {
        let remotes = [("scratch".to_string(), memory_remote())].into_iter().collect();
        let cache = RemoteCache::new(remotes);

        let first = cache.get("scratch").await.unwrap();
        let second = cache.get("scratch").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(matches!(
            cache.get("missing").await,
            Err(RcError::UnknownRemote(name)) if name == "missing"
        ));
    }

    #[tokio::test]
    async fn test_cache_names_include_inserted() {
        let remotes = [("zeta".to_string(), memory_remote())].into_iter().collect();
        let cache = RemoteCache::new(remotes);
        cache
            .insert("alpha", Arc::new(ObjectStoreBackend::new(store_with(&[]).await)))
            .await;
        assert_eq!(cache.names().await, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/hello.txt"), b"hi").unwrap();

        let mut remote = memory_remote();
        remote.backend_type = BackendType::Local;
        remote.root = Some(dir.path().to_path_buf());

        let backend = create_backend(&remote).unwrap();
        let entries = backend.list_dir("sub/").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].remote, "sub/hello.txt");
        assert_eq!(backend.head("sub/hello.txt").await.unwrap().size, 2);
    }
}
