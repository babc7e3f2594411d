//! Local filesystem and in-memory backends

use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use std::sync::Arc;

use crate::config::RemoteConfig;
use crate::errors::{RcError, Result, ResultExt};

/// Build a store rooted at a local directory
pub fn build(remote: &RemoteConfig) -> Result<Arc<dyn ObjectStore>> {
    let root = remote
        .root
        .as_ref()
        .ok_or_else(|| RcError::Config("local remote needs a root".to_string()))?;

    let store = LocalFileSystem::new_with_prefix(root)
        .context(format!("failed to open {}", root.display()))?;
    Ok(Arc::new(store))
}

/// Build an empty in-memory store
pub fn build_memory() -> Arc<dyn ObjectStore> {
    Arc::new(InMemory::new())
}
