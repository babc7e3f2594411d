//! Google Cloud Storage backend
//!
//! Uses object_store::gcp::GoogleCloudStorage. Authentication follows the
//! ADC chain:
//! - Workload Identity in GKE
//! - GOOGLE_APPLICATION_CREDENTIALS / GOOGLE_SERVICE_ACCOUNT
//! - GCE metadata server

use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::ObjectStore;
use std::sync::Arc;

use crate::config::RemoteConfig;
use crate::errors::{RcError, Result};

/// Build a GCS store for a remote
pub fn build(remote: &RemoteConfig) -> Result<Arc<dyn ObjectStore>> {
    let bucket = remote
        .container_or_bucket
        .as_deref()
        .ok_or_else(|| RcError::Config("gcp remote needs a bucket".to_string()))?;

    let store = GoogleCloudStorageBuilder::from_env()
        .with_bucket_name(bucket)
        .build()?;

    Ok(Arc::new(store))
}
