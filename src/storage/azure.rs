//! Azure Blob Storage backend
//!
//! Uses object_store::azure::MicrosoftAzure. `MicrosoftAzureBuilder::from_env`
//! picks up AZURE_* variables (account, key, client id, tenant); with no
//! explicit key the builder falls back to managed / workload identity.

use object_store::azure::MicrosoftAzureBuilder;
use object_store::ObjectStore;
use std::sync::Arc;

use crate::config::RemoteConfig;
use crate::errors::{RcError, Result};

/// Build an Azure Blob store for a remote
pub fn build(remote: &RemoteConfig) -> Result<Arc<dyn ObjectStore>> {
    let container = remote
        .container_or_bucket
        .as_deref()
        .ok_or_else(|| RcError::Config("azure remote needs a container".to_string()))?;

    let mut builder = MicrosoftAzureBuilder::from_env().with_container_name(container);
    if let Some(endpoint) = &remote.endpoint {
        builder = builder.with_endpoint(endpoint.clone());
    }
    if remote.allow_http {
        builder = builder.with_allow_http(true);
    }

    Ok(Arc::new(builder.build()?))
}
