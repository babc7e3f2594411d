//! AWS S3 storage backend
//!
//! Uses object_store::aws::AmazonS3. Credentials follow the default AWS
//! chain read by `AmazonS3Builder::from_env`:
//! - Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY)
//! - IRSA role annotations in Kubernetes
//! - EC2 instance metadata / ECS task role

use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;
use std::sync::Arc;

use crate::config::RemoteConfig;
use crate::errors::{RcError, Result};

/// Build an S3 store for a remote
pub fn build(remote: &RemoteConfig) -> Result<Arc<dyn ObjectStore>> {
    let bucket = remote
        .container_or_bucket
        .as_deref()
        .ok_or_else(|| RcError::Config("aws remote needs a bucket".to_string()))?;

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_region(remote.region.as_deref().unwrap_or("us-east-1"));

    // S3-compatible services like MinIO
    if let Some(endpoint) = &remote.endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if remote.allow_http {
        builder = builder.with_allow_http(true);
    }

    Ok(Arc::new(builder.build()?))
}
