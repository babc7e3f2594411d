//! Registry of callable operations
//!
//! Operations are looked up by exact path. The registry is built before the
//! server starts and handed to the router as shared, read-only state.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::rc::Params;

/// Per-call context handed to a handler
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Path the operation was invoked under
    pub path: String,
    /// Cancelled when the caller goes away (sync calls) or the job is stopped
    pub cancel: CancellationToken,
}

impl CallContext {
    pub fn new(path: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            path: path.into(),
            cancel,
        }
    }
}

/// An operation implementation
///
/// Returning `Ok(None)` means "no output"; callers see an empty object.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: CallContext, params: Params) -> Result<Option<Params>>;
}

/// Adapter so plain async closures can be registered
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(CallContext, Params) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Params>>> + Send,
{
    async fn call(&self, ctx: CallContext, params: Params) -> Result<Option<Params>> {
        (self.0)(ctx, params).await
    }
}

/// A registered operation
#[derive(Clone)]
pub struct Call {
    pub path: String,
    pub title: String,
    pub help: String,
    pub auth_required: bool,
    pub handler: Arc<dyn Handler>,
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("path", &self.path)
            .field("auth_required", &self.auth_required)
            .finish_non_exhaustive()
    }
}

/// Summary of a call as reported by `rc/list`
#[derive(Debug, Clone, Serialize)]
pub struct CallInfo {
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Help")]
    pub help: String,
    #[serde(rename = "AuthRequired")]
    pub auth_required: bool,
}

/// Path to operation lookup table
#[derive(Debug, Default, Clone)]
pub struct Registry {
    calls: BTreeMap<String, Arc<Call>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call, replacing any previous one at the same path
    pub fn add(&mut self, call: Call) -> &mut Self {
        self.calls.insert(call.path.clone(), Arc::new(call));
        self
    }

    /// Register an async closure as a call
    pub fn add_fn<F, Fut>(&mut self, path: &str, title: &str, auth_required: bool, f: F) -> &mut Self
    where
        F: Fn(CallContext, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Params>>> + Send + 'static,
    {
        self.add(Call {
            path: path.to_string(),
            title: title.to_string(),
            help: String::new(),
            auth_required,
            handler: Arc::new(FnHandler::new(f)),
        })
    }

    /// Look up a call by exact path
    pub fn get(&self, path: &str) -> Option<Arc<Call>> {
        self.calls.get(path).cloned()
    }

    /// All calls, sorted by path
    pub fn list(&self) -> Vec<CallInfo> {
        self.calls
            .values()
            .map(|c| CallInfo {
                path: c.path.clone(),
                title: c.title.clone(),
                help: c.help.clone(),
                auth_required: c.auth_required,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
