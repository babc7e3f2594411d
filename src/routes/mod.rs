//! HTTP routes for the remote control API
//!
//! Everything goes through a single fallback handler because rc paths are
//! free-form (`operations/list`, `[remote]dir/file`, `*`) and the routing
//! rules depend on the method and configuration rather than path shape.
//! `/metrics` is the only fixed route, mounted when enabled.
//!
//! CORS headers are added outermost so that every reply carries them,
//! including auth rejections and timeouts.

mod browser;
pub mod decode;
mod handlers;

use axum::error_handling::HandleErrorLayer;
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{BoxError, Router};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tracing::{error, instrument};

use crate::auth;
use crate::config::RcConfig;
use crate::errors::{ErrorReply, RcError};
use crate::rc::{Registry, Scheduler};
use crate::storage::RemoteCache;

/// Shared state for all handlers, read-only after startup
#[derive(Clone)]
pub struct AppState {
    pub opts: Arc<RcConfig>,
    pub registry: Arc<Registry>,
    pub scheduler: Arc<dyn Scheduler>,
    pub remotes: Arc<RemoteCache>,
    pub max_body_size: usize,
}

/// Create the rc router
///
/// With a `timeout`, requests still running when it fires are dropped
/// (cancelling any sync call) and answered with a 408 error reply.
pub fn create_router(state: AppState, timeout: Option<Duration>) -> Router {
    let opts = state.opts.clone();
    let mut router = Router::new();
    if opts.metrics {
        router = router.route("/metrics", get(metrics).fallback(handlers::dispatch));
    }
    let mut router = router
        .fallback(handlers::dispatch)
        .with_state(state)
        .layer(middleware::from_fn_with_state(opts, auth::basic_auth));
    if let Some(timeout) = timeout {
        router = router.layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(timeout_reply))
                .timeout(timeout),
        );
    }
    router.layer(middleware::from_fn(cors_headers))
}

/// Turn a middleware failure into the usual error body
async fn timeout_reply(uri: Uri, err: BoxError) -> Response {
    let path = handlers::rc_path(&uri);
    if err.is::<tower::timeout::error::Elapsed>() {
        ErrorReply::new(path, None, RcError::Timeout, StatusCode::REQUEST_TIMEOUT).into_response()
    } else {
        let error = RcError::Operation(err.to_string());
        ErrorReply::new(path, None, error, StatusCode::INTERNAL_SERVER_ERROR).into_response()
    }
}

/// Allow any origin and echo back the headers a preflight asks for
async fn cors_headers(request: Request, next: Next) -> Response {
    let requested = request
        .headers()
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned();

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    if let Some(requested) = requested {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested);
    }
    response
}

/// Prometheus metrics endpoint
#[instrument]
async fn metrics() -> Response {
    match crate::metrics::render() {
        Ok(text) => text.into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
