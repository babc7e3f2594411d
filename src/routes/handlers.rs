//! Request dispatch
//!
//! Every request lands in `dispatch`, which splits on method:
//! - POST: decode params, find the call, check auth, run it sync or async
//! - GET/HEAD: `[remote]path` browsing, remote listing, static files
//! - OPTIONS: CORS preflight, answered with an empty 200
//! - anything else: 405

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, instrument};

use crate::auth::auth_denied;
use crate::errors::{json_response, ErrorReply, RcError, Result};
use crate::metrics;
use crate::rc::{Call, CallContext, Params, ASYNC_PARAM};
use crate::routes::decode::{decode_params, DecodeError};
use crate::routes::{browser, AppState};

/// Path token listing all remotes
const ALL_REMOTES: &str = "*";

/// The rc path of a request: percent-decoded, without the leading `/`
pub fn rc_path(uri: &Uri) -> String {
    let raw_path = uri.path().trim_start_matches('/');
    urlencoding::decode(raw_path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| raw_path.to_string())
}

/// Top-level handler for every method and path
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    let path = rc_path(request.uri());

    let response = match method {
        Method::POST => handle_post(&state, path, request).await,
        Method::OPTIONS => handle_options(),
        Method::GET | Method::HEAD => handle_get(&state, path, request).await,
        ref other => ErrorReply::new(
            path,
            None,
            RcError::MethodNotAllowed(other.to_string()),
            StatusCode::METHOD_NOT_ALLOWED,
        )
        .into_response(),
    };

    metrics::HTTP_REQUESTS
        .with_label_values(&[method.as_str(), response.status().as_str()])
        .inc();
    response
}

fn handle_options() -> Response {
    StatusCode::OK.into_response()
}

#[instrument(skip(state, request))]
async fn handle_post(state: &AppState, path: String, request: Request) -> Response {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let query = request.uri().query().map(str::to_string);

    let body = match axum::body::to_bytes(request.into_body(), state.max_body_size).await {
        Ok(body) => body,
        Err(e) => {
            return ErrorReply::new(path, None, RcError::BadBody(e.to_string()), StatusCode::BAD_REQUEST)
                .into_response()
        }
    };

    let mut input = match decode_params(query.as_deref(), content_type.as_deref(), &body) {
        Ok(input) => input,
        Err(DecodeError { input, error }) => {
            return ErrorReply::new(path, input, error, StatusCode::BAD_REQUEST).into_response()
        }
    };

    let Some(call) = state.registry.get(&path) else {
        let error = RcError::MethodNotFound(path.clone());
        return ErrorReply::new(path, Some(input), error, StatusCode::NOT_FOUND).into_response();
    };

    if auth_denied(&state.opts, call.auth_required) {
        let error = RcError::AuthRequired(path.clone());
        return ErrorReply::new(path, Some(input), error, StatusCode::FORBIDDEN).into_response();
    }

    let is_async = match input.get_bool(ASYNC_PARAM) {
        Ok(is_async) => is_async,
        Err(RcError::ParamNotFound(_)) => false,
        Err(e) => return ErrorReply::new(path, Some(input), e, StatusCode::BAD_REQUEST).into_response(),
    };
    input.remove(ASYNC_PARAM);

    debug!(path = %path, params = ?input, is_async, "rc: call");
    let result = if is_async {
        state
            .scheduler
            .submit(&path, call.handler.clone(), input.clone())
            .await
            .map(Some)
    } else {
        call_sync(&call, &path, input.clone()).await
    };

    match result {
        Ok(out) => {
            let out = out.unwrap_or_default();
            debug!(path = %path, reply = ?out, "rc: reply");
            json_response(StatusCode::OK, &out)
        }
        Err(e) => ErrorReply::new(path, Some(input), e, StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Run a call inline
///
/// The context's token is cancelled if this future is dropped before the
/// handler returns, which is what happens when the client disconnects.
async fn call_sync(call: &Call, path: &str, params: Params) -> Result<Option<Params>> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let timer = metrics::CALL_DURATION.start_timer();
    let result = call.handler.call(CallContext::new(path, cancel), params).await;
    timer.observe_duration();
    result
}

/// Split `[remote]path` into its parts
fn parse_remote_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix('[')?;
    let end = rest.find(']')?;
    Some((&rest[..end], &rest[end + 1..]))
}

async fn handle_get(state: &AppState, path: String, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let is_head = parts.method == Method::HEAD;
    let response = route_get(state, &path, parts, body).await;
    if is_head {
        let (parts, _) = response.into_parts();
        Response::from_parts(parts, Body::empty())
    } else {
        response
    }
}

/// GET/HEAD routing; the body is only needed again for static files
async fn route_get(state: &AppState, path: &str, parts: Parts, body: Body) -> Response {
    let serve = state.opts.serve;
    match parse_remote_path(path) {
        Some((name, remote_path)) if serve => {
            return browser::serve_remote(state, name, remote_path, &parts).await
        }
        _ => {}
    }
    if path == ALL_REMOTES && serve {
        return browser::serve_root(state, &parts.headers).await;
    }
    if let Some(files) = &state.opts.files {
        return serve_files(files, Request::from_parts(parts, body)).await;
    }
    if path.is_empty() && serve {
        return browser::serve_root(state, &parts.headers).await;
    }
    ErrorReply::new(
        path,
        None,
        RcError::NoRoute(path.to_string()),
        StatusCode::NOT_FOUND,
    )
    .into_response()
}

async fn serve_files(root: &std::path::Path, request: Request) -> Response {
    match ServeDir::new(root).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}
