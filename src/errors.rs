//! Error types for the rc server
//!
//! Provides structured error handling using thiserror for everything the
//! dispatcher can hit: request decoding, registry lookup, auth, handler
//! failures and storage access. `ErrorReply` turns an error into the
//! JSON `{status, error, input, path}` body every failed call returns.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::rc::Params;

/// Main error type for rc operations
#[derive(Error, Debug)]
pub enum RcError {
    /// Domain error: a directory does not exist
    #[error("directory not found")]
    DirNotFound,

    /// Domain error: an object does not exist
    #[error("object not found")]
    ObjectNotFound,

    /// A parameter was present but had the wrong type or value
    #[error("{0}")]
    ParamInvalid(String),

    /// A required parameter was missing
    #[error("Didn't find key {0:?} in input")]
    ParamNotFound(String),

    /// No operation registered at the path
    #[error("couldn't find method {0:?}")]
    MethodNotFound(String),

    /// GET path that matches no route
    #[error("{0:?} not found")]
    NoRoute(String),

    /// The operation needs auth but none is configured
    #[error("authentication must be set up on the rc server to use {0:?} or the no_auth option must be in use")]
    AuthRequired(String),

    /// Basic auth credentials missing or wrong
    #[error("unauthorized")]
    Unauthorized,

    /// HTTP method outside GET/HEAD/POST/OPTIONS
    #[error("method {0:?} not allowed")]
    MethodNotAllowed(String),

    /// Unparsable form/URL parameters
    #[error("failed to parse form/URL parameters: {0}")]
    BadForm(String),

    /// Unparsable JSON body
    #[error("failed to read input JSON: {0}")]
    BadJson(#[source] serde_json::Error),

    /// Body could not be read (too large or broken connection)
    #[error("failed to read request body: {0}")]
    BadBody(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Browser addressed a remote that is not configured
    #[error("remote {0:?} not found in config")]
    UnknownRemote(String),

    /// Storage backend operation failed
    #[error("storage error: {0}")]
    Storage(#[from] object_store::Error),

    /// The request ran past the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Background job submission or lookup failed
    #[error("job error: {0}")]
    Job(String),

    /// Generic operation failure
    #[error("{0}")]
    Operation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another error wrapped with a description of what was being done
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<RcError>,
    },
}

impl RcError {
    /// Wrap this error with a description
    pub fn context(self, context: impl Into<String>) -> Self {
        RcError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error under any `Context` wrapping
    pub fn cause(&self) -> &RcError {
        let mut err = self;
        while let RcError::Context { source, .. } = err {
            err = source;
        }
        err
    }

    /// Status for this error: well known causes first, then `fallback`
    pub fn status(&self, fallback: StatusCode) -> StatusCode {
        match self.cause() {
            RcError::DirNotFound | RcError::ObjectNotFound => StatusCode::NOT_FOUND,
            RcError::ParamInvalid(_) | RcError::ParamNotFound(_) => StatusCode::BAD_REQUEST,
            _ => fallback,
        }
    }
}

/// Attach context to the error of a `Result`
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<RcError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }
}

/// A failed call, ready to be written back to the client
#[derive(Debug)]
pub struct ErrorReply {
    pub path: String,
    pub input: Option<Params>,
    pub error: RcError,
    pub status: StatusCode,
}

impl ErrorReply {
    /// Build a reply; `status` is used unless the error's cause overrides it
    pub fn new(path: impl Into<String>, input: Option<Params>, error: RcError, status: StatusCode) -> Self {
        let status = error.status(status);
        Self {
            path: path.into(),
            input,
            error,
            status,
        }
    }
}

impl IntoResponse for ErrorReply {
    fn into_response(self) -> Response {
        error!(path = %self.path, status = self.status.as_u16(), error = %self.error, "rc: error");

        let body = json!({
            "status": self.status.as_u16(),
            "error": self.error.to_string(),
            "input": self.input,
            "path": self.path,
        });

        json_response(self.status, &body)
    }
}

/// Serialize `value` as an indented JSON body
///
/// A serialization failure can't be reported to the client in the body, so
/// it is logged and the status is sent with an empty body.
pub fn json_response<T: serde::Serialize>(status: StatusCode, value: &T) -> Response {
    match serde_json::to_vec_pretty(value) {
        Ok(mut body) => {
            body.push(b'\n');
            (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        Err(e) => {
            error!(error = %e, "rc: failed to write JSON output");
            status.into_response()
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, RcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_unwraps_context() {
        let err = RcError::ObjectNotFound.context("failed to open").context("copy");
        assert!(matches!(err.cause(), RcError::ObjectNotFound));
        assert_eq!(err.to_string(), "copy: failed to open: object not found");
    }

    #[test]
    fn test_status_precedence() {
        let fallback = StatusCode::INTERNAL_SERVER_ERROR;
        assert_eq!(RcError::DirNotFound.status(fallback), StatusCode::NOT_FOUND);
        assert_eq!(
            RcError::ParamNotFound("fs".into()).context("sync").status(fallback),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RcError::ParamInvalid("bad".into()).status(StatusCode::FORBIDDEN),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RcError::AuthRequired("x".into()).status(StatusCode::FORBIDDEN),
            StatusCode::FORBIDDEN
        );
        assert_eq!(RcError::Operation("boom".into()).status(fallback), fallback);
    }

    #[test]
    fn test_storage_not_found_is_not_a_domain_not_found() {
        let err = RcError::from(object_store::Error::NotFound {
            path: "a".into(),
            source: "missing".into(),
        });
        assert_eq!(
            err.status(StatusCode::INTERNAL_SERVER_ERROR),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_reply_body() {
        let mut input = Params::new();
        input.insert("a".into(), "1".into());
        let reply = ErrorReply::new(
            "rc/fail",
            Some(input),
            RcError::DirNotFound.context("list"),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
        let response = reply.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], 404);
        assert_eq!(value["error"], "list: directory not found");
        assert_eq!(value["input"]["a"], "1");
        assert_eq!(value["path"], "rc/fail");
    }
}
