//! Remote browser: listings and object downloads for `[remote]path` URLs

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use object_store::ObjectMeta;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::errors::{json_response, ErrorReply, RcError, ResultExt};
use crate::metrics;
use crate::routes::AppState;

/// One link in a rendered listing
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub remote: String,
    pub is_dir: bool,
    pub href: String,
    #[serde(skip)]
    pub leaf: String,
}

/// A navigable directory listing
#[derive(Debug, Serialize)]
pub struct Directory {
    pub path: String,
    pub title: String,
    pub entries: Vec<Entry>,
}

impl Directory {
    pub fn new(path: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            entries: Vec::new(),
        }
    }

    /// Add an entry; `href` is the absolute, already encoded link
    pub fn add_entry(&mut self, remote: &str, is_dir: bool, href: String) {
        let leaf = remote.rsplit('/').next().unwrap_or(remote);
        let leaf = if is_dir { format!("{}/", leaf) } else { leaf.to_string() };
        self.entries.push(Entry {
            remote: remote.to_string(),
            is_dir,
            href,
            leaf,
        });
    }

    pub fn to_html(&self) -> String {
        let title = html_escape::encode_text(&self.title);
        let mut html = format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n<ul>\n"
        );
        for entry in &self.entries {
            html.push_str(&format!(
                "<li><a href=\"{}\">{}</a></li>\n",
                html_escape::encode_double_quoted_attribute(&entry.href),
                html_escape::encode_text(&entry.leaf),
            ));
        }
        html.push_str("</ul>\n</body>\n</html>\n");
        html
    }

    /// Render as JSON if the client asked for it, HTML otherwise
    pub fn render(self, headers: &HeaderMap) -> Response {
        let wants_json = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("application/json"))
            .unwrap_or(false);
        if wants_json {
            json_response(StatusCode::OK, &self)
        } else {
            Html(self.to_html()).into_response()
        }
    }
}

/// Percent-encode each segment of a `/` separated path
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// URL of the root of a remote
fn remote_href(name: &str) -> String {
    format!("/{}/", urlencoding::encode(&format!("[{}]", name)))
}

/// List every addressable remote as a synthetic directory
#[instrument(skip(state, headers))]
pub async fn serve_root(state: &AppState, headers: &HeaderMap) -> Response {
    let mut directory = Directory::new("", "List of all remotes.");
    for name in state.remotes.names().await {
        directory.add_entry(&format!("[{}]", name), true, remote_href(&name));
    }
    metrics::BROWSE_OPERATIONS.with_label_values(&["root", "200"]).inc();
    directory.render(headers)
}

/// Serve a listing or an object from remote `name`
#[instrument(skip(state, request))]
pub async fn serve_remote(state: &AppState, name: &str, path: &str, request: &Parts) -> Response {
    let backend = match state.remotes.get(name).await {
        Ok(backend) => backend,
        Err(e) => {
            return browse_error("remote", path, e.context("failed to make backend"));
        }
    };

    if path.is_empty() || path.ends_with('/') {
        let dir = path.trim_matches('/');
        let entries = match backend.list_dir(dir).await.context("failed to list directory") {
            Ok(entries) => entries,
            Err(e) => return browse_error("list", dir, e),
        };
        debug!(remote = name, dir, count = entries.len(), "rc: listing directory");

        let mut directory = Directory::new(dir, format!("Directory listing of /{}", dir));
        for entry in &entries {
            let mut href = format!("{}{}", remote_href(name), encode_path(&entry.remote));
            if entry.is_dir {
                href.push('/');
            }
            directory.add_entry(&entry.remote, entry.is_dir, href);
        }
        metrics::BROWSE_OPERATIONS.with_label_values(&["list", "200"]).inc();
        directory.render(&request.headers)
    } else {
        let path = path.trim_matches('/');
        let response = if request.method == Method::HEAD {
            backend
                .head(path)
                .await
                .context("failed to find object")
                .map(|meta| object_response(&meta, Body::empty()))
        } else {
            backend
                .open(path)
                .await
                .context("failed to find object")
                .map(|result| {
                    let meta = result.meta.clone();
                    object_response(&meta, Body::from_stream(result.into_stream()))
                })
        };
        match response {
            Ok(response) => {
                metrics::BROWSE_OPERATIONS.with_label_values(&["object", "200"]).inc();
                response
            }
            Err(e) => browse_error("object", path, e),
        }
    }
}

/// Response headers for an object, content streamed from `body`
fn object_response(meta: &ObjectMeta, body: Body) -> Response {
    let content_type = mime_guess::from_path(meta.location.as_ref()).first_or_octet_stream();
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CONTENT_LENGTH, meta.size)
        .header(
            header::LAST_MODIFIED,
            meta.last_modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );
    if let Some(etag) = &meta.e_tag {
        builder = builder.header(header::ETAG, etag.as_str());
    }
    builder.body(body).unwrap_or_else(|e| {
        browse_error("object", meta.location.as_ref(), RcError::Operation(format!("failed to build response: {}", e)))
    })
}

fn browse_error(operation: &str, path: &str, error: RcError) -> Response {
    let reply = ErrorReply::new(path, None, error, StatusCode::INTERNAL_SERVER_ERROR);
    metrics::BROWSE_OPERATIONS
        .with_label_values(&[operation, reply.status.as_str()])
        .inc();
    reply.into_response()
}
