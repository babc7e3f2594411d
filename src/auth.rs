//! Authorization checks
//!
//! Two independent layers:
//! - the per-operation gate (`auth_denied`): operations flagged
//!   `auth_required` only run when the listener has auth set up, unless
//!   `no_auth` overrides it
//! - HTTP basic auth on the listener when credentials are configured

use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use tracing::warn;

use crate::config::RcConfig;
use crate::errors::{ErrorReply, RcError};

/// True if the call must be refused for lack of auth
pub fn auth_denied(opts: &RcConfig, auth_required: bool) -> bool {
    auth_required && !opts.no_auth && !opts.using_auth()
}

/// Check an `Authorization` header value against the configured credentials
fn credentials_match(opts: &RcConfig, header_value: &str) -> bool {
    let Some(encoded) = header_value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((user, pass)) = decoded.split_once(':') else {
        return false;
    };
    let user_ok = constant_time_eq(user.as_bytes(), opts.user.as_deref().unwrap_or_default().as_bytes());
    let pass_ok = constant_time_eq(pass.as_bytes(), opts.pass.as_deref().unwrap_or_default().as_bytes());
    user_ok & pass_ok
}

/// Byte comparison whose running time doesn't depend on where inputs differ
fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (lhs, rhs) in left.iter().zip(right.iter()) {
        diff |= lhs ^ rhs;
    }
    diff == 0
}

/// Basic auth middleware
///
/// A no-op unless credentials are configured. OPTIONS preflights pass
/// through since browsers never send credentials on them.
pub async fn basic_auth(State(opts): State<Arc<RcConfig>>, request: Request, next: Next) -> Response {
    if !opts.using_auth() || request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| credentials_match(&opts, v))
        .unwrap_or(false);
    if authorized {
        return next.run(request).await;
    }

    let path = request.uri().path().trim_start_matches('/').to_string();
    warn!(path = %path, "rc: rejected request without valid credentials");
    let mut response =
        ErrorReply::new(path, None, RcError::Unauthorized, StatusCode::UNAUTHORIZED).into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        header::HeaderValue::from_static("Basic realm=\"rc\""),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(no_auth: bool, user: Option<&str>) -> RcConfig {
        RcConfig {
            no_auth,
            user: user.map(str::to_string),
            pass: user.map(|_| "secret".to_string()),
            ..RcConfig::default()
        }
    }

    #[test]
    fn test_auth_gate_truth_table() {
        // only denied when required, not overridden and no auth configured
        assert!(auth_denied(&opts(false, None), true));
        assert!(!auth_denied(&opts(true, None), true));
        assert!(!auth_denied(&opts(false, Some("admin")), true));
        assert!(!auth_denied(&opts(false, None), false));
        assert!(!auth_denied(&opts(true, Some("admin")), false));
    }

    #[test]
    fn test_credentials_match() {
        let opts = opts(false, Some("admin"));
        let good = format!("Basic {}", BASE64.encode("admin:secret"));
        let bad = format!("Basic {}", BASE64.encode("admin:wrong"));
        assert!(credentials_match(&opts, &good));
        assert!(!credentials_match(&opts, &bad));
        assert!(!credentials_match(&opts, "Bearer token"));
        assert!(!credentials_match(&opts, "Basic !!!"));
        let prefix = format!("Basic {}", BASE64.encode("admin:secre"));
        assert!(!credentials_match(&opts, &prefix));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(constant_time_eq(b"", b""));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret!"));
        assert!(!constant_time_eq(b"", b"x"));
    }
}
