//! Request parameter decoding for POST calls
//!
//! The content type picks one decoding strategy; each yields the same
//! `Params` map:
//! - `application/x-www-form-urlencoded`: query values, overridden by form body values
//! - `application/json`: query values, overridden by the keys of a JSON object body
//! - anything else: query values only, the body is ignored

use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::errors::RcError;
use crate::rc::Params;

/// How a POST body is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Form,
    Json,
    QueryOnly,
}

impl BodyEncoding {
    /// Pick the strategy from a `Content-Type` header value
    ///
    /// Parameters such as `charset` are ignored; an unparsable value is
    /// treated like a missing one.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(mime) = content_type.and_then(|ct| ct.parse::<mime::Mime>().ok()) else {
            return BodyEncoding::QueryOnly;
        };
        if mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
            BodyEncoding::Form
        } else if mime.essence_str() == mime::APPLICATION_JSON.essence_str() {
            BodyEncoding::Json
        } else {
            BodyEncoding::QueryOnly
        }
    }
}

/// Decoding failure, with whatever input had been decoded so far
#[derive(Debug)]
pub struct DecodeError {
    pub input: Option<Params>,
    pub error: RcError,
}

/// Decode query string and body into one parameter map
pub fn decode_params(
    query: Option<&str>,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Params, DecodeError> {
    let query = query.unwrap_or_default().as_bytes();

    match BodyEncoding::from_content_type(content_type) {
        BodyEncoding::QueryOnly => Ok(parse_form(query)),
        BodyEncoding::Form => {
            for data in [query, body] {
                check_form_encoding(data).map_err(|e| DecodeError {
                    input: None,
                    error: RcError::BadForm(e),
                })?;
            }
            let mut params = parse_form(query);
            params.extend(parse_form(body).into_inner());
            Ok(params)
        }
        BodyEncoding::Json => {
            let mut params = parse_form(query);
            match serde_json::from_slice::<Map<String, Value>>(body) {
                Ok(object) => {
                    params.extend(object);
                    Ok(params)
                }
                Err(e) => Err(DecodeError {
                    input: Some(params),
                    error: RcError::BadJson(e),
                }),
            }
        }
    }
}

/// Parse `k=v&k=v` data; the last value of a repeated key wins
fn parse_form(data: &[u8]) -> Params {
    form_urlencoded::parse(data)
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

/// Reject malformed percent escapes and non UTF-8 data
///
/// `form_urlencoded::parse` is lossy, so this runs first to turn bad input
/// into an error instead of silently mangled values.
fn check_form_encoding(data: &[u8]) -> Result<(), String> {
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'%' {
            let escape = data.get(i + 1..i + 3);
            match escape {
                Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => i += 3,
                _ => {
                    let end = (i + 3).min(data.len());
                    return Err(format!(
                        "invalid URL escape {:?}",
                        String::from_utf8_lossy(&data[i..end])
                    ));
                }
            }
        } else {
            i += 1;
        }
    }
    let decoded = urlencoding::decode_binary(data);
    std::str::from_utf8(&decoded)
        .map(|_| ())
        .map_err(|e| format!("invalid UTF-8: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FORM: &str = "application/x-www-form-urlencoded";

    #[test]
    fn test_encoding_selection() {
        assert_eq!(BodyEncoding::from_content_type(Some(FORM)), BodyEncoding::Form);
        assert_eq!(
            BodyEncoding::from_content_type(Some("application/json; charset=utf-8")),
            BodyEncoding::Json
        );
        assert_eq!(BodyEncoding::from_content_type(Some("text/plain")), BodyEncoding::QueryOnly);
        assert_eq!(BodyEncoding::from_content_type(Some("%%%")), BodyEncoding::QueryOnly);
        assert_eq!(BodyEncoding::from_content_type(None), BodyEncoding::QueryOnly);
    }

    #[test]
    fn test_query_last_value_wins() {
        let params = decode_params(Some("a=1&b=x%20y&a=2"), None, b"ignored=1").unwrap();
        assert_eq!(params.get_string("a").unwrap(), "2");
        assert_eq!(params.get_string("b").unwrap(), "x y");
        assert!(params.get("ignored").is_none());
    }

    #[test]
    fn test_form_body_overrides_query() {
        let params = decode_params(Some("a=query&q=only"), Some(FORM), b"a=body&b=2").unwrap();
        assert_eq!(params.get_string("a").unwrap(), "body");
        assert_eq!(params.get_string("q").unwrap(), "only");
        assert_eq!(params.get_string("b").unwrap(), "2");
    }

    #[test]
    fn test_malformed_form() {
        let err = decode_params(None, Some(FORM), b"a=%zz").unwrap_err();
        assert!(err.input.is_none());
        assert!(matches!(err.error, RcError::BadForm(_)));

        let err = decode_params(Some("x=%4"), Some(FORM), b"").unwrap_err();
        assert!(matches!(err.error, RcError::BadForm(_)));

        let err = decode_params(None, Some(FORM), b"a=%ff").unwrap_err();
        assert!(matches!(err.error, RcError::BadForm(_)));
    }

    #[test]
    fn test_json_merges_over_query() {
        let params = decode_params(
            Some("a=query&keep=1"),
            Some("application/json"),
            br#"{"a": {"nested": true}, "n": 5}"#,
        )
        .unwrap();
        assert_eq!(params["a"], json!({"nested": true}));
        assert_eq!(params["n"], json!(5));
        assert_eq!(params["keep"], json!("1"));
    }

    #[test]
    fn test_malformed_json_keeps_query_input() {
        let err = decode_params(Some("a=1"), Some("application/json"), b"{not json").unwrap_err();
        assert!(matches!(err.error, RcError::BadJson(_)));
        assert_eq!(err.input.unwrap().get_string("a").unwrap(), "1");

        let err = decode_params(None, Some("application/json"), b"[1, 2]").unwrap_err();
        assert!(matches!(err.error, RcError::BadJson(_)));
    }
}
