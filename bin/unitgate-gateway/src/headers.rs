//! Header extraction for the invocation context

use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use http::{HeaderMap, Method, request};
use std::collections::BTreeMap;
use unitgate_client::canonical_header_name;

/// Prefix of headers carrying object-level metadata on a write
const OBJECT_HEADER_PREFIX: &str = "x-object";

/// Headers handed to the sandbox alongside the request headers
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectHeaders {
    pub headers: BTreeMap<String, String>,
    /// Provenance of a write, `<METHOD> <scheme>://<host><path>`
    pub referer: Option<String>,
}

/// Flatten a header map, joining repeated names with `", "`
pub fn flatten(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        flat.entry(canonical_header_name(name.as_str()))
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    flat
}

/// Select the object headers for a request/response pair
///
/// A read passes the upstream response headers through. A write passes
/// `Content-Length`, `Content-Type` and every `X-Object*` header of the
/// request and records where the write came from. Anything else carries
/// no object headers.
pub fn extract(request: &request::Parts, response: Option<&HeaderMap>) -> ObjectHeaders {
    match request.method {
        Method::GET => ObjectHeaders {
            headers: response.map(flatten).unwrap_or_default(),
            referer: None,
        },
        Method::PUT => ObjectHeaders {
            headers: flatten(&request.headers)
                .into_iter()
                .filter(|(name, _)| is_object_header(name))
                .collect(),
            referer: Some(referer(request)),
        },
        _ => ObjectHeaders::default(),
    }
}

fn is_object_header(name: &str) -> bool {
    name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str())
        || name.eq_ignore_ascii_case(CONTENT_TYPE.as_str())
        || name
            .get(..OBJECT_HEADER_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(OBJECT_HEADER_PREFIX))
}

fn referer(request: &request::Parts) -> String {
    let scheme = request.uri.scheme_str().unwrap_or("http");
    let host = request
        .uri
        .authority()
        .map(|a| a.as_str().to_string())
        .or_else(|| {
            request
                .headers
                .get(HOST)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default();
    format!("{} {}://{}{}", request.method, scheme, host, request.uri.path())
}
