//! Permissive-by-default CORS: preflight short-circuit on the request phase,
//! header injection on the response phase.

use crate::config::CorsConfig;
use crate::proxy::context::{empty_body, BoxBody};
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;

const ALLOW_ORIGIN: HeaderName = HeaderName::from_static("access-control-allow-origin");
const ALLOW_METHODS: HeaderName = HeaderName::from_static("access-control-allow-methods");
const ALLOW_HEADERS: HeaderName = HeaderName::from_static("access-control-allow-headers");
const MAX_AGE: HeaderName = HeaderName::from_static("access-control-max-age");

/// Answer an OPTIONS preflight without touching the router.
pub fn preflight_response(config: &CorsConfig) -> hyper::Response<BoxBody> {
    let mut resp = hyper::Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(empty_body())
        .unwrap();
    apply_headers(config, resp.headers_mut());
    resp
}

/// Stamp the CORS policy onto an outgoing response.
pub fn apply_headers(config: &CorsConfig, headers: &mut http::HeaderMap) {
    insert(headers, ALLOW_ORIGIN, &config.allow_origin);
    insert(headers, ALLOW_METHODS, &config.allow_methods);
    insert(headers, ALLOW_HEADERS, &config.allow_headers);
    insert(headers, MAX_AGE, &config.max_age_secs.to_string());
}

fn insert(headers: &mut http::HeaderMap, name: HeaderName, value: &str) {
    if let Ok(v) = HeaderValue::from_str(value) {
        headers.insert(name, v);
    }
}
