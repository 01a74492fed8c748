//! The HTTP↔Broker bridge: turns one HTTP exchange into one broker
//! round-trip and the correlated reply back into an HTTP response.

use crate::correlation::{RegisterError, ReplyOutcome};
use crate::error::GatewayError;
use crate::proxy::context::{api_response, BoxBody, RequestContext};
use crate::server::GatewayState;
use crate::wire::{reason_phrase, ApiResponse, Method, RequestEnvelope, ResponseEnvelope};
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::Request;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Content types whose bodies are never logged.
const UNLOGGED_CONTENT_TYPES: &[&str] = &[
    "multipart/form-data",
    "application/octet-stream",
    "application/pdf",
];
const UNLOGGED_CONTENT_PREFIXES: &[&str] = &["image/", "video/", "audio/"];

/// Bridge one request through the broker:
///
/// 1. BUFFER  — read the full body (bounded; 413 over the limit)
/// 2. ENVELOPE — headers joined, query collapsed, principal attached
/// 3. REGISTER — pending slot keyed by the request's correlation id
/// 4. PUBLISH — services exchange, routing key of the matched route
/// 5. AWAIT   — reply, deadline, or cancellation; slot always released
/// 6. ENCODE  — reply envelope → `ApiResponse` on the HTTP exchange
pub async fn process(
    req: Request<Incoming>,
    ctx: &mut RequestContext,
    state: &GatewayState,
    routing_key: &str,
) -> hyper::Response<BoxBody> {
    let method = match Method::from_http(req.method()) {
        Some(m) => m,
        None => {
            return ctx.error_response(&GatewayError::BadRequest(format!(
                "unsupported method {}",
                req.method()
            )))
        }
    };

    let (parts, body) = req.into_parts();
    let max_bytes = state.config.request.max_body_bytes;

    // Reject early on a declared oversize body before buffering anything.
    if let Some(cl) = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        if cl > max_bytes {
            debug!(
                "bridge: declared body too large, content_length={}, max={}",
                cl, max_bytes
            );
            return ctx.error_response(&GatewayError::PayloadTooLarge);
        }
    }

    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("bridge: failed to read request body, error={}", e);
            return ctx.error_response(&GatewayError::BadRequest("body read failed".to_string()));
        }
    };
    // Catches chunked requests that never declared a Content-Length.
    if bytes.len() as u64 > max_bytes {
        debug!(
            "bridge: buffered body too large, size={}, max={}",
            bytes.len(),
            max_bytes
        );
        return ctx.error_response(&GatewayError::PayloadTooLarge);
    }

    let body_str = String::from_utf8_lossy(&bytes).into_owned();
    if !body_str.is_empty() && should_log_body(&parts.headers) {
        debug!("bridge: request body: {}", body_str);
    }

    let envelope = build_envelope(&parts, ctx, method, body_str);

    let publisher = match &state.publisher {
        Some(p) => p,
        None => {
            return ctx.error_response(&GatewayError::BrokerUnavailable(
                "broker disabled".to_string(),
            ))
        }
    };

    let deadline =
        tokio::time::Instant::now() + Duration::from_millis(state.config.request.timeout_ms);
    let slot = match state.registry.register(&ctx.correlation_id, deadline) {
        Ok(slot) => slot,
        Err(RegisterError::DuplicateCorrelation) => {
            let err = GatewayError::DuplicateCorrelation(ctx.correlation_id.clone());
            warn!("bridge: {}", err);
            return ctx.error_response(&err);
        }
        Err(RegisterError::RegistryFull) => {
            metrics::counter!("gateway_registry_full_total").increment(1);
            return ctx.error_response(&GatewayError::RegistryFull);
        }
    };

    if let Err(e) = publisher
        .publish(routing_key, &ctx.correlation_id, &state.reply_queue, &envelope)
        .await
    {
        metrics::counter!(
            "gateway_publish_failures_total",
            "routing_key" => routing_key.to_string(),
        )
        .increment(1);
        warn!("bridge: publish failed, routing_key={}, error={}", routing_key, e);
        // The slot is released here: a request that never reached the broker
        // must not linger in the registry.
        drop(slot);
        return ctx.error_response(&e);
    }

    match slot.await_reply().await {
        ReplyOutcome::Completed(reply) => encode_response(reply),
        ReplyOutcome::TimedOut => {
            metrics::counter!(
                "gateway_upstream_timeouts_total",
                "routing_key" => routing_key.to_string(),
            )
            .increment(1);
            warn!(
                "bridge: upstream timeout, routing_key={}, timeout_ms={}",
                routing_key, state.config.request.timeout_ms
            );
            ctx.error_response(&GatewayError::UpstreamTimeout)
        }
    }
}

/// Build the broker envelope from the buffered HTTP request.
fn build_envelope(
    parts: &http::request::Parts,
    ctx: &RequestContext,
    method: Method,
    body: String,
) -> RequestEnvelope {
    let mut headers = BTreeMap::new();
    for name in parts.headers.keys() {
        let joined = parts
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");
        headers.insert(name.as_str().to_string(), joined);
    }

    RequestEnvelope {
        path: parts.uri.path().to_string(),
        method,
        headers,
        query_params: parse_query(parts.uri.query()),
        body,
        principal: ctx.principal.clone(),
    }
}

/// Collapse the query string to first-value-wins pairs.
fn parse_query(query: Option<&str>) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    if let Some(query) = query {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k, v),
                None => (pair, ""),
            };
            params
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    params
}

fn should_log_body(headers: &http::HeaderMap) -> bool {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    !(UNLOGGED_CONTENT_TYPES.iter().any(|t| content_type.contains(t))
        || UNLOGGED_CONTENT_PREFIXES
            .iter()
            .any(|p| content_type.starts_with(p)))
}

/// Translate a reply envelope into the HTTP response written to the client.
pub(crate) fn encode_response(reply: ResponseEnvelope) -> hyper::Response<BoxBody> {
    // Replies with status codes outside the HTTP range are clamped to 502.
    let status = match StatusCode::from_u16(reply.status_code) {
        Ok(s) if reply.status_code >= 100 && reply.status_code < 600 => s,
        _ => StatusCode::BAD_GATEWAY,
    };

    let api = wrap_reply_body(status, reply.body);
    let mut resp = api_response(status, &api);

    for (name, value) in &reply.headers {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            resp.headers_mut().insert(name, value);
        }
    }
    // `api_response` already defaults Content-Type to application/json; a
    // service-provided value above takes precedence.
    resp
}

/// Wrap the reply body per the standard envelope: 2xx embeds data (parsed
/// JSON when parseable, raw string otherwise), anything else mirrors the
/// status with the body as `error.detail`.
fn wrap_reply_body(status: StatusCode, body: String) -> ApiResponse {
    let message = reason_phrase(status);
    if status.is_success() {
        let data = serde_json::from_str::<serde_json::Value>(&body)
            .unwrap_or(serde_json::Value::String(body));
        ApiResponse::ok(status.as_u16(), message, data)
    } else {
        ApiResponse::error(status.as_u16(), message, body)
    }
}

/// Headers that apply to a single transport hop and must not be forwarded.
fn is_hop_by_hop(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    matches!(
        lower.as_str(),
        "connection" | "keep-alive" | "transfer-encoding" | "upgrade" | "te" | "trailer"
    ) || lower.starts_with("proxy-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn reply(status: u16, body: &str) -> ResponseEnvelope {
        ResponseEnvelope {
            correlation_id: "c".to_string(),
            status_code: status,
            headers: BTreeMap::new(),
            body: body.to_string(),
        }
    }

    async fn body_json(resp: hyper::Response<BoxBody>) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn success_reply_embeds_parsed_json() {
        let resp = encode_response(reply(200, r#"{"id":42,"name":"kimchi"}"#));
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], 200);
        assert_eq!(json["message"], "OK");
        assert_eq!(json["data"]["name"], "kimchi");
        assert!(json["error"].is_null());
    }

    #[tokio::test]
    async fn success_reply_with_plain_text_embeds_string() {
        let resp = encode_response(reply(200, "pong"));
        let json = body_json(resp).await;
        assert_eq!(json["data"], "pong");
    }

    #[tokio::test]
    async fn upstream_error_is_mirrored_with_detail() {
        let resp = encode_response(reply(404, "recipe not found"));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert!(json["data"].is_null());
        assert_eq!(json["error"]["code"], "ERR_404");
        assert_eq!(json["error"]["detail"], "recipe not found");
    }

    #[tokio::test]
    async fn invalid_status_is_clamped_to_502() {
        let resp = encode_response(reply(42, ""));
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(resp).await;
        assert_eq!(json["error"]["code"], "ERR_502");
    }

    #[tokio::test]
    async fn hop_by_hop_headers_are_never_forwarded() {
        let mut headers = BTreeMap::new();
        headers.insert("Connection".to_string(), "close".to_string());
        headers.insert("Keep-Alive".to_string(), "timeout=5".to_string());
        headers.insert("Transfer-Encoding".to_string(), "chunked".to_string());
        headers.insert("Upgrade".to_string(), "h2c".to_string());
        headers.insert("Proxy-Authenticate".to_string(), "Basic".to_string());
        headers.insert("TE".to_string(), "trailers".to_string());
        headers.insert("Trailer".to_string(), "Expires".to_string());
        headers.insert("X-Request-Cost".to_string(), "3ms".to_string());
        let resp = encode_response(ResponseEnvelope {
            correlation_id: "c".to_string(),
            status_code: 200,
            headers,
            body: "{}".to_string(),
        });

        assert_eq!(resp.headers().get("x-request-cost").unwrap(), "3ms");
        for hop in [
            "connection",
            "keep-alive",
            "transfer-encoding",
            "upgrade",
            "proxy-authenticate",
            "te",
            "trailer",
        ] {
            assert!(resp.headers().get(hop).is_none(), "{} leaked", hop);
        }
    }

    #[tokio::test]
    async fn content_type_defaults_to_json_and_upstream_value_wins() {
        let resp = encode_response(reply(200, "{}"));
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "application/json");

        let mut headers = BTreeMap::new();
        headers.insert(
            "Content-Type".to_string(),
            "application/json; charset=utf-8".to_string(),
        );
        let resp = encode_response(ResponseEnvelope {
            correlation_id: "c".to_string(),
            status_code: 200,
            headers,
            body: "{}".to_string(),
        });
        assert_eq!(
            resp.headers().get(CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
    }

    #[test]
    fn query_parsing_collapses_to_first_value() {
        let params = parse_query(Some("page=2&page=3&sort=name&flag"));
        assert_eq!(params.get("page").map(String::as_str), Some("2"));
        assert_eq!(params.get("sort").map(String::as_str), Some("name"));
        assert_eq!(params.get("flag").map(String::as_str), Some(""));
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn envelope_joins_multi_valued_headers() {
        let req = http::Request::builder()
            .method("GET")
            .uri("/api/recipes/42?tag=a")
            .header("accept", "application/json")
            .header("accept", "text/plain")
            .header("x-one", "1")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        let ctx = RequestContext::new(
            "/api/recipes/42".to_string(),
            "GET".to_string(),
            "cid".to_string(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        );
        let env = build_envelope(&parts, &ctx, Method::GET, String::new());
        assert_eq!(
            env.headers.get("accept").map(String::as_str),
            Some("application/json, text/plain")
        );
        assert_eq!(env.headers.get("x-one").map(String::as_str), Some("1"));
        assert_eq!(env.path, "/api/recipes/42");
        assert_eq!(env.query_params.get("tag").map(String::as_str), Some("a"));
        assert!(env.principal.is_none());
    }

    #[test]
    fn binary_content_types_are_not_logged() {
        let mut headers = http::HeaderMap::new();
        assert!(should_log_body(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(should_log_body(&headers));

        for ct in [
            "multipart/form-data; boundary=x",
            "application/octet-stream",
            "application/pdf",
            "image/png",
            "video/mp4",
            "audio/ogg",
        ] {
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
            assert!(!should_log_body(&headers), "{} should not be logged", ct);
        }
    }
}
