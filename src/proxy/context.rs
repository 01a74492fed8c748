use crate::error::GatewayError;
use crate::wire::{reason_phrase, ApiResponse};
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use std::net::IpAddr;
use std::time::Instant;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// Per-request context that flows through all phases: carries request
/// metadata and accumulates state across the filter chain.
pub struct RequestContext {
    pub uri_path: String,
    pub method: String,
    pub correlation_id: String,
    /// Routing key of the matched route; empty until ROUTE_MATCH.
    pub routing_key: String,
    /// The downstream client IP (from TCP peer or trusted X-Forwarded-For).
    pub client_ip: IpAddr,
    pub start: Instant,
    /// Identity attached by the auth filter, forwarded inside the envelope.
    pub principal: Option<crate::wire::Principal>,
}

impl RequestContext {
    pub fn new(uri_path: String, method: String, correlation_id: String, client_ip: IpAddr) -> Self {
        Self {
            uri_path,
            method,
            correlation_id,
            routing_key: String::new(),
            client_ip,
            start: Instant::now(),
            principal: None,
        }
    }

    /// Build the standard error envelope for a failure kind.
    pub fn error_response(&self, err: &GatewayError) -> hyper::Response<BoxBody> {
        let status = err.status();
        api_response(
            status,
            &ApiResponse::error(status.as_u16(), reason_phrase(status), err.to_string()),
        )
    }

    /// Record final request metrics. The single exit point for all paths —
    /// called exactly once per request.
    pub fn finalize_metrics(&self, resp_status: u16) {
        let mut buf = itoa::Buffer::new();
        let status_str = buf.format(resp_status);

        metrics::counter!(
            "gateway_http_requests_total",
            "routing_key" => self.routing_key.clone(),
            "method" => self.method.clone(),
            "status_code" => status_str.to_owned(),
        )
        .increment(1);

        metrics::histogram!(
            "gateway_http_request_duration_seconds",
            "routing_key" => self.routing_key.clone(),
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}

/// Serialise an [`ApiResponse`] onto the HTTP exchange.
pub fn api_response(status: StatusCode, body: &ApiResponse) -> hyper::Response<BoxBody> {
    let payload = serde_json::to_vec(body).unwrap_or_else(|_| {
        // The envelope is plain data; serialisation cannot fail in practice.
        br#"{"status":500,"message":"Internal Server Error","data":null,"error":{"code":"ERR_500","detail":"encoding failure"}}"#.to_vec()
    });
    hyper::Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(payload))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ctx() -> RequestContext {
        RequestContext::new(
            "/api/recipes/1".to_string(),
            "GET".to_string(),
            "cid-1".to_string(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        )
    }

    #[tokio::test]
    async fn error_response_carries_the_envelope() {
        let resp = ctx().error_response(&GatewayError::UpstreamTimeout);
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/json"
        );

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], 504);
        assert_eq!(json["message"], "Gateway Timeout");
        assert_eq!(json["error"]["code"], "ERR_504");
        assert_eq!(json["error"]["detail"], "upstream timeout");
        assert!(json["data"].is_null());
    }

    #[tokio::test]
    async fn not_found_envelope() {
        let resp = ctx().error_response(&GatewayError::NoRouteMatch);
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "ERR_404");
    }
}
