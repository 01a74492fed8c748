use crate::error::GatewayError;
use crate::proxy::bridge;
use crate::proxy::context::{api_response, full_body, BoxBody, RequestContext};
use crate::proxy::filter::FilterResult;
use crate::server::GatewayState;
use crate::wire::ApiResponse;
use http::StatusCode;
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::net::SocketAddr;
use tracing::{debug, info, Instrument};

/// Handle an incoming HTTP request through a phased lifecycle:
///
/// 1. CORRELATION — reuse the inbound `correlationId` header or mint one;
///    the id is installed in the logging context for the whole exchange
/// 2. ACCESS_LOG — one line on entry, one on exit
/// 3. ON_REQUEST — filter chain (cors preflight, auth)
/// 4. LOCAL      — surfaces the gateway answers itself (health, metrics)
/// 5. ROUTE + BRIDGE — routing-key resolve, broker round-trip
/// 6. LOG        — finalize metrics
pub async fn handle_request(
    req: Request<Incoming>,
    state: GatewayState,
    peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let correlation_id = req
        .headers()
        .get("correlationid")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", correlation_id = %correlation_id);
    process(req, state, peer_addr, correlation_id)
        .instrument(span)
        .await
}

async fn process(
    req: Request<Incoming>,
    state: GatewayState,
    peer_addr: SocketAddr,
    correlation_id: String,
) -> Result<Response<BoxBody>, hyper::Error> {
    let uri_path = req.uri().path().to_string();
    let method = req.method().as_str().to_string();
    let req_headers = req.headers().clone();

    // The real client IP: trust an existing X-Forwarded-For left-most entry
    // if present, otherwise the TCP peer address.
    let client_ip = req_headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok())
        .unwrap_or_else(|| peer_addr.ip());

    let mut ctx = RequestContext::new(uri_path, method, correlation_id, client_ip);

    info!(
        client_ip = %ctx.client_ip,
        method = %ctx.method,
        path = %ctx.uri_path,
        "request start"
    );

    let mut resp = dispatch(req, &mut ctx, &state, &req_headers).await;

    // Response filters run in reverse order on every exit path.
    for filter in state.filters.iter().rev() {
        filter.on_response(&ctx, &mut resp);
    }

    let resp_status = resp.status().as_u16();
    ctx.finalize_metrics(resp_status);

    info!(
        client_ip = %ctx.client_ip,
        method = %ctx.method,
        path = %ctx.uri_path,
        status = resp_status,
        routing_key = %ctx.routing_key,
        elapsed_ms = ctx.start.elapsed().as_millis() as u64,
        "request complete"
    );

    Ok(resp)
}

async fn dispatch(
    req: Request<Incoming>,
    ctx: &mut RequestContext,
    state: &GatewayState,
    req_headers: &http::HeaderMap,
) -> Response<BoxBody> {
    for filter in state.filters.iter() {
        if let FilterResult::Reject(resp) = filter.on_request(ctx, req_headers) {
            return resp;
        }
    }

    match ctx.uri_path.as_str() {
        "/api/health" => return health_response(),
        "/actuator/prometheus" => return prometheus_response(state),
        _ => {}
    }

    let route = match state.routes.resolve(&ctx.uri_path) {
        Some(r) => r,
        None => {
            debug!("proxy: no route matched, path={}", ctx.uri_path);
            return ctx.error_response(&GatewayError::NoRouteMatch);
        }
    };
    ctx.routing_key = route.routing_key.clone();

    metrics::gauge!("gateway_http_requests_in_flight").increment(1.0);
    let resp = bridge::process(req, ctx, state, &route.routing_key).await;
    metrics::gauge!("gateway_http_requests_in_flight").decrement(1.0);
    resp
}

fn health_response() -> Response<BoxBody> {
    api_response(
        StatusCode::OK,
        &ApiResponse::ok(200, "OK", serde_json::json!({ "status": "UP" })),
    )
}

fn prometheus_response(state: &GatewayState) -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
        .body(full_body(state.metrics.render()))
        .unwrap()
}
