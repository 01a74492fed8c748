pub mod cors;

use crate::auth::{self, TokenVerifier};
use crate::config::CorsConfig;
use crate::error::GatewayError;
use crate::proxy::context::{BoxBody, RequestContext};
use std::sync::Arc;
use tracing::debug;

/// Result of a filter's on_request phase.
pub enum FilterResult {
    /// Continue to the next filter / phase.
    Continue,
    /// Short-circuit: return this response immediately.
    Reject(hyper::Response<BoxBody>),
}

/// Enum-based filter — static dispatch, exhaustive match, zero heap
/// allocation. Filters are built once at startup, NOT per-request.
///
/// Order matters (smaller index runs first):
/// 1. Cors — answer preflights before anything else sees them
/// 2. Auth — attach the principal / reject protected paths
pub enum Filter {
    Cors { config: CorsConfig },
    Auth { verifier: Arc<TokenVerifier> },
}

impl Filter {
    /// Request phase — runs before routing. Return `Reject` to short-circuit.
    pub fn on_request(
        &self,
        ctx: &mut RequestContext,
        headers: &http::HeaderMap,
    ) -> FilterResult {
        match self {
            Filter::Cors { config } => {
                if ctx.method == "OPTIONS" {
                    return FilterResult::Reject(cors::preflight_response(config));
                }
                FilterResult::Continue
            }
            Filter::Auth { verifier } => auth_on_request(verifier, ctx, headers),
        }
    }

    /// Response phase — runs after the bridge, in reverse order.
    pub fn on_response(&self, _ctx: &RequestContext, resp: &mut hyper::Response<BoxBody>) {
        match self {
            Filter::Cors { config } => cors::apply_headers(config, resp.headers_mut()),
            Filter::Auth { .. } => {}
        }
    }
}

/// Build the filter chain once at startup.
pub fn build_filters(cors: CorsConfig, verifier: Arc<TokenVerifier>) -> Vec<Filter> {
    vec![Filter::Cors { config: cors }, Filter::Auth { verifier }]
}

fn auth_on_request(
    verifier: &TokenVerifier,
    ctx: &mut RequestContext,
    headers: &http::HeaderMap,
) -> FilterResult {
    let token = auth::bearer_token(
        headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    );

    // A valid token attaches identity regardless of path; an invalid one is
    // ignored and the path policy below decides.
    if let Some(token) = token {
        if verifier.validate(token) {
            match verifier.authenticate(token) {
                Ok(principal) => ctx.principal = Some(principal),
                Err(e) => {
                    debug!("auth: claim extraction failed, error={}", e);
                }
            }
        } else {
            debug!("auth: token rejected, path={}", ctx.uri_path);
        }
    }

    if ctx.principal.is_none() && !auth::is_permitted(&ctx.uri_path) {
        return FilterResult::Reject(ctx.error_response(&GatewayError::Unauthorized));
    }
    FilterResult::Continue
}
