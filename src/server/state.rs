use crate::auth::TokenVerifier;
use crate::broker::RequestPublisher;
use crate::config::GatewayConfig;
use crate::correlation::CorrelationRegistry;
use crate::metrics::Metrics;
use crate::proxy::filter::{build_filters, Filter};
use crate::routing::RouteTable;
use anyhow::Result;
use std::sync::Arc;

/// Shared gateway state, cheaply cloneable.
///
/// Everything is constructed once at startup and passed in explicitly —
/// there is no ambient global. The correlation registry is the only
/// mutable structure on the hot path.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub metrics: Metrics,
    pub registry: Arc<CorrelationRegistry>,
    pub routes: Arc<RouteTable>,
    pub filters: Arc<Vec<Filter>>,
    /// `None` when the broker is disabled: broker-backed routes fail 503.
    pub publisher: Option<Arc<dyn RequestPublisher>>,
    /// Reply queue published as `replyTo` on every request.
    pub reply_queue: String,
    pub instance_id: String,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        metrics: Metrics,
        registry: Arc<CorrelationRegistry>,
        publisher: Option<Arc<dyn RequestPublisher>>,
        reply_queue: String,
        instance_id: String,
    ) -> Result<Self> {
        let verifier = Arc::new(TokenVerifier::new(
            &config.jwt.secret,
            config.jwt.expiration_ms,
        )?);
        let routes = Arc::new(RouteTable::new(&config.routes));
        let filters = Arc::new(build_filters(config.cors.clone(), verifier));

        Ok(Self {
            config: Arc::new(config),
            metrics,
            registry,
            routes,
            filters,
            publisher,
            reply_queue,
            instance_id,
        })
    }
}
