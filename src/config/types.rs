use serde::{Deserialize, Serialize};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Broker connection and topology settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Bearer-token verification settings.
    #[serde(default)]
    pub jwt: JwtConfig,

    /// Per-request bounds.
    #[serde(default)]
    pub request: RequestConfig,

    /// Cross-origin policy applied to every response.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Path prefix → routing key table. The single source of routing policy.
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            jwt: JwtConfig::default(),
            request: RequestConfig::default(),
            cors: CorsConfig::default(),
            routes: default_routes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Master switch: with `false` the HTTP surface stays up but every
    /// broker-backed route fails fast with 503.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// AMQP connection URI.
    #[serde(default = "default_broker_uri")]
    pub uri: String,

    /// Direct exchange all service requests are published to.
    #[serde(default = "default_services_exchange")]
    pub services_exchange: String,

    /// Prefix of the per-instance reply queue. The effective queue name is
    /// `<prefix>.<instance-id>.reply` so replicas never steal each other's
    /// replies.
    #[serde(default = "default_reply_queue_prefix")]
    pub reply_queue_prefix: String,

    /// Number of reply-consumer workers draining the reply queue.
    #[serde(default = "default_consumer_workers")]
    pub consumer_workers: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            uri: default_broker_uri(),
            services_exchange: default_services_exchange(),
            reply_queue_prefix: default_reply_queue_prefix(),
            consumer_workers: default_consumer_workers(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HMAC-SHA256 shared secret, UTF-8, at least 32 bytes. Required.
    #[serde(default)]
    pub secret: String,

    /// Expiry for tokens the gateway signs itself (milliseconds). Required.
    #[serde(default)]
    pub expiration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Deadline for the broker round-trip (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Largest request body the bridge will buffer.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// Ceiling on concurrently pending requests. 0 = unlimited.
    #[serde(default)]
    pub max_in_flight: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
            max_in_flight: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_cors_origin")]
    pub allow_origin: String,

    #[serde(default = "default_cors_methods")]
    pub allow_methods: String,

    #[serde(default = "default_cors_headers")]
    pub allow_headers: String,

    #[serde(default = "default_cors_max_age")]
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: default_cors_origin(),
            allow_methods: default_cors_methods(),
            allow_headers: default_cors_headers(),
            max_age_secs: default_cors_max_age(),
        }
    }
}

/// One routing table entry: requests whose path starts with `prefix` are
/// published with `routing_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub prefix: String,
    pub routing_key: String,
}

fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig {
            prefix: "/api/auth".to_string(),
            routing_key: "auth.request".to_string(),
        },
        RouteConfig {
            prefix: "/api/recipes".to_string(),
            routing_key: "recipe.request".to_string(),
        },
        RouteConfig {
            prefix: "/api/account".to_string(),
            routing_key: "account.request".to_string(),
        },
    ]
}

fn default_true() -> bool {
    true
}

fn default_broker_uri() -> String {
    "amqp://127.0.0.1:5672/%2f".to_string()
}

fn default_services_exchange() -> String {
    "services.exchange".to_string()
}

fn default_reply_queue_prefix() -> String {
    "gateway".to_string()
}

fn default_consumer_workers() -> usize {
    2
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_body_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_cors_origin() -> String {
    "*".to_string()
}

fn default_cors_methods() -> String {
    "GET, POST, PUT, DELETE, OPTIONS".to_string()
}

fn default_cors_headers() -> String {
    "*".to_string()
}

fn default_cors_max_age() -> u64 {
    3600
}
