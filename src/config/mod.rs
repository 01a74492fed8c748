pub mod types;


pub use types::*;

use anyhow::Result;
use std::path::Path;

impl GatewayConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides. When the file does not exist, built-in defaults
    /// are used so the gateway can start with zero configuration for local
    /// development — validation still requires a jwt secret.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: GatewayConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!("config file not found at {}, using defaults", path.display());
            GatewayConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        tracing::info!(
            routes = config.routes.len(),
            broker_enabled = config.broker.enabled,
            timeout_ms = config.request.timeout_ms,
            "loaded gateway configuration"
        );
        Ok(config)
    }

    /// Environment variable overrides for secrets and connection settings.
    /// The routing table is file-managed only.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GATEWAY_JWT_SECRET") {
            self.jwt.secret = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_JWT_EXPIRATION_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.jwt.expiration_ms = n;
            }
        }

        if let Ok(v) = std::env::var("GATEWAY_BROKER_ENABLED") {
            self.broker.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("GATEWAY_BROKER_URI") {
            self.broker.uri = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_BROKER_SERVICES_EXCHANGE") {
            self.broker.services_exchange = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_BROKER_REPLY_QUEUE_PREFIX") {
            self.broker.reply_queue_prefix = v;
        }

        if let Ok(v) = std::env::var("GATEWAY_REQUEST_TIMEOUT_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.request.timeout_ms = n;
            }
        }
        if let Ok(v) = std::env::var("GATEWAY_REQUEST_MAX_BODY_BYTES") {
            if let Ok(n) = v.parse::<u64>() {
                self.request.max_body_bytes = n;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt.secret.is_empty() {
            anyhow::bail!("jwt.secret is required (config file or GATEWAY_JWT_SECRET)");
        }
        if self.jwt.secret.len() < 32 {
            anyhow::bail!(
                "jwt.secret must be at least 32 bytes, got {}",
                self.jwt.secret.len()
            );
        }
        if self.jwt.expiration_ms == 0 {
            anyhow::bail!("jwt.expiration_ms is required and must be positive");
        }

        if self.request.timeout_ms == 0 {
            anyhow::bail!("request.timeout_ms must be positive");
        }
        if self.request.max_body_bytes == 0 {
            anyhow::bail!("request.max_body_bytes must be positive");
        }

        if self.broker.services_exchange.is_empty() {
            anyhow::bail!("broker.services_exchange must not be empty");
        }
        if self.broker.reply_queue_prefix.is_empty() {
            anyhow::bail!("broker.reply_queue_prefix must not be empty");
        }
        if self.broker.consumer_workers == 0 {
            anyhow::bail!("broker.consumer_workers must be at least 1");
        }

        let mut seen = std::collections::HashSet::new();
        for route in &self.routes {
            if !route.prefix.starts_with('/') {
                anyhow::bail!("route prefix '{}' must start with '/'", route.prefix);
            }
            if route.routing_key.is_empty() {
                anyhow::bail!("route '{}' has an empty routing key", route.prefix);
            }
            if !seen.insert(route.prefix.as_str()) {
                anyhow::bail!("duplicate route prefix '{}'", route.prefix);
            }
        }
        Ok(())
    }
}
