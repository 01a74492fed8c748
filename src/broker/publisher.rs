//! Publishing service requests onto the services exchange.
//!
//! The bridge depends on the [`RequestPublisher`] trait rather than on a
//! broker client, so tests can exercise the full request path with an
//! in-process transport.

use crate::error::GatewayError;
use crate::wire::RequestEnvelope;
use futures_util::future::BoxFuture;
use lapin::options::BasicPublishOptions;
use lapin::{BasicProperties, Channel};
use tracing::debug;

/// Seam between the bridge and the broker client.
pub trait RequestPublisher: Send + Sync {
    /// Publish `envelope` with the given routing key, stamping the broker
    /// message properties with `correlation_id` and `reply_to`.
    ///
    /// Not cancellable once the broker has accepted the message.
    fn publish<'a>(
        &'a self,
        routing_key: &'a str,
        correlation_id: &'a str,
        reply_to: &'a str,
        envelope: &'a RequestEnvelope,
    ) -> BoxFuture<'a, Result<(), GatewayError>>;
}

/// Production publisher backed by a lapin channel.
pub struct AmqpPublisher {
    channel: Channel,
    exchange: String,
}

impl AmqpPublisher {
    pub fn new(channel: Channel, exchange: String) -> Self {
        Self { channel, exchange }
    }
}

impl RequestPublisher for AmqpPublisher {
    fn publish<'a>(
        &'a self,
        routing_key: &'a str,
        correlation_id: &'a str,
        reply_to: &'a str,
        envelope: &'a RequestEnvelope,
    ) -> BoxFuture<'a, Result<(), GatewayError>> {
        Box::pin(async move {
            let payload = serde_json::to_vec(envelope)
                .map_err(|e| GatewayError::Internal(format!("envelope encoding failed: {}", e)))?;

            let properties = BasicProperties::default()
                .with_content_type("application/json".into())
                .with_correlation_id(correlation_id.into())
                .with_reply_to(reply_to.into());

            let confirm = self
                .channel
                .basic_publish(
                    &self.exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    &payload,
                    properties,
                )
                .await
                .map_err(|e| GatewayError::BrokerUnavailable(e.to_string()))?;

            confirm
                .await
                .map_err(|e| GatewayError::BrokerUnavailable(e.to_string()))?;

            debug!(
                "broker: published request, routing_key={}, correlation_id={}, bytes={}",
                routing_key,
                correlation_id,
                payload.len()
            );
            Ok(())
        })
    }
}
