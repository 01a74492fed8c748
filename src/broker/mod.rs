//! Broker connectivity: one AMQP connection, the services exchange, and the
//! instance-unique reply queue.

pub mod listener;
pub mod publisher;

pub use publisher::{AmqpPublisher, RequestPublisher};

use crate::config::BrokerConfig;
use anyhow::{Context, Result};
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::info;

/// Reply queue name for one gateway instance: `<prefix>.<instance>.reply`.
///
/// Replicas must not share a reply queue — a shared queue would let one
/// replica steal another's replies.
pub fn reply_queue_name(prefix: &str, instance_id: &str) -> String {
    format!("{}.{}.reply", prefix, instance_id)
}

/// Live broker handle: the connection, a publish channel, and the declared
/// topology names.
pub struct Broker {
    connection: Connection,
    channel: Channel,
    pub services_exchange: String,
    pub reply_queue: String,
}

impl Broker {
    /// Connect and declare the topology: a durable direct exchange for
    /// service requests and a transient, auto-deleted reply queue bound to
    /// it with the queue's own name as routing key.
    pub async fn connect(config: &BrokerConfig, instance_id: &str) -> Result<Self> {
        let connection = Connection::connect(&config.uri, ConnectionProperties::default())
            .await
            .with_context(|| format!("failed to connect to broker at {}", config.uri))?;
        info!("broker: connected, uri={}", config.uri);

        let channel = connection
            .create_channel()
            .await
            .context("failed to open publish channel")?;

        channel
            .exchange_declare(
                &config.services_exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("failed to declare exchange {}", config.services_exchange))?;

        let reply_queue = reply_queue_name(&config.reply_queue_prefix, instance_id);
        channel
            .queue_declare(
                &reply_queue,
                QueueDeclareOptions {
                    durable: false,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("failed to declare reply queue {}", reply_queue))?;

        channel
            .queue_bind(
                &reply_queue,
                &config.services_exchange,
                &reply_queue,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("failed to bind reply queue")?;

        info!(
            "broker: topology ready, exchange={}, reply_queue={}",
            config.services_exchange, reply_queue
        );

        Ok(Self {
            connection,
            channel,
            services_exchange: config.services_exchange.clone(),
            reply_queue,
        })
    }

    /// Publisher sharing this broker's publish channel.
    pub fn publisher(&self) -> AmqpPublisher {
        AmqpPublisher::new(self.channel.clone(), self.services_exchange.clone())
    }

    /// Open a dedicated channel (one per consumer worker).
    pub async fn create_channel(&self) -> Result<Channel> {
        self.connection
            .create_channel()
            .await
            .context("failed to open channel")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_queue_name_is_instance_unique() {
        assert_eq!(reply_queue_name("gateway", "a1b2c3d4"), "gateway.a1b2c3d4.reply");
        assert_ne!(
            reply_queue_name("gateway", "one"),
            reply_queue_name("gateway", "two")
        );
    }
}
