//! Reply listener: consumer workers draining the gateway's reply queue and
//! fanning deliveries out to the correlation registry.

use crate::correlation::{CompleteOutcome, CorrelationRegistry};
use crate::wire::ResponseEnvelope;
use anyhow::Result;
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::Channel;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use super::Broker;

/// Spawn `workers` consumer tasks on dedicated channels. Each worker owns
/// its consumer; the registry is the only shared state.
pub async fn spawn_listeners(
    broker: &Broker,
    registry: Arc<CorrelationRegistry>,
    workers: usize,
    shutdown: &Arc<Notify>,
) -> Result<()> {
    for worker in 0..workers {
        let channel = broker.create_channel().await?;
        let queue = broker.reply_queue.clone();
        let registry = registry.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = run_worker(channel, &queue, registry, shutdown, worker).await {
                error!("listener: worker {} exited, error={}", worker, e);
            }
        });
    }
    Ok(())
}

async fn run_worker(
    channel: Channel,
    queue: &str,
    registry: Arc<CorrelationRegistry>,
    shutdown: Arc<Notify>,
    worker: usize,
) -> Result<()> {
    let mut consumer = channel
        .basic_consume(
            queue,
            &format!("gateway-reply-{}", worker),
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    debug!("listener: worker {} consuming, queue={}", worker, queue);

    loop {
        let delivery = tokio::select! {
            next = consumer.next() => match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!("listener: consume error, worker={}, error={}", worker, e);
                    continue;
                }
                None => {
                    warn!("listener: consumer stream ended, worker={}", worker);
                    return Ok(());
                }
            },
            _ = shutdown.notified() => return Ok(()),
        };

        handle_reply(&registry, correlation_id_of(&delivery), &delivery.data);

        // The gateway has no retry duty for replies; ack unconditionally.
        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            error!("listener: ack failed, worker={}, error={}", worker, e);
        }
    }
}

/// Correlation id from the message properties, falling back to the
/// `correlationId` header.
fn correlation_id_of(delivery: &Delivery) -> Option<String> {
    if let Some(id) = delivery.properties.correlation_id() {
        return Some(id.to_string());
    }
    delivery
        .properties
        .headers()
        .as_ref()
        .and_then(|headers| {
            headers
                .inner()
                .iter()
                .find(|(name, _)| name.as_str() == "correlationId")
                .map(|(_, value)| value)
        })
        .and_then(|value| match value {
            AMQPValue::LongString(s) => Some(s.to_string()),
            AMQPValue::ShortString(s) => Some(s.to_string()),
            _ => None,
        })
}

/// Decode one delivery and resolve its pending slot. Returns the registry
/// outcome, or `None` when the payload was dropped before dispatch.
fn handle_reply(
    registry: &CorrelationRegistry,
    correlation_id: Option<String>,
    payload: &[u8],
) -> Option<CompleteOutcome> {
    let mut envelope: ResponseEnvelope = match serde_json::from_slice(payload) {
        Ok(env) => env,
        Err(e) => {
            error!("listener: malformed reply payload, error={}", e);
            metrics::counter!("gateway_malformed_replies_total").increment(1);
            return None;
        }
    };

    // The broker-level id governs; the body's copy is aligned to it.
    match correlation_id {
        Some(id) => envelope.correlation_id = id,
        None if envelope.correlation_id.is_empty() => {
            error!("listener: reply without correlation id, dropping");
            metrics::counter!("gateway_malformed_replies_total").increment(1);
            return None;
        }
        None => {}
    }

    let id = envelope.correlation_id.clone();
    let outcome = registry.complete(envelope);
    match outcome {
        CompleteOutcome::Delivered => {
            debug!("listener: reply delivered, correlation_id={}", id);
        }
        CompleteOutcome::Orphan => {
            warn!("listener: orphan reply dropped, correlation_id={}", id);
            metrics::counter!("gateway_orphan_replies_total").increment(1);
        }
        CompleteOutcome::LateCompletion => {
            warn!("listener: late reply dropped, correlation_id={}", id);
            metrics::counter!("gateway_late_replies_total").increment(1);
        }
    }
    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test]
    async fn reply_resolves_registered_slot() {
        let registry = CorrelationRegistry::new(0);
        let slot = registry
            .register("c-1", Instant::now() + Duration::from_secs(5))
            .unwrap();

        let payload = br#"{"correlationId":"c-1","statusCode":200,"headers":{},"body":"ok"}"#;
        let outcome = handle_reply(&registry, Some("c-1".to_string()), payload);
        assert_eq!(outcome, Some(CompleteOutcome::Delivered));

        match slot.await_reply().await {
            crate::correlation::ReplyOutcome::Completed(env) => {
                assert_eq!(env.status_code, 200);
                assert_eq!(env.body, "ok");
            }
            other => panic!("expected Completed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn property_id_overrides_body_id() {
        let registry = CorrelationRegistry::new(0);
        let slot = registry
            .register("prop-id", Instant::now() + Duration::from_secs(5))
            .unwrap();

        let payload = br#"{"correlationId":"body-id","statusCode":200}"#;
        let outcome = handle_reply(&registry, Some("prop-id".to_string()), payload);
        assert_eq!(outcome, Some(CompleteOutcome::Delivered));

        match slot.await_reply().await {
            crate::correlation::ReplyOutcome::Completed(env) => {
                assert_eq!(env.correlation_id, "prop-id");
            }
            other => panic!("expected Completed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_id_is_orphan_without_panic() {
        let registry = CorrelationRegistry::new(0);
        let payload = br#"{"correlationId":"NOSUCH","statusCode":200}"#;
        let outcome = handle_reply(&registry, None, payload);
        assert_eq!(outcome, Some(CompleteOutcome::Orphan));
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped() {
        let registry = CorrelationRegistry::new(0);
        let _slot = registry
            .register("c-2", Instant::now() + Duration::from_secs(5))
            .unwrap();

        assert_eq!(handle_reply(&registry, Some("c-2".to_string()), b"not json"), None);
        // The pending slot must not have been touched.
        assert_eq!(registry.in_flight(), 1);
    }

    #[tokio::test]
    async fn reply_without_any_id_is_dropped() {
        let registry = CorrelationRegistry::new(0);
        let payload = br#"{"correlationId":"","statusCode":200}"#;
        assert_eq!(handle_reply(&registry, None, payload), None);
    }
}
