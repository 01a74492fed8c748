//! Correlation registry: the table of in-flight requests awaiting a broker
//! reply.
//!
//! Each registered request owns a capacity-1 single-shot channel. The reply
//! listener resolves a slot by *removing* its sender from the table under the
//! lock — taking the sender is the claim on the slot's terminal state, so a
//! reply and a timeout racing for the same id produce exactly one winner.
//! Deregistration on timeout or client disconnect is a drop guard, which runs
//! on every exit path of the awaiting task.

use crate::wire::ResponseEnvelope;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Why a registration was refused.
#[derive(Debug, PartialEq, Eq)]
pub enum RegisterError {
    /// The id is already in flight. Ids are unique per process lifetime with
    /// overwhelming probability; the losing request treats this as fatal.
    DuplicateCorrelation,
    /// The configured in-flight ceiling is reached.
    RegistryFull,
}

/// Outcome of delivering a reply into the registry.
#[derive(Debug, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// A waiter received the reply.
    Delivered,
    /// No slot with this id exists (already deregistered, or never ours).
    Orphan,
    /// The slot existed but its waiter was already gone; the reply is dropped.
    LateCompletion,
}

/// Terminal result of awaiting a slot. Cancellation has no variant: a
/// cancelled await is a dropped future, and the drop guard deregisters.
#[derive(Debug)]
pub enum ReplyOutcome {
    Completed(ResponseEnvelope),
    TimedOut,
}

/// One in-flight request. Held by the bridge between publish and response.
pub struct PendingSlot {
    rx: oneshot::Receiver<ResponseEnvelope>,
    deadline: Instant,
    _guard: SlotGuard,
}

impl PendingSlot {
    /// Wait until the reply arrives or the deadline elapses.
    ///
    /// Consumes the slot; the guard deregisters on return (and on drop, if
    /// the caller is cancelled mid-await).
    pub async fn await_reply(self) -> ReplyOutcome {
        match tokio::time::timeout_at(self.deadline, self.rx).await {
            Ok(Ok(envelope)) => ReplyOutcome::Completed(envelope),
            // Sender vanished without sending — only possible during process
            // teardown; surface as a timeout rather than panicking.
            Ok(Err(_)) => ReplyOutcome::TimedOut,
            Err(_) => ReplyOutcome::TimedOut,
        }
    }
}

/// Removes the slot from the table when the awaiting request exits,
/// whichever way it exits.
struct SlotGuard {
    registry: Arc<CorrelationRegistry>,
    id: String,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.registry.deregister(&self.id);
    }
}

/// Concurrent table of pending request slots, shared by all serving tasks
/// and the reply listener workers.
pub struct CorrelationRegistry {
    slots: Mutex<HashMap<String, oneshot::Sender<ResponseEnvelope>>>,
    /// 0 = unlimited.
    max_in_flight: usize,
}

impl CorrelationRegistry {
    pub fn new(max_in_flight: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(HashMap::new()),
            max_in_flight,
        })
    }

    /// Insert a new pending slot for `id`, to be resolved before `deadline`.
    pub fn register(
        self: &Arc<Self>,
        id: &str,
        deadline: Instant,
    ) -> Result<PendingSlot, RegisterError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut slots = self.slots.lock().expect("correlation table poisoned");
            if self.max_in_flight > 0 && slots.len() >= self.max_in_flight {
                return Err(RegisterError::RegistryFull);
            }
            if slots.contains_key(id) {
                return Err(RegisterError::DuplicateCorrelation);
            }
            slots.insert(id.to_string(), tx);
            metrics::gauge!("gateway_requests_pending").set(slots.len() as f64);
        }
        Ok(PendingSlot {
            rx,
            deadline,
            _guard: SlotGuard {
                registry: self.clone(),
                id: id.to_string(),
            },
        })
    }

    /// Deliver a reply to the waiter for `envelope.correlation_id`.
    ///
    /// Removing the sender under the lock claims the terminal state; the
    /// loser of a reply/timeout race sees `Orphan` or `LateCompletion` and
    /// drops the reply.
    pub fn complete(&self, envelope: ResponseEnvelope) -> CompleteOutcome {
        let sender = {
            let mut slots = self.slots.lock().expect("correlation table poisoned");
            let sender = slots.remove(&envelope.correlation_id);
            metrics::gauge!("gateway_requests_pending").set(slots.len() as f64);
            sender
        };
        match sender {
            None => CompleteOutcome::Orphan,
            Some(tx) => match tx.send(envelope) {
                Ok(()) => CompleteOutcome::Delivered,
                Err(_) => CompleteOutcome::LateCompletion,
            },
        }
    }

    /// Number of requests currently awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.slots.lock().expect("correlation table poisoned").len()
    }

    fn deregister(&self, id: &str) {
        let mut slots = self.slots.lock().expect("correlation table poisoned");
        if slots.remove(id).is_some() {
            metrics::gauge!("gateway_requests_pending").set(slots.len() as f64);
        }
    }
}
