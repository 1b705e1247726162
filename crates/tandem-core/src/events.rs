//! Delegation observability events
//!
//! Broadcast-based, fire-and-forget notifications emitted by the execution
//! protocol. Subscribers (UI, logs, metrics) receive start/end/interjection
//! events in real time; a missing or lagging subscriber never blocks the
//! protocol.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Events emitted around delegation execution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DelegationEvent {
    /// A delegated task has started
    Started {
        call_id: String,
        agent_type: String,
        task_prompt: String,
        model: String,
    },
    /// A delegated task completed with a usable response
    Completed {
        call_id: String,
        agent_type: String,
        duration_secs: f64,
    },
    /// A delegated task failed or was interrupted
    Failed {
        call_id: String,
        agent_type: String,
        error: String,
        duration_secs: f64,
    },
    /// A live user message was injected into a running delegate
    Interjection {
        agent_type: String,
        text: String,
    },
}

/// Broadcast bus for delegation events.
pub struct EventBus {
    sender: broadcast::Sender<DelegationEvent>,
}

impl EventBus {
    /// Create a bus with the given subscriber channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to delegation events.
    pub fn subscribe(&self) -> broadcast::Receiver<DelegationEvent> {
        self.sender.subscribe()
    }

    /// Emit an event. Never fails; no subscribers is a no-op.
    pub fn emit(&self, event: DelegationEvent) {
        match self.sender.send(event) {
            Ok(receivers) => debug!("Delegation event delivered to {} subscribers", receivers),
            Err(_) => debug!("Delegation event dropped (no subscribers)"),
        }
    }

    /// Current subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
