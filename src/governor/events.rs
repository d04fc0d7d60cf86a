//! Governor Events
//!
//! Quota warnings are pushed to an external event channel, one message per
//! fleet of the affected tenant.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::plans::Resource;

/// Events emitted by the governor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GovernorEvent {
    /// Usage crossed a warning threshold on the way up
    QuotaWarning {
        tenant_id: String,
        resource: Resource,
        used: u64,
        limit: u64,
        threshold: u8,
    },
}

/// Topic a fleet listens on
pub fn fleet_topic(fleet_id: &str) -> String {
    format!("fleet:{}", fleet_id)
}

/// Outbound event channel
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, event: GovernorEvent) -> Result<()>;
}

/// Event published on a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub topic: String,
    pub event: GovernorEvent,
}

/// In-process publisher fanning events out to broadcast subscribers
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, topic: &str, event: GovernorEvent) -> Result<()> {
        tracing::info!(topic, ?event, "Publishing governor event");
        // No subscribers is not a failure
        let _ = self.sender.send(PublishedEvent {
            topic: topic.to_string(),
            event,
        });
        Ok(())
    }
}
