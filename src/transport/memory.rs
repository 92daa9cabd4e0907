//! In-process transport built on tokio broadcast channels
//!
//! Each agent gets its own notification channel, created on first use;
//! `connect` plays the role of a client joining its `agent:<id>` room.

use super::{DecisionBus, DecisionSubscription, NotificationChannel};
use crate::error::{Result, RouteError};
use crate::types::{AgentDecision, AgentNotification};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// In-memory transport configuration
#[derive(Debug, Clone)]
pub struct MemoryTransportConfig {
    /// Per-channel buffer before slow receivers start lagging
    pub capacity: usize,
}

impl Default for MemoryTransportConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// In-memory notification channel and decision bus
pub struct MemoryTransport {
    agents: RwLock<HashMap<String, broadcast::Sender<AgentNotification>>>,
    decisions: broadcast::Sender<AgentDecision>,
    capacity: usize,
}

impl MemoryTransport {
    pub fn new(config: MemoryTransportConfig) -> Self {
        let (decisions, _) = broadcast::channel(config.capacity);
        Self {
            agents: RwLock::new(HashMap::new()),
            decisions,
            capacity: config.capacity,
        }
    }

    /// Attach a client for `agent_id` and receive its notifications
    pub async fn connect(&self, agent_id: &str) -> broadcast::Receiver<AgentNotification> {
        let mut agents = self.agents.write().await;
        agents
            .entry(agent_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Number of clients attached for `agent_id`
    pub async fn connected(&self, agent_id: &str) -> usize {
        let agents = self.agents.read().await;
        agents.get(agent_id).map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(MemoryTransportConfig::default())
    }
}

#[async_trait]
impl NotificationChannel for MemoryTransport {
    async fn notify(&self, agent_id: &str, notification: &AgentNotification) -> Result<()> {
        let agents = self.agents.read().await;
        match agents.get(agent_id) {
            // A send error only means nobody is listening right now
            Some(tx) if tx.send(notification.clone()).is_ok() => {
                tracing::debug!(agent_id = %agent_id, "Notification delivered");
            }
            _ => {
                tracing::debug!(agent_id = %agent_id, "No client connected, notification dropped");
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl DecisionBus for MemoryTransport {
    async fn publish(&self, decision: &AgentDecision) -> Result<()> {
        let receivers = self.decisions.send(decision.clone()).unwrap_or(0);
        tracing::debug!(
            agent_id = %decision.agent_id,
            accepted = decision.accepted,
            receivers,
            "Decision published"
        );
        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn DecisionSubscription>> {
        Ok(Box::new(MemoryDecisionSubscription {
            stream: BroadcastStream::new(self.decisions.subscribe()),
        }))
    }
}

/// Decision subscription over a broadcast receiver
pub struct MemoryDecisionSubscription {
    stream: BroadcastStream<AgentDecision>,
}

#[async_trait]
impl DecisionSubscription for MemoryDecisionSubscription {
    async fn next(&mut self) -> Result<Option<AgentDecision>> {
        match self.stream.next().await {
            Some(Ok(decision)) => Ok(Some(decision)),
            Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => Err(RouteError::Subscribe {
                subject: "decisions".to_string(),
                reason: format!("subscriber lagged, {} decisions skipped", skipped),
            }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(customer: &str) -> AgentNotification {
        AgentNotification::Offer {
            customer_id: customer.to_string(),
            room_name: customer.to_string(),
        }
    }

    #[tokio::test]
    async fn test_notify_reaches_only_target_agent() {
        let transport = MemoryTransport::default();
        let mut a = transport.connect("a").await;
        let mut b = transport.connect("b").await;

        transport.notify("a", &offer("c1")).await.unwrap();

        assert_eq!(a.recv().await.unwrap(), offer("c1"));
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notify_without_client_is_ok() {
        let transport = MemoryTransport::default();
        transport.notify("nobody", &offer("c1")).await.unwrap();
        assert_eq!(transport.connected("nobody").await, 0);
    }

    #[tokio::test]
    async fn test_connected_counts_clients() {
        let transport = MemoryTransport::default();
        let _first = transport.connect("a").await;
        let _second = transport.connect("a").await;
        assert_eq!(transport.connected("a").await, 2);
        assert_eq!(transport.name(), "memory");
    }

    #[tokio::test]
    async fn test_decisions_fan_out_to_subscribers() {
        let transport = MemoryTransport::default();
        let mut sub1 = transport.subscribe().await.unwrap();
        let mut sub2 = transport.subscribe().await.unwrap();

        transport
            .publish(&AgentDecision::accepted("a", "c1"))
            .await
            .unwrap();

        assert_eq!(
            sub1.next().await.unwrap().unwrap(),
            AgentDecision::accepted("a", "c1")
        );
        assert_eq!(
            sub2.next().await.unwrap().unwrap(),
            AgentDecision::accepted("a", "c1")
        );
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let transport = MemoryTransport::default();
        transport
            .publish(&AgentDecision::rejected("a", "c1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lagged_subscriber_reports_error() {
        let transport = MemoryTransport::new(MemoryTransportConfig { capacity: 2 });
        let mut sub = transport.subscribe().await.unwrap();
        for i in 0..5 {
            transport
                .publish(&AgentDecision::rejected(format!("a{}", i), "c1"))
                .await
                .unwrap();
        }

        assert!(matches!(
            sub.next().await,
            Err(RouteError::Subscribe { .. })
        ));
        // The subscription keeps working after the lag
        assert!(sub.next().await.unwrap().is_some());
    }
}
