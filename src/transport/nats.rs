//! NATS transport
//!
//! Notifications go to `<prefix>.agent.<agent_id>.notifications`, so an
//! agent client subscribes to its own subject only. Decisions from every
//! agent share `<prefix>.agent.responses`. Payloads are camelCase JSON.

use super::{DecisionBus, DecisionSubscription, NotificationChannel};
use crate::config::NatsConfig;
use crate::error::{Result, RouteError};
use crate::types::{AgentDecision, AgentNotification};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

/// NATS-backed notification channel and decision bus
pub struct NatsTransport {
    client: async_nats::Client,
    config: NatsConfig,
}

impl NatsTransport {
    /// Connect to the configured NATS server
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let mut options = async_nats::ConnectOptions::new();
        if let Some(ref name) = config.connection_name {
            options = options.name(name);
        }

        let client = options
            .connect(&config.url)
            .await
            .map_err(|e| RouteError::Connection(format!("{}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, prefix = %config.subject_prefix, "Connected to NATS");

        Ok(Self { client, config })
    }

    /// Subject an agent client listens on
    pub fn notification_subject(&self, agent_id: &str) -> String {
        notification_subject(&self.config.subject_prefix, agent_id)
    }

    /// Subject carrying agent decisions
    pub fn decision_subject(&self) -> String {
        decision_subject(&self.config.subject_prefix)
    }

    /// Get the underlying NATS client for advanced usage
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    async fn publish_json(&self, subject: String, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(subject.clone(), Bytes::from(payload))
            .await
            .map_err(|e| RouteError::Publish {
                subject: subject.clone(),
                reason: e.to_string(),
            })?;
        self.client.flush().await.map_err(|e| RouteError::Publish {
            subject,
            reason: format!("flush failed: {}", e),
        })
    }
}

fn notification_subject(prefix: &str, agent_id: &str) -> String {
    format!("{}.agent.{}.notifications", prefix, agent_id)
}

fn decision_subject(prefix: &str) -> String {
    format!("{}.agent.responses", prefix)
}

#[async_trait]
impl NotificationChannel for NatsTransport {
    async fn notify(&self, agent_id: &str, notification: &AgentNotification) -> Result<()> {
        let payload = serde_json::to_vec(notification)?;
        let subject = self.notification_subject(agent_id);
        self.publish_json(subject.clone(), payload).await?;
        tracing::debug!(agent_id = %agent_id, subject = %subject, "Notification published");
        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}

#[async_trait]
impl DecisionBus for NatsTransport {
    async fn publish(&self, decision: &AgentDecision) -> Result<()> {
        let payload = serde_json::to_vec(decision)?;
        self.publish_json(self.decision_subject(), payload).await
    }

    async fn subscribe(&self) -> Result<Box<dyn DecisionSubscription>> {
        let subject = self.decision_subject();
        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| RouteError::Subscribe {
                subject: subject.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(subject = %subject, "Decision subscription created");
        Ok(Box::new(NatsDecisionSubscription { subscriber }))
    }
}

/// Decision subscription over a core NATS subscriber
pub struct NatsDecisionSubscription {
    subscriber: async_nats::Subscriber,
}

#[async_trait]
impl DecisionSubscription for NatsDecisionSubscription {
    async fn next(&mut self) -> Result<Option<AgentDecision>> {
        match self.subscriber.next().await {
            Some(message) => {
                let decision: AgentDecision = serde_json::from_slice(&message.payload)?;
                Ok(Some(decision))
            }
            None => Ok(None),
        }
    }
}
