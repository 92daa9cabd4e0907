//! Call center facade
//!
//! `CallCenter` wires the stores, transports and media boundaries into the
//! operations a front end calls: customers joining, agents coming and going,
//! accepting or rejecting offers, recording, transfers and webhooks.

use crate::assignment::AssignmentEngine;
use crate::broker::OfferBroker;
use crate::config::RouteConfig;
use crate::error::{Result, RouteError};
use crate::media::{MediaPlatform, RecordingService, SpeechToText, Summarizer};
use crate::store::{
    AvailabilityQueue, ConversationLog, EgressRegistry, MemoryAvailabilityQueue,
    MemoryConversationLog, MemoryEgressRegistry, MemorySessionStore, SessionStore,
};
use crate::token::TokenIssuer;
use crate::transfer::{release_agent, TransferSaga};
use crate::transport::{DecisionBus, NotificationChannel};
use crate::types::{
    AcceptedCall, AgentDecision, AgentSession, AgentSessionUpdate, AgentStatus, CustomerSession,
    EgressRecord, JoinTicket, TransferOutcome,
};
use crate::webhook::{WebhookEvent, WebhookVerifier};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Everything a `CallCenter` talks to
pub struct Backends {
    pub sessions: Arc<dyn SessionStore>,
    pub queue: Arc<dyn AvailabilityQueue>,
    pub conversations: Arc<dyn ConversationLog>,
    pub egress: Arc<dyn EgressRegistry>,
    pub notifier: Arc<dyn NotificationChannel>,
    pub decisions: Arc<dyn DecisionBus>,
    pub media: Arc<dyn MediaPlatform>,
    pub stt: Arc<dyn SpeechToText>,
    pub summarizer: Option<Arc<dyn Summarizer>>,
    pub tokens: Arc<dyn TokenIssuer>,
    pub webhooks: WebhookVerifier,
}

impl Backends {
    /// In-memory stores with TTLs from `config`, plus the given transport
    /// and external boundaries
    pub fn in_memory<T>(
        config: &RouteConfig,
        transport: Arc<T>,
        media: Arc<dyn MediaPlatform>,
        stt: Arc<dyn SpeechToText>,
        summarizer: Option<Arc<dyn Summarizer>>,
        tokens: Arc<dyn TokenIssuer>,
        webhooks: WebhookVerifier,
    ) -> Self
    where
        T: NotificationChannel + DecisionBus + 'static,
    {
        Self {
            sessions: Arc::new(MemorySessionStore::default()),
            queue: Arc::new(MemoryAvailabilityQueue::default()),
            conversations: Arc::new(MemoryConversationLog::new(config.conversation_ttl())),
            egress: Arc::new(MemoryEgressRegistry::new(config.egress_ttl())),
            notifier: transport.clone(),
            decisions: transport,
            media,
            stt,
            summarizer,
            tokens,
            webhooks,
        }
    }
}

/// Routing front door
pub struct CallCenter {
    sessions: Arc<dyn SessionStore>,
    queue: Arc<dyn AvailabilityQueue>,
    conversations: Arc<dyn ConversationLog>,
    decisions: Arc<dyn DecisionBus>,
    summarizer: Option<Arc<dyn Summarizer>>,
    tokens: Arc<dyn TokenIssuer>,
    webhooks: WebhookVerifier,
    broker: Arc<OfferBroker>,
    engine: AssignmentEngine,
    recorder: Arc<RecordingService>,
    saga: TransferSaga,
}

impl CallCenter {
    pub fn new(backends: Backends, config: &RouteConfig) -> Self {
        let Backends {
            sessions,
            queue,
            conversations,
            egress,
            notifier,
            decisions,
            media,
            stt,
            summarizer,
            tokens,
            webhooks,
        } = backends;

        let broker = Arc::new(OfferBroker::new());
        let engine = AssignmentEngine::new(
            queue.clone(),
            sessions.clone(),
            notifier.clone(),
            broker.clone(),
            config.offer_timeout(),
        );
        let recorder = Arc::new(RecordingService::new(
            media,
            stt,
            egress,
            conversations.clone(),
            config.recording.clone(),
        ));
        let saga = TransferSaga::new(
            queue.clone(),
            sessions.clone(),
            conversations.clone(),
            recorder.clone(),
            tokens.clone(),
            notifier,
        );

        Self {
            sessions,
            queue,
            conversations,
            decisions,
            summarizer,
            tokens,
            webhooks,
            broker,
            engine,
            recorder,
            saga,
        }
    }

    /// Subscribe to agent decisions and route them into the broker
    ///
    /// Must run before any offer can be answered.
    pub async fn start(&self) -> Result<JoinHandle<()>> {
        let subscription = self.decisions.subscribe().await?;
        tracing::info!("Call center listening for agent decisions");
        Ok(self.broker.spawn_listener(subscription))
    }

    pub fn broker(&self) -> &Arc<OfferBroker> {
        &self.broker
    }

    pub fn engine(&self) -> &AssignmentEngine {
        &self.engine
    }

    pub fn recorder(&self) -> &Arc<RecordingService> {
        &self.recorder
    }

    /// Create a customer with its own room and start looking for an agent
    ///
    /// Returns as soon as the customer's token exists; the agent search
    /// continues in the background.
    pub async fn customer_join(&self) -> Result<JoinTicket> {
        let customer_id = uuid::Uuid::new_v4().to_string();
        let room_name = customer_id.clone();

        let token = self.tokens.create_token(&customer_id, &room_name).await?;
        self.sessions
            .save_customer_session(&CustomerSession::new(&customer_id, &token, &room_name))
            .await?;

        self.engine
            .spawn_assign(customer_id.clone(), room_name.clone());

        tracing::info!(customer_id = %customer_id, room = %room_name, "Customer joined");
        Ok(JoinTicket {
            customer_id,
            room_name,
            token,
        })
    }

    /// Create an online agent and make it available
    pub async fn register_agent(&self) -> Result<AgentSession> {
        let agent_id = uuid::Uuid::new_v4().to_string();
        let session = AgentSession::new(&agent_id, AgentStatus::Online);
        self.sessions.save_agent_session(&session).await?;
        self.queue.enroll(&agent_id).await?;

        tracing::info!(agent_id = %agent_id, "Agent registered");
        Ok(session)
    }

    /// Bring a known agent online; an agent not on a call joins the queue
    pub async fn set_agent_online(&self, agent_id: &str) -> Result<AgentSession> {
        let session = self
            .sessions
            .update_agent_session(agent_id, &AgentSessionUpdate::status(AgentStatus::Online))
            .await?
            .ok_or_else(|| RouteError::NotFound(format!("Agent {}", agent_id)))?;

        if session.is_available() && !self.queue.contains(agent_id).await? {
            self.queue.enroll(agent_id).await?;
        }
        tracing::info!(agent_id = %agent_id, "Agent online");
        Ok(session)
    }

    /// Take an agent offline and out of the queue
    pub async fn set_agent_offline(&self, agent_id: &str) -> Result<AgentSession> {
        let session = self
            .sessions
            .update_agent_session(agent_id, &AgentSessionUpdate::status(AgentStatus::Offline))
            .await?
            .ok_or_else(|| RouteError::NotFound(format!("Agent {}", agent_id)))?;

        self.queue.remove(agent_id).await?;
        tracing::info!(agent_id = %agent_id, "Agent offline");
        Ok(session)
    }

    /// Agent takes the customer's call
    ///
    /// A summary of any earlier conversation between the two is attached
    /// when a summarizer is configured; its failure does not fail the call.
    pub async fn accept_call(&self, agent_id: &str, customer_id: &str) -> Result<AcceptedCall> {
        let customer = self
            .sessions
            .customer_session(customer_id)
            .await?
            .ok_or_else(|| RouteError::NotFound(format!("Customer session {}", customer_id)))?;
        let room = customer.room;

        let token = self.tokens.create_token(agent_id, &room).await?;
        self.sessions
            .update_agent_session(agent_id, &AgentSessionUpdate::on_call(customer_id, &room))
            .await?;
        self.decisions
            .publish(&AgentDecision::accepted(agent_id, customer_id))
            .await?;

        let summary = self.summarize(customer_id, agent_id).await;

        tracing::info!(
            agent_id = %agent_id,
            customer_id = %customer_id,
            room = %room,
            "Call accepted"
        );
        Ok(AcceptedCall {
            agent_id: agent_id.to_string(),
            customer_id: customer_id.to_string(),
            token,
            room,
            summary,
        })
    }

    async fn summarize(&self, customer_id: &str, agent_id: &str) -> Option<String> {
        let summarizer = self.summarizer.as_ref()?;
        let transcript = match self.conversations.transcript(customer_id, agent_id).await {
            Ok(t) if !t.trim().is_empty() => t,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(
                    customer_id = %customer_id,
                    error = %e,
                    "Failed to read conversation"
                );
                return None;
            }
        };

        match summarizer.summarize(&transcript).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(customer_id = %customer_id, error = %e, "Summarization failed");
                None
            }
        }
    }

    /// Agent declines the customer's call
    pub async fn reject_call(&self, agent_id: &str, customer_id: &str) -> Result<()> {
        self.decisions
            .publish(&AgentDecision::rejected(agent_id, customer_id))
            .await?;
        tracing::info!(agent_id = %agent_id, customer_id = %customer_id, "Call rejected");
        Ok(())
    }

    /// Agent hangs up and, when online, waits behind everyone else
    pub async fn end_call(&self, agent_id: &str) -> Result<AgentSession> {
        let session = release_agent(self.queue.as_ref(), self.sessions.as_ref(), agent_id)
            .await?
            .ok_or_else(|| RouteError::NotFound(format!("Agent {}", agent_id)))?;
        tracing::info!(agent_id = %agent_id, "Call ended");
        Ok(session)
    }

    /// Start recording a customer's room once they are in it
    pub async fn start_recording(&self, room: &str) -> Result<EgressRecord> {
        self.recorder.start(room).await
    }

    /// Hand the customer over to the next available agent
    pub async fn transfer_call(
        &self,
        from_agent_id: &str,
        customer_id: &str,
    ) -> Result<TransferOutcome> {
        self.saga.transfer(from_agent_id, customer_id).await
    }

    /// Verify and act on a media platform webhook
    ///
    /// Returns the parsed event. A finished room has its recording stopped
    /// and saved; other events are only logged.
    pub async fn handle_webhook(&self, body: &[u8], signature: &str) -> Result<WebhookEvent> {
        if let Err(e) = self.webhooks.verify(body, signature) {
            tracing::warn!(error = %e, "Rejected webhook");
            return Err(e);
        }
        let event = WebhookEvent::parse(body)?;

        match event.event.as_str() {
            "room_finished" => {
                if let Some(room) = event.room_name() {
                    if self.recorder.is_recording(room).await? {
                        tracing::info!(room = %room, "Room finished, stopping recording");
                        if let Err(e) = self.recorder.stop(room).await {
                            tracing::error!(room = %room, error = %e, "Failed to save recording");
                        }
                    } else {
                        tracing::warn!(room = %room, "Room finished without a recording");
                    }
                }
            }
            "participant_joined" | "participant_left" | "track_published" | "track_unpublished" => {
                tracing::debug!(
                    event = %event.event,
                    participant = ?event.participant_identity(),
                    room = ?event.room_name(),
                    "Participant event"
                );
            }
            "egress_started" | "egress_ended" => {
                tracing::debug!(event = %event.event, egress_id = ?event.egress_id, "Egress event");
            }
            other => {
                tracing::debug!(
                    event = %other,
                    room = ?event.room_name(),
                    "Unhandled webhook event"
                );
            }
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryTransport;
    use crate::types::EgressStatus;
    use async_trait::async_trait;

    struct NullMedia;

    #[async_trait]
    impl MediaPlatform for NullMedia {
        async fn start_recording(&self, room: &str) -> Result<String> {
            Ok(format!("EG_{}", room))
        }

        async fn stop_recording(&self, _egress_id: &str) -> Result<EgressStatus> {
            Ok(EgressStatus::Completed {
                location: "rec.ogg".to_string(),
            })
        }

        async fn egress_status(&self, _egress_id: &str) -> Result<EgressStatus> {
            Ok(EgressStatus::Active)
        }

        async fn download(&self, _location: &str, room: &str) -> Result<String> {
            Ok(format!("{}.ogg", room))
        }
    }

    struct EchoStt;

    #[async_trait]
    impl SpeechToText for EchoStt {
        async fn transcribe(&self, artifact: &str) -> Result<String> {
            Ok(format!("audio of {}", artifact))
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _transcript: &str) -> Result<String> {
            Err(RouteError::upstream("summarizer", "quota exceeded"))
        }
    }

    struct PlainTokens;

    #[async_trait]
    impl TokenIssuer for PlainTokens {
        async fn create_token(&self, identity: &str, room: &str) -> Result<String> {
            Ok(format!("{}@{}", identity, room))
        }
    }

    fn center(summarizer: Option<Arc<dyn Summarizer>>) -> (CallCenter, Arc<MemoryTransport>) {
        let config = RouteConfig::default();
        let transport = Arc::new(MemoryTransport::default());
        let backends = Backends::in_memory(
            &config,
            transport.clone(),
            Arc::new(NullMedia),
            Arc::new(EchoStt),
            summarizer,
            Arc::new(PlainTokens),
            WebhookVerifier::new("whsec").unwrap(),
        );
        (CallCenter::new(backends, &config), transport)
    }

    #[tokio::test]
    async fn test_register_enrolls_online_agent() {
        let (center, _) = center(None);
        let agent = center.register_agent().await.unwrap();
        assert_eq!(agent.status, AgentStatus::Online);
        assert!(center.queue.contains(&agent.agent_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_offline_and_back_online() {
        let (center, _) = center(None);
        let agent = center.register_agent().await.unwrap();

        let session = center.set_agent_offline(&agent.agent_id).await.unwrap();
        assert_eq!(session.status, AgentStatus::Offline);
        assert!(!center.queue.contains(&agent.agent_id).await.unwrap());

        center.set_agent_online(&agent.agent_id).await.unwrap();
        assert!(center.queue.contains(&agent.agent_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_agent_status_change_is_not_found() {
        let (center, _) = center(None);
        assert!(matches!(
            center.set_agent_online("ghost").await,
            Err(RouteError::NotFound(_))
        ));
        assert!(matches!(center.end_call("ghost").await, Err(RouteError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_accept_requires_customer_session() {
        let (center, _) = center(None);
        let agent = center.register_agent().await.unwrap();
        assert!(matches!(
            center.accept_call(&agent.agent_id, "nobody").await,
            Err(RouteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_summary_failure_does_not_fail_accept() {
        let (center, _) = center(Some(Arc::new(FailingSummarizer)));
        center
            .sessions
            .save_customer_session(&CustomerSession::new("c1", "t", "c1"))
            .await
            .unwrap();
        center.conversations.append("c1", "a", "earlier call").await.unwrap();

        let accepted = center.accept_call("a", "c1").await.unwrap();
        assert_eq!(accepted.room, "c1");
        assert_eq!(accepted.token, "a@c1");
        assert!(accepted.summary.is_none());
    }

    #[tokio::test]
    async fn test_end_call_rotates_agent() {
        let (center, _) = center(None);
        let first = center.register_agent().await.unwrap();
        let second = center.register_agent().await.unwrap();
        center
            .sessions
            .update_agent_session(&first.agent_id, &AgentSessionUpdate::on_call("c1", "c1"))
            .await
            .unwrap();

        let session = center.end_call(&first.agent_id).await.unwrap();
        assert!(!session.on_call);
        assert!(session.last_call_end.is_some());

        let order: Vec<String> = center
            .queue
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(order, vec![second.agent_id, first.agent_id]);
    }

    #[tokio::test]
    async fn test_bad_webhook_signature_is_unauthorized() {
        let (center, _) = center(None);
        let body = br#"{"event":"room_finished","room":{"name":"c1"}}"#;
        assert!(matches!(
            center.handle_webhook(body, "deadbeef").await,
            Err(RouteError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_room_finished_webhook_saves_recording() {
        let (center, _) = center(None);
        center.start_recording("c1").await.unwrap();

        let body = br#"{"event":"room_finished","room":{"name":"c1"}}"#;
        let signature = center.webhooks.sign(body).unwrap();
        let event = center.handle_webhook(body, &signature).await.unwrap();
        assert_eq!(event.room_name(), Some("c1"));
        assert!(!center.recorder.is_recording("c1").await.unwrap());
    }
}
