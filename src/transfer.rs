//! Transfer saga
//!
//! Moves a live call from one agent to the next available one, carrying the
//! conversation so far. The steps touch several external systems, so each
//! one decides for itself whether a failure aborts the transfer:
//!
//! 1. peek the queue and fail fast when nobody is available
//! 2. stop the room's recording (fatal; a room that was never recorded
//!    simply has no new audio)
//! 3. transcribe the artifact into the conversation log (non-fatal)
//! 4. read the whole conversation
//! 5. claim the next agent and put it on the call
//! 6. issue its room token, compensating the claim on failure
//! 7. notify both agents and release the previous one

use crate::error::{Result, RouteError};
use crate::media::RecordingService;
use crate::store::{AvailabilityQueue, ConversationLog, SessionStore};
use crate::token::TokenIssuer;
use crate::transport::NotificationChannel;
use crate::types::{AgentNotification, AgentSession, AgentSessionUpdate, TransferOutcome};
use std::sync::Arc;

/// Hands a customer over from one agent to the head of the queue
pub struct TransferSaga {
    queue: Arc<dyn AvailabilityQueue>,
    sessions: Arc<dyn SessionStore>,
    conversations: Arc<dyn ConversationLog>,
    recorder: Arc<RecordingService>,
    tokens: Arc<dyn TokenIssuer>,
    notifier: Arc<dyn NotificationChannel>,
}

impl TransferSaga {
    pub fn new(
        queue: Arc<dyn AvailabilityQueue>,
        sessions: Arc<dyn SessionStore>,
        conversations: Arc<dyn ConversationLog>,
        recorder: Arc<RecordingService>,
        tokens: Arc<dyn TokenIssuer>,
        notifier: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            queue,
            sessions,
            conversations,
            recorder,
            tokens,
            notifier,
        }
    }

    /// Transfer `customer_id`'s call away from `from_agent_id`
    pub async fn transfer(
        &self,
        from_agent_id: &str,
        customer_id: &str,
    ) -> Result<TransferOutcome> {
        if self.queue.peek_oldest().await?.is_none() {
            tracing::warn!(
                agent_id = %from_agent_id,
                customer_id = %customer_id,
                "No agent available for transfer"
            );
            return Err(RouteError::NoAgentAvailable);
        }

        let room = self.current_room(from_agent_id, customer_id).await?;
        self.capture_recording(&room, from_agent_id, customer_id).await?;

        let conversation = self.conversations.transcript(customer_id, from_agent_id).await?;

        // The head may have been taken while the recording was stopping
        let Some(next_agent_id) = self.queue.claim_oldest().await? else {
            tracing::warn!(
                agent_id = %from_agent_id,
                customer_id = %customer_id,
                "Queue drained during transfer"
            );
            return Err(RouteError::NoAgentAvailable);
        };

        let token = self
            .bind_next_agent(&next_agent_id, customer_id, &room)
            .await?;

        let handover = AgentNotification::Transfer {
            customer_id: customer_id.to_string(),
            room: room.clone(),
            conversation,
            transferred_from: from_agent_id.to_string(),
        };
        if let Err(e) = self.notifier.notify(&next_agent_id, &handover).await {
            tracing::warn!(
                agent_id = %next_agent_id,
                error = %e,
                "Failed to notify transfer target"
            );
        }

        let confirmation = AgentNotification::TransferComplete {
            customer_id: customer_id.to_string(),
            transferred_to: next_agent_id.clone(),
        };
        if let Err(e) = self.notifier.notify(from_agent_id, &confirmation).await {
            tracing::warn!(agent_id = %from_agent_id, error = %e, "Failed to confirm transfer");
        }

        release_agent(self.queue.as_ref(), self.sessions.as_ref(), from_agent_id).await?;

        tracing::info!(
            customer_id = %customer_id,
            from = %from_agent_id,
            to = %next_agent_id,
            room = %room,
            "Call transferred"
        );

        Ok(TransferOutcome {
            agent_id: next_agent_id,
            customer_id: customer_id.to_string(),
            token,
            room,
        })
    }

    async fn current_room(&self, agent_id: &str, customer_id: &str) -> Result<String> {
        if let Some(room) = self
            .sessions
            .agent_session(agent_id)
            .await?
            .and_then(|s| s.room)
        {
            return Ok(room);
        }

        self.sessions
            .customer_session(customer_id)
            .await?
            .map(|s| s.room)
            .ok_or_else(|| RouteError::NotFound(format!("No room for customer {}", customer_id)))
    }

    async fn capture_recording(&self, room: &str, agent_id: &str, customer_id: &str) -> Result<()> {
        let artifact = match self.recorder.stop(room).await {
            Ok(artifact) => artifact,
            Err(RouteError::NotFound(_)) => {
                tracing::info!(room = %room, "Room not recorded, transferring logged history only");
                return Ok(());
            }
            Err(e) => {
                tracing::error!(room = %room, error = %e, "Failed to stop recording for transfer");
                return Err(e);
            }
        };

        if let Err(e) = self
            .recorder
            .transcribe_into(&artifact, customer_id, agent_id)
            .await
        {
            tracing::warn!(
                room = %room,
                customer_id = %customer_id,
                error = %e,
                "Transcription failed, continuing with logged history"
            );
        }
        Ok(())
    }

    /// Put the claimed agent on the call and issue its token, undoing the
    /// claim when no token can be issued
    async fn bind_next_agent(
        &self,
        agent_id: &str,
        customer_id: &str,
        room: &str,
    ) -> Result<String> {
        let previous = self.sessions.agent_session(agent_id).await?;
        self.sessions
            .update_agent_session(agent_id, &AgentSessionUpdate::on_call(customer_id, room))
            .await?;

        match self.tokens.create_token(agent_id, room).await {
            Ok(token) => Ok(token),
            Err(e) => {
                tracing::error!(
                    agent_id = %agent_id,
                    customer_id = %customer_id,
                    error = %e,
                    "Token issuance failed, returning agent to queue"
                );
                self.compensate(agent_id, previous.as_ref()).await;
                Err(e)
            }
        }
    }

    async fn compensate(&self, agent_id: &str, previous: Option<&AgentSession>) {
        if let Some(previous) = previous {
            if let Err(e) = self
                .sessions
                .update_agent_session(agent_id, &AgentSessionUpdate::restore(previous))
                .await
            {
                tracing::error!(
                    agent_id = %agent_id,
                    error = %e,
                    "Failed to restore agent session"
                );
            }
        }
        if let Err(e) = self.queue.enroll(agent_id).await {
            tracing::error!(agent_id = %agent_id, error = %e, "Failed to re-enroll agent");
        }
    }
}

/// Take an agent off its call and, when online, put it behind everyone else
///
/// Returns the updated session, or `None` for an unknown agent.
pub(crate) async fn release_agent(
    queue: &dyn AvailabilityQueue,
    sessions: &dyn SessionStore,
    agent_id: &str,
) -> Result<Option<AgentSession>> {
    let Some(session) = sessions
        .update_agent_session(agent_id, &AgentSessionUpdate::call_ended())
        .await?
    else {
        return Ok(None);
    };

    if session.is_available() {
        queue.requeue_to_tail(agent_id).await?;
    }
    Ok(Some(session))
}
