//! Assignment engine
//!
//! Finds an agent for one customer: claim the oldest available agent, offer
//! the call, wait for the decision, and either bind the agent to the
//! customer or rotate it to the queue tail and try the next one. Runs until
//! an agent accepts or the queue is exhausted; offers within one run are
//! strictly sequential.

use crate::broker::OfferBroker;
use crate::error::Result;
use crate::store::{AvailabilityQueue, SessionStore};
use crate::transport::NotificationChannel;
use crate::types::{AgentNotification, AgentSessionUpdate, AssignmentOutcome};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Orchestrates queue, broker and session updates for customer requests
#[derive(Clone)]
pub struct AssignmentEngine {
    queue: Arc<dyn AvailabilityQueue>,
    sessions: Arc<dyn SessionStore>,
    notifier: Arc<dyn NotificationChannel>,
    broker: Arc<OfferBroker>,
    offer_timeout: Duration,
}

impl AssignmentEngine {
    pub fn new(
        queue: Arc<dyn AvailabilityQueue>,
        sessions: Arc<dyn SessionStore>,
        notifier: Arc<dyn NotificationChannel>,
        broker: Arc<OfferBroker>,
        offer_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            sessions,
            notifier,
            broker,
            offer_timeout,
        }
    }

    /// Offer the customer to available agents until one accepts
    ///
    /// An empty queue is a normal outcome (`NoAgentAvailable`), not an
    /// error. Errors come only from the backing stores.
    pub async fn assign(&self, customer_id: &str, room_name: &str) -> Result<AssignmentOutcome> {
        let mut offers = 0;
        let mut offered = HashSet::new();

        loop {
            // Claiming removes the agent so no concurrent run can offer it too
            let Some(agent_id) = self.queue.claim_oldest().await? else {
                tracing::warn!(
                    customer_id = %customer_id,
                    offers,
                    "No agents available"
                );
                return Ok(AssignmentOutcome::NoAgentAvailable { offers });
            };

            offers += 1;
            if !offered.insert(agent_id.clone()) {
                tracing::info!(
                    customer_id = %customer_id,
                    agent_id = %agent_id,
                    "Every available agent offered once, starting another pass"
                );
                offered.clear();
                offered.insert(agent_id.clone());
            }

            tracing::info!(
                customer_id = %customer_id,
                agent_id = %agent_id,
                attempt = offers,
                "Offering call to agent"
            );

            if self.offer(&agent_id, customer_id, room_name).await {
                let update = AgentSessionUpdate::on_call(customer_id, room_name);
                match self.sessions.update_agent_session(&agent_id, &update).await? {
                    Some(_) => {
                        tracing::info!(
                            customer_id = %customer_id,
                            agent_id = %agent_id,
                            "Agent accepted call"
                        );
                        return Ok(AssignmentOutcome::Assigned { agent_id, offers });
                    }
                    None => {
                        // Accepted by an agent with no session record; not usable
                        tracing::warn!(
                            agent_id = %agent_id,
                            "Accepting agent has no session, skipping"
                        );
                        continue;
                    }
                }
            }

            tracing::warn!(
                customer_id = %customer_id,
                agent_id = %agent_id,
                "Agent did not accept, moving to next"
            );
            self.rotate(&agent_id).await?;
        }
    }

    /// Run `assign` in the background, logging the outcome
    pub fn spawn_assign(
        &self,
        customer_id: String,
        room_name: String,
    ) -> JoinHandle<Option<AssignmentOutcome>> {
        let engine = self.clone();
        tokio::spawn(async move {
            match engine.assign(&customer_id, &room_name).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::error!(
                        customer_id = %customer_id,
                        error = %e,
                        "Background assignment failed"
                    );
                    None
                }
            }
        })
    }

    /// Send the offer and wait for the decision
    ///
    /// A failed send still waits out the timeout, so an unreachable agent
    /// is never re-offered faster than a silent one.
    async fn offer(&self, agent_id: &str, customer_id: &str, room_name: &str) -> bool {
        let notification = AgentNotification::Offer {
            customer_id: customer_id.to_string(),
            room_name: room_name.to_string(),
        };

        // Register before notifying so an immediate answer is not lost
        let pending = self.broker.register(agent_id, Some(customer_id));

        if let Err(e) = self.notifier.notify(agent_id, &notification).await {
            tracing::warn!(
                agent_id = %agent_id,
                transport = %self.notifier.name(),
                error = %e,
                "Failed to deliver offer"
            );
        }

        pending.wait(self.offer_timeout).await
    }

    /// Put a declining agent behind everyone else, unless it went offline
    /// or picked up another call meanwhile
    async fn rotate(&self, agent_id: &str) -> Result<()> {
        let available = self
            .sessions
            .agent_session(agent_id)
            .await?
            .is_some_and(|s| s.is_available());

        if available {
            self.queue.requeue_to_tail(agent_id).await
        } else {
            tracing::info!(agent_id = %agent_id, "Agent no longer available, not requeued");
            Ok(())
        }
    }
}
