//! Real-time transports between the router and agent clients
//!
//! Two directions, two traits:
//! - `NotificationChannel`: server → one specific connected agent
//! - `DecisionBus`: agent clients → server accept/reject decisions
//!
//! Backends (in-memory, NATS, ...) implement both so the assignment engine
//! and broker never depend on a concrete transport.

use crate::error::Result;
use crate::types::{AgentDecision, AgentNotification};
use async_trait::async_trait;

pub mod memory;
pub mod nats;

/// Push channel to a specific agent's connected client
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Deliver a notification to `agent_id`
    ///
    /// Delivery is fire-and-forget: success means the transport accepted
    /// the message, not that a client read it.
    async fn notify(&self, agent_id: &str, notification: &AgentNotification) -> Result<()>;

    /// Transport name (e.g., "memory", "nats")
    fn name(&self) -> &str;
}

/// Bus carrying agent decisions back to the router
#[async_trait]
pub trait DecisionBus: Send + Sync {
    /// Publish a decision (called on behalf of an agent client)
    async fn publish(&self, decision: &AgentDecision) -> Result<()>;

    /// Subscribe to every decision published from now on
    async fn subscribe(&self) -> Result<Box<dyn DecisionSubscription>>;
}

/// Async stream of decisions from any backend
#[async_trait]
pub trait DecisionSubscription: Send {
    /// Next decision; `None` once the bus is closed
    async fn next(&mut self) -> Result<Option<AgentDecision>>;
}
