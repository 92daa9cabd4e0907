//! Shared state abstractions
//!
//! Every piece of globally mutable routing state (agent/customer sessions,
//! the availability ordering, conversation logs and egress mappings) sits
//! behind one of these traits. Implementations must apply each operation
//! atomically per key so concurrent assignment runs observe a consistent
//! view. `memory` provides in-process implementations.

use crate::error::Result;
use crate::types::{AgentSession, AgentSessionUpdate, CustomerSession, EgressRecord, QueueKey};
use async_trait::async_trait;

pub mod memory;

pub use memory::{
    MemoryAvailabilityQueue, MemoryConversationLog, MemoryEgressRegistry, MemorySessionStore,
};

/// Durable customer and agent call records
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create or replace an agent's full record
    async fn save_agent_session(&self, session: &AgentSession) -> Result<()>;

    /// Read an agent's record
    async fn agent_session(&self, agent_id: &str) -> Result<Option<AgentSession>>;

    /// Merge the set fields of `update` into an existing record
    ///
    /// Returns the merged record, or `None` when the agent is unknown.
    async fn update_agent_session(
        &self,
        agent_id: &str,
        update: &AgentSessionUpdate,
    ) -> Result<Option<AgentSession>>;

    /// Create or replace a customer's record
    async fn save_customer_session(&self, session: &CustomerSession) -> Result<()>;

    /// Read a customer's record
    async fn customer_session(&self, customer_id: &str) -> Result<Option<CustomerSession>>;
}

/// Ordered registry of agents eligible for the next offer
///
/// Entries are ordered by `QueueKey`; the smallest key is the oldest.
#[async_trait]
pub trait AvailabilityQueue: Send + Sync {
    /// Insert with the enrollment key (time 0); no-op if already queued
    async fn enroll(&self, agent_id: &str) -> Result<()>;

    /// Agent with the smallest key, without removing it
    async fn peek_oldest(&self) -> Result<Option<String>>;

    /// Delete membership; no error if absent
    async fn remove(&self, agent_id: &str) -> Result<()>;

    /// Atomically remove the agent, reporting whether this call removed it
    ///
    /// Two flows racing for the same agent get exactly one `true`.
    async fn claim(&self, agent_id: &str) -> Result<bool>;

    /// Move the agent behind everyone currently queued (fresh, larger key)
    async fn requeue_to_tail(&self, agent_id: &str) -> Result<()>;

    /// Whether the agent is queued
    async fn contains(&self, agent_id: &str) -> Result<bool>;

    /// All entries, oldest first
    async fn list(&self) -> Result<Vec<(String, QueueKey)>>;

    /// Peek and claim in one step, retrying when another flow wins the race
    async fn claim_oldest(&self) -> Result<Option<String>> {
        loop {
            let Some(agent_id) = self.peek_oldest().await? else {
                return Ok(None);
            };
            if self.claim(&agent_id).await? {
                return Ok(Some(agent_id));
            }
            tracing::debug!(agent_id = %agent_id, "Queue head claimed concurrently, retrying");
        }
    }
}

/// Append-only transcript segments per (customer, agent) pair
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// Add one segment and reset the pair's retention window
    async fn append(&self, customer_id: &str, agent_id: &str, text: &str) -> Result<()>;

    /// All segments in append order; empty when nothing is logged
    async fn read_all(&self, customer_id: &str, agent_id: &str) -> Result<Vec<String>>;

    /// Delete the pair's log immediately
    async fn clear(&self, customer_id: &str, agent_id: &str) -> Result<()>;

    /// The whole log as one newline-joined string
    async fn transcript(&self, customer_id: &str, agent_id: &str) -> Result<String> {
        Ok(self.read_all(customer_id, agent_id).await?.join("\n"))
    }
}

/// Room → active recording id, one per room
#[async_trait]
pub trait EgressRegistry: Send + Sync {
    /// Register a recording; fails with `RecordingActive` if the room has one
    async fn register(&self, room: &str, egress_id: &str) -> Result<EgressRecord>;

    /// Active recording for the room, if any
    async fn get(&self, room: &str) -> Result<Option<EgressRecord>>;

    /// Drop the room's mapping, returning it
    async fn clear(&self, room: &str) -> Result<Option<EgressRecord>>;
}
