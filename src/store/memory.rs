//! In-memory store implementations
//!
//! Suitable for tests and single-process deployments. Each structure keeps
//! its state behind one lock so every trait operation is atomic.

use super::{AvailabilityQueue, ConversationLog, EgressRegistry, SessionStore};
use crate::error::{Result, RouteError};
use crate::types::{
    now_millis, AgentSession, AgentSessionUpdate, CustomerSession, EgressRecord, QueueKey,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60 * 24);

// ============================================================================
// Sessions
// ============================================================================

/// In-memory session store
#[derive(Default)]
pub struct MemorySessionStore {
    agents: Arc<RwLock<HashMap<String, AgentSession>>>,
    customers: Arc<RwLock<HashMap<String, CustomerSession>>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save_agent_session(&self, session: &AgentSession) -> Result<()> {
        let mut agents = self.agents.write().await;
        agents.insert(session.agent_id.clone(), session.clone());
        Ok(())
    }

    async fn agent_session(&self, agent_id: &str) -> Result<Option<AgentSession>> {
        let agents = self.agents.read().await;
        Ok(agents.get(agent_id).cloned())
    }

    async fn update_agent_session(
        &self,
        agent_id: &str,
        update: &AgentSessionUpdate,
    ) -> Result<Option<AgentSession>> {
        let mut agents = self.agents.write().await;
        Ok(agents.get_mut(agent_id).map(|session| {
            update.apply(session);
            session.clone()
        }))
    }

    async fn save_customer_session(&self, session: &CustomerSession) -> Result<()> {
        let mut customers = self.customers.write().await;
        customers.insert(session.customer_id.clone(), session.clone());
        Ok(())
    }

    async fn customer_session(&self, customer_id: &str) -> Result<Option<CustomerSession>> {
        let customers = self.customers.read().await;
        Ok(customers.get(customer_id).cloned())
    }
}

// ============================================================================
// Availability queue
// ============================================================================

#[derive(Default)]
struct QueueState {
    order: BTreeMap<QueueKey, String>,
    keys: HashMap<String, QueueKey>,
    next_seq: u64,
}

impl QueueState {
    fn next_key(&mut self, millis: u64) -> QueueKey {
        self.next_seq += 1;
        QueueKey {
            millis,
            seq: self.next_seq,
        }
    }

    fn insert(&mut self, agent_id: &str, key: QueueKey) {
        self.order.insert(key, agent_id.to_string());
        self.keys.insert(agent_id.to_string(), key);
    }

    fn take(&mut self, agent_id: &str) -> Option<QueueKey> {
        let key = self.keys.remove(agent_id)?;
        self.order.remove(&key);
        Some(key)
    }
}

/// In-memory availability queue with FIFO-with-rotation ordering
#[derive(Default)]
pub struct MemoryAvailabilityQueue {
    state: Mutex<QueueState>,
}

impl MemoryAvailabilityQueue {
    pub async fn len(&self) -> usize {
        self.state.lock().await.keys.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AvailabilityQueue for MemoryAvailabilityQueue {
    async fn enroll(&self, agent_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.keys.contains_key(agent_id) {
            return Ok(());
        }
        let key = state.next_key(0);
        state.insert(agent_id, key);
        Ok(())
    }

    async fn peek_oldest(&self) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.order.values().next().cloned())
    }

    async fn remove(&self, agent_id: &str) -> Result<()> {
        self.state.lock().await.take(agent_id);
        Ok(())
    }

    async fn claim(&self, agent_id: &str) -> Result<bool> {
        Ok(self.state.lock().await.take(agent_id).is_some())
    }

    async fn requeue_to_tail(&self, agent_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.take(agent_id);
        let key = state.next_key(now_millis());
        state.insert(agent_id, key);
        Ok(())
    }

    async fn contains(&self, agent_id: &str) -> Result<bool> {
        Ok(self.state.lock().await.keys.contains_key(agent_id))
    }

    async fn list(&self) -> Result<Vec<(String, QueueKey)>> {
        let state = self.state.lock().await;
        Ok(state
            .order
            .iter()
            .map(|(key, agent_id)| (agent_id.clone(), *key))
            .collect())
    }

    async fn claim_oldest(&self) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        let Some((&key, _)) = state.order.iter().next() else {
            return Ok(None);
        };
        let agent_id = state.order.remove(&key);
        if let Some(ref id) = agent_id {
            state.keys.remove(id);
        }
        Ok(agent_id)
    }
}

// ============================================================================
// Conversation log
// ============================================================================

struct Segments {
    entries: Vec<String>,
    expires_at: Instant,
}

/// In-memory conversation log with a sliding retention window
pub struct MemoryConversationLog {
    logs: RwLock<HashMap<(String, String), Segments>>,
    ttl: Duration,
}

impl MemoryConversationLog {
    pub fn new(ttl: Duration) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

impl Default for MemoryConversationLog {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

fn pair(customer_id: &str, agent_id: &str) -> (String, String) {
    (customer_id.to_string(), agent_id.to_string())
}

#[async_trait]
impl ConversationLog for MemoryConversationLog {
    async fn append(&self, customer_id: &str, agent_id: &str, text: &str) -> Result<()> {
        let now = Instant::now();
        let expires_at = now + self.ttl;
        let mut logs = self.logs.write().await;
        let segments = logs
            .entry(pair(customer_id, agent_id))
            .or_insert_with(|| Segments {
                entries: Vec::new(),
                expires_at,
            });

        // An expired log starts over rather than resurrecting old segments
        if segments.expires_at <= now {
            segments.entries.clear();
        }
        segments.entries.push(text.to_string());
        segments.expires_at = expires_at;
        Ok(())
    }

    async fn read_all(&self, customer_id: &str, agent_id: &str) -> Result<Vec<String>> {
        let key = pair(customer_id, agent_id);
        {
            let logs = self.logs.read().await;
            match logs.get(&key) {
                None => return Ok(Vec::new()),
                Some(segments) if segments.expires_at > Instant::now() => {
                    return Ok(segments.entries.clone())
                }
                Some(_) => {}
            }
        }

        let mut logs = self.logs.write().await;
        if logs
            .get(&key)
            .is_some_and(|segments| segments.expires_at <= Instant::now())
        {
            logs.remove(&key);
        }
        Ok(Vec::new())
    }

    async fn clear(&self, customer_id: &str, agent_id: &str) -> Result<()> {
        self.logs.write().await.remove(&pair(customer_id, agent_id));
        Ok(())
    }
}

// ============================================================================
// Egress registry
// ============================================================================

/// In-memory room → recording registry with bounded retention
pub struct MemoryEgressRegistry {
    records: RwLock<HashMap<String, (EgressRecord, Instant)>>,
    ttl: Duration,
}

impl MemoryEgressRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

impl Default for MemoryEgressRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

#[async_trait]
impl EgressRegistry for MemoryEgressRegistry {
    async fn register(&self, room: &str, egress_id: &str) -> Result<EgressRecord> {
        let now = Instant::now();
        let mut records = self.records.write().await;
        if let Some((existing, expires_at)) = records.get(room) {
            if *expires_at > now {
                return Err(RouteError::RecordingActive {
                    room: room.to_string(),
                    egress_id: existing.egress_id.clone(),
                });
            }
        }

        let record = EgressRecord {
            room: room.to_string(),
            egress_id: egress_id.to_string(),
            started_at: chrono::Utc::now(),
        };
        records.insert(room.to_string(), (record.clone(), now + self.ttl));
        Ok(record)
    }

    async fn get(&self, room: &str) -> Result<Option<EgressRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(room)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(record, _)| record.clone()))
    }

    async fn clear(&self, room: &str) -> Result<Option<EgressRecord>> {
        let mut records = self.records.write().await;
        Ok(records
            .remove(room)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(record, _)| record))
    }
}
