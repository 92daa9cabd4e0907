//! Core call-routing types
//!
//! Wire-facing types use camelCase JSON serialization so agent clients can
//! exchange them directly over the notification channel and event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether an agent is taking calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
}

/// Call state of a single agent
///
/// Never physically deleted; an agent that leaves is marked offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSession {
    pub agent_id: String,
    pub status: AgentStatus,
    pub on_call: bool,
    pub on_call_with: Option<String>,
    pub room: Option<String>,
    pub last_ping: DateTime<Utc>,
    pub last_call_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AgentSession {
    /// Fresh session that is not on a call
    pub fn new(agent_id: impl Into<String>, status: AgentStatus) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            status,
            on_call: false,
            on_call_with: None,
            room: None,
            last_ping: now,
            last_call_end: None,
            created_at: now,
        }
    }

    /// Online and not busy with a customer
    pub fn is_available(&self) -> bool {
        self.status == AgentStatus::Online && !self.on_call
    }
}

/// Partial update of an `AgentSession`
///
/// Only `Some` fields are written; everything else keeps its stored value.
/// Nullable fields use a nested `Option` so they can be cleared explicitly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentSessionUpdate {
    pub status: Option<AgentStatus>,
    pub on_call: Option<bool>,
    pub on_call_with: Option<Option<String>>,
    pub room: Option<Option<String>>,
    pub last_ping: Option<DateTime<Utc>>,
    pub last_call_end: Option<Option<DateTime<Utc>>>,
}

impl AgentSessionUpdate {
    /// Mark the agent as talking to `customer_id` in `room`
    pub fn on_call(customer_id: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            on_call: Some(true),
            on_call_with: Some(Some(customer_id.into())),
            room: Some(Some(room.into())),
            ..Default::default()
        }
    }

    /// Clear the call fields and stamp the end of the call
    pub fn call_ended() -> Self {
        Self {
            on_call: Some(false),
            on_call_with: Some(None),
            room: Some(None),
            last_call_end: Some(Some(Utc::now())),
            ..Default::default()
        }
    }

    /// Change status only
    pub fn status(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Restore the call fields captured in `previous`
    pub fn restore(previous: &AgentSession) -> Self {
        Self {
            status: Some(previous.status),
            on_call: Some(previous.on_call),
            on_call_with: Some(previous.on_call_with.clone()),
            room: Some(previous.room.clone()),
            last_ping: Some(previous.last_ping),
            last_call_end: Some(previous.last_call_end),
        }
    }

    /// Merge the set fields into `session`
    pub fn apply(&self, session: &mut AgentSession) {
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(on_call) = self.on_call {
            session.on_call = on_call;
        }
        if let Some(ref with) = self.on_call_with {
            session.on_call_with = with.clone();
        }
        if let Some(ref room) = self.room {
            session.room = room.clone();
        }
        if let Some(ping) = self.last_ping {
            session.last_ping = ping;
        }
        if let Some(end) = self.last_call_end {
            session.last_call_end = end;
        }
    }
}

/// Join state of a customer; room and token are fixed for the call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSession {
    pub customer_id: String,
    pub token: String,
    pub room: String,
    pub timestamp: DateTime<Utc>,
}

impl CustomerSession {
    pub fn new(
        customer_id: impl Into<String>,
        token: impl Into<String>,
        room: impl Into<String>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            token: token.into(),
            room: room.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordering key of an availability queue entry
///
/// Compared by `millis` (time made available, 0 for first enrollment) and
/// then by `seq`, a per-queue counter that breaks ties in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueKey {
    pub millis: u64,
    pub seq: u64,
}

/// Accept/reject decision sent by an agent client over the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDecision {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub accepted: bool,
}

impl AgentDecision {
    pub fn accepted(agent_id: impl Into<String>, customer_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            customer_id: Some(customer_id.into()),
            accepted: true,
        }
    }

    pub fn rejected(agent_id: impl Into<String>, customer_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            customer_id: Some(customer_id.into()),
            accepted: false,
        }
    }
}

/// Message pushed to one connected agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "camelCase")]
pub enum AgentNotification {
    /// A customer is waiting; answer with an `AgentDecision`
    #[serde(rename_all = "camelCase")]
    Offer {
        customer_id: String,
        room_name: String,
    },
    /// A call handed over from another agent, with its history
    #[serde(rename_all = "camelCase")]
    Transfer {
        customer_id: String,
        room: String,
        conversation: String,
        transferred_from: String,
    },
    /// Confirmation to the agent who handed the call over
    #[serde(rename_all = "camelCase")]
    TransferComplete {
        customer_id: String,
        transferred_to: String,
    },
}

/// Room → external recording id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressRecord {
    pub room: String,
    pub egress_id: String,
    pub started_at: DateTime<Utc>,
}

/// Recording state reported by the media platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EgressStatus {
    /// Still recording or finalizing the file
    Active,
    /// Finished; the artifact can be fetched from `location`
    Completed { location: String },
    /// Terminal failure
    Failed { reason: String },
}

impl EgressStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EgressStatus::Active)
    }
}

/// How an assignment run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentOutcome {
    /// `agent_id` accepted after `offers` offers
    Assigned { agent_id: String, offers: usize },
    /// The queue ran dry after `offers` offers
    NoAgentAvailable { offers: usize },
}

/// Returned to a customer right after joining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTicket {
    pub customer_id: String,
    pub room_name: String,
    pub token: String,
}

/// Returned to an agent that accepted a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedCall {
    pub agent_id: String,
    pub customer_id: String,
    pub token: String,
    pub room: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Result of a completed transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub agent_id: String,
    pub customer_id: String,
    pub token: String,
    pub room: String,
}

/// Current time in Unix milliseconds
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_agent_session_is_available() {
        let session = AgentSession::new("agent-a", AgentStatus::Online);
        assert!(session.is_available());
        assert!(session.on_call_with.is_none());
        assert!(session.last_call_end.is_none());

        let offline = AgentSession::new("agent-b", AgentStatus::Offline);
        assert!(!offline.is_available());
    }

    #[test]
    fn test_update_merges_only_set_fields() {
        let mut session = AgentSession::new("agent-a", AgentStatus::Online);
        let created = session.created_at;

        AgentSessionUpdate::on_call("cust-1", "room-1").apply(&mut session);
        assert!(session.on_call);
        assert_eq!(session.on_call_with.as_deref(), Some("cust-1"));
        assert_eq!(session.room.as_deref(), Some("room-1"));
        assert_eq!(session.status, AgentStatus::Online);
        assert_eq!(session.created_at, created);

        AgentSessionUpdate::call_ended().apply(&mut session);
        assert!(!session.on_call);
        assert!(session.on_call_with.is_none());
        assert!(session.room.is_none());
        assert!(session.last_call_end.is_some());
    }

    #[test]
    fn test_restore_reverts_call_fields() {
        let mut session = AgentSession::new("agent-a", AgentStatus::Online);
        let before = session.clone();
        AgentSessionUpdate::on_call("cust-1", "room-1").apply(&mut session);
        AgentSessionUpdate::restore(&before).apply(&mut session);
        assert_eq!(session, before);
    }

    #[test]
    fn test_queue_key_ordering() {
        let enrolled = QueueKey { millis: 0, seq: 5 };
        let earlier = QueueKey { millis: 0, seq: 1 };
        let rotated = QueueKey { millis: 1_700_000_000_000, seq: 2 };
        assert!(earlier < enrolled);
        assert!(enrolled < rotated);
    }

    #[test]
    fn test_decision_wire_format() {
        let json = r#"{"agentId":"a1","customerId":"c1","accepted":true}"#;
        let decision: AgentDecision = serde_json::from_str(json).unwrap();
        assert_eq!(decision, AgentDecision::accepted("a1", "c1"));

        // Missing accepted flag counts as a rejection
        let decision: AgentDecision = serde_json::from_str(r#"{"agentId":"a1"}"#).unwrap();
        assert!(!decision.accepted);
        assert!(decision.customer_id.is_none());
    }

    #[test]
    fn test_offer_notification_wire_format() {
        let offer = AgentNotification::Offer {
            customer_id: "c1".to_string(),
            room_name: "c1".to_string(),
        };
        let json = serde_json::to_string(&offer).unwrap();
        assert!(json.contains("\"topic\":\"offer\""));
        assert!(json.contains("\"customerId\":\"c1\""));
        assert!(json.contains("\"roomName\":\"c1\""));
    }

    #[test]
    fn test_transfer_notification_wire_format() {
        let transfer = AgentNotification::Transfer {
            customer_id: "c1".to_string(),
            room: "c1".to_string(),
            conversation: "hello\nworld".to_string(),
            transferred_from: "a1".to_string(),
        };
        let json = serde_json::to_string(&transfer).unwrap();
        assert!(json.contains("\"topic\":\"transfer\""));
        assert!(json.contains("\"transferredFrom\":\"a1\""));

        let done = AgentNotification::TransferComplete {
            customer_id: "c1".to_string(),
            transferred_to: "a2".to_string(),
        };
        let json = serde_json::to_string(&done).unwrap();
        assert!(json.contains("\"topic\":\"transferComplete\""));
        assert!(json.contains("\"transferredTo\":\"a2\""));
    }

    #[test]
    fn test_egress_status_terminal() {
        assert!(!EgressStatus::Active.is_terminal());
        assert!(EgressStatus::Completed { location: "s3://x".into() }.is_terminal());
        assert!(EgressStatus::Failed { reason: "boom".into() }.is_terminal());
    }
}
