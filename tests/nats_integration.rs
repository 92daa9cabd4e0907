//! NATS transport integration tests
//!
//! These tests require a running NATS server:
//!   nats-server
//!
//! Tests are skipped automatically if NATS is not available.

use a3s_callroute::{
    AgentDecision, AgentNotification, AgentSession, AgentStatus, AssignmentEngine,
    AssignmentOutcome, AvailabilityQueue, DecisionBus, DecisionSubscription,
    MemoryAvailabilityQueue, MemorySessionStore, NatsConfig, NatsTransport, NotificationChannel,
    OfferBroker, SessionStore,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

/// Try to connect to NATS. Returns None if server is unavailable.
async fn try_nats(prefix: &str) -> Option<NatsTransport> {
    let config = NatsConfig {
        url: "nats://127.0.0.1:4222".to_string(),
        subject_prefix: format!("test.{}", prefix),
        connection_name: Some("callroute-tests".to_string()),
    };

    match NatsTransport::connect(config).await {
        Ok(transport) => Some(transport),
        Err(_) => {
            eprintln!("NATS not available, skipping integration test");
            None
        }
    }
}

macro_rules! nats_transport {
    ($prefix:expr) => {
        match try_nats($prefix).await {
            Some(t) => t,
            None => return,
        }
    };
}

#[tokio::test]
async fn test_nats_notification_reaches_agent_subject() {
    let transport = nats_transport!("notify");
    let mut agent_sub = transport
        .client()
        .subscribe(transport.notification_subject("a1"))
        .await
        .unwrap();

    transport
        .notify(
            "a1",
            &AgentNotification::Offer {
                customer_id: "c1".to_string(),
                room_name: "c1".to_string(),
            },
        )
        .await
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), agent_sub.next())
        .await
        .unwrap()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
    assert_eq!(json["topic"], "offer");
    assert_eq!(json["customerId"], "c1");
    assert_eq!(json["roomName"], "c1");
}

#[tokio::test]
async fn test_nats_decision_roundtrip() {
    let transport = nats_transport!("decision");
    let mut subscription = transport.subscribe().await.unwrap();

    transport
        .publish(&AgentDecision::rejected("a1", "c9"))
        .await
        .unwrap();

    let next = DecisionSubscription::next(subscription.as_mut());
    let decision = tokio::time::timeout(Duration::from_secs(5), next)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(decision.agent_id, "a1");
    assert_eq!(decision.customer_id.as_deref(), Some("c9"));
    assert!(!decision.accepted);
}

#[tokio::test]
async fn test_nats_decision_without_accepted_field_is_rejection() {
    let transport = nats_transport!("lenient");
    let mut subscription = transport.subscribe().await.unwrap();

    // Agent clients may omit `accepted` on a decline
    transport
        .client()
        .publish(
            transport.decision_subject(),
            br#"{"agentId":"a2","customerId":"c2"}"#.to_vec().into(),
        )
        .await
        .unwrap();
    transport.client().flush().await.unwrap();

    let next = DecisionSubscription::next(subscription.as_mut());
    let decision = tokio::time::timeout(Duration::from_secs(5), next)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(decision.agent_id, "a2");
    assert!(!decision.accepted);
}

#[tokio::test]
async fn test_nats_assignment_end_to_end() {
    let transport = Arc::new(nats_transport!("assign"));
    let queue = Arc::new(MemoryAvailabilityQueue::default());
    let sessions = Arc::new(MemorySessionStore::default());
    let broker = Arc::new(OfferBroker::new());
    let _listener = broker.spawn_listener(transport.subscribe().await.unwrap());

    sessions
        .save_agent_session(&AgentSession::new("agent-1", AgentStatus::Online))
        .await
        .unwrap();
    queue.enroll("agent-1").await.unwrap();

    // Agent client: accept the first offer over the wire
    let mut offers = transport
        .client()
        .subscribe(transport.notification_subject("agent-1"))
        .await
        .unwrap();
    let client = transport.clone();
    tokio::spawn(async move {
        if let Some(message) = offers.next().await {
            if let Ok(AgentNotification::Offer { customer_id, .. }) =
                serde_json::from_slice(&message.payload)
            {
                client
                    .publish(&AgentDecision::accepted("agent-1", customer_id))
                    .await
                    .unwrap();
            }
        }
    });

    let engine = AssignmentEngine::new(
        queue.clone(),
        sessions.clone(),
        transport.clone(),
        broker,
        Duration::from_secs(5),
    );
    let outcome = engine.assign("cust-1", "cust-1").await.unwrap();
    assert_eq!(
        outcome,
        AssignmentOutcome::Assigned {
            agent_id: "agent-1".to_string(),
            offers: 1
        }
    );

    let session = sessions.agent_session("agent-1").await.unwrap().unwrap();
    assert_eq!(session.on_call_with.as_deref(), Some("cust-1"));
    assert!(queue.list().await.unwrap().is_empty());
}
