//! # a3s-callroute
//!
//! Agent assignment and call routing for real-time customer support.
//!
//! ## Overview
//!
//! A customer who joins gets a room and a token right away, while an
//! assignment run works through the availability queue in the background:
//! the longest-waiting agent is offered the call, and an agent who rejects or
//! lets the offer time out goes to the back of the queue. Live calls can be
//! recorded, transcribed into a per-call conversation log, and transferred
//! to the next agent together with that history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use a3s_callroute::{Backends, CallCenter, MemoryTransport, RouteConfig, WebhookVerifier};
//! # use a3s_callroute::{MediaPlatform, SpeechToText, TokenIssuer};
//! # use std::sync::Arc;
//!
//! # async fn example(
//! #     media: Arc<dyn MediaPlatform>,
//! #     stt: Arc<dyn SpeechToText>,
//! #     tokens: Arc<dyn TokenIssuer>,
//! # ) -> a3s_callroute::Result<()> {
//! let config = RouteConfig::default();
//! let transport = Arc::new(MemoryTransport::default());
//! let backends = Backends::in_memory(
//!     &config,
//!     transport,
//!     media,
//!     stt,
//!     None,
//!     tokens,
//!     WebhookVerifier::new("webhook-secret")?,
//! );
//!
//! let center = CallCenter::new(backends, &config);
//! center.start().await?;
//!
//! let agent = center.register_agent().await?;
//! let ticket = center.customer_join().await?;
//! println!("{} waits in {}; {} is next up", ticket.customer_id, ticket.room_name, agent.agent_id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Transports
//!
//! - **memory**: broadcast channels, for tests and single-process use
//! - **nats**: core NATS subjects, for agent clients in other processes
//!
//! ## Architecture
//!
//! - **AvailabilityQueue / SessionStore / ConversationLog / EgressRegistry**: shared state
//! - **OfferBroker**: correlates offers with decisions arriving on the bus
//! - **AssignmentEngine**: the offer, wait, rotate loop for one customer
//! - **TransferSaga**: hands a live call to the next agent
//! - **CallCenter**: facade over all of the above

pub mod assignment;
pub mod broker;
pub mod center;
pub mod config;
pub mod error;
pub mod media;
pub mod store;
pub mod token;
pub mod transfer;
pub mod transport;
pub mod types;
pub mod webhook;

// Re-export core types
pub use assignment::AssignmentEngine;
pub use broker::{OfferBroker, PendingOffer};
pub use center::{Backends, CallCenter};
pub use config::{NatsConfig, RecordingConfig, RouteConfig};
pub use error::{Result, RouteError};
pub use media::{MediaPlatform, RecordingService, SpeechToText, Summarizer};
pub use store::{AvailabilityQueue, ConversationLog, EgressRegistry, SessionStore};
pub use token::{AccessClaims, JwtTokenIssuer, TokenIssuer, VideoGrant};
pub use transfer::TransferSaga;
pub use transport::{DecisionBus, DecisionSubscription, NotificationChannel};
pub use types::{
    AcceptedCall, AgentDecision, AgentNotification, AgentSession, AgentSessionUpdate,
    AgentStatus, AssignmentOutcome, CustomerSession, EgressRecord, EgressStatus, JoinTicket,
    QueueKey, TransferOutcome,
};
pub use webhook::{WebhookEvent, WebhookVerifier};

// Re-export backends for convenience
pub use store::memory::{
    MemoryAvailabilityQueue, MemoryConversationLog, MemoryEgressRegistry, MemorySessionStore,
};
pub use transport::memory::{MemoryTransport, MemoryTransportConfig};
pub use transport::nats::{NatsDecisionSubscription, NatsTransport};
