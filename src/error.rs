//! Error types for a3s-callroute

use thiserror::Error;

/// Errors that can occur while routing calls
#[derive(Debug, Error)]
pub enum RouteError {
    /// The availability queue had no agent to offer or transfer to
    #[error("No agent available")]
    NoAgentAvailable,

    /// A session, egress mapping or other record is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// A recording is already registered for the room
    #[error("Recording already active for room '{room}' (egress {egress_id})")]
    RecordingActive { room: String, egress_id: String },

    /// An external platform (telephony, STT, summarization) failed
    #[error("{service} failed: {reason}")]
    Upstream { service: String, reason: String },

    /// A bounded operation ran past its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Signature or credential check failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Transport connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Publish failure on a transport subject
    #[error("Failed to publish to subject '{subject}': {reason}")]
    Publish { subject: String, reason: String },

    /// Subscribe failure on a transport subject
    #[error("Failed to subscribe to subject '{subject}': {reason}")]
    Subscribe { subject: String, reason: String },

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RouteError {
    /// Shorthand for an upstream failure of a named service
    pub fn upstream(service: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Upstream {
            service: service.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for routing operations
pub type Result<T> = std::result::Result<T, RouteError>;
