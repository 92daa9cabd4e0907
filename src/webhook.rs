//! Inbound media platform webhooks
//!
//! Requests are signed with a hex HMAC-SHA256 of the raw body, keyed by the
//! platform secret. Anything that fails verification is rejected before the
//! body is even parsed.

use crate::error::{Result, RouteError};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies webhook signatures
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[redacted]")
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(RouteError::Config("Webhook secret must not be empty".to_string()));
        }
        Ok(Self { secret })
    }

    /// Hex signature for `body`
    pub fn sign(&self, body: &[u8]) -> Result<String> {
        Ok(hex::encode(self.mac(body)?.finalize().into_bytes()))
    }

    /// Check `signature` against `body` in constant time
    pub fn verify(&self, body: &[u8], signature: &str) -> Result<()> {
        let expected = hex::decode(signature.trim())
            .map_err(|_| RouteError::Unauthorized("malformed webhook signature".to_string()))?;
        self.mac(body)?
            .verify_slice(&expected)
            .map_err(|_| RouteError::Unauthorized("webhook signature mismatch".to_string()))
    }

    fn mac(&self, body: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| RouteError::Config(format!("Invalid webhook secret: {}", e)))?;
        mac.update(body);
        Ok(mac)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebhookRoom {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebhookParticipant {
    pub identity: String,
}

/// A room, participant, track or egress lifecycle event
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub room: Option<WebhookRoom>,
    #[serde(default)]
    pub participant: Option<WebhookParticipant>,
    #[serde(default)]
    pub egress_id: Option<String>,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn room_name(&self) -> Option<&str> {
        self.room.as_ref().map(|r| r.name.as_str())
    }

    pub fn participant_identity(&self) -> Option<&str> {
        self.participant.as_ref().map(|p| p.identity.as_str())
    }
}
