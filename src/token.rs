//! Room access tokens
//!
//! `JwtTokenIssuer` produces LiveKit-compatible access tokens: an HS256 JWT
//! whose `video` claim grants joining, publishing and subscribing in a
//! single room.

use crate::error::{Result, RouteError};
use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Issues credentials for joining a media room
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Token letting `identity` join `room`
    async fn create_token(&self, identity: &str, room: &str) -> Result<String>;
}

/// Room permissions carried in the token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    pub room_join: bool,
    pub room: String,
    pub can_publish: bool,
    pub can_subscribe: bool,
}

/// JWT claims of an access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub sub: String,
    pub nbf: u64,
    pub exp: u64,
    pub video: VideoGrant,
}

/// HS256 token issuer keyed by an API key/secret pair
pub struct JwtTokenIssuer {
    api_key: String,
    api_secret: String,
    ttl: Duration,
}

impl std::fmt::Debug for JwtTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtTokenIssuer")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[redacted]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl JwtTokenIssuer {
    /// Create an issuer; both credentials must be non-empty
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        let api_secret = api_secret.into();
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(RouteError::Config(
                "Missing media platform API credentials".to_string(),
            ));
        }
        Ok(Self {
            api_key,
            api_secret,
            ttl,
        })
    }

    /// Claims for `identity` in `room`, valid from now for the configured ttl
    pub fn claims(&self, identity: &str, room: &str) -> AccessClaims {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        AccessClaims {
            iss: self.api_key.clone(),
            sub: identity.to_string(),
            nbf: now,
            exp: now + self.ttl.as_secs(),
            video: VideoGrant {
                room_join: true,
                room: room.to_string(),
                can_publish: true,
                can_subscribe: true,
            },
        }
    }

    /// Encode and sign `claims`
    pub fn sign(&self, claims: &AccessClaims) -> Result<String> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )
        .map_err(|e| RouteError::Config(format!("Failed to sign access token: {}", e)))
    }

    /// Check a token's signature and expiry, returning its claims
    pub fn verify(&self, token: &str) -> Result<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let data = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.api_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => RouteError::Unauthorized("token expired".to_string()),
            ErrorKind::InvalidSignature => {
                RouteError::Unauthorized("token signature mismatch".to_string())
            }
            _ => RouteError::Unauthorized(format!("invalid token: {}", e)),
        })?;
        Ok(data.claims)
    }
}

#[async_trait]
impl TokenIssuer for JwtTokenIssuer {
    async fn create_token(&self, identity: &str, room: &str) -> Result<String> {
        let token = self.sign(&self.claims(identity, room))?;
        tracing::debug!(identity = %identity, room = %room, "Access token issued");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> JwtTokenIssuer {
        JwtTokenIssuer::new("APIkey123", "s3cret-value", Duration::from_secs(3600)).unwrap()
    }

    #[test]
    fn test_missing_credentials_rejected() {
        assert!(matches!(
            JwtTokenIssuer::new("", "secret", Duration::from_secs(60)),
            Err(RouteError::Config(_))
        ));
        assert!(matches!(
            JwtTokenIssuer::new("key", "", Duration::from_secs(60)),
            Err(RouteError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_token_carries_room_grant() {
        let issuer = issuer();
        let token = issuer.create_token("agent-a", "room-c1").await.unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.iss, "APIkey123");
        assert_eq!(claims.sub, "agent-a");
        assert_eq!(claims.exp - claims.nbf, 3600);
        assert!(claims.video.room_join);
        assert_eq!(claims.video.room, "room-c1");
    }

    #[test]
    fn test_configured_ttl() {
        let ttl = crate::config::RouteConfig::default().token_ttl();
        let issuer = JwtTokenIssuer::new("APIkey123", "s3cret-value", ttl).unwrap();
        let claims = issuer.claims("agent-a", "room-1");
        assert_eq!(claims.exp - claims.nbf, 6 * 60 * 60);
    }

    #[test]
    fn test_claims_json_shape() {
        let claims = issuer().claims("cust-1", "cust-1");
        let json = serde_json::to_string(&claims).unwrap();
        assert!(json.contains("\"roomJoin\":true"));
        assert!(json.contains("\"canPublish\":true"));
        assert!(json.contains("\"canSubscribe\":true"));
    }

    #[test]
    fn test_token_from_other_secret_fails() {
        let other =
            JwtTokenIssuer::new("APIkey123", "different", Duration::from_secs(3600)).unwrap();
        let token = other.sign(&other.claims("agent-a", "room-1")).unwrap();
        assert!(matches!(
            issuer().verify(&token),
            Err(RouteError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_fails() {
        let issuer = issuer();
        let mut claims = issuer.claims("agent-a", "room-1");
        claims.nbf -= 7200;
        claims.exp -= 7200;
        let token = issuer.sign(&claims).unwrap();
        assert!(matches!(issuer.verify(&token), Err(RouteError::Unauthorized(_))));
    }

    #[test]
    fn test_garbage_token_fails() {
        let issuer = issuer();
        assert!(matches!(issuer.verify("not-a-jwt"), Err(RouteError::Unauthorized(_))));
        assert!(matches!(issuer.verify(""), Err(RouteError::Unauthorized(_))));
    }

    #[test]
    fn test_header_names_hs256() {
        let issuer = issuer();
        let token = issuer.sign(&issuer.claims("agent-a", "room-1")).unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS256);
        assert_eq!(header.typ.as_deref(), Some("JWT"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", issuer());
        assert!(!rendered.contains("s3cret-value"));
        assert!(rendered.contains("[redacted]"));
    }
}
