use std::sync::Arc;
use tracing::{debug, warn};

use crate::claims::{Claims, TokenKind};
use crate::helpers::{derive_return_url, now_secs};
use crate::{AuthnError, TokenCodec};

pub const STATE_TOKEN_TTL_SECS: u64 = 300;

/// Mints and checks the `state` parameter carried through the provider
/// round trip.
pub struct StateTokenManager {
    codec: Arc<TokenCodec>,
    issuer: String,
}

impl StateTokenManager {
    pub fn new(codec: Arc<TokenCodec>, issuer: &str) -> Self {
        Self {
            codec,
            issuer: issuer.to_string(),
        }
    }

    pub fn issue(&self, request_target: &str) -> Result<String, AuthnError> {
        self.issue_at(request_target, now_secs())
    }

    pub(crate) fn issue_at(&self, request_target: &str, now: u64) -> Result<String, AuthnError> {
        let claims = Claims::new(
            &self.issuer,
            now,
            STATE_TOKEN_TTL_SECS,
            TokenKind::LoginState {
                return_url: derive_return_url(request_target),
            },
        );
        self.codec.sign(&claims)
    }

    /// Returns the embedded return URL. Every rejection is
    /// [`AuthnError::InvalidState`].
    pub fn validate(&self, token: &str) -> Result<String, AuthnError> {
        self.validate_at(token, now_secs())
    }

    pub(crate) fn validate_at(&self, token: &str, now: u64) -> Result<String, AuthnError> {
        if token.is_empty() {
            debug!("null inbound state");
            return Err(AuthnError::InvalidState);
        }

        let claims: Claims = self.codec.verify(token).map_err(|err| {
            warn!(error = %err, "state token signature check failed");
            AuthnError::InvalidState
        })?;

        let return_url = match claims.kind {
            TokenKind::LoginState { ref return_url } => return_url.clone(),
            TokenKind::Session { .. } => {
                warn!("session token presented as state");
                return Err(AuthnError::InvalidState);
            }
        };

        if claims.issuer != self.issuer || !claims.is_current(now) {
            warn!(
                issuer = %claims.issuer,
                nbf = claims.not_before,
                exp = claims.expiration,
                "invalid state token values"
            );
            return Err(AuthnError::InvalidState);
        }

        Ok(return_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SecretSet;
    use crate::claims::SESSION_SUBJECT;
    use serde_json::json;

    fn manager(issuer: &str) -> (Arc<TokenCodec>, StateTokenManager) {
        let codec = Arc::new(TokenCodec::new(
            SecretSet::from_config(&["state-secret"]).unwrap(),
        ));
        let manager = StateTokenManager::new(Arc::clone(&codec), issuer);
        (codec, manager)
    }

    #[test]
    fn return_url_survives_round_trip() {
        let (_codec, manager) = manager("app");
        let token = manager.issue("/pageA").unwrap();
        assert_eq!(manager.validate(&token).unwrap(), "/pageA");

        let token = manager.issue("/search?q=1#frag").unwrap();
        assert_eq!(manager.validate(&token).unwrap(), "/search?q=1");
    }

    #[test]
    fn offsite_return_url_is_neutralised_at_issue() {
        let (_codec, manager) = manager("app");
        let token = manager.issue("//evil.example/steal").unwrap();
        assert_eq!(manager.validate(&token).unwrap(), "/");
    }

    #[test]
    fn expires_after_five_minutes() {
        let (_codec, manager) = manager("app");
        let token = manager.issue_at("/p", 10_000).unwrap();

        assert!(manager.validate_at(&token, 9_999).is_err());
        assert_eq!(manager.validate_at(&token, 10_000).unwrap(), "/p");
        assert_eq!(manager.validate_at(&token, 10_299).unwrap(), "/p");
        assert!(matches!(
            manager.validate_at(&token, 10_300),
            Err(AuthnError::InvalidState)
        ));
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let (codec, manager) = manager("app");
        let other = StateTokenManager::new(codec, "other-app");
        let token = other.issue("/p").unwrap();
        assert!(matches!(
            manager.validate(&token),
            Err(AuthnError::InvalidState)
        ));
    }

    #[test]
    fn wrong_subject_is_rejected_even_when_well_signed() {
        let (codec, manager) = manager("app");
        let now = now_secs();

        let session = codec
            .sign(&json!({
                "iss": "app", "sub": SESSION_SUBJECT, "aud": ["app"],
                "username": "alice", "return_url": "/p",
                "nbf": now, "iat": now, "exp": now + 60
            }))
            .unwrap();
        assert!(matches!(
            manager.validate(&session),
            Err(AuthnError::InvalidState)
        ));

        let unknown = codec
            .sign(&json!({
                "iss": "app", "sub": "state:something_else", "return_url": "/p",
                "nbf": now, "iat": now, "exp": now + 60
            }))
            .unwrap();
        assert!(matches!(
            manager.validate(&unknown),
            Err(AuthnError::InvalidState)
        ));
    }

    #[test]
    fn empty_and_garbage_state_are_rejected_uniformly() {
        let (_codec, manager) = manager("app");
        for input in ["", "garbage", "a.b.c"] {
            assert!(matches!(
                manager.validate(input),
                Err(AuthnError::InvalidState)
            ));
        }
    }
}
