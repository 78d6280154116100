use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::claims::{Claims, TokenKind};
use crate::helpers::{http_date, now_secs};
use crate::{AuthnError, TokenCodec};

pub const DEFAULT_COOKIE_NAME: &str = "auth_cookie";
pub const SESSION_TTL_SECS: u64 = 2 * 60 * 60;

/// A session cookie ready to be written as a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub expires: u64,
}

impl SessionCookie {
    pub fn header_value(&self) -> String {
        format!(
            "{}={}; Path=/; Expires={}; HttpOnly; Secure; SameSite=Lax",
            self.name,
            self.value,
            http_date(self.expires)
        )
    }
}

pub struct SessionCookieManager {
    codec: Arc<TokenCodec>,
    issuer: String,
    cookie_name: String,
}

impl SessionCookieManager {
    pub fn new(codec: Arc<TokenCodec>, issuer: &str, cookie_name: &str) -> Self {
        Self {
            codec,
            issuer: issuer.to_string(),
            cookie_name: cookie_name.to_string(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn issue(&self, username: &str) -> Result<SessionCookie, AuthnError> {
        self.issue_at(username, now_secs())
    }

    pub(crate) fn issue_at(&self, username: &str, now: u64) -> Result<SessionCookie, AuthnError> {
        let claims = Claims::new(
            &self.issuer,
            now,
            SESSION_TTL_SECS,
            TokenKind::Session {
                username: username.to_string(),
            },
        );
        let value = self.codec.sign(&claims)?;
        Ok(SessionCookie {
            name: self.cookie_name.clone(),
            value,
            expires: claims.expiration,
        })
    }

    /// `Ok(None)` means "not authenticated" and should lead to a fresh
    /// login. An error is returned only for a correctly signed, current
    /// token that names no user.
    pub fn validate(&self, cookie_value: &str) -> Result<Option<String>, AuthnError> {
        self.validate_at(cookie_value, now_secs())
    }

    pub(crate) fn validate_at(
        &self,
        cookie_value: &str,
        now: u64,
    ) -> Result<Option<String>, AuthnError> {
        if cookie_value.is_empty() {
            debug!("empty session cookie value");
            return Ok(None);
        }

        let claims: Claims = match self.codec.verify(cookie_value) {
            Ok(claims) => claims,
            Err(err) => {
                warn!(error = %err, "session cookie rejected");
                return Ok(None);
            }
        };

        let username = match claims.kind {
            TokenKind::Session { ref username } => username.clone(),
            TokenKind::LoginState { .. } => {
                warn!("state token presented as session cookie");
                return Ok(None);
            }
        };

        if claims.issuer != self.issuer || !claims.is_current(now) {
            debug!(
                issuer = %claims.issuer,
                nbf = claims.not_before,
                exp = claims.expiration,
                "invalid session cookie values"
            );
            return Ok(None);
        }

        if username.is_empty() {
            error!("validly signed session cookie carries no username");
            return Err(AuthnError::InvalidSession);
        }

        Ok(Some(username))
    }
}
