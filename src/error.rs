use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthnError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid authenticator state, no shared secrets")]
    NoSigningSecret,
    #[error("no valid key found")]
    NoValidKey,
    #[error("invalid state")]
    InvalidState,
    #[error("bad cookie value state")]
    InvalidSession,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("provider returned status {0}")]
    ProviderStatus(u16),
    #[error("provider request timed out")]
    ProviderTimeout,
    #[error("invalid token response: {0}")]
    InvalidTokenResponse(String),
    #[error("userinfo carries no usable username")]
    MissingUsername,
    #[error("request carries no Host header")]
    MissingHost,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthnError {
    /// Timeouts and connection failures against the provider may succeed on
    /// a later attempt; everything else will not.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthnError::ProviderTimeout => true,
            AuthnError::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AuthnError::MissingHost => 400,
            err if err.is_transient() => 503,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_faults_map_to_service_unavailable() {
        assert!(AuthnError::ProviderTimeout.is_transient());
        assert_eq!(AuthnError::ProviderTimeout.status_code(), 503);

        assert!(!AuthnError::ProviderStatus(502).is_transient());
        assert_eq!(AuthnError::ProviderStatus(502).status_code(), 500);
        assert_eq!(AuthnError::NoSigningSecret.status_code(), 500);
        assert_eq!(AuthnError::MissingHost.status_code(), 400);
    }
}
