use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::AuthnError;

/// Static description of the OAuth2 provider. Never mutated after startup.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    #[serde(default, rename = "sub")]
    pub subject: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub preferred_username: String,
    #[serde(default)]
    pub email: String,
}

impl UserInfo {
    /// First non-empty of `username`, `login`, `preferred_username`,
    /// `email`. An empty result is a failed login, not an identity.
    pub fn derive_username(&self) -> &str {
        [
            &self.username,
            &self.login,
            &self.preferred_username,
            &self.email,
        ]
        .into_iter()
        .find(|candidate| !candidate.is_empty())
        .map(String::as_str)
        .unwrap_or("")
    }
}

/// Drives the authorization-code flow against one provider.
pub struct ExchangeClient {
    config: ProviderConfig,
    client: Client,
}

impl ExchangeClient {
    pub fn new(
        config: ProviderConfig,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, AuthnError> {
        Url::parse(&config.auth_url)?;
        Url::parse(&config.token_url)?;
        Url::parse(&config.userinfo_url)?;

        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<String, AuthnError> {
        let mut auth_url = Url::parse(&self.config.auth_url)?;
        {
            let mut pairs = auth_url.query_pairs_mut();
            pairs
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("scope", &self.config.scopes)
                .append_pair("redirect_uri", redirect_uri);
            if !state.is_empty() {
                pairs.append_pair("state", state);
            }
        }
        Ok(auth_url.to_string())
    }

    pub fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<AccessToken, AuthnError> {
        let token: AccessToken = self.post_form(
            &self.config.token_url,
            &[
                ("redirect_uri", redirect_uri),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ],
        )?;

        if token.token_type != "Bearer" || token.access_token.is_empty() {
            warn!(token_type = %token.token_type, "token endpoint returned unusable token");
            return Err(AuthnError::InvalidTokenResponse(format!(
                "token type {:?}",
                token.token_type
            )));
        }

        Ok(token)
    }

    pub fn fetch_userinfo(&self, access_token: &AccessToken) -> Result<UserInfo, AuthnError> {
        self.post_form(
            &self.config.userinfo_url,
            &[("access_token", access_token.access_token.as_str())],
        )
    }

    fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<T, AuthnError> {
        let response = self.client.post(url).form(form).send().map_err(timeout_aware)?;
        let status = response.status();
        let body = response.bytes().map_err(timeout_aware)?;

        if status.as_u16() >= 300 {
            debug!(%url, %status, body = %String::from_utf8_lossy(&body), "provider call failed");
            return Err(AuthnError::ProviderStatus(status.as_u16()));
        }

        serde_json::from_slice(&body).map_err(|err| {
            debug!(%url, body = %String::from_utf8_lossy(&body), "undecodable provider response");
            AuthnError::Json(err)
        })
    }
}

fn timeout_aware(err: reqwest::Error) -> AuthnError {
    if err.is_timeout() {
        AuthnError::ProviderTimeout
    } else {
        AuthnError::Http(err)
    }
}
