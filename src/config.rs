use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::AuthnError;
use crate::provider::ProviderConfig;
use crate::session::DEFAULT_COOKIE_NAME;

const DEFAULT_SCOPES: &str = "openid";
const DEFAULT_CALLBACK_PATH: &str = "/auth/oauth2/callback";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 2;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Issuer and audience of every token the gateway signs.
    pub app_name: String,
    /// Index 0 signs; all verify. See [`crate::secrets::decode_secret`].
    pub shared_secrets: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: String,
    /// Relative path on the requesting host, or an absolute URL.
    pub callback_path: String,
    pub provider_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub client_certificates: bool,
    pub cookie_name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            shared_secrets: Vec::new(),
            auth_url: String::new(),
            token_url: String::new(),
            userinfo_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scopes: DEFAULT_SCOPES.to_string(),
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            client_certificates: true,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn normalize(mut self) -> Result<Self, AuthnError> {
        for (name, value) in [
            ("app_name", &self.app_name),
            ("auth_url", &self.auth_url),
            ("token_url", &self.token_url),
            ("userinfo_url", &self.userinfo_url),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ] {
            if value.trim().is_empty() {
                return Err(AuthnError::InvalidConfig(format!("{name} is required")));
            }
        }
        if self.shared_secrets.first().is_none_or(|s| s.trim().is_empty()) {
            return Err(AuthnError::InvalidConfig(
                "at least one shared secret is required".to_string(),
            ));
        }

        if self.scopes.trim().is_empty() {
            self.scopes = DEFAULT_SCOPES.to_string();
        }
        if self.callback_path.trim().is_empty() {
            self.callback_path = DEFAULT_CALLBACK_PATH.to_string();
        }
        if self.provider_timeout_secs == 0 {
            self.provider_timeout_secs = DEFAULT_PROVIDER_TIMEOUT_SECS;
        }
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = DEFAULT_CONNECT_TIMEOUT_SECS;
        }
        if self.cookie_name.trim().is_empty() {
            self.cookie_name = DEFAULT_COOKIE_NAME.to_string();
        }

        Ok(self)
    }

    /// Reads `AUTHN_*` variables. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, AuthnError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, AuthnError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let string = |key: &str, target: &mut String| {
            if let Some(value) = lookup(key) {
                *target = value;
            }
        };

        string("AUTHN_APP_NAME", &mut config.app_name);
        string("AUTHN_AUTH_URL", &mut config.auth_url);
        string("AUTHN_TOKEN_URL", &mut config.token_url);
        string("AUTHN_USERINFO_URL", &mut config.userinfo_url);
        string("AUTHN_CLIENT_ID", &mut config.client_id);
        string("AUTHN_CLIENT_SECRET", &mut config.client_secret);
        string("AUTHN_SCOPES", &mut config.scopes);
        string("AUTHN_CALLBACK_PATH", &mut config.callback_path);
        string("AUTHN_COOKIE_NAME", &mut config.cookie_name);

        if let Some(secrets) = lookup("AUTHN_SHARED_SECRETS") {
            config.shared_secrets = secrets
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup("AUTHN_PROVIDER_TIMEOUT_SECS") {
            config.provider_timeout_secs = value.trim().parse().map_err(|_| {
                AuthnError::InvalidConfig(format!("AUTHN_PROVIDER_TIMEOUT_SECS: {value:?}"))
            })?;
        }
        if let Some(value) = lookup("AUTHN_CLIENT_CERTIFICATES") {
            config.client_certificates = match value.trim() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(AuthnError::InvalidConfig(format!(
                        "AUTHN_CLIENT_CERTIFICATES: {other:?}"
                    )));
                }
            };
        }

        config.normalize()
    }

    pub fn provider(&self) -> ProviderConfig {
        ProviderConfig {
            auth_url: self.auth_url.clone(),
            token_url: self.token_url.clone(),
            userinfo_url: self.userinfo_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes: self.scopes.clone(),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
