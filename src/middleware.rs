use http::header::{CACHE_CONTROL, COOKIE, HOST, LOCATION, SET_COOKIE};
use http::{HeaderValue, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::helpers::{cookie_value, query_param, validate_return_url};
use crate::session::SessionCookieManager;
use crate::state::StateTokenManager;
use crate::{AuthnError, ExchangeClient, GatewayConfig, SecretSet, TokenCodec};

/// A client certificate the TLS layer has already verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    pub subject_common_name: String,
}

/// Verified client chains, leaf first. Attach it to `http::Request`
/// extensions so [`IncomingRequest::from_http`] can see it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsInfo {
    pub verified_chains: Vec<Vec<PeerCertificate>>,
}

impl TlsInfo {
    pub fn leaf_common_name(&self) -> Option<&str> {
        self.verified_chains
            .first()
            .and_then(|chain| chain.first())
            .map(|cert| cert.subject_common_name.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct IncomingRequest {
    pub method: String,
    /// Request target as received: path plus optional query.
    pub target: String,
    pub host: Option<String>,
    pub cookie_header: Option<String>,
    pub tls: Option<TlsInfo>,
}

impl IncomingRequest {
    pub fn get(target: &str) -> Self {
        Self {
            method: "GET".to_string(),
            target: target.to_string(),
            ..Self::default()
        }
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn with_cookie_header(mut self, cookie_header: &str) -> Self {
        self.cookie_header = Some(cookie_header.to_string());
        self
    }

    pub fn with_tls(mut self, tls: TlsInfo) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn from_http<B>(req: &http::Request<B>) -> Self {
        let cookies: Vec<&str> = req
            .headers()
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();

        Self {
            method: req.method().as_str().to_string(),
            target: req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string()),
            host: req
                .headers()
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .or_else(|| req.uri().authority().map(|a| a.to_string())),
            cookie_header: (!cookies.is_empty()).then(|| cookies.join("; ")),
            tls: req.extensions().get::<TlsInfo>().cloned(),
        }
    }

    fn path(&self) -> &str {
        let end = self.target.find(['?', '#']).unwrap_or(self.target.len());
        &self.target[..end]
    }
}

/// A response the gateway has decided on; the caller must send it and write
/// nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayResponse {
    Redirect {
        location: String,
        set_cookie: Option<String>,
    },
    Error {
        status: u16,
        message: &'static str,
    },
}

impl GatewayResponse {
    fn error(status: u16, message: &'static str) -> Self {
        Self::Error { status, message }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Redirect { .. } => 302,
            Self::Error { status, .. } => *status,
        }
    }

    pub fn into_http(self) -> Result<Response<String>, http::Error> {
        let builder = Response::builder().header(CACHE_CONTROL, "no-store");
        match self {
            Self::Redirect {
                location,
                set_cookie,
            } => {
                let mut builder = builder
                    .status(StatusCode::FOUND)
                    .header(LOCATION, HeaderValue::try_from(location)?);
                if let Some(cookie) = set_cookie {
                    builder = builder.header(SET_COOKIE, HeaderValue::try_from(cookie)?);
                }
                builder.body(String::new())
            }
            Self::Error { status, message } => builder
                .status(StatusCode::from_u16(status)?)
                .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(format!("{message}\n")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    ClientCertificate,
    SessionCookie,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityOutcome {
    Authenticated {
        username: String,
        source: IdentitySource,
    },
    /// Not authenticated; this response has to be sent as-is.
    Respond(GatewayResponse),
}

impl IdentityOutcome {
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Authenticated { username, .. } => Some(username),
            Self::Respond(_) => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

pub enum StrategyOutcome {
    Identified(String),
    /// No proof of identity here; try the next strategy.
    Pass,
    Fault(AuthnError),
}

/// One way of recognising a caller, consulted in order by [`Gateway`].
pub trait IdentityStrategy: Send + Sync {
    fn source(&self) -> IdentitySource;
    fn identify(&self, req: &IncomingRequest) -> StrategyOutcome;
}

pub struct ClientCertificateStrategy;

impl IdentityStrategy for ClientCertificateStrategy {
    fn source(&self) -> IdentitySource {
        IdentitySource::ClientCertificate
    }

    fn identify(&self, req: &IncomingRequest) -> StrategyOutcome {
        match req.tls.as_ref().and_then(TlsInfo::leaf_common_name) {
            Some(name) if !name.is_empty() => StrategyOutcome::Identified(name.to_string()),
            _ => StrategyOutcome::Pass,
        }
    }
}

pub struct SessionCookieStrategy {
    sessions: Arc<SessionCookieManager>,
}

impl SessionCookieStrategy {
    pub fn new(sessions: Arc<SessionCookieManager>) -> Self {
        Self { sessions }
    }
}

impl IdentityStrategy for SessionCookieStrategy {
    fn source(&self) -> IdentitySource {
        IdentitySource::SessionCookie
    }

    fn identify(&self, req: &IncomingRequest) -> StrategyOutcome {
        let Some(value) = cookie_value(req.cookie_header.as_deref(), self.sessions.cookie_name())
        else {
            return StrategyOutcome::Pass;
        };
        match self.sessions.validate(value) {
            Ok(Some(username)) => StrategyOutcome::Identified(username),
            Ok(None) => {
                debug!("invalid session cookie value");
                StrategyOutcome::Pass
            }
            Err(err) => StrategyOutcome::Fault(err),
        }
    }
}

/// Stateless login gateway: identifies callers and runs the provider
/// callback.
pub struct Gateway {
    codec: Arc<TokenCodec>,
    states: StateTokenManager,
    sessions: Arc<SessionCookieManager>,
    exchange: ExchangeClient,
    strategies: Vec<Box<dyn IdentityStrategy>>,
    callback_path: String,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Self, AuthnError> {
        let config = config.normalize()?;
        let secrets = SecretSet::from_config(&config.shared_secrets)?;
        let codec = Arc::new(TokenCodec::new(secrets));
        let exchange = ExchangeClient::new(
            config.provider(),
            config.connect_timeout(),
            config.provider_timeout(),
        )?;
        let sessions = Arc::new(SessionCookieManager::new(
            Arc::clone(&codec),
            &config.app_name,
            &config.cookie_name,
        ));

        let mut strategies: Vec<Box<dyn IdentityStrategy>> = Vec::new();
        if config.client_certificates {
            strategies.push(Box::new(ClientCertificateStrategy));
        }
        strategies.push(Box::new(SessionCookieStrategy::new(Arc::clone(&sessions))));

        info!(
            app = %config.app_name,
            secrets = config.shared_secrets.len(),
            client_certificates = config.client_certificates,
            "authentication gateway ready"
        );

        Ok(Self {
            states: StateTokenManager::new(Arc::clone(&codec), &config.app_name),
            codec,
            sessions,
            exchange,
            strategies,
            callback_path: config.callback_path,
        })
    }

    /// Replaces the whole secret set in one step.
    pub fn rotate_secrets(&self, secrets: SecretSet) -> Result<(), AuthnError> {
        secrets.signing_key()?;
        info!(secrets = secrets.len(), "publishing new secret set");
        self.codec.publish(secrets)
    }

    /// Signs with `secret` from now on while still accepting every current key.
    pub fn prepend_secret(&self, secret: &str) -> Result<(), AuthnError> {
        let key = crate::secrets::decode_secret(secret)?;
        let rotated = self.codec.secrets()?.rotated(key);
        self.rotate_secrets(rotated)
    }

    pub fn sessions(&self) -> &SessionCookieManager {
        &self.sessions
    }

    pub fn states(&self) -> &StateTokenManager {
        &self.states
    }

    pub fn is_callback(&self, req: &IncomingRequest) -> bool {
        req.path() == self.callback_route()
    }

    /// Callback requests go to [`Gateway::handle_callback`]; everything else
    /// is resolved to an identity.
    pub fn handle(&self, req: &IncomingRequest) -> IdentityOutcome {
        if self.is_callback(req) {
            IdentityOutcome::Respond(self.handle_callback(req))
        } else {
            self.resolve_identity(req)
        }
    }

    pub fn resolve_identity(&self, req: &IncomingRequest) -> IdentityOutcome {
        for strategy in &self.strategies {
            match strategy.identify(req) {
                StrategyOutcome::Identified(username) => {
                    return IdentityOutcome::Authenticated {
                        username,
                        source: strategy.source(),
                    };
                }
                StrategyOutcome::Pass => {}
                StrategyOutcome::Fault(err) => {
                    error!(error = %err, source = ?strategy.source(), "identity resolution failed");
                    return IdentityOutcome::Respond(GatewayResponse::error(
                        500,
                        "bad transaction with openid context",
                    ));
                }
            }
        }
        IdentityOutcome::Respond(self.redirect_to_provider(req))
    }

    fn redirect_to_provider(&self, req: &IncomingRequest) -> GatewayResponse {
        let location = self.redirect_uri(req).and_then(|redirect_uri| {
            let state = self.states.issue(&req.target)?;
            self.exchange.authorization_url(&state, &redirect_uri)
        });
        match location {
            Ok(location) => GatewayResponse::Redirect {
                location,
                set_cookie: None,
            },
            Err(AuthnError::MissingHost) => GatewayResponse::error(400, "missing Host header"),
            Err(err) => {
                error!(error = %err, "cannot build provider redirect");
                GatewayResponse::error(500, "Internal Error")
            }
        }
    }

    pub fn handle_callback(&self, req: &IncomingRequest) -> GatewayResponse {
        if req.method != "GET" {
            warn!(method = %req.method, "bad method on oauth2 callback");
            return GatewayResponse::error(405, "Invalid method");
        }

        let code = query_param(&req.target, "code").unwrap_or_default();
        if code.is_empty() {
            warn!("null code");
            return GatewayResponse::error(401, "null code");
        }

        let state = query_param(&req.target, "state").unwrap_or_default();
        let return_url = match self.states.validate(&state) {
            Ok(return_url) => return_url,
            Err(err) => {
                warn!(error = %err, "error processing state");
                return GatewayResponse::error(401, "null or bad inboundState");
            }
        };

        let redirect_uri = match self.redirect_uri(req) {
            Ok(redirect_uri) => redirect_uri,
            Err(_) => return GatewayResponse::error(400, "missing Host header"),
        };

        match self.complete_login(&code, &redirect_uri) {
            Ok(set_cookie) => GatewayResponse::Redirect {
                location: validate_return_url(&return_url),
                set_cookie: Some(set_cookie),
            },
            Err(err) => {
                error!(error = %err, transient = err.is_transient(), "login exchange failed");
                let message = match &err {
                    AuthnError::MissingUsername => "cannot determine username",
                    _ => "bad transaction with openid context",
                };
                GatewayResponse::error(err.status_code(), message)
            }
        }
    }

    fn complete_login(&self, code: &str, redirect_uri: &str) -> Result<String, AuthnError> {
        let token = self.exchange.exchange_code(code, redirect_uri)?;
        let userinfo = self.exchange.fetch_userinfo(&token)?;

        let username = userinfo.derive_username();
        if username.is_empty() {
            return Err(AuthnError::MissingUsername);
        }

        let cookie = self.sessions.issue(username)?;
        info!(%username, "login completed");
        Ok(cookie.header_value())
    }

    fn callback_route(&self) -> &str {
        match self.callback_path.find("://") {
            Some(scheme_end) => {
                let rest = &self.callback_path[scheme_end + 3..];
                rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
            }
            None => &self.callback_path,
        }
    }

    /// Absolute callback URL sent to the provider. A relative callback path
    /// needs the request's Host.
    fn redirect_uri(&self, req: &IncomingRequest) -> Result<String, AuthnError> {
        if self.callback_path.contains("://") {
            return Ok(self.callback_path.clone());
        }
        match req.host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => Ok(format!("https://{host}{}", self.callback_path)),
            _ => {
                warn!(target_path = %req.path(), "no Host header, cannot build redirect_uri");
                Err(AuthnError::MissingHost)
            }
        }
    }
}
