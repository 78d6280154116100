//! Stateless login gateway for web applications.
//!
//! The gateway runs the OAuth2 authorization-code flow against an OpenID
//! Connect style provider and afterwards recognises callers from a signed
//! session cookie alone. Nothing is stored server-side.
//!
//! # How it works
//!
//! 1. A request arrives. If the TLS layer verified a client certificate, its
//!    leaf common name is the identity and cookies are not consulted.
//! 2. Otherwise the session cookie is checked. A missing, expired or forged
//!    cookie leads to a 302 to the provider's authorize endpoint. The
//!    `state` parameter is a signed, five-minute token carrying the page the
//!    user asked for.
//! 3. The provider redirects back to the callback path. The gateway checks
//!    the state token, trades the code for an access token, fetches
//!    userinfo and sets a two-hour session cookie before redirecting to the
//!    original page.
//!
//! # Tokens and rotation
//!
//! Both tokens are HS256 JWTs. New tokens are signed with the first shared
//! secret; every configured secret is accepted on verification, so a new
//! secret can be prepended and the old one dropped once its tokens expired.
//!
//! # Example
//!
//! ```no_run
//! use authn_gateway::{Gateway, GatewayConfig, IdentityOutcome, IncomingRequest};
//!
//! let gateway = Gateway::new(GatewayConfig::from_env()?)?;
//! let req = IncomingRequest::get("/groups").with_host("groups.example.com");
//! match gateway.handle(&req) {
//!     IdentityOutcome::Authenticated { username, .. } => println!("hello {username}"),
//!     IdentityOutcome::Respond(response) => {
//!         let _response = response.into_http()?;
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod claims;
mod codec;
mod config;
mod error;
mod helpers;
mod middleware;
mod provider;
mod secrets;
mod session;
mod state;

pub use claims::{Claims, SESSION_SUBJECT, STATE_SUBJECT, TokenKind};
pub use codec::TokenCodec;
pub use config::GatewayConfig;
pub use error::AuthnError;
pub use middleware::{
    ClientCertificateStrategy, Gateway, GatewayResponse, IdentityOutcome, IdentitySource,
    IdentityStrategy, IncomingRequest, PeerCertificate, SessionCookieStrategy, StrategyOutcome,
    TlsInfo,
};
pub use provider::{AccessToken, ExchangeClient, ProviderConfig, UserInfo};
pub use secrets::{SecretSet, decode_secret};
pub use session::{DEFAULT_COOKIE_NAME, SESSION_TTL_SECS, SessionCookie, SessionCookieManager};
pub use state::{STATE_TOKEN_TTL_SECS, StateTokenManager};
