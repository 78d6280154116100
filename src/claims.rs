use serde::{Deserialize, Serialize};

pub const STATE_SUBJECT: &str = "state:redir_cookie";
pub const SESSION_SUBJECT: &str = "state:auth_cookie";

/// Claims shared by every token this crate signs. The `sub` claim doubles as
/// the discriminant of [`TokenKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "iss", default)]
    pub issuer: String,
    #[serde(rename = "aud", default, skip_serializing_if = "Vec::is_empty")]
    pub audience: Vec<String>,
    #[serde(rename = "exp", default)]
    pub expiration: u64,
    #[serde(rename = "nbf", default)]
    pub not_before: u64,
    #[serde(rename = "iat", default)]
    pub issued_at: u64,
    #[serde(flatten)]
    pub kind: TokenKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sub")]
pub enum TokenKind {
    #[serde(rename = "state:redir_cookie")]
    LoginState {
        #[serde(default)]
        return_url: String,
    },
    #[serde(rename = "state:auth_cookie")]
    Session {
        #[serde(default)]
        username: String,
    },
}

impl Claims {
    pub fn new(issuer: &str, now: u64, ttl_secs: u64, kind: TokenKind) -> Self {
        Self {
            issuer: issuer.to_string(),
            audience: vec![issuer.to_string()],
            expiration: now.saturating_add(ttl_secs),
            not_before: now,
            issued_at: now,
            kind,
        }
    }

    /// `now` must lie in `[nbf, exp)`.
    pub fn is_current(&self, now: u64) -> bool {
        self.not_before <= now && now < self.expiration
    }

    pub fn subject(&self) -> &'static str {
        match self.kind {
            TokenKind::LoginState { .. } => STATE_SUBJECT,
            TokenKind::Session { .. } => SESSION_SUBJECT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subject_tags_the_variant_on_the_wire() {
        let claims = Claims::new(
            "app",
            100,
            300,
            TokenKind::LoginState {
                return_url: "/pageA".to_string(),
            },
        );
        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value["sub"], "state:redir_cookie");
        assert_eq!(value["return_url"], "/pageA");
        assert_eq!(value["aud"], json!(["app"]));
        assert_eq!(value["exp"], 400);
        assert_eq!(claims.subject(), STATE_SUBJECT);

        let back: Claims = serde_json::from_value(value).unwrap();
        assert_eq!(back, claims);
    }

    #[test]
    fn unknown_subject_does_not_decode() {
        let value = json!({"iss": "app", "sub": "state:other", "exp": 10, "nbf": 0, "iat": 0});
        assert!(serde_json::from_value::<Claims>(value).is_err());
    }

    #[test]
    fn session_without_username_decodes_empty() {
        let value = json!({"iss": "app", "sub": "state:auth_cookie", "exp": 10, "nbf": 0, "iat": 0});
        let claims: Claims = serde_json::from_value(value).unwrap();
        assert_eq!(
            claims.kind,
            TokenKind::Session {
                username: String::new()
            }
        );
    }

    #[test]
    fn validity_window_is_half_open() {
        let claims = Claims::new(
            "app",
            1_000,
            7_200,
            TokenKind::Session {
                username: "alice".to_string(),
            },
        );
        assert!(!claims.is_current(999));
        assert!(claims.is_current(1_000));
        assert!(claims.is_current(8_199));
        assert!(!claims.is_current(8_200));
    }
}
