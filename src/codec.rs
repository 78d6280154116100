use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::{AuthnError, SecretSet};

/// HS256 compact tokens over a rotatable [`SecretSet`].
///
/// The codec checks signatures and decodes claims only. Temporal and
/// issuer checks belong to the caller, which knows which token kind it
/// expects.
pub struct TokenCodec {
    secrets: RwLock<Arc<SecretSet>>,
}

impl TokenCodec {
    pub fn new(secrets: SecretSet) -> Self {
        Self {
            secrets: RwLock::new(Arc::new(secrets)),
        }
    }

    /// Current snapshot; callers never observe a half-rotated set.
    pub fn secrets(&self) -> Result<Arc<SecretSet>, AuthnError> {
        self.secrets
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| AuthnError::Internal("secret set lock poisoned".to_string()))
    }

    pub fn publish(&self, secrets: SecretSet) -> Result<(), AuthnError> {
        let mut guard = self
            .secrets
            .write()
            .map_err(|_| AuthnError::Internal("secret set lock poisoned".to_string()))?;
        *guard = Arc::new(secrets);
        Ok(())
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, AuthnError> {
        let secrets = self.secrets()?;
        let key = EncodingKey::from_secret(secrets.signing_key()?);
        Ok(encode(&Header::new(Algorithm::HS256), claims, &key)?)
    }

    /// Tries every key in order. Any failure collapses into
    /// [`AuthnError::NoValidKey`].
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, AuthnError> {
        let secrets = self.secrets()?;
        let validation = signature_only_validation();

        for (index, key) in secrets.verification_keys().enumerate() {
            match decode::<T>(token, &DecodingKey::from_secret(key), &validation) {
                Ok(data) => return Ok(data.claims),
                Err(err) => debug!(key_index = index, error = %err, "token rejected under key"),
            }
        }

        Err(AuthnError::NoValidKey)
    }
}

fn signature_only_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{Claims, TokenKind};

    fn session_claims(username: &str) -> Claims {
        Claims::new(
            "app",
            1_000,
            7_200,
            TokenKind::Session {
                username: username.to_string(),
            },
        )
    }

    fn codec(keys: &[&str]) -> TokenCodec {
        TokenCodec::new(SecretSet::from_config(keys).unwrap())
    }

    #[test]
    fn sign_then_verify() {
        let codec = codec(&["k1"]);
        let token = codec.sign(&session_claims("alice")).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims: Claims = codec.verify(&token).unwrap();
        assert_eq!(claims, session_claims("alice"));
    }

    #[test]
    fn sign_without_secret_fails() {
        let codec = TokenCodec::new(SecretSet::new(Vec::new()));
        assert!(matches!(
            codec.sign(&session_claims("alice")),
            Err(AuthnError::NoSigningSecret)
        ));
    }

    #[test]
    fn rotated_out_key_still_verifies_at_any_position() {
        let codec = codec(&["old"]);
        let token = codec.sign(&session_claims("bob")).unwrap();

        for keys in [
            vec!["new", "old"],
            vec!["newer", "new", "old"],
            vec!["a", "old", "b"],
        ] {
            codec
                .publish(SecretSet::from_config(keys.as_slice()).unwrap())
                .unwrap();
            let claims: Claims = codec.verify(&token).unwrap();
            assert_eq!(claims, session_claims("bob"));
        }

        codec.publish(SecretSet::from_config(&["new"]).unwrap()).unwrap();
        assert!(matches!(
            codec.verify::<Claims>(&token),
            Err(AuthnError::NoValidKey)
        ));
    }

    #[test]
    fn failures_are_indistinguishable() {
        let codec = codec(&["k1"]);
        let other = codec_with_other_key();
        let foreign = other.sign(&session_claims("eve")).unwrap();

        let malformed = codec.verify::<Claims>("not-a-token").unwrap_err();
        let wrong_key = codec.verify::<Claims>(&foreign).unwrap_err();
        assert_eq!(malformed.to_string(), wrong_key.to_string());
    }

    #[test]
    fn every_single_byte_flip_is_rejected() {
        let codec = codec(&["k1"]);
        let token = codec.sign(&session_claims("alice")).unwrap();

        for i in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert!(
                codec.verify::<Claims>(&tampered).is_err(),
                "flip at {i} was accepted"
            );
        }
    }

    fn codec_with_other_key() -> TokenCodec {
        codec(&["k2"])
    }
}
