use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};

use crate::AuthnError;

/// Ordered HMAC keys. Index 0 signs; every entry verifies.
///
/// A set is never mutated once built. Rotation builds a new set with
/// [`SecretSet::rotated`] and publishes it as a whole.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretSet {
    keys: Vec<Vec<u8>>,
}

impl SecretSet {
    pub fn new(keys: Vec<Vec<u8>>) -> Self {
        Self { keys }
    }

    /// Decodes configured secret strings, keeping their order.
    pub fn from_config<S: AsRef<str>>(secrets: &[S]) -> Result<Self, AuthnError> {
        let keys = secrets
            .iter()
            .map(|s| decode_secret(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let set = Self { keys };
        set.signing_key()?;
        Ok(set)
    }

    pub(crate) fn signing_key(&self) -> Result<&[u8], AuthnError> {
        match self.keys.first() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(AuthnError::NoSigningSecret),
        }
    }

    pub(crate) fn verification_keys(&self) -> impl Iterator<Item = &[u8]> {
        self.keys.iter().map(Vec::as_slice).filter(|k| !k.is_empty())
    }

    /// A new set signing with `key` and still accepting every current key.
    pub fn rotated(&self, key: Vec<u8>) -> Self {
        let mut keys = Vec::with_capacity(self.keys.len() + 1);
        keys.push(key);
        keys.extend(self.keys.iter().cloned());
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for SecretSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSet")
            .field("keys", &self.keys.len())
            .finish()
    }
}

/// Decodes one configured secret.
///
/// `hex:`, `base64:` and `base64url:` prefixes select an encoding; a secret
/// without a prefix is used as its raw UTF-8 bytes.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>, AuthnError> {
    let value = secret.trim();

    if let Some(hex_str) = value.strip_prefix("hex:") {
        return non_empty(hex::decode(hex_str).map_err(|_| {
            AuthnError::InvalidConfig("shared secret: invalid hex after 'hex:' prefix".into())
        })?);
    }
    if let Some(b64_str) = value.strip_prefix("base64:") {
        return non_empty(
            STANDARD
                .decode(b64_str)
                .or_else(|_| STANDARD_NO_PAD.decode(b64_str))
                .map_err(|_| {
                    AuthnError::InvalidConfig(
                        "shared secret: invalid base64 after 'base64:' prefix".into(),
                    )
                })?,
        );
    }
    if let Some(b64url_str) = value.strip_prefix("base64url:") {
        return non_empty(
            URL_SAFE
                .decode(b64url_str)
                .or_else(|_| URL_SAFE_NO_PAD.decode(b64url_str))
                .map_err(|_| {
                    AuthnError::InvalidConfig(
                        "shared secret: invalid base64url after 'base64url:' prefix".into(),
                    )
                })?,
        );
    }

    non_empty(value.as_bytes().to_vec())
}

fn non_empty(bytes: Vec<u8>) -> Result<Vec<u8>, AuthnError> {
    if bytes.is_empty() {
        return Err(AuthnError::InvalidConfig(
            "shared secret must not be empty".to_string(),
        ));
    }
    Ok(bytes)
}
