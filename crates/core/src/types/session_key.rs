//! Anonymous session identifier.

use core::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes in a session key.
const KEY_BYTES: usize = 32;

/// Length of the encoded key (32 bytes, base64url without padding).
const ENCODED_LEN: usize = 43;

/// Errors that can occur when parsing a [`SessionKey`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionKeyError {
    #[error("session key must be {expected} characters, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("session key is not valid base64url")]
    Encoding,
}

/// An opaque, unguessable key naming an anonymous shopper's session.
///
/// Generated from the OS CSPRNG and carried in the `session_id` cookie.
/// Presented keys go through [`SessionKey::parse`], so a junk cookie value
/// never reaches the store.
///
/// The `Debug` implementation prints only a fingerprint; use
/// [`SessionKey::as_str`] when the full value is genuinely needed (cookies,
/// storage).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionKey(String);

impl SessionKey {
    /// Generate a fresh random session key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Parse a presented session key.
    ///
    /// # Errors
    ///
    /// Returns an error unless the input is exactly 43 base64url characters
    /// decoding to 32 bytes.
    pub fn parse(s: &str) -> Result<Self, SessionKeyError> {
        let s = s.trim();
        if s.len() != ENCODED_LEN {
            return Err(SessionKeyError::Length {
                expected: ENCODED_LEN,
                actual: s.len(),
            });
        }
        let decoded = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| SessionKeyError::Encoding)?;
        if decoded.len() != KEY_BYTES {
            return Err(SessionKeyError::Encoding);
        }
        Ok(Self(s.to_owned()))
    }

    /// The encoded key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix of the key, safe to put in log fields.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey({}…)", self.fingerprint())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionKey {
    type Err = SessionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionKey {
    type Error = SessionKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionKey> for String {
    fn from(key: SessionKey) -> Self {
        key.0
    }
}
