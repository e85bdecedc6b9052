//! Shared secret for the reserved identity.
//!
//! The secret is kept base64-encoded so it does not sit in plain text in the
//! credential file. This is obfuscation only, not a hash.

use std::fmt;

use base64ct::{Base64, Encoding};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("stored credential is not valid base64: {0}")]
pub struct InvalidCredential(base64ct::Error);

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    encoded: String,
}

impl Credential {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoded: Base64::encode_string(secret.as_bytes()),
        }
    }

    /// Rebuild from the stored, encoded form.
    pub fn from_encoded(encoded: &str) -> Result<Self, InvalidCredential> {
        let encoded = encoded.trim();
        Base64::decode_vec(encoded).map_err(InvalidCredential)?;
        Ok(Self {
            encoded: encoded.to_string(),
        })
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn matches(&self, attempt: &str) -> bool {
        Base64::encode_string(attempt.as_bytes()) == self.encoded
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
