//! Position secrets
//!
//! A secret is 32 opaque bytes. Its canonical text form is 64 lower-case hex
//! characters; every secret entering the engine goes through that form first.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;
use crate::hash::{Field, field_from_bytes, parse_hex32};

/// A 256-bit position secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; 32]);

impl Secret {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse hex, tolerating surrounding whitespace and upper case.
    pub fn from_hex(input: &str) -> Result<Self> {
        parse_hex32("secret", input).map(Self)
    }

    /// Fresh secret from the OS RNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Canonical lower-case hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Field element of the secret, reduced modulo the field order.
    pub fn to_field(&self) -> Field {
        field_from_bytes(&self.0)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl FromStr for Secret {
    type Err = crate::error::PrivacyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.fill(0);
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrivacyError;

    #[test]
    fn test_hex_canonicalized() {
        let s = Secret::from_hex(&format!(" {} ", "4A".repeat(32))).unwrap();
        assert_eq!(s.to_hex(), "4a".repeat(32));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let err = Secret::from_hex(&"42".repeat(31)).unwrap_err();
        assert_eq!(
            err,
            PrivacyError::InvalidLength {
                field: "secret",
                expected: 64,
                actual: 62
            }
        );
    }

    #[test]
    fn test_debug_redacts() {
        let s = Secret::from_bytes([0x42; 32]);
        assert_eq!(format!("{s:?}"), "Secret(..)");
    }

    #[test]
    fn test_random_secrets_differ() {
        assert_ne!(Secret::random(), Secret::random());
    }

    #[test]
    fn test_serde_as_hex() {
        let s = Secret::from_bytes([0x42; 32]);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, format!("\"{}\"", "42".repeat(32)));
        let back: Secret = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
