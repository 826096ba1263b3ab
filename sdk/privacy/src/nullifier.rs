//! Nullifiers
//!
//! ```text
//! Nullifier = H(commitment, secret)
//! ```
//!
//! Once a nullifier is published on the ledger, the corresponding commitment
//! cannot be spent again. Derivation lives on [`crate::CommitmentScheme`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hash::{Field, field_from_bytes, field_from_canonical_bytes, field_to_bytes, parse_hex32};

/// A nullifier (32 bytes) - unique tag for a spent commitment
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nullifier(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Nullifier {
    /// Create from field element
    pub fn from_field(f: Field) -> Self {
        Self(field_to_bytes(f))
    }

    /// Convert to field element
    pub fn to_field(&self) -> Field {
        field_from_bytes(&self.0)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex(input: &str) -> Result<Self> {
        let bytes = parse_hex32("nullifier", input)?;
        field_from_canonical_bytes("nullifier", &bytes)?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for Nullifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nullifier({})", self.to_hex())
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
