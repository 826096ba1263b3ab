//! Commitments
//!
//! ```text
//! Commitment = H(amount, secret)
//! Nullifier  = H(commitment, secret)
//! ```
//!
//! `H` is the pool's two-to-one field hash. The amount enters as the field
//! element of the integer, the secret as its 32 bytes reduced mod r.

use std::fmt;

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};

use crate::error::{PrivacyError, Result};
use crate::hash::{
    Field, FieldHasher, PoseidonHasher, default_hasher, field_from_bytes,
    field_from_canonical_bytes, field_to_bytes, parse_hex32,
};
use crate::nullifier::Nullifier;
use crate::secret::Secret;

/// A pool commitment (32 bytes, big-endian field element)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Commitment {
    /// Create commitment from field element
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

    /// Parse 64 hex characters. The value must be a canonical field element.
    pub fn from_hex(input: &str) -> Result<Self> {
        let bytes = parse_hex32("commitment", input)?;
        field_from_canonical_bytes("commitment", &bytes)?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Commitment and nullifier derivation over an injected field hash.
#[derive(Clone, Debug)]
pub struct CommitmentScheme<H = PoseidonHasher> {
    hasher: H,
}

impl CommitmentScheme<PoseidonHasher> {
    pub fn new() -> Self {
        Self {
            hasher: default_hasher().clone(),
        }
    }
}

impl Default for CommitmentScheme<PoseidonHasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: FieldHasher> CommitmentScheme<H> {
    pub fn with_hasher(hasher: H) -> Self {
        Self { hasher }
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// C = H(amount, secret)
    pub fn commit(&self, amount: u64, secret: &Secret) -> Result<Commitment> {
        if amount == 0 {
            return Err(PrivacyError::NonPositiveAmount);
        }
        let c = self.hasher.hash2(Fr::from(amount), secret.to_field());
        Ok(Commitment::from_field(c))
    }

    /// N = H(commitment, secret)
    pub fn nullifier(&self, commitment: &Commitment, secret: &Secret) -> Nullifier {
        Nullifier::from_field(self.hasher.hash2(commitment.to_field(), secret.to_field()))
    }
}

/// `commit` with the process-wide Poseidon hasher.
pub fn commitment(amount: u64, secret: &Secret) -> Result<Commitment> {
    CommitmentScheme::with_hasher(default_hasher()).commit(amount, secret)
}

/// `nullifier` with the process-wide Poseidon hasher.
pub fn nullifier(commitment: &Commitment, secret: &Secret) -> Nullifier {
    CommitmentScheme::with_hasher(default_hasher()).nullifier(commitment, secret)
}
