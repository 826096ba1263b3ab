//! Field hashing
//!
//! Every commitment, nullifier and Merkle node in the pool is produced by a
//! single two-to-one hash over the BN254 scalar field. The proving circuits
//! use the same Poseidon parameters, so this module is the one place where
//! they are defined.

use std::sync::LazyLock;

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};
use ark_ff::{BigInteger, PrimeField};

use crate::error::{PrivacyError, Result};

/// Scalar field shared by the engine and the proving system.
pub type Field = Fr;

/// Poseidon parameters for BN254 Fr
pub const POSEIDON_RATE: usize = 2;
pub const POSEIDON_CAPACITY: usize = 1;
pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;
pub const POSEIDON_ALPHA: u64 = 5;

/// Two-to-one hash over the scalar field.
///
/// Argument order is significant: `hash2(a, b)` and `hash2(b, a)` differ.
pub trait FieldHasher: Send + Sync {
    fn hash2(&self, left: Field, right: Field) -> Field;
}

/// Poseidon sponge absorbing both inputs in order and squeezing one element.
#[derive(Clone)]
pub struct PoseidonHasher {
    config: PoseidonConfig<Fr>,
}

impl PoseidonHasher {
    pub fn new() -> Self {
        Self {
            config: poseidon_config(),
        }
    }

    /// Sponge parameters, shared with the in-circuit gadget.
    pub fn config(&self) -> &PoseidonConfig<Fr> {
        &self.config
    }
}

impl Default for PoseidonHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoseidonHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseidonHasher")
            .field("full_rounds", &self.config.full_rounds)
            .field("partial_rounds", &self.config.partial_rounds)
            .finish()
    }
}

impl FieldHasher for PoseidonHasher {
    fn hash2(&self, left: Field, right: Field) -> Field {
        let mut sponge = PoseidonSponge::new(&self.config);
        sponge.absorb(&left);
        sponge.absorb(&right);
        sponge.squeeze_field_elements::<Fr>(1)[0]
    }
}

impl<H: FieldHasher + ?Sized> FieldHasher for &H {
    fn hash2(&self, left: Field, right: Field) -> Field {
        (**self).hash2(left, right)
    }
}

impl<H: FieldHasher + ?Sized> FieldHasher for std::sync::Arc<H> {
    fn hash2(&self, left: Field, right: Field) -> Field {
        (**self).hash2(left, right)
    }
}

static DEFAULT_HASHER: LazyLock<PoseidonHasher> = LazyLock::new(PoseidonHasher::new);

/// Process-wide Poseidon hasher. Parameter generation is not free, so callers
/// that do not inject their own hasher share this one.
pub fn default_hasher() -> &'static PoseidonHasher {
    &DEFAULT_HASHER
}

/// Poseidon configuration for the pool
///
/// Field: BN254 Fr (254 bits)
/// Rate: 2, Capacity: 1
/// Security: 128 bits
pub fn poseidon_config() -> PoseidonConfig<Fr> {
    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        Fr::MODULUS_BIT_SIZE as u64,
        POSEIDON_RATE,
        POSEIDON_FULL_ROUNDS as u64,
        POSEIDON_PARTIAL_ROUNDS as u64,
        0,
    );

    PoseidonConfig::new(
        POSEIDON_FULL_ROUNDS,
        POSEIDON_PARTIAL_ROUNDS,
        POSEIDON_ALPHA,
        mds,
        ark,
        POSEIDON_RATE,
        POSEIDON_CAPACITY,
    )
}

/// Encode a field element as 32 big-endian bytes.
pub fn field_to_bytes(f: Field) -> [u8; 32] {
    let bytes = f.into_bigint().to_bytes_be();
    let mut arr = [0u8; 32];
    arr[32 - bytes.len()..].copy_from_slice(&bytes);
    arr
}

/// Decode 32 big-endian bytes, reducing modulo the field order.
pub fn field_from_bytes(bytes: &[u8; 32]) -> Field {
    Fr::from_be_bytes_mod_order(bytes)
}

/// Decode 32 big-endian bytes, rejecting values at or above the modulus.
pub fn field_from_canonical_bytes(field: &'static str, bytes: &[u8; 32]) -> Result<Field> {
    let f = field_from_bytes(bytes);
    if field_to_bytes(f) != *bytes {
        return Err(PrivacyError::NonCanonical { field });
    }
    Ok(f)
}

/// Parse a 64-character hex string into 32 bytes.
///
/// Surrounding whitespace is ignored and either case is accepted.
pub fn parse_hex32(field: &'static str, input: &str) -> Result<[u8; 32]> {
    let trimmed = input.trim();
    if trimmed.len() != 64 {
        return Err(PrivacyError::InvalidLength {
            field,
            expected: 64,
            actual: trimmed.len(),
        });
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(trimmed, &mut out).map_err(|_| PrivacyError::InvalidHex { field })?;
    Ok(out)
}
