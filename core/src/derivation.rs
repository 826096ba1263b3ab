//! Secret Derivation
//!
//! A position's secret is never stored. It is re-derived on demand from a
//! signature over a domain-separated message:
//!
//! ```text
//! WhaleVault Secret Derivation
//! Nonce: <nonce>
//! Chain ID: <chain id>
//! Version: <version>
//! ```
//!
//! secret = HKDF-SHA256(ikm = signature, salt = nonce, info = "whalevault-secret-v1")
//!
//! The framing must stay byte-for-byte identical across releases, otherwise
//! existing positions can no longer be re-opened.

use std::fmt;
use std::future::Future;

use chrono::Utc;
use ed25519_dalek::{Signer, SigningKey};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;
use whalevault_config::DerivationConfig;
use whalevault_privacy::Secret;

use crate::error::{Classify, ErrorCategory};

pub const DOMAIN_TAG: &str = "WhaleVault Secret Derivation";
pub const HKDF_INFO: &[u8] = b"whalevault-secret-v1";

// ============================================================================
// Errors
// ============================================================================

/// Failure reported by a signing transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("signature request rejected: {0}")]
    Rejected(String),

    #[error("signing transport unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("signature request rejected by the key holder: {0}")]
    SigningRejected(String),

    #[error("wallet cannot sign messages: {0}")]
    SignerUnavailable(String),

    #[error("position has neither a nonce nor a stored secret; funds are unrecoverable")]
    Unrecoverable,

    #[error("invalid nonce: {0}")]
    InvalidNonce(&'static str),

    #[error("signer returned an empty signature")]
    EmptySignature,

    #[error("key derivation failed")]
    KeyDerivation,
}

impl From<SignerError> for DerivationError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::Rejected(m) => DerivationError::SigningRejected(m),
            SignerError::Unavailable(m) => DerivationError::SignerUnavailable(m),
        }
    }
}

impl Classify for DerivationError {
    fn category(&self) -> ErrorCategory {
        match self {
            DerivationError::SigningRejected(_) | DerivationError::SignerUnavailable(_) => {
                ErrorCategory::Interactive
            }
            DerivationError::Unrecoverable
            | DerivationError::EmptySignature
            | DerivationError::KeyDerivation => ErrorCategory::Protocol,
            DerivationError::InvalidNonce(_) => ErrorCategory::Validation,
        }
    }

    fn code(&self) -> &str {
        match self {
            DerivationError::SigningRejected(_) => "SIGNING_REJECTED",
            DerivationError::SignerUnavailable(_) => "SIGNER_UNAVAILABLE",
            DerivationError::Unrecoverable => "SECRET_UNRECOVERABLE",
            DerivationError::InvalidNonce(_) => "INVALID_NONCE",
            DerivationError::EmptySignature => "EMPTY_SIGNATURE",
            DerivationError::KeyDerivation => "KEY_DERIVATION_FAILED",
        }
    }
}

// ============================================================================
// Nonce
// ============================================================================

/// Per-position derivation nonce: `<unix millis>-<uuid v4>`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Nonce(String);

impl Nonce {
    pub fn generate() -> Self {
        Self(format!(
            "{}-{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4()
        ))
    }

    /// Accept a stored nonce. It must be non-empty and single-line so the
    /// signed message keeps exactly four lines.
    pub fn new(value: impl Into<String>) -> Result<Self, DerivationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DerivationError::InvalidNonce("empty"));
        }
        if value.contains(['\n', '\r']) {
            return Err(DerivationError::InvalidNonce("contains a line break"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Nonce {
    type Error = DerivationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Nonce> for String {
    fn from(nonce: Nonce) -> Self {
        nonce.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({})", self.0)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Derivation
// ============================================================================

/// The exact message handed to the signer.
pub fn derivation_message(nonce: &Nonce, chain_id: &str, version: u32) -> String {
    format!("{DOMAIN_TAG}\nNonce: {nonce}\nChain ID: {chain_id}\nVersion: {version}")
}

/// Expand a signature into a 32-byte secret.
pub fn derive_secret(signature: &[u8], nonce: &Nonce) -> Result<Secret, DerivationError> {
    if signature.is_empty() {
        return Err(DerivationError::EmptySignature);
    }
    let hk = Hkdf::<Sha256>::new(Some(nonce.as_str().as_bytes()), signature);
    let mut okm = [0u8; 32];
    hk.expand(HKDF_INFO, &mut okm)
        .map_err(|_| DerivationError::KeyDerivation)?;
    Ok(Secret::from_bytes(okm))
}

/// "Sign this byte message, return a signature."
///
/// Signing waits on the key holder and is never timed out here; callers
/// race it against their own cancellation token.
pub trait MessageSigner: Send + Sync {
    fn sign_message(
        &self,
        message: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, SignerError>> + Send;
}

/// Local ed25519 key. Signatures are deterministic, so derivations repeat.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(&seed))
    }

    pub fn random() -> Self {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Base58 public key, the wallet address.
    pub fn address(&self) -> String {
        bs58::encode(self.key.verifying_key().as_bytes()).into_string()
    }
}

impl MessageSigner for Ed25519Signer {
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        Ok(self.key.sign(message).to_bytes().to_vec())
    }
}

/// Where a position's secret comes from, decided once when the position is
/// loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    NonceDerived(Nonce),
    /// Positions created before nonce derivation, and imported transfers
    StoredSecret(Secret),
}

impl SecretSource {
    /// Nonce wins over a stored secret; neither is unrecoverable.
    pub fn from_parts(
        nonce: Option<Nonce>,
        secret: Option<Secret>,
    ) -> Result<Self, DerivationError> {
        match (nonce, secret) {
            (Some(nonce), _) => Ok(SecretSource::NonceDerived(nonce)),
            (None, Some(secret)) => Ok(SecretSource::StoredSecret(secret)),
            (None, None) => Err(DerivationError::Unrecoverable),
        }
    }

    pub fn nonce(&self) -> Option<&Nonce> {
        match self {
            SecretSource::NonceDerived(nonce) => Some(nonce),
            SecretSource::StoredSecret(_) => None,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, SecretSource::StoredSecret(_))
    }
}

/// Derives position secrets through a [`MessageSigner`].
pub struct SecretDeriver<S> {
    signer: S,
    chain_id: String,
    version: u32,
}

impl<S: MessageSigner> SecretDeriver<S> {
    pub fn new(signer: S, chain_id: impl Into<String>, version: u32) -> Self {
        Self {
            signer,
            chain_id: chain_id.into(),
            version,
        }
    }

    pub fn from_config(signer: S, config: &DerivationConfig) -> Self {
        Self::new(signer, config.chain_id.clone(), config.version)
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    pub fn message(&self, nonce: &Nonce) -> String {
        derivation_message(nonce, &self.chain_id, self.version)
    }

    pub async fn derive(&self, nonce: &Nonce) -> Result<Secret, DerivationError> {
        let message = self.message(nonce);
        let signature = self.signer.sign_message(message.as_bytes()).await?;
        derive_secret(&signature, nonce)
    }

    /// Secret for a brand-new position together with the nonce to store.
    pub async fn fresh(&self) -> Result<(Nonce, Secret), DerivationError> {
        let nonce = Nonce::generate();
        let secret = self.derive(&nonce).await?;
        Ok((nonce, secret))
    }

    pub async fn resolve(&self, source: &SecretSource) -> Result<Secret, DerivationError> {
        match source {
            SecretSource::NonceDerived(nonce) => self.derive(nonce).await,
            SecretSource::StoredSecret(secret) => Ok(secret.clone()),
        }
    }
}
