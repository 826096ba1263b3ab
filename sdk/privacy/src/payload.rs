//! Transfer payload
//!
//! The recovery data a sender hands to a recipient out of band:
//!
//! ```text
//! WhaleVault Private Transfer
//! Secret: <64 hex>
//! Commitment: <64 hex>
//! Amount: <lamports> lamports (<decimal> SOL)
//! ```
//!
//! Parsing is forgiving: labels match case-insensitively anywhere in the
//! text, so a block pasted out of a chat message still decodes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::commitment::{Commitment, CommitmentScheme};
use crate::error::{PrivacyError, Result};
use crate::hash::FieldHasher;
use crate::secret::Secret;

pub const PAYLOAD_TITLE: &str = "WhaleVault Private Transfer";

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Secret, commitment and amount of a freshly transferred commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPayload {
    pub secret: Secret,
    pub commitment: Commitment,
    pub amount: u64,
}

impl TransferPayload {
    pub fn new(secret: Secret, commitment: Commitment, amount: u64) -> Self {
        Self {
            secret,
            commitment,
            amount,
        }
    }

    /// Human-pasteable text block.
    pub fn to_text(&self) -> String {
        format!(
            "{PAYLOAD_TITLE}\nSecret: {}\nCommitment: {}\nAmount: {} lamports ({} SOL)",
            self.secret.to_hex(),
            self.commitment.to_hex(),
            self.amount,
            format_sol(self.amount),
        )
    }

    /// Recover the triple from text produced by [`Self::to_text`].
    pub fn parse(text: &str) -> Result<Self> {
        // ASCII lowercasing keeps byte offsets aligned with `text`.
        let lower = text.to_ascii_lowercase();

        let secret = capture_hex(&lower, "secret:").ok_or(PrivacyError::PayloadMissing("Secret"))?;
        let commitment =
            capture_hex(&lower, "commitment:").ok_or(PrivacyError::PayloadMissing("Commitment"))?;
        let amount = capture_lamports(&lower).ok_or(PrivacyError::PayloadMissing("Amount"))?;

        let amount: u64 = amount
            .parse()
            .map_err(|e: std::num::ParseIntError| PrivacyError::PayloadAmount(e.to_string()))?;

        Ok(Self {
            secret: Secret::from_hex(secret)?,
            commitment: Commitment::from_hex(commitment)?,
            amount,
        })
    }

    /// True if `commitment == H(amount, secret)` under `scheme`.
    pub fn is_consistent<H: FieldHasher>(&self, scheme: &CommitmentScheme<H>) -> bool {
        matches!(scheme.commit(self.amount, &self.secret), Ok(c) if c == self.commitment)
    }
}

impl fmt::Display for TransferPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for TransferPayload {
    type Err = PrivacyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Lamports as a decimal SOL string without trailing zeros.
pub fn format_sol(lamports: u64) -> String {
    let whole = lamports / LAMPORTS_PER_SOL;
    let frac = lamports % LAMPORTS_PER_SOL;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:09}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

fn skip_spaces(s: &str) -> &str {
    s.trim_start_matches([' ', '\t'])
}

/// First run of exactly 64 hex digits following `label`.
fn capture_hex<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    text.match_indices(label).find_map(|(at, _)| {
        let rest = skip_spaces(&text[at + label.len()..]);
        let len = rest.bytes().take_while(u8::is_ascii_hexdigit).count();
        (len == 64).then(|| &rest[..len])
    })
}

/// Digits in `Amount: <digits> lamports`.
fn capture_lamports(text: &str) -> Option<&str> {
    text.match_indices("amount:").find_map(|(at, _)| {
        let rest = skip_spaces(&text[at + "amount:".len()..]);
        let len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if len == 0 {
            return None;
        }
        skip_spaces(&rest[len..])
            .starts_with("lamports")
            .then(|| &rest[..len])
    })
}
