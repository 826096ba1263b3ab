//! Positions
//!
//! Client-side view of the commitments a holder can spend. A position never
//! goes back to `Active` once it has been transferred or unshielded.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;
use whalevault_privacy::{Commitment, CommitmentScheme, PrivacyError, Secret, TransferPayload};

use crate::derivation::{DerivationError, MessageSigner, Nonce, SecretDeriver, SecretSource};
use crate::error::{Classify, ErrorCategory};
use crate::ledger::{LedgerError, LedgerGateway};

pub type PositionId = Uuid;

#[derive(Error, Debug)]
pub enum PositionError {
    #[error("a position with commitment {0} already exists")]
    DuplicateCommitment(Commitment),

    #[error("position {0} not found")]
    NotFound(PositionId),

    #[error("commitment does not match amount and secret")]
    CommitmentMismatch,

    #[error("position {id} is {status}")]
    NotActive {
        id: PositionId,
        status: PositionStatus,
    },

    #[error("a spend of position {0} is already in progress")]
    SpendInProgress(PositionId),

    #[error("commitment {0} is not in the pool")]
    NotOnLedger(Commitment),

    #[error("commitment {0} has already been spent")]
    AlreadySpent(Commitment),

    #[error(transparent)]
    Privacy(#[from] PrivacyError),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<LedgerError> for PositionError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::CommitmentNotFound(c) => PositionError::NotOnLedger(c),
            other => PositionError::Ledger(other),
        }
    }
}

impl Classify for PositionError {
    fn category(&self) -> ErrorCategory {
        match self {
            PositionError::DuplicateCommitment(_)
            | PositionError::NotFound(_)
            | PositionError::CommitmentMismatch => ErrorCategory::Validation,
            PositionError::NotActive { .. }
            | PositionError::SpendInProgress(_)
            | PositionError::NotOnLedger(_)
            | PositionError::AlreadySpent(_) => ErrorCategory::Protocol,
            PositionError::Privacy(e) => e.category(),
            PositionError::Derivation(e) => e.category(),
            PositionError::Ledger(e) => e.category(),
        }
    }

    fn code(&self) -> &str {
        match self {
            PositionError::DuplicateCommitment(_) => "DUPLICATE_COMMITMENT",
            PositionError::NotFound(_) => "POSITION_NOT_FOUND",
            PositionError::CommitmentMismatch => "COMMITMENT_MISMATCH",
            PositionError::NotActive { .. } => "POSITION_NOT_ACTIVE",
            PositionError::SpendInProgress(_) => "SPEND_IN_PROGRESS",
            PositionError::NotOnLedger(_) => "COMMITMENT_NOT_FOUND",
            PositionError::AlreadySpent(_) => "NULLIFIER_SPENT",
            PositionError::Privacy(e) => e.code(),
            PositionError::Derivation(e) => e.code(),
            PositionError::Ledger(e) => e.code(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Active,
    Transferred,
    Unshielded,
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PositionStatus::Active => "active",
            PositionStatus::Transferred => "transferred",
            PositionStatus::Unshielded => "unshielded",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: PositionId,
    pub commitment: Commitment,
    pub amount: u64,
    /// `None` for a custom amount
    pub denomination: Option<u64>,
    pub source: SecretSource,
    pub status: PositionStatus,
    pub created_at: DateTime<Utc>,
    pub available_after: Option<DateTime<Utc>>,
}

impl Position {
    pub fn new(
        commitment: Commitment,
        amount: u64,
        denomination: Option<u64>,
        source: SecretSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            commitment,
            amount,
            denomination: denomination.filter(|d| *d > 0),
            source,
            status: PositionStatus::Active,
            created_at: Utc::now(),
            available_after: None,
        }
    }

    pub fn with_lock_until(mut self, until: DateTime<Utc>) -> Self {
        self.available_after = Some(until);
        self
    }

    /// Time left on the lock at `now`, if any.
    pub fn lock_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let until = self.available_after?;
        (until - now).to_std().ok().filter(|d| !d.is_zero())
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    pub fn is_spendable(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.lock_remaining(now).is_none()
    }
}

/// Stored form of a [`Position`]. Carries a nonce, or a secret for legacy and
/// imported positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub id: PositionId,
    pub commitment: Commitment,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denomination: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Nonce>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<Secret>,
    pub status: PositionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_after: Option<DateTime<Utc>>,
}

impl TryFrom<PositionRecord> for Position {
    type Error = PositionError;

    fn try_from(record: PositionRecord) -> Result<Self, Self::Error> {
        let source = SecretSource::from_parts(record.nonce, record.secret)?;
        Ok(Position {
            id: record.id,
            commitment: record.commitment,
            amount: record.amount,
            denomination: record.denomination,
            source,
            status: record.status,
            created_at: record.created_at,
            available_after: record.available_after,
        })
    }
}

impl From<&Position> for PositionRecord {
    fn from(position: &Position) -> Self {
        let (nonce, secret) = match &position.source {
            SecretSource::NonceDerived(nonce) => (Some(nonce.clone()), None),
            SecretSource::StoredSecret(secret) => (None, Some(secret.clone())),
        };
        PositionRecord {
            id: position.id,
            commitment: position.commitment,
            amount: position.amount,
            denomination: position.denomination,
            nonce,
            secret,
            status: position.status,
            created_at: position.created_at,
            available_after: position.available_after,
        }
    }
}

#[derive(Default)]
struct Positions {
    by_id: HashMap<PositionId, Position>,
    by_commitment: HashMap<Commitment, PositionId>,
    spending: HashSet<PositionId>,
}

/// Claim on an active position held for the length of one spend. Dropping it
/// lets the position be spent again if it is still active.
pub struct SpendGuard<'a> {
    store: &'a PositionStore,
    id: PositionId,
}

impl SpendGuard<'_> {
    pub fn id(&self) -> &PositionId {
        &self.id
    }
}

impl std::fmt::Debug for SpendGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpendGuard")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for SpendGuard<'_> {
    fn drop(&mut self) {
        self.store.positions().spending.remove(&self.id);
    }
}

/// Positions keyed by id, unique by commitment.
pub struct PositionStore {
    inner: Mutex<Positions>,
    scheme: CommitmentScheme,
}

impl Default for PositionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Positions::default()),
            scheme: CommitmentScheme::new(),
        }
    }

    /// Rebuild a store from saved records. Fails on the first unrecoverable
    /// or duplicate record.
    pub fn from_records(
        records: impl IntoIterator<Item = PositionRecord>,
    ) -> Result<Self, PositionError> {
        let store = Self::new();
        for record in records {
            store.insert(Position::try_from(record)?)?;
        }
        Ok(store)
    }

    fn positions(&self) -> MutexGuard<'_, Positions> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, position: Position) -> Result<PositionId, PositionError> {
        let mut positions = self.positions();
        if positions.by_commitment.contains_key(&position.commitment) {
            return Err(PositionError::DuplicateCommitment(position.commitment));
        }
        let id = position.id;
        positions.by_commitment.insert(position.commitment, id);
        positions.by_id.insert(id, position);
        Ok(id)
    }

    /// New position with a fresh nonce. The derived secret is only used to
    /// compute the commitment and is not kept.
    pub async fn shield_new<S: MessageSigner>(
        &self,
        deriver: &SecretDeriver<S>,
        amount: u64,
        denomination: Option<u64>,
    ) -> Result<Position, PositionError> {
        let (nonce, secret) = deriver.fresh().await?;
        let commitment = self.scheme.commit(amount, &secret)?;
        let position = Position::new(
            commitment,
            amount,
            denomination,
            SecretSource::NonceDerived(nonce),
        );
        self.insert(position.clone())?;
        info!(position_id = %position.id, amount, "position shielded");
        Ok(position)
    }

    /// Track a received transfer. Only checks that the triple is consistent.
    pub fn import(&self, payload: &TransferPayload) -> Result<Position, PositionError> {
        if !payload.is_consistent(&self.scheme) {
            return Err(PositionError::CommitmentMismatch);
        }
        let position = Position::new(
            payload.commitment,
            payload.amount,
            None,
            SecretSource::StoredSecret(payload.secret.clone()),
        );
        self.insert(position.clone())?;
        info!(position_id = %position.id, amount = payload.amount, "transfer imported");
        Ok(position)
    }

    /// [`Self::import`], after checking the commitment is in the pool and its
    /// nullifier is unspent.
    pub async fn import_verified<L: LedgerGateway>(
        &self,
        payload: &TransferPayload,
        ledger: &L,
    ) -> Result<Position, PositionError> {
        if !payload.is_consistent(&self.scheme) {
            return Err(PositionError::CommitmentMismatch);
        }
        ledger.membership_witness(&payload.commitment).await?;
        let nullifier = self.scheme.nullifier(&payload.commitment, &payload.secret);
        if ledger.is_spent(&nullifier).await? {
            return Err(PositionError::AlreadySpent(payload.commitment));
        }
        self.import(payload)
    }

    pub fn get(&self, id: &PositionId) -> Option<Position> {
        self.positions().by_id.get(id).cloned()
    }

    pub fn find_by_commitment(&self, commitment: &Commitment) -> Option<Position> {
        let positions = self.positions();
        let id = positions.by_commitment.get(commitment)?;
        positions.by_id.get(id).cloned()
    }

    /// All positions, oldest first.
    pub fn list(&self) -> Vec<Position> {
        let mut all: Vec<Position> = self.positions().by_id.values().cloned().collect();
        all.sort_by_key(|p| (p.created_at, p.id));
        all
    }

    pub fn records(&self) -> Vec<PositionRecord> {
        self.list().iter().map(PositionRecord::from).collect()
    }

    /// Claim `id` for a spend. At most one claim per position exists at a time.
    pub fn try_begin_spend(&self, id: &PositionId) -> Result<SpendGuard<'_>, PositionError> {
        let mut positions = self.positions();
        let position = positions.by_id.get(id).ok_or(PositionError::NotFound(*id))?;
        if !position.is_active() {
            return Err(PositionError::NotActive {
                id: *id,
                status: position.status,
            });
        }
        if !positions.spending.insert(*id) {
            return Err(PositionError::SpendInProgress(*id));
        }
        Ok(SpendGuard {
            store: self,
            id: *id,
        })
    }

    pub fn is_spending(&self, id: &PositionId) -> bool {
        self.positions().spending.contains(id)
    }

    pub fn mark_transferred(&self, id: &PositionId) -> Result<(), PositionError> {
        self.transition(id, PositionStatus::Transferred)
    }

    pub fn mark_unshielded(&self, id: &PositionId) -> Result<(), PositionError> {
        self.transition(id, PositionStatus::Unshielded)
    }

    // Active -> spent only; repeating the same transition is a no-op.
    fn transition(&self, id: &PositionId, to: PositionStatus) -> Result<(), PositionError> {
        let mut positions = self.positions();
        let position = positions
            .by_id
            .get_mut(id)
            .ok_or(PositionError::NotFound(*id))?;
        match position.status {
            status if status == to => Ok(()),
            PositionStatus::Active => {
                position.status = to;
                info!(position_id = %id, status = %to, "position updated");
                Ok(())
            }
            status => Err(PositionError::NotActive { id: *id, status }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::Ed25519Signer;
    use crate::ledger::InMemoryLedger;
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;
    use whalevault_privacy::commitment;
    use whalevault_prover::MockProver;

    const AMOUNT: u64 = 1_000_000_000;

    fn payload(byte: u8) -> TransferPayload {
        let secret = Secret::from_bytes([byte; 32]);
        let c = commitment(AMOUNT, &secret).unwrap();
        TransferPayload::new(secret, c, AMOUNT)
    }

    #[test]
    fn test_import_rejects_duplicate_commitment() {
        let store = PositionStore::new();
        store.import(&payload(0x42)).unwrap();

        let err = store.import(&payload(0x42)).unwrap_err();
        assert!(
            matches!(err, PositionError::DuplicateCommitment(_)),
            "second import must be rejected, got {err:?}"
        );
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_import_rejects_inconsistent_triple() {
        let store = PositionStore::new();
        let mut p = payload(0x42);
        p.amount += 1;
        assert!(matches!(
            store.import(&p),
            Err(PositionError::CommitmentMismatch)
        ));
    }

    #[test]
    fn test_imported_position_uses_stored_secret() {
        let store = PositionStore::new();
        let position = store.import(&payload(7)).unwrap();
        assert!(position.source.is_stored());
        assert!(position.is_active());
        assert_eq!(store.find_by_commitment(&position.commitment), Some(position));
    }

    #[tokio::test]
    async fn test_shield_new_stores_nonce_not_secret() {
        let store = PositionStore::new();
        let deriver = SecretDeriver::new(Ed25519Signer::from_seed([3; 32]), "solana:devnet", 1);
        let position = store.shield_new(&deriver, AMOUNT, Some(AMOUNT)).await.unwrap();

        let nonce = position.source.nonce().expect("fresh positions are nonce-derived");
        let secret = deriver.derive(nonce).await.unwrap();
        assert_eq!(commitment(AMOUNT, &secret).unwrap(), position.commitment);

        let record = PositionRecord::from(&position);
        assert!(record.secret.is_none(), "no secret at rest");
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains(&secret.to_hex()));
    }

    #[test]
    fn test_status_transitions_are_one_way() {
        let store = PositionStore::new();
        let id = store.import(&payload(1)).unwrap().id;

        store.mark_transferred(&id).unwrap();
        store.mark_transferred(&id).unwrap();
        assert_eq!(store.get(&id).unwrap().status, PositionStatus::Transferred);

        let err = store.mark_unshielded(&id).unwrap_err();
        assert!(matches!(
            err,
            PositionError::NotActive {
                status: PositionStatus::Transferred,
                ..
            }
        ));
        assert!(matches!(
            store.mark_transferred(&Uuid::new_v4()),
            Err(PositionError::NotFound(_))
        ));
    }

    #[test]
    fn test_one_spend_claim_per_position() {
        let store = PositionStore::new();
        let id = store.import(&payload(1)).unwrap().id;

        let guard = store.try_begin_spend(&id).unwrap();
        assert!(store.is_spending(&id));
        let err = store.try_begin_spend(&id).unwrap_err();
        assert_eq!(err.code(), "SPEND_IN_PROGRESS");
        assert_eq!(err.category(), ErrorCategory::Protocol);

        drop(guard);
        assert!(!store.is_spending(&id));
        let guard = store.try_begin_spend(&id).unwrap();
        store.mark_transferred(guard.id()).unwrap();
        drop(guard);

        assert_eq!(
            store.try_begin_spend(&id).unwrap_err().code(),
            "POSITION_NOT_ACTIVE"
        );
        assert_eq!(
            store.try_begin_spend(&Uuid::new_v4()).unwrap_err().code(),
            "POSITION_NOT_FOUND"
        );
    }

    #[test]
    fn test_lock_remaining() {
        let now = Utc::now();
        let position = Position::new(
            payload(1).commitment,
            AMOUNT,
            None,
            SecretSource::StoredSecret(Secret::from_bytes([1; 32])),
        )
        .with_lock_until(now + ChronoDuration::hours(2));

        let remaining = position.lock_remaining(now).unwrap();
        assert_eq!(remaining, Duration::from_secs(2 * 3600));
        assert!(!position.is_spendable(now));
        assert!(position.is_spendable(now + ChronoDuration::hours(3)));
    }

    #[test]
    fn test_record_without_nonce_or_secret_is_unrecoverable() {
        let mut record = PositionRecord::from(&Position::new(
            payload(1).commitment,
            AMOUNT,
            None,
            SecretSource::StoredSecret(Secret::from_bytes([1; 32])),
        ));
        record.secret = None;

        let err = Position::try_from(record).unwrap_err();
        assert_eq!(err.code(), "SECRET_UNRECOVERABLE");
        assert_eq!(err.category(), ErrorCategory::Protocol);
    }

    #[test]
    fn test_records_round_trip_through_store() {
        let store = PositionStore::new();
        store.import(&payload(1)).unwrap();
        store.import(&payload(2)).unwrap();

        let restored = PositionStore::from_records(store.records()).unwrap();
        assert_eq!(restored.list(), store.list());
    }

    #[tokio::test]
    async fn test_import_verified_checks_the_pool() {
        let ledger = InMemoryLedger::new(Arc::new(MockProver::new()));
        let store = PositionStore::new();
        let p = payload(9);

        let err = store.import_verified(&p, &ledger).await.unwrap_err();
        assert!(matches!(err, PositionError::NotOnLedger(_)), "got {err:?}");

        ledger.deposit(&p.commitment, p.amount).unwrap();
        store.import_verified(&p, &ledger).await.unwrap();
    }
}
