//! In-process stand-in for the pool program, used by the dev server and tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha512};
use tracing::{debug, info};
use whalevault_privacy::{
    Commitment, Field, MerkleTree, Nullifier, RootHistory, field_from_bytes, field_to_bytes,
};
use whalevault_prover::MembershipProver;

use super::{
    LedgerError, LedgerGateway, MembershipWitness, PoolStats, RelayInstruction, TxSignature,
};

struct LedgerState {
    tree: MerkleTree,
    roots: RootHistory,
    nullifiers: HashSet<Nullifier>,
    signatures: HashSet<TxSignature>,
    balance: u64,
    total_deposits: u64,
    tx_count: u64,
}

/// Mirrors the pool program's checks: known recent root, unspent nullifier,
/// valid proof, public inputs matching the instruction, enough funds.
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    verifier: Arc<dyn MembershipProver>,
}

impl InMemoryLedger {
    pub fn new(verifier: Arc<dyn MembershipProver>) -> Self {
        let tree = MerkleTree::new();
        let mut roots = RootHistory::default();
        roots.push(tree.root());
        Self {
            state: Mutex::new(LedgerState {
                tree,
                roots,
                nullifiers: HashSet::new(),
                signatures: HashSet::new(),
                balance: 0,
                total_deposits: 0,
                tx_count: 0,
            }),
            verifier,
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shield: append a commitment and lock `amount` in the pool.
    pub fn deposit(&self, commitment: &Commitment, amount: u64) -> Result<u64, LedgerError> {
        let mut state = self.state();
        let index = state.tree.insert(commitment)?;
        let root = state.tree.root();
        state.roots.push(root);
        state.balance = state.balance.saturating_add(amount);
        state.total_deposits += 1;
        info!(leaf_index = index, amount, "deposit recorded");
        Ok(index)
    }

    pub fn root(&self) -> Field {
        self.state().tree.root()
    }

    fn signature_for(data: &[u8], tx_count: u64) -> TxSignature {
        let mut hasher = Sha512::new();
        hasher.update(data);
        hasher.update(tx_count.to_le_bytes());
        TxSignature(bs58::encode(hasher.finalize()).into_string())
    }
}

/// The public inputs must be exactly the values the instruction claims.
fn check_public_inputs(instruction: &RelayInstruction) -> Result<Field, LedgerError> {
    let inputs = &instruction.proof().public_inputs;
    if inputs.len() != 4 {
        return Err(LedgerError::InvalidProof(format!(
            "expected 4 public inputs, got {}",
            inputs.len()
        )));
    }

    let third = match instruction {
        RelayInstruction::Withdraw { recipient, .. } => field_to_bytes(field_from_bytes(recipient)),
        RelayInstruction::Transfer { new_commitment, .. } => *new_commitment.as_bytes(),
    };
    if inputs[1] != *instruction.nullifier().as_bytes() {
        return Err(LedgerError::InvalidProof("nullifier hash mismatch".into()));
    }
    if inputs[2] != third {
        return Err(LedgerError::InvalidProof(
            "recipient or new commitment mismatch".into(),
        ));
    }
    if inputs[3] != field_to_bytes(Field::from(instruction.amount())) {
        return Err(LedgerError::InvalidProof("amount mismatch".into()));
    }

    Ok(field_from_bytes(&inputs[0]))
}

impl LedgerGateway for InMemoryLedger {
    async fn membership_witness(
        &self,
        commitment: &Commitment,
    ) -> Result<MembershipWitness, LedgerError> {
        let state = self.state();
        let path = state
            .tree
            .path_for(commitment)
            .ok_or(LedgerError::CommitmentNotFound(*commitment))?;
        Ok(MembershipWitness {
            root: state.tree.root(),
            path,
        })
    }

    async fn is_spent(&self, nullifier: &Nullifier) -> Result<bool, LedgerError> {
        Ok(self.state().nullifiers.contains(nullifier))
    }

    async fn submit(&self, instruction: RelayInstruction) -> Result<TxSignature, LedgerError> {
        let root = check_public_inputs(&instruction)?;

        // Verification is the expensive part; keep it outside the lock.
        let valid = self
            .verifier
            .verify(instruction.proof())
            .map_err(|e| LedgerError::InvalidProof(e.to_string()))?;
        if !valid {
            return Err(LedgerError::InvalidProof("verification equation failed".into()));
        }

        let mut state = self.state();
        if !state.roots.is_known(&root) {
            return Err(LedgerError::UnknownRoot);
        }
        let nullifier = *instruction.nullifier();
        if state.nullifiers.contains(&nullifier) {
            return Err(LedgerError::NullifierSpent(nullifier));
        }

        match &instruction {
            RelayInstruction::Withdraw { amount, .. } => {
                if state.balance < *amount {
                    return Err(LedgerError::InsufficientFunds {
                        available: state.balance,
                        requested: *amount,
                    });
                }
                state.balance -= amount;
            }
            RelayInstruction::Transfer { new_commitment, .. } => {
                state.tree.insert(new_commitment)?;
                let root = state.tree.root();
                state.roots.push(root);
            }
        }

        state.nullifiers.insert(nullifier);
        state.tx_count += 1;
        let signature = Self::signature_for(&instruction.data(), state.tx_count);
        state.signatures.insert(signature.clone());
        debug!(%signature, %nullifier, "relayed instruction applied");
        Ok(signature)
    }

    async fn is_confirmed(&self, signature: &TxSignature) -> Result<bool, LedgerError> {
        Ok(self.state().signatures.contains(signature))
    }

    async fn pool_stats(&self) -> Result<PoolStats, LedgerError> {
        let state = self.state();
        Ok(PoolStats {
            total_value_locked: state.balance,
            total_deposits: state.total_deposits,
            anonymity_set_size: state.tree.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use whalevault_privacy::{Secret, commitment, nullifier};
    use whalevault_prover::{
        MockProver, NoProgress, ProofRequest, SpendWitness, TransferPublicInputs,
        WithdrawPublicInputs,
    };

    const AMOUNT: u64 = 1_000_000_000;

    fn setup() -> (Arc<MockProver>, InMemoryLedger) {
        let prover = Arc::new(MockProver::with_prove_time(Duration::ZERO));
        let ledger = InMemoryLedger::new(prover.clone());
        (prover, ledger)
    }

    async fn withdraw(
        prover: &MockProver,
        ledger: &InMemoryLedger,
        secret: &Secret,
        recipient: [u8; 32],
    ) -> RelayInstruction {
        let c = commitment(AMOUNT, secret).unwrap();
        let n = nullifier(&c, secret);
        let witness = ledger.membership_witness(&c).await.unwrap();
        let proof = prover
            .prove(
                ProofRequest::Withdraw {
                    public: WithdrawPublicInputs {
                        root: witness.root,
                        nullifier_hash: n.to_field(),
                        recipient,
                        amount: AMOUNT,
                    },
                    spend: SpendWitness::new(secret.clone(), &witness.path).unwrap(),
                },
                &NoProgress,
            )
            .unwrap();
        RelayInstruction::Withdraw {
            proof,
            nullifier: n,
            recipient,
            amount: AMOUNT,
            fee: 0,
        }
    }

    #[tokio::test]
    async fn test_deposit_updates_stats_and_root() {
        let (_, ledger) = setup();
        let before = ledger.root();
        let c = commitment(AMOUNT, &Secret::from_bytes([1; 32])).unwrap();
        assert_eq!(ledger.deposit(&c, AMOUNT).unwrap(), 0);

        assert_ne!(ledger.root(), before);
        let stats = ledger.pool_stats().await.unwrap();
        assert_eq!(stats.total_value_locked, AMOUNT);
        assert_eq!(stats.total_deposits, 1);
        assert_eq!(stats.anonymity_set_size, 1);
    }

    #[tokio::test]
    async fn test_unknown_commitment_has_no_witness() {
        let (_, ledger) = setup();
        let c = commitment(AMOUNT, &Secret::from_bytes([1; 32])).unwrap();
        assert!(matches!(
            ledger.membership_witness(&c).await,
            Err(LedgerError::CommitmentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_withdraw_spends_nullifier_once() {
        let (prover, ledger) = setup();
        let secret = Secret::from_bytes([0x42; 32]);
        ledger
            .deposit(&commitment(AMOUNT, &secret).unwrap(), AMOUNT)
            .unwrap();

        let instruction = withdraw(&prover, &ledger, &secret, [9u8; 32]).await;
        let signature = ledger.submit(instruction.clone()).await.unwrap();
        assert!(ledger.is_confirmed(&signature).await.unwrap());
        assert!(ledger.is_spent(instruction.nullifier()).await.unwrap());
        assert_eq!(ledger.pool_stats().await.unwrap().total_value_locked, 0);

        let replay = ledger.submit(instruction).await.unwrap_err();
        assert!(matches!(replay, LedgerError::NullifierSpent(_)), "got {replay:?}");
    }

    #[tokio::test]
    async fn test_stale_root_within_history_is_accepted() {
        let (prover, ledger) = setup();
        let secret = Secret::from_bytes([0x42; 32]);
        ledger
            .deposit(&commitment(AMOUNT, &secret).unwrap(), AMOUNT)
            .unwrap();
        let instruction = withdraw(&prover, &ledger, &secret, [9u8; 32]).await;

        // another deposit moves the root on
        ledger
            .deposit(&commitment(AMOUNT, &Secret::from_bytes([7; 32])).unwrap(), AMOUNT)
            .unwrap();
        assert!(ledger.submit(instruction).await.is_ok());
    }

    #[tokio::test]
    async fn test_mismatched_recipient_is_rejected() {
        let (prover, ledger) = setup();
        let secret = Secret::from_bytes([0x42; 32]);
        ledger
            .deposit(&commitment(AMOUNT, &secret).unwrap(), AMOUNT)
            .unwrap();

        let mut instruction = withdraw(&prover, &ledger, &secret, [9u8; 32]).await;
        if let RelayInstruction::Withdraw { recipient, .. } = &mut instruction {
            *recipient = [8u8; 32];
        }
        assert!(matches!(
            ledger.submit(instruction).await,
            Err(LedgerError::InvalidProof(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer_inserts_new_commitment() {
        let (prover, ledger) = setup();
        let secret = Secret::from_bytes([0x42; 32]);
        let c = commitment(AMOUNT, &secret).unwrap();
        ledger.deposit(&c, AMOUNT).unwrap();

        let recipient_secret = Secret::from_bytes([0x24; 32]);
        let new_commitment = commitment(AMOUNT, &recipient_secret).unwrap();
        let n = nullifier(&c, &secret);
        let witness = ledger.membership_witness(&c).await.unwrap();
        let proof = prover
            .prove(
                ProofRequest::Transfer {
                    public: TransferPublicInputs {
                        root: witness.root,
                        nullifier_hash: n.to_field(),
                        new_commitment: new_commitment.to_field(),
                        amount: AMOUNT,
                    },
                    spend: SpendWitness::new(secret.clone(), &witness.path).unwrap(),
                    recipient_secret,
                },
                &NoProgress,
            )
            .unwrap();

        ledger
            .submit(RelayInstruction::Transfer {
                proof,
                nullifier: n,
                new_commitment,
                amount: AMOUNT,
            })
            .await
            .unwrap();

        assert!(ledger.membership_witness(&new_commitment).await.is_ok());
        let stats = ledger.pool_stats().await.unwrap();
        assert_eq!(stats.total_value_locked, AMOUNT, "transfers keep value in the pool");
        assert_eq!(stats.anonymity_set_size, 2);
    }
}
