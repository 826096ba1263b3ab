//! Proving Backends
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     MembershipProver                          │
//! │                                                               │
//! │  ProofRequest ──► initializing ──► computing_witness          │
//! │                     (synthesize + satisfiability check)       │
//! │               ──► generating_proof ──► finalizing             │
//! │                     (Groth16 / mock)    (encode + self-check) │
//! │                                                               │
//! │  ProofOutput: 256-byte proof + 4 × 32-byte public inputs      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ff::{BigInteger, PrimeField};
use ark_groth16::{Groth16, Proof, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem, ConstraintSystemRef, SynthesisError};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::{CircuitSpecificSetupSNARK, SNARK};
use ark_std::rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;
use whalevault_privacy::Secret;

use crate::circuit::{TransferCircuit, WithdrawCircuit};
use crate::constants::{PROOF_SIZE, PUBLIC_INPUT_SIZE};
use crate::error::{ProverError, Result};
use crate::witness::{
    SpendWitness, TransferPublicInputs, WithdrawPublicInputs, public_inputs_from_bytes,
    public_inputs_to_bytes,
};

// ============================================================================
// Proof Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    Withdraw,
    Transfer,
}

impl ProofKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofKind::Withdraw => "withdraw",
            ProofKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for ProofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered proving stages, each with the progress reported on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStage {
    Initializing,
    ComputingWitness,
    GeneratingProof,
    Finalizing,
}

impl ProofStage {
    pub fn progress(&self) -> u8 {
        match self {
            ProofStage::Initializing => 5,
            ProofStage::ComputingWitness => 20,
            ProofStage::GeneratingProof => 40,
            ProofStage::Finalizing => 90,
        }
    }
}

/// Receives stage updates from a running prover.
pub trait ProgressSink: Send + Sync {
    fn report(&self, stage: ProofStage, progress: u8);
}

impl<F: Fn(ProofStage, u8) + Send + Sync> ProgressSink for F {
    fn report(&self, stage: ProofStage, progress: u8) {
        self(stage, progress)
    }
}

/// Discards progress updates.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _stage: ProofStage, _progress: u8) {}
}

/// A statement to prove together with its private witness.
///
/// Consumed by [`MembershipProver::prove`]; the secrets it carries are
/// dropped with it.
#[derive(Clone, Debug)]
pub enum ProofRequest {
    Withdraw {
        public: WithdrawPublicInputs,
        spend: SpendWitness,
    },
    Transfer {
        public: TransferPublicInputs,
        spend: SpendWitness,
        recipient_secret: Secret,
    },
}

impl ProofRequest {
    pub fn kind(&self) -> ProofKind {
        match self {
            ProofRequest::Withdraw { .. } => ProofKind::Withdraw,
            ProofRequest::Transfer { .. } => ProofKind::Transfer,
        }
    }

    pub fn public_inputs(&self) -> Vec<Fr> {
        match self {
            ProofRequest::Withdraw { public, .. } => public.to_field_elements(),
            ProofRequest::Transfer { public, .. } => public.to_field_elements(),
        }
    }

    fn into_circuit(self) -> PoolCircuit {
        match self {
            ProofRequest::Withdraw { public, spend } => {
                PoolCircuit::Withdraw(WithdrawCircuit::new(public, spend))
            }
            ProofRequest::Transfer {
                public,
                spend,
                recipient_secret,
            } => PoolCircuit::Transfer(TransferCircuit::new(public, spend, recipient_secret)),
        }
    }
}

/// A generated proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOutput {
    pub kind: ProofKind,
    /// Proof bytes in on-chain verifier layout
    pub proof: Vec<u8>,
    /// Public inputs, 32-byte big-endian each, in circuit order
    pub public_inputs: Vec<[u8; PUBLIC_INPUT_SIZE]>,
    pub proving_time_ms: u64,
}

#[derive(Clone)]
enum PoolCircuit {
    Withdraw(WithdrawCircuit),
    Transfer(TransferCircuit),
}

impl PoolCircuit {
    fn kind(&self) -> ProofKind {
        match self {
            PoolCircuit::Withdraw(_) => ProofKind::Withdraw,
            PoolCircuit::Transfer(_) => ProofKind::Transfer,
        }
    }
}

impl ConstraintSynthesizer<Fr> for PoolCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> std::result::Result<(), SynthesisError> {
        match self {
            PoolCircuit::Withdraw(c) => c.generate_constraints(cs),
            PoolCircuit::Transfer(c) => c.generate_constraints(cs),
        }
    }
}

/// Synthesize the circuit and check that the witness satisfies it.
fn check_witness(circuit: &PoolCircuit) -> Result<()> {
    let cs = ConstraintSystem::<Fr>::new_ref();
    circuit
        .clone()
        .generate_constraints(cs.clone())
        .map_err(|e| ProverError::Synthesis(e.to_string()))?;

    let satisfied = cs
        .is_satisfied()
        .map_err(|e| ProverError::Synthesis(e.to_string()))?;
    if !satisfied {
        let detail = cs
            .which_is_unsatisfied()
            .ok()
            .flatten()
            .unwrap_or_else(|| "unknown constraint".to_string());
        return Err(ProverError::ConstraintViolation {
            kind: circuit.kind(),
            detail,
        });
    }
    Ok(())
}

// ============================================================================
// Prover Trait
// ============================================================================

/// Produces and checks membership proofs. Implementations are CPU-bound and
/// blocking; async callers run them on a blocking thread.
pub trait MembershipProver: Send + Sync {
    fn prove(&self, request: ProofRequest, progress: &dyn ProgressSink) -> Result<ProofOutput>;

    fn verify(&self, output: &ProofOutput) -> Result<bool>;

    fn name(&self) -> &'static str;
}

// ============================================================================
// Mock Prover
// ============================================================================

/// Checks the witness like a real prover, then emits a digest of the public
/// inputs instead of a Groth16 proof.
pub struct MockProver {
    prove_time: Duration,
}

impl MockProver {
    pub fn new() -> Self {
        Self {
            prove_time: Duration::from_millis(100),
        }
    }

    /// Create with custom proving time (for testing)
    pub fn with_prove_time(prove_time: Duration) -> Self {
        Self { prove_time }
    }

    fn digest(kind: ProofKind, public_inputs: &[[u8; PUBLIC_INPUT_SIZE]]) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"whalevault-mock-proof-v1");
        hasher.update(kind.as_str().as_bytes());
        for input in public_inputs {
            hasher.update(input);
        }
        let mut proof = vec![0u8; PROOF_SIZE];
        hasher.finalize_xof().fill(&mut proof);
        proof
    }
}

impl Default for MockProver {
    fn default() -> Self {
        Self::new()
    }
}

impl MembershipProver for MockProver {
    fn prove(&self, request: ProofRequest, progress: &dyn ProgressSink) -> Result<ProofOutput> {
        let start = Instant::now();
        progress.report(ProofStage::Initializing, ProofStage::Initializing.progress());

        let kind = request.kind();
        let public_inputs = public_inputs_to_bytes(&request.public_inputs());
        let circuit = request.into_circuit();

        progress.report(
            ProofStage::ComputingWitness,
            ProofStage::ComputingWitness.progress(),
        );
        check_witness(&circuit)?;
        drop(circuit);

        progress.report(
            ProofStage::GeneratingProof,
            ProofStage::GeneratingProof.progress(),
        );
        std::thread::sleep(self.prove_time);

        progress.report(ProofStage::Finalizing, ProofStage::Finalizing.progress());
        let proof = Self::digest(kind, &public_inputs);

        Ok(ProofOutput {
            kind,
            proof,
            public_inputs,
            proving_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn verify(&self, output: &ProofOutput) -> Result<bool> {
        Ok(output.proof == Self::digest(output.kind, &output.public_inputs))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ============================================================================
// Groth16 Prover (Real ZK Proving)
// ============================================================================

/// Proving and verifying key for one circuit
pub struct CircuitKeys {
    pub proving_key: ProvingKey<Bn254>,
    pub verifying_key: VerifyingKey<Bn254>,
}

impl CircuitKeys {
    pub fn from_bytes(pk_bytes: &[u8], vk_bytes: &[u8]) -> Result<Self> {
        let proving_key = ProvingKey::<Bn254>::deserialize_compressed(pk_bytes)
            .map_err(|e| ProverError::Keys(format!("failed to deserialize proving key: {e}")))?;
        let verifying_key = VerifyingKey::<Bn254>::deserialize_compressed(vk_bytes)
            .map_err(|e| ProverError::Keys(format!("failed to deserialize verifying key: {e}")))?;
        Ok(Self {
            proving_key,
            verifying_key,
        })
    }

    /// Compressed (proving key, verifying key) bytes
    pub fn to_bytes(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut pk = Vec::new();
        self.proving_key
            .serialize_compressed(&mut pk)
            .map_err(|e| ProverError::Keys(format!("failed to serialize proving key: {e}")))?;
        let mut vk = Vec::new();
        self.verifying_key
            .serialize_compressed(&mut vk)
            .map_err(|e| ProverError::Keys(format!("failed to serialize verifying key: {e}")))?;
        Ok((pk, vk))
    }

    /// blake3 of the compressed verifying key, for on-chain reference
    pub fn vk_hash(&self) -> Result<[u8; 32]> {
        let (_, vk) = self.to_bytes()?;
        Ok(*blake3::hash(&vk).as_bytes())
    }
}

/// Key file paths for a circuit inside `dir`: `<kind>.pk`, `<kind>.vk`
pub fn key_paths(dir: &Path, kind: ProofKind) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{kind}.pk")),
        dir.join(format!("{kind}.vk")),
    )
}

/// Real Groth16 prover over BN254
pub struct Groth16Prover {
    withdraw: CircuitKeys,
    transfer: CircuitKeys,
}

impl Groth16Prover {
    pub fn new(withdraw: CircuitKeys, transfer: CircuitKeys) -> Self {
        Self { withdraw, transfer }
    }

    /// Circuit-specific setup for both circuits.
    pub fn setup<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(WithdrawCircuit::blank(), rng)
            .map_err(|e| ProverError::Keys(format!("withdraw setup failed: {e}")))?;
        let withdraw = CircuitKeys {
            proving_key: pk,
            verifying_key: vk,
        };

        let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(TransferCircuit::blank(), rng)
            .map_err(|e| ProverError::Keys(format!("transfer setup failed: {e}")))?;
        let transfer = CircuitKeys {
            proving_key: pk,
            verifying_key: vk,
        };

        Ok(Self { withdraw, transfer })
    }

    /// Load keys written by the `keygen` binary
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let load = |kind| -> Result<CircuitKeys> {
            let (pk_path, vk_path) = key_paths(dir, kind);
            let pk = std::fs::read(&pk_path).map_err(|e| {
                ProverError::Keys(format!("failed to read {}: {e}", pk_path.display()))
            })?;
            let vk = std::fs::read(&vk_path).map_err(|e| {
                ProverError::Keys(format!("failed to read {}: {e}", vk_path.display()))
            })?;
            CircuitKeys::from_bytes(&pk, &vk)
        };
        Ok(Self {
            withdraw: load(ProofKind::Withdraw)?,
            transfer: load(ProofKind::Transfer)?,
        })
    }

    pub fn keys(&self, kind: ProofKind) -> &CircuitKeys {
        match kind {
            ProofKind::Withdraw => &self.withdraw,
            ProofKind::Transfer => &self.transfer,
        }
    }
}

impl MembershipProver for Groth16Prover {
    fn prove(&self, request: ProofRequest, progress: &dyn ProgressSink) -> Result<ProofOutput> {
        let start = Instant::now();
        progress.report(ProofStage::Initializing, ProofStage::Initializing.progress());

        let kind = request.kind();
        let inputs = request.public_inputs();
        let circuit = request.into_circuit();
        let keys = self.keys(kind);

        progress.report(
            ProofStage::ComputingWitness,
            ProofStage::ComputingWitness.progress(),
        );
        check_witness(&circuit)?;

        progress.report(
            ProofStage::GeneratingProof,
            ProofStage::GeneratingProof.progress(),
        );
        let proof = Groth16::<Bn254>::prove(&keys.proving_key, circuit, &mut rand::rngs::OsRng)
            .map_err(|e| ProverError::Proving(e.to_string()))?;

        progress.report(ProofStage::Finalizing, ProofStage::Finalizing.progress());
        let valid = Groth16::<Bn254>::verify(&keys.verifying_key, &inputs, &proof)
            .map_err(|e| ProverError::Proving(e.to_string()))?;
        if !valid {
            return Err(ProverError::VerificationFailed);
        }

        let proving_time_ms = start.elapsed().as_millis() as u64;
        debug!(%kind, proving_time_ms, "groth16 proof generated");

        Ok(ProofOutput {
            kind,
            proof: proof_to_bytes(&proof).to_vec(),
            public_inputs: public_inputs_to_bytes(&inputs),
            proving_time_ms,
        })
    }

    fn verify(&self, output: &ProofOutput) -> Result<bool> {
        let proof = proof_from_bytes(&output.proof)?;
        let inputs = public_inputs_from_bytes(&output.public_inputs);
        Groth16::<Bn254>::verify(&self.keys(output.kind).verifying_key, &inputs, &proof)
            .map_err(|e| ProverError::Proving(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "groth16"
    }
}

// ============================================================================
// Proof Encoding
// ============================================================================

fn fq_to_bytes(f: &Fq) -> [u8; 32] {
    let bytes = f.into_bigint().to_bytes_be();
    let mut arr = [0u8; 32];
    arr[32 - bytes.len()..].copy_from_slice(&bytes);
    arr
}

fn fq_from_bytes(bytes: &[u8]) -> Result<Fq> {
    let f = Fq::from_be_bytes_mod_order(bytes);
    if fq_to_bytes(&f) != bytes {
        return Err(ProverError::InvalidProof("coordinate is not canonical".into()));
    }
    Ok(f)
}

/// Encode a proof for the on-chain verifier:
/// -A (x, y) || B (x.c1, x.c0, y.c1, y.c0) || C (x, y), all big-endian.
pub fn proof_to_bytes(proof: &Proof<Bn254>) -> [u8; PROOF_SIZE] {
    let a_neg = -proof.a;
    let words = [
        fq_to_bytes(&a_neg.x),
        fq_to_bytes(&a_neg.y),
        fq_to_bytes(&proof.b.x.c1),
        fq_to_bytes(&proof.b.x.c0),
        fq_to_bytes(&proof.b.y.c1),
        fq_to_bytes(&proof.b.y.c0),
        fq_to_bytes(&proof.c.x),
        fq_to_bytes(&proof.c.y),
    ];

    let mut out = [0u8; PROOF_SIZE];
    for (chunk, word) in out.chunks_exact_mut(32).zip(words) {
        chunk.copy_from_slice(&word);
    }
    out
}

/// Inverse of [`proof_to_bytes`]. Points must be on the curve and in the
/// prime-order subgroup.
pub fn proof_from_bytes(bytes: &[u8]) -> Result<Proof<Bn254>> {
    if bytes.len() != PROOF_SIZE {
        return Err(ProverError::InvalidProof(format!(
            "expected {PROOF_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    let w = bytes
        .chunks_exact(32)
        .map(fq_from_bytes)
        .collect::<Result<Vec<_>>>()?;

    let a_neg = G1Affine::new_unchecked(w[0], w[1]);
    let b = G2Affine::new_unchecked(Fq2::new(w[3], w[2]), Fq2::new(w[5], w[4]));
    let c = G1Affine::new_unchecked(w[6], w[7]);

    let g1_ok = |p: &G1Affine| p.is_on_curve() && p.is_in_correct_subgroup_assuming_on_curve();
    if !g1_ok(&a_neg) || !g1_ok(&c) {
        return Err(ProverError::InvalidProof("G1 point not on curve".into()));
    }
    if !(b.is_on_curve() && b.is_in_correct_subgroup_assuming_on_curve()) {
        return Err(ProverError::InvalidProof("G2 point not on curve".into()));
    }

    Ok(Proof { a: -a_neg, b, c })
}
