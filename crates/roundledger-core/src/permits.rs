//! Burn evidence consumed by permit registration.

use crate::error::EngineError;
use crate::types::{amount_serde, AccountId, Amount};
use serde::{Deserialize, Serialize};

/// An observed transfer that may prove a burn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnEvidence {
    pub proof_id: String,
    pub from: AccountId,
    pub to: AccountId,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
}

/// Outcome of a permit registration. Replayed proofs are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitGrant {
    pub granted: bool,
    pub permit_count: u64,
}

/// Where permit registration looks burn proofs up.
///
/// Implementations are queried outside of every engine lock, so the engine itself
/// can serve as a source for transfers recorded in its own journal.
pub trait BurnEvidenceSource: Send + Sync {
    fn lookup(&self, proof_id: &str) -> Result<Option<BurnEvidence>, EngineError>;
}

/// Proof ids are transaction-hash-like and compared case-insensitively.
pub fn normalize_proof_id(proof_id: &str) -> String {
    proof_id.trim().to_ascii_lowercase()
}
