//! Collaborator adapters for RoundLedger.

#![deny(unsafe_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roundledger_core::distribution::{NativeWallet, WalletError};
use roundledger_core::error::EngineError;
use roundledger_core::permits::{normalize_proof_id, BurnEvidence, BurnEvidenceSource};
use roundledger_core::types::{AccountId, Amount};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, RwLock};

/// A payment made by [`InMemoryNativeWallet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeTransfer {
    pub reference: String,
    pub to: AccountId,
    #[serde(with = "roundledger_core::types::amount_serde")]
    pub amount: Amount,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct WalletState {
    balance: Amount,
    sent: Vec<NativeTransfer>,
}

/// Operator wallet held in memory for local runs and tests.
#[derive(Debug)]
pub struct InMemoryNativeWallet {
    id: String,
    state: Mutex<WalletState>,
}

impl InMemoryNativeWallet {
    pub fn new(id: impl Into<String>, balance: Amount) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(WalletState {
                balance,
                sent: Vec::new(),
            }),
        }
    }

    pub fn deposit(&self, amount: Amount) -> Result<Amount, WalletError> {
        let mut state = self.lock()?;
        state.balance += amount;
        Ok(state.balance)
    }

    pub fn sent(&self) -> Result<Vec<NativeTransfer>, WalletError> {
        Ok(self.lock()?.sent.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, WalletState>, WalletError> {
        self.state
            .lock()
            .map_err(|_| WalletError::Unavailable(format!("wallet {} lock poisoned", self.id)))
    }
}

#[async_trait]
impl NativeWallet for InMemoryNativeWallet {
    fn wallet_id(&self) -> &str {
        &self.id
    }

    async fn balance(&self) -> Result<Amount, WalletError> {
        Ok(self.lock()?.balance)
    }

    async fn send(&self, to: &AccountId, amount: Amount) -> Result<String, WalletError> {
        let mut state = self.lock()?;
        if state.balance < amount {
            return Err(WalletError::Rejected {
                to: to.clone(),
                reason: format!("balance {} below {}", state.balance, amount),
            });
        }
        state.balance -= amount;
        let reference = format!("native-{}", uuid::Uuid::new_v4().simple());
        state.sent.push(NativeTransfer {
            reference: reference.clone(),
            to: to.clone(),
            amount,
            sent_at: Utc::now(),
        });
        Ok(reference)
    }
}

/// Wallet whose every payment fails. Useful for chaos testing.
#[derive(Debug, Clone)]
pub struct AlwaysFailWallet {
    balance: Amount,
    reason: String,
}

impl AlwaysFailWallet {
    pub fn new(balance: Amount, reason: impl Into<String>) -> Self {
        Self {
            balance,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl NativeWallet for AlwaysFailWallet {
    fn wallet_id(&self) -> &str {
        "always-fail"
    }

    async fn balance(&self) -> Result<Amount, WalletError> {
        Ok(self.balance)
    }

    async fn send(&self, to: &AccountId, _amount: Amount) -> Result<String, WalletError> {
        Err(WalletError::Rejected {
            to: to.clone(),
            reason: self.reason.clone(),
        })
    }
}

/// Delegates to an inner wallet but refuses payments to selected recipients.
pub struct RecipientFilterWallet<W> {
    inner: W,
    refused: BTreeSet<AccountId>,
}

impl<W: NativeWallet> RecipientFilterWallet<W> {
    pub fn new(inner: W, refused: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            inner,
            refused: refused.into_iter().collect(),
        }
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }
}

#[async_trait]
impl<W: NativeWallet> NativeWallet for RecipientFilterWallet<W> {
    fn wallet_id(&self) -> &str {
        self.inner.wallet_id()
    }

    async fn balance(&self) -> Result<Amount, WalletError> {
        self.inner.balance().await
    }

    async fn send(&self, to: &AccountId, amount: Amount) -> Result<String, WalletError> {
        if self.refused.contains(to) {
            return Err(WalletError::Rejected {
                to: to.clone(),
                reason: "recipient refused".to_string(),
            });
        }
        self.inner.send(to, amount).await
    }
}

/// Burn evidence fixture keyed by proof id.
#[derive(Debug, Default)]
pub struct StaticBurnEvidence {
    records: RwLock<BTreeMap<String, BurnEvidence>>,
}

impl StaticBurnEvidence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, evidence: BurnEvidence) -> Result<(), EngineError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| EngineError::poisoned("burn evidence"))?;
        records.insert(normalize_proof_id(&evidence.proof_id), evidence);
        Ok(())
    }
}

impl BurnEvidenceSource for StaticBurnEvidence {
    fn lookup(&self, proof_id: &str) -> Result<Option<BurnEvidence>, EngineError> {
        let records = self
            .records
            .read()
            .map_err(|_| EngineError::poisoned("burn evidence"))?;
        Ok(records.get(&normalize_proof_id(proof_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundledger_core::types::tokens;

    #[tokio::test]
    async fn in_memory_wallet_debits_and_records() {
        let wallet = InMemoryNativeWallet::new("operator", 100);
        let reference = wallet.send(&AccountId::new("alice"), 40).await.unwrap();
        assert!(reference.starts_with("native-"));
        assert_eq!(wallet.balance().await.unwrap(), 60);
        assert!(wallet.send(&AccountId::new("bob"), 61).await.is_err());
        assert_eq!(wallet.sent().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn filter_wallet_refuses_selected_recipients() {
        let wallet = RecipientFilterWallet::new(
            InMemoryNativeWallet::new("operator", 100),
            [AccountId::new("mallory")],
        );
        assert!(wallet.send(&AccountId::new("mallory"), 1).await.is_err());
        assert!(wallet.send(&AccountId::new("alice"), 1).await.is_ok());
        assert_eq!(wallet.inner().balance().await.unwrap(), 99);
    }

    #[tokio::test]
    async fn always_fail_wallet_rejects() {
        let wallet = AlwaysFailWallet::new(5, "rpc down");
        assert_eq!(wallet.balance().await.unwrap(), 5);
        assert!(wallet.send(&AccountId::new("alice"), 1).await.is_err());
    }

    #[test]
    fn static_evidence_lookup_ignores_case() {
        let source = StaticBurnEvidence::new();
        source
            .insert(BurnEvidence {
                proof_id: "0xABCDEF".to_string(),
                from: AccountId::new("alice"),
                to: AccountId::new("0x000000000000000000000000000000000000dead"),
                amount: tokens(50_000),
            })
            .unwrap();
        assert!(source.lookup("0xabcdef").unwrap().is_some());
        assert!(source.lookup("0x00").unwrap().is_none());
    }
}
