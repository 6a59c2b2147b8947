//! Claim vault: per-round, per-account reward allocations with an expiry.

use crate::error::EngineError;
use crate::types::{amount_serde, AccountId, Amount, RoundId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub round_id: RoundId,
    pub account: AccountId,
    pub rank: u8,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
    pub claimed: bool,
    /// Set once the record expired unclaimed and its amount was burned.
    pub forfeited: bool,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
}

impl ClaimRecord {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    pub fn is_open(&self) -> bool {
        !self.claimed && !self.forfeited
    }
}

/// Holds claim records and the total still reserved for open ones.
#[derive(Debug, Clone, Default)]
pub struct ClaimVault {
    records: BTreeMap<(RoundId, AccountId), ClaimRecord>,
    reserved: Amount,
}

impl ClaimVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ClaimRecord) {
        if record.is_open() {
            self.reserved += record.amount;
        }
        let key = (record.round_id, record.account.clone());
        if let Some(previous) = self.records.insert(key, record) {
            if previous.is_open() {
                self.reserved -= previous.amount;
            }
        }
    }

    /// Amount held back for claims that are neither paid nor forfeited.
    pub fn reserved(&self) -> Amount {
        self.reserved
    }

    pub fn get(&self, round_id: RoundId, account: &AccountId) -> Option<&ClaimRecord> {
        self.records.get(&(round_id, account.clone()))
    }

    pub fn claimable(&self, round_id: RoundId, account: &AccountId, now: Timestamp) -> Amount {
        match self.get(round_id, account) {
            Some(record) if record.is_open() && !record.is_expired(now) => record.amount,
            _ => 0,
        }
    }

    /// Amount `account` may withdraw for `round_id` at `now`.
    pub fn check_claim(
        &self,
        round_id: RoundId,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<Amount, EngineError> {
        let record = self.get(round_id, account).ok_or_else(|| {
            EngineError::NotFound(format!("no claim for {account} in round {round_id}"))
        })?;
        if record.claimed {
            return Err(EngineError::precondition("already claimed"));
        }
        if record.forfeited || record.is_expired(now) {
            return Err(EngineError::Expired {
                round_id,
                expired_at: record.expires_at,
            });
        }
        Ok(record.amount)
    }

    pub fn mark_claimed(
        &mut self,
        round_id: RoundId,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<Amount, EngineError> {
        let amount = self.check_claim(round_id, account, now)?;
        let record = self
            .records
            .get_mut(&(round_id, account.clone()))
            .ok_or_else(|| EngineError::Internal("claim record vanished".to_string()))?;
        record.claimed = true;
        record.claimed_at = Some(now);
        self.reserved -= amount;
        Ok(amount)
    }

    /// Forfeit every open record whose window closed before `now`.
    pub fn sweep_expired(&mut self, now: Timestamp) -> Vec<ClaimRecord> {
        let mut forfeited = Vec::new();
        for record in self.records.values_mut() {
            if record.is_open() && record.is_expired(now) {
                record.forfeited = true;
                self.reserved -= record.amount;
                forfeited.push(record.clone());
            }
        }
        forfeited
    }

    pub fn round_claims(&self, round_id: RoundId) -> Vec<ClaimRecord> {
        self.records
            .range((round_id, AccountId::new(""))..)
            .take_while(|((id, _), _)| *id == round_id)
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn account_claims(&self, account: &AccountId) -> Vec<ClaimRecord> {
        self.records
            .values()
            .filter(|record| &record.account == account)
            .cloned()
            .collect()
    }
}
