//! Secondary native-currency rewards for settled rounds.
//!
//! The operator wallet is external to the token ledger. Planning is pure; execution
//! pays winners one by one and records failures without stopping.

use crate::ranking::WINNER_SLOTS;
use crate::rounds::Round;
use crate::types::{amount_serde, mul_div_floor, AccountId, Amount, RoundId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// 0.01 of an 18-decimal native unit.
pub const DEFAULT_NATIVE_RESERVE: Amount = 10_000_000_000_000_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("wallet unavailable: {0}")]
    Unavailable(String),

    #[error("payment to {to} rejected: {reason}")]
    Rejected { to: AccountId, reason: String },
}

/// Operator-held native-currency wallet.
#[async_trait]
pub trait NativeWallet: Send + Sync {
    fn wallet_id(&self) -> &str;

    async fn balance(&self) -> Result<Amount, WalletError>;

    /// Send `amount` to `to`, returning a payment reference.
    async fn send(&self, to: &AccountId, amount: Amount) -> Result<String, WalletError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeRewardPolicy {
    /// Percent of the available balance that forms a round's native pool.
    pub reward_percent: u128,
    /// Balance kept back for the operator's own fees.
    #[serde(with = "amount_serde")]
    pub reserve: Amount,
    /// Percent of the native pool paid to ranks 1..=3. The remainder stays in the wallet.
    pub rank_split_pct: [u128; WINNER_SLOTS],
}

impl Default for NativeRewardPolicy {
    fn default() -> Self {
        Self {
            reward_percent: 100,
            reserve: DEFAULT_NATIVE_RESERVE,
            rank_split_pct: [25, 15, 10],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativePayout {
    pub rank: u8,
    pub account: AccountId,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeRewardPlan {
    pub round_id: RoundId,
    #[serde(with = "amount_serde")]
    pub available: Amount,
    #[serde(with = "amount_serde")]
    pub total: Amount,
    pub payouts: Vec<NativePayout>,
}

impl NativeRewardPolicy {
    /// Plan payouts for a settled round given the wallet balance.
    ///
    /// Returns `None` when there is nothing to pay: no winners, or no balance above
    /// the reserve.
    pub fn plan(&self, round: &Round, balance: Amount) -> Option<NativeRewardPlan> {
        let winners: Vec<(u8, &AccountId)> = round
            .top_accounts
            .iter()
            .zip(round.top_scores)
            .enumerate()
            .filter_map(|(slot, (account, score))| {
                account
                    .as_ref()
                    .filter(|_| score > 0)
                    .map(|account| (slot as u8, account))
            })
            .collect();
        if winners.is_empty() {
            return None;
        }

        let available = balance.saturating_sub(self.reserve);
        let total = mul_div_floor(available, self.reward_percent, 100);
        if total == 0 {
            return None;
        }

        let payouts = winners
            .into_iter()
            .map(|(slot, account)| NativePayout {
                rank: slot + 1,
                account: account.clone(),
                amount: mul_div_floor(total, self.rank_split_pct[usize::from(slot)], 100),
            })
            .filter(|payout| payout.amount > 0)
            .collect();

        Some(NativeRewardPlan {
            round_id: round.id,
            available,
            total,
            payouts,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPayout {
    pub payout: NativePayout,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionReport {
    pub round_id: RoundId,
    pub plan: Option<NativeRewardPlan>,
    pub paid: Vec<(NativePayout, String)>,
    pub failed: Vec<FailedPayout>,
}

/// Pays the native reward plan for settled rounds through a [`NativeWallet`].
#[derive(Clone)]
pub struct NativeDistributor {
    policy: NativeRewardPolicy,
    wallet: Arc<dyn NativeWallet>,
}

impl NativeDistributor {
    pub fn new(policy: NativeRewardPolicy, wallet: Arc<dyn NativeWallet>) -> Self {
        Self { policy, wallet }
    }

    pub fn policy(&self) -> &NativeRewardPolicy {
        &self.policy
    }

    pub fn wallet(&self) -> &Arc<dyn NativeWallet> {
        &self.wallet
    }

    /// Distribute for `round`. A failed balance read aborts before any payment; a
    /// failed payment is logged and the remaining winners are still paid.
    pub async fn distribute(&self, round: &Round) -> Result<DistributionReport, WalletError> {
        let balance = self.wallet.balance().await?;
        let mut report = DistributionReport {
            round_id: round.id,
            ..DistributionReport::default()
        };

        let Some(plan) = self.policy.plan(round, balance) else {
            if balance <= self.policy.reserve {
                warn!(
                    round_id = round.id,
                    balance = %balance,
                    wallet = self.wallet.wallet_id(),
                    "insufficient native balance for rewards"
                );
            } else {
                info!(round_id = round.id, "no native rewards to distribute");
            }
            return Ok(report);
        };

        info!(
            round_id = round.id,
            winners = plan.payouts.len(),
            total = %plan.total,
            "distributing native rewards"
        );
        for payout in &plan.payouts {
            match self.wallet.send(&payout.account, payout.amount).await {
                Ok(reference) => {
                    info!(
                        round_id = round.id,
                        rank = payout.rank,
                        account = %payout.account,
                        amount = %payout.amount,
                        reference = %reference,
                        "native reward paid"
                    );
                    report.paid.push((payout.clone(), reference));
                }
                Err(err) => {
                    error!(
                        round_id = round.id,
                        rank = payout.rank,
                        account = %payout.account,
                        error = %err,
                        "native reward payment failed"
                    );
                    report.failed.push(FailedPayout {
                        payout: payout.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        report.plan = Some(plan);
        Ok(report)
    }
}
