//! Round settlement: rank, fund, allocate claims, pay the caller, open the next round.

use crate::claims::{ClaimRecord, ClaimVault};
use crate::config::RoundParams;
use crate::error::EngineError;
use crate::ranking::{self, Podium, RankedWinner};
use crate::registry::ContentRegistry;
use crate::rounds::{RoundBook, RoundOutcome};
use crate::token::{TokenLedger, TransferReceipt};
use crate::types::{amount_serde, mul_div_floor, AccountId, Amount, RoundId, Timestamp};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Mutable engine state a settlement runs against. Borrowed for the whole call so
/// no other writer can interleave.
pub struct SettlementContext<'a> {
    pub rounds: &'a mut RoundBook,
    pub registry: &'a ContentRegistry,
    pub ledger: &'a mut TokenLedger,
    pub claims: &'a mut ClaimVault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncentivePayment {
    pub caller: AccountId,
    pub transfer: TransferReceipt,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReceipt {
    pub round_id: RoundId,
    pub next_round_id: RoundId,
    pub next_round_start: Timestamp,
    pub next_round_end: Timestamp,
    #[serde(with = "amount_serde")]
    pub reward_pool: Amount,
    pub participant_count: u64,
    pub winners: Vec<RankedWinner>,
    pub claims: Vec<ClaimRecord>,
    pub forfeited: Vec<ClaimRecord>,
    pub incentive: Option<IncentivePayment>,
}

/// Claim for one winner: its rank share scaled by tier ratio and holding bonus,
/// never more than the share itself.
pub fn claim_amount(share: Amount, tier_pct: u64, bonus_pct: u64) -> Amount {
    let multiplier = u128::from(tier_pct) * (100 + u128::from(bonus_pct));
    mul_div_floor(share, multiplier, 10_000).min(share)
}

#[derive(Debug, Clone)]
pub struct SettlementCoordinator {
    params: RoundParams,
}

impl SettlementCoordinator {
    pub fn new(params: RoundParams) -> Self {
        Self { params }
    }

    pub fn settle(
        &self,
        ctx: SettlementContext<'_>,
        caller: &AccountId,
        now: Timestamp,
    ) -> Result<SettlementReceipt, EngineError> {
        let SettlementContext {
            rounds,
            registry,
            ledger,
            claims,
        } = ctx;
        let round_id = rounds.ensure_settleable(now)?;

        let forfeited = claims.sweep_expired(now);
        for record in &forfeited {
            ledger.burn_from_reward_pool(record.amount);
            info!(
                round_id = record.round_id,
                account = %record.account,
                amount = %record.amount,
                "expired claim forfeited"
            );
        }

        let incentive = pay_incentive(ledger, claims.reserved(), caller, round_id, now);
        let reward_pool = ledger
            .reward_pool_balance()
            .saturating_sub(claims.reserved());

        let contents = registry.round_contents(round_id);
        let podium = ranking::rank(&contents);
        let new_claims = self.allocate(&podium, reward_pool, ledger, round_id, now);
        for record in &new_claims {
            claims.insert(record.clone());
        }

        let participant_count = registry.participant_count(round_id) as u64;
        let (_, next_round_id) = rounds.settle_current(
            RoundOutcome {
                reward_pool,
                participant_count,
                podium: podium.clone(),
            },
            now,
        )?;
        let next_round = rounds.current()?;

        info!(
            round_id,
            reward_pool = %reward_pool,
            participants = participant_count,
            winners = new_claims.len(),
            caller = %caller,
            "round settled"
        );
        Ok(SettlementReceipt {
            round_id,
            next_round_id,
            next_round_start: next_round.start_time,
            next_round_end: next_round.end_time,
            reward_pool,
            participant_count,
            winners: podium.into_iter().flatten().collect(),
            claims: new_claims,
            forfeited,
            incentive,
        })
    }

    fn allocate(
        &self,
        podium: &Podium,
        reward_pool: Amount,
        ledger: &TokenLedger,
        round_id: RoundId,
        now: Timestamp,
    ) -> Vec<ClaimRecord> {
        let mut records = Vec::new();
        for (winner, split_pct) in podium.iter().zip(self.params.rank_split_pct) {
            let Some(winner) = winner else {
                continue;
            };
            let share = mul_div_floor(reward_pool, split_pct, 100);
            let tier = ledger.tier_ratio(&winner.account, now);
            let bonus = ledger.holding_bonus(&winner.account, now);
            let amount = claim_amount(share, tier, bonus);
            if amount == 0 {
                debug!(
                    round_id,
                    account = %winner.account,
                    tier,
                    "winner allocation is zero, no claim created"
                );
                continue;
            }
            records.push(ClaimRecord {
                round_id,
                account: winner.account.clone(),
                rank: winner.rank,
                amount,
                claimed: false,
                forfeited: false,
                created_at: now,
                expires_at: now.saturating_add(self.params.claim_expiry_secs),
                claimed_at: None,
            });
        }
        records
    }
}

fn pay_incentive(
    ledger: &mut TokenLedger,
    reserved: Amount,
    caller: &AccountId,
    round_id: RoundId,
    now: Timestamp,
) -> Option<IncentivePayment> {
    let incentive = ledger.params().settlement_incentive;
    if caller == ledger.owner() || incentive == 0 {
        debug!(round_id, caller = %caller, "no settlement incentive for operator");
        return None;
    }
    let available = ledger.reward_pool_balance().saturating_sub(reserved);
    if available < incentive {
        warn!(
            round_id,
            available = %available,
            incentive = %incentive,
            "reward pool cannot cover settlement incentive"
        );
        return None;
    }
    let pool = ledger.genesis_accounts().reward_pool.clone();
    match ledger.transfer(&pool, caller, incentive, now) {
        Ok(transfer) => Some(IncentivePayment {
            caller: caller.clone(),
            transfer,
        }),
        Err(err) => {
            warn!(round_id, caller = %caller, error = %err, "settlement incentive skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tokens;

    #[test]
    fn claim_amount_scales_by_tier_and_bonus() {
        let share = tokens(100);
        assert_eq!(claim_amount(share, 100, 0), tokens(100));
        assert_eq!(claim_amount(share, 80, 0), tokens(80));
        assert_eq!(claim_amount(share, 80, 10), tokens(88));
        assert_eq!(claim_amount(share, 100, 40), tokens(100));
        assert_eq!(claim_amount(share, 0, 40), 0);
    }
}
