//! Engine configuration.
//!
//! Defaults mirror the production deployment: a 1B supply, 3% transfer tax split
//! 80/20 between the reward and marketing pools, 45-minute rounds and a 7-day
//! claim window.

use crate::error::EngineError;
use crate::types::{amount_serde, tokens, AccountId, Amount, DAY, HOUR, MINUTE};
use serde::{Deserialize, Serialize};

/// Basis-point denominator used by every percentage split.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Accounts created at genesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisAccounts {
    /// Privileged operator. Runs admin calls and never earns the settlement incentive.
    pub owner: AccountId,
    /// Receives the reward share of transfer tax and funds every round.
    pub reward_pool: AccountId,
    pub marketing_pool: AccountId,
    /// Receives the full supply at genesis.
    pub initial_holder: AccountId,
    /// Sink observed by the burn-evidence permit path.
    pub burn_sink: AccountId,
}

impl Default for GenesisAccounts {
    fn default() -> Self {
        Self {
            owner: AccountId::new("owner"),
            reward_pool: AccountId::new("reward-pool"),
            marketing_pool: AccountId::new("marketing-pool"),
            initial_holder: AccountId::new("owner"),
            burn_sink: AccountId::new("0x000000000000000000000000000000000000dead"),
        }
    }
}

/// Tunable token parameters. Only the admin-settable ones have bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenParams {
    #[serde(with = "amount_serde")]
    pub total_supply: Amount,
    pub tax_bps: u128,
    /// Share of collected tax routed to the reward pool; the rest goes to marketing.
    pub reward_share_bps: u128,
    #[serde(with = "amount_serde")]
    pub burn_amount: Amount,
    #[serde(with = "amount_serde")]
    pub holding_threshold: Amount,
    #[serde(with = "amount_serde")]
    pub like_cost: Amount,
    #[serde(with = "amount_serde")]
    pub settlement_incentive: Amount,
}

impl Default for TokenParams {
    fn default() -> Self {
        Self {
            total_supply: tokens(1_000_000_000),
            tax_bps: 300,
            reward_share_bps: 8_000,
            burn_amount: tokens(50_000),
            holding_threshold: tokens(10_000),
            like_cost: tokens(100),
            settlement_incentive: tokens(100),
        }
    }
}

/// Holding-duration windows used by tier and bonus evaluation, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingWindows {
    pub cooldown_secs: u64,
    pub long_hold_secs: u64,
    pub diamond_secs: u64,
    pub bonus_min_secs: u64,
    pub bonus_step_secs: u64,
    pub bonus_initial_pct: u64,
    pub bonus_step_pct: u64,
    pub bonus_cap_pct: u64,
    /// Daily reset boundary as an offset from UTC midnight.
    pub bonus_reset_offset_secs: u64,
}

impl Default for HoldingWindows {
    fn default() -> Self {
        Self {
            cooldown_secs: 30 * MINUTE,
            long_hold_secs: 2 * HOUR,
            diamond_secs: 4 * HOUR,
            bonus_min_secs: 5 * MINUTE,
            bonus_step_secs: HOUR,
            bonus_initial_pct: 10,
            bonus_step_pct: 5,
            bonus_cap_pct: 40,
            bonus_reset_offset_secs: 16 * HOUR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundParams {
    pub duration_secs: u64,
    pub claim_expiry_secs: u64,
    pub max_content_per_round: usize,
    pub max_participants_per_round: usize,
    /// Percent of the round pool allocated to ranks 1..=3.
    pub rank_split_pct: [u128; 3],
}

impl Default for RoundParams {
    fn default() -> Self {
        Self {
            duration_secs: 45 * MINUTE,
            claim_expiry_secs: 7 * DAY,
            max_content_per_round: 500,
            max_participants_per_round: 2_000,
            rank_split_pct: [50, 30, 20],
        }
    }
}

/// Inclusive bound for an admin-settable amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    #[serde(with = "amount_serde")]
    pub min: Amount,
    #[serde(with = "amount_serde")]
    pub max: Amount,
}

impl AmountRange {
    pub const fn new(min: Amount, max: Amount) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: Amount) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamBounds {
    pub burn_amount: AmountRange,
    pub holding_threshold: AmountRange,
    pub like_cost: AmountRange,
}

impl Default for ParamBounds {
    fn default() -> Self {
        Self {
            burn_amount: AmountRange::new(tokens(10_000), tokens(200_000)),
            holding_threshold: AmountRange::new(tokens(1_000), tokens(100_000)),
            like_cost: AmountRange::new(tokens(1), tokens(1_000)),
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub genesis: GenesisAccounts,
    pub token: TokenParams,
    pub holding: HoldingWindows,
    pub rounds: RoundParams,
    pub bounds: ParamBounds,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let genesis = &self.genesis;
        for (role, account) in [
            ("owner", &genesis.owner),
            ("reward_pool", &genesis.reward_pool),
            ("marketing_pool", &genesis.marketing_pool),
            ("initial_holder", &genesis.initial_holder),
            ("burn_sink", &genesis.burn_sink),
        ] {
            if account.is_empty() {
                return Err(EngineError::Validation(format!("{role} account is empty")));
            }
        }
        if genesis.reward_pool == genesis.marketing_pool {
            return Err(EngineError::Validation(
                "reward and marketing pools must differ".to_string(),
            ));
        }
        if self.token.tax_bps > BPS_DENOMINATOR || self.token.reward_share_bps > BPS_DENOMINATOR
        {
            return Err(EngineError::Validation(
                "basis points must not exceed 10000".to_string(),
            ));
        }
        if self.rounds.rank_split_pct.iter().sum::<u128>() > 100 {
            return Err(EngineError::Validation(
                "rank split exceeds 100%".to_string(),
            ));
        }
        if self.rounds.duration_secs == 0 {
            return Err(EngineError::Validation(
                "round duration must be positive".to_string(),
            ));
        }
        if self.holding.long_hold_secs > self.holding.diamond_secs {
            return Err(EngineError::Validation(
                "long-hold window must not exceed diamond window".to_string(),
            ));
        }
        if self.holding.bonus_reset_offset_secs >= DAY {
            return Err(EngineError::Validation(
                "bonus reset offset must fall within one day".to_string(),
            ));
        }
        for (name, value, range) in [
            ("burn_amount", self.token.burn_amount, self.bounds.burn_amount),
            (
                "holding_threshold",
                self.token.holding_threshold,
                self.bounds.holding_threshold,
            ),
            ("like_cost", self.token.like_cost, self.bounds.like_cost),
        ] {
            if !range.contains(value) {
                return Err(EngineError::Validation(format!(
                    "{name} default {value} outside its admin bounds"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rounds.duration_secs, 2_700);
        assert_eq!(config.rounds.max_content_per_round, 500);
        assert_eq!(config.rounds.max_participants_per_round, 2_000);
    }

    #[test]
    fn rejects_oversized_rank_split() {
        let mut config = EngineConfig::default();
        config.rounds.rank_split_pct = [60, 30, 20];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_shared_pool_accounts() {
        let mut config = EngineConfig::default();
        config.genesis.marketing_pool = config.genesis.reward_pool.clone();
        assert!(config.validate().is_err());
    }
}
