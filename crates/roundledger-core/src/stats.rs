use crate::types::{amount_serde, AccountId, Amount, RoundId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStats {
    pub content_count: u64,
    pub likes_given: u64,
    pub likes_received: u64,
    #[serde(with = "amount_serde")]
    pub total_burned: Amount,
    #[serde(with = "amount_serde")]
    pub rewards_claimed: Amount,
    pub claim_count: u64,
    #[serde(with = "amount_serde")]
    pub settlement_incentives: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub total_content: u64,
    pub total_likes: u64,
    #[serde(with = "amount_serde")]
    pub total_burned: Amount,
    #[serde(with = "amount_serde")]
    pub total_rewards_claimed: Amount,
    #[serde(with = "amount_serde")]
    pub total_forfeited: Amount,
    #[serde(with = "amount_serde")]
    pub total_fees_collected: Amount,
    pub rounds_settled: u64,
    pub current_round_id: RoundId,
}

/// Counters maintained alongside every mutation.
#[derive(Debug, Clone, Default)]
pub struct StatsBook {
    accounts: HashMap<AccountId, AccountStats>,
    protocol: ProtocolStats,
}

impl StatsBook {
    pub fn new(current_round_id: RoundId) -> Self {
        Self {
            accounts: HashMap::new(),
            protocol: ProtocolStats {
                current_round_id,
                ..ProtocolStats::default()
            },
        }
    }

    pub fn account(&self, account: &AccountId) -> AccountStats {
        self.accounts.get(account).cloned().unwrap_or_default()
    }

    pub fn protocol(&self) -> ProtocolStats {
        self.protocol.clone()
    }

    pub fn record_fee(&mut self, fee: Amount) {
        self.protocol.total_fees_collected += fee;
    }

    pub fn record_burn(&mut self, account: &AccountId, amount: Amount) {
        self.entry(account).total_burned += amount;
        self.protocol.total_burned += amount;
    }

    pub fn record_upload(&mut self, uploader: &AccountId) {
        self.entry(uploader).content_count += 1;
        self.protocol.total_content += 1;
    }

    pub fn record_like(&mut self, liker: &AccountId, uploader: &AccountId, cost: Amount) {
        self.entry(liker).likes_given += 1;
        self.entry(uploader).likes_received += 1;
        self.record_burn(liker, cost);
        self.protocol.total_likes += 1;
    }

    pub fn record_claim(&mut self, account: &AccountId, amount: Amount) {
        let stats = self.entry(account);
        stats.rewards_claimed += amount;
        stats.claim_count += 1;
        self.protocol.total_rewards_claimed += amount;
    }

    pub fn record_settlement(
        &mut self,
        next_round_id: RoundId,
        incentive: Option<(&AccountId, Amount)>,
        forfeited: Amount,
    ) {
        self.protocol.rounds_settled += 1;
        self.protocol.current_round_id = next_round_id;
        self.record_forfeit(forfeited);
        if let Some((caller, amount)) = incentive {
            self.entry(caller).settlement_incentives += amount;
        }
    }

    /// Forfeited claims are burned from the reward pool.
    pub fn record_forfeit(&mut self, amount: Amount) {
        self.protocol.total_forfeited += amount;
        self.protocol.total_burned += amount;
    }

    fn entry(&mut self, account: &AccountId) -> &mut AccountStats {
        self.accounts.entry(account.clone()).or_default()
    }
}
