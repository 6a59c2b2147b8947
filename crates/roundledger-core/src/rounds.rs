//! Round lifecycle bookkeeping.
//!
//! A round is `Open` until `now >= end_time`, `Ended` after that, and `Settled`
//! once a settlement wrote its results. `Ended` is never stored.

use crate::error::EngineError;
use crate::ranking::{Podium, WINNER_SLOTS};
use crate::types::{amount_serde, AccountId, Amount, RoundId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Open,
    Ended,
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub settled: bool,
    pub settled_at: Option<Timestamp>,
    #[serde(with = "amount_serde")]
    pub reward_pool: Amount,
    pub participant_count: u64,
    pub top_accounts: [Option<AccountId>; WINNER_SLOTS],
    pub top_scores: [u64; WINNER_SLOTS],
    #[serde(with = "amount_serde")]
    pub total_claimed: Amount,
}

impl Round {
    fn open(id: RoundId, start_time: Timestamp, duration_secs: u64) -> Self {
        Self {
            id,
            start_time,
            end_time: start_time.saturating_add(duration_secs),
            settled: false,
            settled_at: None,
            reward_pool: 0,
            participant_count: 0,
            top_accounts: Default::default(),
            top_scores: [0; WINNER_SLOTS],
            total_claimed: 0,
        }
    }

    pub fn phase(&self, now: Timestamp) -> RoundPhase {
        if self.settled {
            RoundPhase::Settled
        } else if now >= self.end_time {
            RoundPhase::Ended
        } else {
            RoundPhase::Open
        }
    }
}

/// Results written to a round when it settles.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub reward_pool: Amount,
    pub participant_count: u64,
    pub podium: Podium,
}

#[derive(Debug, Clone)]
pub struct RoundBook {
    duration_secs: u64,
    rounds: BTreeMap<RoundId, Round>,
    current: RoundId,
}

impl RoundBook {
    /// Open round 1 at `start_time`.
    pub fn new(start_time: Timestamp, duration_secs: u64) -> Self {
        let mut rounds = BTreeMap::new();
        rounds.insert(1, Round::open(1, start_time, duration_secs));
        Self {
            duration_secs,
            rounds,
            current: 1,
        }
    }

    pub fn current_id(&self) -> RoundId {
        self.current
    }

    pub fn current(&self) -> Result<&Round, EngineError> {
        self.rounds
            .get(&self.current)
            .ok_or_else(|| EngineError::Internal(format!("current round {} missing", self.current)))
    }

    pub fn get(&self, round_id: RoundId) -> Option<&Round> {
        self.rounds.get(&round_id)
    }

    pub fn is_settleable(&self, now: Timestamp) -> bool {
        self.current()
            .map(|round| round.phase(now) == RoundPhase::Ended)
            .unwrap_or(false)
    }

    pub fn time_until_end(&self, now: Timestamp) -> u64 {
        self.current()
            .map(|round| round.end_time.saturating_sub(now))
            .unwrap_or(0)
    }

    /// The current round id, provided the round still accepts content and likes.
    pub fn ensure_open(&self, now: Timestamp) -> Result<RoundId, EngineError> {
        let round = self.current()?;
        match round.phase(now) {
            RoundPhase::Open => Ok(round.id),
            _ => Err(EngineError::precondition(format!(
                "round {} has ended and awaits settlement",
                round.id
            ))),
        }
    }

    /// The current round id, provided it may be settled at `now`.
    pub fn ensure_settleable(&self, now: Timestamp) -> Result<RoundId, EngineError> {
        let round = self.current()?;
        match round.phase(now) {
            RoundPhase::Ended => Ok(round.id),
            RoundPhase::Settled => Err(EngineError::precondition(format!(
                "round {} already settled",
                round.id
            ))),
            RoundPhase::Open => Err(EngineError::precondition(format!(
                "round {} not ended",
                round.id
            ))),
        }
    }

    /// Mark the current round settled and open its successor at `now`.
    ///
    /// Fails without mutation unless the current round is `Ended`, which makes this
    /// the check-and-set every settlement goes through.
    pub fn settle_current(
        &mut self,
        outcome: RoundOutcome,
        now: Timestamp,
    ) -> Result<(RoundId, RoundId), EngineError> {
        let round_id = self.ensure_settleable(now)?;
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or_else(|| EngineError::Internal(format!("round {round_id} missing")))?;

        round.settled = true;
        round.settled_at = Some(now);
        round.reward_pool = outcome.reward_pool;
        round.participant_count = outcome.participant_count;
        for (slot, winner) in outcome.podium.iter().enumerate() {
            if let Some(winner) = winner {
                round.top_accounts[slot] = Some(winner.account.clone());
                round.top_scores[slot] = winner.score;
            }
        }

        let next = round_id + 1;
        self.rounds
            .insert(next, Round::open(next, now, self.duration_secs));
        self.current = next;
        Ok((round_id, next))
    }

    pub fn record_claim(&mut self, round_id: RoundId, amount: Amount) -> Result<(), EngineError> {
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or_else(|| EngineError::NotFound(format!("round {round_id}")))?;
        round.total_claimed += amount;
        Ok(())
    }
}
