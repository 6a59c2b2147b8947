//! Round engine facade.
//!
//! Owns every component behind its own lock. Multi-component operations take locks
//! in one fixed order: rounds, registry, ledger, claims, journal, stats. Settlement
//! holds the rounds write lock for its whole duration, so racing settlers serialize
//! and exactly one observes an `Ended` round.

use crate::claims::{ClaimRecord, ClaimVault};
use crate::config::{EngineConfig, ParamBounds, TokenParams};
use crate::error::{EngineError, LedgerError};
use crate::journal::{EngineEvent, EventJournal, JournalEntry, PauseScope};
use crate::permits::{normalize_proof_id, BurnEvidence, BurnEvidenceSource, PermitGrant};
use crate::registry::{ContentFilter, ContentRecord, ContentRegistry};
use crate::rounds::{Round, RoundBook};
use crate::settlement::{SettlementContext, SettlementCoordinator, SettlementReceipt};
use crate::stats::{AccountStats, ProtocolStats, StatsBook};
use crate::token::{AccountState, BurnReceipt, LedgerParameter, TokenLedger, TransferReceipt};
use crate::types::{amount_serde, AccountId, Amount, ContentId, RoundId, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Everything known about one account at `now`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub account: AccountId,
    #[serde(flatten)]
    pub state: AccountState,
    pub tier_ratio_pct: u64,
    pub holding_bonus_pct: u64,
    pub in_cooldown: bool,
    pub is_diamond: bool,
    pub is_long_holder: bool,
    pub can_participate: bool,
    pub stats: AccountStats,
}

/// Current ledger parameters and supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    #[serde(with = "amount_serde")]
    pub total_supply: Amount,
    #[serde(with = "amount_serde")]
    pub reward_pool_balance: Amount,
    #[serde(with = "amount_serde")]
    pub reserved_for_claims: Amount,
    pub ledger_paused: bool,
    pub interactions_paused: bool,
    pub params: TokenParams,
    pub bounds: ParamBounds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeReceipt {
    pub content_id: ContentId,
    pub round_id: RoundId,
    pub like_count: u64,
    #[serde(with = "amount_serde")]
    pub cost: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub round_id: RoundId,
    pub account: AccountId,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
}

pub struct RoundEngine {
    config: EngineConfig,
    coordinator: SettlementCoordinator,
    interactions_paused: AtomicBool,
    rounds: RwLock<RoundBook>,
    registry: RwLock<ContentRegistry>,
    ledger: RwLock<TokenLedger>,
    claims: RwLock<ClaimVault>,
    journal: Mutex<EventJournal>,
    stats: Mutex<StatsBook>,
}

impl RoundEngine {
    /// Mint the genesis supply and open round 1 at `now`.
    pub fn new(config: EngineConfig, now: Timestamp) -> Result<Self, EngineError> {
        config.validate()?;

        let ledger = TokenLedger::genesis(
            config.genesis.clone(),
            config.token.clone(),
            config.holding.clone(),
            config.bounds.clone(),
            now,
        );
        let rounds = RoundBook::new(now, config.rounds.duration_secs);
        let first = rounds.current()?.clone();
        let mut journal = EventJournal::new();
        journal.append(
            now,
            EngineEvent::RoundStarted {
                round_id: first.id,
                start_time: first.start_time,
                end_time: first.end_time,
            },
        )?;

        info!(round_id = first.id, end_time = first.end_time, "round engine started");
        Ok(Self {
            coordinator: SettlementCoordinator::new(config.rounds.clone()),
            registry: RwLock::new(ContentRegistry::new(
                config.rounds.max_content_per_round,
                config.rounds.max_participants_per_round,
            )),
            config,
            interactions_paused: AtomicBool::new(false),
            rounds: RwLock::new(rounds),
            ledger: RwLock::new(ledger),
            claims: RwLock::new(ClaimVault::new()),
            journal: Mutex::new(journal),
            stats: Mutex::new(StatsBook::new(first.id)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- ledger ----

    pub fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<TransferReceipt, EngineError> {
        let mut ledger = write(&self.ledger, "ledger")?;
        let receipt = ledger.transfer(from, to, amount, now).map_err(|err| {
            debug!(from = %from, to = %to, error = %err, "transfer rejected");
            EngineError::from(err)
        })?;

        let mut events = vec![EngineEvent::Transfer {
            from: from.clone(),
            to: to.clone(),
            amount,
            received: receipt.received,
            fee: receipt.fee,
        }];
        if receipt.fee > 0 {
            events.push(EngineEvent::FeesCollected {
                reward_amount: receipt.reward_amount,
                marketing_amount: receipt.marketing_amount,
            });
        }
        self.record(now, events)?;
        drop(ledger);
        lock(&self.stats, "stats")?.record_fee(receipt.fee);
        Ok(receipt)
    }

    pub fn burn_for_upload(
        &self,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<BurnReceipt, EngineError> {
        let mut ledger = write(&self.ledger, "ledger")?;
        let receipt = ledger.burn_for_upload(account).map_err(|err| {
            debug!(account = %account, error = %err, "upload burn rejected");
            EngineError::from(err)
        })?;

        self.record(
            now,
            vec![EngineEvent::BurnForUpload {
                account: account.clone(),
                amount: receipt.amount,
                permit_count: receipt.permit_count,
            }],
        )?;
        drop(ledger);
        lock(&self.stats, "stats")?.record_burn(account, receipt.amount);
        Ok(receipt)
    }

    /// Grant a permit for burn evidence found through `source`. Replayed proofs
    /// return the current count with `granted = false`.
    pub fn register_burn_permit(
        &self,
        account: &AccountId,
        proof_id: &str,
        source: &dyn BurnEvidenceSource,
        now: Timestamp,
    ) -> Result<PermitGrant, EngineError> {
        {
            let ledger = read(&self.ledger, "ledger")?;
            if ledger.is_proof_used(proof_id) {
                debug!(account = %account, proof_id, "burn proof replayed");
                return Ok(PermitGrant {
                    granted: false,
                    permit_count: ledger.burn_permit_count(account),
                });
            }
        }

        let evidence = source
            .lookup(proof_id)?
            .ok_or_else(|| EngineError::from(LedgerError::ProofNotFound(proof_id.to_string())))?;
        let mut ledger = write(&self.ledger, "ledger")?;
        let grant = ledger.register_burn_permit(account, &evidence)?;
        if grant.granted {
            self.record(
                now,
                vec![EngineEvent::PermitRegistered {
                    account: account.clone(),
                    proof_id: evidence.proof_id.clone(),
                    amount: evidence.amount,
                    permit_count: grant.permit_count,
                }],
            )?;
            drop(ledger);
            lock(&self.stats, "stats")?.record_burn(account, evidence.amount);
        }
        Ok(grant)
    }

    // ---- registry ----

    pub fn register_content(
        &self,
        uploader: &AccountId,
        cid: &str,
        title: &str,
        cover_cid: &str,
        now: Timestamp,
    ) -> Result<ContentRecord, EngineError> {
        self.ensure_interactions_open()?;
        let rounds = read(&self.rounds, "rounds")?;
        let round_id = rounds.ensure_open(now)?;
        let mut registry = write(&self.registry, "registry")?;
        let mut ledger = write(&self.ledger, "ledger")?;

        registry.check_register(round_id, cid, title)?;
        ledger.ensure_permit(uploader)?;

        ledger.consume_permit(uploader)?;
        let record = registry.register(round_id, uploader, cid, title, cover_cid, now);

        info!(
            round_id,
            content_id = %record.id,
            uploader = %uploader,
            "content registered"
        );
        self.record(
            now,
            vec![EngineEvent::ContentRegistered {
                content_id: record.id.clone(),
                uploader: uploader.clone(),
                round_id,
                cid: record.cid.clone(),
                title: record.title.clone(),
                cover_cid: record.cover_cid.clone(),
            }],
        )?;
        drop(ledger);
        drop(registry);
        drop(rounds);
        lock(&self.stats, "stats")?.record_upload(uploader);
        Ok(record)
    }

    pub fn like_content(
        &self,
        liker: &AccountId,
        content_id: &ContentId,
        now: Timestamp,
    ) -> Result<LikeReceipt, EngineError> {
        self.ensure_interactions_open()?;
        let rounds = read(&self.rounds, "rounds")?;
        let round_id = rounds.ensure_open(now)?;
        let mut registry = write(&self.registry, "registry")?;
        let mut ledger = write(&self.ledger, "ledger")?;

        let uploader = registry
            .check_like(content_id, liker, round_id)
            .map_err(|err| {
                debug!(liker = %liker, content_id = %content_id, error = %err, "like rejected");
                err
            })?
            .uploader
            .clone();
        ledger.ensure_can_burn_like(liker)?;

        let cost = ledger.burn_for_like(liker)?;
        let like_count = registry.like(content_id, liker)?;

        self.record(
            now,
            vec![
                EngineEvent::LikeBurn {
                    account: liker.clone(),
                    amount: cost,
                },
                EngineEvent::ContentLiked {
                    content_id: content_id.clone(),
                    liker: liker.clone(),
                    new_like_count: like_count,
                },
            ],
        )?;
        drop(ledger);
        drop(registry);
        drop(rounds);
        lock(&self.stats, "stats")?.record_like(liker, &uploader, cost);
        Ok(LikeReceipt {
            content_id: content_id.clone(),
            round_id,
            like_count,
            cost,
        })
    }

    // ---- settlement ----

    pub fn current_round_id(&self) -> Result<RoundId, EngineError> {
        Ok(read(&self.rounds, "rounds")?.current_id())
    }

    pub fn current_round(&self) -> Result<Round, EngineError> {
        let rounds = read(&self.rounds, "rounds")?;
        self.with_live_participants(rounds.current()?.clone())
    }

    pub fn get_round(&self, round_id: RoundId) -> Result<Round, EngineError> {
        let rounds = read(&self.rounds, "rounds")?;
        let round = rounds
            .get(round_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("round {round_id}")))?;
        self.with_live_participants(round)
    }

    /// Settled rounds carry the count frozen at settlement; unsettled rounds report
    /// the registry's running count. Callers hold the rounds lock.
    fn with_live_participants(&self, mut round: Round) -> Result<Round, EngineError> {
        if !round.settled {
            round.participant_count =
                read(&self.registry, "registry")?.participant_count(round.id) as u64;
        }
        Ok(round)
    }

    pub fn is_settleable(&self, now: Timestamp) -> Result<bool, EngineError> {
        Ok(read(&self.rounds, "rounds")?.is_settleable(now))
    }

    pub fn time_until_round_end(&self, now: Timestamp) -> Result<u64, EngineError> {
        Ok(read(&self.rounds, "rounds")?.time_until_end(now))
    }

    /// Settle the current round on behalf of `caller`.
    ///
    /// At most one call succeeds per round; every other concurrent caller gets
    /// `PreconditionFailed`.
    pub fn try_settle(
        &self,
        caller: &AccountId,
        now: Timestamp,
    ) -> Result<SettlementReceipt, EngineError> {
        self.ensure_interactions_open()?;
        let mut rounds = write(&self.rounds, "rounds")?;
        let registry = read(&self.registry, "registry")?;
        let mut ledger = write(&self.ledger, "ledger")?;
        let mut claims = write(&self.claims, "claims")?;

        let receipt = self
            .coordinator
            .settle(
                SettlementContext {
                    rounds: &mut rounds,
                    registry: &registry,
                    ledger: &mut ledger,
                    claims: &mut claims,
                },
                caller,
                now,
            )
            .map_err(|err| {
                debug!(caller = %caller, error = %err, "settlement not performed");
                err
            })?;

        let mut events = Vec::new();
        for record in &receipt.forfeited {
            events.push(EngineEvent::ClaimForfeited {
                round_id: record.round_id,
                account: record.account.clone(),
                amount: record.amount,
            });
        }
        events.push(EngineEvent::RoundSettled {
            round_id: receipt.round_id,
            reward_pool: receipt.reward_pool,
            participant_count: receipt.participant_count,
            winners: receipt.winners.clone(),
        });
        if let Some(incentive) = &receipt.incentive {
            events.push(EngineEvent::Transfer {
                from: self.config.genesis.reward_pool.clone(),
                to: incentive.caller.clone(),
                amount: incentive.transfer.amount,
                received: incentive.transfer.received,
                fee: incentive.transfer.fee,
            });
            events.push(EngineEvent::SettlementIncentivePaid {
                round_id: receipt.round_id,
                caller: incentive.caller.clone(),
                amount: incentive.transfer.received,
            });
        }
        events.push(EngineEvent::RoundStarted {
            round_id: receipt.next_round_id,
            start_time: receipt.next_round_start,
            end_time: receipt.next_round_end,
        });
        self.record(now, events)?;

        let forfeited: Amount = receipt.forfeited.iter().map(|r| r.amount).sum();
        lock(&self.stats, "stats")?.record_settlement(
            receipt.next_round_id,
            receipt
                .incentive
                .as_ref()
                .map(|i| (&i.caller, i.transfer.received)),
            forfeited,
        );
        Ok(receipt)
    }

    // ---- claims ----

    pub fn get_claimable(
        &self,
        round_id: RoundId,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<Amount, EngineError> {
        Ok(read(&self.claims, "claims")?.claimable(round_id, account, now))
    }

    pub fn get_claim(
        &self,
        round_id: RoundId,
        account: &AccountId,
    ) -> Result<Option<ClaimRecord>, EngineError> {
        Ok(read(&self.claims, "claims")?.get(round_id, account).cloned())
    }

    pub fn account_claims(&self, account: &AccountId) -> Result<Vec<ClaimRecord>, EngineError> {
        Ok(read(&self.claims, "claims")?.account_claims(account))
    }

    pub fn round_claims(&self, round_id: RoundId) -> Result<Vec<ClaimRecord>, EngineError> {
        Ok(read(&self.claims, "claims")?.round_claims(round_id))
    }

    pub fn claim(
        &self,
        round_id: RoundId,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<ClaimReceipt, EngineError> {
        let mut rounds = write(&self.rounds, "rounds")?;
        let mut ledger = write(&self.ledger, "ledger")?;
        let mut claims = write(&self.claims, "claims")?;

        let amount = claims.check_claim(round_id, account, now).map_err(|err| {
            debug!(round_id, account = %account, error = %err, "claim rejected");
            err
        })?;
        let pool = self.config.genesis.reward_pool.clone();
        let transfer = ledger.transfer(&pool, account, amount, now)?;
        claims.mark_claimed(round_id, account, now)?;
        rounds.record_claim(round_id, amount)?;

        info!(round_id, account = %account, amount = %amount, "reward claimed");
        self.record(
            now,
            vec![
                EngineEvent::Transfer {
                    from: pool,
                    to: account.clone(),
                    amount,
                    received: transfer.received,
                    fee: transfer.fee,
                },
                EngineEvent::RewardClaimed {
                    round_id,
                    account: account.clone(),
                    amount,
                },
            ],
        )?;
        drop(claims);
        drop(ledger);
        drop(rounds);
        lock(&self.stats, "stats")?.record_claim(account, amount);
        Ok(ClaimReceipt {
            round_id,
            account: account.clone(),
            amount,
        })
    }

    /// Burn and forfeit every unclaimed claim whose window has closed.
    pub fn sweep_expired_claims(&self, now: Timestamp) -> Result<Vec<ClaimRecord>, EngineError> {
        let mut ledger = write(&self.ledger, "ledger")?;
        let mut claims = write(&self.claims, "claims")?;
        let forfeited = claims.sweep_expired(now);
        for record in &forfeited {
            ledger.burn_from_reward_pool(record.amount);
        }
        if forfeited.is_empty() {
            return Ok(forfeited);
        }
        info!(count = forfeited.len(), "expired claims forfeited");
        self.record(
            now,
            forfeited
                .iter()
                .map(|record| EngineEvent::ClaimForfeited {
                    round_id: record.round_id,
                    account: record.account.clone(),
                    amount: record.amount,
                })
                .collect(),
        )?;
        drop(claims);
        drop(ledger);
        let total: Amount = forfeited.iter().map(|r| r.amount).sum();
        lock(&self.stats, "stats")?.record_forfeit(total);
        Ok(forfeited)
    }

    // ---- admin ----

    pub fn set_blacklist(
        &self,
        caller: &AccountId,
        account: &AccountId,
        blacklisted: bool,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        let mut ledger = write(&self.ledger, "ledger")?;
        ledger.set_blacklist(caller, account, blacklisted)?;
        self.record(
            now,
            vec![EngineEvent::BlacklistUpdated {
                account: account.clone(),
                blacklisted,
            }],
        )
    }

    pub fn set_fee_exempt(
        &self,
        caller: &AccountId,
        account: &AccountId,
        exempt: bool,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        let mut ledger = write(&self.ledger, "ledger")?;
        ledger.set_fee_exempt(caller, account, exempt)?;
        self.record(
            now,
            vec![EngineEvent::FeeExemptionUpdated {
                account: account.clone(),
                exempt,
            }],
        )
    }

    pub fn set_ledger_paused(
        &self,
        caller: &AccountId,
        paused: bool,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        let mut ledger = write(&self.ledger, "ledger")?;
        ledger.set_paused(caller, paused)?;
        self.record(
            now,
            vec![EngineEvent::PauseUpdated {
                scope: PauseScope::Ledger,
                paused,
            }],
        )
    }

    /// Pause or resume content registration, likes and settlement.
    pub fn set_interactions_paused(
        &self,
        caller: &AccountId,
        paused: bool,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        let ledger = read(&self.ledger, "ledger")?;
        ledger.ensure_owner(caller)?;
        self.interactions_paused.store(paused, Ordering::SeqCst);
        info!(paused, "interaction pause updated");
        self.record(
            now,
            vec![EngineEvent::PauseUpdated {
                scope: PauseScope::Interactions,
                paused,
            }],
        )
    }

    pub fn set_parameter(
        &self,
        caller: &AccountId,
        parameter: LedgerParameter,
        value: Amount,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        let mut ledger = write(&self.ledger, "ledger")?;
        ledger.set_parameter(caller, parameter, value)?;
        self.record(
            now,
            vec![EngineEvent::ParameterUpdated {
                parameter,
                value,
            }],
        )
    }

    pub fn interactions_paused(&self) -> bool {
        self.interactions_paused.load(Ordering::SeqCst)
    }

    // ---- queries ----

    pub fn account(&self, account: &AccountId, now: Timestamp) -> Result<AccountView, EngineError> {
        let ledger = read(&self.ledger, "ledger")?;
        let view = AccountView {
            account: account.clone(),
            state: ledger.account(account),
            tier_ratio_pct: ledger.tier_ratio(account, now),
            holding_bonus_pct: ledger.holding_bonus(account, now),
            in_cooldown: ledger.is_in_cooldown(account, now),
            is_diamond: ledger.is_diamond(account, now),
            is_long_holder: ledger.is_long_holder(account, now),
            can_participate: ledger.can_participate(account, now),
            stats: AccountStats::default(),
        };
        drop(ledger);
        Ok(AccountView {
            stats: lock(&self.stats, "stats")?.account(account),
            ..view
        })
    }

    pub fn balance_of(&self, account: &AccountId) -> Result<Amount, EngineError> {
        Ok(read(&self.ledger, "ledger")?.balance_of(account))
    }

    pub fn tier_ratio(&self, account: &AccountId, now: Timestamp) -> Result<u64, EngineError> {
        Ok(read(&self.ledger, "ledger")?.tier_ratio(account, now))
    }

    pub fn holding_bonus(&self, account: &AccountId, now: Timestamp) -> Result<u64, EngineError> {
        Ok(read(&self.ledger, "ledger")?.holding_bonus(account, now))
    }

    pub fn can_participate(
        &self,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<bool, EngineError> {
        Ok(read(&self.ledger, "ledger")?.can_participate(account, now))
    }

    pub fn ledger_summary(&self) -> Result<LedgerSummary, EngineError> {
        let ledger = read(&self.ledger, "ledger")?;
        let reserved = read(&self.claims, "claims")?.reserved();
        Ok(LedgerSummary {
            total_supply: ledger.total_supply(),
            reward_pool_balance: ledger.reward_pool_balance(),
            reserved_for_claims: reserved,
            ledger_paused: ledger.is_paused(),
            interactions_paused: self.interactions_paused(),
            params: ledger.params().clone(),
            bounds: ledger.bounds().clone(),
        })
    }

    pub fn get_content(&self, content_id: &ContentId) -> Result<ContentRecord, EngineError> {
        read(&self.registry, "registry")?
            .get(content_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("content {content_id}")))
    }

    pub fn content_count(&self) -> Result<usize, EngineError> {
        Ok(read(&self.registry, "registry")?.content_count())
    }

    pub fn list_contents(&self, filter: &ContentFilter) -> Result<Vec<ContentRecord>, EngineError> {
        Ok(read(&self.registry, "registry")?.list(filter))
    }

    pub fn round_contents(&self, round_id: RoundId) -> Result<Vec<ContentRecord>, EngineError> {
        self.get_round(round_id)?;
        Ok(read(&self.registry, "registry")?.round_contents(round_id))
    }

    pub fn round_participants(&self, round_id: RoundId) -> Result<Vec<AccountId>, EngineError> {
        self.get_round(round_id)?;
        Ok(read(&self.registry, "registry")?.round_participants(round_id))
    }

    pub fn has_liked(
        &self,
        content_id: &ContentId,
        liker: &AccountId,
    ) -> Result<bool, EngineError> {
        Ok(read(&self.registry, "registry")?.has_liked(content_id, liker))
    }

    pub fn account_stats(&self, account: &AccountId) -> Result<AccountStats, EngineError> {
        Ok(lock(&self.stats, "stats")?.account(account))
    }

    pub fn protocol_stats(&self) -> Result<ProtocolStats, EngineError> {
        Ok(lock(&self.stats, "stats")?.protocol())
    }

    // ---- journal ----

    pub fn journal_len(&self) -> Result<usize, EngineError> {
        Ok(lock(&self.journal, "journal")?.len())
    }

    pub fn journal_since(&self, from: u64, limit: usize) -> Result<Vec<JournalEntry>, EngineError> {
        Ok(lock(&self.journal, "journal")?
            .entries_since(from)
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    pub fn verify_journal(&self) -> Result<bool, EngineError> {
        Ok(lock(&self.journal, "journal")?.verify_chain())
    }

    /// Swap in a journal whose chain the replayed state was checked against.
    pub(crate) fn adopt_journal(&self, journal: EventJournal) -> Result<(), EngineError> {
        *lock(&self.journal, "journal")? = journal;
        Ok(())
    }

    fn record(&self, now: Timestamp, events: Vec<EngineEvent>) -> Result<(), EngineError> {
        let mut journal = lock(&self.journal, "journal")?;
        for event in events {
            journal.append(now, event)?;
        }
        Ok(())
    }

    fn ensure_interactions_open(&self) -> Result<(), EngineError> {
        if self.interactions_paused() {
            return Err(EngineError::denied("interactions are paused"));
        }
        Ok(())
    }
}

/// Transfers recorded in the engine's own journal serve as burn evidence; the
/// journal entry id is the proof id.
impl BurnEvidenceSource for RoundEngine {
    fn lookup(&self, proof_id: &str) -> Result<Option<BurnEvidence>, EngineError> {
        let journal = lock(&self.journal, "journal")?;
        let Some(entry) = journal.find_entry(&normalize_proof_id(proof_id)) else {
            return Ok(None);
        };
        match &entry.event {
            EngineEvent::Transfer {
                from, to, received, ..
            } => Ok(Some(BurnEvidence {
                proof_id: entry.entry_id.clone(),
                from: from.clone(),
                to: to.clone(),
                amount: *received,
            })),
            other => Err(EngineError::from(LedgerError::InvalidEvidence(format!(
                "proof {proof_id} is a {} entry, not a transfer",
                other.name()
            )))),
        }
    }
}

fn read<'a, T>(
    lock: &'a RwLock<T>,
    component: &str,
) -> Result<RwLockReadGuard<'a, T>, EngineError> {
    lock.read().map_err(|_| EngineError::poisoned(component))
}

fn write<'a, T>(
    lock: &'a RwLock<T>,
    component: &str,
) -> Result<RwLockWriteGuard<'a, T>, EngineError> {
    lock.write().map_err(|_| EngineError::poisoned(component))
}

fn lock<'a, T>(mutex: &'a Mutex<T>, component: &str) -> Result<MutexGuard<'a, T>, EngineError> {
    mutex.lock().map_err(|_| EngineError::poisoned(component))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::tokens;

    const T0: Timestamp = 1_700_000_000;

    fn engine() -> RoundEngine {
        RoundEngine::new(EngineConfig::default(), T0).unwrap()
    }

    fn id(raw: &str) -> AccountId {
        AccountId::new(raw)
    }

    #[test]
    fn journal_transfer_serves_as_burn_evidence() {
        let engine = engine();
        let owner = id("owner");
        let sink = engine.config().genesis.burn_sink.clone();
        engine.transfer(&owner, &id("alice"), tokens(60_000), T0).unwrap();
        engine
            .transfer(&id("alice"), &sink, tokens(50_000), T0 + 1)
            .unwrap();

        let proof = engine
            .journal_since(0, usize::MAX)
            .unwrap()
            .into_iter()
            .rev()
            .find(|entry| matches!(entry.event, EngineEvent::Transfer { .. }))
            .map(|entry| entry.entry_id)
            .unwrap();

        let grant = engine
            .register_burn_permit(&id("alice"), &proof, &engine, T0 + 2)
            .unwrap();
        assert_eq!(grant, PermitGrant { granted: true, permit_count: 1 });
        let replay = engine
            .register_burn_permit(&id("alice"), &proof, &engine, T0 + 3)
            .unwrap();
        assert!(!replay.granted);
        assert_eq!(replay.permit_count, 1);
        assert!(engine.verify_journal().unwrap());
    }

    #[test]
    fn journal_proofs_resolve_case_insensitively() {
        let engine = engine();
        let sink = engine.config().genesis.burn_sink.clone();
        engine.transfer(&id("owner"), &sink, tokens(50_000), T0).unwrap();
        let proof = engine
            .journal_since(0, usize::MAX)
            .unwrap()
            .last()
            .map(|entry| entry.entry_id.clone())
            .unwrap();

        let evidence = engine
            .lookup(&format!("  {}  ", proof.to_uppercase()))
            .unwrap()
            .unwrap();
        assert_eq!(evidence.proof_id, proof);
        assert_eq!(evidence.amount, tokens(50_000));
    }

    #[test]
    fn open_round_reports_live_participant_count() {
        let engine = engine();
        let owner = id("owner");
        engine.transfer(&owner, &id("u1"), tokens(100_000), T0).unwrap();
        engine.transfer(&owner, &id("u2"), tokens(20_000), T0).unwrap();
        engine.burn_for_upload(&id("u1"), T0 + 1).unwrap();
        let content = engine
            .register_content(&id("u1"), "QmA", "t", "", T0 + 2)
            .unwrap();
        engine.like_content(&id("u2"), &content.id, T0 + 3).unwrap();

        assert_eq!(engine.round_participants(1).unwrap().len(), 2);
        assert_eq!(engine.current_round().unwrap().participant_count, 2);
        assert_eq!(engine.get_round(1).unwrap().participant_count, 2);

        engine.try_settle(&owner, T0 + 45 * 60).unwrap();
        assert_eq!(engine.get_round(1).unwrap().participant_count, 2);
        assert_eq!(engine.current_round().unwrap().participant_count, 0);
    }

    #[test]
    fn unknown_proofs_are_not_found() {
        let engine = engine();
        let err = engine
            .register_burn_permit(&id("alice"), "missing", &engine, T0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn interaction_pause_blocks_registry_and_settlement() {
        let engine = engine();
        let owner = id("owner");
        assert_eq!(
            engine
                .set_interactions_paused(&id("alice"), true, T0)
                .unwrap_err()
                .kind(),
            ErrorKind::AccessDenied
        );
        engine.set_interactions_paused(&owner, true, T0).unwrap();
        assert_eq!(
            engine
                .register_content(&owner, "QmA", "t", "", T0)
                .unwrap_err()
                .kind(),
            ErrorKind::AccessDenied
        );
        assert_eq!(
            engine.try_settle(&owner, T0 + 10_000).unwrap_err().kind(),
            ErrorKind::AccessDenied
        );
        engine.set_interactions_paused(&owner, false, T0).unwrap();
        assert!(engine.try_settle(&owner, T0 + 10_000).is_ok());
    }

    #[test]
    fn account_view_reports_tier_and_stats() {
        let engine = engine();
        engine
            .transfer(&id("owner"), &id("alice"), tokens(20_000), T0)
            .unwrap();
        let view = engine.account(&id("alice"), T0).unwrap();
        assert_eq!(view.state.balance, tokens(20_000));
        assert_eq!(view.tier_ratio_pct, 50);
        assert!(view.can_participate);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["balance"], "20000000000000000000000");
    }
}
