//! Engine recovery from a persisted journal.
//!
//! Every run of consecutive entries in the journal is the trace of one engine
//! operation. Recovery re-runs those operations on a fresh engine at their recorded
//! times and requires every produced entry to hash exactly like the stored one.
//! Once the whole chain matched, the stored journal (entry ids included) replaces
//! the replayed copy, so proofs that reference stored entry ids keep resolving.

use crate::config::EngineConfig;
use crate::engine::RoundEngine;
use crate::error::EngineError;
use crate::journal::{EngineEvent, EventJournal, JournalEntry, PauseScope};
use crate::permits::{BurnEvidence, BurnEvidenceSource};
use crate::types::AccountId;
use std::fmt::Display;
use tracing::info;

impl RoundEngine {
    /// Rebuild an engine from a journal it wrote earlier under the same `config`.
    ///
    /// Fails with `Internal` when the chain does not verify or when replaying it
    /// under `config` does not reproduce it entry for entry.
    pub fn restore(config: EngineConfig, entries: Vec<JournalEntry>) -> Result<Self, EngineError> {
        let stored = EventJournal::from_entries(entries)?;
        let genesis = stored.entries().first().ok_or_else(|| {
            EngineError::Internal("cannot restore from an empty journal".to_string())
        })?;

        let engine = RoundEngine::new(config, genesis.recorded_at)?;
        let mut position = check_replayed(&engine, &stored, 0)?;
        while position < stored.len() {
            replay_operation(&engine, stored.entries(), position)
                .map_err(|err| diverged(position, err))?;
            position = check_replayed(&engine, &stored, position)?;
        }

        engine.adopt_journal(stored)?;
        info!(
            entries = position,
            current_round_id = engine.current_round_id()?,
            "round engine restored from journal"
        );
        Ok(engine)
    }
}

/// Burn evidence taken from a stored `PermitRegistered` entry.
struct RecordedBurn(BurnEvidence);

impl BurnEvidenceSource for RecordedBurn {
    fn lookup(&self, _proof_id: &str) -> Result<Option<BurnEvidence>, EngineError> {
        Ok(Some(self.0.clone()))
    }
}

fn replay_operation(
    engine: &RoundEngine,
    entries: &[JournalEntry],
    position: usize,
) -> Result<(), EngineError> {
    let entry = &entries[position];
    let next = entries.get(position + 1).map(|next| &next.event);
    let now = entry.recorded_at;
    let genesis = &engine.config().genesis;
    let owner = &genesis.owner;

    match &entry.event {
        EngineEvent::Transfer {
            from, to, amount, ..
        } => match next {
            Some(EngineEvent::RewardClaimed {
                round_id, account, ..
            }) if account == to => engine.claim(*round_id, account, now).map(drop),
            _ => engine.transfer(from, to, *amount, now).map(drop),
        },
        EngineEvent::BurnForUpload { account, .. } => {
            engine.burn_for_upload(account, now).map(drop)
        }
        EngineEvent::PermitRegistered {
            account,
            proof_id,
            amount,
            ..
        } => {
            let evidence = RecordedBurn(BurnEvidence {
                proof_id: proof_id.clone(),
                from: account.clone(),
                to: genesis.burn_sink.clone(),
                amount: *amount,
            });
            engine
                .register_burn_permit(account, proof_id, &evidence, now)
                .map(drop)
        }
        EngineEvent::ContentRegistered {
            uploader,
            cid,
            title,
            cover_cid,
            ..
        } => engine
            .register_content(uploader, cid, title, cover_cid, now)
            .map(drop),
        EngineEvent::LikeBurn { account, .. } => match next {
            Some(EngineEvent::ContentLiked {
                content_id, liker, ..
            }) if liker == account => engine.like_content(liker, content_id, now).map(drop),
            _ => Err(EngineError::Internal(
                "like burn is not followed by its like".to_string(),
            )),
        },
        // Forfeits that open a settlement are replayed as a sweep; the settlement's
        // own sweep then finds nothing left to forfeit.
        EngineEvent::ClaimForfeited { .. } => engine.sweep_expired_claims(now).map(drop),
        EngineEvent::RoundSettled { .. } => {
            let caller = settlement_caller(entries, position).unwrap_or(owner);
            engine.try_settle(caller, now).map(drop)
        }
        EngineEvent::BlacklistUpdated {
            account,
            blacklisted,
        } => engine.set_blacklist(owner, account, *blacklisted, now),
        EngineEvent::FeeExemptionUpdated { account, exempt } => {
            engine.set_fee_exempt(owner, account, *exempt, now)
        }
        EngineEvent::ParameterUpdated { parameter, value } => {
            engine.set_parameter(owner, *parameter, *value, now)
        }
        EngineEvent::PauseUpdated { scope, paused } => match scope {
            PauseScope::Ledger => engine.set_ledger_paused(owner, *paused, now),
            PauseScope::Interactions => engine.set_interactions_paused(owner, *paused, now),
        },
        other => Err(EngineError::Internal(format!(
            "{} entry cannot start an operation",
            other.name()
        ))),
    }
}

/// The account that earned the settlement incentive, if one was paid. Without an
/// incentive the owner replays the settlement, which pays none either.
fn settlement_caller(entries: &[JournalEntry], position: usize) -> Option<&AccountId> {
    entries[position + 1..]
        .iter()
        .take_while(|entry| !matches!(entry.event, EngineEvent::RoundStarted { .. }))
        .find_map(|entry| match &entry.event {
            EngineEvent::SettlementIncentivePaid { caller, .. } => Some(caller),
            _ => None,
        })
}

/// Compare entries the engine appended since `from` with the stored chain and
/// return the position after them.
fn check_replayed(
    engine: &RoundEngine,
    stored: &EventJournal,
    from: usize,
) -> Result<usize, EngineError> {
    let replayed = engine.journal_since(from as u64, usize::MAX)?;
    if replayed.is_empty() {
        return Err(diverged(from, "operation recorded nothing"));
    }
    for entry in &replayed {
        let position = entry.index as usize;
        let original = stored
            .entries()
            .get(position)
            .ok_or_else(|| diverged(position, "replay recorded more entries than stored"))?;
        if original.entry_hash != entry.entry_hash {
            return Err(diverged(
                position,
                format!(
                    "replayed {} does not match stored {}",
                    entry.event.name(),
                    original.event.name()
                ),
            ));
        }
    }
    Ok(from + replayed.len())
}

fn diverged(position: usize, detail: impl Display) -> EngineError {
    EngineError::Internal(format!(
        "journal replay diverged at entry {position}: {detail}"
    ))
}
