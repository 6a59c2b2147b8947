use crate::error::EngineError;
use crate::ranking::RankedWinner;
use crate::token::LedgerParameter;
use crate::types::{amount_serde, AccountId, Amount, ContentId, RoundId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Which pause flag an update touched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PauseScope {
    Ledger,
    Interactions,
}

/// Every state change the engine performs, in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Transfer {
        from: AccountId,
        to: AccountId,
        #[serde(with = "amount_serde")]
        amount: Amount,
        #[serde(with = "amount_serde")]
        received: Amount,
        #[serde(with = "amount_serde")]
        fee: Amount,
    },
    FeesCollected {
        #[serde(with = "amount_serde")]
        reward_amount: Amount,
        #[serde(with = "amount_serde")]
        marketing_amount: Amount,
    },
    BurnForUpload {
        account: AccountId,
        #[serde(with = "amount_serde")]
        amount: Amount,
        permit_count: u64,
    },
    LikeBurn {
        account: AccountId,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    PermitRegistered {
        account: AccountId,
        proof_id: String,
        #[serde(with = "amount_serde")]
        amount: Amount,
        permit_count: u64,
    },
    BlacklistUpdated {
        account: AccountId,
        blacklisted: bool,
    },
    FeeExemptionUpdated {
        account: AccountId,
        exempt: bool,
    },
    ParameterUpdated {
        parameter: LedgerParameter,
        #[serde(with = "amount_serde")]
        value: Amount,
    },
    PauseUpdated {
        scope: PauseScope,
        paused: bool,
    },
    ContentRegistered {
        content_id: ContentId,
        uploader: AccountId,
        round_id: RoundId,
        cid: String,
        title: String,
        cover_cid: String,
    },
    ContentLiked {
        content_id: ContentId,
        liker: AccountId,
        new_like_count: u64,
    },
    RoundStarted {
        round_id: RoundId,
        start_time: Timestamp,
        end_time: Timestamp,
    },
    RoundSettled {
        round_id: RoundId,
        #[serde(with = "amount_serde")]
        reward_pool: Amount,
        participant_count: u64,
        winners: Vec<RankedWinner>,
    },
    SettlementIncentivePaid {
        round_id: RoundId,
        caller: AccountId,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    RewardClaimed {
        round_id: RoundId,
        account: AccountId,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
    ClaimForfeited {
        round_id: RoundId,
        account: AccountId,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transfer { .. } => "transfer",
            Self::FeesCollected { .. } => "fees_collected",
            Self::BurnForUpload { .. } => "burn_for_upload",
            Self::LikeBurn { .. } => "like_burn",
            Self::PermitRegistered { .. } => "permit_registered",
            Self::BlacklistUpdated { .. } => "blacklist_updated",
            Self::FeeExemptionUpdated { .. } => "fee_exemption_updated",
            Self::ParameterUpdated { .. } => "parameter_updated",
            Self::PauseUpdated { .. } => "pause_updated",
            Self::ContentRegistered { .. } => "content_registered",
            Self::ContentLiked { .. } => "content_liked",
            Self::RoundStarted { .. } => "round_started",
            Self::RoundSettled { .. } => "round_settled",
            Self::SettlementIncentivePaid { .. } => "settlement_incentive_paid",
            Self::RewardClaimed { .. } => "reward_claimed",
            Self::ClaimForfeited { .. } => "claim_forfeited",
        }
    }
}

/// Hash-chained journal entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalEntry {
    pub entry_id: String,
    pub index: u64,
    pub recorded_at: Timestamp,
    pub event: EngineEvent,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

/// Append-only event journal with hash-chain proofs.
///
/// No in-place mutation APIs are exposed. Queries never read the journal: registry,
/// round and claim state are indexed directly. It is replayed only once, when an
/// engine is restored from persisted entries.
#[derive(Debug, Default, Clone)]
pub struct EventJournal {
    entries: Vec<JournalEntry>,
    by_id: HashMap<String, usize>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a journal from persisted entries and verify hash-chain integrity.
    pub fn from_entries(entries: Vec<JournalEntry>) -> Result<Self, EngineError> {
        let by_id = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.entry_id.clone(), position))
            .collect::<HashMap<_, _>>();
        if by_id.len() != entries.len() {
            return Err(EngineError::Internal(
                "persisted journal contains duplicate entry ids".to_string(),
            ));
        }
        let journal = Self { entries, by_id };

        for (expected_index, entry) in journal.entries.iter().enumerate() {
            if entry.index != expected_index as u64 {
                return Err(EngineError::Internal(format!(
                    "journal index gap detected at position {} (found {})",
                    expected_index, entry.index
                )));
            }
        }

        if !journal.verify_chain() {
            return Err(EngineError::Internal(
                "persisted journal hash-chain verification failed".to_string(),
            ));
        }

        Ok(journal)
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Entries with `index >= from`, used by storage mirrors to ship only new records.
    pub fn entries_since(&self, from: u64) -> &[JournalEntry] {
        let start = usize::try_from(from)
            .unwrap_or(usize::MAX)
            .min(self.entries.len());
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find_entry(&self, entry_id: &str) -> Option<&JournalEntry> {
        self.by_id
            .get(entry_id)
            .and_then(|position| self.entries.get(*position))
    }

    pub fn append(
        &mut self,
        recorded_at: Timestamp,
        event: EngineEvent,
    ) -> Result<JournalEntry, EngineError> {
        let index = self.entries.len() as u64;
        let previous_hash = self.entries.last().map(|entry| entry.entry_hash.clone());
        let entry_hash = compute_entry_hash(index, recorded_at, &event, previous_hash.as_deref())?;

        let entry = JournalEntry {
            entry_id: Uuid::new_v4().to_string(),
            index,
            recorded_at,
            event,
            previous_hash,
            entry_hash,
        };
        self.by_id.insert(entry.entry_id.clone(), self.entries.len());
        self.entries.push(entry.clone());
        Ok(entry)
    }

    pub fn verify_chain(&self) -> bool {
        let mut previous_hash: Option<String> = None;
        for entry in &self.entries {
            let expected = compute_entry_hash(
                entry.index,
                entry.recorded_at,
                &entry.event,
                previous_hash.as_deref(),
            );
            match expected {
                Ok(hash) if hash == entry.entry_hash => {}
                _ => return false,
            }
            if entry.previous_hash != previous_hash {
                return false;
            }
            previous_hash = Some(entry.entry_hash.clone());
        }
        true
    }
}

fn compute_entry_hash(
    index: u64,
    recorded_at: Timestamp,
    event: &EngineEvent,
    previous_hash: Option<&str>,
) -> Result<String, EngineError> {
    let material = serde_json::json!({
        "index": index,
        "recorded_at": recorded_at,
        "event": event,
        "previous_hash": previous_hash,
    });

    let bytes =
        serde_json::to_vec(&material).map_err(|e| EngineError::Internal(e.to_string()))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tokens;

    fn like_burn(account: &str) -> EngineEvent {
        EngineEvent::LikeBurn {
            account: AccountId::new(account),
            amount: tokens(100),
        }
    }

    #[test]
    fn verifies_hash_chain() {
        let mut journal = EventJournal::new();
        journal.append(10, like_burn("alice")).expect("appended");
        journal
            .append(
                11,
                EngineEvent::BlacklistUpdated {
                    account: AccountId::new("mallory"),
                    blacklisted: true,
                },
            )
            .expect("appended");

        assert!(journal.verify_chain());
        assert_eq!(journal.entries_since(1).len(), 1);
        assert_eq!(journal.entries_since(7).len(), 0);
    }

    #[test]
    fn detects_tampered_entries() {
        let mut journal = EventJournal::new();
        journal.append(10, like_burn("alice")).expect("appended");

        let mut entries = journal.entries().to_vec();
        entries[0].event = like_burn("mallory");

        assert!(EventJournal::from_entries(entries).is_err());
    }

    #[test]
    fn from_entries_rehydrates_verified_chain() {
        let mut journal = EventJournal::new();
        let first = journal.append(1, like_burn("alice")).unwrap();
        journal.append(2, like_burn("bob")).unwrap();

        let rehydrated = EventJournal::from_entries(journal.entries().to_vec()).unwrap();
        assert_eq!(rehydrated.len(), 2);
        assert_eq!(
            rehydrated.find_entry(&first.entry_id).map(|e| e.index),
            Some(0)
        );
    }

    #[test]
    fn entry_ids_are_indexed_and_unique() {
        let mut journal = EventJournal::new();
        let first = journal.append(1, like_burn("alice")).unwrap();
        let second = journal.append(2, like_burn("bob")).unwrap();
        assert_eq!(journal.find_entry(&second.entry_id).map(|e| e.index), Some(1));
        assert!(journal.find_entry("missing").is_none());

        let mut entries = journal.entries().to_vec();
        entries[1].entry_id = first.entry_id;
        let err = EventJournal::from_entries(entries).unwrap_err();
        assert!(err.to_string().contains("duplicate entry ids"));
    }

    #[test]
    fn events_serialize_with_tag_and_string_amounts() {
        let value = serde_json::to_value(like_burn("alice")).unwrap();
        assert_eq!(value["event"], "like_burn");
        assert_eq!(value["amount"], "100000000000000000000");
    }
}
