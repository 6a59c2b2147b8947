//! Content registry: per-round content records, like records and participant sets.
//!
//! State is indexed by round, uploader and content id so every listing is a direct
//! lookup. Ledger-side preconditions (permits, like cost) are checked by the caller.

use crate::error::EngineError;
use crate::types::{AccountId, ContentId, RoundId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: ContentId,
    pub uploader: AccountId,
    pub cid: String,
    pub title: String,
    pub cover_cid: String,
    pub round_id: RoundId,
    pub like_count: u64,
    pub created_at: Timestamp,
    /// Global registration order, used as the final ranking tie-break.
    pub sequence: u64,
}

/// Listing filter. Both fields narrow the result when set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFilter {
    pub round_id: Option<RoundId>,
    pub uploader: Option<AccountId>,
}

#[derive(Debug, Clone, Default)]
struct Participants {
    ordered: Vec<AccountId>,
    members: HashSet<AccountId>,
}

impl Participants {
    fn contains(&self, account: &AccountId) -> bool {
        self.members.contains(account)
    }

    fn insert(&mut self, account: &AccountId) -> bool {
        if self.members.insert(account.clone()) {
            self.ordered.push(account.clone());
            true
        } else {
            false
        }
    }

    fn len(&self) -> usize {
        self.ordered.len()
    }
}

#[derive(Debug, Clone)]
pub struct ContentRegistry {
    max_content_per_round: usize,
    max_participants_per_round: usize,
    contents: HashMap<ContentId, ContentRecord>,
    order: Vec<ContentId>,
    by_round: HashMap<RoundId, Vec<ContentId>>,
    by_uploader: HashMap<AccountId, Vec<ContentId>>,
    likes: HashSet<(ContentId, AccountId)>,
    participants: HashMap<RoundId, Participants>,
}

impl ContentRegistry {
    pub fn new(max_content_per_round: usize, max_participants_per_round: usize) -> Self {
        Self {
            max_content_per_round,
            max_participants_per_round,
            contents: HashMap::new(),
            order: Vec::new(),
            by_round: HashMap::new(),
            by_uploader: HashMap::new(),
            likes: HashSet::new(),
            participants: HashMap::new(),
        }
    }

    pub fn check_register(
        &self,
        round_id: RoundId,
        cid: &str,
        title: &str,
    ) -> Result<(), EngineError> {
        if cid.trim().is_empty() {
            return Err(EngineError::Validation("content cid is empty".to_string()));
        }
        if title.trim().is_empty() {
            return Err(EngineError::Validation("title is empty".to_string()));
        }
        if self.round_content_count(round_id) >= self.max_content_per_round {
            return Err(EngineError::precondition(format!(
                "round {round_id} reached its content limit of {}",
                self.max_content_per_round
            )));
        }
        Ok(())
    }

    /// Store a content record in `round_id`. Callers run [`Self::check_register`] first.
    pub fn register(
        &mut self,
        round_id: RoundId,
        uploader: &AccountId,
        cid: &str,
        title: &str,
        cover_cid: &str,
        now: Timestamp,
    ) -> ContentRecord {
        let cid = cid.trim();
        let sequence = self.order.len() as u64;
        let id = ContentId::derive(uploader, cid, round_id, sequence);
        let record = ContentRecord {
            id: id.clone(),
            uploader: uploader.clone(),
            cid: cid.to_string(),
            title: title.trim().to_string(),
            cover_cid: cover_cid.trim().to_string(),
            round_id,
            like_count: 0,
            created_at: now,
            sequence,
        };

        self.contents.insert(id.clone(), record.clone());
        self.order.push(id.clone());
        self.by_round.entry(round_id).or_default().push(id.clone());
        self.by_uploader.entry(uploader.clone()).or_default().push(id);
        self.participants.entry(round_id).or_default().insert(uploader);
        record
    }

    /// Validate a like against the round it must belong to.
    pub fn check_like(
        &self,
        content_id: &ContentId,
        liker: &AccountId,
        current_round: RoundId,
    ) -> Result<&ContentRecord, EngineError> {
        let content = self
            .contents
            .get(content_id)
            .ok_or_else(|| EngineError::NotFound(format!("content {content_id}")))?;
        if content.round_id != current_round {
            return Err(EngineError::precondition(format!(
                "content {content_id} belongs to round {}, not the current round",
                content.round_id
            )));
        }
        if &content.uploader == liker {
            return Err(EngineError::denied("cannot like own content"));
        }
        if self.has_liked(content_id, liker) {
            return Err(EngineError::precondition("already liked"));
        }
        let participants = self.participants.get(&current_round);
        let known = participants.is_some_and(|p| p.contains(liker));
        let count = participants.map(Participants::len).unwrap_or(0);
        if !known && count >= self.max_participants_per_round {
            return Err(EngineError::precondition(format!(
                "round {current_round} reached its participant limit of {}",
                self.max_participants_per_round
            )));
        }
        Ok(content)
    }

    /// Record a like and return the new like count. Callers run [`Self::check_like`] first.
    pub fn like(&mut self, content_id: &ContentId, liker: &AccountId) -> Result<u64, EngineError> {
        let content = self
            .contents
            .get_mut(content_id)
            .ok_or_else(|| EngineError::NotFound(format!("content {content_id}")))?;
        content.like_count += 1;
        let like_count = content.like_count;
        let round_id = content.round_id;

        self.likes.insert((content_id.clone(), liker.clone()));
        self.participants.entry(round_id).or_default().insert(liker);
        Ok(like_count)
    }

    pub fn has_liked(&self, content_id: &ContentId, liker: &AccountId) -> bool {
        self.likes.contains(&(content_id.clone(), liker.clone()))
    }

    pub fn get(&self, content_id: &ContentId) -> Option<&ContentRecord> {
        self.contents.get(content_id)
    }

    pub fn content_count(&self) -> usize {
        self.order.len()
    }

    pub fn round_content_count(&self, round_id: RoundId) -> usize {
        self.by_round.get(&round_id).map(Vec::len).unwrap_or(0)
    }

    pub fn round_contents(&self, round_id: RoundId) -> Vec<ContentRecord> {
        self.collect(self.by_round.get(&round_id))
    }

    pub fn uploader_contents(&self, uploader: &AccountId) -> Vec<ContentRecord> {
        self.collect(self.by_uploader.get(uploader))
    }

    pub fn round_participants(&self, round_id: RoundId) -> Vec<AccountId> {
        self.participants
            .get(&round_id)
            .map(|p| p.ordered.clone())
            .unwrap_or_default()
    }

    pub fn participant_count(&self, round_id: RoundId) -> usize {
        self.participants.get(&round_id).map(Participants::len).unwrap_or(0)
    }

    /// All matching content in registration order.
    pub fn list(&self, filter: &ContentFilter) -> Vec<ContentRecord> {
        match (filter.round_id, &filter.uploader) {
            (Some(round_id), Some(uploader)) => self
                .round_contents(round_id)
                .into_iter()
                .filter(|c| &c.uploader == uploader)
                .collect(),
            (Some(round_id), None) => self.round_contents(round_id),
            (None, Some(uploader)) => self.uploader_contents(uploader),
            (None, None) => self.collect(Some(&self.order)),
        }
    }

    fn collect(&self, ids: Option<&Vec<ContentId>>) -> Vec<ContentRecord> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.contents.get(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn id(raw: &str) -> AccountId {
        AccountId::new(raw)
    }

    #[test]
    fn registration_indexes_round_and_uploader() {
        let mut registry = ContentRegistry::new(500, 2_000);
        registry.check_register(1, "QmA", "first").unwrap();
        let first = registry.register(1, &id("alice"), "QmA", "first", "QmCover", 100);
        let second = registry.register(1, &id("alice"), "QmA", "again", "", 101);
        registry.register(2, &id("bob"), "QmB", "later", "", 200);

        assert_ne!(first.id, second.id);
        assert_eq!(registry.content_count(), 3);
        assert_eq!(registry.round_contents(1).len(), 2);
        assert_eq!(registry.uploader_contents(&id("alice")).len(), 2);
        assert_eq!(registry.participant_count(1), 1);
        assert_eq!(
            registry.list(&ContentFilter {
                round_id: Some(2),
                uploader: Some(id("alice")),
            }),
            Vec::new()
        );
        let all: Vec<u64> = registry
            .list(&ContentFilter::default())
            .iter()
            .map(|c| c.sequence)
            .collect();
        assert_eq!(all, vec![0, 1, 2]);
    }

    #[test]
    fn rejects_empty_fields_and_full_rounds() {
        let mut registry = ContentRegistry::new(1, 2_000);
        assert_eq!(
            registry.check_register(1, " ", "title").unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            registry.check_register(1, "QmA", "").unwrap_err().kind(),
            ErrorKind::Validation
        );
        registry.register(1, &id("alice"), "QmA", "t", "", 1);
        assert_eq!(
            registry.check_register(1, "QmB", "t").unwrap_err().kind(),
            ErrorKind::PreconditionFailed
        );
    }

    #[test]
    fn like_rules() {
        let mut registry = ContentRegistry::new(500, 2);
        let content = registry.register(1, &id("alice"), "QmA", "t", "", 1);

        assert_eq!(
            registry.check_like(&content.id, &id("alice"), 1).unwrap_err().kind(),
            ErrorKind::AccessDenied
        );
        registry.check_like(&content.id, &id("bob"), 1).unwrap();
        assert_eq!(registry.like(&content.id, &id("bob")).unwrap(), 1);

        let again = registry.check_like(&content.id, &id("bob"), 1).unwrap_err();
        assert_eq!(again, EngineError::precondition("already liked"));
        assert_eq!(registry.get(&content.id).map(|c| c.like_count), Some(1));

        // alice and bob fill the two participant slots.
        assert_eq!(
            registry.check_like(&content.id, &id("carol"), 1).unwrap_err().kind(),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(
            registry.check_like(&content.id, &id("bob"), 2).unwrap_err().kind(),
            ErrorKind::PreconditionFailed
        );
        assert_eq!(
            registry
                .check_like(&ContentId::from_hex("00"), &id("bob"), 1)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }
}
