//! Round ranking.

use crate::registry::ContentRecord;
use crate::types::{AccountId, ContentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;

pub const WINNER_SLOTS: usize = 3;

/// An uploader's standing in a round, represented by their best content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedWinner {
    pub rank: u8,
    pub account: AccountId,
    pub score: u64,
    pub content_id: ContentId,
    pub content_created_at: Timestamp,
}

pub type Podium = [Option<RankedWinner>; WINNER_SLOTS];

/// Rank a round's content into at most three distinct uploaders.
///
/// Each uploader scores their best single item. Higher scores rank first; ties go to
/// the earlier registration (timestamp, then registry sequence). Uploaders whose best
/// score is zero never place, and unfilled slots stay `None`.
pub fn rank(contents: &[ContentRecord]) -> Podium {
    let mut best: HashMap<&AccountId, &ContentRecord> = HashMap::new();
    for content in contents {
        best.entry(&content.uploader)
            .and_modify(|current| {
                if outranks(content, *current) {
                    *current = content;
                }
            })
            .or_insert(content);
    }

    let mut standings: Vec<&ContentRecord> = best
        .into_values()
        .filter(|content| content.like_count > 0)
        .collect();
    standings.sort_by_key(|content| Reverse(standing_key(content)));

    let mut slots: [Option<&ContentRecord>; WINNER_SLOTS] = [None; WINNER_SLOTS];
    for (slot, content) in slots.iter_mut().zip(standings) {
        *slot = Some(content);
    }
    let mut rank = 0u8;
    slots.map(|slot| {
        slot.map(|content| {
            rank += 1;
            RankedWinner {
                rank,
                account: content.uploader.clone(),
                score: content.like_count,
                content_id: content.id.clone(),
                content_created_at: content.created_at,
            }
        })
    })
}

fn outranks(candidate: &ContentRecord, current: &ContentRecord) -> bool {
    standing_key(candidate) > standing_key(current)
}

fn standing_key(content: &ContentRecord) -> (u64, Reverse<Timestamp>, Reverse<u64>) {
    (
        content.like_count,
        Reverse(content.created_at),
        Reverse(content.sequence),
    )
}
