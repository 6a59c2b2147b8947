//! Holding tier and holding bonus curves.
//!
//! Both curves are pure functions of a holder snapshot and an explicit `now`, so
//! settlement results can be recomputed and tested without a running clock.

use crate::config::HoldingWindows;
use crate::types::{Timestamp, DAY};

pub const DIAMOND_RATIO_PCT: u64 = 100;
pub const SELLER_RATIO_PCT: u64 = 80;
pub const LONG_HOLDER_RATIO_PCT: u64 = 80;
/// Ratio of a holder who has never sold and received tokens just now.
pub const NEW_HOLDER_FLOOR_PCT: u64 = 50;

/// The holding state a tier decision depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HolderSnapshot {
    pub holding_since: Option<Timestamp>,
    pub has_sold: bool,
    pub cooldown_until: Timestamp,
}

impl HolderSnapshot {
    pub fn in_cooldown(&self, now: Timestamp) -> bool {
        now < self.cooldown_until
    }

    pub fn held_for(&self, now: Timestamp) -> u64 {
        self.holding_since
            .map(|since| now.saturating_sub(since))
            .unwrap_or(0)
    }

    pub fn is_long_holder(&self, now: Timestamp, windows: &HoldingWindows) -> bool {
        self.holding_since.is_some() && self.held_for(now) >= windows.long_hold_secs
    }

    pub fn is_diamond(&self, now: Timestamp, windows: &HoldingWindows) -> bool {
        !self.has_sold && self.holding_since.is_some() && self.held_for(now) >= windows.diamond_secs
    }
}

/// Tier ratio for a holder that has never sold, as a function of holding time.
///
/// Ramps linearly from [`NEW_HOLDER_FLOOR_PCT`] at zero to [`LONG_HOLDER_RATIO_PCT`]
/// at the long-hold window, stays flat until the diamond window, then jumps to
/// [`DIAMOND_RATIO_PCT`]. Monotonic non-decreasing in `held_secs`.
pub fn never_sold_ratio_pct(held_secs: u64, windows: &HoldingWindows) -> u64 {
    if held_secs >= windows.diamond_secs {
        return DIAMOND_RATIO_PCT;
    }
    if windows.long_hold_secs == 0 || held_secs >= windows.long_hold_secs {
        return LONG_HOLDER_RATIO_PCT;
    }
    let span = LONG_HOLDER_RATIO_PCT - NEW_HOLDER_FLOOR_PCT;
    NEW_HOLDER_FLOOR_PCT + span * held_secs / windows.long_hold_secs
}

/// Reward multiplier in percent: 0 during cooldown, 80 for sellers, otherwise
/// [`never_sold_ratio_pct`].
pub fn tier_ratio_pct(holder: &HolderSnapshot, now: Timestamp, windows: &HoldingWindows) -> u64 {
    if holder.in_cooldown(now) {
        return 0;
    }
    if holder.has_sold {
        return SELLER_RATIO_PCT;
    }
    never_sold_ratio_pct(holder.held_for(now), windows)
}

/// Most recent daily reset boundary at or before `now`.
pub fn last_reset_boundary(now: Timestamp, offset_secs: u64) -> Timestamp {
    let today = now - now % DAY + offset_secs;
    if now >= today {
        today
    } else {
        today.saturating_sub(DAY)
    }
}

/// Time-based bonus in percent.
///
/// Holding is measured from the later of `holding_since` and the last daily reset.
/// Below the minimum window the bonus is 0; past it the initial bonus applies plus
/// one step per full step window elapsed, capped.
pub fn holding_bonus_pct(holder: &HolderSnapshot, now: Timestamp, windows: &HoldingWindows) -> u64 {
    if holder.in_cooldown(now) {
        return 0;
    }
    let Some(since) = holder.holding_since else {
        return 0;
    };
    let start = since.max(last_reset_boundary(now, windows.bonus_reset_offset_secs));
    let held = now.saturating_sub(start);
    if held < windows.bonus_min_secs {
        return 0;
    }
    let steps = if windows.bonus_step_secs == 0 {
        0
    } else {
        held / windows.bonus_step_secs
    };
    windows
        .bonus_initial_pct
        .saturating_add(windows.bonus_step_pct.saturating_mul(steps))
        .min(windows.bonus_cap_pct)
}
