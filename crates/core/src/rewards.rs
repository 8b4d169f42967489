//! Reward tier domain — point-derived tiers and the multiplier tables.
//!
//! The tier is a pure function of cumulative points; it is never stored as
//! an independent source of truth. Two multiplicative factors price a
//! credited check-in: the tier multiplier (from the pre-event point total)
//! and the streak bonus (from the streak length after the event).

use serde::{Deserialize, Serialize};

// ─── Tier System ────────────────────────────────────────────────────────────

/// Discrete reward brackets with escalating point multipliers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RewardTier {
    /// Entry bracket. 1x multiplier.
    Bronze,
    /// 150 cumulative points. 1.5x multiplier.
    Silver,
    /// 500 cumulative points. 2x multiplier.
    Gold,
    /// 1000 cumulative points. 3x multiplier.
    Platinum,
}

impl RewardTier {
    /// Tier for a cumulative point total. Breakpoints are evaluated
    /// highest-first; a total sitting exactly on a breakpoint belongs to
    /// the higher tier.
    pub fn from_points(points: u64) -> Self {
        if points >= RewardTier::Platinum.threshold() {
            RewardTier::Platinum
        } else if points >= RewardTier::Gold.threshold() {
            RewardTier::Gold
        } else if points >= RewardTier::Silver.threshold() {
            RewardTier::Silver
        } else {
            RewardTier::Bronze
        }
    }

    /// Cumulative points required to enter this tier.
    pub fn threshold(&self) -> u64 {
        match self {
            RewardTier::Bronze => 0,
            RewardTier::Silver => 150,
            RewardTier::Gold => 500,
            RewardTier::Platinum => 1000,
        }
    }

    /// Points multiplier for this tier.
    pub fn multiplier(&self) -> f64 {
        match self {
            RewardTier::Bronze => 1.0,
            RewardTier::Silver => 1.5,
            RewardTier::Gold => 2.0,
            RewardTier::Platinum => 3.0,
        }
    }

    /// Wire/storage label.
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardTier::Bronze => "bronze",
            RewardTier::Silver => "silver",
            RewardTier::Gold => "gold",
            RewardTier::Platinum => "platinum",
        }
    }
}

impl Default for RewardTier {
    fn default() -> Self {
        RewardTier::Bronze
    }
}

// ─── Streak Bonus ───────────────────────────────────────────────────────────

/// Secondary multiplier earned by streak length. Composes multiplicatively
/// with the tier multiplier, never additively.
pub fn streak_bonus(streak: u32) -> f64 {
    if streak >= 30 {
        1.5
    } else if streak >= 15 {
        1.3
    } else if streak >= 7 {
        1.2
    } else {
        1.0
    }
}
