//! Rewards engine: prices a credited check-in from the streak length and
//! the user's pre-event point total.

use checkin_core::config::RewardsConfig;
use checkin_core::rewards::{streak_bonus, RewardTier};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Result of pricing a single credited check-in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RewardComputation {
    pub points_earned: u64,
    /// Streak bonus factor that was applied.
    pub streak_bonus: f64,
    /// Tier multiplier that was applied.
    pub tier_multiplier: f64,
    /// Tier derived from the pre-event point total. Selects the multiplier;
    /// not what callers are shown.
    pub tier_before: RewardTier,
    /// Tier derived from the post-event point total. Reported to callers.
    pub tier_after: RewardTier,
    pub new_total_points: u64,
}

impl RewardComputation {
    /// Combined factor recorded in the reward audit trail.
    pub fn multiplier_applied(&self) -> f64 {
        self.streak_bonus * self.tier_multiplier
    }
}

/// Stateless reward computation over per-user totals.
pub struct RewardsEngine {
    config: RewardsConfig,
}

impl RewardsEngine {
    pub fn new(config: &RewardsConfig) -> Self {
        info!(base_points = config.base_points, "Rewards engine initialized");
        Self {
            config: config.clone(),
        }
    }

    /// Price one credited check-in.
    ///
    /// `current_total_points` is the user's total *before* this event. The
    /// tier multiplier comes from that snapshot, so an event that crosses a
    /// tier boundary is still priced at the tier it started in; only the
    /// reported tier reflects the new total.
    pub fn compute(&self, streak: u32, current_total_points: u64) -> RewardComputation {
        let tier_before = RewardTier::from_points(current_total_points);
        let bonus = streak_bonus(streak);
        let multiplier = tier_before.multiplier();

        let points_earned = (self.config.base_points as f64 * bonus * multiplier).floor() as u64;
        let new_total_points = current_total_points + points_earned;
        let tier_after = RewardTier::from_points(new_total_points);

        metrics::counter!("rewards.points_earned").increment(points_earned);
        if tier_after > tier_before {
            metrics::counter!("rewards.tier_upgrades").increment(1);
            info!(
                old = ?tier_before,
                new = ?tier_after,
                total_points = new_total_points,
                "Tier upgrade"
            );
        }

        debug!(
            streak = streak,
            bonus = bonus,
            multiplier = multiplier,
            points_earned = points_earned,
            total_points = new_total_points,
            "Reward computed"
        );

        RewardComputation {
            points_earned,
            streak_bonus: bonus,
            tier_multiplier: multiplier,
            tier_before,
            tier_after,
            new_total_points,
        }
    }

    pub fn config(&self) -> &RewardsConfig {
        &self.config
    }
}
