use crate::rewards::RewardTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user check-in state. One mutable record per user, owned exclusively
/// by the orchestrator; created lazily on first check-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCheckinState {
    pub user_id: u64,
    /// Instant of the most recent credited check-in. `None` until the first
    /// one; "never checked in" is a valid state, not an error.
    pub last_checkin_at: Option<DateTime<Utc>>,
    /// Consecutive calendar days with a credited check-in, ending at
    /// `last_checkin_at`'s day. Zero only while `total_checkins` is zero.
    pub streak_count: u32,
    /// Count of all credited check-ins; always equals the number of
    /// history records for this user.
    pub total_checkins: u64,
    /// Display metadata passed through from the client.
    #[serde(default)]
    pub profile: ProfileFields,
    pub updated_at: DateTime<Utc>,
}

impl UserCheckinState {
    /// Zeroed state for a user with no credited check-ins.
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            last_checkin_at: None,
            streak_count: 0,
            total_checkins: 0,
            profile: ProfileFields::default(),
            updated_at: Utc::now(),
        }
    }
}

/// Opaque display fields carried alongside the check-in state. Never
/// consulted by streak or reward logic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileFields {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileFields {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.display_name.is_none() && self.avatar_url.is_none()
    }

    /// Overlay non-empty incoming fields; absent fields keep their stored
    /// values.
    pub fn merge_from(&mut self, incoming: &ProfileFields) {
        if let Some(username) = non_empty(&incoming.username) {
            self.username = Some(username);
        }
        if let Some(display_name) = non_empty(&incoming.display_name) {
            self.display_name = Some(display_name);
        }
        if let Some(avatar_url) = non_empty(&incoming.avatar_url) {
            self.avatar_url = Some(avatar_url);
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Append-only record of one credited check-in. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinHistoryRecord {
    pub record_id: Uuid,
    pub user_id: u64,
    pub checked_in_at: DateTime<Utc>,
    /// Streak count after this event was applied.
    pub streak_at_time: u32,
}

impl CheckinHistoryRecord {
    pub fn new(user_id: u64, checked_in_at: DateTime<Utc>, streak_at_time: u32) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            user_id,
            checked_in_at,
            streak_at_time,
        }
    }
}

/// Per-user reward totals. `tier` is derived from `total_points` on every
/// write; the stored copy exists for cheap reads, not as a source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRewardsState {
    pub user_id: u64,
    /// Monotonically non-decreasing cumulative points.
    pub total_points: u64,
    pub tier: RewardTier,
    pub last_reward_at: Option<DateTime<Utc>>,
}

impl UserRewardsState {
    /// Zeroed rewards for a user who has never earned points.
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            total_points: 0,
            tier: RewardTier::Bronze,
            last_reward_at: None,
        }
    }

    /// Re-derive `tier` from `total_points`. Called before every write so a
    /// stored tier can never desync from the point total.
    pub fn sync_tier(&mut self) {
        self.tier = RewardTier::from_points(self.total_points);
    }
}

/// Append-only audit record of one point award.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardHistoryRecord {
    pub record_id: Uuid,
    pub user_id: u64,
    pub points_earned: u64,
    /// Streak count after the event that earned these points.
    pub streak_at_time: u32,
    /// Combined factor (streak bonus x tier multiplier) that was applied.
    pub multiplier_applied: f64,
    pub earned_at: DateTime<Utc>,
}

/// Caller-visible result of one `process_checkin` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckinOutcome {
    pub streak: u32,
    pub already_checked_in: bool,
    /// Present only when this call credited a check-in.
    pub points_earned: Option<u64>,
    /// Tier after this event's points were applied.
    pub tier: Option<RewardTier>,
}

/// Read-only per-user statistics derived from the history streams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsStats {
    pub user_id: u64,
    pub total_checkins: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub average_points_per_day: u64,
    pub total_points_earned: u64,
    /// Bounded heuristic: `min(total_checkins / 365, 1) x 100`, rounded.
    /// An approximation, not a true attendance rate against account age.
    pub check_in_rate: u32,
    pub this_week_checkins: u64,
    pub this_month_checkins: u64,
}

impl AnalyticsStats {
    /// Zeroed statistics; also the degraded result when the read path fails.
    pub fn empty(user_id: u64) -> Self {
        Self {
            user_id,
            total_checkins: 0,
            current_streak: 0,
            longest_streak: 0,
            average_points_per_day: 0,
            total_points_earned: 0,
            check_in_rate: 0,
            this_week_checkins: 0,
            this_month_checkins: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_merge_keeps_stored_values() {
        let mut stored = ProfileFields {
            username: Some("alice".to_string()),
            display_name: Some("Alice".to_string()),
            avatar_url: None,
        };
        stored.merge_from(&ProfileFields {
            username: None,
            display_name: Some("  ".to_string()),
            avatar_url: Some("https://img.example/a.png".to_string()),
        });
        assert_eq!(stored.username.as_deref(), Some("alice"));
        assert_eq!(stored.display_name.as_deref(), Some("Alice"));
        assert_eq!(stored.avatar_url.as_deref(), Some("https://img.example/a.png"));
    }

    #[test]
    fn test_sync_tier_follows_points() {
        let mut rewards = UserRewardsState::new(7);
        rewards.total_points = 520;
        rewards.sync_tier();
        assert_eq!(rewards.tier, RewardTier::Gold);
    }
}
