//! Read-only statistics over the check-in and reward streams.
//!
//! Never on the critical path of a check-in: any storage failure degrades
//! to zeroed statistics instead of propagating. Windows use the same UTC
//! day arithmetic as the streak machine.

use checkin_core::clock;
use checkin_core::error::CheckinResult;
use checkin_core::types::{AnalyticsStats, CheckinHistoryRecord, UserCheckinState, UserRewardsState};
use checkin_storage::CheckinStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::warn;

pub struct StatsAggregator {
    store: Arc<dyn CheckinStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn CheckinStore>) -> Self {
        Self { store }
    }

    /// Per-user statistics. Degrades to `AnalyticsStats::empty` on any
    /// storage failure.
    pub async fn analytics(&self, user_id: u64) -> AnalyticsStats {
        match self.compute(user_id, Utc::now()).await {
            Ok(stats) => stats,
            Err(e) => {
                metrics::counter!("analytics.degraded").increment(1);
                warn!(user_id, error = %e, "Analytics read failed, returning defaults");
                AnalyticsStats::empty(user_id)
            }
        }
    }

    /// Check-in records within a trailing window of whole days, newest
    /// first. Degrades to an empty list on storage failure.
    pub async fn history(&self, user_id: u64, days: u32) -> Vec<CheckinHistoryRecord> {
        let since = Utc::now() - Duration::days(i64::from(days));
        match self.store.checkin_history_since(user_id, since).await {
            Ok(records) => records,
            Err(e) => {
                metrics::counter!("analytics.degraded").increment(1);
                warn!(user_id, error = %e, "History read failed, returning empty window");
                Vec::new()
            }
        }
    }

    async fn compute(&self, user_id: u64, now: DateTime<Utc>) -> CheckinResult<AnalyticsStats> {
        let state = self
            .store
            .checkin_state(user_id)
            .await?
            .unwrap_or_else(|| UserCheckinState::new(user_id));
        let rewards = self
            .store
            .rewards_state(user_id)
            .await?
            .unwrap_or_else(|| UserRewardsState::new(user_id));

        let this_week_checkins = self
            .store
            .checkin_history_since(user_id, now - Duration::days(7))
            .await?
            .len() as u64;
        let this_month_checkins = self
            .store
            .checkin_history_since(user_id, now - Duration::days(30))
            .await?
            .len() as u64;

        let full_history = self.store.checkin_history(user_id).await?;
        let longest_streak = longest_streak(&full_history);

        let total_checkins = state.total_checkins;
        let average_points_per_day = if total_checkins > 0 {
            rewards.total_points / total_checkins
        } else {
            0
        };

        // Approximation against a fixed 365-day horizon, not the account
        // age; documented as a heuristic, capped at 100.
        let check_in_rate = ((total_checkins as f64 / 365.0) * 100.0).min(100.0).round() as u32;

        Ok(AnalyticsStats {
            user_id,
            total_checkins,
            current_streak: state.streak_count,
            longest_streak,
            average_points_per_day,
            total_points_earned: rewards.total_points,
            check_in_rate,
            this_week_checkins,
            this_month_checkins,
        })
    }
}

/// Longest run of consecutive credited calendar days across the history.
fn longest_streak(history: &[CheckinHistoryRecord]) -> u32 {
    let mut keys: Vec<i64> = history
        .iter()
        .map(|r| clock::day_key(r.checked_in_at))
        .collect();
    keys.sort_unstable();
    keys.dedup();

    let mut longest = 0u32;
    let mut run = 0u32;
    let mut prev: Option<i64> = None;
    for key in keys {
        run = if prev == Some(key - 1) { run + 1 } else { 1 };
        longest = longest.max(run);
        prev = Some(key);
    }
    longest
}
