//! Check-in orchestrator — the transactional unit behind `process_checkin`.
//!
//! Serializes the read-decide-write sequence per user and owns the write
//! ordering that keeps state, rewards, and the history streams in
//! agreement:
//!
//! 1. history append (the commit point; if it fails, nothing happened)
//! 2. check-in state upsert, with `total_checkins` recomputed from the
//!    history count rather than incremented
//! 3. rewards upsert + reward audit append
//!
//! A failure after step 1 is surfaced to the caller; a same-day retry
//! decides `Duplicate` against the history stream, so no second credit can
//! occur and the recomputed count re-converges on the next credited write.

use checkin_core::error::{CheckinError, CheckinResult};
use checkin_core::types::{
    CheckinHistoryRecord, CheckinOutcome, ProfileFields, RewardHistoryRecord, UserCheckinState,
    UserRewardsState,
};
use checkin_rewards::RewardsEngine;
use checkin_storage::CheckinStore;
use checkin_streak::{decide, StreakDecision};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Attempts per call when the store reports a conditional-write conflict.
const MAX_CONFLICT_RETRIES: u32 = 2;

pub struct CheckinProcessor {
    store: Arc<dyn CheckinStore>,
    rewards: RewardsEngine,
    /// Per-user critical sections. Two concurrent same-day calls for one
    /// user must credit exactly once; the loser observes `Duplicate`.
    user_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl CheckinProcessor {
    pub fn new(store: Arc<dyn CheckinStore>, rewards: RewardsEngine) -> Self {
        Self {
            store,
            rewards,
            user_locks: DashMap::new(),
        }
    }

    fn user_lock(&self, user_id: u64) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Process one check-in attempt. At most one credited transition per
    /// user per UTC calendar day; duplicate calls are pure reads.
    pub async fn process_checkin(
        &self,
        user_id: u64,
        now: Option<DateTime<Utc>>,
        profile: Option<ProfileFields>,
    ) -> CheckinResult<CheckinOutcome> {
        if user_id == 0 {
            return Err(CheckinError::InvalidInput(
                "user_id must be positive".to_string(),
            ));
        }
        let now = now.unwrap_or_else(Utc::now);

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut attempt = 0;
        loop {
            match self.process_locked(user_id, now, profile.as_ref()).await {
                Err(CheckinError::Conflict(reason)) if attempt < MAX_CONFLICT_RETRIES => {
                    // A conditional write lost a race. Transient: re-read
                    // and re-decide; if the winner credited today the retry
                    // settles on Duplicate.
                    attempt += 1;
                    metrics::counter!("checkin.conflict_retries").increment(1);
                    warn!(user_id, attempt, reason = %reason, "Write conflict, retrying");
                }
                result => return result,
            }
        }
    }

    async fn process_locked(
        &self,
        user_id: u64,
        now: DateTime<Utc>,
        profile: Option<&ProfileFields>,
    ) -> CheckinResult<CheckinOutcome> {
        // The state record lags the history stream if a previous attempt
        // died between the history append and the state write. The stream
        // is authoritative for "already credited today", so fold its newest
        // entry into the decision.
        let mut view = self
            .store
            .checkin_state(user_id)
            .await?
            .unwrap_or_else(|| UserCheckinState::new(user_id));
        if let Some(latest) = self.store.latest_checkin(user_id).await? {
            let state_is_stale = view
                .last_checkin_at
                .map_or(true, |s| latest.checked_in_at > s);
            if state_is_stale {
                view.last_checkin_at = Some(latest.checked_in_at);
                view.streak_count = latest.streak_at_time;
            }
        }

        match decide(&view, now) {
            StreakDecision::Duplicate => {
                metrics::counter!("checkin.duplicate").increment(1);
                debug!(user_id, streak = view.streak_count, "Already checked in today");

                let rewards = self
                    .store
                    .rewards_state(user_id)
                    .await?
                    .unwrap_or_else(|| UserRewardsState::new(user_id));

                Ok(CheckinOutcome {
                    streak: view.streak_count,
                    already_checked_in: true,
                    points_earned: None,
                    tier: Some(rewards.tier),
                })
            }
            decision => {
                self.credit(view, decision, now, profile).await
            }
        }
    }

    async fn credit(
        &self,
        mut state: UserCheckinState,
        decision: StreakDecision,
        now: DateTime<Utc>,
        profile: Option<&ProfileFields>,
    ) -> CheckinResult<CheckinOutcome> {
        let user_id = state.user_id;
        let new_streak = decision.resulting_streak(&state);

        // Write-ahead: the history append is the commit point.
        let record = CheckinHistoryRecord::new(user_id, now, new_streak);
        self.store.append_checkin_history(&record).await?;

        // The history stream, not an increment, is the source of truth for
        // the running count.
        let total_checkins = self.store.checkin_history_count(user_id).await?;

        state.last_checkin_at = Some(now);
        state.streak_count = new_streak;
        state.total_checkins = total_checkins;
        state.updated_at = now;
        if let Some(incoming) = profile {
            state.profile.merge_from(incoming);
        }
        self.store.put_checkin_state(&state).await?;

        let mut rewards_state = self
            .store
            .rewards_state(user_id)
            .await?
            .unwrap_or_else(|| UserRewardsState::new(user_id));

        // Snapshot of the pre-event total selects the multiplier.
        let computation = self.rewards.compute(new_streak, rewards_state.total_points);

        rewards_state.total_points = computation.new_total_points;
        rewards_state.sync_tier();
        rewards_state.last_reward_at = Some(now);
        self.store.put_rewards_state(&rewards_state).await?;

        self.store
            .append_reward_history(&RewardHistoryRecord {
                record_id: record.record_id,
                user_id,
                points_earned: computation.points_earned,
                streak_at_time: new_streak,
                multiplier_applied: computation.multiplier_applied(),
                earned_at: now,
            })
            .await?;

        metrics::counter!("checkin.credited").increment(1);
        if matches!(decision, StreakDecision::Reset) && total_checkins > 1 {
            metrics::counter!("checkin.streak_resets").increment(1);
        }
        info!(
            user_id,
            streak = new_streak,
            points = computation.points_earned,
            tier = ?computation.tier_after,
            "Check-in credited"
        );

        Ok(CheckinOutcome {
            streak: new_streak,
            already_checked_in: false,
            points_earned: Some(computation.points_earned),
            tier: Some(computation.tier_after),
        })
    }

    /// Current check-in state; zeroed for unknown users.
    pub async fn checkin_state(&self, user_id: u64) -> CheckinResult<UserCheckinState> {
        if user_id == 0 {
            return Err(CheckinError::InvalidInput(
                "user_id must be positive".to_string(),
            ));
        }
        Ok(self
            .store
            .checkin_state(user_id)
            .await?
            .unwrap_or_else(|| UserCheckinState::new(user_id)))
    }

    /// Current reward totals; zeroed bronze state for unknown users. The
    /// tier is re-derived from points on the way out so a desynced stored
    /// copy can never surface.
    pub async fn rewards_state(&self, user_id: u64) -> CheckinResult<UserRewardsState> {
        if user_id == 0 {
            return Err(CheckinError::InvalidInput(
                "user_id must be positive".to_string(),
            ));
        }
        let mut rewards = self
            .store
            .rewards_state(user_id)
            .await?
            .unwrap_or_else(|| UserRewardsState::new(user_id));
        rewards.sync_tier();
        Ok(rewards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use checkin_core::config::RewardsConfig;
    use checkin_core::rewards::RewardTier;
    use checkin_storage::MemoryStore;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn at(d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, h, mi, 0).unwrap()
    }

    fn processor() -> (Arc<MemoryStore>, CheckinProcessor) {
        let store = Arc::new(MemoryStore::new());
        let rewards = RewardsEngine::new(&RewardsConfig::default());
        (store.clone(), CheckinProcessor::new(store, rewards))
    }

    #[tokio::test]
    async fn test_rejects_zero_user_id_before_storage() {
        let (_, processor) = processor();
        let err = processor.process_checkin(0, None, None).await.unwrap_err();
        assert!(matches!(err, CheckinError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_first_checkin_credits_base_points() {
        let (store, processor) = processor();
        let outcome = processor
            .process_checkin(1, Some(at(1, 9, 0)), None)
            .await
            .unwrap();

        assert_eq!(outcome.streak, 1);
        assert!(!outcome.already_checked_in);
        assert_eq!(outcome.points_earned, Some(10));
        assert_eq!(outcome.tier, Some(RewardTier::Bronze));

        let state = store.checkin_state(1).await.unwrap().unwrap();
        assert_eq!(state.streak_count, 1);
        assert_eq!(state.total_checkins, 1);
        assert_eq!(store.checkin_history_count(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_same_day_call_is_idempotent() {
        let (store, processor) = processor();
        processor
            .process_checkin(1, Some(at(1, 9, 0)), None)
            .await
            .unwrap();
        let second = processor
            .process_checkin(1, Some(at(1, 22, 15)), None)
            .await
            .unwrap();

        assert!(second.already_checked_in);
        assert_eq!(second.streak, 1);
        assert_eq!(second.points_earned, None);
        assert_eq!(second.tier, Some(RewardTier::Bronze));

        // Exactly one history record and no extra points.
        assert_eq!(store.checkin_history_count(1).await.unwrap(), 1);
        assert_eq!(store.rewards_state(1).await.unwrap().unwrap().total_points, 10);
    }

    #[tokio::test]
    async fn test_next_day_continues_and_gap_resets() {
        let (_, processor) = processor();
        processor
            .process_checkin(1, Some(at(1, 9, 0)), None)
            .await
            .unwrap();
        let day2 = processor
            .process_checkin(1, Some(at(2, 9, 0)), None)
            .await
            .unwrap();
        assert_eq!(day2.streak, 2);

        // Day 3 skipped; day 4 resets to 1, not 3.
        let day4 = processor
            .process_checkin(1, Some(at(4, 9, 0)), None)
            .await
            .unwrap();
        assert_eq!(day4.streak, 1);
    }

    #[tokio::test]
    async fn test_midnight_boundary_continues_streak() {
        let (_, processor) = processor();
        processor
            .process_checkin(1, Some(at(1, 23, 59)), None)
            .await
            .unwrap();
        let outcome = processor
            .process_checkin(1, Some(at(2, 0, 1)), None)
            .await
            .unwrap();
        assert_eq!(outcome.streak, 2);
        assert!(!outcome.already_checked_in);
    }

    #[tokio::test]
    async fn test_week_long_scenario_matches_reference_numbers() {
        // Day 1: 10 points. Days 2-6: 10 each. Day 7: streak bonus 1.2,
        // still bronze -> 12. Gap, then day 10 resets to streak 1.
        let (store, processor) = processor();

        for day in 1..=6 {
            let outcome = processor
                .process_checkin(1, Some(at(day, 9, 0)), None)
                .await
                .unwrap();
            assert_eq!(outcome.streak, day);
            assert_eq!(outcome.points_earned, Some(10));
        }

        let day7 = processor
            .process_checkin(1, Some(at(7, 9, 0)), None)
            .await
            .unwrap();
        assert_eq!(day7.streak, 7);
        assert_eq!(day7.points_earned, Some(12));

        let day10 = processor
            .process_checkin(1, Some(at(10, 9, 0)), None)
            .await
            .unwrap();
        assert_eq!(day10.streak, 1);

        let rewards = store.rewards_state(1).await.unwrap().unwrap();
        assert_eq!(rewards.total_points, 6 * 10 + 12 + 10);
        let state = store.checkin_state(1).await.unwrap().unwrap();
        assert_eq!(state.total_checkins, 8);
        assert_eq!(store.checkin_history_count(1).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_points_monotonic_across_any_sequence() {
        let (store, processor) = processor();
        let mut previous = 0;
        for day in [1u32, 2, 3, 5, 6, 9, 10, 11] {
            processor
                .process_checkin(1, Some(at(day, 12, 0)), None)
                .await
                .unwrap();
            let total = store.rewards_state(1).await.unwrap().unwrap().total_points;
            assert!(total > previous);
            previous = total;
        }
    }

    #[tokio::test]
    async fn test_concurrent_same_day_credits_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let rewards = RewardsEngine::new(&RewardsConfig::default());
        let processor = Arc::new(CheckinProcessor::new(store.clone(), rewards));

        let now = at(1, 9, 0);
        let a = {
            let p = processor.clone();
            tokio::spawn(async move { p.process_checkin(1, Some(now), None).await })
        };
        let b = {
            let p = processor.clone();
            tokio::spawn(async move { p.process_checkin(1, Some(now), None).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_ne!(a.already_checked_in, b.already_checked_in);
        assert_eq!(store.checkin_history_count(1).await.unwrap(), 1);
        assert_eq!(store.rewards_state(1).await.unwrap().unwrap().total_points, 10);
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let (store, processor) = processor();
        processor
            .process_checkin(1, Some(at(1, 9, 0)), None)
            .await
            .unwrap();
        processor
            .process_checkin(2, Some(at(1, 9, 0)), None)
            .await
            .unwrap();

        assert_eq!(store.checkin_history_count(1).await.unwrap(), 1);
        assert_eq!(store.checkin_history_count(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_profile_fields_pass_through_without_affecting_logic() {
        let (store, processor) = processor();
        let profile = ProfileFields {
            username: Some("alice".to_string()),
            display_name: None,
            avatar_url: None,
        };
        let with_profile = processor
            .process_checkin(1, Some(at(1, 9, 0)), Some(profile))
            .await
            .unwrap();
        assert_eq!(with_profile.points_earned, Some(10));

        let state = store.checkin_state(1).await.unwrap().unwrap();
        assert_eq!(state.profile.username.as_deref(), Some("alice"));

        // A later call without profile data keeps the stored fields.
        processor
            .process_checkin(1, Some(at(2, 9, 0)), None)
            .await
            .unwrap();
        let state = store.checkin_state(1).await.unwrap().unwrap();
        assert_eq!(state.profile.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_unknown_user_reads_default_to_zeroed_state() {
        let (_, processor) = processor();
        let state = processor.checkin_state(99).await.unwrap();
        assert_eq!(state.streak_count, 0);
        assert_eq!(state.total_checkins, 0);
        assert!(state.last_checkin_at.is_none());

        let rewards = processor.rewards_state(99).await.unwrap();
        assert_eq!(rewards.total_points, 0);
        assert_eq!(rewards.tier, RewardTier::Bronze);
        assert!(rewards.last_reward_at.is_none());
    }

    /// Store wrapper that fails the first `put_checkin_state` after the
    /// history append succeeded, simulating a crash between the two writes.
    struct FailStateWriteOnce {
        inner: MemoryStore,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl CheckinStore for FailStateWriteOnce {
        async fn checkin_state(&self, user_id: u64) -> CheckinResult<Option<UserCheckinState>> {
            self.inner.checkin_state(user_id).await
        }

        async fn put_checkin_state(&self, state: &UserCheckinState) -> CheckinResult<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(CheckinError::Storage("connection reset".to_string()));
            }
            self.inner.put_checkin_state(state).await
        }

        async fn append_checkin_history(
            &self,
            record: &CheckinHistoryRecord,
        ) -> CheckinResult<()> {
            self.inner.append_checkin_history(record).await
        }

        async fn checkin_history_count(&self, user_id: u64) -> CheckinResult<u64> {
            self.inner.checkin_history_count(user_id).await
        }

        async fn latest_checkin(
            &self,
            user_id: u64,
        ) -> CheckinResult<Option<CheckinHistoryRecord>> {
            self.inner.latest_checkin(user_id).await
        }

        async fn checkin_history_since(
            &self,
            user_id: u64,
            since: DateTime<Utc>,
        ) -> CheckinResult<Vec<CheckinHistoryRecord>> {
            self.inner.checkin_history_since(user_id, since).await
        }

        async fn checkin_history(
            &self,
            user_id: u64,
        ) -> CheckinResult<Vec<CheckinHistoryRecord>> {
            self.inner.checkin_history(user_id).await
        }

        async fn rewards_state(&self, user_id: u64) -> CheckinResult<Option<UserRewardsState>> {
            self.inner.rewards_state(user_id).await
        }

        async fn put_rewards_state(&self, state: &UserRewardsState) -> CheckinResult<()> {
            self.inner.put_rewards_state(state).await
        }

        async fn append_reward_history(
            &self,
            record: &RewardHistoryRecord,
        ) -> CheckinResult<()> {
            self.inner.append_reward_history(record).await
        }

        async fn reward_history(
            &self,
            user_id: u64,
            limit: usize,
        ) -> CheckinResult<Vec<RewardHistoryRecord>> {
            self.inner.reward_history(user_id, limit).await
        }
    }

    #[tokio::test]
    async fn test_state_write_failure_surfaces_and_retry_is_safe() {
        let store = Arc::new(FailStateWriteOnce {
            inner: MemoryStore::new(),
            fail_next: AtomicBool::new(true),
        });
        let rewards = RewardsEngine::new(&RewardsConfig::default());
        let processor = CheckinProcessor::new(store.clone(), rewards);

        // History lands, then the state write dies: the error surfaces.
        let err = processor
            .process_checkin(1, Some(at(1, 9, 0)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckinError::Storage(_)));
        assert_eq!(store.checkin_history_count(1).await.unwrap(), 1);

        // Same-day retry must observe the history record and not credit a
        // second time.
        let retry = processor
            .process_checkin(1, Some(at(1, 18, 0)), None)
            .await
            .unwrap();
        assert!(retry.already_checked_in);
        assert_eq!(retry.streak, 1);
        assert_eq!(store.checkin_history_count(1).await.unwrap(), 1);

        // Next day the streak continues from the history record and the
        // recomputed count heals the state record.
        let day2 = processor
            .process_checkin(1, Some(at(2, 9, 0)), None)
            .await
            .unwrap();
        assert_eq!(day2.streak, 2);
        let state = store.checkin_state(1).await.unwrap().unwrap();
        assert_eq!(state.total_checkins, 2);
        assert_eq!(store.checkin_history_count(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_default_now_is_current_instant() {
        let (store, processor) = processor();
        let before = Utc::now() - Duration::seconds(1);
        processor.process_checkin(1, None, None).await.unwrap();
        let state = store.checkin_state(1).await.unwrap().unwrap();
        let last = state.last_checkin_at.unwrap();
        assert!(last >= before && last <= Utc::now() + Duration::seconds(1));
    }
}
