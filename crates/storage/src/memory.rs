//! In-process store backed by DashMap. Used by tests and single-node runs
//! without a Redis deployment.

use crate::store::CheckinStore;
use async_trait::async_trait;
use checkin_core::error::CheckinResult;
use checkin_core::types::{
    CheckinHistoryRecord, RewardHistoryRecord, UserCheckinState, UserRewardsState,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Lock-free in-memory store. History vectors are append-only; per-user
/// appends arrive pre-serialized by the orchestrator's critical section, so
/// entries are already in `checked_in_at` order.
#[derive(Default)]
pub struct MemoryStore {
    checkin_states: DashMap<u64, UserCheckinState>,
    rewards_states: DashMap<u64, UserRewardsState>,
    checkin_log: DashMap<u64, Vec<CheckinHistoryRecord>>,
    reward_log: DashMap<u64, Vec<RewardHistoryRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckinStore for MemoryStore {
    async fn checkin_state(&self, user_id: u64) -> CheckinResult<Option<UserCheckinState>> {
        Ok(self.checkin_states.get(&user_id).map(|e| e.clone()))
    }

    async fn put_checkin_state(&self, state: &UserCheckinState) -> CheckinResult<()> {
        self.checkin_states.insert(state.user_id, state.clone());
        Ok(())
    }

    async fn append_checkin_history(&self, record: &CheckinHistoryRecord) -> CheckinResult<()> {
        self.checkin_log
            .entry(record.user_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn checkin_history_count(&self, user_id: u64) -> CheckinResult<u64> {
        Ok(self
            .checkin_log
            .get(&user_id)
            .map(|log| log.len() as u64)
            .unwrap_or(0))
    }

    async fn latest_checkin(&self, user_id: u64) -> CheckinResult<Option<CheckinHistoryRecord>> {
        Ok(self
            .checkin_log
            .get(&user_id)
            .and_then(|log| log.last().cloned()))
    }

    async fn checkin_history_since(
        &self,
        user_id: u64,
        since: DateTime<Utc>,
    ) -> CheckinResult<Vec<CheckinHistoryRecord>> {
        let mut records: Vec<CheckinHistoryRecord> = self
            .checkin_log
            .get(&user_id)
            .map(|log| {
                log.iter()
                    .filter(|r| r.checked_in_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.reverse();
        Ok(records)
    }

    async fn checkin_history(&self, user_id: u64) -> CheckinResult<Vec<CheckinHistoryRecord>> {
        let mut records: Vec<CheckinHistoryRecord> = self
            .checkin_log
            .get(&user_id)
            .map(|log| log.clone())
            .unwrap_or_default();
        records.reverse();
        Ok(records)
    }

    async fn rewards_state(&self, user_id: u64) -> CheckinResult<Option<UserRewardsState>> {
        Ok(self.rewards_states.get(&user_id).map(|e| e.clone()))
    }

    async fn put_rewards_state(&self, state: &UserRewardsState) -> CheckinResult<()> {
        self.rewards_states.insert(state.user_id, state.clone());
        Ok(())
    }

    async fn append_reward_history(&self, record: &RewardHistoryRecord) -> CheckinResult<()> {
        self.reward_log
            .entry(record.user_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn reward_history(
        &self,
        user_id: u64,
        limit: usize,
    ) -> CheckinResult<Vec<RewardHistoryRecord>> {
        Ok(self
            .reward_log
            .get(&user_id)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
