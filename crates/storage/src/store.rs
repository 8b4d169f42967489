//! Storage contract for the check-in engine.
//!
//! The orchestrator and the analytics aggregator receive this trait as an
//! injected handle; there is no process-wide client singleton. State
//! records are whole-record upserts. History streams are append-only and
//! are the source of truth for per-user event counts.

use async_trait::async_trait;
use checkin_core::error::CheckinResult;
use checkin_core::types::{
    CheckinHistoryRecord, RewardHistoryRecord, UserCheckinState, UserRewardsState,
};
use chrono::{DateTime, Utc};

#[async_trait]
pub trait CheckinStore: Send + Sync {
    async fn checkin_state(&self, user_id: u64) -> CheckinResult<Option<UserCheckinState>>;

    async fn put_checkin_state(&self, state: &UserCheckinState) -> CheckinResult<()>;

    /// Append one immutable check-in record.
    async fn append_checkin_history(&self, record: &CheckinHistoryRecord) -> CheckinResult<()>;

    /// Authoritative count of credited check-ins for a user.
    async fn checkin_history_count(&self, user_id: u64) -> CheckinResult<u64>;

    /// Most recently appended check-in record, if any.
    async fn latest_checkin(&self, user_id: u64) -> CheckinResult<Option<CheckinHistoryRecord>>;

    /// Records with `checked_in_at >= since`, newest first.
    async fn checkin_history_since(
        &self,
        user_id: u64,
        since: DateTime<Utc>,
    ) -> CheckinResult<Vec<CheckinHistoryRecord>>;

    /// Full per-user history, newest first.
    async fn checkin_history(&self, user_id: u64) -> CheckinResult<Vec<CheckinHistoryRecord>>;

    async fn rewards_state(&self, user_id: u64) -> CheckinResult<Option<UserRewardsState>>;

    async fn put_rewards_state(&self, state: &UserRewardsState) -> CheckinResult<()>;

    /// Append one immutable reward audit record.
    async fn append_reward_history(&self, record: &RewardHistoryRecord) -> CheckinResult<()>;

    /// Most recent reward records, newest first, at most `limit`.
    async fn reward_history(
        &self,
        user_id: u64,
        limit: usize,
    ) -> CheckinResult<Vec<RewardHistoryRecord>>;
}
