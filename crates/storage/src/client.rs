//! Redis-backed store. State records are JSON values under typed key
//! prefixes; history streams are Redis lists appended at the tail, which
//! preserves the per-user `checked_in_at` ordering established by the
//! orchestrator's critical section.

use crate::store::CheckinStore;
use async_trait::async_trait;
use checkin_core::config::RedisConfig;
use checkin_core::error::{CheckinError, CheckinResult};
use checkin_core::types::{
    CheckinHistoryRecord, RewardHistoryRecord, UserCheckinState, UserRewardsState,
};
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::info;

pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Connect to Redis and verify connectivity with a PING.
    pub async fn connect(config: &RedisConfig) -> anyhow::Result<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Connecting to Redis");

        let client = redis::Client::open(url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis connection established");

        Ok(Self { client })
    }

    async fn conn(&self) -> CheckinResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CheckinError::Storage(e.to_string()))
    }

    fn state_key(user_id: u64) -> String {
        format!("checkin:state:{user_id}")
    }

    fn rewards_key(user_id: u64) -> String {
        format!("checkin:rewards:{user_id}")
    }

    fn history_key(user_id: u64) -> String {
        format!("checkin:history:{user_id}")
    }

    fn reward_log_key(user_id: u64) -> String {
        format!("checkin:reward-history:{user_id}")
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> CheckinResult<Option<T>> {
        let mut conn = self.conn().await?;
        let data: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| CheckinError::Storage(e.to_string()))?;
        match data {
            Some(json) => {
                metrics::counter!("storage.hits").increment(1);
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => {
                metrics::counter!("storage.misses").increment(1);
                Ok(None)
            }
        }
    }

    async fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> CheckinResult<()> {
        let json = serde_json::to_string(value)?;
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(key, json)
            .await
            .map_err(|e| CheckinError::Storage(e.to_string()))
    }

    async fn push_json<T: serde::Serialize>(&self, key: &str, value: &T) -> CheckinResult<()> {
        let json = serde_json::to_string(value)?;
        let mut conn = self.conn().await?;
        conn.rpush::<_, _, ()>(key, json)
            .await
            .map_err(|e| CheckinError::Storage(e.to_string()))
    }

    async fn range_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> CheckinResult<Vec<T>> {
        let mut conn = self.conn().await?;
        let rows: Vec<String> = conn
            .lrange(key, start, stop)
            .await
            .map_err(|e| CheckinError::Storage(e.to_string()))?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(serde_json::from_str(&row)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl CheckinStore for RedisStore {
    async fn checkin_state(&self, user_id: u64) -> CheckinResult<Option<UserCheckinState>> {
        self.get_json(&Self::state_key(user_id)).await
    }

    async fn put_checkin_state(&self, state: &UserCheckinState) -> CheckinResult<()> {
        self.set_json(&Self::state_key(state.user_id), state).await
    }

    async fn append_checkin_history(&self, record: &CheckinHistoryRecord) -> CheckinResult<()> {
        self.push_json(&Self::history_key(record.user_id), record)
            .await
    }

    async fn checkin_history_count(&self, user_id: u64) -> CheckinResult<u64> {
        let mut conn = self.conn().await?;
        conn.llen(Self::history_key(user_id))
            .await
            .map_err(|e| CheckinError::Storage(e.to_string()))
    }

    async fn latest_checkin(&self, user_id: u64) -> CheckinResult<Option<CheckinHistoryRecord>> {
        let mut tail: Vec<CheckinHistoryRecord> =
            self.range_json(&Self::history_key(user_id), -1, -1).await?;
        Ok(tail.pop())
    }

    async fn checkin_history_since(
        &self,
        user_id: u64,
        since: DateTime<Utc>,
    ) -> CheckinResult<Vec<CheckinHistoryRecord>> {
        // One list entry per credited day keeps these lists short enough to
        // scan whole.
        let mut records = self.checkin_history(user_id).await?;
        records.retain(|r| r.checked_in_at >= since);
        Ok(records)
    }

    async fn checkin_history(&self, user_id: u64) -> CheckinResult<Vec<CheckinHistoryRecord>> {
        let mut records: Vec<CheckinHistoryRecord> =
            self.range_json(&Self::history_key(user_id), 0, -1).await?;
        records.reverse();
        Ok(records)
    }

    async fn rewards_state(&self, user_id: u64) -> CheckinResult<Option<UserRewardsState>> {
        self.get_json(&Self::rewards_key(user_id)).await
    }

    async fn put_rewards_state(&self, state: &UserRewardsState) -> CheckinResult<()> {
        self.set_json(&Self::rewards_key(state.user_id), state).await
    }

    async fn append_reward_history(&self, record: &RewardHistoryRecord) -> CheckinResult<()> {
        self.push_json(&Self::reward_log_key(record.user_id), record)
            .await
    }

    async fn reward_history(
        &self,
        user_id: u64,
        limit: usize,
    ) -> CheckinResult<Vec<RewardHistoryRecord>> {
        let mut records: Vec<RewardHistoryRecord> = self
            .range_json(&Self::reward_log_key(user_id), -(limit as isize), -1)
            .await?;
        records.reverse();
        Ok(records)
    }
}
