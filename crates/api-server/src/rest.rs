//! REST handlers for check-ins, rewards, analytics, and operational
//! endpoints. The HTTP layer maps the engine's contract 1:1 onto routes;
//! all streak and reward decisions live below it.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use checkin_analytics::StatsAggregator;
use checkin_core::error::CheckinError;
use checkin_core::types::{AnalyticsStats, CheckinHistoryRecord, CheckinOutcome, ProfileFields};
use checkin_core::rewards::RewardTier;
use checkin_engine::CheckinProcessor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<CheckinProcessor>,
    pub analytics: Arc<StatsAggregator>,
    pub node_id: String,
    pub start_time: Instant,
    /// Bounds for the history window query parameter.
    pub default_history_days: u32,
    pub max_history_days: u32,
}

#[derive(Debug, Deserialize)]
pub struct CheckinRequest {
    pub user_id: u64,
    /// Event instant override; defaults to the server clock.
    pub now: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub profile: ProfileFields,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub days: Option<u32>,
}

/// POST /v1/checkin — process one check-in attempt.
pub async fn handle_checkin(
    State(state): State<AppState>,
    Json(request): Json<CheckinRequest>,
) -> Result<Json<CheckinOutcome>, (StatusCode, Json<ErrorResponse>)> {
    if request.user_id == 0 {
        warn!("Check-in request rejected: zero user_id");
        metrics::counter!("api.validation_errors").increment(1);
        return Err(bad_request("user_id must be positive"));
    }

    let profile = if request.profile.is_empty() {
        None
    } else {
        Some(request.profile)
    };

    match state
        .processor
        .process_checkin(request.user_id, request.now, profile)
        .await
    {
        Ok(outcome) => {
            metrics::counter!("api.checkins").increment(1);
            Ok(Json(outcome))
        }
        Err(e) => Err(engine_error(request.user_id, e)),
    }
}

/// GET /v1/checkin/:user_id — current streak state.
pub async fn handle_checkin_state(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> Result<Json<CheckinStateResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.processor.checkin_state(user_id).await {
        Ok(checkin) => Ok(Json(CheckinStateResponse {
            user_id: checkin.user_id,
            last_checkin_at: checkin.last_checkin_at,
            streak_count: checkin.streak_count,
            total_checkins: checkin.total_checkins,
        })),
        Err(e) => Err(engine_error(user_id, e)),
    }
}

/// GET /v1/rewards/:user_id — point total and tier.
pub async fn handle_rewards(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> Result<Json<RewardsResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.processor.rewards_state(user_id).await {
        Ok(rewards) => Ok(Json(RewardsResponse {
            user_id: rewards.user_id,
            total_points: rewards.total_points,
            tier: rewards.tier,
            last_reward_at: rewards.last_reward_at,
        })),
        Err(e) => Err(engine_error(user_id, e)),
    }
}

/// GET /v1/analytics/:user_id — derived statistics. Never fails; the
/// aggregator degrades to zeroed stats on storage trouble.
pub async fn handle_analytics(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> Json<AnalyticsStats> {
    Json(state.analytics.analytics(user_id).await)
}

/// GET /v1/analytics/:user_id/history?days=N — recent check-in records.
pub async fn handle_history(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, (StatusCode, Json<ErrorResponse>)> {
    let days = params.days.unwrap_or(state.default_history_days);
    if days == 0 || days > state.max_history_days {
        metrics::counter!("api.validation_errors").increment(1);
        return Err(bad_request("days must be between 1 and the configured maximum"));
    }

    let entries = state.analytics.history(user_id, days).await;
    Ok(Json(HistoryResponse {
        user_id,
        days,
        entries,
    }))
}

/// GET /health — health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — readiness probe.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "invalid_request".to_string(),
            message: message.to_string(),
        }),
    )
}

fn engine_error(user_id: u64, e: CheckinError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        CheckinError::InvalidInput(message) => {
            warn!(user_id, message = %message, "Request validation failed");
            metrics::counter!("api.validation_errors").increment(1);
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "invalid_request".to_string(),
                    message,
                }),
            )
        }
        e if e.is_retryable() => {
            error!(user_id, error = %e, "Storage unavailable");
            metrics::counter!("api.storage_errors").increment(1);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "storage_unavailable".to_string(),
                    message: "Temporary storage failure, safe to retry".to_string(),
                }),
            )
        }
        other => {
            error!(user_id, error = %other, "Check-in processing failed");
            metrics::counter!("api.errors").increment(1);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal_error".to_string(),
                    message: "Internal processing error".to_string(),
                }),
            )
        }
    }
}

#[derive(Serialize)]
pub struct CheckinStateResponse {
    pub user_id: u64,
    pub last_checkin_at: Option<DateTime<Utc>>,
    pub streak_count: u32,
    pub total_checkins: u64,
}

#[derive(Serialize)]
pub struct RewardsResponse {
    pub user_id: u64,
    pub total_points: u64,
    pub tier: RewardTier,
    pub last_reward_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub user_id: u64,
    pub days: u32,
    pub entries: Vec<CheckinHistoryRecord>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}
