//! Streak decision state machine.
//!
//! Pure function over the user's stored check-in state and the incoming
//! instant. Day arithmetic is calendar-day based in UTC via
//! `checkin_core::clock`; wall-clock elapsed time is never consulted, so a
//! check-in at 23:59 followed by one at 00:01 the next day continues the
//! streak even though only minutes passed.

use checkin_core::clock;
use checkin_core::types::UserCheckinState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How one incoming check-in relates to the stored state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreakDecision {
    /// Already credited on this calendar day. The caller must not write
    /// anything and reports the existing streak back as a no-op.
    Duplicate,
    /// The previous calendar day was credited; the streak extends.
    Continue { streak: u32 },
    /// First-ever check-in, or at least one calendar day was missed. The
    /// streak restarts at 1 unconditionally; there is no grace period.
    Reset,
}

impl StreakDecision {
    /// Streak count that holds after this decision is applied.
    pub fn resulting_streak(&self, state: &UserCheckinState) -> u32 {
        match self {
            StreakDecision::Duplicate => state.streak_count,
            StreakDecision::Continue { streak } => *streak,
            StreakDecision::Reset => 1,
        }
    }

    pub fn is_credited(&self) -> bool {
        !matches!(self, StreakDecision::Duplicate)
    }
}

/// Decide whether `now` is a duplicate, a continuation, or a reset.
pub fn decide(state: &UserCheckinState, now: DateTime<Utc>) -> StreakDecision {
    let Some(last) = state.last_checkin_at else {
        return StreakDecision::Reset;
    };

    let days = clock::days_between(clock::day_key(last), clock::day_key(now));

    // days < 0 means the caller's clock ran backwards relative to the
    // stored instant; treating it as already-credited keeps the call
    // side-effect-free.
    if days <= 0 {
        StreakDecision::Duplicate
    } else if days == 1 {
        StreakDecision::Continue {
            streak: state.streak_count + 1,
        }
    } else {
        StreakDecision::Reset
    }
}
