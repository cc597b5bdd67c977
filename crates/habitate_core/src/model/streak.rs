//! Habit streak state and day-to-day transitions.
//!
//! # Responsibility
//! - Hold the per-habit streak counters.
//! - Apply one completion day (`record_completion`) or rebuild the counters
//!   from the remaining completion days (`recompute_streak`).
//!
//! # Invariants
//! - `current_streak <= longest_streak` after every transition.
//! - `longest_streak` never decreases.
//! - `record_completion` increments `total_completions` by exactly one; callers
//!   deduplicate by `(habit_id, date)` before invoking it.

use crate::model::habit::HabitId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Streak length multiple that triggers a milestone celebration.
pub const MILESTONE_INTERVAL_DAYS: u32 = 7;

/// Per-habit streak counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitStreak {
    pub habit_id: HabitId,
    pub user_id: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// ISO calendar date without time.
    pub last_completed_date: Option<NaiveDate>,
    pub total_completions: u32,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

impl HabitStreak {
    /// Zeroed row created alongside a new habit.
    pub fn empty(habit_id: HabitId, user_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            habit_id,
            user_id: user_id.into(),
            current_streak: 0,
            longest_streak: 0,
            last_completed_date: None,
            total_completions: 0,
            updated_at: now_ms,
        }
    }

    /// Returns whether the current run sits on a milestone boundary.
    pub fn is_milestone(&self) -> bool {
        is_milestone(self.current_streak)
    }
}

/// True for positive multiples of [`MILESTONE_INTERVAL_DAYS`].
pub fn is_milestone(current_streak: u32) -> bool {
    current_streak > 0 && current_streak % MILESTONE_INTERVAL_DAYS == 0
}

/// Applies one completion on `date` to the streak for `habit_id`.
///
/// - No prior row: starts at `1/1` with one completion.
/// - `date` is the day after `last_completed_date`: the run continues.
/// - Anything else (gap, same day, earlier day): the run restarts at `1`.
pub fn record_completion(
    existing: Option<&HabitStreak>,
    habit_id: HabitId,
    user_id: &str,
    date: NaiveDate,
    now_ms: i64,
) -> HabitStreak {
    let Some(existing) = existing else {
        return HabitStreak {
            habit_id,
            user_id: user_id.to_string(),
            current_streak: 1,
            longest_streak: 1,
            last_completed_date: Some(date),
            total_completions: 1,
            updated_at: now_ms,
        };
    };

    let continues = match (existing.last_completed_date, date.pred_opt()) {
        (Some(last), Some(yesterday)) => last == yesterday,
        _ => false,
    };
    let current_streak = if continues {
        existing.current_streak.saturating_add(1)
    } else {
        1
    };

    HabitStreak {
        habit_id: existing.habit_id,
        user_id: existing.user_id.clone(),
        current_streak,
        longest_streak: existing.longest_streak.max(current_streak),
        last_completed_date: Some(date),
        total_completions: existing.total_completions.saturating_add(1),
        updated_at: now_ms,
    }
}

/// Rebuilds counters from the completion days that remain after a retraction.
///
/// `longest_streak` keeps the larger of its previous value and the longest run
/// present in `completed_dates`. Order and duplicates in the input are ignored.
pub fn recompute_streak(
    existing: &HabitStreak,
    completed_dates: &[NaiveDate],
    now_ms: i64,
) -> HabitStreak {
    let mut dates = completed_dates.to_vec();
    dates.sort_unstable();
    dates.dedup();

    let mut longest_run = 0u32;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;
    for date in &dates {
        let continues = matches!(
            (previous, date.pred_opt()),
            (Some(prev), Some(yesterday)) if prev == yesterday
        );
        run = if continues { run.saturating_add(1) } else { 1 };
        longest_run = longest_run.max(run);
        previous = Some(*date);
    }

    // After the loop `run` is the length of the run ending at the latest date.
    let current_streak = run;
    HabitStreak {
        habit_id: existing.habit_id,
        user_id: existing.user_id.clone(),
        current_streak,
        longest_streak: existing.longest_streak.max(longest_run),
        last_completed_date: dates.last().copied(),
        total_completions: u32::try_from(dates.len()).unwrap_or(u32::MAX),
        updated_at: now_ms,
    }
}
