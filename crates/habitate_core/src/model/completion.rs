//! Habit completion log model.
//!
//! # Invariants
//! - At most one log exists per `(habit_id, completed_on)`.
//! - `completed_on` is the calendar day the streak engine reasons about;
//!   `completed_at` is only an audit timestamp.

use crate::model::habit::HabitId;
use crate::model::sync::SyncState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type HabitLogId = Uuid;

/// Optional self-reported mood attached to a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitMood {
    Great,
    Good,
    Okay,
    Hard,
    Terrible,
}

impl HabitMood {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Great => "great",
            Self::Good => "good",
            Self::Okay => "okay",
            Self::Hard => "hard",
            Self::Terrible => "terrible",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "great" => Some(Self::Great),
            "good" => Some(Self::Good),
            "okay" => Some(Self::Okay),
            "hard" => Some(Self::Hard),
            "terrible" => Some(Self::Terrible),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Great => "Great",
            Self::Good => "Good",
            Self::Okay => "Okay",
            Self::Hard => "Hard",
            Self::Terrible => "Terrible",
        }
    }
}

/// One recorded completion of a habit on a calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitLog {
    pub id: HabitLogId,
    pub habit_id: HabitId,
    pub user_id: String,
    pub completed_on: NaiveDate,
    /// Unix epoch milliseconds.
    pub completed_at: i64,
    pub mood: Option<HabitMood>,
    pub note: Option<String>,
    pub sync_state: SyncState,
}

impl HabitLog {
    pub fn new(
        habit_id: HabitId,
        user_id: impl Into<String>,
        completed_on: NaiveDate,
        completed_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            habit_id,
            user_id: user_id.into(),
            completed_on,
            completed_at,
            mood: None,
            note: None,
            sync_state: SyncState::Pending,
        }
    }
}
