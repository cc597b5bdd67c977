//! Completion and streak use-case service.
//!
//! # Responsibility
//! - Record and retract daily completions for the signed-in user's habits.
//! - Report the resulting streak and whether it hit a milestone.
//!
//! # Invariants
//! - Archived, missing, or foreign habits never receive completions.
//! - Recording the same day twice is reported as `Duplicate` and leaves the
//!   streak untouched.

use crate::clock::{format_iso_date, now_epoch_ms};
use crate::model::completion::{HabitLog, HabitMood};
use crate::model::habit::{Habit, HabitId};
use crate::model::streak::HabitStreak;
use crate::repo::completion_repo::{CompletionRepository, CompletionStatus};
use crate::repo::habit_repo::HabitRepository;
use crate::repo::RepoError;
use chrono::NaiveDate;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const NOTE_MAX_CHARS: usize = 500;
pub const HISTORY_DEFAULT_LIMIT: u32 = 30;
pub const HISTORY_MAX_LIMIT: u32 = 366;

/// Service error for completion use-cases.
#[derive(Debug)]
pub enum CompletionServiceError {
    HabitNotFound(HabitId),
    Forbidden(HabitId),
    HabitArchived(HabitId),
    CompletionNotFound { habit_id: HabitId, date: NaiveDate },
    NoteTooLong { max_chars: usize },
    Repo(RepoError),
}

impl Display for CompletionServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HabitNotFound(id) => write!(f, "habit not found: {id}"),
            Self::Forbidden(id) => write!(f, "habit {id} belongs to another user"),
            Self::HabitArchived(id) => write!(f, "habit {id} is archived"),
            Self::CompletionNotFound { habit_id, date } => write!(
                f,
                "no completion for habit {habit_id} on {}",
                format_iso_date(*date)
            ),
            Self::NoteTooLong { max_chars } => {
                write!(f, "completion note exceeds {max_chars} characters")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CompletionServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CompletionServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Result of recording one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    /// Stored log for the day; the pre-existing one on `Duplicate`.
    pub log: HabitLog,
    pub streak: HabitStreak,
    pub status: CompletionStatus,
    /// The write just moved the streak onto a milestone.
    pub milestone: bool,
}

/// Completion service facade for one signed-in user.
pub struct CompletionService<C: CompletionRepository, H: HabitRepository> {
    completions: C,
    habits: H,
    user_id: String,
}

impl<C: CompletionRepository, H: HabitRepository> CompletionService<C, H> {
    pub fn new(completions: C, habits: H, user_id: impl Into<String>) -> Self {
        Self {
            completions,
            habits,
            user_id: user_id.into(),
        }
    }

    /// Marks `habit_id` done on `date`.
    pub fn record_completion(
        &self,
        habit_id: HabitId,
        date: NaiveDate,
        mood: Option<HabitMood>,
        note: Option<String>,
    ) -> Result<CompletionOutcome, CompletionServiceError> {
        let habit = self.owned_habit(habit_id)?;
        if habit.is_archived {
            return Err(CompletionServiceError::HabitArchived(habit_id));
        }
        let note = normalize_note(note)?;

        let now = now_epoch_ms();
        let mut log = HabitLog::new(habit_id, self.user_id.as_str(), date, now);
        log.mood = mood;
        log.note = note;

        let recorded = self.completions.record_completion(&log, now)?;
        let milestone =
            recorded.status == CompletionStatus::Recorded && recorded.streak.is_milestone();
        info!(
            "event=completion_record module=service status={} habit_id={} current_streak={} longest_streak={} milestone={}",
            match recorded.status {
                CompletionStatus::Recorded => "recorded",
                CompletionStatus::Duplicate => "duplicate",
            },
            habit_id,
            recorded.streak.current_streak,
            recorded.streak.longest_streak,
            milestone
        );

        Ok(CompletionOutcome {
            log: recorded.log,
            streak: recorded.streak,
            status: recorded.status,
            milestone,
        })
    }

    /// Retracts the completion logged on `date` and returns the rebuilt streak.
    pub fn undo_completion(
        &self,
        habit_id: HabitId,
        date: NaiveDate,
    ) -> Result<HabitStreak, CompletionServiceError> {
        self.owned_habit(habit_id)?;
        match self
            .completions
            .undo_completion(habit_id, date, now_epoch_ms())
        {
            Ok((_, streak)) => {
                info!(
                    "event=completion_undo module=service status=ok habit_id={habit_id} current_streak={}",
                    streak.current_streak
                );
                Ok(streak)
            }
            Err(RepoError::NotFound { .. }) => {
                Err(CompletionServiceError::CompletionNotFound { habit_id, date })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Lists recent completions, newest day first.
    ///
    /// `None` uses the default page; larger requests are clamped.
    pub fn history(
        &self,
        habit_id: HabitId,
        limit: Option<u32>,
    ) -> Result<Vec<HabitLog>, CompletionServiceError> {
        self.owned_habit(habit_id)?;
        let limit = limit
            .unwrap_or(HISTORY_DEFAULT_LIMIT)
            .clamp(1, HISTORY_MAX_LIMIT);
        Ok(self.completions.list_logs(habit_id, limit)?)
    }

    /// Current streak row; zeroed when nothing was recorded yet.
    pub fn streak(&self, habit_id: HabitId) -> Result<HabitStreak, CompletionServiceError> {
        self.owned_habit(habit_id)?;
        Ok(self
            .completions
            .get_streak(habit_id)?
            .unwrap_or_else(|| HabitStreak::empty(habit_id, self.user_id.as_str(), 0)))
    }

    /// Highest current streak across the user's active habits.
    pub fn best_streak(&self) -> Result<Option<HabitStreak>, CompletionServiceError> {
        Ok(self.completions.best_current_streak(&self.user_id)?)
    }

    fn owned_habit(&self, habit_id: HabitId) -> Result<Habit, CompletionServiceError> {
        let habit = self
            .habits
            .get_habit(habit_id)?
            .ok_or(CompletionServiceError::HabitNotFound(habit_id))?;
        if habit.user_id != self.user_id {
            return Err(CompletionServiceError::Forbidden(habit_id));
        }
        Ok(habit)
    }
}

fn normalize_note(note: Option<String>) -> Result<Option<String>, CompletionServiceError> {
    let Some(note) = note else {
        return Ok(None);
    };
    let trimmed = note.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > NOTE_MAX_CHARS {
        return Err(CompletionServiceError::NoteTooLong {
            max_chars: NOTE_MAX_CHARS,
        });
    }
    Ok(Some(trimmed.to_string()))
}
