//! Habit use-case service.
//!
//! # Responsibility
//! - Scope every habit operation to the signed-in user.
//! - Stamp timestamps and build the outbound sync payload for each mutation.
//!
//! # Invariants
//! - A habit owned by another user is reported as `Forbidden`, never returned.
//! - Every mutation queues exactly the sync operations it implies, in the same
//!   transaction as the write.

use crate::clock::now_epoch_ms;
use crate::model::habit::{Habit, HabitId, HabitValidationError};
use crate::model::sync::{NewSyncOperation, SyncEntityType, SyncOperationKind, SyncState};
use crate::repo::completion_repo::CompletionRepository;
use crate::repo::habit_repo::{HabitListQuery, HabitRepository};
use crate::repo::RepoError;
use chrono::{Datelike, Days, NaiveDate};
use log::info;
use serde_json::json;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for habit use-cases.
#[derive(Debug)]
pub enum HabitServiceError {
    HabitNotFound(HabitId),
    /// Habit exists but belongs to another user.
    Forbidden(HabitId),
    Validation(HabitValidationError),
    Repo(RepoError),
    InconsistentState(&'static str),
}

impl Display for HabitServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HabitNotFound(id) => write!(f, "habit not found: {id}"),
            Self::Forbidden(id) => write!(f, "habit {id} belongs to another user"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => write!(f, "inconsistent habit state: {details}"),
        }
    }
}

impl Error for HabitServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for HabitServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<HabitValidationError> for HabitServiceError {
    fn from(value: HabitValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Habit service facade for one signed-in user.
pub struct HabitService<R: HabitRepository> {
    repo: R,
    user_id: String,
}

impl<R: HabitRepository> HabitService<R> {
    pub fn new(repo: R, user_id: impl Into<String>) -> Self {
        Self {
            repo,
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Creates a habit owned by the service user.
    ///
    /// The caller-supplied `user_id` and timestamps are overwritten.
    pub fn create_habit(&self, mut habit: Habit) -> Result<Habit, HabitServiceError> {
        let now = now_epoch_ms();
        habit.user_id = self.user_id.clone();
        habit.title = habit.title.trim().to_string();
        habit.is_archived = false;
        habit.sync_state = SyncState::Pending;
        habit.created_at = now;
        habit.updated_at = now;
        habit.validate()?;

        let outbox = habit_operation(&habit, SyncOperationKind::Create)?;
        let id = self.repo.create_habit(&habit, &outbox)?;
        info!("event=habit_create module=service status=ok habit_id={id}");

        self.repo
            .get_habit(id)?
            .ok_or(HabitServiceError::InconsistentState(
                "created habit not found in read-back",
            ))
    }

    /// Replaces editable fields of an owned habit.
    pub fn update_habit(&self, mut habit: Habit) -> Result<Habit, HabitServiceError> {
        let existing = self.get_habit(habit.id)?;
        habit.user_id = existing.user_id;
        habit.title = habit.title.trim().to_string();
        habit.created_at = existing.created_at;
        habit.sync_state = SyncState::Pending;
        habit.updated_at = now_epoch_ms().max(existing.updated_at);
        habit.validate()?;

        let outbox = habit_operation(&habit, SyncOperationKind::Update)?;
        self.repo.update_habit(&habit, &outbox)?;
        info!(
            "event=habit_update module=service status=ok habit_id={}",
            habit.id
        );

        self.repo
            .get_habit(habit.id)?
            .ok_or(HabitServiceError::InconsistentState(
                "updated habit not found in read-back",
            ))
    }

    /// Hides an owned habit from active lists; its history is kept.
    pub fn archive_habit(&self, id: HabitId) -> Result<Habit, HabitServiceError> {
        let mut habit = self.get_habit(id)?;
        if habit.is_archived {
            return Ok(habit);
        }
        let now = now_epoch_ms().max(habit.updated_at);
        habit.is_archived = true;
        habit.updated_at = now;

        let outbox = habit_operation(&habit, SyncOperationKind::Update)?;
        self.repo.archive_habit(id, now, &outbox)?;
        info!("event=habit_archive module=service status=ok habit_id={id}");

        self.repo
            .get_habit(id)?
            .ok_or(HabitServiceError::InconsistentState(
                "archived habit not found in read-back",
            ))
    }

    /// Deletes an owned habit with its logs and streak.
    pub fn delete_habit(&self, id: HabitId) -> Result<(), HabitServiceError> {
        self.get_habit(id)?;
        let scope = json!({ "habit_id": id.to_string() });
        let outbox = [
            NewSyncOperation::new(
                SyncEntityType::Habit,
                id.to_string(),
                SyncOperationKind::Delete,
                scope.clone(),
            ),
            NewSyncOperation::new(
                SyncEntityType::HabitLog,
                id.to_string(),
                SyncOperationKind::Delete,
                scope.clone(),
            ),
            NewSyncOperation::new(
                SyncEntityType::HabitStreak,
                id.to_string(),
                SyncOperationKind::Delete,
                scope,
            ),
        ];
        self.repo.delete_habit(id, now_epoch_ms(), &outbox)?;
        info!("event=habit_delete module=service status=ok habit_id={id}");
        Ok(())
    }

    /// Gets one owned habit.
    pub fn get_habit(&self, id: HabitId) -> Result<Habit, HabitServiceError> {
        let habit = self
            .repo
            .get_habit(id)?
            .ok_or(HabitServiceError::HabitNotFound(id))?;
        if habit.user_id != self.user_id {
            return Err(HabitServiceError::Forbidden(id));
        }
        Ok(habit)
    }

    pub fn list_habits(&self, query: &HabitListQuery) -> Result<Vec<Habit>, HabitServiceError> {
        Ok(self.repo.list_habits(&self.user_id, query)?)
    }

    /// Lists active habits that still expect a completion on `date`.
    ///
    /// Weekly habits are checked against the completions of `date`'s ISO week.
    pub fn list_due_on<C: CompletionRepository>(
        &self,
        completions: &C,
        date: NaiveDate,
    ) -> Result<Vec<Habit>, HabitServiceError> {
        let week_start = date
            .checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
            .unwrap_or(date);
        let habits = self.repo.list_habits(&self.user_id, &HabitListQuery::default())?;

        let mut due = Vec::with_capacity(habits.len());
        for habit in habits {
            let completed = completions.list_completed_dates(habit.id, Some(week_start))?;
            // Daily and custom habits are done for the day once `date` is logged.
            if completed.contains(&date) {
                continue;
            }
            if habit.is_due_on(date, &completed) {
                due.push(habit);
            }
        }
        Ok(due)
    }
}

fn habit_operation(
    habit: &Habit,
    operation: SyncOperationKind,
) -> Result<NewSyncOperation, HabitServiceError> {
    let payload = serde_json::to_value(habit).map_err(RepoError::from)?;
    Ok(NewSyncOperation::new(
        SyncEntityType::Habit,
        habit.id.to_string(),
        operation,
        payload,
    ))
}
