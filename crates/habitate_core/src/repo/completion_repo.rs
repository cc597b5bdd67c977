//! Completion log and streak repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist one completion log per habit per calendar day.
//! - Apply streak transitions in the same transaction as the log write.
//!
//! # Invariants
//! - `(habit_id, completed_on)` is unique; a duplicate day changes nothing.
//! - The streak row is only written after the log insert actually happened,
//!   so `total_completions` counts distinct days.
//! - Retracting a completion rebuilds the streak from the remaining days.

use crate::clock::{format_iso_date, parse_iso_date};
use crate::model::completion::{HabitLog, HabitMood};
use crate::model::habit::HabitId;
use crate::model::streak::{record_completion, recompute_streak, HabitStreak};
use crate::model::sync::{NewSyncOperation, SyncEntityType, SyncOperationKind, SyncState};
use crate::repo::sync_queue_repo::enqueue_in;
use crate::repo::{ensure_tables, invalid_enum, parse_uuid, RepoError, RepoResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use serde_json::json;

const LOG_SELECT_SQL: &str = "SELECT
    id,
    habit_id,
    user_id,
    completed_on,
    completed_at,
    mood,
    note,
    sync_state
FROM habit_logs";

const STREAK_SELECT_SQL: &str = "SELECT
    habit_id,
    user_id,
    current_streak,
    longest_streak,
    last_completed_date,
    total_completions,
    updated_at
FROM habit_streaks";

/// Whether a completion write changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// New log inserted and streak advanced.
    Recorded,
    /// A log for that day already existed; nothing was written.
    Duplicate,
}

/// Result of [`CompletionRepository::record_completion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCompletion {
    pub status: CompletionStatus,
    /// The stored log for that day (the pre-existing one on `Duplicate`).
    pub log: HabitLog,
    pub streak: HabitStreak,
}

/// Repository interface for completion logs and streak rows.
pub trait CompletionRepository {
    /// Inserts `log` unless its day is already logged, then advances the streak
    /// and queues the log for sync.
    fn record_completion(&self, log: &HabitLog, now_ms: i64) -> RepoResult<RecordedCompletion>;
    /// Deletes the log for `date`, rebuilds the streak, and queues the delete.
    fn undo_completion(
        &self,
        habit_id: HabitId,
        date: NaiveDate,
        now_ms: i64,
    ) -> RepoResult<(HabitLog, HabitStreak)>;
    fn get_log_for_date(&self, habit_id: HabitId, date: NaiveDate) -> RepoResult<Option<HabitLog>>;
    /// Lists logs newest day first.
    fn list_logs(&self, habit_id: HabitId, limit: u32) -> RepoResult<Vec<HabitLog>>;
    /// Lists logged days ascending, optionally starting at `since`.
    fn list_completed_dates(
        &self,
        habit_id: HabitId,
        since: Option<NaiveDate>,
    ) -> RepoResult<Vec<NaiveDate>>;
    fn get_streak(&self, habit_id: HabitId) -> RepoResult<Option<HabitStreak>>;
    /// Streak row with the highest current run among the user's active habits.
    fn best_current_streak(&self, user_id: &str) -> RepoResult<Option<HabitStreak>>;
}

/// SQLite-backed completion/streak repository.
pub struct SqliteCompletionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCompletionRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["habit_logs", "habit_streaks", "sync_queue"])?;
        Ok(Self { conn })
    }
}

impl CompletionRepository for SqliteCompletionRepository<'_> {
    fn record_completion(&self, log: &HabitLog, now_ms: i64) -> RepoResult<RecordedCompletion> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO habit_logs (
                id,
                habit_id,
                user_id,
                completed_on,
                completed_at,
                mood,
                note,
                sync_state,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8);",
            params![
                log.id.to_string(),
                log.habit_id.to_string(),
                log.user_id.as_str(),
                format_iso_date(log.completed_on),
                log.completed_at,
                log.mood.map(HabitMood::as_str),
                log.note.as_deref(),
                now_ms,
            ],
        )?;

        if inserted == 0 {
            let existing_log = get_log_for_date_in(&tx, log.habit_id, log.completed_on)?
                .ok_or_else(|| RepoError::not_found("habit log", log.id))?;
            let streak = get_streak_in(&tx, log.habit_id)?.unwrap_or_else(|| {
                HabitStreak::empty(log.habit_id, log.user_id.as_str(), now_ms)
            });
            return Ok(RecordedCompletion {
                status: CompletionStatus::Duplicate,
                log: existing_log,
                streak,
            });
        }

        let existing = get_streak_in(&tx, log.habit_id)?;
        let streak = record_completion(
            existing.as_ref(),
            log.habit_id,
            log.user_id.as_str(),
            log.completed_on,
            now_ms,
        );
        upsert_streak_in(&tx, &streak)?;

        let mut stored = log.clone();
        stored.sync_state = SyncState::Pending;
        enqueue_in(
            &tx,
            &NewSyncOperation::new(
                SyncEntityType::HabitLog,
                log.id.to_string(),
                SyncOperationKind::Create,
                serde_json::to_value(&stored)?,
            ),
            now_ms,
        )?;
        tx.commit()?;

        Ok(RecordedCompletion {
            status: CompletionStatus::Recorded,
            log: stored,
            streak,
        })
    }

    fn undo_completion(
        &self,
        habit_id: HabitId,
        date: NaiveDate,
        now_ms: i64,
    ) -> RepoResult<(HabitLog, HabitStreak)> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let log = get_log_for_date_in(&tx, habit_id, date)?.ok_or_else(|| {
            RepoError::not_found("habit log", format!("{habit_id}@{}", format_iso_date(date)))
        })?;
        tx.execute("DELETE FROM habit_logs WHERE id = ?1;", [log.id.to_string()])?;

        let remaining = list_completed_dates_in(&tx, habit_id, None)?;
        let existing = get_streak_in(&tx, habit_id)?
            .unwrap_or_else(|| HabitStreak::empty(habit_id, log.user_id.as_str(), now_ms));
        let streak = recompute_streak(&existing, &remaining, now_ms);
        upsert_streak_in(&tx, &streak)?;

        enqueue_in(
            &tx,
            &NewSyncOperation::new(
                SyncEntityType::HabitLog,
                log.id.to_string(),
                SyncOperationKind::Delete,
                json!({
                    "habit_id": habit_id.to_string(),
                    "completed_on": format_iso_date(date),
                }),
            ),
            now_ms,
        )?;
        tx.commit()?;

        Ok((log, streak))
    }

    fn get_log_for_date(&self, habit_id: HabitId, date: NaiveDate) -> RepoResult<Option<HabitLog>> {
        get_log_for_date_in(self.conn, habit_id, date)
    }

    fn list_logs(&self, habit_id: HabitId, limit: u32) -> RepoResult<Vec<HabitLog>> {
        let mut stmt = self.conn.prepare(&format!(
            "{LOG_SELECT_SQL}
             WHERE habit_id = ?1
             ORDER BY completed_on DESC, id ASC
             LIMIT ?2;"
        ))?;
        let mut rows = stmt.query(params![habit_id.to_string(), i64::from(limit)])?;
        let mut logs = Vec::new();
        while let Some(row) = rows.next()? {
            logs.push(parse_log_row(row)?);
        }
        Ok(logs)
    }

    fn list_completed_dates(
        &self,
        habit_id: HabitId,
        since: Option<NaiveDate>,
    ) -> RepoResult<Vec<NaiveDate>> {
        list_completed_dates_in(self.conn, habit_id, since)
    }

    fn get_streak(&self, habit_id: HabitId) -> RepoResult<Option<HabitStreak>> {
        get_streak_in(self.conn, habit_id)
    }

    fn best_current_streak(&self, user_id: &str) -> RepoResult<Option<HabitStreak>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                s.habit_id,
                s.user_id,
                s.current_streak,
                s.longest_streak,
                s.last_completed_date,
                s.total_completions,
                s.updated_at
             FROM habit_streaks s
             INNER JOIN habits h ON h.id = s.habit_id
             WHERE s.user_id = ?1
               AND h.is_archived = 0
             ORDER BY s.current_streak DESC, s.longest_streak DESC, s.habit_id ASC
             LIMIT 1;",
        )?;
        let mut rows = stmt.query([user_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_streak_row(row)?));
        }
        Ok(None)
    }
}

/// Inserts or replaces a streak row using the caller's connection or transaction.
pub(crate) fn upsert_streak_in(conn: &Connection, streak: &HabitStreak) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO habit_streaks (
            habit_id,
            user_id,
            current_streak,
            longest_streak,
            last_completed_date,
            total_completions,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(habit_id) DO UPDATE SET
            current_streak = excluded.current_streak,
            longest_streak = excluded.longest_streak,
            last_completed_date = excluded.last_completed_date,
            total_completions = excluded.total_completions,
            updated_at = excluded.updated_at;",
        params![
            streak.habit_id.to_string(),
            streak.user_id.as_str(),
            i64::from(streak.current_streak),
            i64::from(streak.longest_streak),
            streak.last_completed_date.map(format_iso_date),
            i64::from(streak.total_completions),
            streak.updated_at,
        ],
    )?;
    Ok(())
}

fn get_streak_in(conn: &Connection, habit_id: HabitId) -> RepoResult<Option<HabitStreak>> {
    let mut stmt = conn.prepare(&format!("{STREAK_SELECT_SQL} WHERE habit_id = ?1;"))?;
    let mut rows = stmt.query([habit_id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_streak_row(row)?));
    }
    Ok(None)
}

fn get_log_for_date_in(
    conn: &Connection,
    habit_id: HabitId,
    date: NaiveDate,
) -> RepoResult<Option<HabitLog>> {
    let mut stmt = conn.prepare(&format!(
        "{LOG_SELECT_SQL}
         WHERE habit_id = ?1
           AND completed_on = ?2;"
    ))?;
    let mut rows = stmt.query(params![habit_id.to_string(), format_iso_date(date)])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_log_row(row)?));
    }
    Ok(None)
}

fn list_completed_dates_in(
    conn: &Connection,
    habit_id: HabitId,
    since: Option<NaiveDate>,
) -> RepoResult<Vec<NaiveDate>> {
    // ISO dates sort lexicographically, so text comparison is date comparison.
    let mut stmt = conn.prepare(
        "SELECT completed_on
         FROM habit_logs
         WHERE habit_id = ?1
           AND (?2 IS NULL OR completed_on >= ?2)
         ORDER BY completed_on ASC;",
    )?;
    let mut rows = stmt.query(params![habit_id.to_string(), since.map(format_iso_date)])?;
    let mut dates = Vec::new();
    while let Some(row) = rows.next()? {
        let text: String = row.get(0)?;
        dates.push(parse_date(&text, "habit_logs.completed_on")?);
    }
    Ok(dates)
}

fn parse_log_row(row: &Row<'_>) -> RepoResult<HabitLog> {
    let id_text: String = row.get("id")?;
    let habit_id_text: String = row.get("habit_id")?;
    let completed_on_text: String = row.get("completed_on")?;

    let mood = match row.get::<_, Option<String>>("mood")? {
        Some(value) => Some(
            HabitMood::parse(&value).ok_or_else(|| invalid_enum(&value, "habit_logs.mood"))?,
        ),
        None => None,
    };

    let sync_state_text: String = row.get("sync_state")?;
    let sync_state = SyncState::parse(&sync_state_text)
        .ok_or_else(|| invalid_enum(&sync_state_text, "habit_logs.sync_state"))?;

    Ok(HabitLog {
        id: parse_uuid(&id_text, "habit_logs.id")?,
        habit_id: parse_uuid(&habit_id_text, "habit_logs.habit_id")?,
        user_id: row.get("user_id")?,
        completed_on: parse_date(&completed_on_text, "habit_logs.completed_on")?,
        completed_at: row.get("completed_at")?,
        mood,
        note: row.get("note")?,
        sync_state,
    })
}

fn parse_streak_row(row: &Row<'_>) -> RepoResult<HabitStreak> {
    let habit_id_text: String = row.get("habit_id")?;
    let last_completed_date = match row.get::<_, Option<String>>("last_completed_date")? {
        Some(value) => Some(parse_date(&value, "habit_streaks.last_completed_date")?),
        None => None,
    };

    let streak = HabitStreak {
        habit_id: parse_uuid(&habit_id_text, "habit_streaks.habit_id")?,
        user_id: row.get("user_id")?,
        current_streak: parse_count(row.get("current_streak")?, "habit_streaks.current_streak")?,
        longest_streak: parse_count(row.get("longest_streak")?, "habit_streaks.longest_streak")?,
        last_completed_date,
        total_completions: parse_count(
            row.get("total_completions")?,
            "habit_streaks.total_completions",
        )?,
        updated_at: row.get("updated_at")?,
    };
    if streak.current_streak > streak.longest_streak {
        return Err(RepoError::InvalidData(format!(
            "current_streak {} exceeds longest_streak {} for habit {}",
            streak.current_streak, streak.longest_streak, streak.habit_id
        )));
    }
    Ok(streak)
}

fn parse_date(value: &str, column: &str) -> RepoResult<NaiveDate> {
    parse_iso_date(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid date `{value}` in {column}")))
}

fn parse_count(value: i64, column: &str) -> RepoResult<u32> {
    u32::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid count `{value}` in {column}")))
}
