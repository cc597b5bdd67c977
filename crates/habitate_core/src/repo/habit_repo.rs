//! Habit repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD over canonical `habits` storage.
//! - Capture the matching outbound sync operation in the same transaction as
//!   every mutation.
//!
//! # Invariants
//! - Write paths call `Habit::validate()` before SQL mutations.
//! - Every local mutation leaves the row in `sync_state = 'pending'`.
//! - Creating a habit also creates its zeroed streak row.
//! - Deleting a habit cascades to its logs and streak row.

use crate::model::habit::{
    schedule_from_db, schedule_to_db, Habit, HabitCategory, HabitFrequency, HabitId,
};
use crate::model::streak::HabitStreak;
use crate::model::sync::{NewSyncOperation, SyncState};
use crate::repo::completion_repo::upsert_streak_in;
use crate::repo::sync_queue_repo::enqueue_in;
use crate::repo::{
    bool_to_int, ensure_tables, invalid_enum, parse_bool, parse_uuid, RepoError, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};

const HABIT_SELECT_SQL: &str = "SELECT
    id,
    user_id,
    title,
    description,
    category,
    color,
    icon,
    frequency,
    custom_schedule,
    reminder_time,
    reminder_enabled,
    is_archived,
    sync_state,
    created_at,
    updated_at
FROM habits";

/// Query options for listing one user's habits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HabitListQuery {
    pub category: Option<HabitCategory>,
    pub include_archived: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for habit persistence.
pub trait HabitRepository {
    /// Inserts the habit, its zeroed streak row, and `outbox` atomically.
    fn create_habit(&self, habit: &Habit, outbox: &NewSyncOperation) -> RepoResult<HabitId>;
    /// Replaces editable fields and marks the row pending.
    fn update_habit(&self, habit: &Habit, outbox: &NewSyncOperation) -> RepoResult<()>;
    fn get_habit(&self, id: HabitId) -> RepoResult<Option<Habit>>;
    /// Lists habits ordered by `created_at DESC, id ASC`.
    fn list_habits(&self, user_id: &str, query: &HabitListQuery) -> RepoResult<Vec<Habit>>;
    fn archive_habit(&self, id: HabitId, now_ms: i64, outbox: &NewSyncOperation)
        -> RepoResult<()>;
    /// Hard-deletes the habit with its logs and streak row.
    fn delete_habit(&self, id: HabitId, now_ms: i64, outbox: &[NewSyncOperation])
        -> RepoResult<()>;
    fn list_by_sync_state(&self, state: SyncState, limit: u32) -> RepoResult<Vec<Habit>>;
}

/// SQLite-backed habit repository.
pub struct SqliteHabitRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteHabitRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["habits", "habit_streaks", "sync_queue"])?;
        Ok(Self { conn })
    }
}

impl HabitRepository for SqliteHabitRepository<'_> {
    fn create_habit(&self, habit: &Habit, outbox: &NewSyncOperation) -> RepoResult<HabitId> {
        habit.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO habits (
                id,
                user_id,
                title,
                description,
                category,
                color,
                icon,
                frequency,
                custom_schedule,
                reminder_time,
                reminder_enabled,
                is_archived,
                sync_state,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 'pending', ?13, ?14);",
            params![
                habit.id.to_string(),
                habit.user_id.as_str(),
                habit.title.trim(),
                habit.description.as_deref(),
                habit.category.as_str(),
                habit.color.as_str(),
                habit.icon.as_str(),
                habit.frequency.as_str(),
                schedule_to_db(&habit.custom_schedule),
                habit.reminder_time.as_deref(),
                bool_to_int(habit.reminder_enabled),
                bool_to_int(habit.is_archived),
                habit.created_at,
                habit.updated_at,
            ],
        )?;
        upsert_streak_in(
            &tx,
            &HabitStreak::empty(habit.id, habit.user_id.as_str(), habit.created_at),
        )?;
        enqueue_in(&tx, outbox, habit.updated_at)?;
        tx.commit()?;

        Ok(habit.id)
    }

    fn update_habit(&self, habit: &Habit, outbox: &NewSyncOperation) -> RepoResult<()> {
        habit.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE habits
             SET
                title = ?2,
                description = ?3,
                category = ?4,
                color = ?5,
                icon = ?6,
                frequency = ?7,
                custom_schedule = ?8,
                reminder_time = ?9,
                reminder_enabled = ?10,
                is_archived = ?11,
                sync_state = 'pending',
                updated_at = ?12
             WHERE id = ?1;",
            params![
                habit.id.to_string(),
                habit.title.trim(),
                habit.description.as_deref(),
                habit.category.as_str(),
                habit.color.as_str(),
                habit.icon.as_str(),
                habit.frequency.as_str(),
                schedule_to_db(&habit.custom_schedule),
                habit.reminder_time.as_deref(),
                bool_to_int(habit.reminder_enabled),
                bool_to_int(habit.is_archived),
                habit.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("habit", habit.id));
        }
        enqueue_in(&tx, outbox, habit.updated_at)?;
        tx.commit()?;

        Ok(())
    }

    fn get_habit(&self, id: HabitId) -> RepoResult<Option<Habit>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{HABIT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_habit_row(row)?));
        }
        Ok(None)
    }

    fn list_habits(&self, user_id: &str, query: &HabitListQuery) -> RepoResult<Vec<Habit>> {
        let mut sql = format!("{HABIT_SELECT_SQL} WHERE user_id = ?");
        let mut bind_values: Vec<Value> = vec![Value::Text(user_id.to_string())];

        if !query.include_archived {
            sql.push_str(" AND is_archived = 0");
        }

        if let Some(category) = query.category {
            sql.push_str(" AND category = ?");
            bind_values.push(Value::Text(category.as_str().to_string()));
        }

        sql.push_str(" ORDER BY created_at DESC, id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut habits = Vec::new();
        while let Some(row) = rows.next()? {
            habits.push(parse_habit_row(row)?);
        }
        Ok(habits)
    }

    fn archive_habit(
        &self,
        id: HabitId,
        now_ms: i64,
        outbox: &NewSyncOperation,
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE habits
             SET
                is_archived = 1,
                sync_state = 'pending',
                updated_at = ?2
             WHERE id = ?1;",
            params![id.to_string(), now_ms],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("habit", id));
        }
        enqueue_in(&tx, outbox, now_ms)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_habit(
        &self,
        id: HabitId,
        now_ms: i64,
        outbox: &[NewSyncOperation],
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute("DELETE FROM habits WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::not_found("habit", id));
        }
        for op in outbox {
            enqueue_in(&tx, op, now_ms)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn list_by_sync_state(&self, state: SyncState, limit: u32) -> RepoResult<Vec<Habit>> {
        let mut stmt = self.conn.prepare(&format!(
            "{HABIT_SELECT_SQL}
             WHERE sync_state = ?1
             ORDER BY updated_at ASC, id ASC
             LIMIT ?2;"
        ))?;
        let mut rows = stmt.query(params![state.as_str(), i64::from(limit)])?;
        let mut habits = Vec::new();
        while let Some(row) = rows.next()? {
            habits.push(parse_habit_row(row)?);
        }
        Ok(habits)
    }
}

fn parse_habit_row(row: &Row<'_>) -> RepoResult<Habit> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "habits.id")?;

    let category_text: String = row.get("category")?;
    let category = HabitCategory::parse(&category_text)
        .ok_or_else(|| invalid_enum(&category_text, "habits.category"))?;

    let frequency_text: String = row.get("frequency")?;
    let frequency = HabitFrequency::parse(&frequency_text)
        .ok_or_else(|| invalid_enum(&frequency_text, "habits.frequency"))?;

    let schedule_text: Option<String> = row.get("custom_schedule")?;
    let custom_schedule = schedule_from_db(schedule_text.as_deref()).ok_or_else(|| {
        invalid_enum(
            schedule_text.as_deref().unwrap_or_default(),
            "habits.custom_schedule",
        )
    })?;

    let sync_state_text: String = row.get("sync_state")?;
    let sync_state = SyncState::parse(&sync_state_text)
        .ok_or_else(|| invalid_enum(&sync_state_text, "habits.sync_state"))?;

    let habit = Habit {
        id,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        category,
        color: row.get("color")?,
        icon: row.get("icon")?,
        frequency,
        custom_schedule,
        reminder_time: row.get("reminder_time")?,
        reminder_enabled: parse_bool(row.get("reminder_enabled")?, "habits.reminder_enabled")?,
        is_archived: parse_bool(row.get("is_archived")?, "habits.is_archived")?,
        sync_state,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    habit.validate()?;
    Ok(habit)
}
