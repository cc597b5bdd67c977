//! Outbound sync queue contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist remote mutations captured by local writes (`sync_queue`).
//! - Own status transitions of queued operations and mirror their outcome
//!   onto the source row's `sync_state`.
//!
//! # Invariants
//! - Claiming is FIFO by `(created_at, id)` and only returns due `pending` rows.
//! - Only `in_progress` operations can be completed, retried, or failed.
//! - A source row becomes `synced` only once no other non-terminal operation
//!   remains for the same entity.

use crate::model::sync::{
    NewSyncOperation, SyncEntityType, SyncOperation, SyncOperationId, SyncOperationKind,
    SyncState, SyncStatus,
};
use crate::repo::{ensure_tables, invalid_enum, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};

const SYNC_SELECT_SQL: &str = "SELECT
    id,
    entity_type,
    entity_id,
    operation,
    payload,
    status,
    retry_count,
    created_at,
    last_attempt_at,
    next_attempt_at,
    last_error
FROM sync_queue";

const LAST_ERROR_MAX_CHARS: usize = 500;

/// Repository interface for the outbound sync queue.
pub trait SyncQueueRepository {
    /// Appends one operation, due immediately.
    fn enqueue(&self, op: &NewSyncOperation, now_ms: i64) -> RepoResult<SyncOperationId>;
    fn get_operation(&self, id: SyncOperationId) -> RepoResult<Option<SyncOperation>>;
    /// Atomically moves up to `limit` due `pending` operations to `in_progress`.
    fn claim_due(&self, now_ms: i64, limit: u32) -> RepoResult<Vec<SyncOperation>>;
    /// Marks a claimed operation acknowledged and settles its source row.
    fn mark_completed(&self, id: SyncOperationId) -> RepoResult<()>;
    /// Returns a claimed operation to `pending` with bumped retry bookkeeping.
    fn schedule_retry(
        &self,
        id: SyncOperationId,
        retry_count: u32,
        next_attempt_at: i64,
        error: &str,
    ) -> RepoResult<()>;
    /// Marks a claimed operation permanently failed and flags its source row.
    fn mark_failed(&self, id: SyncOperationId, error: &str) -> RepoResult<()>;
    /// Returns `in_progress` rows last attempted before `cutoff_ms` to `pending`.
    fn reset_stale(&self, cutoff_ms: i64) -> RepoResult<usize>;
    /// Re-arms every `failed` operation with a fresh retry budget.
    fn retry_failed(&self, now_ms: i64) -> RepoResult<usize>;
    fn count_by_status(&self, status: SyncStatus) -> RepoResult<u64>;
    /// Lists operations FIFO, optionally filtered by status.
    fn list_operations(
        &self,
        status: Option<SyncStatus>,
        limit: u32,
    ) -> RepoResult<Vec<SyncOperation>>;
    /// Deletes `completed` operations created before `before_ms`.
    fn prune_completed(&self, before_ms: i64) -> RepoResult<usize>;
}

/// SQLite-backed sync queue repository.
pub struct SqliteSyncQueueRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSyncQueueRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["sync_queue", "habits", "habit_logs"])?;
        Ok(Self { conn })
    }
}

impl SyncQueueRepository for SqliteSyncQueueRepository<'_> {
    fn enqueue(&self, op: &NewSyncOperation, now_ms: i64) -> RepoResult<SyncOperationId> {
        enqueue_in(self.conn, op, now_ms)
    }

    fn get_operation(&self, id: SyncOperationId) -> RepoResult<Option<SyncOperation>> {
        get_operation_in(self.conn, id)
    }

    fn claim_due(&self, now_ms: i64, limit: u32) -> RepoResult<Vec<SyncOperation>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut claimed = Vec::new();
        {
            let mut stmt = tx.prepare(&format!(
                "{SYNC_SELECT_SQL}
                 WHERE status = 'pending'
                   AND next_attempt_at <= ?1
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?2;"
            ))?;
            let mut rows = stmt.query(params![now_ms, i64::from(limit)])?;
            while let Some(row) = rows.next()? {
                claimed.push(parse_operation_row(row)?);
            }
        }

        for op in &mut claimed {
            tx.execute(
                "UPDATE sync_queue
                 SET status = 'in_progress',
                     last_attempt_at = ?2
                 WHERE id = ?1;",
                params![op.id, now_ms],
            )?;
            op.status = SyncStatus::InProgress;
            op.last_attempt_at = Some(now_ms);
        }

        tx.commit()?;
        Ok(claimed)
    }

    fn mark_completed(&self, id: SyncOperationId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let op = require_in_progress(&tx, id)?;
        tx.execute(
            "UPDATE sync_queue
             SET status = 'completed',
                 last_error = NULL
             WHERE id = ?1;",
            [id],
        )?;

        if op.operation != SyncOperationKind::Delete
            && !has_open_operations(&tx, op.entity_type, &op.entity_id)?
        {
            set_entity_sync_state(&tx, op.entity_type, &op.entity_id, SyncState::Synced)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn schedule_retry(
        &self,
        id: SyncOperationId,
        retry_count: u32,
        next_attempt_at: i64,
        error: &str,
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        require_in_progress(&tx, id)?;
        tx.execute(
            "UPDATE sync_queue
             SET status = 'pending',
                 retry_count = ?2,
                 next_attempt_at = ?3,
                 last_error = ?4
             WHERE id = ?1;",
            params![
                id,
                i64::from(retry_count),
                next_attempt_at,
                truncate_error(error)
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn mark_failed(&self, id: SyncOperationId, error: &str) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let op = require_in_progress(&tx, id)?;
        tx.execute(
            "UPDATE sync_queue
             SET status = 'failed',
                 last_error = ?2
             WHERE id = ?1;",
            params![id, truncate_error(error)],
        )?;
        set_entity_sync_state(&tx, op.entity_type, &op.entity_id, SyncState::Failed)?;
        tx.commit()?;
        Ok(())
    }

    fn reset_stale(&self, cutoff_ms: i64) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE sync_queue
             SET status = 'pending'
             WHERE status = 'in_progress'
               AND COALESCE(last_attempt_at, created_at) < ?1;",
            [cutoff_ms],
        )?;
        Ok(changed)
    }

    fn retry_failed(&self, now_ms: i64) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut failed = Vec::new();
        {
            let mut stmt = tx.prepare(&format!("{SYNC_SELECT_SQL} WHERE status = 'failed';"))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                failed.push(parse_operation_row(row)?);
            }
        }
        for op in &failed {
            tx.execute(
                "UPDATE sync_queue
                 SET status = 'pending',
                     retry_count = 0,
                     next_attempt_at = ?2,
                     last_error = NULL
                 WHERE id = ?1;",
                params![op.id, now_ms],
            )?;
            set_entity_sync_state(&tx, op.entity_type, &op.entity_id, SyncState::Pending)?;
        }
        tx.commit()?;
        Ok(failed.len())
    }

    fn count_by_status(&self, status: SyncStatus) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = ?1;",
            [status.as_str()],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative sync_queue count `{count}`")))
    }

    fn list_operations(
        &self,
        status: Option<SyncStatus>,
        limit: u32,
    ) -> RepoResult<Vec<SyncOperation>> {
        let mut sql = format!("{SYNC_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(limit)));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut operations = Vec::new();
        while let Some(row) = rows.next()? {
            operations.push(parse_operation_row(row)?);
        }
        Ok(operations)
    }

    fn prune_completed(&self, before_ms: i64) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "DELETE FROM sync_queue
             WHERE status = 'completed'
               AND created_at < ?1;",
            [before_ms],
        )?;
        Ok(changed)
    }
}

/// Inserts one queued operation using the caller's connection or transaction.
pub(crate) fn enqueue_in(
    conn: &Connection,
    op: &NewSyncOperation,
    now_ms: i64,
) -> RepoResult<SyncOperationId> {
    let payload = serde_json::to_string(&op.payload)?;
    conn.execute(
        "INSERT INTO sync_queue (
            entity_type,
            entity_id,
            operation,
            payload,
            status,
            retry_count,
            created_at,
            last_attempt_at,
            next_attempt_at,
            last_error
        ) VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, NULL, ?5, NULL);",
        params![
            op.entity_type.as_str(),
            op.entity_id.as_str(),
            op.operation.as_str(),
            payload,
            now_ms,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn get_operation_in(conn: &Connection, id: SyncOperationId) -> RepoResult<Option<SyncOperation>> {
    let mut stmt = conn.prepare(&format!("{SYNC_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_operation_row(row)?));
    }
    Ok(None)
}

fn require_in_progress(conn: &Connection, id: SyncOperationId) -> RepoResult<SyncOperation> {
    let op = get_operation_in(conn, id)?.ok_or_else(|| RepoError::not_found("sync operation", id))?;
    if op.status != SyncStatus::InProgress {
        return Err(RepoError::InvalidState(format!(
            "sync operation {id} is `{}`, expected `in_progress`",
            op.status.as_str()
        )));
    }
    Ok(op)
}

fn has_open_operations(
    conn: &Connection,
    entity_type: SyncEntityType,
    entity_id: &str,
) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sync_queue
            WHERE entity_type = ?1
              AND entity_id = ?2
              AND status IN ('pending', 'in_progress')
        );",
        params![entity_type.as_str(), entity_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Updates the `sync_state` flag on the row an operation was captured from.
///
/// Streak rows carry no flag; deleted rows simply match nothing.
pub(crate) fn set_entity_sync_state(
    conn: &Connection,
    entity_type: SyncEntityType,
    entity_id: &str,
    state: SyncState,
) -> RepoResult<()> {
    let sql = match entity_type {
        SyncEntityType::Habit => "UPDATE habits SET sync_state = ?2 WHERE id = ?1;",
        SyncEntityType::HabitLog => "UPDATE habit_logs SET sync_state = ?2 WHERE id = ?1;",
        SyncEntityType::HabitStreak => return Ok(()),
    };
    conn.execute(sql, params![entity_id, state.as_str()])?;
    Ok(())
}

fn parse_operation_row(row: &Row<'_>) -> RepoResult<SyncOperation> {
    let entity_type_text: String = row.get("entity_type")?;
    let entity_type = SyncEntityType::parse(&entity_type_text)
        .ok_or_else(|| invalid_enum(&entity_type_text, "sync_queue.entity_type"))?;

    let operation_text: String = row.get("operation")?;
    let operation = SyncOperationKind::parse(&operation_text)
        .ok_or_else(|| invalid_enum(&operation_text, "sync_queue.operation"))?;

    let status_text: String = row.get("status")?;
    let status = SyncStatus::parse(&status_text)
        .ok_or_else(|| invalid_enum(&status_text, "sync_queue.status"))?;

    let payload_text: String = row.get("payload")?;
    let payload = serde_json::from_str(&payload_text)?;

    let retry_count: i64 = row.get("retry_count")?;
    let retry_count = u32::try_from(retry_count).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid retry_count `{retry_count}` in sync_queue.retry_count"
        ))
    })?;

    Ok(SyncOperation {
        id: row.get("id")?,
        entity_type,
        entity_id: row.get("entity_id")?,
        operation,
        payload,
        status,
        retry_count,
        created_at: row.get("created_at")?,
        last_attempt_at: row.get("last_attempt_at")?,
        next_attempt_at: row.get("next_attempt_at")?,
        last_error: row.get("last_error")?,
    })
}

fn truncate_error(error: &str) -> String {
    let normalized = error.replace(['\n', '\r'], " ");
    normalized.chars().take(LAST_ERROR_MAX_CHARS).collect()
}
