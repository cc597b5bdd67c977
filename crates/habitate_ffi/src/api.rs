//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose habit, completion, streak, and sync-queue use cases to Dart via FRB.
//! - Flatten core errors into envelope messages.
//!
//! # Invariants
//! - Exported functions never panic across the FFI boundary.
//! - Dates cross the boundary as ISO `YYYY-MM-DD` strings, ids as UUID strings.
//! - The host performs network I/O: it claims a batch, pushes it, and reports
//!   each outcome back.

use chrono::Weekday;
use habitate_core::clock::{format_iso_date, now_epoch_ms, parse_iso_date};
use habitate_core::db::open_db;
use habitate_core::service::sync_service::{apply_outcome, claim_batch};
use habitate_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    CompletionService, CompletionStatus, Habit, HabitCategory, HabitFrequency, HabitId,
    HabitListQuery, HabitLog, HabitMood, HabitService, HabitStreak, SqliteCompletionRepository,
    SqliteHabitRepository, SqliteSyncQueueRepository, SyncConfig, SyncDisposition,
    SyncOperation, SyncPushRequest, SyncQueueRepository, SyncStatus, SyncTransportError,
};
use log::warn;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::OnceLock;

const DB_FILE_NAME: &str = "habitate.sqlite3";
const DB_PATH_ENV: &str = "HABITATE_DB_PATH";
static DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static SYNC_CONFIG: OnceLock<SyncConfig> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Idempotent for the same `level + log_dir`; other combinations return an error.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Pins the SQLite file used by every later call.
///
/// Must run before the first DB-backed call; without it the path comes from
/// `HABITATE_DB_PATH` or the temp directory.
///
/// # FFI contract
/// - Returns empty string on success and error message on failure.
/// - Repeating the call with the already active path succeeds.
#[flutter_rust_bridge::frb(sync)]
pub fn configure_db_path(db_path: String) -> String {
    let trimmed = db_path.trim();
    if trimmed.is_empty() {
        return "db_path cannot be empty".to_string();
    }
    let requested = PathBuf::from(trimmed);
    let active = DB_PATH.get_or_init(|| requested.clone());
    if *active != requested {
        return format!(
            "database already bound to `{}`; refusing to switch to `{}`",
            active.display(),
            requested.display()
        );
    }
    String::new()
}

/// Overrides sync retry/backoff settings from a JSON document.
///
/// Missing fields keep their defaults. Must run before the first sync call.
#[flutter_rust_bridge::frb(sync)]
pub fn sync_configure(config_json: String) -> String {
    let config = match SyncConfig::from_json(config_json.as_str()) {
        Ok(config) => config,
        Err(err) => return err.to_string(),
    };
    let active = SYNC_CONFIG.get_or_init(|| config);
    if *active != config {
        return "sync config already active; refusing to replace it".to_string();
    }
    String::new()
}

/// Habit projection for list/detail screens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitItem {
    pub habit_id: String,
    pub title: String,
    pub category: String,
    pub color: String,
    pub icon: String,
    /// `daily|weekly|custom`.
    pub frequency: String,
    /// Three-letter weekday names for custom schedules.
    pub custom_days: Vec<String>,
    pub is_archived: bool,
    /// `pending|synced|failed`.
    pub sync_state: String,
}

/// Streak projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakItem {
    pub habit_id: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_completed_date: Option<String>,
    pub total_completions: u32,
}

/// Generic habit mutation envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitActionResponse {
    pub ok: bool,
    pub habit: Option<HabitItem>,
    pub message: String,
}

impl HabitActionResponse {
    fn success(message: impl Into<String>, habit: Option<HabitItem>) -> Self {
        Self {
            ok: true,
            habit,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            habit: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitListResponse {
    pub ok: bool,
    pub items: Vec<HabitItem>,
    pub message: String,
}

/// Completion record/undo envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub ok: bool,
    /// `recorded|duplicate|undone`; empty on failure.
    pub status: String,
    pub streak: Option<StreakItem>,
    pub milestone: bool,
    pub message: String,
}

impl CompletionResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            status: String::new(),
            streak: None,
            milestone: false,
            message: message.into(),
        }
    }
}

/// One day of completion history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub log_id: String,
    pub habit_id: String,
    /// ISO `YYYY-MM-DD`.
    pub completed_on: String,
    /// Unix epoch milliseconds.
    pub completed_at: i64,
    pub mood: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionHistoryResponse {
    pub ok: bool,
    pub items: Vec<CompletionItem>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakResponse {
    pub ok: bool,
    pub streak: Option<StreakItem>,
    pub message: String,
}

/// One claimed queue entry, shaped for an HTTP push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOperationItem {
    pub op_id: i64,
    pub entity_type: String,
    pub entity_id: String,
    /// `POST|PUT|DELETE`.
    pub method: String,
    /// Relative REST path.
    pub path: String,
    pub payload_json: String,
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncBatchResponse {
    pub ok: bool,
    pub items: Vec<SyncOperationItem>,
    /// Abandoned claims returned to the queue before this batch.
    pub reset_stale: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcomeResponse {
    pub ok: bool,
    /// `completed|retried|failed|conflict`; empty on failure.
    pub disposition: String,
    pub next_attempt_at: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncQueueStatsResponse {
    pub ok: bool,
    pub pending: u64,
    pub in_progress: u64,
    pub failed: u64,
    pub completed: u64,
    pub message: String,
}

/// Creates a habit for `user_id`.
///
/// `frequency` is `daily|weekly|custom`; `custom_days` holds weekday names
/// (`mon`, `Tuesday`, ...) and is only read for `custom`. `color=None` uses the
/// category default.
#[flutter_rust_bridge::frb(sync)]
pub fn habit_create(
    user_id: String,
    title: String,
    category: String,
    frequency: String,
    custom_days: Vec<String>,
    color: Option<String>,
) -> HabitActionResponse {
    let category = match HabitCategory::parse(category.trim()) {
        Some(value) => value,
        None => return HabitActionResponse::failure(format!("unknown category `{category}`")),
    };
    let mut habit = Habit::new(user_id.trim(), title, category);
    if let Err(message) = apply_frequency(&mut habit, &frequency, &custom_days) {
        return HabitActionResponse::failure(message);
    }
    if let Some(color) = color {
        habit.color = color.trim().to_string();
    }

    match with_connection(|conn| {
        let service = habit_service(conn, user_id.trim())?;
        service.create_habit(habit).map_err(|err| err.to_string())
    }) {
        Ok(habit) => HabitActionResponse::success("Habit created.", Some(to_habit_item(&habit))),
        Err(err) => HabitActionResponse::failure(format!("habit_create failed: {err}")),
    }
}

/// Replaces the editable fields of an owned habit.
///
/// Same argument rules as [`habit_create`]; `color=None` keeps the current color.
/// Archive state, reminders, and history are left untouched.
#[flutter_rust_bridge::frb(sync)]
pub fn habit_update(
    user_id: String,
    habit_id: String,
    title: String,
    category: String,
    frequency: String,
    custom_days: Vec<String>,
    color: Option<String>,
) -> HabitActionResponse {
    let category = match HabitCategory::parse(category.trim()) {
        Some(value) => value,
        None => return HabitActionResponse::failure(format!("unknown category `{category}`")),
    };

    let result = parse_habit_id(&habit_id).and_then(|id| {
        with_connection(|conn| {
            let service = habit_service(conn, user_id.trim())?;
            let mut habit = service.get_habit(id).map_err(|err| err.to_string())?;
            habit.title = title;
            habit.category = category;
            apply_frequency(&mut habit, &frequency, &custom_days)?;
            if let Some(color) = color {
                habit.color = color.trim().to_string();
            }
            service.update_habit(habit).map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(habit) => HabitActionResponse::success("Habit updated.", Some(to_habit_item(&habit))),
        Err(err) => HabitActionResponse::failure(format!("habit_update failed: {err}")),
    }
}

/// Lists the user's habits, newest first.
#[flutter_rust_bridge::frb(sync)]
pub fn habit_list(user_id: String, include_archived: bool) -> HabitListResponse {
    let query = HabitListQuery {
        include_archived,
        ..HabitListQuery::default()
    };
    match with_connection(|conn| {
        let service = habit_service(conn, user_id.trim())?;
        service.list_habits(&query).map_err(|err| err.to_string())
    }) {
        Ok(habits) => HabitListResponse {
            ok: true,
            message: format!("{} habit(s).", habits.len()),
            items: habits.iter().map(to_habit_item).collect(),
        },
        Err(err) => HabitListResponse {
            ok: false,
            items: Vec::new(),
            message: format!("habit_list failed: {err}"),
        },
    }
}

/// Lists active habits still due on `date` (ISO).
#[flutter_rust_bridge::frb(sync)]
pub fn habit_list_due(user_id: String, date: String) -> HabitListResponse {
    let result = parse_date_arg(&date).and_then(|date| {
        with_connection(|conn| {
            let service = habit_service(conn, user_id.trim())?;
            let completions =
                SqliteCompletionRepository::try_new(conn).map_err(|err| err.to_string())?;
            service
                .list_due_on(&completions, date)
                .map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(habits) => HabitListResponse {
            ok: true,
            message: format!("{} habit(s) due.", habits.len()),
            items: habits.iter().map(to_habit_item).collect(),
        },
        Err(err) => HabitListResponse {
            ok: false,
            items: Vec::new(),
            message: format!("habit_list_due failed: {err}"),
        },
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn habit_archive(user_id: String, habit_id: String) -> HabitActionResponse {
    let result = parse_habit_id(&habit_id).and_then(|id| {
        with_connection(|conn| {
            let service = habit_service(conn, user_id.trim())?;
            service.archive_habit(id).map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(habit) => HabitActionResponse::success("Habit archived.", Some(to_habit_item(&habit))),
        Err(err) => HabitActionResponse::failure(format!("habit_archive failed: {err}")),
    }
}

/// Deletes a habit with its completion history.
#[flutter_rust_bridge::frb(sync)]
pub fn habit_delete(user_id: String, habit_id: String) -> HabitActionResponse {
    let result = parse_habit_id(&habit_id).and_then(|id| {
        with_connection(|conn| {
            let service = habit_service(conn, user_id.trim())?;
            service.delete_habit(id).map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(()) => HabitActionResponse::success("Habit deleted.", None),
        Err(err) => HabitActionResponse::failure(format!("habit_delete failed: {err}")),
    }
}

/// Marks a habit done on `date` (ISO) and returns the updated streak.
///
/// A second call for the same day succeeds with `status = "duplicate"` and an
/// unchanged streak.
#[flutter_rust_bridge::frb(sync)]
pub fn completion_record(
    user_id: String,
    habit_id: String,
    date: String,
    mood: Option<String>,
    note: Option<String>,
) -> CompletionResponse {
    let mood = match mood.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => match HabitMood::parse(value) {
            Some(mood) => Some(mood),
            None => return CompletionResponse::failure(format!("unknown mood `{value}`")),
        },
        None => None,
    };

    let result = parse_habit_id(&habit_id).and_then(|id| {
        let date = parse_date_arg(&date)?;
        with_connection(|conn| {
            let service = completion_service(conn, user_id.trim())?;
            service
                .record_completion(id, date, mood, note)
                .map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(outcome) => {
            let (status, message) = match outcome.status {
                CompletionStatus::Recorded => ("recorded", "Completion recorded."),
                CompletionStatus::Duplicate => ("duplicate", "Already completed on that day."),
            };
            CompletionResponse {
                ok: true,
                status: status.to_string(),
                streak: Some(to_streak_item(&outcome.streak)),
                milestone: outcome.milestone,
                message: message.to_string(),
            }
        }
        Err(err) => CompletionResponse::failure(format!("completion_record failed: {err}")),
    }
}

/// Retracts the completion on `date` (ISO) and returns the rebuilt streak.
#[flutter_rust_bridge::frb(sync)]
pub fn completion_undo(user_id: String, habit_id: String, date: String) -> CompletionResponse {
    let result = parse_habit_id(&habit_id).and_then(|id| {
        let date = parse_date_arg(&date)?;
        with_connection(|conn| {
            let service = completion_service(conn, user_id.trim())?;
            service
                .undo_completion(id, date)
                .map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(streak) => CompletionResponse {
            ok: true,
            status: "undone".to_string(),
            streak: Some(to_streak_item(&streak)),
            milestone: false,
            message: "Completion removed.".to_string(),
        },
        Err(err) => CompletionResponse::failure(format!("completion_undo failed: {err}")),
    }
}

/// Lists recent completions of an owned habit, newest day first.
///
/// `limit=None` returns the last 30 days of entries; larger limits are clamped
/// to 366.
#[flutter_rust_bridge::frb(sync)]
pub fn completion_history(
    user_id: String,
    habit_id: String,
    limit: Option<u32>,
) -> CompletionHistoryResponse {
    let result = parse_habit_id(&habit_id).and_then(|id| {
        with_connection(|conn| {
            let service = completion_service(conn, user_id.trim())?;
            service.history(id, limit).map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(logs) => CompletionHistoryResponse {
            ok: true,
            message: format!("{} completion(s).", logs.len()),
            items: logs.iter().map(to_completion_item).collect(),
        },
        Err(err) => CompletionHistoryResponse {
            ok: false,
            items: Vec::new(),
            message: format!("completion_history failed: {err}"),
        },
    }
}

#[flutter_rust_bridge::frb(sync)]
pub fn streak_get(user_id: String, habit_id: String) -> StreakResponse {
    let result = parse_habit_id(&habit_id).and_then(|id| {
        with_connection(|conn| {
            let service = completion_service(conn, user_id.trim())?;
            service.streak(id).map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(streak) => StreakResponse {
            ok: true,
            streak: Some(to_streak_item(&streak)),
            message: String::new(),
        },
        Err(err) => StreakResponse {
            ok: false,
            streak: None,
            message: format!("streak_get failed: {err}"),
        },
    }
}

/// Highest current streak across the user's active habits.
///
/// `streak=None` with `ok=true` when the user has no active habit.
#[flutter_rust_bridge::frb(sync)]
pub fn streak_best(user_id: String) -> StreakResponse {
    let result = with_connection(|conn| {
        let service = completion_service(conn, user_id.trim())?;
        service.best_streak().map_err(|err| err.to_string())
    });
    match result {
        Ok(streak) => StreakResponse {
            ok: true,
            streak: streak.as_ref().map(to_streak_item),
            message: String::new(),
        },
        Err(err) => StreakResponse {
            ok: false,
            streak: None,
            message: format!("streak_best failed: {err}"),
        },
    }
}

/// Claims the next due batch of queued mutations.
///
/// `limit=None` or `0` uses the configured batch size; larger values are
/// clamped to it. Every returned item must be answered with
/// [`sync_report_outcome`]; unanswered claims return to the queue after the
/// stale timeout.
#[flutter_rust_bridge::frb(sync)]
pub fn sync_claim_batch(limit: Option<u32>) -> SyncBatchResponse {
    let mut config = active_sync_config();
    config.batch_size = match limit {
        Some(value) if value > 0 => value.min(config.batch_size),
        _ => config.batch_size,
    };

    let result = with_connection(|conn| {
        let queue = SqliteSyncQueueRepository::try_new(conn).map_err(|err| err.to_string())?;
        let (reset, batch) =
            claim_batch(&queue, &config, now_epoch_ms()).map_err(|err| err.to_string())?;
        let items = batch
            .iter()
            .map(to_sync_item)
            .collect::<Result<Vec<_>, String>>()?;
        Ok((reset, items))
    });
    match result {
        Ok((reset, items)) => SyncBatchResponse {
            ok: true,
            message: format!("Claimed {} operation(s).", items.len()),
            reset_stale: u32::try_from(reset).unwrap_or(u32::MAX),
            items,
        },
        Err(err) => SyncBatchResponse {
            ok: false,
            items: Vec::new(),
            reset_stale: 0,
            message: format!("sync_claim_batch failed: {err}"),
        },
    }
}

/// Reports the push result for one claimed operation.
///
/// Success: `http_status=None` (or 2xx). Failure: the HTTP status when one was
/// received, otherwise `None` with `success=false` for a network error, which
/// is retried.
#[flutter_rust_bridge::frb(sync)]
pub fn sync_report_outcome(
    op_id: i64,
    success: bool,
    http_status: Option<u16>,
    error_message: Option<String>,
) -> SyncOutcomeResponse {
    let outcome = if success {
        Ok(())
    } else {
        let message = error_message.unwrap_or_default();
        Err(match http_status {
            Some(status) => SyncTransportError::from_http_status(status, message),
            None => SyncTransportError::retryable("network", message),
        })
    };
    let config = active_sync_config();

    let result = with_connection(|conn| {
        let queue = SqliteSyncQueueRepository::try_new(conn).map_err(|err| err.to_string())?;
        let op = queue
            .get_operation(op_id)
            .map_err(|err| err.to_string())?
            .ok_or_else(|| format!("sync operation not found: {op_id}"))?;
        apply_outcome(&queue, &config, &op, outcome, now_epoch_ms()).map_err(|err| err.to_string())
    });
    match result {
        Ok(disposition) => {
            let (label, next_attempt_at) = match disposition {
                SyncDisposition::Completed => ("completed", None),
                SyncDisposition::Retried { next_attempt_at } => ("retried", Some(next_attempt_at)),
                SyncDisposition::Failed => ("failed", None),
                SyncDisposition::Conflict => ("conflict", None),
            };
            SyncOutcomeResponse {
                ok: true,
                disposition: label.to_string(),
                next_attempt_at,
                message: String::new(),
            }
        }
        Err(err) => SyncOutcomeResponse {
            ok: false,
            disposition: String::new(),
            next_attempt_at: None,
            message: format!("sync_report_outcome failed: {err}"),
        },
    }
}

/// Re-arms permanently failed operations; returns how many were re-queued.
#[flutter_rust_bridge::frb(sync)]
pub fn sync_retry_failed() -> SyncQueueStatsResponse {
    let result = with_connection(|conn| {
        let queue = SqliteSyncQueueRepository::try_new(conn).map_err(|err| err.to_string())?;
        queue
            .retry_failed(now_epoch_ms())
            .map_err(|err| err.to_string())?;
        queue_stats(&queue)
    });
    stats_response(result, "sync_retry_failed")
}

/// Counts queue entries per status.
#[flutter_rust_bridge::frb(sync)]
pub fn sync_queue_stats() -> SyncQueueStatsResponse {
    let result = with_connection(|conn| {
        let queue = SqliteSyncQueueRepository::try_new(conn).map_err(|err| err.to_string())?;
        queue_stats(&queue)
    });
    stats_response(result, "sync_queue_stats")
}

fn queue_stats(queue: &impl SyncQueueRepository) -> Result<[u64; 4], String> {
    let mut counts = [0u64; 4];
    for (slot, status) in counts.iter_mut().zip(SyncStatus::ALL) {
        *slot = queue
            .count_by_status(status)
            .map_err(|err| err.to_string())?;
    }
    Ok(counts)
}

fn stats_response(result: Result<[u64; 4], String>, call: &str) -> SyncQueueStatsResponse {
    match result {
        // Same order as `SyncStatus::ALL`.
        Ok([pending, in_progress, failed, completed]) => SyncQueueStatsResponse {
            ok: true,
            pending,
            in_progress,
            failed,
            completed,
            message: String::new(),
        },
        Err(err) => SyncQueueStatsResponse {
            ok: false,
            pending: 0,
            in_progress: 0,
            failed: 0,
            completed: 0,
            message: format!("{call} failed: {err}"),
        },
    }
}

fn resolve_db_path() -> PathBuf {
    DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(DB_FILE_NAME)
        })
        .clone()
}

fn active_sync_config() -> SyncConfig {
    *SYNC_CONFIG.get_or_init(SyncConfig::default)
}

fn with_connection<T>(f: impl FnOnce(&Connection) -> Result<T, String>) -> Result<T, String> {
    let db_path = resolve_db_path();
    let conn = open_db(&db_path).map_err(|err| {
        warn!("event=ffi_db_open module=ffi status=error error={err}");
        format!("DB open failed: {err}")
    })?;
    f(&conn)
}

fn habit_service<'conn>(
    conn: &'conn Connection,
    user_id: &str,
) -> Result<HabitService<SqliteHabitRepository<'conn>>, String> {
    if user_id.is_empty() {
        return Err("user_id cannot be empty".to_string());
    }
    let repo = SqliteHabitRepository::try_new(conn).map_err(|err| err.to_string())?;
    Ok(HabitService::new(repo, user_id))
}

fn completion_service<'conn>(
    conn: &'conn Connection,
    user_id: &str,
) -> Result<
    CompletionService<SqliteCompletionRepository<'conn>, SqliteHabitRepository<'conn>>,
    String,
> {
    if user_id.is_empty() {
        return Err("user_id cannot be empty".to_string());
    }
    let completions = SqliteCompletionRepository::try_new(conn).map_err(|err| err.to_string())?;
    let habits = SqliteHabitRepository::try_new(conn).map_err(|err| err.to_string())?;
    Ok(CompletionService::new(completions, habits, user_id))
}

fn parse_habit_id(value: &str) -> Result<HabitId, String> {
    HabitId::parse_str(value.trim()).map_err(|_| format!("invalid habit_id `{value}`"))
}

fn parse_date_arg(value: &str) -> Result<chrono::NaiveDate, String> {
    parse_iso_date(value).ok_or_else(|| format!("invalid date `{value}`; expected YYYY-MM-DD"))
}

fn parse_weekdays(values: &[String]) -> Result<Vec<Weekday>, String> {
    values
        .iter()
        .map(|value| {
            value
                .trim()
                .parse::<Weekday>()
                .map_err(|_| format!("invalid weekday `{value}`"))
        })
        .collect()
}

fn apply_frequency(
    habit: &mut Habit,
    frequency: &str,
    custom_days: &[String],
) -> Result<(), String> {
    match HabitFrequency::parse(frequency.trim()) {
        Some(HabitFrequency::Custom) => {
            let days = parse_weekdays(custom_days)?;
            *habit = habit.clone().with_custom_schedule(days);
        }
        Some(other) => {
            habit.frequency = other;
            habit.custom_schedule.clear();
        }
        None => return Err(format!("unknown frequency `{frequency}`")),
    }
    Ok(())
}

fn weekday_label(day: Weekday) -> String {
    day.to_string().to_ascii_lowercase()
}

fn to_habit_item(habit: &Habit) -> HabitItem {
    HabitItem {
        habit_id: habit.id.to_string(),
        title: habit.title.clone(),
        category: habit.category.as_str().to_string(),
        color: habit.color.clone(),
        icon: habit.icon.clone(),
        frequency: habit.frequency.as_str().to_string(),
        custom_days: habit.custom_schedule.iter().copied().map(weekday_label).collect(),
        is_archived: habit.is_archived,
        sync_state: habit.sync_state.as_str().to_string(),
    }
}

fn to_streak_item(streak: &HabitStreak) -> StreakItem {
    StreakItem {
        habit_id: streak.habit_id.to_string(),
        current_streak: streak.current_streak,
        longest_streak: streak.longest_streak,
        last_completed_date: streak.last_completed_date.map(format_iso_date),
        total_completions: streak.total_completions,
    }
}

fn to_completion_item(log: &HabitLog) -> CompletionItem {
    CompletionItem {
        log_id: log.id.to_string(),
        habit_id: log.habit_id.to_string(),
        completed_on: format_iso_date(log.completed_on),
        completed_at: log.completed_at,
        mood: log.mood.map(|mood| mood.as_str().to_string()),
        note: log.note.clone(),
    }
}

fn to_sync_item(op: &SyncOperation) -> Result<SyncOperationItem, String> {
    let request = SyncPushRequest::from_operation(op);
    let payload_json = serde_json::to_string(&request.payload).map_err(|err| err.to_string())?;
    Ok(SyncOperationItem {
        op_id: op.id,
        entity_type: op.entity_type.as_str().to_string(),
        entity_id: op.entity_id.clone(),
        method: request.http_method().to_string(),
        path: request.path(),
        payload_json,
        retry_count: op.retry_count,
    })
}
