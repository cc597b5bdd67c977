//! Core domain logic for Habitate.
//! Habits, completion logs, streaks, and the outbound sync queue live here;
//! the FFI and CLI crates are thin shells over this crate.

pub mod clock;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sync;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError, LoggingStatus};
pub use model::completion::{HabitLog, HabitLogId, HabitMood};
pub use model::habit::{Habit, HabitCategory, HabitFrequency, HabitId, HabitValidationError};
pub use model::streak::{is_milestone, HabitStreak, MILESTONE_INTERVAL_DAYS};
pub use model::sync::{
    NewSyncOperation, SyncEntityType, SyncOperation, SyncOperationId, SyncOperationKind,
    SyncState, SyncStatus,
};
pub use repo::completion_repo::{
    CompletionRepository, CompletionStatus, RecordedCompletion, SqliteCompletionRepository,
};
pub use repo::habit_repo::{HabitListQuery, HabitRepository, SqliteHabitRepository};
pub use repo::sync_queue_repo::{SqliteSyncQueueRepository, SyncQueueRepository};
pub use repo::{RepoError, RepoResult};
pub use service::completion_service::{
    CompletionOutcome, CompletionService, CompletionServiceError,
};
pub use service::habit_service::{HabitService, HabitServiceError};
pub use service::sync_service::{
    SyncDisposition, SyncRunReport, SyncService, SyncServiceError,
};
pub use sync::config::{SyncConfig, SyncConfigError};
pub use sync::transport::{SyncPushRequest, SyncTransport, SyncTransportError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
