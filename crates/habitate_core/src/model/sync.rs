//! Sync vocabulary shared by row flags and the outbound queue.
//!
//! # Invariants
//! - `SyncState` belongs to a domain row; `SyncStatus` belongs to a queued
//!   operation. They are never stored in each other's columns.
//! - `SyncStatus::Completed` and `SyncStatus::Failed` are terminal.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Whether a local row has propagated to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    Synced,
    Failed,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "synced" => Some(Self::Synced),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Lifecycle of one queued remote mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Ready for first attempt or a scheduled retry.
    Pending,
    /// Claimed by a running sync pass.
    InProgress,
    /// Permanently failed (conflict, non-retryable error, or retries exhausted).
    Failed,
    /// Acknowledged by the backend.
    Completed,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 4] = [
        Self::Pending,
        Self::InProgress,
        Self::Failed,
        Self::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Completed)
    }
}

/// Remote mutation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperationKind {
    Create,
    Update,
    Delete,
}

impl SyncOperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Entity families that travel through the sync queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntityType {
    Habit,
    HabitLog,
    HabitStreak,
}

impl SyncEntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Habit => "habit",
            Self::HabitLog => "habit_log",
            Self::HabitStreak => "habit_streak",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "habit" => Some(Self::Habit),
            "habit_log" => Some(Self::HabitLog),
            "habit_streak" => Some(Self::HabitStreak),
            _ => None,
        }
    }

    /// Remote REST collection for this entity family.
    pub fn resource(self) -> &'static str {
        match self {
            Self::Habit => "habits",
            Self::HabitLog => "habit-logs",
            Self::HabitStreak => "habit-streaks",
        }
    }
}

/// Row id of a queued operation.
pub type SyncOperationId = i64;

/// One queued remote mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: SyncOperationId,
    pub entity_type: SyncEntityType,
    pub entity_id: String,
    pub operation: SyncOperationKind,
    /// JSON body captured at enqueue time.
    pub payload: serde_json::Value,
    pub status: SyncStatus,
    pub retry_count: u32,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    pub last_attempt_at: Option<i64>,
    /// Earliest time a `Pending` operation may be claimed.
    pub next_attempt_at: i64,
    pub last_error: Option<String>,
}

impl Display for SyncOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {} {} {}",
            self.id,
            self.operation.as_str(),
            self.entity_type.as_str(),
            self.entity_id
        )
    }
}

/// Insert shape for [`SyncOperation`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncOperation {
    pub entity_type: SyncEntityType,
    pub entity_id: String,
    pub operation: SyncOperationKind,
    pub payload: serde_json::Value,
}

impl NewSyncOperation {
    pub fn new(
        entity_type: SyncEntityType,
        entity_id: impl Into<String>,
        operation: SyncOperationKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            operation,
            payload,
        }
    }
}
