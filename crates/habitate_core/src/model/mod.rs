//! Domain model for habits, completions, streaks, and sync bookkeeping.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep pure state transitions (streaks, schedules) free of storage.
//!
//! # Invariants
//! - Every habit is identified by a stable `HabitId`.
//! - Completion days are calendar dates; wall-clock time never drives streaks.

pub mod completion;
pub mod habit;
pub mod streak;
pub mod sync;
