//! Use-case services over the repository layer.
//!
//! # Responsibility
//! - Scope repository calls to one signed-in user.
//! - Own the clock: services stamp times, repositories only store them.
//! - Keep FFI/CLI layers decoupled from storage details.

pub mod completion_service;
pub mod habit_service;
pub mod sync_service;
