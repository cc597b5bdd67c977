//! Flutter-facing bridge over `habitate_core`.

pub mod api;
