//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `habitate_core` linkage.
//! - Run one streak scenario against an in-memory database and print it.

use chrono::{Days, NaiveDate};
use habitate_core::{
    open_db_in_memory, CompletionService, Habit, HabitCategory, HabitService,
    SqliteCompletionRepository, SqliteHabitRepository,
};
use std::error::Error;
use std::process::ExitCode;

const SMOKE_USER: &str = "cli-smoke";

fn main() -> ExitCode {
    println!("habitate_core ping={}", habitate_core::ping());
    println!("habitate_core version={}", habitate_core::core_version());

    match run_streak_smoke() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("habitate_core smoke failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_streak_smoke() -> Result<(), Box<dyn Error>> {
    let conn = open_db_in_memory()?;
    let habits = HabitService::new(SqliteHabitRepository::try_new(&conn)?, SMOKE_USER);
    let habit = habits.create_habit(Habit::new(SMOKE_USER, "Drink water", HabitCategory::Health))?;

    let completions = CompletionService::new(
        SqliteCompletionRepository::try_new(&conn)?,
        SqliteHabitRepository::try_new(&conn)?,
        SMOKE_USER,
    );
    let start = NaiveDate::from_ymd_opt(2026, 1, 1).ok_or("invalid start date")?;
    for offset in 0..3 {
        let date = start
            .checked_add_days(Days::new(offset))
            .ok_or("date out of range")?;
        completions.record_completion(habit.id, date, None, None)?;
    }

    let streak = completions.streak(habit.id)?;
    println!(
        "habitate_core streak current={} longest={} total={}",
        streak.current_streak, streak.longest_streak, streak.total_completions
    );
    Ok(())
}
