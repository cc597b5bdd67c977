//! Habit domain model.
//!
//! # Responsibility
//! - Define the canonical habit record and its scheduling vocabulary.
//! - Validate user-editable fields before they reach storage.
//!
//! # Invariants
//! - `id` is stable and never reused for another habit.
//! - `custom_schedule` is non-empty iff `frequency == HabitFrequency::Custom`.
//! - `color` is always a `#RRGGBB` hex string.
//! - Archived habits are never due.

use crate::model::sync::SyncState;
use chrono::{Datelike, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid hex color regex"));
static REMINDER_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").expect("valid reminder regex"));

const TITLE_MAX_CHARS: usize = 120;

/// Stable identifier for a habit.
pub type HabitId = Uuid;

/// Grouping used for organization and per-category defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitCategory {
    Health,
    Fitness,
    Mindfulness,
    Productivity,
    Learning,
    Social,
    Creativity,
    Finance,
    Other,
}

impl HabitCategory {
    pub const ALL: [HabitCategory; 9] = [
        Self::Health,
        Self::Fitness,
        Self::Mindfulness,
        Self::Productivity,
        Self::Learning,
        Self::Social,
        Self::Creativity,
        Self::Finance,
        Self::Other,
    ];

    /// Storage/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Fitness => "fitness",
            Self::Mindfulness => "mindfulness",
            Self::Productivity => "productivity",
            Self::Learning => "learning",
            Self::Social => "social",
            Self::Creativity => "creativity",
            Self::Finance => "finance",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Health => "Health",
            Self::Fitness => "Fitness",
            Self::Mindfulness => "Mindfulness",
            Self::Productivity => "Productivity",
            Self::Learning => "Learning",
            Self::Social => "Social",
            Self::Creativity => "Creativity",
            Self::Finance => "Finance",
            Self::Other => "Other",
        }
    }

    /// Color applied when the user does not pick one.
    pub fn default_color(self) -> &'static str {
        match self {
            Self::Health => "#10B981",
            Self::Fitness => "#F59E0B",
            Self::Mindfulness => "#8B5CF6",
            Self::Productivity => "#3B82F6",
            Self::Learning => "#EC4899",
            Self::Social => "#14B8A6",
            Self::Creativity => "#F97316",
            Self::Finance => "#22C55E",
            Self::Other => "#6B7280",
        }
    }
}

/// How often a habit is expected to be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitFrequency {
    /// Every calendar day.
    Daily,
    /// Once per ISO week.
    Weekly,
    /// On the weekdays listed in `Habit::custom_schedule`.
    Custom,
}

impl HabitFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Daily => "Every day",
            Self::Weekly => "Once a week",
            Self::Custom => "Custom schedule",
        }
    }
}

/// Validation failures for user-editable habit fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HabitValidationError {
    EmptyTitle,
    TitleTooLong { max_chars: usize },
    InvalidColor(String),
    InvalidReminderTime(String),
    MissingCustomSchedule,
    UnexpectedCustomSchedule(HabitFrequency),
    EmptyUserId,
}

impl Display for HabitValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "habit title cannot be empty"),
            Self::TitleTooLong { max_chars } => {
                write!(f, "habit title exceeds {max_chars} characters")
            }
            Self::InvalidColor(value) => {
                write!(f, "habit color `{value}` is not a #RRGGBB hex value")
            }
            Self::InvalidReminderTime(value) => {
                write!(f, "reminder time `{value}` is not a HH:MM value")
            }
            Self::MissingCustomSchedule => {
                write!(f, "custom frequency requires at least one scheduled weekday")
            }
            Self::UnexpectedCustomSchedule(frequency) => write!(
                f,
                "custom schedule is only allowed for custom frequency, got `{}`",
                frequency.as_str()
            ),
            Self::EmptyUserId => write!(f, "habit user_id cannot be empty"),
        }
    }
}

impl Error for HabitValidationError {}

/// Canonical habit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    /// Owning account; every service call is scoped to it.
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: HabitCategory,
    /// `#RRGGBB`.
    pub color: String,
    /// Icon resource name or emoji.
    pub icon: String,
    pub frequency: HabitFrequency,
    /// Weekdays for `HabitFrequency::Custom`; empty otherwise.
    pub custom_schedule: Vec<Weekday>,
    /// Local wall-clock `HH:MM`.
    pub reminder_time: Option<String>,
    pub reminder_enabled: bool,
    pub is_archived: bool,
    pub sync_state: SyncState,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

impl Habit {
    /// Creates a daily habit with category defaults and a generated ID.
    ///
    /// Timestamps start at zero; repositories stamp them on insert.
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        category: HabitCategory,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), user_id, title, category)
    }

    /// Creates a habit with a caller-provided stable ID.
    ///
    /// Used by import/sync paths where identity already exists remotely.
    pub fn with_id(
        id: HabitId,
        user_id: impl Into<String>,
        title: impl Into<String>,
        category: HabitCategory,
    ) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            title: title.into(),
            description: None,
            category,
            color: category.default_color().to_string(),
            icon: "check".to_string(),
            frequency: HabitFrequency::Daily,
            custom_schedule: Vec::new(),
            reminder_time: None,
            reminder_enabled: false,
            is_archived: false,
            sync_state: SyncState::Pending,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Switches to a custom weekday schedule.
    pub fn with_custom_schedule(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.frequency = HabitFrequency::Custom;
        self.custom_schedule = normalize_schedule(days);
        self
    }

    /// Checks user-editable fields.
    pub fn validate(&self) -> Result<(), HabitValidationError> {
        if self.user_id.trim().is_empty() {
            return Err(HabitValidationError::EmptyUserId);
        }
        let title = self.title.trim();
        if title.is_empty() {
            return Err(HabitValidationError::EmptyTitle);
        }
        if title.chars().count() > TITLE_MAX_CHARS {
            return Err(HabitValidationError::TitleTooLong {
                max_chars: TITLE_MAX_CHARS,
            });
        }
        if !HEX_COLOR_RE.is_match(&self.color) {
            return Err(HabitValidationError::InvalidColor(self.color.clone()));
        }
        if let Some(time) = self.reminder_time.as_deref() {
            if !REMINDER_TIME_RE.is_match(time) {
                return Err(HabitValidationError::InvalidReminderTime(time.to_string()));
            }
        }
        match self.frequency {
            HabitFrequency::Custom if self.custom_schedule.is_empty() => {
                Err(HabitValidationError::MissingCustomSchedule)
            }
            HabitFrequency::Daily | HabitFrequency::Weekly
                if !self.custom_schedule.is_empty() =>
            {
                Err(HabitValidationError::UnexpectedCustomSchedule(
                    self.frequency,
                ))
            }
            _ => Ok(()),
        }
    }

    /// Returns whether the habit expects a completion on `date`.
    ///
    /// `completed_dates` are the habit's logged days; only weekly habits
    /// consult them (one completion per ISO week satisfies the week).
    pub fn is_due_on(&self, date: NaiveDate, completed_dates: &[NaiveDate]) -> bool {
        if self.is_archived {
            return false;
        }
        match self.frequency {
            HabitFrequency::Daily => true,
            HabitFrequency::Custom => self.custom_schedule.contains(&date.weekday()),
            HabitFrequency::Weekly => {
                let week = date.iso_week();
                !completed_dates
                    .iter()
                    .any(|completed| completed.iso_week() == week)
            }
        }
    }
}

/// Sorts weekdays Monday-first and removes duplicates.
pub fn normalize_schedule(days: impl IntoIterator<Item = Weekday>) -> Vec<Weekday> {
    let mut days: Vec<Weekday> = days.into_iter().collect();
    days.sort_by_key(|day| day.num_days_from_monday());
    days.dedup();
    days
}

/// Encodes a schedule as comma-separated three-letter weekday names.
pub fn schedule_to_db(days: &[Weekday]) -> Option<String> {
    if days.is_empty() {
        return None;
    }
    Some(
        days.iter()
            .map(|day| weekday_label(*day))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Decodes a schedule produced by [`schedule_to_db`].
pub fn schedule_from_db(value: Option<&str>) -> Option<Vec<Weekday>> {
    let Some(raw) = value else {
        return Some(Vec::new());
    };
    let mut days = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        days.push(part.parse::<Weekday>().ok()?);
    }
    Some(normalize_schedule(days))
}

fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

#[cfg(test)]
mod tests {
    use super::{
        schedule_from_db, schedule_to_db, Habit, HabitCategory, HabitFrequency,
        HabitValidationError,
    };
    use chrono::{NaiveDate, Weekday};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn new_habit_uses_category_color_and_validates() {
        let habit = Habit::new("user-1", "Drink water", HabitCategory::Health);
        assert_eq!(habit.color, "#10B981");
        assert_eq!(habit.frequency, HabitFrequency::Daily);
        habit.validate().expect("default habit should validate");
    }

    #[test]
    fn validate_rejects_blank_title_and_bad_color() {
        let mut habit = Habit::new("user-1", "   ", HabitCategory::Other);
        assert_eq!(habit.validate(), Err(HabitValidationError::EmptyTitle));

        habit.title = "Read".to_string();
        habit.color = "blue".to_string();
        assert!(matches!(
            habit.validate(),
            Err(HabitValidationError::InvalidColor(_))
        ));
    }

    #[test]
    fn validate_checks_schedule_against_frequency() {
        let mut habit = Habit::new("user-1", "Gym", HabitCategory::Fitness);
        habit.frequency = HabitFrequency::Custom;
        assert_eq!(
            habit.validate(),
            Err(HabitValidationError::MissingCustomSchedule)
        );

        habit.frequency = HabitFrequency::Weekly;
        habit.custom_schedule = vec![Weekday::Mon];
        assert!(matches!(
            habit.validate(),
            Err(HabitValidationError::UnexpectedCustomSchedule(
                HabitFrequency::Weekly
            ))
        ));
    }

    #[test]
    fn validate_rejects_malformed_reminder_time() {
        let mut habit = Habit::new("user-1", "Meditate", HabitCategory::Mindfulness);
        habit.reminder_time = Some("25:00".to_string());
        assert!(matches!(
            habit.validate(),
            Err(HabitValidationError::InvalidReminderTime(_))
        ));
        habit.reminder_time = Some("07:30".to_string());
        assert!(habit.validate().is_ok());
    }

    #[test]
    fn custom_habit_is_due_only_on_scheduled_weekdays() {
        let habit = Habit::new("user-1", "Gym", HabitCategory::Fitness)
            .with_custom_schedule([Weekday::Wed, Weekday::Mon, Weekday::Mon]);
        assert_eq!(habit.custom_schedule, vec![Weekday::Mon, Weekday::Wed]);

        // 2026-01-05 is a Monday.
        assert!(habit.is_due_on(date(2026, 1, 5), &[]));
        assert!(!habit.is_due_on(date(2026, 1, 6), &[]));
        assert!(habit.is_due_on(date(2026, 1, 7), &[]));
    }

    #[test]
    fn weekly_habit_is_satisfied_by_any_completion_in_the_iso_week() {
        let mut habit = Habit::new("user-1", "Call family", HabitCategory::Social);
        habit.frequency = HabitFrequency::Weekly;

        let monday = date(2026, 1, 5);
        let friday = date(2026, 1, 9);
        let next_monday = date(2026, 1, 12);
        assert!(habit.is_due_on(friday, &[]));
        assert!(!habit.is_due_on(friday, &[monday]));
        assert!(habit.is_due_on(next_monday, &[monday]));
    }

    #[test]
    fn archived_habit_is_never_due() {
        let mut habit = Habit::new("user-1", "Stretch", HabitCategory::Health);
        habit.is_archived = true;
        assert!(!habit.is_due_on(date(2026, 1, 5), &[]));
    }

    #[test]
    fn schedule_db_encoding_is_reversible_and_rejects_garbage() {
        let days = [Weekday::Sun, Weekday::Tue];
        let encoded = schedule_to_db(&days).expect("non-empty schedule");
        assert_eq!(encoded, "tue,sun");
        assert_eq!(
            schedule_from_db(Some(encoded.as_str())),
            Some(vec![Weekday::Tue, Weekday::Sun])
        );
        assert_eq!(schedule_from_db(None), Some(Vec::new()));
        assert_eq!(schedule_from_db(Some("mon,someday")), None);
    }
}
