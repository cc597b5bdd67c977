use chrono::{NaiveDate, Weekday};
use habitate_core::{
    open_db_in_memory, CompletionRepository, Habit, HabitCategory, HabitFrequency,
    HabitListQuery, HabitRepository, HabitService, HabitServiceError, HabitValidationError,
    SqliteCompletionRepository, SqliteHabitRepository, SqliteSyncQueueRepository,
    SyncEntityType, SyncOperationKind, SyncQueueRepository, SyncState,
};

const USER: &str = "user-1";

fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

#[test]
fn create_initializes_zeroed_streak_and_queues_habit_create() {
    let conn = open_db_in_memory().unwrap();
    let service = HabitService::new(SqliteHabitRepository::try_new(&conn).unwrap(), USER);

    let habit = service
        .create_habit(Habit::new("someone-else", "  Meditate  ", HabitCategory::Mindfulness))
        .unwrap();
    assert_eq!(habit.user_id, USER);
    assert_eq!(habit.title, "Meditate");
    assert_eq!(habit.sync_state, SyncState::Pending);
    assert!(habit.created_at > 0);

    let completions = SqliteCompletionRepository::try_new(&conn).unwrap();
    let streak = completions.get_streak(habit.id).unwrap().unwrap();
    assert_eq!(streak.current_streak, 0);
    assert_eq!(streak.longest_streak, 0);
    assert_eq!(streak.total_completions, 0);
    assert_eq!(streak.last_completed_date, None);

    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();
    let ops = queue.list_operations(None, 10).unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].entity_type, SyncEntityType::Habit);
    assert_eq!(ops[0].operation, SyncOperationKind::Create);
    assert_eq!(ops[0].entity_id, habit.id.to_string());
    assert_eq!(ops[0].payload["title"], "Meditate");
}

#[test]
fn invalid_habit_is_rejected_without_side_effects() {
    let conn = open_db_in_memory().unwrap();
    let service = HabitService::new(SqliteHabitRepository::try_new(&conn).unwrap(), USER);

    let mut habit = Habit::new(USER, "Run", HabitCategory::Fitness);
    habit.color = "red".to_string();
    let err = service.create_habit(habit).unwrap_err();
    assert!(matches!(
        err,
        HabitServiceError::Validation(HabitValidationError::InvalidColor(_))
    ));

    let blank = service.create_habit(Habit::new(USER, "   ", HabitCategory::Fitness));
    assert!(matches!(
        blank,
        Err(HabitServiceError::Validation(HabitValidationError::EmptyTitle))
    ));

    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();
    assert!(queue.list_operations(None, 10).unwrap().is_empty());
}

#[test]
fn update_keeps_identity_and_queues_update() {
    let conn = open_db_in_memory().unwrap();
    let service = HabitService::new(SqliteHabitRepository::try_new(&conn).unwrap(), USER);
    let created = service
        .create_habit(Habit::new(USER, "Read", HabitCategory::Learning))
        .unwrap();

    let mut edited = created.clone().with_custom_schedule([Weekday::Fri, Weekday::Mon]);
    edited.title = "Read 20 pages".to_string();
    edited.reminder_time = Some("21:30".to_string());
    edited.reminder_enabled = true;
    edited.created_at = 1;
    let updated = service.update_habit(edited).unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);
    assert_eq!(updated.frequency, HabitFrequency::Custom);
    assert_eq!(updated.custom_schedule, vec![Weekday::Mon, Weekday::Fri]);
    assert_eq!(updated.reminder_time.as_deref(), Some("21:30"));

    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();
    let ops = queue.list_operations(None, 10).unwrap();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[1].operation, SyncOperationKind::Update);
}

#[test]
fn foreign_habits_are_forbidden() {
    let conn = open_db_in_memory().unwrap();
    let owner = HabitService::new(SqliteHabitRepository::try_new(&conn).unwrap(), USER);
    let habit = owner
        .create_habit(Habit::new(USER, "Journal", HabitCategory::Creativity))
        .unwrap();

    let intruder = HabitService::new(SqliteHabitRepository::try_new(&conn).unwrap(), "user-2");
    assert!(matches!(
        intruder.get_habit(habit.id),
        Err(HabitServiceError::Forbidden(id)) if id == habit.id
    ));
    assert!(matches!(
        intruder.delete_habit(habit.id),
        Err(HabitServiceError::Forbidden(_))
    ));
    assert!(intruder
        .list_habits(&HabitListQuery::default())
        .unwrap()
        .is_empty());

    let missing = owner.get_habit(uuid::Uuid::new_v4());
    assert!(matches!(missing, Err(HabitServiceError::HabitNotFound(_))));
}

#[test]
fn list_filters_archived_and_category() {
    let conn = open_db_in_memory().unwrap();
    let service = HabitService::new(SqliteHabitRepository::try_new(&conn).unwrap(), USER);
    let walk = service
        .create_habit(Habit::new(USER, "Walk", HabitCategory::Health))
        .unwrap();
    service
        .create_habit(Habit::new(USER, "Budget", HabitCategory::Finance))
        .unwrap();

    let archived = service.archive_habit(walk.id).unwrap();
    assert!(archived.is_archived);
    // Archiving twice is a no-op.
    assert!(service.archive_habit(walk.id).unwrap().is_archived);

    let active = service.list_habits(&HabitListQuery::default()).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].title, "Budget");

    let all = service
        .list_habits(&HabitListQuery {
            include_archived: true,
            ..HabitListQuery::default()
        })
        .unwrap();
    assert_eq!(all.len(), 2);

    let health = service
        .list_habits(&HabitListQuery {
            category: Some(HabitCategory::Health),
            include_archived: true,
            ..HabitListQuery::default()
        })
        .unwrap();
    assert_eq!(health.len(), 1);
    assert_eq!(health[0].id, walk.id);

    let paged = service
        .list_habits(&HabitListQuery {
            include_archived: true,
            limit: Some(1),
            offset: 1,
            ..HabitListQuery::default()
        })
        .unwrap();
    assert_eq!(paged.len(), 1);
}

#[test]
fn delete_cascades_and_queues_three_deletes() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteHabitRepository::try_new(&conn).unwrap();
    let service = HabitService::new(repo, USER);
    let habit = service
        .create_habit(Habit::new(USER, "Floss", HabitCategory::Health))
        .unwrap();

    let completions = SqliteCompletionRepository::try_new(&conn).unwrap();
    let log = habitate_core::HabitLog::new(habit.id, USER, date("2026-02-01"), 1);
    completions.record_completion(&log, 1).unwrap();

    service.delete_habit(habit.id).unwrap();

    let log_rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM habit_logs;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(log_rows, 0);
    assert!(completions.get_streak(habit.id).unwrap().is_none());

    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();
    let deletes: Vec<SyncEntityType> = queue
        .list_operations(None, 20)
        .unwrap()
        .into_iter()
        .filter(|op| op.operation == SyncOperationKind::Delete)
        .map(|op| op.entity_type)
        .collect();
    assert_eq!(
        deletes,
        vec![
            SyncEntityType::Habit,
            SyncEntityType::HabitLog,
            SyncEntityType::HabitStreak
        ]
    );

    assert!(matches!(
        service.delete_habit(habit.id),
        Err(HabitServiceError::HabitNotFound(_))
    ));
}

#[test]
fn due_list_respects_frequency() {
    let conn = open_db_in_memory().unwrap();
    let service = HabitService::new(SqliteHabitRepository::try_new(&conn).unwrap(), USER);
    let completions = SqliteCompletionRepository::try_new(&conn).unwrap();

    let daily = service
        .create_habit(Habit::new(USER, "Water", HabitCategory::Health))
        .unwrap();
    let mut weekly = Habit::new(USER, "Review week", HabitCategory::Productivity);
    weekly.frequency = HabitFrequency::Weekly;
    let weekly = service.create_habit(weekly).unwrap();
    let gym = service
        .create_habit(
            Habit::new(USER, "Gym", HabitCategory::Fitness)
                .with_custom_schedule([Weekday::Mon, Weekday::Wed]),
        )
        .unwrap();

    // 2026-03-02 is a Monday, 2026-03-03 a Tuesday.
    let monday = date("2026-03-02");
    let tuesday = date("2026-03-03");

    let due_ids = |day| -> Vec<uuid::Uuid> {
        service
            .list_due_on(&completions, day)
            .unwrap()
            .into_iter()
            .map(|habit| habit.id)
            .collect()
    };

    let due = due_ids(monday);
    assert!(due.contains(&daily.id));
    assert!(due.contains(&weekly.id));
    assert!(due.contains(&gym.id));

    let due = due_ids(tuesday);
    assert!(!due.contains(&gym.id));

    completions
        .record_completion(
            &habitate_core::HabitLog::new(weekly.id, USER, monday, 1),
            1,
        )
        .unwrap();
    completions
        .record_completion(&habitate_core::HabitLog::new(daily.id, USER, tuesday, 2), 2)
        .unwrap();

    let due = due_ids(tuesday);
    assert!(!due.contains(&weekly.id), "weekly habit satisfied this ISO week");
    assert!(!due.contains(&daily.id), "daily habit already done today");

    // Next Monday starts a new ISO week.
    let due = due_ids(date("2026-03-09"));
    assert!(due.contains(&weekly.id));
}

#[test]
fn list_by_sync_state_reports_pending_rows() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteHabitRepository::try_new(&conn).unwrap();
    let service = HabitService::new(SqliteHabitRepository::try_new(&conn).unwrap(), USER);
    service
        .create_habit(Habit::new(USER, "Stretch", HabitCategory::Fitness))
        .unwrap();

    assert_eq!(repo.list_by_sync_state(SyncState::Pending, 10).unwrap().len(), 1);
    assert!(repo.list_by_sync_state(SyncState::Synced, 10).unwrap().is_empty());
}
