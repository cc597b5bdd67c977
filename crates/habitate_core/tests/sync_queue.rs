use habitate_core::{
    open_db_in_memory, CompletionService, Habit, HabitCategory, HabitRepository, HabitService,
    NewSyncOperation, RepoError, SqliteCompletionRepository, SqliteHabitRepository,
    SqliteSyncQueueRepository, SyncConfig, SyncDisposition, SyncEntityType, SyncOperationKind,
    SyncPushRequest, SyncQueueRepository, SyncService, SyncServiceError, SyncState, SyncStatus,
    SyncTransport, SyncTransportError,
};
use rusqlite::Connection;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

const USER: &str = "user-1";

/// Replays scripted outcomes and records every request it receives.
struct ScriptedTransport {
    outcomes: RefCell<VecDeque<Result<(), SyncTransportError>>>,
    pushed: RefCell<Vec<SyncPushRequest>>,
}

impl ScriptedTransport {
    fn new(outcomes: Vec<Result<(), SyncTransportError>>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            pushed: RefCell::new(Vec::new()),
        }
    }

    fn always_ok() -> Self {
        Self::new(Vec::new())
    }
}

impl SyncTransport for ScriptedTransport {
    fn transport_id(&self) -> &str {
        "scripted"
    }

    fn push(&self, request: &SyncPushRequest) -> Result<(), SyncTransportError> {
        self.pushed.borrow_mut().push(request.clone());
        self.outcomes.borrow_mut().pop_front().unwrap_or(Ok(()))
    }
}

fn habit_op(entity_id: &str) -> NewSyncOperation {
    NewSyncOperation::new(
        SyncEntityType::Habit,
        entity_id,
        SyncOperationKind::Update,
        json!({ "id": entity_id }),
    )
}

fn create_habit(conn: &Connection) -> Habit {
    HabitService::new(SqliteHabitRepository::try_new(conn).unwrap(), USER)
        .create_habit(Habit::new(USER, "Sleep early", HabitCategory::Health))
        .unwrap()
}

fn habit_sync_state(conn: &Connection, habit: &Habit) -> SyncState {
    SqliteHabitRepository::try_new(conn)
        .unwrap()
        .get_habit(habit.id)
        .unwrap()
        .unwrap()
        .sync_state
}

#[test]
fn claim_is_fifo_and_skips_future_rows() {
    let conn = open_db_in_memory().unwrap();
    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();

    let first = queue.enqueue(&habit_op("a"), 100).unwrap();
    let second = queue.enqueue(&habit_op("b"), 100).unwrap();
    let third = queue.enqueue(&habit_op("c"), 50).unwrap();
    let future = queue.enqueue(&habit_op("d"), 10_000).unwrap();

    let claimed = queue.claim_due(1_000, 10).unwrap();
    let ids: Vec<i64> = claimed.iter().map(|op| op.id).collect();
    assert_eq!(ids, vec![third, first, second]);
    assert!(claimed
        .iter()
        .all(|op| op.status == SyncStatus::InProgress && op.last_attempt_at == Some(1_000)));

    // Claimed rows are not handed out twice.
    assert!(queue.claim_due(1_000, 10).unwrap().is_empty());
    assert_eq!(queue.claim_due(10_000, 10).unwrap()[0].id, future);
}

#[test]
fn claim_respects_limit() {
    let conn = open_db_in_memory().unwrap();
    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();
    for index in 0..5 {
        queue.enqueue(&habit_op(&format!("h{index}")), index).unwrap();
    }
    assert_eq!(queue.claim_due(100, 2).unwrap().len(), 2);
    assert_eq!(queue.count_by_status(SyncStatus::Pending).unwrap(), 3);
    assert_eq!(queue.count_by_status(SyncStatus::InProgress).unwrap(), 2);
}

#[test]
fn only_claimed_operations_can_be_settled() {
    let conn = open_db_in_memory().unwrap();
    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();
    let id = queue.enqueue(&habit_op("a"), 0).unwrap();

    assert!(matches!(
        queue.mark_completed(id),
        Err(RepoError::InvalidState(_))
    ));
    assert!(matches!(
        queue.mark_failed(i64::MAX, "boom"),
        Err(RepoError::NotFound { .. })
    ));
}

#[test]
fn successful_run_completes_and_marks_rows_synced() {
    let conn = open_db_in_memory().unwrap();
    let habit = create_habit(&conn);
    let completions = CompletionService::new(
        SqliteCompletionRepository::try_new(&conn).unwrap(),
        SqliteHabitRepository::try_new(&conn).unwrap(),
        USER,
    );
    let date = chrono::NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
    let outcome = completions.record_completion(habit.id, date, None, None).unwrap();

    let transport = ScriptedTransport::always_ok();
    let service = SyncService::new(
        SqliteSyncQueueRepository::try_new(&conn).unwrap(),
        &transport,
        SyncConfig::default(),
    )
    .unwrap();
    let report = service.run_once().unwrap();

    assert_eq!(report.claimed, 2);
    assert_eq!(report.completed, 2);
    assert!(!report.has_errors());

    let pushed = transport.pushed.borrow();
    assert_eq!(pushed[0].resource, "habits");
    assert_eq!(pushed[0].http_method(), "POST");
    assert_eq!(pushed[1].resource, "habit-logs");
    assert_eq!(pushed[1].entity_id, outcome.log.id.to_string());

    assert_eq!(habit_sync_state(&conn, &habit), SyncState::Synced);
    let log_state: String = conn
        .query_row(
            "SELECT sync_state FROM habit_logs WHERE id = ?1;",
            [outcome.log.id.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(log_state, "synced");
}

#[test]
fn row_stays_pending_while_a_newer_operation_is_queued() {
    let conn = open_db_in_memory().unwrap();
    let habit = create_habit(&conn);
    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();

    let claimed = queue.claim_due(i64::MAX, 10).unwrap();
    queue
        .enqueue(&habit_op(&habit.id.to_string()), 0)
        .unwrap();
    queue.mark_completed(claimed[0].id).unwrap();

    assert_eq!(habit_sync_state(&conn, &habit), SyncState::Pending);
}

#[test]
fn retryable_failure_backs_off_exponentially() {
    let conn = open_db_in_memory().unwrap();
    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();
    let id = queue.enqueue(&habit_op("a"), 0).unwrap();

    let transport = ScriptedTransport::new(vec![
        Err(SyncTransportError::retryable("offline", "no network")),
        Err(SyncTransportError::from_http_status(503, "unavailable")),
    ]);
    let service = SyncService::new(
        SqliteSyncQueueRepository::try_new(&conn).unwrap(),
        &transport,
        SyncConfig::default(),
    )
    .unwrap();

    let report = service.run_once_at(10_000).unwrap();
    assert_eq!(report.retried, 1);
    assert!(report.has_errors());
    let op = queue.get_operation(id).unwrap().unwrap();
    assert_eq!(op.status, SyncStatus::Pending);
    assert_eq!(op.retry_count, 1);
    assert_eq!(op.next_attempt_at, 11_000);
    assert!(op.last_error.unwrap().contains("offline"));

    // Not due yet.
    assert_eq!(service.run_once_at(10_500).unwrap().claimed, 0);

    service.run_once_at(11_000).unwrap();
    let op = queue.get_operation(id).unwrap().unwrap();
    assert_eq!(op.retry_count, 2);
    assert_eq!(op.next_attempt_at, 11_000 + 2_000);
}

#[test]
fn exhausted_retries_fail_the_operation_and_flag_the_row() {
    let conn = open_db_in_memory().unwrap();
    let habit = create_habit(&conn);
    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();
    let config = SyncConfig {
        max_retries: 2,
        ..SyncConfig::default()
    };
    let transport = ScriptedTransport::new(
        (0..3)
            .map(|_| Err(SyncTransportError::retryable("timeout", "slow")))
            .collect(),
    );
    let service = SyncService::new(
        SqliteSyncQueueRepository::try_new(&conn).unwrap(),
        &transport,
        config,
    )
    .unwrap();

    let mut now = 0;
    let mut dispositions = Vec::new();
    for _ in 0..3 {
        now += 60 * 60 * 1_000;
        let report = service.run_once_at(now).unwrap();
        dispositions.push((report.retried, report.failed));
    }
    assert_eq!(dispositions, vec![(1, 0), (1, 0), (0, 1)]);
    assert_eq!(queue.count_by_status(SyncStatus::Failed).unwrap(), 1);
    assert_eq!(habit_sync_state(&conn, &habit), SyncState::Failed);
}

#[test]
fn conflict_fails_immediately_and_server_wins() {
    let conn = open_db_in_memory().unwrap();
    let habit = create_habit(&conn);
    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();
    let transport = ScriptedTransport::new(vec![Err(SyncTransportError::from_http_status(
        409,
        "remote is newer",
    ))]);
    let service = SyncService::new(
        SqliteSyncQueueRepository::try_new(&conn).unwrap(),
        &transport,
        SyncConfig::default(),
    )
    .unwrap();

    let report = service.run_once().unwrap();
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.retried, 0);

    let failed = queue.list_operations(Some(SyncStatus::Failed), 10).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].retry_count, 0);
    assert!(failed[0].last_error.as_deref().unwrap().starts_with("conflict"));
    assert_eq!(habit_sync_state(&conn, &habit), SyncState::Failed);

    // Failed is terminal until the user re-arms it.
    assert_eq!(service.run_once().unwrap().claimed, 0);
    assert_eq!(service.retry_failed().unwrap(), 1);
    assert_eq!(habit_sync_state(&conn, &habit), SyncState::Pending);
    assert_eq!(service.pending_count().unwrap(), 1);

    let report = service.run_once().unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(habit_sync_state(&conn, &habit), SyncState::Synced);
}

#[test]
fn permanent_error_is_not_retried() {
    let conn = open_db_in_memory().unwrap();
    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();
    let id = queue.enqueue(&habit_op("a"), 0).unwrap();
    let op = queue.claim_due(0, 1).unwrap().remove(0);

    let service = SyncService::new(
        SqliteSyncQueueRepository::try_new(&conn).unwrap(),
        ScriptedTransport::always_ok(),
        SyncConfig::default(),
    )
    .unwrap();
    let disposition = service
        .report_outcome(
            &op,
            Err(SyncTransportError::from_http_status(400, "bad payload")),
            5,
        )
        .unwrap();
    assert_eq!(disposition, SyncDisposition::Failed);
    assert_eq!(
        queue.get_operation(id).unwrap().unwrap().status,
        SyncStatus::Failed
    );
}

#[test]
fn stale_claims_are_returned_to_the_queue() {
    let conn = open_db_in_memory().unwrap();
    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();
    let id = queue.enqueue(&habit_op("a"), 0).unwrap();
    queue.claim_due(1_000, 10).unwrap();

    let transport = ScriptedTransport::always_ok();
    let service = SyncService::new(
        SqliteSyncQueueRepository::try_new(&conn).unwrap(),
        &transport,
        SyncConfig::default(),
    )
    .unwrap();

    // Within the stale window the claim is left alone.
    let report = service.run_once_at(1_000 + 60_000).unwrap();
    assert_eq!(report.reset_stale, 0);
    assert_eq!(report.claimed, 0);

    let report = service.run_once_at(1_000 + 5 * 60 * 1_000 + 1).unwrap();
    assert_eq!(report.reset_stale, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(
        queue.get_operation(id).unwrap().unwrap().status,
        SyncStatus::Completed
    );
}

/// Pushes successfully but lets another claimer reset every claim on the first push.
struct ReclaimingTransport<'conn> {
    other_claimer: SqliteSyncQueueRepository<'conn>,
    reclaimed: Cell<bool>,
    pushed: RefCell<Vec<String>>,
}

impl SyncTransport for ReclaimingTransport<'_> {
    fn transport_id(&self) -> &str {
        "reclaiming"
    }

    fn push(&self, request: &SyncPushRequest) -> Result<(), SyncTransportError> {
        if !self.reclaimed.replace(true) {
            self.other_claimer.reset_stale(i64::MAX).unwrap();
        }
        self.pushed.borrow_mut().push(request.entity_id.clone());
        Ok(())
    }
}

#[test]
fn settle_error_skips_the_operation_and_keeps_draining() {
    let conn = open_db_in_memory().unwrap();
    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();
    for entity_id in ["a", "b", "c"] {
        queue.enqueue(&habit_op(entity_id), 0).unwrap();
    }

    let transport = ReclaimingTransport {
        other_claimer: SqliteSyncQueueRepository::try_new(&conn).unwrap(),
        reclaimed: Cell::new(false),
        pushed: RefCell::new(Vec::new()),
    };
    let service = SyncService::new(
        SqliteSyncQueueRepository::try_new(&conn).unwrap(),
        &transport,
        SyncConfig::default(),
    )
    .unwrap();

    let report = service.run_once_at(1_000).unwrap();
    assert_eq!(report.claimed, 3);
    assert_eq!(report.skipped, 3);
    assert_eq!(report.completed, 0);
    assert!(report.has_errors());
    assert_eq!(*transport.pushed.borrow(), vec!["a", "b", "c"]);
    assert_eq!(queue.count_by_status(SyncStatus::Pending).unwrap(), 3);

    // The reset rows are picked up again on the next pass.
    let report = service.run_once_at(2_000).unwrap();
    assert_eq!(report.completed, 3);
    assert_eq!(report.skipped, 0);
    assert_eq!(queue.count_by_status(SyncStatus::Completed).unwrap(), 3);
}

#[test]
fn prune_removes_only_old_completed_rows() {
    let conn = open_db_in_memory().unwrap();
    let queue = SqliteSyncQueueRepository::try_new(&conn).unwrap();
    let old = queue.enqueue(&habit_op("a"), 10).unwrap();
    let pending = queue.enqueue(&habit_op("b"), 20).unwrap();
    let claimed = queue.claim_due(10, 1).unwrap();
    assert_eq!(claimed[0].id, old);
    queue.mark_completed(old).unwrap();

    assert_eq!(queue.prune_completed(100).unwrap(), 1);
    assert!(queue.get_operation(old).unwrap().is_none());
    assert!(queue.get_operation(pending).unwrap().is_some());
}

#[test]
fn invalid_service_setup_is_rejected() {
    let conn = open_db_in_memory().unwrap();

    struct BadId;
    impl SyncTransport for BadId {
        fn transport_id(&self) -> &str {
            "Bad Id"
        }
        fn push(&self, _request: &SyncPushRequest) -> Result<(), SyncTransportError> {
            Ok(())
        }
    }

    let bad_transport = SyncService::new(
        SqliteSyncQueueRepository::try_new(&conn).unwrap(),
        BadId,
        SyncConfig::default(),
    );
    assert!(matches!(
        bad_transport,
        Err(SyncServiceError::InvalidTransportId(_))
    ));

    let bad_config = SyncService::new(
        SqliteSyncQueueRepository::try_new(&conn).unwrap(),
        ScriptedTransport::always_ok(),
        SyncConfig {
            batch_size: 0,
            ..SyncConfig::default()
        },
    );
    assert!(matches!(bad_config, Err(SyncServiceError::InvalidConfig(_))));
}
