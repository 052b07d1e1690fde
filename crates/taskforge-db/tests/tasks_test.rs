//! Integration tests for task CRUD and transition queries.
//!
//! Requires a PostgreSQL instance reachable via `TASKFORGE_TEST_PG_URL`, or
//! falls back to a testcontainers-managed instance (see
//! `taskforge-test-utils`).

use serde_json::json;

use taskforge_db::models::{Priority, TaskStatus};
use taskforge_db::queries::tasks::{self, InsertTaskError};
use taskforge_test_utils::{create_test_db, drop_test_db};

#[tokio::test]
async fn insert_then_get_roundtrips_fields() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::insert_task(
        &pool,
        "send_email",
        &json!({"to": "x"}),
        Priority::Medium,
        &[],
        3,
    )
    .await
    .expect("insert should succeed");

    assert_eq!(task.task_type, "send_email");
    assert_eq!(task.priority, Priority::Medium);
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.attempt_count, 0);
    assert_eq!(task.max_attempts, 3);

    let fetched = tasks::get_task(&pool, task.id)
        .await
        .expect("query should succeed")
        .expect("task should exist");
    assert_eq!(fetched.id, task.id);
    assert_eq!(fetched.payload, json!({"to": "x"}));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn insert_with_unknown_dependency_is_rejected() {
    let (pool, db_name) = create_test_db().await;

    let result = tasks::insert_task(
        &pool,
        "send_notification",
        &json!({}),
        Priority::High,
        &[999_999],
        3,
    )
    .await;

    match result {
        Err(InsertTaskError::InvalidDependency(missing)) => {
            assert_eq!(missing, vec![999_999]);
        }
        other => panic!("expected InvalidDependency, got {other:?}"),
    }

    let all = tasks::list_tasks(&pool).await.expect("list should succeed");
    assert!(all.is_empty(), "no task should have been inserted");

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_tasks_orders_newest_first() {
    let (pool, db_name) = create_test_db().await;

    let a = tasks::insert_task(&pool, "a", &json!({}), Priority::Low, &[], 3)
        .await
        .unwrap();
    let b = tasks::insert_task(&pool, "b", &json!({}), Priority::Low, &[], 3)
        .await
        .unwrap();

    let all = tasks::list_tasks(&pool).await.unwrap();
    assert_eq!(all[0].id, b.id);
    assert_eq!(all[1].id, a.id);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn transition_task_status_is_optimistically_locked() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::insert_task(&pool, "a", &json!({}), Priority::Low, &[], 3)
        .await
        .unwrap();

    let rows = tasks::transition_task_status(
        &pool,
        task.id,
        TaskStatus::Pending,
        TaskStatus::Running,
        Some(chrono::Utc::now()),
        None,
    )
    .await
    .unwrap();
    assert_eq!(rows, 1);

    // Retrying the same from-state fails: the row is no longer `pending`.
    let rows_again = tasks::transition_task_status(
        &pool,
        task.id,
        TaskStatus::Pending,
        TaskStatus::Running,
        Some(chrono::Utc::now()),
        None,
    )
    .await
    .unwrap();
    assert_eq!(rows_again, 0);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_pending_waiters_only_returns_tasks_with_dependencies() {
    let (pool, db_name) = create_test_db().await;

    let a = tasks::insert_task(&pool, "a", &json!({}), Priority::Medium, &[], 3)
        .await
        .unwrap();
    let _b = tasks::insert_task(&pool, "b", &json!({}), Priority::Medium, &[a.id], 3)
        .await
        .unwrap();
    let _no_deps = tasks::insert_task(&pool, "c", &json!({}), Priority::Medium, &[], 3)
        .await
        .unwrap();

    let waiters = tasks::list_pending_waiters(&pool).await.unwrap();
    assert_eq!(waiters.len(), 1);
    assert_eq!(waiters[0].task_type, "b");

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_eligible_pending_respects_dependency_completion() {
    let (pool, db_name) = create_test_db().await;

    let a = tasks::insert_task(&pool, "a", &json!({}), Priority::Medium, &[], 3)
        .await
        .unwrap();
    let b = tasks::insert_task(&pool, "b", &json!({}), Priority::Medium, &[a.id], 3)
        .await
        .unwrap();

    let eligible = tasks::list_eligible_pending(&pool).await.unwrap();
    let ids: Vec<i64> = eligible.iter().map(|t| t.id).collect();
    assert!(ids.contains(&a.id));
    assert!(!ids.contains(&b.id));

    tasks::transition_task_status(
        &pool,
        a.id,
        TaskStatus::Pending,
        TaskStatus::Running,
        Some(chrono::Utc::now()),
        None,
    )
    .await
    .unwrap();
    tasks::transition_task_status(
        &pool,
        a.id,
        TaskStatus::Running,
        TaskStatus::Completed,
        None,
        Some(chrono::Utc::now()),
    )
    .await
    .unwrap();

    let eligible = tasks::list_eligible_pending(&pool).await.unwrap();
    let ids: Vec<i64> = eligible.iter().map(|t| t.id).collect();
    assert!(ids.contains(&b.id));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn started_at_survives_a_retry() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::insert_task(&pool, "a", &json!({}), Priority::Medium, &[], 3)
        .await
        .unwrap();

    let first_claim = chrono::Utc::now();
    tasks::transition_task_status(
        &pool,
        task.id,
        TaskStatus::Pending,
        TaskStatus::Running,
        Some(first_claim),
        None,
    )
    .await
    .unwrap();
    let first_started_at = tasks::get_task(&pool, task.id)
        .await
        .unwrap()
        .unwrap()
        .started_at
        .unwrap();

    // Failure requeues to pending; started_at must not be wiped.
    tasks::apply_failure_outcome(&pool, task.id, 0, TaskStatus::Pending, "boom")
        .await
        .unwrap();
    let after_failure = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(after_failure.started_at, Some(first_started_at));

    // Re-claim passes a fresh timestamp, but the original claim time wins.
    tasks::transition_task_status(
        &pool,
        task.id,
        TaskStatus::Pending,
        TaskStatus::Running,
        Some(chrono::Utc::now()),
        None,
    )
    .await
    .unwrap();
    let after_reclaim = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(after_reclaim.started_at, Some(first_started_at));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn apply_failure_outcome_requeues_until_exhausted() {
    let (pool, db_name) = create_test_db().await;

    let task = tasks::insert_task(&pool, "a", &json!({}), Priority::Medium, &[], 2)
        .await
        .unwrap();

    tasks::transition_task_status(
        &pool,
        task.id,
        TaskStatus::Pending,
        TaskStatus::Running,
        Some(chrono::Utc::now()),
        None,
    )
    .await
    .unwrap();

    // attempt_count 0 -> 1, still below max_attempts(2): requeue to pending.
    let rows = tasks::apply_failure_outcome(&pool, task.id, 0, TaskStatus::Pending, "boom")
        .await
        .unwrap();
    assert_eq!(rows, 1);
    let reloaded = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TaskStatus::Pending);
    assert_eq!(reloaded.attempt_count, 1);
    assert_eq!(reloaded.last_error.as_deref(), Some("boom"));

    tasks::transition_task_status(
        &pool,
        task.id,
        TaskStatus::Pending,
        TaskStatus::Running,
        None,
        None,
    )
    .await
    .unwrap();

    // attempt_count 1 -> 2, reaches max_attempts(2): terminal failure.
    let rows = tasks::apply_failure_outcome(&pool, task.id, 1, TaskStatus::Failed, "boom again")
        .await
        .unwrap();
    assert_eq!(rows, 1);
    let reloaded = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, TaskStatus::Failed);
    assert_eq!(reloaded.attempt_count, 2);
    assert!(reloaded.completed_at.is_some());

    drop_test_db(&db_name).await;
}
