//! Database query functions for the `tasks` and `task_dependencies` tables.

use anyhow::{Context, Result};
use sqlx::PgPool;
use thiserror::Error;

use crate::models::{Priority, Task, TaskStatus};

/// Failure modes specific to [`insert_task`].
///
/// Kept distinct from the generic `anyhow::Error` the rest of this module
/// uses because the scheduler façade needs to tell "unknown dependency" and
/// "genuine storage failure" apart (`spec.md` §7's `InvalidInput` vs.
/// `StoreFailure`).
#[derive(Debug, Error)]
pub enum InsertTaskError {
    #[error("unknown dependency task ids: {0:?}")]
    InvalidDependency(Vec<i64>),
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

/// Insert a new task row along with its dependency edges, in one
/// transaction.
///
/// Validates that every id in `dependencies` refers to an existing task
/// before inserting anything; on an unknown dependency, nothing is
/// inserted and [`InsertTaskError::InvalidDependency`] is returned.
pub async fn insert_task(
    pool: &PgPool,
    task_type: &str,
    payload: &serde_json::Value,
    priority: Priority,
    dependencies: &[i64],
    max_attempts: i32,
) -> Result<Task, InsertTaskError> {
    let mut tx = pool.begin().await.context("failed to start transaction")?;

    if !dependencies.is_empty() {
        let existing: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM tasks WHERE id = ANY($1)")
                .bind(dependencies)
                .fetch_all(&mut *tx)
                .await
                .context("failed to validate dependencies")?;

        let missing: Vec<i64> = dependencies
            .iter()
            .copied()
            .filter(|id| !existing.contains(id))
            .collect();
        if !missing.is_empty() {
            return Err(InsertTaskError::InvalidDependency(missing));
        }
    }

    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks (task_type, payload, priority, max_attempts) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(task_type)
    .bind(payload)
    .bind(priority)
    .bind(max_attempts)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert task")?;

    for (position, depends_on) in dependencies.iter().enumerate() {
        sqlx::query(
            "INSERT INTO task_dependencies (task_id, depends_on, position) VALUES ($1, $2, $3)",
        )
        .bind(task.id)
        .bind(depends_on)
        .bind(position as i32)
        .execute(&mut *tx)
        .await
        .context("failed to insert task dependency")?;
    }

    tx.commit().await.context("failed to commit transaction")?;

    Ok(task)
}

/// Fetch a single task by id.
pub async fn get_task(pool: &PgPool, id: i64) -> Result<Option<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task")
}

/// List all tasks, newest first (descending by id).
pub async fn list_tasks(pool: &PgPool) -> Result<Vec<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks ORDER BY id DESC")
        .fetch_all(pool)
        .await
        .context("failed to list tasks")
}

/// Get the ids of all tasks that `task_id` depends on, in submission order.
pub async fn get_task_dependencies(pool: &PgPool, task_id: i64) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT depends_on FROM task_dependencies \
         WHERE task_id = $1 \
         ORDER BY position ASC",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("failed to get task dependencies")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// All tasks with `status = pending` and a non-empty dependency set,
/// ordered ascending by id (oldest first) -- the Resolver's documented
/// tie-break for re-enqueueing waiters after a completion.
pub async fn list_pending_waiters(pool: &PgPool) -> Result<Vec<Task>> {
    sqlx::query_as::<_, Task>(
        "SELECT t.* FROM tasks t \
         WHERE t.status = 'pending' \
           AND EXISTS (SELECT 1 FROM task_dependencies td WHERE td.task_id = t.id) \
         ORDER BY t.id ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list pending waiters")
}

/// All tasks with `status = pending` whose dependencies (if any) are all
/// `completed` -- i.e. eligible for the ready-queue right now. Ordered
/// ascending by id. Used both by the Resolver's eligibility scan and by
/// the startup reconciliation sweep.
pub async fn list_eligible_pending(pool: &PgPool) -> Result<Vec<Task>> {
    sqlx::query_as::<_, Task>(
        "SELECT t.* FROM tasks t \
         WHERE t.status = 'pending' \
           AND NOT EXISTS ( \
               SELECT 1 FROM task_dependencies td \
               JOIN tasks dep ON dep.id = td.depends_on \
               WHERE td.task_id = t.id AND dep.status != 'completed' \
           ) \
         ORDER BY t.id ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list eligible pending tasks")
}

/// Atomically transition a task from one status to another.
///
/// Uses optimistic locking: the `UPDATE`'s `WHERE` clause includes
/// `status = $from`, so the row is only updated if the current status
/// matches. Returns the number of rows affected (0 means the status did
/// not match, i.e. a lost race or an already-terminal task).
///
/// `started_at` is only ever set on the *first* `pending -> running` claim:
/// `COALESCE(started_at, $2)` keeps the existing value on every later claim
/// of a task that was requeued after a retry.
pub async fn transition_task_status(
    pool: &PgPool,
    task_id: i64,
    from: TaskStatus,
    to: TaskStatus,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks \
         SET status = $1, \
             started_at = COALESCE(started_at, $2), \
             completed_at = COALESCE($3, completed_at) \
         WHERE id = $4 AND status = $5",
    )
    .bind(to)
    .bind(started_at)
    .bind(completed_at)
    .bind(task_id)
    .bind(from)
    .execute(pool)
    .await
    .context("failed to transition task status")?;

    Ok(result.rows_affected())
}

/// Apply the outcome of a `running -> failed` report, as already decided by
/// the retry controller: either `pending` (attempts remain) or `failed`
/// (terminal). Increments `attempt_count` and records `last_error`
/// atomically, optimistically locked on both `status = 'running'` and the
/// caller-observed `current_attempt`. `started_at` is left untouched on
/// either outcome -- it records the task's first claim, not its most recent
/// attempt, and must survive a requeue.
pub async fn apply_failure_outcome(
    pool: &PgPool,
    task_id: i64,
    current_attempt: i32,
    new_status: TaskStatus,
    error_message: &str,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks \
         SET status = $1, \
             attempt_count = attempt_count + 1, \
             last_error = $2, \
             completed_at = CASE WHEN $1 = 'failed' THEN now() ELSE NULL END \
         WHERE id = $3 AND status = 'running' AND attempt_count = $4",
    )
    .bind(new_status)
    .bind(error_message)
    .bind(task_id)
    .bind(current_attempt)
    .execute(pool)
    .await
    .context("failed to apply failure outcome")?;

    Ok(result.rows_affected())
}
