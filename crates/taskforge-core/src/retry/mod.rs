//! Retry Controller: attempt accounting, backoff formula, terminal decision.
//!
//! Applied when a worker reports `failed`. Decides whether the task goes
//! back to `pending` (attempts remain) or terminal `failed` (exhausted),
//! then performs the atomic DB update -- the decision and the write happen
//! together so the caller-observed `attempt_count` used for the optimistic
//! lock can't go stale between them.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use taskforge_db::models::{Task, TaskStatus};
use taskforge_db::queries::tasks as db;

use crate::error::SchedulerError;

pub struct RetryController;

impl RetryController {
    /// `min(2^attempt_count, 30)` seconds -- exposed as a pure function so
    /// the reference worker contract and tests can compute the same value
    /// the scheduler documents, even though the scheduler itself never
    /// sleeps.
    pub fn backoff_seconds(attempt_count: i32) -> u64 {
        let exp = attempt_count.max(0) as u32;
        2_u64.saturating_pow(exp).min(30)
    }

    /// Apply the outcome of a `running -> failed` report for `task`.
    ///
    /// - Increments `attempt_count`.
    /// - If the incremented count is still `< max_attempts`: requeues to
    ///   `pending` with `last_error` set, and pushes the task back onto its
    ///   priority channel.
    /// - Else: terminal `failed`, `completed_at = now`, no requeue.
    ///
    /// `task` must have been freshly read with `status = running`; the
    /// write is optimistically locked on both `status = 'running'` and the
    /// observed `attempt_count`, so a lost race surfaces as
    /// [`SchedulerError::IllegalTransition`].
    pub async fn report_failure(
        pool: &PgPool,
        task: &Task,
        error_message: &str,
    ) -> Result<TaskStatus, SchedulerError> {
        if task.status != TaskStatus::Running {
            return Err(SchedulerError::IllegalTransition {
                task_id: task.id,
                from: task.status.to_string(),
                to: TaskStatus::Failed.to_string(),
            });
        }

        let next_attempt = task.attempt_count + 1;
        let new_status = if next_attempt < task.max_attempts {
            TaskStatus::Pending
        } else {
            TaskStatus::Failed
        };

        let rows = db::apply_failure_outcome(
            pool,
            task.id,
            task.attempt_count,
            new_status,
            error_message,
        )
        .await
        .with_context(|| format!("failed to apply failure outcome for task {}", task.id))
        .map_err(SchedulerError::StoreFailure)?;

        if rows == 0 {
            let current = db::get_task(pool, task.id)
                .await
                .map_err(SchedulerError::StoreFailure)?;
            return match current {
                None => Err(SchedulerError::NotFound(task.id)),
                Some(t) => Err(SchedulerError::IllegalTransition {
                    task_id: task.id,
                    from: t.status.to_string(),
                    to: new_status.to_string(),
                }),
            };
        }

        info!(
            task_id = task.id,
            attempt = next_attempt,
            max_attempts = task.max_attempts,
            new_status = %new_status,
            "retry controller applied failure outcome"
        );

        Ok(new_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_cap() {
        assert_eq!(RetryController::backoff_seconds(0), 1);
        assert_eq!(RetryController::backoff_seconds(1), 2);
        assert_eq!(RetryController::backoff_seconds(2), 4);
        assert_eq!(RetryController::backoff_seconds(3), 8);
        assert_eq!(RetryController::backoff_seconds(4), 16);
        assert_eq!(RetryController::backoff_seconds(5), 30);
    }

    #[test]
    fn backoff_caps_at_thirty() {
        assert_eq!(RetryController::backoff_seconds(6), 30);
        assert_eq!(RetryController::backoff_seconds(20), 30);
    }
}
