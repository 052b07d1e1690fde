//! Task state machine transitions.
//!
//! Validates and executes state transitions for tasks, enforcing the
//! allowed transition graph, optimistic locking, and timestamp management.
//! The retry arithmetic itself (attempt accounting, terminal-or-requeue
//! decision) lives in [`crate::retry`]; this module only knows the shape of
//! the transition graph.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;

use taskforge_db::models::TaskStatus;
use taskforge_db::queries::tasks as db;

use crate::error::SchedulerError;

/// The task state machine.
///
/// Enforces the only legal transition edges:
///
/// ```text
/// pending -> running               (worker claim)
/// running -> completed             (worker report: success) [terminal]
/// running -> pending               (retry Controller, attempts remain)
/// running -> failed                (retry Controller, attempts exhausted) [terminal]
/// ```
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Check whether a transition from `from` to `to` is a valid edge in the
    /// state graph.
    pub fn is_valid_transition(from: TaskStatus, to: TaskStatus) -> bool {
        matches!(
            (from, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Pending)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }

    /// Execute a `pending -> running` or `running -> completed` transition
    /// with optimistic locking.
    ///
    /// The `running -> pending|failed` edges (retry outcomes) go through
    /// [`crate::retry::RetryController`] instead, since they also need to
    /// increment `attempt_count` and record `last_error` atomically -- see
    /// [`taskforge_db::queries::tasks::apply_failure_outcome`].
    ///
    /// Returns [`SchedulerError::IllegalTransition`] if the edge is not in
    /// the graph, [`SchedulerError::NotFound`] if the task does not exist,
    /// and [`SchedulerError::IllegalTransition`] again (re-read to report
    /// the actual current status) if an optimistic-lock race was lost.
    pub async fn transition(
        pool: &PgPool,
        task_id: i64,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<(), SchedulerError> {
        if !Self::is_valid_transition(from, to) {
            return Err(SchedulerError::IllegalTransition {
                task_id,
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        // Only meaningful on `pending -> running`; the query layer preserves
        // the existing value via COALESCE, so a requeued task's original
        // claim time survives a later re-claim.
        let started_at = if from == TaskStatus::Pending && to == TaskStatus::Running {
            Some(Utc::now())
        } else {
            None
        };

        let completed_at = match to {
            TaskStatus::Completed => Some(Utc::now()),
            _ => None,
        };

        let rows = db::transition_task_status(pool, task_id, from, to, started_at, completed_at)
            .await
            .with_context(|| {
                format!("failed to transition task {task_id} from {from} to {to}")
            })
            .map_err(SchedulerError::StoreFailure)?;

        if rows == 0 {
            let task = db::get_task(pool, task_id)
                .await
                .map_err(SchedulerError::StoreFailure)?;
            return match task {
                None => Err(SchedulerError::NotFound(task_id)),
                Some(t) => Err(SchedulerError::IllegalTransition {
                    task_id,
                    from: t.status.to_string(),
                    to: to.to_string(),
                }),
            };
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_edges() {
        assert!(TaskStateMachine::is_valid_transition(
            TaskStatus::Pending,
            TaskStatus::Running
        ));
        assert!(TaskStateMachine::is_valid_transition(
            TaskStatus::Running,
            TaskStatus::Completed
        ));
        assert!(TaskStateMachine::is_valid_transition(
            TaskStatus::Running,
            TaskStatus::Pending
        ));
        assert!(TaskStateMachine::is_valid_transition(
            TaskStatus::Running,
            TaskStatus::Failed
        ));
    }

    #[test]
    fn invalid_edges_are_rejected() {
        assert!(!TaskStateMachine::is_valid_transition(
            TaskStatus::Completed,
            TaskStatus::Pending
        ));
        assert!(!TaskStateMachine::is_valid_transition(
            TaskStatus::Failed,
            TaskStatus::Pending
        ));
        assert!(!TaskStateMachine::is_valid_transition(
            TaskStatus::Pending,
            TaskStatus::Completed
        ));
        assert!(!TaskStateMachine::is_valid_transition(
            TaskStatus::Pending,
            TaskStatus::Failed
        ));
    }
}
