//! Dependency Resolver: eligibility and waiter fan-out.
//!
//! Pure logic layered over the Task Store; never mutates a task's status
//! itself, only decides what belongs in the ready-queue and pushes it there.

use anyhow::Result;
use sqlx::PgPool;
use tracing::debug;

use taskforge_db::models::TaskStatus;
use taskforge_db::queries::tasks as db;

use crate::queue::ReadyQueue;

pub struct DependencyResolver;

impl DependencyResolver {
    /// True iff `task_id` is `pending` and every dependency is `completed`.
    ///
    /// A missing dependency (not found at check time) counts as
    /// not-completed; this should be unreachable given the submit-time
    /// existence check, but is handled defensively.
    pub async fn is_eligible(pool: &PgPool, task_id: i64) -> Result<bool> {
        let task = match db::get_task(pool, task_id).await? {
            Some(t) => t,
            None => return Ok(false),
        };
        if task.status != TaskStatus::Pending {
            return Ok(false);
        }

        let deps = db::get_task_dependencies(pool, task_id).await?;
        for dep_id in deps {
            match db::get_task(pool, dep_id).await? {
                Some(dep) if dep.status == TaskStatus::Completed => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// After `completed_id` transitions to `completed`, scan all pending
    /// waiters and push each now-eligible one to its priority channel.
    ///
    /// Scans in ascending `id` order so older waiters enter the queue
    /// first (the documented tie-break).
    pub async fn enqueue_newly_eligible_after(
        pool: &PgPool,
        queue: &ReadyQueue,
        completed_id: i64,
    ) -> Result<usize> {
        let waiters = db::list_pending_waiters(pool).await?;
        let mut pushed = 0;
        for waiter in waiters {
            if Self::is_eligible(pool, waiter.id).await? {
                queue.push(waiter.id, waiter.priority);
                pushed += 1;
                debug!(
                    task_id = waiter.id,
                    completed_id, "resolver enqueued newly-eligible waiter"
                );
            }
        }
        Ok(pushed)
    }
}

#[cfg(test)]
mod tests {
    // `is_eligible` and the waiter fan-out both require a live Postgres
    // instance (dependency status reads), so they are exercised in
    // `taskforge-core/tests/facade_test.rs` rather than here.
}
