//! Scheduler Façade: the public API tying Store, Queue, Resolver, and
//! Retry together.
//!
//! The single point where every transaction boundary and ready-queue push
//! is decided. Holds no state of its own beyond a `PgPool` handle, a
//! [`ReadyQueue`], and a [`WorkerRegistry`] -- all injected at construction,
//! the same "no in-source singletons" shape the teacher's orchestrator
//! takes its collaborators in.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};

use taskforge_db::models::{Priority, Task, TaskStatus};
use taskforge_db::queries::tasks::{self as db, InsertTaskError};

use crate::error::SchedulerError;
use crate::queue::ReadyQueue;
use crate::registry::{Worker, WorkerRegistry};
use crate::resolver::DependencyResolver;
use crate::retry::RetryController;
use crate::state::TaskStateMachine;

/// Caller-provided fields for [`SchedulerFacade::submit`].
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(alias = "data")]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<i64>,
    #[serde(default, alias = "max_retries")]
    pub max_attempts: Option<i32>,
}

/// Default `max_attempts` when the caller does not specify one.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Default `priority` when the caller does not specify one.
pub const DEFAULT_PRIORITY: Priority = Priority::Medium;

/// What the caller observed after a `transition` report, summarizing any
/// Resolver fan-out or Retry Controller decision that the transition
/// triggered.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub task: Task,
    /// Number of waiters pushed to the ready-queue as a result of this
    /// transition (non-zero only for `running -> completed`).
    pub newly_eligible: usize,
}

pub struct SchedulerFacade {
    pool: PgPool,
    queue: ReadyQueue,
    registry: WorkerRegistry,
}

impl SchedulerFacade {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            queue: ReadyQueue::new(),
            registry: WorkerRegistry::default(),
        }
    }

    pub fn queue(&self) -> &ReadyQueue {
        &self.queue
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Insert a task and, if it has no dependencies, push it to the
    /// ready-queue immediately.
    pub async fn submit(&self, req: SubmitRequest) -> Result<Task, SchedulerError> {
        if req.task_type.trim().is_empty() {
            return Err(SchedulerError::InvalidInput("type must not be empty".into()));
        }

        let priority = match &req.priority {
            Some(raw) => Priority::from_str(raw)
                .map_err(|e| SchedulerError::InvalidInput(e.to_string()))?,
            None => DEFAULT_PRIORITY,
        };
        let max_attempts = req.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts < 0 {
            return Err(SchedulerError::InvalidInput(
                "max_attempts must be non-negative".into(),
            ));
        }

        let task = db::insert_task(
            &self.pool,
            &req.task_type,
            &req.payload,
            priority,
            &req.dependencies,
            max_attempts,
        )
        .await
        .map_err(|e| match e {
            InsertTaskError::InvalidDependency(missing) => SchedulerError::InvalidInput(format!(
                "unknown dependency task ids: {missing:?}"
            )),
            InsertTaskError::Db(err) => SchedulerError::StoreFailure(err),
        })?;

        if req.dependencies.is_empty() {
            self.queue.push(task.id, task.priority);
            info!(task_id = task.id, priority = %task.priority, "submitted task pushed to ready-queue");
        } else {
            info!(task_id = task.id, deps = ?req.dependencies, "submitted task waiting on dependencies");
        }

        Ok(task)
    }

    /// Fetch a single task, or [`SchedulerError::NotFound`].
    pub async fn get(&self, id: i64) -> Result<Task, SchedulerError> {
        db::get_task(&self.pool, id)
            .await
            .map_err(SchedulerError::StoreFailure)?
            .ok_or(SchedulerError::NotFound(id))
    }

    /// List all tasks, newest first.
    pub async fn list(&self) -> Result<Vec<Task>, SchedulerError> {
        db::list_tasks(&self.pool)
            .await
            .map_err(SchedulerError::StoreFailure)
    }

    /// The ids `task_id` depends on, in submission order. Used to populate
    /// the `dependencies` field of the wire-shape task record (`spec.md`
    /// §6), which the `Task` row itself does not carry.
    pub async fn dependencies(&self, task_id: i64) -> Result<Vec<i64>, SchedulerError> {
        db::get_task_dependencies(&self.pool, task_id)
            .await
            .map_err(SchedulerError::StoreFailure)
    }

    /// Pop the next eligible task id from the ready-queue and return its
    /// current record, without transitioning it. The worker must still
    /// explicitly claim it via `transition(id, running, ..)` -- this step
    /// only discovers a candidate, per the worker contract's "re-fetch and
    /// verify status=pending before claiming."
    ///
    /// Blocks up to `timeout`; returns `Ok(None)` on a clean timeout.
    pub async fn next(&self, timeout: Duration) -> Result<Option<Task>, SchedulerError> {
        let Some(id) = self.queue.pop_highest_blocking(timeout).await else {
            return Ok(None);
        };
        match db::get_task(&self.pool, id)
            .await
            .map_err(SchedulerError::StoreFailure)?
        {
            Some(task) => Ok(Some(task)),
            None => {
                warn!(task_id = id, "popped task id no longer exists, skipping");
                Ok(None)
            }
        }
    }

    /// Apply a caller-requested transition.
    ///
    /// - `pending -> running`: claim.
    /// - `running -> completed`: success; triggers the Resolver fan-out.
    /// - `running -> failed`: delegates to the Retry Controller, which may
    ///   itself decide `pending` (requeue) or `failed` (terminal); on
    ///   requeue, the task is pushed back to the ready-queue after commit.
    /// - Any other pair: `IllegalTransition`.
    pub async fn transition(
        &self,
        id: i64,
        to: TaskStatus,
        error_message: Option<&str>,
    ) -> Result<TransitionOutcome, SchedulerError> {
        let current = self.get(id).await?;

        match (current.status, to) {
            (TaskStatus::Pending, TaskStatus::Running) => {
                TaskStateMachine::transition(&self.pool, id, TaskStatus::Pending, TaskStatus::Running)
                    .await?;
                let task = self.get(id).await?;
                Ok(TransitionOutcome {
                    task,
                    newly_eligible: 0,
                })
            }
            (TaskStatus::Running, TaskStatus::Completed) => {
                TaskStateMachine::transition(
                    &self.pool,
                    id,
                    TaskStatus::Running,
                    TaskStatus::Completed,
                )
                .await?;
                let newly_eligible =
                    DependencyResolver::enqueue_newly_eligible_after(&self.pool, &self.queue, id)
                        .await
                        .map_err(SchedulerError::StoreFailure)?;
                let task = self.get(id).await?;
                Ok(TransitionOutcome {
                    task,
                    newly_eligible,
                })
            }
            (TaskStatus::Running, TaskStatus::Failed) => {
                let message = error_message.unwrap_or("");
                let new_status =
                    RetryController::report_failure(&self.pool, &current, message).await?;
                if new_status == TaskStatus::Pending {
                    self.queue.push(id, current.priority);
                }
                let task = self.get(id).await?;
                Ok(TransitionOutcome {
                    task,
                    newly_eligible: 0,
                })
            }
            (from, to) => Err(SchedulerError::IllegalTransition {
                task_id: id,
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    /// Record a worker heartbeat.
    pub fn heartbeat(&self, worker_id: &str) -> Result<(), SchedulerError> {
        if worker_id.trim().is_empty() {
            return Err(SchedulerError::InvalidInput("worker_id must not be empty".into()));
        }
        self.registry.heartbeat(worker_id);
        Ok(())
    }

    /// All currently-live workers.
    pub fn list_live_workers(&self) -> Vec<Worker> {
        self.registry.list_live()
    }

    /// Re-push every `pending` task with satisfied dependencies that is not
    /// currently represented in the ready-queue.
    ///
    /// Called at startup (after a crash, the in-memory queue is empty but
    /// the Store still has eligible `pending` tasks). Does not touch
    /// `running` tasks left behind by a crashed worker -- per `spec.md` §9,
    /// that is a noted, unimplemented extension.
    pub async fn reconcile(&self) -> Result<usize, SchedulerError> {
        let eligible = db::list_eligible_pending(&self.pool)
            .await
            .context("failed to list eligible pending tasks during reconciliation")
            .map_err(SchedulerError::StoreFailure)?;

        let mut pushed = 0;
        for task in eligible {
            if !self.queue.contains(task.id) {
                self.queue.push(task.id, task.priority);
                pushed += 1;
            }
        }
        if pushed > 0 {
            info!(pushed, "reconciliation sweep re-enqueued orphaned pending tasks");
        }
        Ok(pushed)
    }
}
