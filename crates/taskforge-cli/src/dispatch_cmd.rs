//! `taskforge dispatch` command: drain the ready-queue, claiming each
//! eligible task as it becomes available.
//!
//! Runs the startup reconciliation sweep (same one `taskforge serve` runs),
//! then loops: long-poll `next`, claim (`pending -> running`) whatever it
//! returns. Executing the claimed task's opaque payload is explicitly out
//! of scope (`spec.md` §1) -- a real worker process does that and reports
//! back via `taskforge transition`. This command only exercises the
//! scheduler-visible half of the worker contract, which makes it useful
//! for draining a backlog or smoke-testing dispatch order without running
//! an actual worker fleet.

use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;

use taskforge_core::facade::SchedulerFacade;
use taskforge_db::models::TaskStatus;

/// Run the dispatch command. Loops until interrupted (Ctrl+C).
pub async fn run_dispatch(pool: &PgPool, timeout_ms: u64) -> Result<()> {
    let facade = SchedulerFacade::new(pool.clone());

    let reconciled = facade.reconcile().await?;
    println!("Reconciliation sweep re-enqueued {reconciled} task(s).");
    println!("Dispatching (Ctrl+C to stop)...");

    loop {
        let Some(task) = facade.next(Duration::from_millis(timeout_ms)).await? else {
            continue;
        };

        match facade.transition(task.id, TaskStatus::Running, None).await {
            Ok(outcome) => {
                println!(
                    "Claimed task {} ({}, {})",
                    outcome.task.id, outcome.task.task_type, outcome.task.priority
                );
            }
            Err(err) => {
                eprintln!("Failed to claim task {}: {err}", task.id);
            }
        }
    }
}
