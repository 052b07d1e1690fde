//! `taskforge transition` and `taskforge next` commands: the worker-facing
//! surface over the façade.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;

use taskforge_core::facade::SchedulerFacade;
use taskforge_db::models::TaskStatus;

/// Run the transition command: report a task's new status.
pub async fn run_transition(
    pool: &PgPool,
    id: i64,
    status: &str,
    error_message: Option<&str>,
) -> Result<()> {
    let to = TaskStatus::from_str(status).with_context(|| format!("invalid status: {status}"))?;

    let facade = SchedulerFacade::new(pool.clone());
    let outcome = facade.transition(id, to, error_message).await?;

    println!(
        "Task {} -> {} (attempt {}/{})",
        outcome.task.id, outcome.task.status, outcome.task.attempt_count, outcome.task.max_attempts
    );
    if outcome.newly_eligible > 0 {
        println!("  {} dependent task(s) became eligible", outcome.newly_eligible);
    }

    Ok(())
}

/// Run the next command: long-poll for the next eligible task.
pub async fn run_next(pool: &PgPool, timeout_ms: u64) -> Result<()> {
    let facade = SchedulerFacade::new(pool.clone());
    match facade.next(Duration::from_millis(timeout_ms)).await? {
        Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
        None => println!("(no eligible task within {timeout_ms}ms)"),
    }
    Ok(())
}
