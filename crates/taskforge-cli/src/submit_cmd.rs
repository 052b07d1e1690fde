//! `taskforge submit` command: create a new task.

use anyhow::{Context, Result};
use sqlx::PgPool;

use taskforge_core::facade::{SchedulerFacade, SubmitRequest};

/// Run the submit command.
///
/// `data` is a raw JSON string (e.g. `'{"to":"x"}'`); `dependencies` are
/// task ids.
pub async fn run_submit(
    pool: &PgPool,
    task_type: &str,
    data: &str,
    priority: Option<&str>,
    dependencies: Vec<i64>,
    max_attempts: Option<i32>,
) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(data).with_context(|| format!("invalid JSON payload: {data}"))?;

    let facade = SchedulerFacade::new(pool.clone());
    let task = facade
        .submit(SubmitRequest {
            task_type: task_type.to_string(),
            payload,
            priority: priority.map(str::to_string),
            dependencies,
            max_attempts,
        })
        .await?;

    println!("Task {} submitted ({}, {})", task.id, task.task_type, task.priority);
    println!("{}", serde_json::to_string_pretty(&task)?);

    Ok(())
}
