//! `taskforge list` and `taskforge get` commands: inspect task status.

use anyhow::Result;
use sqlx::PgPool;

use taskforge_core::facade::SchedulerFacade;

/// Run the list command: show every task, newest first.
pub async fn run_list(pool: &PgPool) -> Result<()> {
    let facade = SchedulerFacade::new(pool.clone());
    let tasks = facade.list().await?;

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }

    println!(
        "{:>6} {:<20} {:<10} {:<9} {:>7}/{:<7} {}",
        "ID", "TYPE", "PRIORITY", "STATUS", "ATTEMPT", "MAX", "LAST ERROR"
    );
    for task in &tasks {
        println!(
            "{:>6} {:<20} {:<10} {:<9} {:>7}/{:<7} {}",
            task.id,
            task.task_type,
            task.priority,
            task.status,
            task.attempt_count,
            task.max_attempts,
            task.last_error.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}

/// Run the get command: show a single task's full record.
pub async fn run_get(pool: &PgPool, id: i64) -> Result<()> {
    let facade = SchedulerFacade::new(pool.clone());
    let task = facade.get(id).await?;
    println!("{}", serde_json::to_string_pretty(&task)?);
    Ok(())
}
