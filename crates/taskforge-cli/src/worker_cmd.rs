//! `taskforge heartbeat` and `taskforge workers` commands: the Worker
//! Registry's CLI surface.
//!
//! Since the registry is purely in-memory per §4.5, a CLI invocation of
//! `heartbeat` or `workers` only affects/observes the registry living
//! inside *this* process -- meaningful mainly for local testing of the
//! registry's TTL behavior. `taskforge serve` is where a long-lived,
//! shared registry actually accumulates worker heartbeats from remote
//! processes.

use anyhow::Result;
use sqlx::PgPool;

use taskforge_core::facade::SchedulerFacade;

pub async fn run_heartbeat(pool: &PgPool, worker_id: &str) -> Result<()> {
    let facade = SchedulerFacade::new(pool.clone());
    facade.heartbeat(worker_id)?;
    println!("Heartbeat recorded for {worker_id}.");
    Ok(())
}

pub async fn run_list_workers(pool: &PgPool) -> Result<()> {
    let facade = SchedulerFacade::new(pool.clone());
    let workers = facade.list_live_workers();

    if workers.is_empty() {
        println!("No live workers.");
        return Ok(());
    }

    for worker in &workers {
        println!("{}  last_seen={}", worker.worker_id, worker.last_seen);
    }

    Ok(())
}
