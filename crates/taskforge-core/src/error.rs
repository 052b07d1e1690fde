//! The façade's typed error surface.
//!
//! `taskforge-db` query helpers return `anyhow::Result`; this enum is where
//! that plumbing gets classified into the taxonomy callers (CLI, HTTP
//! transport) need to render distinct responses for.

use thiserror::Error;

/// Errors surfaced by [`crate::facade::SchedulerFacade`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("task {0} not found")]
    NotFound(i64),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("illegal transition for task {task_id}: {from} -> {to}")]
    IllegalTransition {
        task_id: i64,
        from: String,
        to: String,
    },

    #[error("store failure: {0}")]
    StoreFailure(#[from] anyhow::Error),

    #[error("ready-queue unavailable: {0}")]
    QueueUnavailable(String),
}
