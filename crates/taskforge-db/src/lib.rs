//! Durable storage layer for the task scheduler.
//!
//! This crate owns the connection pool, the database-facing row models,
//! and the raw SQL query functions. It knows nothing about dependency
//! resolution, priority dispatch, or retry policy -- those live in
//! `taskforge-core` and are built on top of the primitives here.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
