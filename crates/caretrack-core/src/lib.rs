//! # Caretrack Core Library
//!
//! Multi-tenant calendar and care-task reconciliation: expands RFC 5545
//! recurrence rules into concrete occurrences, overlays per-occurrence
//! overrides and cancellations, and merges the resulting virtual tasks with
//! already-materialized care-task rows into one deduplicated, time-ordered
//! list per team.
//!
//! ## Features
//!
//! - **Recurrence Expansion**: RFC 5545 RRULE evaluation over bounded date
//!   windows, backed by the `rrule` crate
//! - **Exception Merging**: single-occurrence moves, content overrides, and
//!   tombstone cancellations, with day-granularity supersession
//! - **Materialization-Aware Reconciliation**: per-team cutoffs decide which
//!   occurrences are still virtual and which already exist as rows
//! - **Tenant Safety**: every query is scoped to an explicit team set;
//!   unscoped queries are rejected rather than silently returning data
//! - **Storage-Independent Core**: the reconciler is generic over repository
//!   traits, so the merge logic tests against an in-memory store
//!
//! ## Core Modules
//!
//! - [`db`]: Database connection and schema management
//! - [`models`]: Core data structures and transfer objects
//! - [`repository`]: Data access layer with Repository pattern
//! - [`recurrence`]: Recurrence rule parsing and expansion
//! - [`service`]: The calendar/care-task reconciliation engine
//! - [`error`]: Error types
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use caretrack_core::{
//!     db,
//!     models::DateWindow,
//!     repository::SqliteRepository,
//!     service::TaskReconciler,
//! };
//! use chrono::{Duration, Utc};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("caretrack.db").await?;
//!     let reconciler = TaskReconciler::new(SqliteRepository::new(pool));
//!
//!     let window = DateWindow::new(Utc::now(), Utc::now() + Duration::days(7))?;
//!     let team_ids = vec![Uuid::now_v7()];
//!
//!     let tasks = reconciler
//!         .get_care_tasks(&window, &team_ids, false, true)
//!         .await?;
//!     for task in tasks {
//!         println!("{} {}", task.date(), task.title());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod error;
pub mod models;
pub mod recurrence;
pub mod repository;
pub mod service;
