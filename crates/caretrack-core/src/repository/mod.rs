use crate::db::DbPool;
use crate::error::CoreError;
use crate::models::{
    CareTask, DateWindow, EventCancellation, EventException, EventMaster, NewCareTask,
    NewEventCancellation, NewEventException, NewEventMaster, TeamConfig,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

// Domain module implementations
pub mod calendar;
pub mod care_tasks;
pub mod team_config;

/// Read and write access to event masters, exceptions, and cancellations.
///
/// The `_from_to` readers scope every query by team id set and an inclusive
/// date window; they never return rows for teams outside the given set.
#[async_trait]
pub trait CalendarRepository {
    /// Validates the recurrence rule, then persists the master.
    async fn add_event_master(&self, data: NewEventMaster) -> Result<EventMaster, CoreError>;
    async fn find_event_master_by_id(&self, id: Uuid) -> Result<Option<EventMaster>, CoreError>;
    /// Masters whose series can produce occurrences inside the window:
    /// `date_start <= window.end` and `date_until` absent or `>= window.start`.
    async fn find_event_masters_from_to(
        &self,
        window: &DateWindow,
        team_ids: &[Uuid],
        only_critical: bool,
    ) -> Result<Vec<EventMaster>, CoreError>;
    /// Bulk lookup used to resolve masters referenced only by an exception
    /// whose own series window does not intersect the query window.
    async fn find_event_masters_by_ids(&self, ids: &[Uuid]) -> Result<Vec<EventMaster>, CoreError>;
    /// Removes the master together with its exceptions and cancellations.
    async fn delete_event_master(&self, id: Uuid) -> Result<(), CoreError>;

    async fn add_event_exception(
        &self,
        data: NewEventException,
    ) -> Result<EventException, CoreError>;
    /// Exceptions relevant to the window: either the occurrence was moved
    /// into it (`new_date` in window) or it originates inside it
    /// (`original_date` in window, needed to suppress the raw candidate).
    async fn find_event_exceptions_from_to(
        &self,
        window: &DateWindow,
        team_ids: &[Uuid],
    ) -> Result<Vec<EventException>, CoreError>;

    async fn add_event_cancellation(
        &self,
        data: NewEventCancellation,
    ) -> Result<EventCancellation, CoreError>;
    async fn find_event_cancellations_from_to(
        &self,
        window: &DateWindow,
        team_ids: &[Uuid],
    ) -> Result<Vec<EventCancellation>, CoreError>;
}

/// Read and write access to materialized care-task rows.
#[async_trait]
pub trait CareTaskRepository {
    async fn add_care_task(&self, data: NewCareTask) -> Result<CareTask, CoreError>;
    async fn find_care_task_by_id(&self, id: Uuid) -> Result<Option<CareTask>, CoreError>;
    async fn find_care_tasks_from_to(
        &self,
        window: &DateWindow,
        team_ids: &[Uuid],
        only_critical: bool,
        only_not_done: bool,
    ) -> Result<Vec<CareTask>, CoreError>;
    /// Marks a task done. Idempotent: a task that is already done keeps its
    /// original `done_at` and `done_by_user_id`.
    async fn complete_care_task(
        &self,
        id: Uuid,
        done_by_user_id: Uuid,
        done_at: DateTime<Utc>,
    ) -> Result<CareTask, CoreError>;
    /// Clears completion state.
    async fn reopen_care_task(&self, id: Uuid) -> Result<CareTask, CoreError>;
    async fn delete_care_task(&self, id: Uuid) -> Result<(), CoreError>;
}

/// Access to per-team reconciliation configuration.
#[async_trait]
pub trait TeamConfigRepository {
    /// Config rows for the given teams; teams without a row are absent from
    /// the result, which the reconciler treats as "nothing materialized yet".
    async fn find_team_configs(&self, team_ids: &[Uuid]) -> Result<Vec<TeamConfig>, CoreError>;
    /// Creates or updates the team's materialization cutoff.
    async fn set_cloned_care_tasks_until(
        &self,
        team_id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<TeamConfig, CoreError>;
}

/// Main repository trait that composes all domain traits.
#[async_trait]
pub trait Repository: CalendarRepository + CareTaskRepository + TeamConfigRepository {}

/// SQLite implementation of the repository pattern.
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Database pool accessor for the domain modules.
    pub(crate) fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl Repository for SqliteRepository {}
