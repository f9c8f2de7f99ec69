use crate::error::CoreError;
use crate::models::{
    DateWindow, EventCancellation, EventException, EventMaster, NewEventCancellation,
    NewEventException, NewEventMaster,
};
use crate::recurrence::RecurrenceExpander;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

fn ensure_scope(label: &str, ids: &[Uuid]) -> Result<(), CoreError> {
    if ids.is_empty() {
        return Err(CoreError::InvalidInput(format!(
            "{} must not be empty",
            label
        )));
    }
    Ok(())
}

#[async_trait]
impl super::CalendarRepository for SqliteRepository {
    async fn add_event_master(&self, data: NewEventMaster) -> Result<EventMaster, CoreError> {
        // Reject malformed rules before they reach storage; a bad stored
        // rule would fail every later expansion of this team's calendar.
        RecurrenceExpander::validate_rule(&data.rule, data.date_start)?;

        let master = EventMaster {
            id: Uuid::now_v7(),
            title: data.title,
            description: data.description,
            rule: data.rule,
            date_start: data.date_start,
            date_until: data.date_until,
            task_type: data.task_type,
            team_id: data.team_id,
            created_by: data.created_by,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"INSERT INTO event_masters
            (id, title, description, rule, date_start, date_until, task_type, team_id, created_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(master.id)
        .bind(&master.title)
        .bind(&master.description)
        .bind(&master.rule)
        .bind(master.date_start)
        .bind(master.date_until)
        .bind(master.task_type)
        .bind(master.team_id)
        .bind(master.created_by)
        .bind(master.created_at)
        .execute(self.pool())
        .await?;

        Ok(master)
    }

    async fn find_event_master_by_id(&self, id: Uuid) -> Result<Option<EventMaster>, CoreError> {
        let master = sqlx::query_as("SELECT * FROM event_masters WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(master)
    }

    async fn find_event_masters_from_to(
        &self,
        window: &DateWindow,
        team_ids: &[Uuid],
        only_critical: bool,
    ) -> Result<Vec<EventMaster>, CoreError> {
        ensure_scope("team_ids", team_ids)?;

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM event_masters WHERE team_id IN (");
        let mut sep = qb.separated(", ");
        for id in team_ids {
            sep.push_bind(*id);
        }
        qb.push(") AND date_start <= ");
        qb.push_bind(window.end());
        qb.push(" AND (date_until IS NULL OR date_until >= ");
        qb.push_bind(window.start());
        qb.push(")");
        if only_critical {
            qb.push(" AND task_type = 'critical'");
        }
        qb.push(" ORDER BY date_start");

        let masters = qb
            .build_query_as::<EventMaster>()
            .fetch_all(self.pool())
            .await?;
        Ok(masters)
    }

    async fn find_event_masters_by_ids(&self, ids: &[Uuid]) -> Result<Vec<EventMaster>, CoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM event_masters WHERE id IN (");
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(*id);
        }
        qb.push(")");

        let masters = qb
            .build_query_as::<EventMaster>()
            .fetch_all(self.pool())
            .await?;
        Ok(masters)
    }

    async fn delete_event_master(&self, id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM event_exceptions WHERE event_master_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM event_cancellations WHERE event_master_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM event_masters WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "Event master with id {} not found",
                id
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn add_event_exception(
        &self,
        data: NewEventException,
    ) -> Result<EventException, CoreError> {
        let mut tx = self.pool().begin().await?;

        let master: Option<EventMaster> = sqlx::query_as("SELECT * FROM event_masters WHERE id = $1")
            .bind(data.event_master_id)
            .fetch_optional(&mut *tx)
            .await?;
        if master.is_none() {
            return Err(CoreError::NotFound(format!(
                "Event master with id {} not found",
                data.event_master_id
            )));
        }

        // One override per occurrence day: a second one would produce
        // duplicate merged occurrences downstream.
        let existing: Vec<EventException> =
            sqlx::query_as("SELECT * FROM event_exceptions WHERE event_master_id = $1")
                .bind(data.event_master_id)
                .fetch_all(&mut *tx)
                .await?;
        if existing
            .iter()
            .any(|ex| ex.original_date.date_naive() == data.original_date.date_naive())
        {
            return Err(CoreError::InvalidInput(format!(
                "Occurrence on {} already has an override",
                data.original_date.date_naive()
            )));
        }

        let exception = EventException {
            id: Uuid::now_v7(),
            event_master_id: data.event_master_id,
            original_date: data.original_date,
            new_date: data.new_date,
            title: data.title,
            description: data.description,
            task_type: data.task_type,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"INSERT INTO event_exceptions
            (id, event_master_id, original_date, new_date, title, description, task_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(exception.id)
        .bind(exception.event_master_id)
        .bind(exception.original_date)
        .bind(exception.new_date)
        .bind(&exception.title)
        .bind(&exception.description)
        .bind(exception.task_type)
        .bind(exception.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(exception)
    }

    async fn find_event_exceptions_from_to(
        &self,
        window: &DateWindow,
        team_ids: &[Uuid],
    ) -> Result<Vec<EventException>, CoreError> {
        ensure_scope("team_ids", team_ids)?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT ex.* FROM event_exceptions ex \
             JOIN event_masters em ON em.id = ex.event_master_id \
             WHERE em.team_id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in team_ids {
            sep.push_bind(*id);
        }
        // Relevant when moved into the window or originating inside it.
        qb.push(") AND ((ex.new_date >= ");
        qb.push_bind(window.start());
        qb.push(" AND ex.new_date <= ");
        qb.push_bind(window.end());
        qb.push(") OR (ex.original_date >= ");
        qb.push_bind(window.start());
        qb.push(" AND ex.original_date <= ");
        qb.push_bind(window.end());
        qb.push(")) ORDER BY ex.new_date");

        let exceptions = qb
            .build_query_as::<EventException>()
            .fetch_all(self.pool())
            .await?;
        Ok(exceptions)
    }

    async fn add_event_cancellation(
        &self,
        data: NewEventCancellation,
    ) -> Result<EventCancellation, CoreError> {
        let master: Option<EventMaster> = sqlx::query_as("SELECT * FROM event_masters WHERE id = $1")
            .bind(data.event_master_id)
            .fetch_optional(self.pool())
            .await?;
        if master.is_none() {
            return Err(CoreError::NotFound(format!(
                "Event master with id {} not found",
                data.event_master_id
            )));
        }

        let cancellation = EventCancellation {
            id: Uuid::now_v7(),
            event_master_id: data.event_master_id,
            original_date: data.original_date,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"INSERT INTO event_cancellations (id, event_master_id, original_date, created_at)
            VALUES ($1, $2, $3, $4)"#,
        )
        .bind(cancellation.id)
        .bind(cancellation.event_master_id)
        .bind(cancellation.original_date)
        .bind(cancellation.created_at)
        .execute(self.pool())
        .await?;

        Ok(cancellation)
    }

    async fn find_event_cancellations_from_to(
        &self,
        window: &DateWindow,
        team_ids: &[Uuid],
    ) -> Result<Vec<EventCancellation>, CoreError> {
        ensure_scope("team_ids", team_ids)?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT c.* FROM event_cancellations c \
             JOIN event_masters em ON em.id = c.event_master_id \
             WHERE em.team_id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in team_ids {
            sep.push_bind(*id);
        }
        qb.push(") AND c.original_date >= ");
        qb.push_bind(window.start());
        qb.push(" AND c.original_date <= ");
        qb.push_bind(window.end());
        qb.push(" ORDER BY c.original_date");

        let cancellations = qb
            .build_query_as::<EventCancellation>()
            .fetch_all(self.pool())
            .await?;
        Ok(cancellations)
    }
}
