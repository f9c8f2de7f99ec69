use crate::error::CoreError;
use crate::models::{CareTask, DateWindow, NewCareTask};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

#[async_trait]
impl super::CareTaskRepository for SqliteRepository {
    async fn add_care_task(&self, data: NewCareTask) -> Result<CareTask, CoreError> {
        let now = Utc::now();
        let task = CareTask {
            id: Uuid::now_v7(),
            event_master_id: data.event_master_id,
            team_id: data.team_id,
            date: data.date,
            title: data.title,
            description: data.description,
            details: data.details,
            task_type: data.task_type,
            done_at: None,
            done_by_user_id: None,
            created_by: data.created_by,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"INSERT INTO care_tasks
            (id, event_master_id, team_id, date, title, description, details, task_type,
             done_at, done_by_user_id, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"#,
        )
        .bind(task.id)
        .bind(task.event_master_id)
        .bind(task.team_id)
        .bind(task.date)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.details)
        .bind(task.task_type)
        .bind(task.done_at)
        .bind(task.done_by_user_id)
        .bind(task.created_by)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(self.pool())
        .await?;

        Ok(task)
    }

    async fn find_care_task_by_id(&self, id: Uuid) -> Result<Option<CareTask>, CoreError> {
        let task = sqlx::query_as("SELECT * FROM care_tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(task)
    }

    async fn find_care_tasks_from_to(
        &self,
        window: &DateWindow,
        team_ids: &[Uuid],
        only_critical: bool,
        only_not_done: bool,
    ) -> Result<Vec<CareTask>, CoreError> {
        if team_ids.is_empty() {
            return Err(CoreError::InvalidInput(
                "team_ids must not be empty".to_string(),
            ));
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM care_tasks WHERE team_id IN (");
        let mut sep = qb.separated(", ");
        for id in team_ids {
            sep.push_bind(*id);
        }
        qb.push(") AND date >= ");
        qb.push_bind(window.start());
        qb.push(" AND date <= ");
        qb.push_bind(window.end());
        if only_critical {
            qb.push(" AND task_type = 'critical'");
        }
        if only_not_done {
            qb.push(" AND done_at IS NULL");
        }
        qb.push(" ORDER BY date");

        let tasks = qb
            .build_query_as::<CareTask>()
            .fetch_all(self.pool())
            .await?;
        Ok(tasks)
    }

    async fn complete_care_task(
        &self,
        id: Uuid,
        done_by_user_id: Uuid,
        done_at: DateTime<Utc>,
    ) -> Result<CareTask, CoreError> {
        let mut tx = self.pool().begin().await?;

        let task: Option<CareTask> = sqlx::query_as("SELECT * FROM care_tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let task = task
            .ok_or_else(|| CoreError::NotFound(format!("Care task with id {} not found", id)))?;

        // Idempotent: completing an already-done task keeps the original
        // completion record.
        if task.done_at.is_some() {
            return Ok(task);
        }

        let updated_at = Utc::now();
        sqlx::query(
            "UPDATE care_tasks SET done_at = $1, done_by_user_id = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(done_at)
        .bind(done_by_user_id)
        .bind(updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CareTask {
            done_at: Some(done_at),
            done_by_user_id: Some(done_by_user_id),
            updated_at,
            ..task
        })
    }

    async fn reopen_care_task(&self, id: Uuid) -> Result<CareTask, CoreError> {
        let updated_at = Utc::now();
        let result = sqlx::query(
            "UPDATE care_tasks SET done_at = NULL, done_by_user_id = NULL, updated_at = $1 WHERE id = $2",
        )
        .bind(updated_at)
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "Care task with id {} not found",
                id
            )));
        }

        let task = sqlx::query_as("SELECT * FROM care_tasks WHERE id = $1")
            .bind(id)
            .fetch_one(self.pool())
            .await?;
        Ok(task)
    }

    async fn delete_care_task(&self, id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM care_tasks WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "Care task with id {} not found",
                id
            )));
        }

        Ok(())
    }
}
