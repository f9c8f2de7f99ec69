use crate::error::CoreError;
use crate::models::TeamConfig;
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

#[async_trait]
impl super::TeamConfigRepository for SqliteRepository {
    async fn find_team_configs(&self, team_ids: &[Uuid]) -> Result<Vec<TeamConfig>, CoreError> {
        if team_ids.is_empty() {
            return Err(CoreError::InvalidInput(
                "team_ids must not be empty".to_string(),
            ));
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM team_configs WHERE team_id IN (");
        let mut sep = qb.separated(", ");
        for id in team_ids {
            sep.push_bind(*id);
        }
        qb.push(")");

        let configs = qb
            .build_query_as::<TeamConfig>()
            .fetch_all(self.pool())
            .await?;
        Ok(configs)
    }

    async fn set_cloned_care_tasks_until(
        &self,
        team_id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<TeamConfig, CoreError> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO team_configs (team_id, cloned_care_tasks_until, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT(team_id) DO UPDATE SET
                cloned_care_tasks_until = excluded.cloned_care_tasks_until,
                updated_at = excluded.updated_at"#,
        )
        .bind(team_id)
        .bind(until)
        .bind(now)
        .execute(self.pool())
        .await?;

        let config = sqlx::query_as("SELECT * FROM team_configs WHERE team_id = $1")
            .bind(team_id)
            .fetch_one(self.pool())
            .await?;
        Ok(config)
    }
}
