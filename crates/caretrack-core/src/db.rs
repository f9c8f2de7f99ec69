use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::CoreError;

pub type DbPool = SqlitePool;

/// Opens (creating if necessary) the SQLite database at `database_path` and
/// ensures the schema exists.
pub async fn establish_connection(database_path: &str) -> Result<DbPool, CoreError> {
    let options = SqliteConnectOptions::new()
        .filename(database_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Idempotent schema bootstrap. Timestamps are stored as TEXT (UTC, fixed
/// format, so range predicates compare correctly); uuids as BLOB.
async fn init_schema(pool: &DbPool) -> Result<(), CoreError> {
    let statements = [
        r#"CREATE TABLE IF NOT EXISTS event_masters (
            id BLOB PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            rule TEXT NOT NULL,
            date_start TEXT NOT NULL,
            date_until TEXT,
            task_type TEXT NOT NULL DEFAULT 'normal',
            team_id BLOB NOT NULL,
            created_by BLOB NOT NULL,
            created_at TEXT NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS event_exceptions (
            id BLOB PRIMARY KEY,
            event_master_id BLOB NOT NULL REFERENCES event_masters(id) ON DELETE CASCADE,
            original_date TEXT NOT NULL,
            new_date TEXT NOT NULL,
            title TEXT,
            description TEXT,
            task_type TEXT,
            created_at TEXT NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS event_cancellations (
            id BLOB PRIMARY KEY,
            event_master_id BLOB NOT NULL REFERENCES event_masters(id) ON DELETE CASCADE,
            original_date TEXT NOT NULL,
            created_at TEXT NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS care_tasks (
            id BLOB PRIMARY KEY,
            event_master_id BLOB REFERENCES event_masters(id) ON DELETE SET NULL,
            team_id BLOB NOT NULL,
            date TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            details TEXT,
            task_type TEXT NOT NULL DEFAULT 'normal',
            done_at TEXT,
            done_by_user_id BLOB,
            created_by BLOB NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS team_configs (
            team_id BLOB PRIMARY KEY,
            cloned_care_tasks_until TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
        "CREATE INDEX IF NOT EXISTS idx_event_masters_team_start
            ON event_masters(team_id, date_start)",
        "CREATE INDEX IF NOT EXISTS idx_event_exceptions_master
            ON event_exceptions(event_master_id, original_date)",
        "CREATE INDEX IF NOT EXISTS idx_event_cancellations_master
            ON event_cancellations(event_master_id, original_date)",
        "CREATE INDEX IF NOT EXISTS idx_care_tasks_team_date
            ON care_tasks(team_id, date)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
