//! SQLite adapter for CommandRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{format_datetime, parse_datetime, parse_optional_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Command, CommandState};
use crate::domain::ports::CommandRepository;

#[derive(Clone)]
pub struct SqliteCommandRepository {
    pool: SqlitePool,
}

impl SqliteCommandRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CommandRow {
    id: String,
    agent_id: String,
    state: String,
    started_at: String,
    completed_at: Option<String>,
    updated_at: String,
}

fn row_to_command(row: CommandRow) -> DomainResult<Command> {
    let state = CommandState::from_str(&row.state)
        .ok_or_else(|| DomainError::SerializationError(format!("unknown command state: {}", row.state)))?;

    Ok(Command {
        id: parse_uuid(&row.id)?,
        agent_id: parse_uuid(&row.agent_id)?,
        state,
        started_at: parse_datetime(&row.started_at)?,
        completed_at: parse_optional_datetime(row.completed_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

#[async_trait]
impl CommandRepository for SqliteCommandRepository {
    async fn create(&self, command: &Command) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO commands (id, agent_id, state, started_at, completed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(command.id.to_string())
        .bind(command.agent_id.to_string())
        .bind(command.state.as_str())
        .bind(format_datetime(&command.started_at))
        .bind(command.completed_at.as_ref().map(format_datetime))
        .bind(format_datetime(&command.updated_at))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Command>> {
        let row: Option<CommandRow> = sqlx::query_as("SELECT * FROM commands WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_command).transpose()
    }

    async fn update_state(
        &self,
        id: Uuid,
        from: CommandState,
        to: CommandState,
        completed_at: Option<DateTime<Utc>>,
    ) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE commands SET state = ?1, completed_at = ?2, updated_at = ?3
             WHERE id = ?4 AND state = ?5",
        )
        .bind(to.as_str())
        .bind(completed_at.as_ref().map(format_datetime))
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<(String,)> = sqlx::query_as("SELECT state FROM commands WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                None => DomainError::CommandNotFound(id),
                Some(_) => DomainError::ConcurrencyConflict {
                    entity: "command".to_string(),
                    id: id.to_string(),
                },
            });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_for_agent(&self, agent_id: Uuid) -> DomainResult<Vec<Command>> {
        let rows: Vec<CommandRow> =
            sqlx::query_as("SELECT * FROM commands WHERE agent_id = ? ORDER BY started_at DESC, rowid DESC")
                .bind(agent_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(row_to_command).collect()
    }
}
