//! SQLite adapter for AgentRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{format_datetime, parse_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Agent;
use crate::domain::ports::AgentRepository;

#[derive(Clone)]
pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn touch(&self, id: Uuid, column: &str, value: Option<String>) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("UPDATE agents SET {column} = ?, updated_at = ? WHERE id = ?");
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(format_datetime(&Utc::now()))
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AgentNotFound(id));
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    name: String,
    pane_id: Option<String>,
    transcript_path: Option<String>,
    active_command_id: Option<String>,
    transcript_cursor: i64,
    created_at: String,
    updated_at: String,
}

fn row_to_agent(row: AgentRow) -> DomainResult<Agent> {
    Ok(Agent {
        id: parse_uuid(&row.id)?,
        name: row.name,
        pane_id: row.pane_id,
        transcript_path: row.transcript_path,
        active_command_id: parse_optional_uuid(row.active_command_id)?,
        transcript_cursor: u64::try_from(row.transcript_cursor).unwrap_or(0),
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn create(&self, agent: &Agent) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO agents
             (id, name, pane_id, transcript_path, active_command_id, transcript_cursor, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(agent.id.to_string())
        .bind(&agent.name)
        .bind(&agent.pane_id)
        .bind(&agent.transcript_path)
        .bind(agent.active_command_id.map(|id| id.to_string()))
        .bind(i64::try_from(agent.transcript_cursor).unwrap_or(i64::MAX))
        .bind(format_datetime(&agent.created_at))
        .bind(format_datetime(&agent.updated_at))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_agent).transpose()
    }

    async fn list(&self) -> DomainResult<Vec<Agent>> {
        let rows: Vec<AgentRow> = sqlx::query_as("SELECT * FROM agents ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_agent).collect()
    }

    async fn set_active_command(&self, id: Uuid, command_id: Option<Uuid>) -> DomainResult<()> {
        self.touch(id, "active_command_id", command_id.map(|c| c.to_string())).await
    }

    async fn update_transcript_cursor(&self, id: Uuid, cursor: u64) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE agents SET transcript_cursor = ?, updated_at = ? WHERE id = ?")
            .bind(i64::try_from(cursor).unwrap_or(i64::MAX))
            .bind(format_datetime(&Utc::now()))
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AgentNotFound(id));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_pane(&self, id: Uuid, pane_id: Option<String>) -> DomainResult<()> {
        self.touch(id, "pane_id", pane_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup() -> SqliteAgentRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteAgentRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get_agent() {
        let repo = setup().await;
        let agent = Agent::new("worker-1").with_pane("%3").with_transcript("/tmp/s.jsonl");
        repo.create(&agent).await.unwrap();

        let loaded = repo.get(agent.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "worker-1");
        assert_eq!(loaded.pane_id.as_deref(), Some("%3"));
        assert_eq!(loaded.transcript_path.as_deref(), Some("/tmp/s.jsonl"));
        assert_eq!(loaded.transcript_cursor, 0);
    }

    #[tokio::test]
    async fn test_get_missing_agent() {
        let repo = setup().await;
        assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cursor_and_pane_updates() {
        let repo = setup().await;
        let agent = Agent::new("worker-2");
        repo.create(&agent).await.unwrap();

        repo.update_transcript_cursor(agent.id, 42).await.unwrap();
        repo.update_pane(agent.id, Some("%9".to_string())).await.unwrap();

        let loaded = repo.get(agent.id).await.unwrap().unwrap();
        assert_eq!(loaded.transcript_cursor, 42);
        assert_eq!(loaded.pane_id.as_deref(), Some("%9"));
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_agent_fails() {
        let repo = setup().await;
        let err = repo.update_transcript_cursor(Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, DomainError::AgentNotFound(_)));
    }
}
