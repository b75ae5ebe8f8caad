//! SQLite adapter for TurnRepository.
//!
//! Turns are append-only. The only in-place edits are the timestamp
//! correction and the one-time content hash back-fill the reconciler applies.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{format_datetime, parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Turn, TurnActor, TurnIntent, TurnSource};
use crate::domain::ports::TurnRepository;

#[derive(Clone)]
pub struct SqliteTurnRepository {
    pool: SqlitePool,
}

impl SqliteTurnRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TurnRow {
    id: String,
    command_id: String,
    agent_id: String,
    actor: String,
    intent: String,
    text: String,
    timestamp: String,
    content_hash: Option<String>,
    source_confidence: f64,
    source: String,
    created_at: String,
}

fn row_to_turn(row: TurnRow) -> DomainResult<Turn> {
    let actor = TurnActor::from_str(&row.actor)
        .ok_or_else(|| DomainError::SerializationError(format!("unknown actor: {}", row.actor)))?;
    let intent = TurnIntent::from_str(&row.intent)
        .ok_or_else(|| DomainError::SerializationError(format!("unknown intent: {}", row.intent)))?;

    Ok(Turn {
        id: parse_uuid(&row.id)?,
        command_id: parse_uuid(&row.command_id)?,
        agent_id: parse_uuid(&row.agent_id)?,
        actor,
        intent,
        text: row.text,
        timestamp: parse_datetime(&row.timestamp)?,
        content_hash: row.content_hash,
        source_confidence: row.source_confidence,
        source: TurnSource::from_str(&row.source).unwrap_or_default(),
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[async_trait]
impl TurnRepository for SqliteTurnRepository {
    async fn create(&self, turn: &Turn) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO turns
             (id, command_id, agent_id, actor, intent, text, timestamp,
              content_hash, source_confidence, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(turn.id.to_string())
        .bind(turn.command_id.to_string())
        .bind(turn.agent_id.to_string())
        .bind(turn.actor.as_str())
        .bind(turn.intent.as_str())
        .bind(&turn.text)
        .bind(format_datetime(&turn.timestamp))
        .bind(&turn.content_hash)
        .bind(turn.source_confidence)
        .bind(turn.source.as_str())
        .bind(format_datetime(&turn.created_at))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Turn>> {
        let row: Option<TurnRow> = sqlx::query_as("SELECT * FROM turns WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_turn).transpose()
    }

    async fn list_for_command(&self, command_id: Uuid) -> DomainResult<Vec<Turn>> {
        let rows: Vec<TurnRow> =
            sqlx::query_as("SELECT * FROM turns WHERE command_id = ? ORDER BY timestamp ASC, rowid ASC")
                .bind(command_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(row_to_turn).collect()
    }

    async fn list_for_agent_since(&self, agent_id: Uuid, since: DateTime<Utc>) -> DomainResult<Vec<Turn>> {
        let rows: Vec<TurnRow> = sqlx::query_as(
            "SELECT * FROM turns WHERE agent_id = ? AND timestamp >= ? ORDER BY timestamp ASC, rowid ASC",
        )
        .bind(agent_id.to_string())
        .bind(format_datetime(&since))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_turn).collect()
    }

    async fn count_for_agent(&self, agent_id: Uuid) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM turns WHERE agent_id = ?")
            .bind(agent_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn correct_timestamp(&self, id: Uuid, timestamp: DateTime<Utc>) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE turns SET timestamp = ? WHERE id = ?")
            .bind(format_datetime(&timestamp))
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TurnNotFound(id));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn backfill_content_hash(&self, id: Uuid, hash: &str) -> DomainResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE turns SET content_hash = ? WHERE id = ? AND content_hash IS NULL")
            .bind(hash)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upgrade_content_hash(&self, id: Uuid, from: &str, to: &str) -> DomainResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE turns SET content_hash = ? WHERE id = ? AND content_hash = ?")
            .bind(to)
            .bind(id.to_string())
            .bind(from)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
