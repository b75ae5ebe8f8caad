//! Agent reference resolution for CLI commands.
//!
//! An agent can be named by its full UUID, any unique prefix of it (like git
//! short hashes), or its exact session name.

use anyhow::{bail, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

const AGENT_QUERY: &str = "SELECT id FROM agents WHERE id LIKE ? UNION SELECT id FROM agents WHERE name = ?";

fn is_prefix_like(reference: &str) -> bool {
    reference.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

/// Resolve an agent reference to its id.
pub async fn resolve_agent_id(pool: &SqlitePool, reference: &str) -> Result<Uuid> {
    // Fast path: if it parses as a full UUID, return directly
    if let Ok(uuid) = Uuid::parse_str(reference) {
        return Ok(uuid);
    }
    if reference.is_empty() {
        bail!("Agent reference must not be empty");
    }

    // A name that happens to look like hex must not match arbitrary ids.
    let pattern = if is_prefix_like(reference) {
        format!("{}%", reference.to_lowercase())
    } else {
        String::new()
    };

    let rows: Vec<(String,)> = sqlx::query_as(AGENT_QUERY)
        .bind(&pattern)
        .bind(reference)
        .fetch_all(pool)
        .await?;

    match rows.as_slice() {
        [] => bail!("No agent found matching '{reference}'"),
        [(id,)] => Ok(Uuid::parse_str(id)?),
        many => {
            let mut msg = format!("Ambiguous agent reference '{reference}': matches {} agents:", many.len());
            for (id,) in many {
                msg.push_str(&format!("\n  {id}"));
            }
            bail!("{msg}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteAgentRepository};
    use crate::domain::models::Agent;
    use crate::domain::ports::AgentRepository;

    #[tokio::test]
    async fn test_resolves_full_id_prefix_and_name() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteAgentRepository::new(pool.clone());
        let agent = Agent::new("builder");
        repo.create(&agent).await.unwrap();

        let full = agent.id.to_string();
        assert_eq!(resolve_agent_id(&pool, &full).await.unwrap(), agent.id);
        assert_eq!(resolve_agent_id(&pool, &full[..8]).await.unwrap(), agent.id);
        assert_eq!(resolve_agent_id(&pool, "builder").await.unwrap(), agent.id);
    }

    #[tokio::test]
    async fn test_unknown_and_empty_references_fail() {
        let pool = create_migrated_test_pool().await.unwrap();
        assert!(resolve_agent_id(&pool, "nobody").await.is_err());
        assert!(resolve_agent_id(&pool, "").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_names_are_ambiguous() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteAgentRepository::new(pool.clone());
        repo.create(&Agent::new("twin")).await.unwrap();
        repo.create(&Agent::new("twin")).await.unwrap();

        let err = resolve_agent_id(&pool, "twin").await.unwrap_err();
        assert!(err.to_string().contains("Ambiguous"));
    }
}
