use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, instrument};

use super::record_store::RecordStore;
use crate::domain::{
    Agent, AgentId, AgentScope, AgentStatus, ApiKeyRecord, NewAgent, NewReasoningLog, Provider,
    ReasoningLogEntry,
};
use crate::error::{HiveError, Result};

const AGENT_COLUMNS: &str =
    r#"id, name, persona, provider, user_id, status, COALESCE("yield", 0) AS "yield", model, created_at"#;

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map an `agents` row, coercing a NULL status to active at this edge
fn agent_from_row(r: &PgRow) -> Result<Agent> {
    let provider_str: String = r.try_get("provider")?;
    let provider = provider_str
        .parse::<Provider>()
        .map_err(HiveError::Validation)?;

    Ok(Agent {
        id: r.try_get("id")?,
        name: r.try_get("name")?,
        persona: r.try_get::<Option<String>, _>("persona")?.unwrap_or_default(),
        provider,
        owner_id: r.try_get("user_id")?,
        status: AgentStatus::from_stored(r.try_get::<Option<String>, _>("status")?.as_deref()),
        cumulative_yield: r.try_get("yield")?,
        model: r.try_get::<Option<String>, _>("model")?.unwrap_or_default(),
        created_at: r.try_get("created_at")?,
    })
}

#[async_trait]
impl RecordStore for PostgresStore {
    #[instrument(skip(self))]
    async fn list_agents(&self, scope: &AgentScope) -> Result<Vec<Agent>> {
        let rows = match scope {
            AgentScope::Hive => {
                sqlx::query(&format!(
                    "SELECT {AGENT_COLUMNS} FROM agents ORDER BY created_at ASC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
            AgentScope::Owner(owner) => {
                sqlx::query(&format!(
                    "SELECT {AGENT_COLUMNS} FROM agents WHERE user_id = $1 ORDER BY created_at ASC"
                ))
                .bind(owner)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let agents = rows.iter().map(agent_from_row).collect::<Result<Vec<_>>>()?;
        debug!("Listed {} agents", agents.len());
        Ok(agents)
    }

    #[instrument(skip(self, agent), fields(name = %agent.name))]
    async fn insert_agent(&self, agent: &NewAgent) -> Result<Agent> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO agents (name, persona, provider, user_id, "yield", status, model)
            VALUES ($1, $2, $3, $4, 0, 'active', $5)
            RETURNING {AGENT_COLUMNS}
            "#
        ))
        .bind(&agent.name)
        .bind(&agent.persona)
        .bind(agent.provider.as_str())
        .bind(agent.owner_id)
        .bind(&agent.model)
        .fetch_one(&self.pool)
        .await
        .map_err(HiveError::write)?;

        agent_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn update_agent_status(&self, id: AgentId, status: AgentStatus) -> Result<()> {
        let result = sqlx::query("UPDATE agents SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(HiveError::write)?;

        if result.rows_affected() == 0 {
            return Err(HiveError::AgentNotFound(id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_agent_yield(&self, id: AgentId, delta: Decimal) -> Result<Decimal> {
        let row = sqlx::query(
            r#"
            UPDATE agents SET "yield" = COALESCE("yield", 0) + $2
            WHERE id = $1
            RETURNING "yield"
            "#,
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(HiveError::write)?;

        match row {
            Some(r) => Ok(r.try_get("yield")?),
            None => Err(HiveError::AgentNotFound(id)),
        }
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<ReasoningLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT content, created_at, agent_id
            FROM reasoning_logs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(ReasoningLogEntry {
                    content: r.try_get("content")?,
                    created_at: r.try_get("created_at")?,
                    agent_id: r.try_get("agent_id")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, entry), fields(agent_id = %entry.agent_id))]
    async fn append_log(&self, entry: &NewReasoningLog) -> Result<ReasoningLogEntry> {
        let row = sqlx::query(
            r#"
            INSERT INTO reasoning_logs (content, agent_id)
            VALUES ($1, $2)
            RETURNING content, created_at, agent_id
            "#,
        )
        .bind(&entry.content)
        .bind(entry.agent_id)
        .fetch_one(&self.pool)
        .await
        .map_err(HiveError::write)?;

        Ok(ReasoningLogEntry {
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            agent_id: row.try_get("agent_id")?,
        })
    }

    #[instrument(skip(self, record), fields(owner = %record.owner_id, provider = %record.provider))]
    async fn upsert_api_key(&self, record: &ApiKeyRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_api_keys (user_id, provider, api_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, provider) DO UPDATE SET
                api_key = EXCLUDED.api_key
            "#,
        )
        .bind(record.owner_id)
        .bind(record.provider.as_str())
        .bind(&record.api_key)
        .execute(&self.pool)
        .await
        .map_err(HiveError::write)?;

        Ok(())
    }
}
