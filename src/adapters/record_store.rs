//! Record store boundary: agents, reasoning logs, and provider credentials

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{
    Agent, AgentId, AgentScope, AgentStatus, ApiKeyRecord, NewAgent, NewReasoningLog,
    ReasoningLogEntry,
};
use crate::error::Result;

/// Collections the engine reads and writes. The schema is owned by the store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// List agents covered by `scope`, status already coerced
    async fn list_agents(&self, scope: &AgentScope) -> Result<Vec<Agent>>;

    /// Insert a new agent (yield 0, status active)
    async fn insert_agent(&self, agent: &NewAgent) -> Result<Agent>;

    /// Set an agent's status
    async fn update_agent_status(&self, id: AgentId, status: AgentStatus) -> Result<()>;

    /// Add `delta` to an agent's cumulative yield, returning the new value
    async fn add_agent_yield(&self, id: AgentId, delta: Decimal) -> Result<Decimal>;

    /// Most recent reasoning entries, newest first
    async fn recent_logs(&self, limit: usize) -> Result<Vec<ReasoningLogEntry>>;

    /// Append a reasoning entry
    async fn append_log(&self, entry: &NewReasoningLog) -> Result<ReasoningLogEntry>;

    /// Insert or replace the credential keyed by owner and provider
    async fn upsert_api_key(&self, record: &ApiKeyRecord) -> Result<()>;
}
