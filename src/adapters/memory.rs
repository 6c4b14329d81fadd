//! In-process record store for offline runs and tests

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::record_store::RecordStore;
use crate::domain::{
    Agent, AgentId, AgentScope, AgentStatus, ApiKeyRecord, NewAgent, NewReasoningLog, Provider,
    ReasoningLogEntry, UserId,
};
use crate::error::{HiveError, Result};

/// Operations that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListAgents,
    InsertAgent,
    UpdateStatus,
    AddYield,
    RecentLogs,
    AppendLog,
    UpsertApiKey,
}

#[derive(Default)]
struct Tables {
    agents: Vec<Agent>,
    logs: Vec<ReasoningLogEntry>,
    api_keys: HashMap<(UserId, Provider), String>,
    fail_ops: HashSet<StoreOp>,
    fail_log_for: HashSet<AgentId>,
}

/// Record store kept in memory. Counts every call so callers can assert quiescence.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an agent directly, bypassing registration
    pub async fn seed_agent(
        &self,
        name: &str,
        owner_id: UserId,
        status: AgentStatus,
        cumulative_yield: Decimal,
    ) -> Agent {
        let agent = Agent {
            id: Uuid::new_v4(),
            name: name.to_string(),
            persona: String::new(),
            provider: Provider::Google,
            owner_id,
            status,
            cumulative_yield,
            model: Provider::Google.default_model().to_string(),
            created_at: Some(Utc::now()),
        };
        self.tables.write().await.agents.push(agent.clone());
        agent
    }

    /// Make every call of `op` fail with a write rejection
    pub async fn fail_on(&self, op: StoreOp) {
        self.tables.write().await.fail_ops.insert(op);
    }

    /// Stop failing `op`
    pub async fn recover(&self, op: StoreOp) {
        self.tables.write().await.fail_ops.remove(&op);
    }

    /// Make log appends for one agent fail
    pub async fn fail_log_for(&self, agent_id: AgentId) {
        self.tables.write().await.fail_log_for.insert(agent_id);
    }

    pub async fn agent(&self, id: AgentId) -> Option<Agent> {
        self.tables
            .read()
            .await
            .agents
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    pub async fn agent_count(&self) -> usize {
        self.tables.read().await.agents.len()
    }

    pub async fn log_count(&self) -> usize {
        self.tables.read().await.logs.len()
    }

    pub async fn logs(&self) -> Vec<ReasoningLogEntry> {
        self.tables.read().await.logs.clone()
    }

    pub async fn api_key(&self, owner_id: UserId, provider: Provider) -> Option<String> {
        self.tables
            .read()
            .await
            .api_keys
            .get(&(owner_id, provider))
            .cloned()
    }

    /// Total store calls so far
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check(tables: &Tables, op: StoreOp) -> Result<()> {
        if tables.fail_ops.contains(&op) {
            return Err(HiveError::write(format!("{:?} rejected", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_agents(&self, scope: &AgentScope) -> Result<Vec<Agent>> {
        self.record_call();
        let tables = self.tables.read().await;
        Self::check(&tables, StoreOp::ListAgents)?;

        Ok(tables
            .agents
            .iter()
            .filter(|a| match scope {
                AgentScope::Hive => true,
                AgentScope::Owner(owner) => a.owner_id == *owner,
            })
            .cloned()
            .collect())
    }

    async fn insert_agent(&self, agent: &NewAgent) -> Result<Agent> {
        self.record_call();
        let mut tables = self.tables.write().await;
        Self::check(&tables, StoreOp::InsertAgent)?;

        let created = Agent {
            id: Uuid::new_v4(),
            name: agent.name.clone(),
            persona: agent.persona.clone(),
            provider: agent.provider,
            owner_id: agent.owner_id,
            status: AgentStatus::Active,
            cumulative_yield: Decimal::ZERO,
            model: agent.model.clone(),
            created_at: Some(Utc::now()),
        };
        tables.agents.push(created.clone());
        Ok(created)
    }

    async fn update_agent_status(&self, id: AgentId, status: AgentStatus) -> Result<()> {
        self.record_call();
        let mut tables = self.tables.write().await;
        Self::check(&tables, StoreOp::UpdateStatus)?;

        let agent = tables
            .agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(HiveError::AgentNotFound(id))?;
        agent.status = status;
        Ok(())
    }

    async fn add_agent_yield(&self, id: AgentId, delta: Decimal) -> Result<Decimal> {
        self.record_call();
        let mut tables = self.tables.write().await;
        Self::check(&tables, StoreOp::AddYield)?;

        let agent = tables
            .agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(HiveError::AgentNotFound(id))?;
        agent.cumulative_yield += delta;
        Ok(agent.cumulative_yield)
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<ReasoningLogEntry>> {
        self.record_call();
        let tables = self.tables.read().await;
        Self::check(&tables, StoreOp::RecentLogs)?;

        // Appends are chronological, so newest-first is the reversed tail.
        Ok(tables.logs.iter().rev().take(limit).cloned().collect())
    }

    async fn append_log(&self, entry: &NewReasoningLog) -> Result<ReasoningLogEntry> {
        self.record_call();
        let mut tables = self.tables.write().await;
        Self::check(&tables, StoreOp::AppendLog)?;
        if tables.fail_log_for.contains(&entry.agent_id) {
            return Err(HiveError::write(format!(
                "log append rejected for agent {}",
                entry.agent_id
            )));
        }

        let stored = ReasoningLogEntry {
            content: entry.content.clone(),
            created_at: Utc::now(),
            agent_id: entry.agent_id,
        };
        tables.logs.push(stored.clone());
        Ok(stored)
    }

    async fn upsert_api_key(&self, record: &ApiKeyRecord) -> Result<()> {
        self.record_call();
        let mut tables = self.tables.write().await;
        Self::check(&tables, StoreOp::UpsertApiKey)?;

        tables
            .api_keys
            .insert((record.owner_id, record.provider), record.api_key.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_scope_filters_by_owner() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.seed_agent("a", alice, AgentStatus::Active, dec!(0)).await;
        store.seed_agent("b", bob, AgentStatus::Paused, dec!(0)).await;

        assert_eq!(store.list_agents(&AgentScope::Hive).await.unwrap().len(), 2);
        let owned = store.list_agents(&AgentScope::Owner(alice)).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].name, "a");
        assert_eq!(store.call_count(), 2);
    }

    #[tokio::test]
    async fn test_recent_logs_newest_first() {
        let store = MemoryStore::new();
        let agent_id = Uuid::new_v4();
        for i in 0..7 {
            store
                .append_log(&NewReasoningLog {
                    content: format!("entry {i}"),
                    agent_id,
                })
                .await
                .unwrap();
        }

        let recent = store.recent_logs(5).await.unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].content, "entry 6");
        assert_eq!(recent[4].content, "entry 2");
    }

    #[tokio::test]
    async fn test_fail_on_rejects_as_write_error() {
        let store = MemoryStore::new();
        store.fail_on(StoreOp::UpsertApiKey).await;

        let err = store
            .upsert_api_key(&ApiKeyRecord {
                owner_id: Uuid::new_v4(),
                provider: Provider::Google,
                api_key: "k".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.is_write());
    }
}
