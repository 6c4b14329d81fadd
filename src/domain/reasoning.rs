use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::AgentId;

/// Append-only narrative record attributed to one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningLogEntry {
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub agent_id: AgentId,
}

/// Insert payload for a reasoning log; the store stamps `created_at`
#[derive(Debug, Clone, PartialEq)]
pub struct NewReasoningLog {
    pub content: String,
    pub agent_id: AgentId,
}
