use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub type AgentId = Uuid;
pub type UserId = Uuid;

/// Text-generation provider backing an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    OpenAI,
    Anthropic,
}

impl Provider {
    /// Stored (lower-case) form
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    /// Model label recorded on newly registered agents
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Google => "Gemini-Flash",
            Provider::OpenAI => "GPT-4o-mini",
            Provider::Anthropic => "Claude-Haiku",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Google => write!(f, "Google"),
            Provider::OpenAI => write!(f, "OpenAI"),
            Provider::Anthropic => write!(f, "Anthropic"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "openai" => Ok(Provider::OpenAI),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Agent run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Active,
    Paused,
}

impl AgentStatus {
    /// Coerce a stored status. A missing value predates the column and means active.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value.map(|s| s.to_lowercase()) {
            Some(s) if s == "paused" => AgentStatus::Paused,
            _ => AgentStatus::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Paused => "paused",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            AgentStatus::Active => AgentStatus::Paused,
            AgentStatus::Paused => AgentStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, AgentStatus::Active)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user-owned simulated trading strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub persona: String,
    pub provider: Provider,
    pub owner_id: UserId,
    pub status: AgentStatus,
    /// Cumulative additive score, not a percentage return
    pub cumulative_yield: Decimal,
    pub model: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Agent {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Insert payload for a new agent
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub name: String,
    pub persona: String,
    pub provider: Provider,
    pub owner_id: UserId,
    pub model: String,
}

/// What the user fills in to register an agent
#[derive(Debug, Clone)]
pub struct AgentDraft {
    pub name: String,
    pub persona: String,
}

impl AgentDraft {
    pub fn new(name: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persona: persona.into(),
        }
    }
}

/// Provider credential owned by a user
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ApiKeyRecord {
    #[zeroize(skip)]
    pub owner_id: UserId,
    #[zeroize(skip)]
    pub provider: Provider,
    pub api_key: String,
}

impl std::fmt::Debug for ApiKeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyRecord")
            .field("owner_id", &self.owner_id)
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Which agents a listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentScope {
    /// Every agent in the store
    Hive,
    /// Only agents owned by one user
    Owner(UserId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_stored() {
        assert_eq!(AgentStatus::from_stored(None), AgentStatus::Active);
        assert_eq!(AgentStatus::from_stored(Some("active")), AgentStatus::Active);
        assert_eq!(AgentStatus::from_stored(Some("PAUSED")), AgentStatus::Paused);
    }

    #[test]
    fn test_toggle_twice_is_identity() {
        for status in [AgentStatus::Active, AgentStatus::Paused] {
            assert_eq!(status.toggled().toggled(), status);
        }
        // Unset status coerces to active, so a toggle always lands on paused.
        assert_eq!(AgentStatus::from_stored(None).toggled(), AgentStatus::Paused);
    }

    #[test]
    fn test_provider_roundtrip() {
        for provider in [Provider::Google, Provider::OpenAI, Provider::Anthropic] {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
        assert_eq!(Provider::Google.default_model(), "Gemini-Flash");
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let record = ApiKeyRecord {
            owner_id: Uuid::nil(),
            provider: Provider::OpenAI,
            api_key: "sk-secret".to_string(),
        };
        assert!(!format!("{record:?}").contains("sk-secret"));
    }
}
