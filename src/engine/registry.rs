//! Agent registry: listing, status toggling, and credential-gated registration

use std::sync::Arc;
use tracing::{info, instrument, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::adapters::{ConnectivityCheck, RecordStore};
use crate::domain::{
    Agent, AgentDraft, AgentId, AgentScope, AgentStatus, ApiKeyRecord, NewAgent, Principal,
    Provider,
};
use crate::error::{HiveError, Result};

/// A credential the provider has accepted. Only [`AgentRegistry::verify_credential`]
/// hands these out.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct VerifiedCredential {
    #[zeroize(skip)]
    provider: Provider,
    api_key: String,
}

impl VerifiedCredential {
    pub fn provider(&self) -> Provider {
        self.provider
    }
}

impl std::fmt::Debug for VerifiedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedCredential")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

pub struct AgentRegistry {
    store: Arc<dyn RecordStore>,
    connectivity: Arc<dyn ConnectivityCheck>,
}

impl AgentRegistry {
    pub fn new(store: Arc<dyn RecordStore>, connectivity: Arc<dyn ConnectivityCheck>) -> Self {
        Self {
            store,
            connectivity,
        }
    }

    pub async fn list_agents(&self, scope: &AgentScope) -> Result<Vec<Agent>> {
        self.store.list_agents(scope).await
    }

    #[instrument(skip(self))]
    pub async fn set_agent_status(&self, id: AgentId, status: AgentStatus) -> Result<()> {
        self.store.update_agent_status(id, status).await?;
        info!(%id, %status, "Agent status updated");
        Ok(())
    }

    /// Flip an agent's status. The status was coerced on read, so unset
    /// always toggles to paused.
    pub async fn toggle_status(&self, agent: &Agent) -> Result<AgentStatus> {
        let next = agent.status.toggled();
        self.set_agent_status(agent.id, next).await?;
        Ok(next)
    }

    /// Run the connectivity exchange. `Ok(None)` means the provider did not
    /// accept the key and registration stays disabled.
    pub async fn verify_credential(
        &self,
        provider: Provider,
        api_key: &str,
    ) -> Result<Option<VerifiedCredential>> {
        if self.connectivity.check(provider, api_key).await? {
            info!(%provider, "Credential verified");
            Ok(Some(VerifiedCredential {
                provider,
                api_key: api_key.to_string(),
            }))
        } else {
            warn!(%provider, "Credential rejected by provider");
            Ok(None)
        }
    }

    /// Persist the owner's credential, then create the agent.
    ///
    /// A rejected credential write aborts before any agent row exists.
    #[instrument(skip(self, principal, credential), fields(owner = %principal.user_id))]
    pub async fn register_agent(
        &self,
        principal: &Principal,
        draft: AgentDraft,
        credential: &VerifiedCredential,
    ) -> Result<Agent> {
        let name = draft.name.trim();
        let persona = draft.persona.trim();
        if name.is_empty() {
            return Err(HiveError::Validation("agent name is required".to_string()));
        }
        if persona.is_empty() {
            return Err(HiveError::Validation("agent persona is required".to_string()));
        }

        let record = ApiKeyRecord {
            owner_id: principal.user_id,
            provider: credential.provider,
            api_key: credential.api_key.clone(),
        };
        self.store.upsert_api_key(&record).await?;

        let agent = self
            .store
            .insert_agent(&NewAgent {
                name: name.to_string(),
                persona: persona.to_string(),
                provider: credential.provider,
                owner_id: principal.user_id,
                model: credential.provider.default_model().to_string(),
            })
            .await?;

        info!(id = %agent.id, name = %agent.name, provider = %agent.provider, "Agent registered");
        Ok(agent)
    }
}
