//! The mounted engine: session gating, scheduler lifecycle, and user actions

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::chart::ChartFrame;
use super::cycle::{EngineCore, EngineDeps};
use super::registry::VerifiedCredential;
use super::scheduler::RefreshScheduler;
use super::simulation::{SimulationOutcome, SimulationTrigger};
use super::view::{ViewPhase, ViewState};
use crate::adapters::SessionSubscription;
use crate::config::AppConfig;
use crate::domain::{
    Agent, AgentDraft, AgentId, AgentStatus, ChartStyle, Granularity, Principal, Provider,
};
use crate::error::{HiveError, Result};

type SchedulerSlot = Arc<Mutex<Option<RefreshScheduler>>>;

/// A mounted dashboard engine.
///
/// Holds exactly one session subscription for its lifetime. Signing in starts
/// the refresh scheduler, signing out stops it, and [`Engine::teardown`]
/// releases everything.
pub struct Engine {
    core: Arc<EngineCore>,
    scheduler: SchedulerSlot,
    teardown: watch::Sender<bool>,
    watcher: Option<JoinHandle<()>>,
}

impl Engine {
    /// Query the session once, start scheduling if signed in, and begin
    /// following session changes.
    pub async fn mount(deps: EngineDeps, config: &AppConfig) -> Result<Self> {
        let sessions = deps.sessions.clone();
        let core = Arc::new(EngineCore::new(deps, config));
        let scheduler: SchedulerSlot = Arc::new(Mutex::new(None));

        // Subscribe first so no transition between the query and the
        // subscription is lost.
        let subscription = sessions.subscribe();
        let current = sessions.current_session().await?;
        apply_session(&core, &scheduler, current).await;

        let (teardown, teardown_rx) = watch::channel(false);
        let watcher = tokio::spawn(watch_sessions(
            core.clone(),
            scheduler.clone(),
            subscription,
            teardown_rx,
        ));

        info!("Engine mounted");
        Ok(Self {
            core,
            scheduler,
            teardown,
            watcher: Some(watcher),
        })
    }

    /// Stop both repeating tasks and release the session subscription
    pub async fn teardown(&mut self) {
        self.teardown.send_replace(true);
        if let Some(watcher) = self.watcher.take() {
            if let Err(e) = watcher.await {
                warn!("Session watcher ended abnormally: {}", e);
            }
        }
        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.stop().await;
        }
        info!("Engine torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        *self.teardown.borrow()
    }

    /// Whether the repeating tasks are live
    pub async fn is_scheduling(&self) -> bool {
        self.scheduler
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.is_running())
    }

    pub async fn view(&self) -> ViewState {
        self.core.snapshot().await
    }

    pub async fn chart(&self) -> Option<ChartFrame> {
        self.core.snapshot().await.chart()
    }

    pub async fn principal(&self) -> Option<Principal> {
        self.core.principal().await
    }

    /// Receiver that ticks after every completed refresh
    pub fn subscribe_refreshes(&self) -> watch::Receiver<u64> {
        self.core.subscribe_refreshes()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Principal> {
        self.ensure_mounted()?;
        let principal = self.core.deps().sessions.sign_in(email, password).await?;
        apply_session(&self.core, &self.scheduler, Some(principal.clone())).await;
        Ok(principal)
    }

    /// `Ok(None)` when the provider wants the address confirmed first
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Principal>> {
        self.ensure_mounted()?;
        let principal = self.core.deps().sessions.sign_up(email, password).await?;
        if principal.is_some() {
            apply_session(&self.core, &self.scheduler, principal.clone()).await;
        }
        Ok(principal)
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.core.deps().sessions.sign_out().await?;
        apply_session(&self.core, &self.scheduler, None).await;
        Ok(())
    }

    /// Switch the window preset and restart the refresh timer
    pub async fn set_granularity(&self, granularity: Granularity) {
        self.core.set_granularity(granularity).await;
        if let Some(scheduler) = self.scheduler.lock().await.as_ref() {
            scheduler.restart_refresh();
        }
        debug!(%granularity, "Granularity changed");
    }

    pub async fn set_chart_style(&self, style: ChartStyle) {
        self.core.set_chart_style(style).await;
    }

    /// Run a refresh now, outside the timer
    pub async fn refresh_now(&self) -> Result<()> {
        self.require_principal().await?;
        self.core.refresh().await;
        Ok(())
    }

    pub async fn verify_credential(
        &self,
        provider: Provider,
        api_key: &str,
    ) -> Result<Option<VerifiedCredential>> {
        self.require_principal().await?;
        self.core.registry().verify_credential(provider, api_key).await
    }

    /// Register an agent for the signed-in user. Failures surface to the
    /// caller and nothing is applied locally.
    pub async fn register_agent(
        &self,
        draft: AgentDraft,
        credential: &VerifiedCredential,
    ) -> Result<Agent> {
        let principal = self.require_principal().await?;
        let agent = self
            .core
            .registry()
            .register_agent(&principal, draft, credential)
            .await?;
        self.core.refresh().await;
        Ok(agent)
    }

    /// Toggle a listed agent between active and paused
    pub async fn toggle_agent_status(&self, id: AgentId) -> Result<AgentStatus> {
        self.require_principal().await?;
        let agent = self
            .core
            .snapshot()
            .await
            .agents
            .into_iter()
            .find(|a| a.id == id)
            .ok_or(HiveError::AgentNotFound(id))?;

        let status = self.core.registry().toggle_status(&agent).await?;
        self.core.refresh().await;
        Ok(status)
    }

    /// Manually trigger one simulation pass
    pub async fn simulate_now(&self) -> Result<SimulationOutcome> {
        self.require_principal().await?;
        // Signing out stops the pass after its current agent.
        let cancel = self.core.session_cancel(self.teardown.subscribe());
        Ok(self.core.simulate(SimulationTrigger::Manual, &cancel).await)
    }

    fn ensure_mounted(&self) -> Result<()> {
        if self.is_torn_down() {
            return Err(HiveError::Cancelled);
        }
        Ok(())
    }

    async fn require_principal(&self) -> Result<Principal> {
        self.ensure_mounted()?;
        self.core.principal().await.ok_or(HiveError::NotSignedIn)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Best effort when teardown was not awaited: the watcher exits and the
        // scheduler's own drop signals its tasks.
        self.teardown.send_replace(true);
    }
}

/// Move the engine to the state matching a session transition
async fn apply_session(core: &Arc<EngineCore>, scheduler: &SchedulerSlot, session: Option<Principal>) {
    let mut slot = scheduler.lock().await;

    match session {
        Some(principal) => {
            let current = core.principal().await;
            let running = slot.as_ref().is_some_and(|s| s.is_running());
            if running && current.as_ref() == Some(&principal) {
                return;
            }

            if let Some(old) = slot.take() {
                old.stop().await;
            }
            if current.is_some_and(|p| p.user_id != principal.user_id) {
                core.clear_data().await;
            }
            info!(email = %principal.email, "Signed in, starting scheduler");
            core.set_phase(ViewPhase::Authenticated(principal)).await;
            *slot = Some(RefreshScheduler::start(core.clone()));
        }
        None => {
            if let Some(old) = slot.take() {
                old.stop().await;
            }
            if core.principal().await.is_some() {
                info!("Signed out, scheduler stopped");
            }
            core.sign_out_view().await;
        }
    }
}

async fn watch_sessions(
    core: Arc<EngineCore>,
    scheduler: SchedulerSlot,
    mut subscription: SessionSubscription,
    mut teardown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = teardown.changed() => break,
            change = subscription.changed() => match change {
                Some(session) => apply_session(&core, &scheduler, session).await,
                None => {
                    debug!("Session provider closed");
                    break;
                }
            },
        }
    }
    // Dropping the subscription here releases it.
    drop(subscription);
}
