//! Shared engine state and the refresh cycle

use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use super::gate::{CancelFlag, CoalescingGate, SimulationGate};
use super::registry::AgentRegistry;
use super::retry::with_retry;
use super::simulation::{run_pass, DecisionPolicy, SimulationOutcome, SimulationTrigger};
use super::view::{ViewPhase, ViewState};
use crate::adapters::{ConnectivityCheck, MarketFeed, RecordStore, SessionProvider};
use crate::config::{AppConfig, RetryConfig, ScheduleConfig, ScopeMode};
use crate::domain::{AgentScope, ChartStyle, Granularity, Principal};

/// External collaborators the engine is built from
#[derive(Clone)]
pub struct EngineDeps {
    pub feed: Arc<dyn MarketFeed>,
    pub store: Arc<dyn RecordStore>,
    pub sessions: Arc<dyn SessionProvider>,
    pub connectivity: Arc<dyn ConnectivityCheck>,
    pub policy: Arc<dyn DecisionPolicy>,
}

/// State shared by the scheduler tasks and user actions
pub struct EngineCore {
    deps: EngineDeps,
    registry: AgentRegistry,
    view: RwLock<ViewState>,
    schedule: ScheduleConfig,
    retry: RetryConfig,
    refresh_gate: CoalescingGate,
    simulation_gate: SimulationGate,
    refreshes: watch::Sender<u64>,
    /// Bumped whenever the signed-in user's session ends
    session_epochs: watch::Sender<u64>,
}

impl EngineCore {
    pub fn new(deps: EngineDeps, config: &AppConfig) -> Self {
        let registry = AgentRegistry::new(deps.store.clone(), deps.connectivity.clone());
        let (refreshes, _) = watch::channel(0);
        let (session_epochs, _) = watch::channel(0);

        Self {
            registry,
            view: RwLock::new(ViewState::new(config.market.granularity)),
            schedule: config.schedule.clone(),
            retry: config.retry.clone(),
            refresh_gate: CoalescingGate::new(),
            simulation_gate: SimulationGate::new(),
            refreshes,
            session_epochs,
            deps,
        }
    }

    pub fn deps(&self) -> &EngineDeps {
        &self.deps
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn schedule(&self) -> &ScheduleConfig {
        &self.schedule
    }

    /// Clone of the current view
    pub async fn snapshot(&self) -> ViewState {
        self.view.read().await.clone()
    }

    pub async fn principal(&self) -> Option<Principal> {
        self.view.read().await.principal().cloned()
    }

    pub async fn set_phase(&self, phase: ViewPhase) {
        self.view.write().await.phase = phase;
    }

    /// Forget the signed-in user and everything loaded for them
    pub async fn sign_out_view(&self) {
        let mut view = self.view.write().await;
        view.phase = ViewPhase::Unauthenticated;
        view.clear_data();
        self.session_epochs.send_modify(|e| *e += 1);
    }

    /// Drop the previous user's data when another user signs in
    pub async fn clear_data(&self) {
        self.view.write().await.clear_data();
        self.session_epochs.send_modify(|e| *e += 1);
    }

    /// Cancel flag for a user-started pass: fires on teardown or once the
    /// current session ends
    pub fn session_cancel(&self, teardown: watch::Receiver<bool>) -> CancelFlag {
        CancelFlag::new(teardown).or_session_end(self.session_epochs.subscribe())
    }

    pub async fn set_granularity(&self, granularity: Granularity) {
        self.view.write().await.granularity = granularity;
    }

    pub async fn set_chart_style(&self, style: ChartStyle) {
        self.view.write().await.chart_style = style;
    }

    /// Receiver that ticks after every completed refresh
    pub fn subscribe_refreshes(&self) -> watch::Receiver<u64> {
        self.refreshes.subscribe()
    }

    pub fn is_simulating(&self) -> bool {
        self.simulation_gate.is_running()
    }

    fn scope_for(&self, principal: &Principal) -> AgentScope {
        match self.schedule.scope {
            ScopeMode::Hive => AgentScope::Hive,
            ScopeMode::Owner => AgentScope::Owner(principal.user_id),
        }
    }

    /// Run one refresh, or fold into the one already running.
    /// Returns `false` when coalesced.
    pub async fn refresh(&self) -> bool {
        self.refresh_gate.run(move || self.refresh_once()).await
    }

    /// Fetch candles, agents, then logs. Each stage keeps its last good
    /// value on failure.
    async fn refresh_once(&self) {
        let (granularity, principal) = {
            let view = self.view.read().await;
            (view.granularity, view.principal().cloned())
        };
        let Some(principal) = principal else {
            debug!("Skipping refresh while signed out");
            return;
        };

        let feed = &self.deps.feed;
        let store = &self.deps.store;
        let retry = &self.retry;

        match with_retry("candles", retry, move || {
            feed.fetch_candles(granularity, granularity.window_len())
        })
        .await
        {
            Ok(candles) => {
                let mut view = self.view.write().await;
                if view.granularity != granularity || view.principal().is_none() {
                    debug!(%granularity, "Discarding window fetched for a stale selection");
                } else {
                    debug!(%granularity, count = candles.len(), "Candle window replaced");
                    view.replace_candles(candles);
                }
            }
            Err(e) => warn!(%granularity, "Market feed failed, keeping previous window: {}", e),
        }

        let scope = self.scope_for(&principal);
        let scope = &scope;
        match with_retry("agents", retry, move || store.list_agents(scope)).await {
            Ok(agents) => {
                let mut view = self.view.write().await;
                if view.principal().is_some() {
                    view.replace_agents(agents);
                }
            }
            Err(e) => warn!("Agent listing failed, keeping previous set: {}", e),
        }

        let limit = self.schedule.log_window;
        match with_retry("logs", retry, move || store.recent_logs(limit)).await {
            Ok(logs) => {
                let mut view = self.view.write().await;
                if view.principal().is_some() {
                    view.replace_logs(logs);
                }
            }
            Err(e) => warn!("Reasoning log fetch failed, keeping previous entries: {}", e),
        }

        self.refreshes.send_modify(|n| *n += 1);
    }

    /// Run a simulation pass unless one is already running.
    ///
    /// After the pass a refresh reconciles the view, unless teardown was
    /// signalled meanwhile.
    pub async fn simulate(&self, trigger: SimulationTrigger, cancel: &CancelFlag) -> SimulationOutcome {
        let Some(_guard) = self.simulation_gate.try_enter() else {
            debug!(?trigger, "Simulation already running, request dropped");
            return SimulationOutcome::AlreadyRunning;
        };

        let (agents, price) = {
            let view = self.view.read().await;
            (view.active_agents(), view.last_close())
        };
        if agents.is_empty() {
            return SimulationOutcome::NoActiveAgents;
        }
        let Some(price) = price else {
            return SimulationOutcome::NoPrice;
        };

        info!(?trigger, agents = agents.len(), %price, "Simulation pass started");
        let report = run_pass(
            self.deps.store.as_ref(),
            self.deps.policy.as_ref(),
            &agents,
            price,
            trigger,
            cancel,
        )
        .await;

        if !cancel.is_cancelled() {
            self.refresh().await;
        }
        SimulationOutcome::Completed(report)
    }
}
