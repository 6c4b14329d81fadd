//! Engine lifecycle over in-memory collaborators, on a paused clock

use async_trait::async_trait;
use hive::adapters::{
    AcceptAllConnectivity, MarketFeed, MemorySessionProvider, MemoryStore, RecordStore,
    SessionProvider, StoreOp,
};
use hive::config::AppConfig;
use hive::domain::{
    Agent, AgentDraft, AgentId, AgentScope, AgentStatus, ApiKeyRecord, Candle, Granularity,
    NewAgent, NewReasoningLog, Provider, ReasoningLogEntry,
};
use hive::engine::{Decision, DecisionPolicy, Engine, EngineDeps, SimulationOutcome, ViewPhase};
use hive::error::{HiveError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;
use uuid::Uuid;

/// Feed that records every request as `(interval, limit)`
#[derive(Default)]
struct RecordingFeed {
    requests: Mutex<Vec<(String, usize)>>,
    failing: AtomicBool,
}

impl RecordingFeed {
    fn requests(&self) -> Vec<(String, usize)> {
        self.requests.lock().unwrap().clone()
    }

    fn last(&self) -> Option<(String, usize)> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MarketFeed for RecordingFeed {
    async fn fetch_candles(&self, granularity: Granularity, limit: usize) -> Result<Vec<Candle>> {
        self.requests
            .lock()
            .unwrap()
            .push((granularity.interval().to_string(), limit));
        if self.failing.load(Ordering::SeqCst) {
            return Err(HiveError::feed("connection reset"));
        }

        let start = chrono::Utc::now();
        Ok((0..limit)
            .map(|i| {
                let base = dec!(64000) + Decimal::from(i);
                Candle {
                    open_time: start + chrono::Duration::minutes(i as i64),
                    open: base,
                    high: base + dec!(50),
                    low: base - dec!(50),
                    close: base + dec!(10),
                }
            })
            .collect())
    }
}

struct FixedPolicy(Decision);

impl DecisionPolicy for FixedPolicy {
    fn decide(&self, _agent: &Agent, _price: Decimal) -> Decision {
        self.0
    }
}

/// Store whose reasoning-log appends take a second each
struct SlowLogStore(Arc<MemoryStore>);

#[async_trait]
impl RecordStore for SlowLogStore {
    async fn list_agents(&self, scope: &AgentScope) -> Result<Vec<Agent>> {
        self.0.list_agents(scope).await
    }

    async fn insert_agent(&self, agent: &NewAgent) -> Result<Agent> {
        self.0.insert_agent(agent).await
    }

    async fn update_agent_status(&self, id: AgentId, status: AgentStatus) -> Result<()> {
        self.0.update_agent_status(id, status).await
    }

    async fn add_agent_yield(&self, id: AgentId, delta: Decimal) -> Result<Decimal> {
        self.0.add_agent_yield(id, delta).await
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<ReasoningLogEntry>> {
        self.0.recent_logs(limit).await
    }

    async fn append_log(&self, entry: &NewReasoningLog) -> Result<ReasoningLogEntry> {
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.0.append_log(entry).await
    }

    async fn upsert_api_key(&self, record: &ApiKeyRecord) -> Result<()> {
        self.0.upsert_api_key(record).await
    }
}

struct Harness {
    engine: Engine,
    store: Arc<MemoryStore>,
    sessions: Arc<MemorySessionProvider>,
    feed: Arc<RecordingFeed>,
}

async fn mount(auto_simulation: bool) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let sessions = Arc::new(MemorySessionProvider::new());
    let feed = Arc::new(RecordingFeed::default());

    let mut config = AppConfig::default_config();
    config.schedule.auto_simulation = auto_simulation;
    config.retry.attempts = 1;

    let deps = EngineDeps {
        feed: feed.clone(),
        store: store.clone(),
        sessions: sessions.clone(),
        connectivity: Arc::new(AcceptAllConnectivity),
        policy: Arc::new(FixedPolicy(Decision::Buy)),
    };
    let engine = Engine::mount(deps, &config).await.unwrap();

    Harness {
        engine,
        store,
        sessions,
        feed,
    }
}

/// Create an account through the engine and return its user id
async fn sign_up(engine: &Engine) -> Uuid {
    engine
        .sign_up("bee@hive.io", "pw")
        .await
        .unwrap()
        .map(|principal| principal.user_id)
        .unwrap()
}

async fn wait_until_idle(engine: &Engine) {
    while engine.is_scheduling().await {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn granularity_change_applies_to_next_firing() {
    let h = mount(false).await;
    let mut refreshes = h.engine.subscribe_refreshes();

    assert_ok!(h.engine.sign_up("bee@hive.io", "pw").await);
    refreshes.changed().await.unwrap();
    assert_eq!(h.feed.requests(), vec![("1h".to_string(), 24)]);

    h.engine.set_granularity(Granularity::Weekly).await;
    refreshes.changed().await.unwrap();

    assert_eq!(h.feed.last(), Some(("1d".to_string(), 7)));
    let view = h.engine.view().await;
    assert_eq!(view.granularity, Granularity::Weekly);
    assert_eq!(view.candles.len(), 7);

    // The restarted timer keeps the new parameters.
    refreshes.changed().await.unwrap();
    assert_eq!(h.feed.last(), Some(("1d".to_string(), 7)));
}

#[tokio::test(start_paused = true)]
async fn teardown_stops_all_store_traffic() {
    let mut h = mount(true).await;
    let mut refreshes = h.engine.subscribe_refreshes();

    let me = sign_up(&h.engine).await;
    h.store
        .seed_agent("Worker", me, AgentStatus::Active, dec!(0))
        .await;
    refreshes.changed().await.unwrap();
    assert_eq!(h.sessions.hub().subscriber_count(), 1);

    h.engine.teardown().await;
    let calls = h.store.call_count();
    let requests = h.feed.requests().len();

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.store.call_count(), calls);
    assert_eq!(h.feed.requests().len(), requests);
    assert_eq!(h.sessions.hub().subscriber_count(), 0);
    assert_eq!(h.store.log_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn session_events_start_and_stop_the_scheduler() {
    let h = mount(false).await;
    let mut refreshes = h.engine.subscribe_refreshes();

    // Signed out at mount: nothing is scheduled.
    assert!(!h.engine.is_scheduling().await);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(h.feed.requests().is_empty());
    assert_eq!(h.store.call_count(), 0);

    // A sign-in that happens outside the engine still starts it.
    h.sessions.sign_up("bee@hive.io", "pw").await.unwrap();
    refreshes.changed().await.unwrap();
    assert!(h.engine.is_scheduling().await);
    assert!(h.engine.principal().await.is_some());
    assert!(!h.engine.view().await.candles.is_empty());

    h.sessions.sign_out().await.unwrap();
    wait_until_idle(&h.engine).await;

    let view = h.engine.view().await;
    assert_eq!(view.phase, ViewPhase::Unauthenticated);
    assert!(view.candles.is_empty());
    assert!(view.metrics.is_none());

    let requests = h.feed.requests().len();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.feed.requests().len(), requests);
    assert_eq!(h.sessions.hub().subscriber_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn mounting_with_a_live_session_starts_immediately() {
    let store = Arc::new(MemoryStore::new());
    let sessions = Arc::new(MemorySessionProvider::new());
    sessions.sign_up("bee@hive.io", "pw").await.unwrap();
    let feed = Arc::new(RecordingFeed::default());

    let deps = EngineDeps {
        feed: feed.clone(),
        store,
        sessions: sessions.clone(),
        connectivity: Arc::new(AcceptAllConnectivity),
        policy: Arc::new(FixedPolicy(Decision::Hold)),
    };
    let mut engine = Engine::mount(deps, &AppConfig::default_config()).await.unwrap();

    assert!(engine.is_scheduling().await);
    while engine.view().await.candles.is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(feed.requests().len(), 1);

    engine.teardown().await;
    assert!(!engine.is_scheduling().await);
    assert_eq!(sessions.hub().subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn toggling_twice_restores_status() {
    let h = mount(false).await;
    let me = sign_up(&h.engine).await;
    let agent = h
        .store
        .seed_agent("Scout", me, AgentStatus::Active, dec!(0))
        .await;
    h.engine.refresh_now().await.unwrap();

    let first = h.engine.toggle_agent_status(agent.id).await.unwrap();
    assert_eq!(first, AgentStatus::Paused);
    assert_eq!(h.engine.view().await.summary.active_count, 0);

    let second = h.engine.toggle_agent_status(agent.id).await.unwrap();
    assert_eq!(second, AgentStatus::Active);
    assert_eq!(h.store.agent(agent.id).await.unwrap().status, AgentStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn feed_failure_keeps_last_good_window() {
    let h = mount(false).await;
    let mut refreshes = h.engine.subscribe_refreshes();
    h.engine.sign_up("bee@hive.io", "pw").await.unwrap();
    refreshes.changed().await.unwrap();
    let before = h.engine.view().await;

    h.feed.failing.store(true, Ordering::SeqCst);
    refreshes.changed().await.unwrap();

    let after = h.engine.view().await;
    assert_eq!(after.candles, before.candles);
    assert_eq!(after.price_label(), before.price_label());
    assert!(h.feed.requests().len() >= 2);
}

#[tokio::test(start_paused = true)]
async fn manual_simulation_reconciles_view() {
    let h = mount(false).await;
    let me = sign_up(&h.engine).await;
    let a = h.store.seed_agent("A", me, AgentStatus::Active, dec!(0)).await;
    let b = h.store.seed_agent("B", me, AgentStatus::Active, dec!(1)).await;
    h.store.fail_log_for(a.id).await;
    h.engine.refresh_now().await.unwrap();

    let report = match h.engine.simulate_now().await.unwrap() {
        SimulationOutcome::Completed(report) => report,
        other => panic!("expected a completed pass, got {other:?}"),
    };
    assert_eq!(report.applied_count(), 1);
    assert_eq!(report.failed_count(), 1);

    let view = h.engine.view().await;
    let yield_of = |id: Uuid| {
        view.agents
            .iter()
            .find(|agent| agent.id == id)
            .map(|agent| agent.cumulative_yield)
    };
    assert_eq!(yield_of(a.id), Some(dec!(0)));
    assert_eq!(yield_of(b.id), Some(dec!(1.2)));
    assert_eq!(view.logs.len(), 1);
    assert_eq!(view.logs[0].agent_id, b.id);
}

#[tokio::test(start_paused = true)]
async fn manual_simulation_without_active_agents_reports_noop() {
    let h = mount(false).await;
    let me = sign_up(&h.engine).await;
    h.store
        .seed_agent("Idle", me, AgentStatus::Paused, dec!(0))
        .await;
    h.engine.refresh_now().await.unwrap();

    let outcome = h.engine.simulate_now().await.unwrap();
    assert_eq!(outcome, SimulationOutcome::NoActiveAgents);
}

#[tokio::test(start_paused = true)]
async fn actions_require_a_signed_in_user() {
    let h = mount(false).await;

    assert!(matches!(h.engine.simulate_now().await, Err(HiveError::NotSignedIn)));
    assert!(matches!(h.engine.refresh_now().await, Err(HiveError::NotSignedIn)));
    assert!(matches!(
        h.engine.verify_credential(Provider::Google, "key").await,
        Err(HiveError::NotSignedIn)
    ));
    assert_eq!(h.store.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn registration_aborts_when_credential_write_fails() {
    let h = mount(false).await;
    h.engine.sign_up("bee@hive.io", "pw").await.unwrap();

    let credential = h
        .engine
        .verify_credential(Provider::OpenAI, "sk-test")
        .await
        .unwrap()
        .unwrap();

    h.store.fail_on(StoreOp::UpsertApiKey).await;
    let err = h
        .engine
        .register_agent(AgentDraft::new("Scout", "Trend follower"), &credential)
        .await
        .unwrap_err();
    assert!(err.is_write());
    assert_eq!(h.store.agent_count().await, 0);

    h.store.recover(StoreOp::UpsertApiKey).await;
    let agent = h
        .engine
        .register_agent(AgentDraft::new("Scout", "Trend follower"), &credential)
        .await
        .unwrap();
    assert_eq!(agent.model, "GPT-4o-mini");
    assert_eq!(h.engine.view().await.agents.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn signing_out_stops_a_manual_pass_after_the_current_agent() {
    let memory = Arc::new(MemoryStore::new());
    let sessions = Arc::new(MemorySessionProvider::new());
    let mut config = AppConfig::default_config();
    config.schedule.auto_simulation = false;
    config.retry.attempts = 1;

    let deps = EngineDeps {
        feed: Arc::new(RecordingFeed::default()),
        store: Arc::new(SlowLogStore(memory.clone())),
        sessions: sessions.clone(),
        connectivity: Arc::new(AcceptAllConnectivity),
        policy: Arc::new(FixedPolicy(Decision::Buy)),
    };
    let engine = Engine::mount(deps, &config).await.unwrap();
    let me = sign_up(&engine).await;
    for name in ["A", "B", "C", "D"] {
        memory.seed_agent(name, me, AgentStatus::Active, dec!(0)).await;
    }
    engine.refresh_now().await.unwrap();

    // Agent B's log append is in flight when the session ends.
    let sign_out_midway = async {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        sessions.sign_out().await.unwrap();
    };
    let (outcome, ()) = tokio::join!(engine.simulate_now(), sign_out_midway);

    let report = match outcome.unwrap() {
        SimulationOutcome::Completed(report) => report,
        other => panic!("expected a completed pass, got {other:?}"),
    };
    assert!(report.cancelled);
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(memory.log_count().await, 2);
    assert_eq!(engine.view().await.phase, ViewPhase::Unauthenticated);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(memory.log_count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn other_owners_agents_are_out_of_reach_by_default() {
    let h = mount(false).await;
    let stranger = h
        .store
        .seed_agent("Stranger", Uuid::new_v4(), AgentStatus::Active, dec!(0))
        .await;
    let me = sign_up(&h.engine).await;
    let mine = h.store.seed_agent("Mine", me, AgentStatus::Active, dec!(0)).await;
    h.engine.refresh_now().await.unwrap();

    let listed: Vec<Uuid> = h.engine.view().await.agents.iter().map(|a| a.id).collect();
    assert_eq!(listed, vec![mine.id]);

    let outcome = h.engine.simulate_now().await.unwrap();
    assert!(matches!(outcome, SimulationOutcome::Completed(ref r) if r.outcomes.len() == 1));
    assert_eq!(h.store.agent(mine.id).await.unwrap().cumulative_yield, dec!(0.2));
    assert_eq!(h.store.agent(stranger.id).await.unwrap().cumulative_yield, dec!(0));
    assert!(matches!(
        h.engine.toggle_agent_status(stranger.id).await,
        Err(HiveError::AgentNotFound(_))
    ));
}
