//! Periodic data refresh and automatic simulation tasks

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::cycle::EngineCore;
use super::gate::CancelFlag;
use super::simulation::{SimulationOutcome, SimulationTrigger};

/// Owns the two repeating tasks. They start together and stop together.
pub struct RefreshScheduler {
    shutdown: watch::Sender<bool>,
    restart: Arc<Notify>,
    handles: Vec<JoinHandle<()>>,
}

impl RefreshScheduler {
    /// Spawn the data task (fires immediately) and, if enabled, the
    /// simulation task (first firing one period from now).
    pub fn start(core: Arc<EngineCore>) -> Self {
        let schedule = core.schedule().clone();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let restart = Arc::new(Notify::new());
        let mut handles = Vec::with_capacity(2);

        handles.push(tokio::spawn(data_loop(
            core.clone(),
            schedule.refresh_interval(),
            shutdown_rx.clone(),
            restart.clone(),
        )));

        if schedule.auto_simulation {
            handles.push(tokio::spawn(simulation_loop(
                core,
                schedule.simulation_interval(),
                shutdown_rx,
            )));
        }

        info!(
            refresh_secs = schedule.refresh_interval_secs,
            simulation_secs = schedule.simulation_interval_secs,
            auto_simulation = schedule.auto_simulation,
            "Refresh scheduler started"
        );

        Self {
            shutdown,
            restart,
            handles,
        }
    }

    /// Cancel the data task's timer and start a fresh one that fires now
    pub fn restart_refresh(&self) {
        self.restart.notify_one();
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow() && self.handles.iter().any(|h| !h.is_finished())
    }

    /// Signal both tasks and wait for them to exit. An in-flight simulation
    /// pass finishes its current agent first.
    pub async fn stop(mut self) {
        self.shutdown.send_replace(true);
        for handle in std::mem::take(&mut self.handles) {
            if let Err(e) = handle.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
        }
        info!("Refresh scheduler stopped");
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        // Tasks exit on their own once they observe the flag.
        self.shutdown.send_replace(true);
    }
}

async fn data_loop(
    core: Arc<EngineCore>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    restart: Arc<Notify>,
) {
    'timer: loop {
        if *shutdown.borrow() {
            break;
        }
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break 'timer,
                _ = restart.notified() => {
                    debug!("Refresh timer restarted");
                    continue 'timer;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break 'timer,
                        _ = core.refresh() => {}
                    }
                }
            }
        }
    }
    debug!("Data refresh task exited");
}

async fn simulation_loop(
    core: Arc<EngineCore>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let cancel = CancelFlag::new(shutdown.clone());
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if cancel.is_cancelled() {
                    break;
                }
                // Automatic no-ops are silent.
                if let SimulationOutcome::Completed(report) =
                    core.simulate(SimulationTrigger::Automatic, &cancel).await
                {
                    debug!(applied = report.applied_count(), "Automatic simulation pass done");
                }
            }
        }
    }
    debug!("Simulation task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AcceptAllConnectivity, MemorySessionProvider, MemoryStore, SyntheticFeed};
    use crate::config::AppConfig;
    use crate::domain::{AgentStatus, Principal};
    use crate::engine::cycle::EngineDeps;
    use crate::engine::simulation::{Decision, MockDecisionPolicy};
    use crate::engine::view::ViewPhase;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    const OWNER: Uuid = Uuid::from_u128(0xb0b);

    async fn signed_in_core(store: Arc<MemoryStore>, auto_simulation: bool) -> Arc<EngineCore> {
        let mut policy = MockDecisionPolicy::new();
        policy.expect_decide().returning(|_, _| Decision::Hold);
        let mut config = AppConfig::default_config();
        config.schedule.auto_simulation = auto_simulation;

        let core = Arc::new(EngineCore::new(
            EngineDeps {
                feed: Arc::new(SyntheticFeed::new(dec!(64000))),
                store,
                sessions: Arc::new(MemorySessionProvider::new()),
                connectivity: Arc::new(AcceptAllConnectivity),
                policy: Arc::new(policy),
            },
            &config,
        ));
        core.set_phase(ViewPhase::Authenticated(Principal {
            user_id: OWNER,
            email: "bee@hive.io".to_string(),
        }))
        .await;
        core
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_task_fires_immediately_then_periodically() {
        let store = Arc::new(MemoryStore::new());
        let core = signed_in_core(store.clone(), false).await;
        let mut refreshes = core.subscribe_refreshes();

        let scheduler = RefreshScheduler::start(core.clone());
        refreshes.changed().await.unwrap();
        assert_eq!(*refreshes.borrow_and_update(), 1);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(*refreshes.borrow(), 3);

        scheduler.stop().await;
        let calls = store.call_count();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.call_count(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_automatic_simulation_runs_each_period() {
        let store = Arc::new(MemoryStore::new());
        store
            .seed_agent("auto", OWNER, AgentStatus::Active, dec!(0))
            .await;
        let core = signed_in_core(store.clone(), true).await;

        let scheduler = RefreshScheduler::start(core);
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(store.log_count().await, 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.log_count().await, 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.log_count().await, 2);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_fires_refresh_now() {
        let store = Arc::new(MemoryStore::new());
        let core = signed_in_core(store, false).await;
        let mut refreshes = core.subscribe_refreshes();

        let scheduler = RefreshScheduler::start(core.clone());
        refreshes.changed().await.unwrap();
        refreshes.borrow_and_update();

        tokio::time::sleep(Duration::from_secs(3)).await;
        let restarted_at = Instant::now();
        scheduler.restart_refresh();
        refreshes.changed().await.unwrap();
        // Well before the original 10s period elapsed.
        assert!(restarted_at.elapsed() < Duration::from_secs(1));
        assert!(scheduler.is_running());
        scheduler.stop().await;
    }
}
