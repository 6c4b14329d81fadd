//! Mutual exclusion for the refresh and simulation entry points

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{watch, Mutex};

/// Serializes refreshes through a queue of depth one.
///
/// A request that arrives while a refresh is in flight is folded into a
/// single pending re-run; newer requests supersede older pending ones.
/// Every caller returns only once a refresh that started after its request
/// has finished.
#[derive(Default)]
pub struct CoalescingGate {
    lock: Mutex<()>,
    pending: AtomicBool,
}

impl CoalescingGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work`, or wait for the caller already running it to run it once
    /// more on our behalf. Returns `false` when the request was served by
    /// another caller.
    pub async fn run<F, Fut>(&self, mut work: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        self.pending.store(true, Ordering::SeqCst);

        let guard = match self.lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let guard = self.lock.lock().await;
                // The holder cleared the flag, so its re-run covered us.
                if !self.pending.load(Ordering::SeqCst) {
                    return false;
                }
                guard
            }
        };

        let mut ran = false;
        while self.pending.swap(false, Ordering::SeqCst) {
            let rearm = Rearm(&self.pending);
            work().await;
            std::mem::forget(rearm);
            ran = true;
        }
        drop(guard);
        ran
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

/// Puts a cleared request back if the run serving it is dropped, so a
/// waiter picks it up instead of returning as covered.
struct Rearm<'a>(&'a AtomicBool);

impl Drop for Rearm<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Single in-progress flag shared by manual and automatic simulation
#[derive(Default)]
pub struct SimulationGate {
    running: AtomicBool,
}

impl SimulationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim the gate. `None` if a pass is already running.
    pub fn try_enter(&self) -> Option<SimulationGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SimulationGuard { gate: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Releases the simulation gate on drop
pub struct SimulationGuard<'a> {
    gate: &'a SimulationGate,
}

impl Drop for SimulationGuard<'_> {
    fn drop(&mut self) {
        self.gate.running.store(false, Ordering::Release);
    }
}

/// Read side of an engine teardown signal, optionally tied to the session
/// that was live when the flag was made
#[derive(Clone)]
pub struct CancelFlag {
    rx: watch::Receiver<bool>,
    session: Option<(watch::Receiver<u64>, u64)>,
}

impl CancelFlag {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx, session: None }
    }

    /// A flag that never fires
    pub fn never() -> Self {
        // The last value stays readable after the sender is gone.
        let (_tx, rx) = watch::channel(false);
        Self::new(rx)
    }

    /// Also fire once the session epoch moves past its current value
    pub fn or_session_end(mut self, epochs: watch::Receiver<u64>) -> Self {
        let started = *epochs.borrow();
        self.session = Some((epochs, started));
        self
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
            || self
                .session
                .as_ref()
                .is_some_and(|(epochs, started)| *epochs.borrow() != *started)
    }
}
