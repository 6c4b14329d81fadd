//! Synchronization and simulation engine

pub mod chart;
pub mod cycle;
pub mod dashboard;
pub mod gate;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod simulation;
pub mod view;

pub use cycle::{EngineCore, EngineDeps};
pub use chart::{ChartFrame, ChartGeometry, ChartMetrics};
pub use dashboard::Engine;
pub use gate::{CancelFlag, CoalescingGate, SimulationGate};
pub use registry::{AgentRegistry, VerifiedCredential};
pub use retry::with_retry;
pub use scheduler::RefreshScheduler;
pub use simulation::{
    compose_rationale, run_pass, AgentOutcome, Decision, DecisionPolicy, RandomDecisionPolicy,
    SimulationOutcome, SimulationReport, SimulationTrigger,
};
pub use view::{HiveSummary, ViewPhase, ViewState};
