//! Simulation pass: one decision, one reasoning entry, one yield adjustment per agent

use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::chart::format_usd;
use super::gate::CancelFlag;
use crate::adapters::RecordStore;
use crate::domain::{Agent, AgentId, NewReasoningLog};

/// Trading decision taken by an agent during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    Buy,
    Sell,
    Hold,
}

impl Decision {
    pub const ALL: [Decision; 3] = [Decision::Buy, Decision::Sell, Decision::Hold];

    /// Fixed additive yield adjustment
    pub fn yield_delta(&self) -> Decimal {
        match self {
            Decision::Buy => dec!(0.2),
            Decision::Sell => dec!(-0.1),
            Decision::Hold => dec!(0.01),
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Buy => write!(f, "BUY"),
            Decision::Sell => write!(f, "SELL"),
            Decision::Hold => write!(f, "HOLD"),
        }
    }
}

/// Chooses what an agent does at a given price
#[cfg_attr(test, mockall::automock)]
pub trait DecisionPolicy: Send + Sync {
    fn decide(&self, agent: &Agent, price: Decimal) -> Decision;
}

/// Uniformly random placeholder policy
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomDecisionPolicy;

impl DecisionPolicy for RandomDecisionPolicy {
    fn decide(&self, _agent: &Agent, _price: Decimal) -> Decision {
        let idx = rand::thread_rng().gen_range(0..Decision::ALL.len());
        Decision::ALL[idx]
    }
}

/// Reasoning text recorded for a decision
pub fn compose_rationale(agent: &Agent, decision: Decision, price: Decimal) -> String {
    let verb = match decision {
        Decision::Buy => "sees momentum and buys",
        Decision::Sell => "takes profit and sells",
        Decision::Hold => "waits for confirmation and holds",
    };
    format!("{} {} at {} ({}).", agent.name, verb, format_usd(price), decision)
}

/// Who started a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimulationTrigger {
    Manual,
    Automatic,
}

/// What happened to one agent during a pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AgentOutcome {
    /// Log appended and yield adjusted
    Applied {
        agent_id: AgentId,
        decision: Decision,
        new_yield: Decimal,
    },
    /// Log append failed; yield left untouched
    LogFailed {
        agent_id: AgentId,
        decision: Decision,
        error: String,
    },
    /// Log appended but the yield update was rejected
    YieldFailed {
        agent_id: AgentId,
        decision: Decision,
        error: String,
    },
}

impl AgentOutcome {
    pub fn agent_id(&self) -> AgentId {
        match self {
            AgentOutcome::Applied { agent_id, .. }
            | AgentOutcome::LogFailed { agent_id, .. }
            | AgentOutcome::YieldFailed { agent_id, .. } => *agent_id,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, AgentOutcome::Applied { .. })
    }
}

/// Result of a completed pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub trigger: SimulationTrigger,
    pub price: Decimal,
    pub outcomes: Vec<AgentOutcome>,
    /// Teardown was observed before every snapshotted agent was processed
    pub cancelled: bool,
}

impl SimulationReport {
    pub fn applied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.applied_count()
    }
}

/// How a simulation request ended
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SimulationOutcome {
    Completed(SimulationReport),
    /// No agent was active when the pass was requested
    NoActiveAgents,
    /// Another pass held the gate; this request was dropped
    AlreadyRunning,
    /// No closing price has been loaded yet
    NoPrice,
}

/// Run one pass over a snapshot of active agents, sequentially.
///
/// A failed log append skips that agent's yield update and moves on. The
/// cancel flag is checked before each agent, so teardown lets the current
/// agent finish and stops there.
pub async fn run_pass(
    store: &dyn RecordStore,
    policy: &dyn DecisionPolicy,
    agents: &[Agent],
    price: Decimal,
    trigger: SimulationTrigger,
    cancel: &CancelFlag,
) -> SimulationReport {
    let mut outcomes = Vec::with_capacity(agents.len());
    let mut cancelled = false;

    for agent in agents {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let decision = policy.decide(agent, price);
        let entry = NewReasoningLog {
            content: compose_rationale(agent, decision, price),
            agent_id: agent.id,
        };

        if let Err(e) = store.append_log(&entry).await {
            warn!(agent = %agent.name, %decision, "Reasoning log rejected, yield unchanged: {}", e);
            outcomes.push(AgentOutcome::LogFailed {
                agent_id: agent.id,
                decision,
                error: e.to_string(),
            });
            continue;
        }

        match store.add_agent_yield(agent.id, decision.yield_delta()).await {
            Ok(new_yield) => {
                debug!(agent = %agent.name, %decision, %new_yield, "Agent decision applied");
                outcomes.push(AgentOutcome::Applied {
                    agent_id: agent.id,
                    decision,
                    new_yield,
                });
            }
            Err(e) => {
                warn!(agent = %agent.name, %decision, "Yield update rejected: {}", e);
                outcomes.push(AgentOutcome::YieldFailed {
                    agent_id: agent.id,
                    decision,
                    error: e.to_string(),
                });
            }
        }
    }

    let report = SimulationReport {
        trigger,
        price,
        outcomes,
        cancelled,
    };
    info!(
        ?trigger,
        price = %report.price,
        applied = report.applied_count(),
        failed = report.failed_count(),
        cancelled,
        "Simulation pass finished"
    );
    report
}
