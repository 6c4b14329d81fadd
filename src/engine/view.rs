//! Process-local view state, replaced wholesale on each refresh

use rust_decimal::Decimal;
use serde::Serialize;

use super::chart::{self, ChartFrame, ChartMetrics};
use crate::domain::{Agent, Candle, ChartStyle, Granularity, Principal, ReasoningLogEntry};

/// Number of agents on the leaderboard
pub const TOP_YIELD_COUNT: usize = 5;

/// Whether the caller is signed in
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ViewPhase {
    #[default]
    Unauthenticated,
    Authenticated(Principal),
}

/// Aggregates derived from the last agent listing
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct HiveSummary {
    pub active_count: usize,
    pub average_yield: Decimal,
    pub top_yields: Vec<Agent>,
}

impl HiveSummary {
    pub fn from_agents(agents: &[Agent]) -> Self {
        Self {
            active_count: agents.iter().filter(|a| a.is_active()).count(),
            average_yield: average_yield(agents),
            top_yields: top_yields(agents, TOP_YIELD_COUNT),
        }
    }
}

/// Arithmetic mean of cumulative yield; 0 for an empty set
pub fn average_yield(agents: &[Agent]) -> Decimal {
    if agents.is_empty() {
        return Decimal::ZERO;
    }
    let total: Decimal = agents.iter().map(|a| a.cumulative_yield).sum();
    total / Decimal::from(agents.len())
}

/// Highest-yield agents, best first
pub fn top_yields(agents: &[Agent], n: usize) -> Vec<Agent> {
    let mut sorted = agents.to_vec();
    sorted.sort_by(|a, b| b.cumulative_yield.cmp(&a.cumulative_yield));
    sorted.truncate(n);
    sorted
}

/// Signed yield for display, e.g. `+0.21%`
pub fn format_yield(value: Decimal) -> String {
    let sign = if value.is_sign_negative() && !value.is_zero() { "" } else { "+" };
    format!("{}{:.2}%", sign, value.round_dp(2))
}

/// Snapshot of everything the dashboard shows
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub phase: ViewPhase,
    pub granularity: Granularity,
    pub chart_style: ChartStyle,
    pub candles: Vec<Candle>,
    pub metrics: Option<ChartMetrics>,
    pub agents: Vec<Agent>,
    pub summary: HiveSummary,
    pub logs: Vec<ReasoningLogEntry>,
}

impl ViewState {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            ..Self::default()
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        match &self.phase {
            ViewPhase::Authenticated(p) => Some(p),
            ViewPhase::Unauthenticated => None,
        }
    }

    /// Latest known closing price
    pub fn last_close(&self) -> Option<Decimal> {
        self.candles.last().map(|c| c.close)
    }

    /// Latest close as `$64,210`, or a placeholder before the first load
    pub fn price_label(&self) -> String {
        self.last_close()
            .map(chart::format_usd)
            .unwrap_or_else(|| "Loading...".to_string())
    }

    pub fn active_agents(&self) -> Vec<Agent> {
        self.agents.iter().filter(|a| a.is_active()).cloned().collect()
    }

    /// Replace the candle window and its derived metrics
    pub fn replace_candles(&mut self, candles: Vec<Candle>) {
        self.metrics = chart::metrics(&candles);
        self.candles = candles;
    }

    /// Replace the agent set and its derived summary
    pub fn replace_agents(&mut self, agents: Vec<Agent>) {
        self.summary = HiveSummary::from_agents(&agents);
        self.agents = agents;
    }

    pub fn replace_logs(&mut self, logs: Vec<ReasoningLogEntry>) {
        self.logs = logs;
    }

    /// Drop everything fetched on behalf of the signed-in user
    pub fn clear_data(&mut self) {
        self.candles.clear();
        self.metrics = None;
        self.agents.clear();
        self.summary = HiveSummary::default();
        self.logs.clear();
    }

    pub fn chart(&self) -> Option<ChartFrame> {
        chart::project(&self.candles, self.chart_style)
    }
}
