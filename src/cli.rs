//! Command-line front end

use clap::{Parser, Subcommand};
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tokio::signal;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::adapters::{
    AcceptAllConnectivity, BinanceKlineClient, HttpConnectivityCheck, HttpSessionProvider,
    MarketFeed, MemorySessionProvider, MemoryStore, PostgresStore, SyntheticFeed,
};
use crate::config::AppConfig;
use crate::domain::{AgentDraft, AgentStatus, ChartStyle, Granularity, Provider};
use crate::engine::chart::{self, ChartGeometry};
use crate::engine::view::{format_yield, ViewState};
use crate::engine::{
    AgentOutcome, Engine, EngineDeps, RandomDecisionPolicy, SimulationOutcome,
};
use crate::error::HiveError;

#[derive(Parser)]
#[command(name = "hive")]
#[command(version)]
#[command(about = "Agent hive dashboard engine: market sync and trading simulation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, default_value = "config", global = true)]
    pub config: String,

    /// Use in-memory store, sessions, and a synthetic feed
    #[arg(long, global = true)]
    pub offline: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and keep the dashboard in sync until Ctrl-C
    Run {
        #[arg(short, long)]
        email: String,
        /// Prompted when omitted
        #[arg(short, long, env = "HIVE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// hourly, daily, or weekly
        #[arg(short, long)]
        granularity: Option<Granularity>,
    },
    /// List agents
    Agents {
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "HIVE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Verify a provider key and register a new agent
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "HIVE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long)]
        name: String,
        #[arg(long)]
        persona: String,
        /// google, openai, or anthropic
        #[arg(long)]
        provider: Provider,
        /// Prompted when omitted
        #[arg(long, env = "HIVE_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Pause an active agent or resume a paused one
    Toggle {
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "HIVE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long)]
        agent: Uuid,
    },
    /// Run one simulation pass now
    Simulate {
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "HIVE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Fetch the market window and print its chart projection
    Chart {
        #[arg(short, long)]
        granularity: Option<Granularity>,
        /// line or candle
        #[arg(short, long)]
        style: Option<ChartStyle>,
    },
}

#[derive(Debug, Serialize, Tabled)]
pub struct AgentRow {
    pub id: String,
    pub name: String,
    pub status: String,
    pub provider: String,
    pub model: String,
    #[tabled(rename = "yield")]
    pub cumulative_yield: String,
}

#[derive(Debug, Serialize, Tabled)]
pub struct LogRow {
    pub time: String,
    pub agent: String,
    pub content: String,
}

#[derive(Debug, Serialize, Tabled)]
pub struct OutcomeRow {
    pub agent: String,
    pub decision: String,
    pub result: String,
}

fn agent_rows(view: &ViewState) -> Vec<AgentRow> {
    view.agents
        .iter()
        .map(|a| AgentRow {
            id: a.id.to_string(),
            name: a.name.clone(),
            status: a.status.to_string(),
            provider: a.provider.to_string(),
            model: a.model.clone(),
            cumulative_yield: format_yield(a.cumulative_yield),
        })
        .collect()
}

fn log_rows(view: &ViewState) -> Vec<LogRow> {
    view.logs
        .iter()
        .map(|l| LogRow {
            time: l.created_at.format("%H:%M:%S").to_string(),
            agent: view
                .agents
                .iter()
                .find(|a| a.id == l.agent_id)
                .map(|a| a.name.clone())
                .unwrap_or_else(|| l.agent_id.to_string()),
            content: l.content.clone(),
        })
        .collect()
}

fn print_rows<T: Tabled + Serialize>(rows: &[T], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else if rows.is_empty() {
        println!("(no results)");
    } else {
        println!("{}", Table::new(rows));
    }
    Ok(())
}

fn print_summary(view: &ViewState) {
    println!(
        "\n{} {}  |  active agents: {}  |  average yield: {}",
        view.granularity,
        view.price_label(),
        view.summary.active_count,
        format_yield(view.summary.average_yield)
    );
    for (i, agent) in view.summary.top_yields.iter().enumerate() {
        println!("  {:02}. {:<24} {}", i + 1, agent.name, format_yield(agent.cumulative_yield));
    }
    for row in log_rows(view) {
        println!("  [{}] {}: {}", row.time, row.agent, row.content);
    }
}

fn secret(value: Option<String>, prompt: &str) -> anyhow::Result<Zeroizing<String>> {
    match value {
        Some(v) => Ok(Zeroizing::new(v)),
        None => Ok(Zeroizing::new(rpassword::prompt_password(prompt)?)),
    }
}

/// In-memory collaborators. The store is handed back so demo agents can be
/// seeded for whoever signs in.
fn offline_deps() -> (EngineDeps, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let deps = EngineDeps {
        feed: Arc::new(SyntheticFeed::new(dec!(64210))),
        store: store.clone(),
        sessions: Arc::new(MemorySessionProvider::new()),
        connectivity: Arc::new(AcceptAllConnectivity),
        policy: Arc::new(RandomDecisionPolicy),
    };
    (deps, store)
}

async fn seed_demo_agents(store: &MemoryStore, owner: Uuid) {
    for (name, status, y) in [
        ("Worker Bee", AgentStatus::Active, dec!(1.2)),
        ("Scout", AgentStatus::Active, dec!(0.41)),
        ("Drone", AgentStatus::Paused, dec!(-0.1)),
    ] {
        store.seed_agent(name, owner, status, y).await;
    }
}

/// Build collaborators for the configured environment
pub async fn build_deps(config: &AppConfig, offline: bool) -> anyhow::Result<EngineDeps> {
    if offline {
        info!("Running offline with in-memory collaborators");
        return Ok(offline_deps().0);
    }

    let store = PostgresStore::new(&config.store.url, config.store.max_connections).await?;
    Ok(EngineDeps {
        feed: Arc::new(BinanceKlineClient::new(
            &config.market.base_url,
            &config.market.symbol,
        )),
        store: Arc::new(store),
        sessions: Arc::new(HttpSessionProvider::new(&config.auth)?),
        connectivity: Arc::new(HttpConnectivityCheck::new(config.connectivity.clone())?),
        policy: Arc::new(RandomDecisionPolicy),
    })
}

/// Mount an engine and sign in. Offline runs create the account and give
/// it a few demo agents.
async fn signed_in_engine(
    config: &AppConfig,
    offline: bool,
    email: &str,
    password: Option<String>,
) -> anyhow::Result<Engine> {
    let password = secret(password, "Password: ")?;

    if offline {
        info!("Running offline with in-memory collaborators");
        let (deps, store) = offline_deps();
        let engine = Engine::mount(deps, config).await?;
        let principal = engine
            .sign_up(email, &password)
            .await?
            .ok_or_else(|| anyhow::anyhow!("offline sign-up returned no session"))?;
        seed_demo_agents(&store, principal.user_id).await;
        engine.refresh_now().await?;
        info!(email = %principal.email, "Signed in");
        return Ok(engine);
    }

    let engine = Engine::mount(build_deps(config, false).await?, config).await?;
    let principal = engine.sign_in(email, &password).await?;
    info!(email = %principal.email, "Signed in");
    Ok(engine)
}

pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    let offline = cli.offline;
    let json = cli.json;

    match cli.command {
        Commands::Run {
            email,
            password,
            granularity,
        } => {
            let mut engine = signed_in_engine(&config, offline, &email, password).await?;
            if let Some(granularity) = granularity {
                engine.set_granularity(granularity).await;
            }

            let mut refreshes = engine.subscribe_refreshes();
            loop {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Shutdown signal received");
                        break;
                    }
                    changed = refreshes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        print_summary(&engine.view().await);
                    }
                }
            }
            engine.teardown().await;
        }

        Commands::Agents { email, password } => {
            let mut engine = signed_in_engine(&config, offline, &email, password).await?;
            engine.refresh_now().await?;
            let view = engine.view().await;
            engine.teardown().await;
            print_rows(&agent_rows(&view), json)?;
        }

        Commands::Register {
            email,
            password,
            name,
            persona,
            provider,
            api_key,
        } => {
            let mut engine = signed_in_engine(&config, offline, &email, password).await?;
            let api_key = secret(api_key, &format!("{} API key: ", provider))?;

            let result = match engine.verify_credential(provider, &api_key).await? {
                Some(credential) => {
                    engine
                        .register_agent(AgentDraft::new(name, persona), &credential)
                        .await
                }
                None => Err(HiveError::Validation(format!(
                    "{} did not accept the API key; registration disabled",
                    provider
                ))),
            };
            engine.teardown().await;

            let agent = result?;
            println!("Registered {} ({}) with id {}", agent.name, agent.model, agent.id);
        }

        Commands::Toggle {
            email,
            password,
            agent,
        } => {
            let mut engine = signed_in_engine(&config, offline, &email, password).await?;
            engine.refresh_now().await?;
            let result = engine.toggle_agent_status(agent).await;
            engine.teardown().await;
            println!("Agent {} is now {}", agent, result?);
        }

        Commands::Simulate { email, password } => {
            let mut engine = signed_in_engine(&config, offline, &email, password).await?;
            engine.refresh_now().await?;
            let outcome = engine.simulate_now().await;
            let view = engine.view().await;
            engine.teardown().await;

            match outcome? {
                SimulationOutcome::Completed(report) => {
                    let rows: Vec<OutcomeRow> = report
                        .outcomes
                        .iter()
                        .map(|o| {
                            let name = view
                                .agents
                                .iter()
                                .find(|a| a.id == o.agent_id())
                                .map(|a| a.name.clone())
                                .unwrap_or_else(|| o.agent_id().to_string());
                            let (decision, result) = match o {
                                AgentOutcome::Applied {
                                    decision,
                                    new_yield,
                                    ..
                                } => (decision.to_string(), format_yield(*new_yield)),
                                AgentOutcome::LogFailed { decision, error, .. } => {
                                    (decision.to_string(), format!("log failed: {error}"))
                                }
                                AgentOutcome::YieldFailed { decision, error, .. } => {
                                    (decision.to_string(), format!("yield failed: {error}"))
                                }
                            };
                            OutcomeRow {
                                agent: name,
                                decision,
                                result,
                            }
                        })
                        .collect();
                    println!("Simulated at {}", chart::format_usd(report.price));
                    print_rows(&rows, json)?;
                    if report.failed_count() > 0 {
                        warn!(failed = report.failed_count(), "Some agents were not updated");
                    }
                }
                SimulationOutcome::NoActiveAgents => println!("No active agents to simulate."),
                SimulationOutcome::AlreadyRunning => println!("A simulation pass is already running."),
                SimulationOutcome::NoPrice => println!("No market price loaded yet."),
            }
        }

        Commands::Chart { granularity, style } => {
            let granularity = granularity.unwrap_or(config.market.granularity);
            let feed: Arc<dyn MarketFeed> = if offline {
                Arc::new(SyntheticFeed::new(dec!(64210)))
            } else {
                Arc::new(BinanceKlineClient::new(
                    &config.market.base_url,
                    &config.market.symbol,
                ))
            };

            let candles = feed
                .fetch_candles(granularity, granularity.window_len())
                .await?;
            let Some(frame) = chart::project(&candles, style.unwrap_or_default()) else {
                println!("No candles returned.");
                return Ok(());
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&frame)?);
                return Ok(());
            }

            let last = candles.last().map(|c| chart::format_usd(c.close));
            println!(
                "{} {} ({} x {})  last {}",
                config.market.symbol,
                granularity,
                granularity.window_len(),
                granularity.interval(),
                last.unwrap_or_default()
            );
            println!(
                "min {:.2}  max {:.2}  range {:.2}",
                frame.metrics.min, frame.metrics.max, frame.metrics.range
            );
            let y: Vec<&str> = frame.y_labels.iter().map(|l| l.text.as_str()).collect();
            let x: Vec<&str> = frame.x_labels.iter().map(|l| l.text.as_str()).collect();
            println!("y axis: {}", y.join(" | "));
            println!("x axis: {}", x.join(" | "));
            match &frame.geometry {
                ChartGeometry::Line(points) => println!("path: {}", chart::line_path(points)),
                ChartGeometry::Candles(glyphs) => {
                    let up = glyphs.iter().filter(|g| g.up).count();
                    println!("candles: {} up, {} down", up, glyphs.len() - up);
                }
            }
        }
    }

    Ok(())
}
