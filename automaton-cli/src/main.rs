//! ABOUTME: Process entrypoint: wires config, state, synthesis, scheduling and the HTTP surface together
//! ABOUTME: Exits 78 (EX_CONFIG) on a bad configuration, 0 on a graceful shutdown

use anyhow::Context;
use automaton_config::AgentConfig;
use automaton_core::traits::Transport;
use automaton_core::types::OwnerId;
use automaton_core::LoggingTransport;
use automaton_executor::{NullAdapters, SandboxLimits};
use automaton_http::{AppState, AuthRegistry, DashboardApi};
use automaton_orchestrator::{Orchestrator, SessionStore};
use automaton_providers::{EchoProvider, ModelChain, ModelProvider};
use automaton_scheduler::{Scheduler, TriggerRouter};
use automaton_security::{ArtifactProgram, Expr, HostCall, Stmt};
use automaton_state::{MemoryBackend, StateSubstrate, StorageBackend};
use automaton_synthesizer::Synthesizer;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// BSD sysexits `EX_CONFIG`, matching the teacher's loose adherence to the
/// convention for "the operator needs to fix something on disk".
const EXIT_CONFIG_ERROR: i32 = 78;

/// Single tenant for the interactive console: there is no real chat
/// transport wired up (out of scope), so the local operator plays the role
/// of the one user the orchestrator ever serves in this process.
const CONSOLE_OWNER_ID: OwnerId = 1;

#[derive(Debug, Parser)]
#[command(name = "automaton", about = "Agent execution runtime: synthesis, sandboxed execution, scheduling and a thin dashboard API")]
struct Cli {
    /// Path to a TOML configuration file. Missing is not an error; defaults apply.
    #[arg(long, env = "AUTOMATON_CONFIG")]
    config: Option<PathBuf>,
}

/// The synthesizer's model chain calls out to an AI provider; concrete
/// HTTP-backed clients are an external-interface concern out of scope for
/// this runtime (see SPEC_FULL §4.6), so the chain is wired from the same
/// deterministic provider the test suite uses, one per configured model
/// name, each echoing a minimal safe artifact.
fn build_model_registry(entries: &[automaton_config::ModelChainEntry]) -> Vec<Arc<dyn ModelProvider>> {
    entries
        .iter()
        .map(|entry| Arc::new(EchoProvider::new(entry.name.clone(), default_artifact_text())) as Arc<dyn ModelProvider>)
        .collect()
}

fn default_artifact_text() -> String {
    ArtifactProgram {
        statements: vec![Stmt::Expr(Expr::HostCall {
            call: HostCall::Notify,
            args: vec![Expr::Literal(serde_json::json!("agent created, no task configured yet"))],
        })],
    }
    .to_text()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = automaton_core::logging::init_logging() {
        eprintln!("warning: tracing already initialized: {e}");
    }

    let cli = Cli::parse();

    let config = match AgentConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    run(config).await
}

async fn run(config: AgentConfig) -> anyhow::Result<()> {
    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let state = Arc::new(StateSubstrate::new(Arc::clone(&backend), config.stale_running_threshold.as_duration()));
    let sessions = Arc::new(SessionStore::new(Arc::clone(&backend)));

    let registry = build_model_registry(&config.model_chain);
    let chain = ModelChain::from_config(&config.model_chain, &registry);
    let synthesizer = Arc::new(Synthesizer::new(chain, &config));

    let transport: Arc<dyn Transport> = Arc::new(LoggingTransport);
    let adapters = Arc::new(NullAdapters);
    let limits = SandboxLimits {
        wall_clock: config.sandbox_wall_clock(),
        memory_cap_bytes: config.sandbox_memory_cap_bytes,
    };

    let router = Arc::new(TriggerRouter::new(
        Arc::clone(&state),
        Arc::clone(&transport),
        adapters.clone() as Arc<dyn automaton_executor::ChainDataAdapter>,
        adapters.clone() as Arc<dyn automaton_executor::SecretsProvider>,
        adapters as Arc<dyn automaton_executor::PluginRegistry>,
        Arc::clone(&synthesizer),
        limits,
        config.repair_budget,
        config.max_concurrent_executions,
    ));

    let scheduler = Arc::new(Scheduler::new(Arc::clone(&router), config.scheduler_immediate_fire));
    let restored = scheduler.restore(&state.artifacts).await.context("restoring scheduled agents")?;
    info!(restored, "startup: scheduler restore complete");

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&state),
        Arc::clone(&synthesizer),
        Arc::clone(&router),
        Arc::clone(&scheduler),
        Arc::clone(&sessions),
    ));

    let auth = Arc::new(AuthRegistry::new());
    let dashboard = Arc::new(AppState::new(Arc::clone(&state), Arc::clone(&router), Arc::clone(&auth))) as Arc<dyn DashboardApi>;

    let addr: std::net::SocketAddr = config.http_bind_addr.parse().context("parsing http_bind_addr")?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let http_handle = tokio::spawn(automaton_http::serve(addr, dashboard, Arc::clone(&auth), shutdown_rx));

    let console_handle = tokio::spawn(run_console(orchestrator));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining");
    console_handle.abort();
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(config.shutdown_drain.as_duration(), http_handle).await {
        Ok(Ok(Ok(()))) => info!("dashboard http listener stopped cleanly"),
        Ok(Ok(Err(e))) => warn!(error = %e, "dashboard http listener exited with an error"),
        Ok(Err(e)) => warn!(error = %e, "dashboard http listener task panicked"),
        Err(_) => warn!("dashboard http listener did not stop within the drain window, abandoning"),
    }

    Ok(())
}

/// Feeds stdin lines to the orchestrator as the console user's utterances
/// and prints replies. Stands in for the out-of-scope chat transport so
/// the conversational flow is reachable from a running process.
async fn run_console(orchestrator: Arc<Orchestrator>) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let reply = orchestrator.handle_utterance(CONSOLE_OWNER_ID, &line).await;
                println!("{}", reply.plain_text);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "console stdin read failed");
                break;
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
