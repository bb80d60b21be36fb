// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use agento_claude::ClaudeClient;
use agento_config::{claude_home, Config, ProfileStore};
use agento_core::AgentRunner;
use agento_mcp::{IntegrationRegistry, IntegrationStarter, StaticMcpRegistry};
use agento_node::{state::StoreIntegrationSource, AppState};
use agento_scheduler::{EventBus, Scheduler};
use agento_sessions::SessionIndex;
use agento_store::Store;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::from_env();
    if let Some(data_dir) = cli.data_dir.clone() {
        config.data_dir = data_dir;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    match cli.command {
        Some(Commands::Migrate) => run_migrate(&config),
        Some(Commands::Serve) | None => run_serve(config).await,
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "agento=info,agento_node=info,agento_scheduler=info,agento_core=info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run_migrate(config: &Config) -> anyhow::Result<()> {
    // Opening the store applies all pending migrations.
    let store = Store::open(&config.db_path())
        .with_context(|| format!("opening database at {}", config.db_path().display()))?;
    drop(store);
    println!("database is up to date: {}", config.db_path().display());
    Ok(())
}

/// Provider starters, registered per integration `type`.
///
/// Provider implementations live outside this binary; each one registers
/// its starter here when compiled in.
fn integration_starters() -> HashMap<String, Arc<dyn IntegrationStarter>> {
    HashMap::new()
}

async fn run_serve(config: Config) -> anyhow::Result<()> {
    // ── Store (the only fatal startup path) ───────────────────────────────────
    let store = Arc::new(
        Store::open(&config.db_path())
            .with_context(|| format!("opening database at {}", config.db_path().display()))?,
    );

    // ── One-time legacy import ────────────────────────────────────────────────
    match agento_store::migrate_legacy_layout(&store, &config.data_dir).await {
        Ok(report) if report.agents + report.chats + report.integrations > 0 => {
            info!(
                agents = report.agents,
                chats = report.chats,
                "legacy layout imported"
            );
        }
        Ok(_) => {}
        Err(e) => warn!("legacy import failed (continuing with SQLite state): {e}"),
    }

    // ── Registries ────────────────────────────────────────────────────────────
    let profiles = ProfileStore::new(claude_home());
    let static_registry = Arc::new(StaticMcpRegistry::load(
        &config.data_dir.join("mcp_servers.json"),
    ));
    let integrations = Arc::new(IntegrationRegistry::new(
        Arc::new(StoreIntegrationSource(store.clone())),
        integration_starters(),
    ));
    integrations.start_all().await;

    // ── Agent runner ──────────────────────────────────────────────────────────
    let mut runner = AgentRunner::new(ClaudeClient::new())
        .with_static_registry(static_registry.clone())
        .with_integrations(integrations.clone());
    if let Some(key) = &config.anthropic_api_key {
        runner = runner.with_api_key(key.clone());
    }
    let runner = Arc::new(runner);

    // ── Scheduler ─────────────────────────────────────────────────────────────
    let settings = store.get_settings().await.unwrap_or_default();
    let bus = EventBus::default();
    let scheduler = Scheduler::new(
        store.clone(),
        runner.clone(),
        profiles.clone(),
        bus.clone(),
        settings.max_concurrent_tasks,
    );
    scheduler.start().await?;

    // ── Session index ─────────────────────────────────────────────────────────
    let sessions = Arc::new(SessionIndex::new(
        store.clone(),
        config.claude_projects_dir(),
    ));
    sessions.warm_in_background();

    // ── HTTP node (blocks until shutdown) ─────────────────────────────────────
    let state = AppState {
        store,
        runner,
        scheduler: scheduler.clone(),
        sessions,
        integrations: integrations.clone(),
        profiles,
        live: Arc::new(agento_node::live::LiveRegistry::new()),
        bus,
    };

    agento_node::serve(state, config.port, shutdown_signal()).await?;

    // ── Graceful teardown ─────────────────────────────────────────────────────
    scheduler.shutdown().await;
    integrations.stop_all().await;
    info!("agento stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
