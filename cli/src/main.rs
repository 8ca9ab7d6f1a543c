//! CLI entrypoint for agent-forge
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

mod commands;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use commands::{AgentArgs, Cli, Command, EnhanceArgs, TriageArgs};
use forge_application::{ForgeContext, PersistentStore, RecordFilter, keys};
use forge_domain::{Agent, AgentId, EnhancementKind, EnhancementRequest, TriageRequest};
use forge_infrastructure::{
    ConfigLoader, FileConfig, JournalApplier, JsonlStore, KeywordAnalyzer, MemoryStore,
    RollbackScanner, StaticEndpoint, SuccessRateSelector,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli)?;

    let file_config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_deref())
            .map_err(|e| anyhow!("failed to load configuration: {}", e))?
    };

    match &cli.command {
        Command::Run(agents) => run(&cli, &file_config, agents).await,
        Command::Triage(args) => triage(&cli, &file_config, args).await,
        Command::Enhance(args) => enhance(&cli, &file_config, args).await,
        Command::Status { recent } => status(&cli, &file_config, *recent).await,
        Command::Config { sources } => show_config(&cli, &file_config, *sources),
    }
}

/// Install the subscriber. The returned guard flushes the log file on drop.
fn init_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    // Initialize logging based on verbosity level; RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    });

    let (file_layer, guard) = match &cli.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("could not create log dir {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "agent-forge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Everything a command needs: the wired context plus the local endpoint.
struct Runtime {
    ctx: ForgeContext,
    endpoint: Arc<StaticEndpoint>,
}

fn build_runtime(cli: &Cli, file_config: &FileConfig) -> Result<Runtime> {
    let config = file_config.to_forge_config()?;

    // === Dependency Injection ===
    let store: Arc<dyn PersistentStore> = if file_config.store.enabled && !cli.no_store {
        let path = file_config.store.resolved_path();
        debug!(path = %path.display(), "Using JSONL audit store");
        Arc::new(JsonlStore::open(&path)?)
    } else {
        Arc::new(MemoryStore::new())
    };
    let endpoint = Arc::new(StaticEndpoint::new());
    let scanner = RollbackScanner::new(Arc::clone(&store))
        .with_threshold(file_config.enhancement.rollback_threshold);

    let ctx = ForgeContext::builder(config, endpoint.clone())
        .with_store(Arc::clone(&store))
        .with_analyzer(Arc::new(KeywordAnalyzer::default()))
        .with_strategy(Arc::new(SuccessRateSelector::new()))
        .with_scanner(Arc::new(scanner))
        .build()?;

    for kind in EnhancementKind::all() {
        let applier = JournalApplier::new(*kind, Arc::clone(&store))
            .with_protected_targets(file_config.enhancement.protected_targets.iter().cloned());
        ctx.pipeline.register_applier(Arc::new(applier));
    }

    Ok(Runtime { ctx, endpoint })
}

async fn register_agents(runtime: &Runtime, args: &AgentArgs) -> Result<Vec<AgentId>> {
    let mut ids = Vec::with_capacity(args.agents.len());
    for (id, kind) in &args.agents {
        let agent = runtime
            .ctx
            .registry
            .register_agent(Agent::new(id.as_str(), *kind))
            .await?;
        runtime
            .ctx
            .registry
            .register_start_hook(agent.id.clone(), runtime.endpoint.clone());
        ids.push(agent.id);
    }
    Ok(ids)
}

async fn run(cli: &Cli, file_config: &FileConfig, args: &AgentArgs) -> Result<()> {
    let runtime = build_runtime(cli, file_config)?;
    let ids = register_agents(&runtime, args).await?;
    let ctx = &runtime.ctx;

    ctx.bus.subscribe_all(|event| debug!(?event, "Event"));

    let token = CancellationToken::new();
    let mut handles = ctx.spawn_background(token.clone());

    // Local agents live in this process, so keep their heartbeats fresh
    let registry = Arc::clone(&ctx.registry);
    let heartbeat_every = (ctx.config.registry.heartbeat_timeout / 2).max(Duration::from_secs(1));
    let heartbeat_token = token.clone();
    handles.push(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat_every);
        loop {
            tokio::select! {
                _ = heartbeat_token.cancelled() => break,
                _ = ticker.tick() => {
                    for id in &ids {
                        if let Err(e) = registry.heartbeat(id) {
                            warn!(agent = %id, error = %e, "Heartbeat failed");
                        }
                    }
                }
            }
        }
    }));

    info!(agents = args.agents.len(), "agent-forge running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("could not listen for Ctrl-C")?;

    info!("Shutting down");
    token.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    println!("{}", serde_json::to_string_pretty(&ctx.registry.get_metrics())?);
    Ok(())
}

async fn triage(cli: &Cli, file_config: &FileConfig, args: &TriageArgs) -> Result<()> {
    let runtime = build_runtime(cli, file_config)?;
    register_agents(&runtime, &args.agents).await?;

    let mut request = TriageRequest::new(args.kind, args.source.as_str())
        .with_priority(args.priority)
        .with_error(args.error.as_str());
    if let Some(component) = &args.component {
        request = request.with_component(component.as_str());
    }
    if let Some(trace) = &args.stack_trace {
        request = request.with_stack_trace(trace.as_str());
    }

    let result = runtime.ctx.triage.handle_request(request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn enhance(cli: &Cli, file_config: &FileConfig, args: &EnhanceArgs) -> Result<()> {
    let runtime = build_runtime(cli, file_config)?;
    let pipeline = &runtime.ctx.pipeline;

    let request = EnhancementRequest::new(args.kind, args.source.as_str(), args.target.as_str())
        .with_priority(args.priority);
    if args.queue_only {
        if let Err(e) = pipeline.queue_enhancement(request).await {
            bail!("enhancement rejected ({}): {}", e.kind(), e);
        }
        println!("{}", serde_json::to_string_pretty(&pipeline.pending())?);
        return Ok(());
    }

    let record = match pipeline.queue_and_apply(request).await {
        Ok(record) => record,
        Err(e) => bail!("enhancement rejected ({}): {}", e.kind(), e),
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn status(cli: &Cli, file_config: &FileConfig, recent: usize) -> Result<()> {
    if cli.no_store || !file_config.store.enabled {
        bail!("status reads the JSONL store, which is disabled");
    }
    let path = file_config.store.resolved_path();
    let store = JsonlStore::open(&path)?;
    let records = store.query(&RecordFilter::default()).await?;

    println!("Store: {} ({} records)", path.display(), records.len());

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &records {
        *counts.entry(record.key.as_str()).or_default() += 1;
    }
    for (key, count) in &counts {
        println!("  {:<22} {}", key, count);
    }

    // Newest snapshot per agent; records are newest first
    let mut agents: BTreeMap<String, String> = BTreeMap::new();
    for record in records.iter().filter(|r| r.key == keys::AGENT_SNAPSHOT) {
        if let Some(id) = record.field_str("agent_id") {
            let status = record.fields["agent"]["status"]
                .as_str()
                .unwrap_or("unknown")
                .to_string();
            agents.entry(id.to_string()).or_insert(status);
        }
    }
    if !agents.is_empty() {
        println!();
        println!("Agents:");
        for (id, status) in &agents {
            println!("  {:<22} {}", id, status);
        }
    }

    let outcomes: Vec<_> = records
        .iter()
        .filter(|r| {
            r.key == keys::TRIAGE_OUTCOME
                && r.field_str("event").is_some_and(|e| e != "attempt")
        })
        .take(recent)
        .collect();
    if !outcomes.is_empty() {
        println!();
        println!("Recent triage:");
        for record in outcomes {
            let result = &record.fields["result"];
            println!(
                "  {} {:<10} {:<16} {}",
                record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                if result["success"].as_bool() == Some(true) { "resolved" } else { "failed" },
                result["assigned_agent"].as_str().unwrap_or("-"),
                record.field_str("request_id").unwrap_or("-"),
            );
        }
    }
    Ok(())
}

fn show_config(cli: &Cli, file_config: &FileConfig, sources_only: bool) -> Result<()> {
    println!("Configuration sources (in priority order):");
    for source in ConfigLoader::sources(cli.config.as_deref()) {
        let mark = if source.found { "FOUND" } else { "     " };
        match source.path {
            Some(path) => println!("  [{}] {:<8} {}", mark, source.label, path.display()),
            None => println!("  [{}] {:<8} built-in defaults", mark, source.label),
        }
    }
    if sources_only {
        return Ok(());
    }

    file_config.validate()?;
    println!();
    print!("{}", toml::to_string_pretty(file_config)?);
    Ok(())
}
