//! # weaverd — weaver daemon
//!
//! Composition root that wires the engine to the virtual fleet and runs
//! one goal from the command line.
//!
//! ## Responsibilities
//! - Parse configuration (`weaver.toml`, env vars) and CLI arguments
//! - Initialize tracing
//! - Construct the virtual fleet, intent resolver, and pattern store
//! - Wire them into an [`Orchestrator`] and run the requested goal
//! - Print the per-step outcome
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use anyhow::{Context, bail};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use weaver_adapter_virtual::{KeywordIntentResolver, VirtualFleet};
use weaver_domain::pattern::ContextQuery;
use weaver_engine::orchestrator::{OrchestrationRequest, Orchestrator};
use weaver_engine::pattern_memory::InMemoryPatternStore;
use weaver_engine::ports::{DeviceGateway, PatternStore};
use weaver_engine::zones::ZoneCoordinator;

use config::Config;

struct CliArgs {
    goal: String,
    confirmation: Option<String>,
    zones: Vec<String>,
    max_steps: Option<usize>,
    no_safety: bool,
    no_learn: bool,
}

fn parse_args(args: impl Iterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut goal_words: Vec<String> = Vec::new();
    let mut confirmation = None;
    let mut zones = Vec::new();
    let mut max_steps = None;
    let mut no_safety = false;
    let mut no_learn = false;

    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--confirm" => {
                confirmation = Some(args.next().context("--confirm requires a token")?);
            }
            "--zone" => {
                zones.push(args.next().context("--zone requires a zone name")?);
            }
            "--max-steps" => {
                let value = args.next().context("--max-steps requires a number")?;
                max_steps = Some(value.parse().context("--max-steps must be a number")?);
            }
            "--no-safety" => no_safety = true,
            "--no-learn" => no_learn = true,
            flag if flag.starts_with("--") => bail!("unknown flag: {flag}"),
            word => goal_words.push(word.to_string()),
        }
    }

    if goal_words.is_empty() {
        bail!("usage: weaverd [--confirm TOKEN] [--zone NAME]... [--max-steps N] [--no-safety] [--no-learn] GOAL...");
    }
    Ok(CliArgs {
        goal: goal_words.join(" "),
        confirmation,
        zones,
        max_steps,
        no_safety,
        no_learn,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    let fleet = Arc::new(VirtualFleet::demo());
    let orchestrator = Arc::new(Orchestrator::new(
        fleet.clone(),
        KeywordIntentResolver,
        Arc::new(InMemoryPatternStore::default()),
        ZoneCoordinator::new(config.build_zones()?),
        config.orchestrator_config(),
    ));

    // Keep the cached fleet view current from pushed state changes.
    let event_fleet = Arc::clone(&fleet);
    let event_fold = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        let mut events = event_fleet.subscribe_events();
        while let Some(event) = events.next().await {
            event_fold.apply_event(event);
        }
    });

    let mut request = OrchestrationRequest::new(&args.goal)
        .with_safety_mode(config.safety.enabled && !args.no_safety)
        .with_learning(!args.no_learn);
    if let Some(token) = args.confirmation {
        request = request.with_confirmation(token);
    }
    if let Some(max_steps) = args.max_steps {
        request = request.with_max_steps(max_steps);
    }
    for zone in args.zones {
        request = request.with_zone(zone);
    }

    let response = orchestrator
        .orchestrate(request)
        .await
        .with_context(|| format!("goal '{}' failed", args.goal))?;

    println!("plan {} — {}", response.plan_id, response.status);
    for result in &response.results {
        match &result.error {
            Some(error) => println!(
                "  {} {} — {} after {} attempt(s): {error}",
                result.entity_id, result.action, result.status, result.attempts
            ),
            None => println!(
                "  {} {} — {} ({} attempt(s), {}ms)",
                result.entity_id,
                result.action,
                result.status,
                result.attempts,
                result.duration.as_millis()
            ),
        }
    }
    for discarded in &response.discarded {
        println!(
            "  dropped {} {} — {}",
            discarded.operation.entity_id, discarded.operation.action, discarded.reason
        );
    }

    // Informational only: numeric states that stray from their history.
    for result in &response.results {
        let Some(value) = fleet
            .snapshot_of(&result.entity_id)
            .and_then(|s| s.numeric_state())
        else {
            continue;
        };
        if let Ok(true) = orchestrator
            .patterns()
            .flag_anomaly(
                &result.entity_id,
                ContextQuery::any(),
                value,
                config.engine.anomaly_sigma,
            )
            .await
        {
            println!("  note: {} reads {value}, unusual for its history", result.entity_id);
        }
    }

    Ok(())
}
