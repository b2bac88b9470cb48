#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that plays a wave scenario in a headless arena.

mod arena;
mod scenario;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::{runtime::Handle, sync::broadcast::error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wavefront_core::{ActorFactory, Event, RunOutcome, ShopTrigger, SpawnOutcome, WarningBeacon};
use wavefront_system_wave_scheduler::{Collaborators, WaveScheduler};

use crate::{arena::Arena, scenario::Scenario};

const DEFAULT_LOG_FILTER: &str = "info";

/// Plays a wave scenario against a simulated arena.
#[derive(Debug, Parser)]
#[command(name = "wavefront", version)]
struct Cli {
    /// Scenario file in TOML. The built-in scenario is used when omitted.
    scenario: Option<PathBuf>,

    /// Restart the wave queue after its last wave.
    #[arg(long = "loop", conflicts_with = "once")]
    looping: bool,

    /// Stop after the last wave even if the scenario loops.
    #[arg(long)]
    once: bool,

    /// Seed for spawn location, actor type and lifetime draws.
    #[arg(long)]
    seed: Option<u64>,

    /// Stop once this many waves have been cleared.
    #[arg(long)]
    max_waves: Option<u64>,

    /// Log filter directive; takes precedence over `RUST_LOG`.
    #[arg(long)]
    log_filter: Option<String>,
}

impl Cli {
    fn looping(&self, scenario_default: bool) -> bool {
        if self.looping {
            true
        } else if self.once {
            false
        } else {
            scenario_default
        }
    }
}

/// Entry point for the wavefront command-line interface.
#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref())?;

    let mut scenario = match &cli.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::builtin()?,
    };
    if let Some(seed) = cli.seed {
        scenario.config.rng_seed = seed;
    }
    let looping = cli.looping(scenario.looping);

    let arena = Arc::new(Arena::new(
        scenario.arena.clone(),
        scenario.names.clone(),
        scenario.config.rng_seed,
        Handle::current(),
    ));
    let scheduler = WaveScheduler::new(
        scenario.config.clone(),
        Collaborators {
            factory: Arc::clone(&arena) as Arc<dyn ActorFactory>,
            shop: Arc::clone(&arena) as Arc<dyn ShopTrigger>,
            beacon: Some(arena as Arc<dyn WarningBeacon>),
        },
    )
    .context("failed to build the wave scheduler")?;

    let mut events = scheduler.subscribe();
    let waves = std::mem::take(&mut scenario.waves);
    scheduler.start(waves, looping).await;

    let outcome = loop {
        tokio::select! {
            interrupt = tokio::signal::ctrl_c() => {
                interrupt.context("failed to listen for ctrl-c")?;
                info!("interrupted; stopping");
                scheduler.stop();
            }
            received = events.recv() => match received {
                Ok(event) => {
                    println!("{}", describe(&event, &scenario));
                    match event {
                        Event::RunFinished { outcome } => break outcome,
                        Event::WaveCleared { .. } => {
                            if cli.max_waves.is_some_and(|max| scheduler.waves_cleared() >= max) {
                                info!(cleared = scheduler.waves_cleared(), "wave limit reached");
                                scheduler.stop();
                            }
                        }
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                Err(RecvError::Closed) => bail!("scheduler event stream closed unexpectedly"),
            },
        }
    };

    println!(
        "run finished: {outcome:?} after {} cleared waves, {} actors still alive",
        scheduler.waves_cleared(),
        scheduler.alive_count()
    );
    Ok(exit_code(outcome))
}

fn init_tracing(filter: Option<&str>) -> Result<()> {
    let filter = match filter {
        Some(directive) => EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log filter `{directive}`"))?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn exit_code(outcome: RunOutcome) -> ExitCode {
    match outcome {
        RunOutcome::Completed | RunOutcome::Cancelled => ExitCode::SUCCESS,
        RunOutcome::NoWaves => ExitCode::from(2),
    }
}

/// One console line per scheduler event.
fn describe(event: &Event, scenario: &Scenario) -> String {
    match event {
        Event::RunStarted { waves, looping } => {
            format!("run started: {waves} waves, looping {looping}")
        }
        Event::WaveStarted { wave, name, cycle } => {
            format!("wave {} `{name}` started (cycle {cycle})", wave + 1)
        }
        Event::SpawnEventFired {
            wave,
            offset,
            locations,
        } => format!(
            "  wave {} event at {:.1}s: {locations} location(s)",
            wave + 1,
            offset.as_secs_f32()
        ),
        Event::SpawnResolved {
            location,
            actor_type,
            outcome,
            ..
        } => {
            let kind = actor_type.map_or_else(|| "-".to_owned(), |id| scenario.actor_name(id));
            let result = match outcome {
                SpawnOutcome::Spawned(actor) => format!("spawned #{}", actor.get()),
                SpawnOutcome::Dropped => "dropped (cap reached)".to_owned(),
                SpawnOutcome::Skipped(reason) => format!("skipped: {reason:?}"),
                SpawnOutcome::Cancelled => "cancelled".to_owned(),
            };
            format!(
                "    {kind} at ({:.1}, {:.1}, {:.1}): {result}",
                location.x, location.y, location.z
            )
        }
        Event::WaveCleared { wave, cycle } => {
            format!("wave {} cleared (cycle {cycle})", wave + 1)
        }
        Event::ShopOpened { wave, bonus_health } => {
            format!("shop opened after wave {}: bonus health {bonus_health}", wave + 1)
        }
        Event::RunFinished { outcome } => format!("run ended: {outcome:?}"),
    }
}
