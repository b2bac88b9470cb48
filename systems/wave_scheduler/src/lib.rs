#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Resumable, cancellable wave spawn scheduling.
//!
//! A [`WaveScheduler`] walks a queue of [`WaveDefinition`] values, fires each
//! wave's spawn events at their offsets, fans the resulting spawns out through
//! a [`SpawnGate`] and holds the next wave back until every actor of the
//! current one has died. Shop openings and the accumulated health bonus are
//! applied at configured wave boundaries.
//!
//! Runs execute as a tokio task. Every wait inside a run races a
//! cancellation token, so [`WaveScheduler::stop`] takes effect at the next
//! suspension point without despawning anything already alive.

mod config;
mod layout;
mod run;
mod selection;

use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex, PoisonError,
};

use tokio::{
    sync::{broadcast, watch, Mutex as AsyncMutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use wavefront_core::{
    ActorFactory, ConfigError, Event, RunOutcome, ShopTrigger, WarningBeacon, WaveDefinition,
};
use wavefront_system_population::PopulationTracker;
use wavefront_system_spawn_gate::SpawnGate;

pub use config::SchedulerConfig;
pub use layout::{SpawnArea, SpawnLayout, SpawnMode};

/// Engine hooks the scheduler drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Instantiates actors and reports their deaths.
    pub factory: Arc<dyn ActorFactory>,
    /// Opens the shop at configured wave boundaries.
    pub shop: Arc<dyn ShopTrigger>,
    /// Optional telegraph for upcoming spawns.
    pub beacon: Option<Arc<dyn WarningBeacon>>,
}

/// Orchestrates wave runs against the engine collaborators.
pub struct WaveScheduler {
    shared: Arc<Shared>,
    cancel: Mutex<CancellationToken>,
    task: AsyncMutex<Option<JoinHandle<RunOutcome>>>,
}

/// State shared between the scheduler handle and its run task.
pub(crate) struct Shared {
    config: SchedulerConfig,
    gate: Arc<SpawnGate>,
    population: Arc<PopulationTracker>,
    shop: Arc<dyn ShopTrigger>,
    events: broadcast::Sender<Event>,
    outcome: watch::Sender<Option<RunOutcome>>,
    running: AtomicBool,
    wave_index: AtomicUsize,
    bonus_health: AtomicU32,
    waves_cleared: AtomicU64,
}

impl Shared {
    pub(crate) fn publish(&self, event: Event) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn finish(&self, outcome: RunOutcome) {
        // Outcome first, so `join` never sees a stopped run without one.
        let _ = self.outcome.send_replace(Some(outcome));
        self.running.store(false, Ordering::SeqCst);
        self.publish(Event::RunFinished { outcome });
    }
}

impl std::fmt::Debug for WaveScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveScheduler")
            .field("running", &self.is_running())
            .field("wave_index", &self.current_wave_index())
            .field("alive", &self.alive_count())
            .field("bonus_health", &self.bonus_health())
            .finish_non_exhaustive()
    }
}

impl WaveScheduler {
    /// Creates an idle scheduler after validating `config`.
    pub fn new(config: SchedulerConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;

        let population = Arc::new(PopulationTracker::new());
        let mut gate = SpawnGate::new(
            config.gate.clone(),
            config.roster.clone(),
            Arc::clone(&population),
            collaborators.factory,
        );
        if let Some(beacon) = collaborators.beacon {
            gate = gate.with_beacon(beacon);
        }

        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (outcome, _) = watch::channel(None);

        let shared = Shared {
            config,
            gate: Arc::new(gate),
            population,
            shop: collaborators.shop,
            events,
            outcome,
            running: AtomicBool::new(false),
            wave_index: AtomicUsize::new(0),
            bonus_health: AtomicU32::new(0),
            waves_cleared: AtomicU64::new(0),
        };

        Ok(Self {
            shared: Arc::new(shared),
            cancel: Mutex::new(CancellationToken::new()),
            task: AsyncMutex::new(None),
        })
    }

    /// Begins a run over `waves`, replacing any run in progress.
    ///
    /// The previous run is cancelled and awaited before the new one starts,
    /// so two runs never overlap. Must be called from within a tokio runtime.
    pub async fn start(&self, waves: Vec<WaveDefinition>, looping: bool) {
        let mut task = self.task.lock().await;

        let cancel = CancellationToken::new();
        let previous = std::mem::replace(&mut *self.lock_cancel(), cancel.clone());
        previous.cancel();
        if let Some(previous_run) = task.take() {
            if let Err(join_error) = previous_run.await {
                if join_error.is_panic() {
                    error!(%join_error, "previous wave run panicked");
                }
            }
        }

        if waves.is_empty() {
            warn!("no waves configured; nothing to schedule");
            self.shared.finish(RunOutcome::NoWaves);
            return;
        }

        self.shared.wave_index.store(0, Ordering::SeqCst);
        self.shared.bonus_health.store(0, Ordering::SeqCst);
        self.shared.waves_cleared.store(0, Ordering::SeqCst);
        let _ = self.shared.outcome.send_replace(None);
        self.shared.running.store(true, Ordering::SeqCst);

        info!(waves = waves.len(), looping, "starting wave run");
        *task = Some(tokio::spawn(run::run_waves(
            Arc::clone(&self.shared),
            waves,
            looping,
            cancel,
        )));
    }

    /// Signals the current run to stop. Calling it again has no effect.
    pub fn stop(&self) {
        let cancel = self.lock_cancel();
        if !cancel.is_cancelled() {
            info!("stopping wave run");
            cancel.cancel();
        }
    }

    /// Waits for the current run to finish and returns how it ended.
    ///
    /// Returns the last known outcome, or `None` if nothing ever ran, when no
    /// run is in progress.
    pub async fn join(&self) -> Option<RunOutcome> {
        let mut updates = self.shared.outcome.subscribe();
        if !self.is_running() {
            let last = *updates.borrow();
            return last;
        }
        let finished = *updates.wait_for(Option::is_some).await.ok()?;
        finished
    }

    /// Reports the death of one spawned actor.
    ///
    /// Safe to call from any thread; duplicate reports clamp at zero.
    pub fn notify_actor_destroyed(&self) {
        self.shared.population.decrement();
    }

    /// Subscribes to scheduler events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.events.subscribe()
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Zero-based position of the wave currently executing.
    #[must_use]
    pub fn current_wave_index(&self) -> usize {
        self.shared.wave_index.load(Ordering::SeqCst)
    }

    /// Number of spawned actors still alive.
    #[must_use]
    pub fn alive_count(&self) -> u32 {
        self.shared.population.alive()
    }

    /// Health currently added to every new actor.
    #[must_use]
    pub fn bonus_health(&self) -> u32 {
        self.shared.bonus_health.load(Ordering::SeqCst)
    }

    /// Waves cleared since the current run started, across loop iterations.
    #[must_use]
    pub fn waves_cleared(&self) -> u64 {
        self.shared.waves_cleared.load(Ordering::SeqCst)
    }

    fn lock_cancel(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for WaveScheduler {
    fn drop(&mut self) {
        self.lock_cancel().cancel();
    }
}
