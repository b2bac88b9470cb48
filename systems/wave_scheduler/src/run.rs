use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::{task::JoinSet, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wavefront_core::{
    ActorTypeId, Event, RunOutcome, SkipReason, SpawnEvent, SpawnOutcome, WaveDefinition,
};
use wavefront_system_spawn_gate::SpawnRequest;

use crate::{selection::pick_actor, Shared};

/// The run was cancelled at a suspension point.
struct Cancelled;

/// Wave being executed plus the bookkeeping that identifies it in events.
struct WaveContext<'a> {
    wave: &'a WaveDefinition,
    position: usize,
    cycle: u32,
}

type InFlight = JoinSet<(SpawnRequest, SpawnOutcome)>;

pub(crate) async fn run_waves(
    shared: Arc<Shared>,
    waves: Vec<WaveDefinition>,
    looping: bool,
    cancel: CancellationToken,
) -> RunOutcome {
    let mut finished = FinishOnDrop {
        shared: Arc::clone(&shared),
        outcome: RunOutcome::Cancelled,
    };
    let outcome = match drive(&shared, &waves, looping, &cancel).await {
        Ok(()) => RunOutcome::Completed,
        Err(Cancelled) => RunOutcome::Cancelled,
    };
    info!(?outcome, cleared = shared.waves_cleared.load(Ordering::SeqCst), "wave run finished");
    finished.outcome = outcome;
    outcome
}

/// Publishes the run outcome when the run task ends, including by unwinding
/// or abort.
struct FinishOnDrop {
    shared: Arc<Shared>,
    outcome: RunOutcome,
}

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.shared.finish(self.outcome);
    }
}

async fn drive(
    shared: &Shared,
    waves: &[WaveDefinition],
    looping: bool,
    cancel: &CancellationToken,
) -> Result<(), Cancelled> {
    let mut rng = ChaCha8Rng::seed_from_u64(shared.config.rng_seed);
    shared.publish(Event::RunStarted {
        waves: waves.len(),
        looping,
    });

    let mut cycle = 0_u32;
    loop {
        for (position, wave) in waves.iter().enumerate() {
            let context = WaveContext {
                wave,
                position,
                cycle,
            };
            run_wave(shared, &context, &mut rng, cancel).await?;
        }

        if !looping {
            return Ok(());
        }
        cycle = cycle.wrapping_add(1);
        debug!(cycle, "restarting wave queue");
    }
}

async fn run_wave(
    shared: &Shared,
    context: &WaveContext<'_>,
    rng: &mut ChaCha8Rng,
    cancel: &CancellationToken,
) -> Result<(), Cancelled> {
    let WaveContext {
        wave,
        position,
        cycle,
    } = *context;

    shared.wave_index.store(position, Ordering::SeqCst);
    info!(wave = position, name = wave.name(), cycle, "wave started");
    shared.publish(Event::WaveStarted {
        wave: position,
        name: wave.name().to_owned(),
        cycle,
    });

    let started = Instant::now();
    let mut in_flight = InFlight::new();

    for event in wave.sorted_events() {
        sleep(event.time().saturating_sub(started.elapsed()), cancel).await?;
        fire_event(shared, position, event, rng, cancel, &mut in_flight);
    }

    settle(shared, position, &mut in_flight, cancel).await?;

    if !shared.population.wait_for_drain(cancel).await {
        return Err(Cancelled);
    }
    let _ = shared.waves_cleared.fetch_add(1, Ordering::SeqCst);
    info!(wave = position, cycle, "wave cleared");
    shared.publish(Event::WaveCleared {
        wave: position,
        cycle,
    });

    if shared.config.opens_shop_after(position + 1) {
        let increment = shared.config.health_increment_per_shop;
        // Saturates so the bonus never wraps back down.
        let previous = shared
            .bonus_health
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bonus| {
                Some(bonus.saturating_add(increment))
            })
            .unwrap_or_else(|current| current);
        let bonus_health = previous.saturating_add(increment);
        info!(wave = position, bonus_health, "opening shop");
        shared.shop.open_shop();
        shared.publish(Event::ShopOpened {
            wave: position,
            bonus_health,
        });
    }

    let delay = wave.post_wave_delay();
    if !delay.is_zero() {
        debug!(wave = position, ?delay, "post-wave delay");
        sleep(delay, cancel).await?;
    }
    Ok(())
}

/// Turns one spawn event into spawn requests, one per target location.
fn fire_event(
    shared: &Shared,
    position: usize,
    event: &SpawnEvent,
    rng: &mut ChaCha8Rng,
    cancel: &CancellationToken,
    in_flight: &mut InFlight,
) {
    let locations = event.target_locations();
    debug!(
        wave = position,
        offset = ?event.time(),
        locations = locations.len(),
        "spawn event fired"
    );
    shared.publish(Event::SpawnEventFired {
        wave: position,
        offset: event.time(),
        locations: locations.len(),
    });

    for selector in locations {
        let location = shared.config.layout.resolve(*selector, rng);
        let Some(actor_type) = pick_actor(event.actor_type(), &shared.config.roster, rng) else {
            warn!(wave = position, "no actor type available; skipping location");
            resolved(
                shared,
                position,
                location,
                None,
                SpawnOutcome::Skipped(SkipReason::NoActorType),
            );
            continue;
        };

        let Some(admission) = shared.gate.admit() else {
            debug!(
                wave = position,
                alive = shared.population.alive(),
                "population cap reached; dropping spawn"
            );
            resolved(
                shared,
                position,
                location,
                Some(actor_type),
                SpawnOutcome::Dropped,
            );
            continue;
        };

        let request = SpawnRequest {
            location,
            actor_type,
            bonus_health: shared.bonus_health.load(Ordering::SeqCst),
        };
        let gate = Arc::clone(&shared.gate);
        let cancel = cancel.clone();
        let _ = in_flight.spawn(async move {
            let outcome = gate.spawn_admitted(admission, request, &cancel).await;
            (request, outcome)
        });
    }
}

/// Waits for every pending spawn of the wave to resolve.
async fn settle(
    shared: &Shared,
    position: usize,
    in_flight: &mut InFlight,
    cancel: &CancellationToken,
) -> Result<(), Cancelled> {
    loop {
        let joined = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Cancelled),
            joined = in_flight.join_next() => joined,
        };
        match joined {
            None => return Ok(()),
            Some(Ok((request, outcome))) => resolved(
                shared,
                position,
                request.location,
                Some(request.actor_type),
                outcome,
            ),
            Some(Err(join_error)) => {
                error!(wave = position, %join_error, "spawn task failed");
            }
        }
    }
}

fn resolved(
    shared: &Shared,
    position: usize,
    location: Vec3,
    actor_type: Option<ActorTypeId>,
    outcome: SpawnOutcome,
) {
    shared.publish(Event::SpawnResolved {
        wave: position,
        location,
        actor_type,
        outcome,
    });
}

/// Sleeps for `duration`; durations past the clock's range never elapse.
async fn sleep(duration: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Cancelled),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}
