#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Capacity-checked spawning with telegraphed warnings.
//!
//! The gate turns a location and an actor type into a live actor. It owns
//! no schedule: callers ask it to [`SpawnGate::admit`] a request when the
//! spawn is decided and then drive [`SpawnGate::spawn_admitted`] as an
//! independent task that waits out the warning delay, re-checks the cap and
//! instantiates the actor through the engine's [`ActorFactory`].

use std::{sync::Arc, time::Duration};

use glam::Vec3;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wavefront_core::{
    orientation_from_euler_degrees, ActorFactory, ActorRoster, ActorTypeId, ConfigError,
    Placement, SkipReason, SpawnOutcome, WarningBeacon, WarningId,
};
use wavefront_system_population::{PopulationTracker, Reservation};

const DEFAULT_MAX_SIMULTANEOUS: u32 = 10;
const DEFAULT_WARNING_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_WARNING_HEIGHT_OFFSET: f32 = 0.05;
const DEFAULT_HEIGHT_OFFSET: f32 = 2.0;
const DEFAULT_YAW_DEGREES: f32 = 90.0;
const DEFAULT_FALLBACK_BASE_HEALTH: u32 = 100;

/// When a spawn claims its place under the population cap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CapPolicy {
    /// Reserve a slot when the spawn is decided. Requests that find the cap
    /// full are dropped before any warning is shown.
    #[default]
    Reserve,
    /// Only check the alive count when the spawn is decided and claim the slot
    /// after the warning. Several warnings may show for one free slot and the
    /// late ones are dropped.
    Recheck,
}

/// Tunables of the spawn gate.
#[derive(Clone, Debug, PartialEq)]
pub struct GateConfig {
    /// Maximum number of concurrently alive actors.
    pub max_simultaneous: u32,
    /// Pause between deciding a spawn and instantiating it.
    pub warning_delay: Duration,
    /// Height above the spawn location at which the warning is shown.
    pub warning_height_offset: f32,
    /// Placement used when an actor type carries no override.
    pub default_placement: Placement,
    /// Capacity claiming strategy.
    pub cap_policy: CapPolicy,
    /// Base health for actor types missing from the roster.
    pub fallback_base_health: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_simultaneous: DEFAULT_MAX_SIMULTANEOUS,
            warning_delay: DEFAULT_WARNING_DELAY,
            warning_height_offset: DEFAULT_WARNING_HEIGHT_OFFSET,
            default_placement: Placement {
                rotation: orientation_from_euler_degrees(Vec3::new(
                    0.0,
                    DEFAULT_YAW_DEGREES,
                    0.0,
                )),
                height_offset: DEFAULT_HEIGHT_OFFSET,
            },
            cap_policy: CapPolicy::default(),
            fallback_base_health: DEFAULT_FALLBACK_BASE_HEALTH,
        }
    }
}

impl GateConfig {
    /// Rejects configurations the gate cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_simultaneous == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        ensure_finite("warning_height_offset", self.warning_height_offset)?;
        ensure_finite("height_offset", self.default_placement.height_offset)?;
        Ok(())
    }
}

fn ensure_finite(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { field, value })
    }
}

/// A single spawn decided by the scheduler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnRequest {
    /// Ground location of the spawn.
    pub location: Vec3,
    /// Type of actor to instantiate.
    pub actor_type: ActorTypeId,
    /// Health added on top of the type's base health.
    pub bonus_health: u32,
}

/// Permission to proceed with a spawn, obtained from [`SpawnGate::admit`].
#[derive(Debug)]
#[must_use = "an unused admission releases its capacity slot"]
pub struct Admission {
    reservation: Option<Reservation>,
}

/// Capacity-checked bridge between spawn decisions and the engine.
pub struct SpawnGate {
    config: GateConfig,
    roster: ActorRoster,
    population: Arc<PopulationTracker>,
    factory: Arc<dyn ActorFactory>,
    beacon: Option<Arc<dyn WarningBeacon>>,
}

impl std::fmt::Debug for SpawnGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnGate")
            .field("config", &self.config)
            .field("population", &self.population.snapshot())
            .field("beacon", &self.beacon.is_some())
            .finish_non_exhaustive()
    }
}

impl SpawnGate {
    /// Creates a gate that spawns through `factory` and counts into `population`.
    #[must_use]
    pub fn new(
        config: GateConfig,
        roster: ActorRoster,
        population: Arc<PopulationTracker>,
        factory: Arc<dyn ActorFactory>,
    ) -> Self {
        Self {
            config,
            roster,
            population,
            factory,
            beacon: None,
        }
    }

    /// Shows spawn warnings through `beacon`.
    #[must_use]
    pub fn with_beacon(mut self, beacon: Arc<dyn WarningBeacon>) -> Self {
        self.beacon = Some(beacon);
        self
    }

    /// Decides whether a spawn may start under the population cap.
    ///
    /// `None` means the cap is full and the spawn must be dropped.
    pub fn admit(&self) -> Option<Admission> {
        let cap = self.config.max_simultaneous;
        match self.config.cap_policy {
            CapPolicy::Reserve => self
                .population
                .try_reserve(cap)
                .map(|reservation| Admission {
                    reservation: Some(reservation),
                }),
            CapPolicy::Recheck => self
                .population
                .has_room(cap)
                .then_some(Admission { reservation: None }),
        }
    }

    /// Admits and spawns in one call.
    pub async fn request_spawn(
        &self,
        request: SpawnRequest,
        cancel: &CancellationToken,
    ) -> SpawnOutcome {
        match self.admit() {
            Some(admission) => self.spawn_admitted(admission, request, cancel).await,
            None => SpawnOutcome::Dropped,
        }
    }

    /// Telegraphs, waits out the warning delay and instantiates the actor.
    ///
    /// Cancellation during the warning abandons the spawn. The actor only
    /// counts as alive once the factory confirmed it.
    pub async fn spawn_admitted(
        &self,
        admission: Admission,
        request: SpawnRequest,
        cancel: &CancellationToken,
    ) -> SpawnOutcome {
        let _warning = self.show_warning(request.location);

        if !self.wait_warning(cancel).await {
            debug!(actor_type = request.actor_type.get(), "spawn cancelled during warning");
            return SpawnOutcome::Cancelled;
        }

        let reservation = match admission.reservation {
            Some(reservation) => reservation,
            None => match self.population.try_reserve(self.config.max_simultaneous) {
                Some(reservation) => reservation,
                None => {
                    debug!(
                        actor_type = request.actor_type.get(),
                        "population cap reached after warning; dropping spawn"
                    );
                    return SpawnOutcome::Dropped;
                }
            },
        };

        let placement = self.placement_for(request.actor_type);
        let actor = match self.factory.spawn_actor(
            placement.position(request.location),
            placement.rotation,
            request.actor_type,
        ) {
            Ok(actor) => actor,
            Err(error) => {
                warn!(actor_type = request.actor_type.get(), %error, "spawn failed; skipping");
                return SpawnOutcome::Skipped(SkipReason::Instantiation(error));
            }
        };

        let ticket = reservation.commit(actor);
        let health = self
            .base_health_for(request.actor_type)
            .saturating_add(request.bonus_health);
        self.factory.set_base_health(actor, health);
        self.factory.on_death(actor, ticket);

        debug!(
            actor = actor.get(),
            actor_type = request.actor_type.get(),
            health,
            alive = self.population.alive(),
            "actor spawned"
        );
        SpawnOutcome::Spawned(actor)
    }

    /// Effective placement for `actor_type`: its override, else the default.
    #[must_use]
    pub fn placement_for(&self, actor_type: ActorTypeId) -> Placement {
        let placement = self
            .roster
            .profile(actor_type)
            .and_then(|profile| profile.placement.as_ref());
        self.config.default_placement.with_override(placement)
    }

    fn base_health_for(&self, actor_type: ActorTypeId) -> u32 {
        self.roster
            .profile(actor_type)
            .map_or(self.config.fallback_base_health, |profile| {
                profile.base_health
            })
    }

    async fn wait_warning(&self, cancel: &CancellationToken) -> bool {
        if self.config.warning_delay.is_zero() {
            return !cancel.is_cancelled();
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(self.config.warning_delay) => true,
        }
    }

    fn show_warning(&self, location: Vec3) -> Option<WarningGuard> {
        let beacon = self.beacon.as_ref()?;
        let position = location + Vec3::Y * self.config.warning_height_offset;
        Some(WarningGuard {
            id: beacon.show_warning(position),
            beacon: Arc::clone(beacon),
        })
    }
}

/// Clears a shown warning when the spawn attempt ends, however it ends.
struct WarningGuard {
    id: WarningId,
    beacon: Arc<dyn WarningBeacon>,
}

impl Drop for WarningGuard {
    fn drop(&mut self) {
        self.beacon.clear_warning(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spawner_defaults() {
        let config = GateConfig::default();
        assert_eq!(config.max_simultaneous, 10);
        assert_eq!(config.warning_delay, Duration::from_secs(2));
        assert!((config.default_placement.height_offset - 2.0).abs() < f32::EPSILON);
        assert_eq!(config.cap_policy, CapPolicy::Reserve);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_zero_cap_and_nan_offsets() {
        let zero_cap = GateConfig {
            max_simultaneous: 0,
            ..GateConfig::default()
        };
        assert_eq!(zero_cap.validate(), Err(ConfigError::ZeroCapacity));

        let nan_offset = GateConfig {
            warning_height_offset: f32::NAN,
            ..GateConfig::default()
        };
        assert!(matches!(
            nan_offset.validate(),
            Err(ConfigError::NonFinite {
                field: "warning_height_offset",
                ..
            })
        ));
    }
}
