#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Wavefront spawn scheduler.
//!
//! This crate defines the data surface that connects the scheduler systems to
//! the engine they drive. Wave authors describe [`WaveDefinition`] values, the
//! scheduler walks them and asks an [`ActorFactory`] to instantiate actors,
//! and every decision it takes is broadcast as an [`Event`] for adapters to
//! present. Engine collaborators are reached exclusively through the traits
//! declared here so systems never depend on a concrete runtime.

use std::{fmt, time::Duration};

use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of an authored actor type (an enemy archetype).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorTypeId(u32);

impl ActorTypeId {
    /// Creates a new actor type identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Handle identifying an actor instantiated by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorHandle(u64);

impl ActorHandle {
    /// Creates a new actor handle with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the handle.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Handle identifying a spawn warning indicator shown by a [`WarningBeacon`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WarningId(u64);

impl WarningId {
    /// Creates a new warning identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Selects where a single actor of a spawn event should appear.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationSelector {
    /// Explicit index into the configured spawn points.
    Index(u32),
    /// Let the scheduler pick a location using its dynamic policy.
    Dynamic,
}

/// One timed instruction within a wave.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnEvent {
    time: Duration,
    actor_type: Option<ActorTypeId>,
    target_locations: Vec<LocationSelector>,
}

impl SpawnEvent {
    /// Creates a spawn event firing `time` after the wave starts.
    ///
    /// Each entry of `target_locations` spawns one actor.
    #[must_use]
    pub fn new(
        time: Duration,
        actor_type: Option<ActorTypeId>,
        target_locations: Vec<LocationSelector>,
    ) -> Self {
        Self {
            time,
            actor_type,
            target_locations,
        }
    }

    /// Offset from the wave start at which the event fires.
    #[must_use]
    pub const fn time(&self) -> Duration {
        self.time
    }

    /// Actor type requested by the event, if the author pinned one.
    #[must_use]
    pub const fn actor_type(&self) -> Option<ActorTypeId> {
        self.actor_type
    }

    /// Locations that each receive one actor when the event fires.
    #[must_use]
    pub fn target_locations(&self) -> &[LocationSelector] {
        &self.target_locations
    }
}

/// Declarative description of a single wave.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveDefinition {
    name: String,
    spawn_events: Vec<SpawnEvent>,
    post_wave_delay: Duration,
}

impl WaveDefinition {
    /// Creates a wave from its name, events and the pause that follows it.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        spawn_events: Vec<SpawnEvent>,
        post_wave_delay: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            spawn_events,
            post_wave_delay,
        }
    }

    /// Human readable name of the wave.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Events in authored order.
    #[must_use]
    pub fn spawn_events(&self) -> &[SpawnEvent] {
        &self.spawn_events
    }

    /// Pause applied after the wave has been cleared.
    #[must_use]
    pub const fn post_wave_delay(&self) -> Duration {
        self.post_wave_delay
    }

    /// Events ordered by trigger time. Ties keep their authored order.
    #[must_use]
    pub fn sorted_events(&self) -> Vec<&SpawnEvent> {
        let mut events: Vec<&SpawnEvent> = self.spawn_events.iter().collect();
        events.sort_by_key(|event| event.time());
        events
    }
}

/// Per actor type adjustments to where and how an actor is placed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacementOverride {
    /// Use `rotation` instead of the scheduler's default orientation.
    pub use_custom_rotation: bool,
    /// Orientation applied when `use_custom_rotation` is set.
    pub rotation: Quat,
    /// Use `height_offset` instead of the scheduler's default height.
    pub use_custom_height_offset: bool,
    /// Vertical offset applied when `use_custom_height_offset` is set.
    pub height_offset: f32,
}

impl Default for PlacementOverride {
    fn default() -> Self {
        Self {
            use_custom_rotation: true,
            rotation: Quat::IDENTITY,
            use_custom_height_offset: false,
            height_offset: 0.0,
        }
    }
}

/// Effective orientation and height used to instantiate an actor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Orientation handed to the engine.
    pub rotation: Quat,
    /// Distance above the resolved location along the up axis.
    pub height_offset: f32,
}

impl Placement {
    /// Applies an optional per-type override on top of these defaults.
    #[must_use]
    pub fn with_override(self, placement: Option<&PlacementOverride>) -> Self {
        let Some(placement) = placement else {
            return self;
        };

        Self {
            rotation: if placement.use_custom_rotation {
                placement.rotation
            } else {
                self.rotation
            },
            height_offset: if placement.use_custom_height_offset {
                placement.height_offset
            } else {
                self.height_offset
            },
        }
    }

    /// World position of an actor spawned at `location`.
    #[must_use]
    pub fn position(&self, location: Vec3) -> Vec3 {
        location + Vec3::Y * self.height_offset
    }
}

/// Converts euler angles in degrees into an orientation.
///
/// Yaw (Y) is applied first, then pitch (X), then roll (Z), so
/// `(0, 90, 0)` turns an actor a quarter turn around the up axis.
#[must_use]
pub fn orientation_from_euler_degrees(euler: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::YXZ,
        euler.y.to_radians(),
        euler.x.to_radians(),
        euler.z.to_radians(),
    )
}

/// Authoring data for one actor type known to the scheduler.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorProfile {
    /// Identifier of the type.
    pub id: ActorTypeId,
    /// Health assigned before any accumulated difficulty bonus.
    pub base_health: u32,
    /// Relative weight in the default pool. Zero keeps the type out of it.
    pub pool_weight: u32,
    /// Optional placement adjustments for this type.
    pub placement: Option<PlacementOverride>,
}

impl ActorProfile {
    /// Creates a profile that participates in the default pool with weight one.
    #[must_use]
    pub fn new(id: ActorTypeId, base_health: u32) -> Self {
        Self {
            id,
            base_health,
            pool_weight: 1,
            placement: None,
        }
    }

    /// Replaces the pool weight of the profile.
    #[must_use]
    pub fn with_pool_weight(mut self, pool_weight: u32) -> Self {
        self.pool_weight = pool_weight;
        self
    }

    /// Attaches a placement override to the profile.
    #[must_use]
    pub fn with_placement(mut self, placement: PlacementOverride) -> Self {
        self.placement = Some(placement);
        self
    }
}

/// Every actor type the scheduler may request, plus the fallback type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActorRoster {
    profiles: Vec<ActorProfile>,
    default_actor: Option<ActorTypeId>,
}

impl ActorRoster {
    /// Creates a roster from profiles and an optional fallback type.
    #[must_use]
    pub fn new(profiles: Vec<ActorProfile>, default_actor: Option<ActorTypeId>) -> Self {
        Self {
            profiles,
            default_actor,
        }
    }

    /// All registered profiles in authored order.
    #[must_use]
    pub fn profiles(&self) -> &[ActorProfile] {
        &self.profiles
    }

    /// Type used when an event pins none and the pool is empty.
    #[must_use]
    pub const fn default_actor(&self) -> Option<ActorTypeId> {
        self.default_actor
    }

    /// Looks up the profile registered for `id`.
    #[must_use]
    pub fn profile(&self, id: ActorTypeId) -> Option<&ActorProfile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    /// Profiles eligible for weighted selection.
    pub fn pool(&self) -> impl Iterator<Item = &ActorProfile> {
        self.profiles.iter().filter(|profile| profile.pool_weight > 0)
    }
}

/// Reasons a spawn request completed without producing an actor or a drop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither the event, the pool nor the roster default named a type.
    NoActorType,
    /// The engine refused to instantiate the actor.
    Instantiation(SpawnError),
}

/// Result of a single spawn request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// The actor was instantiated and counts towards the population.
    Spawned(ActorHandle),
    /// The population cap was reached, so the request was discarded.
    Dropped,
    /// The request was abandoned for the provided reason.
    Skipped(SkipReason),
    /// The run was stopped before the warning delay elapsed.
    Cancelled,
}

/// Terminal state of a scheduler run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunOutcome {
    /// Every wave of a non-looping run was cleared.
    Completed,
    /// The run was stopped or replaced by a newer one.
    Cancelled,
    /// The run was started without any waves.
    NoWaves,
}

/// Notifications broadcast by the scheduler while a run progresses.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A run began.
    RunStarted {
        /// Number of waves in the queue.
        waves: usize,
        /// Whether the queue restarts after its last wave.
        looping: bool,
    },
    /// A wave began executing.
    WaveStarted {
        /// Zero-based position of the wave in the queue.
        wave: usize,
        /// Authored name of the wave.
        name: String,
        /// Zero-based loop iteration.
        cycle: u32,
    },
    /// A spawn event reached its trigger time.
    SpawnEventFired {
        /// Zero-based position of the wave in the queue.
        wave: usize,
        /// Authored offset of the event from the wave start.
        offset: Duration,
        /// Number of target locations carried by the event.
        locations: usize,
    },
    /// A single location of a spawn event was resolved.
    SpawnResolved {
        /// Zero-based position of the wave in the queue.
        wave: usize,
        /// Location the actor was requested at.
        location: Vec3,
        /// Actor type chosen for the request, if any.
        actor_type: Option<ActorTypeId>,
        /// What happened to the request.
        outcome: SpawnOutcome,
    },
    /// Every actor of a wave died.
    WaveCleared {
        /// Zero-based position of the wave in the queue.
        wave: usize,
        /// Zero-based loop iteration.
        cycle: u32,
    },
    /// The shop side effect fired after a wave.
    ShopOpened {
        /// Zero-based position of the wave in the queue.
        wave: usize,
        /// Cumulative health bonus after the increment.
        bonus_health: u32,
    },
    /// The run reached a terminal state.
    RunFinished {
        /// How the run ended.
        outcome: RunOutcome,
    },
}

/// Errors reported by an [`ActorFactory`] when an actor cannot be created.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SpawnError {
    /// The actor type has no instantiable representative.
    #[error("actor type {} has no instantiable representative", .0.get())]
    NoRepresentative(ActorTypeId),
    /// The engine rejected the spawn for another reason.
    #[error("engine rejected spawn: {0}")]
    Rejected(String),
}

/// Errors raised while validating scheduler configuration.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// The population cap must admit at least one actor.
    #[error("maximum simultaneous actors must be greater than zero")]
    ZeroCapacity,
    /// A distance or offset was not a finite number.
    #[error("{field} must be finite, got {value}")]
    NonFinite {
        /// Name of the offending field.
        field: &'static str,
        /// Rejected value.
        value: f32,
    },
    /// Shop trigger waves are 1-based.
    #[error("shop trigger wave numbers start at 1")]
    ZeroShopWave,
    /// The roster default does not name a registered profile.
    #[error("default actor type {} is not registered", .0.get())]
    UnknownDefaultActor(ActorTypeId),
    /// Two profiles share an identifier.
    #[error("actor type {} is registered twice", .0.get())]
    DuplicateActorType(ActorTypeId),
    /// Spawn area dimensions may not be negative.
    #[error("spawn area size must not be negative")]
    NegativeArea,
    /// Pool weights must sum to a value a weighted draw can represent.
    #[error("actor pool weights sum past {}", u32::MAX)]
    PoolWeightOverflow,
}

/// Single-use notification an actor fires when it dies.
///
/// A ticket cannot be cloned and is consumed by [`DeathTicket::fire`], so a
/// given actor reports its death at most once.
pub struct DeathTicket {
    actor: ActorHandle,
    notify: Box<dyn FnOnce(ActorHandle) + Send>,
}

impl DeathTicket {
    /// Creates a ticket that runs `notify` when fired.
    #[must_use]
    pub fn new(actor: ActorHandle, notify: impl FnOnce(ActorHandle) + Send + 'static) -> Self {
        Self {
            actor,
            notify: Box::new(notify),
        }
    }

    /// Actor the ticket belongs to.
    #[must_use]
    pub const fn actor(&self) -> ActorHandle {
        self.actor
    }

    /// Reports the actor's death.
    pub fn fire(self) {
        (self.notify)(self.actor);
    }
}

impl fmt::Debug for DeathTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeathTicket")
            .field("actor", &self.actor)
            .finish_non_exhaustive()
    }
}

/// Engine layer that turns spawn decisions into live actors.
pub trait ActorFactory: Send + Sync {
    /// Instantiates an actor of `actor_type` at `location` facing `orientation`.
    fn spawn_actor(
        &self,
        location: Vec3,
        orientation: Quat,
        actor_type: ActorTypeId,
    ) -> Result<ActorHandle, SpawnError>;

    /// Sets the starting health of a freshly spawned actor.
    fn set_base_health(&self, actor: ActorHandle, health: u32);

    /// Registers the ticket the actor must fire once it dies.
    fn on_death(&self, actor: ActorHandle, ticket: DeathTicket);
}

/// Game mode hook that opens the upgrade shop between waves.
pub trait ShopTrigger: Send + Sync {
    /// Opens the shop. Calling it while the shop is open has no effect.
    fn open_shop(&self);
}

/// Presentation hook that telegraphs upcoming spawns to the player.
pub trait WarningBeacon: Send + Sync {
    /// Shows an indicator at `location` and returns its handle.
    fn show_warning(&self, location: Vec3) -> WarningId;

    /// Removes a previously shown indicator.
    fn clear_warning(&self, warning: WarningId);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn event(seconds: u64, marker: u32) -> SpawnEvent {
        SpawnEvent::new(
            Duration::from_secs(seconds),
            Some(ActorTypeId::new(marker)),
            vec![LocationSelector::Dynamic],
        )
    }

    #[test]
    fn sorted_events_orders_by_time_and_keeps_ties_stable() {
        let wave = WaveDefinition::new(
            "mixed",
            vec![event(3, 0), event(1, 1), event(3, 2), event(0, 3), event(1, 4)],
            Duration::ZERO,
        );

        let markers: Vec<u32> = wave
            .sorted_events()
            .iter()
            .filter_map(|event| event.actor_type())
            .map(|id| id.get())
            .collect();
        assert_eq!(markers, vec![3, 1, 4, 0, 2]);
        assert_eq!(wave.spawn_events()[0].time(), Duration::from_secs(3));
    }

    #[test]
    fn placement_override_replaces_only_enabled_fields() {
        let defaults = Placement {
            rotation: orientation_from_euler_degrees(Vec3::new(0.0, 90.0, 0.0)),
            height_offset: 2.0,
        };
        let custom = PlacementOverride {
            use_custom_rotation: false,
            rotation: Quat::IDENTITY,
            use_custom_height_offset: true,
            height_offset: 0.5,
        };

        let resolved = defaults.with_override(Some(&custom));
        assert_eq!(resolved.rotation, defaults.rotation);
        assert!((resolved.height_offset - 0.5).abs() < f32::EPSILON);
        assert_eq!(defaults.with_override(None), defaults);
    }

    #[test]
    fn placement_position_lifts_along_up_axis() {
        let placement = Placement {
            rotation: Quat::IDENTITY,
            height_offset: 2.0,
        };
        assert_eq!(
            placement.position(Vec3::new(1.0, 0.0, -3.0)),
            Vec3::new(1.0, 2.0, -3.0)
        );
    }

    #[test]
    fn quarter_yaw_turns_forward_onto_x_axis() {
        let rotation = orientation_from_euler_degrees(Vec3::new(0.0, 90.0, 0.0));
        let turned = rotation * Vec3::Z;
        assert!((turned - Vec3::X).length() < 1e-5, "turned to {turned:?}");
    }

    #[test]
    fn roster_pool_excludes_zero_weight_profiles() {
        let roster = ActorRoster::new(
            vec![
                ActorProfile::new(ActorTypeId::new(1), 30),
                ActorProfile::new(ActorTypeId::new(2), 50).with_pool_weight(0),
                ActorProfile::new(ActorTypeId::new(3), 80).with_pool_weight(4),
            ],
            Some(ActorTypeId::new(2)),
        );

        let pool: Vec<u32> = roster.pool().map(|profile| profile.id.get()).collect();
        assert_eq!(pool, vec![1, 3]);
        assert_eq!(
            roster.profile(ActorTypeId::new(2)).map(|profile| profile.base_health),
            Some(50)
        );
        assert!(roster.profile(ActorTypeId::new(9)).is_none());
    }

    #[test]
    fn death_ticket_runs_callback_with_its_actor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&calls);
        let ticket = DeathTicket::new(ActorHandle::new(7), move |actor| {
            assert_eq!(actor, ActorHandle::new(7));
            let _ = observed.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(ticket.actor(), ActorHandle::new(7));
        ticket.fire();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn spawn_error_messages_name_the_actor_type() {
        let error = SpawnError::NoRepresentative(ActorTypeId::new(4));
        assert_eq!(
            error.to_string(),
            "actor type 4 has no instantiable representative"
        );
    }
}
