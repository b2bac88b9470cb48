use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{bail, ensure, Context, Result};
use glam::Vec3;
use serde::Deserialize;
use wavefront_core::{
    orientation_from_euler_degrees, ActorProfile, ActorRoster, ActorTypeId, LocationSelector,
    PlacementOverride, SpawnEvent, WaveDefinition,
};
use wavefront_system_spawn_gate::CapPolicy;
use wavefront_system_wave_scheduler::{SchedulerConfig, SpawnArea, SpawnLayout, SpawnMode};

const SUPPORTED_SCENARIO_VERSION: u32 = 1;

/// Scenario shipped with the binary for zero-argument runs.
pub(crate) const BUILTIN_SCENARIO: &str = include_str!("../scenarios/default.toml");

/// Fully resolved scenario ready to drive a scheduler.
#[derive(Debug)]
pub(crate) struct Scenario {
    pub(crate) config: SchedulerConfig,
    pub(crate) waves: Vec<WaveDefinition>,
    pub(crate) looping: bool,
    pub(crate) arena: ArenaSettings,
    pub(crate) names: HashMap<ActorTypeId, String>,
}

/// Behaviour of the simulated arena.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ArenaSettings {
    /// Shortest time an actor survives.
    pub(crate) min_lifetime: Duration,
    /// Longest time an actor survives.
    pub(crate) max_lifetime: Duration,
    /// Time the shop stays open.
    pub(crate) shop_pause: Duration,
    /// Types the arena has no representative for.
    pub(crate) unspawnable: Vec<ActorTypeId>,
}

impl Scenario {
    /// Reads and resolves a scenario file.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario at {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("invalid scenario at {}", path.display()))
    }

    /// Parses the scenario embedded in the binary.
    pub(crate) fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_SCENARIO).context("invalid built-in scenario")
    }

    pub(crate) fn parse(contents: &str) -> Result<Self> {
        let file: ScenarioFile =
            toml::from_str(contents).context("failed to parse scenario toml contents")?;
        if file.version != SUPPORTED_SCENARIO_VERSION {
            bail!(
                "unsupported scenario version {}; expected {}",
                file.version,
                SUPPORTED_SCENARIO_VERSION
            );
        }
        file.resolve()
    }

    /// Display name of an actor type.
    pub(crate) fn actor_name(&self, id: ActorTypeId) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("#{}", id.get()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioFile {
    version: u32,
    #[serde(default)]
    looping: bool,
    seed: Option<u64>,
    #[serde(default)]
    gate: GateSection,
    #[serde(default)]
    shop: ShopSection,
    #[serde(default)]
    layout: LayoutSection,
    #[serde(default)]
    arena: ArenaSection,
    default_actor: Option<u32>,
    #[serde(default)]
    actors: Vec<ActorEntry>,
    #[serde(default)]
    waves: Vec<WaveEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GateSection {
    max_simultaneous: Option<u32>,
    warning_delay_secs: Option<f32>,
    warning_height_offset: Option<f32>,
    height_offset: Option<f32>,
    rotation_degrees: Option<Vec3>,
    cap_policy: Option<CapPolicyName>,
    fallback_base_health: Option<u32>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum CapPolicyName {
    Reserve,
    Recheck,
}

impl From<CapPolicyName> for CapPolicy {
    fn from(name: CapPolicyName) -> Self {
        match name {
            CapPolicyName::Reserve => Self::Reserve,
            CapPolicyName::Recheck => Self::Recheck,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ShopSection {
    waves: Option<Vec<usize>>,
    health_increment: Option<u32>,
    pause_secs: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutSection {
    mode: Option<ModeName>,
    randomize_point: Option<bool>,
    #[serde(default)]
    points: Vec<Vec3>,
    area_center: Option<Vec3>,
    area_size: Option<Vec3>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ModeName {
    Points,
    Area,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArenaSection {
    lifetime_secs: Option<[f32; 2]>,
    #[serde(default)]
    unspawnable: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActorEntry {
    id: u32,
    name: String,
    base_health: u32,
    #[serde(default = "default_pool_weight")]
    pool_weight: u32,
    rotation_degrees: Option<Vec3>,
    height_offset: Option<f32>,
}

fn default_pool_weight() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WaveEntry {
    name: String,
    #[serde(default)]
    post_wave_delay_secs: f32,
    #[serde(default)]
    events: Vec<EventEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventEntry {
    time_secs: f32,
    actor: Option<u32>,
    /// Spawn point indices; negative values pick a location dynamically.
    locations: Vec<i64>,
}

impl ScenarioFile {
    fn resolve(self) -> Result<Scenario> {
        let mut config = SchedulerConfig::default();

        let gate = &mut config.gate;
        if let Some(max) = self.gate.max_simultaneous {
            gate.max_simultaneous = max;
        }
        if let Some(delay) = self.gate.warning_delay_secs {
            gate.warning_delay = seconds("gate.warning_delay_secs", delay)?;
        }
        if let Some(height) = self.gate.warning_height_offset {
            gate.warning_height_offset = height;
        }
        if let Some(height) = self.gate.height_offset {
            gate.default_placement.height_offset = height;
        }
        if let Some(euler) = self.gate.rotation_degrees {
            gate.default_placement.rotation = orientation_from_euler_degrees(euler);
        }
        if let Some(policy) = self.gate.cap_policy {
            gate.cap_policy = policy.into();
        }
        if let Some(health) = self.gate.fallback_base_health {
            gate.fallback_base_health = health;
        }

        if let Some(waves) = self.shop.waves {
            config.shop_waves = waves;
        }
        if let Some(increment) = self.shop.health_increment {
            config.health_increment_per_shop = increment;
        }
        if let Some(seed) = self.seed {
            config.rng_seed = seed;
        }

        config.layout = resolve_layout(self.layout);

        let mut names = HashMap::with_capacity(self.actors.len());
        let mut profiles = Vec::with_capacity(self.actors.len());
        for actor in self.actors {
            let id = ActorTypeId::new(actor.id);
            if names.insert(id, actor.name.clone()).is_some() {
                bail!("scenario lists actor type {} twice", actor.id);
            }
            profiles.push(resolve_actor(id, &actor));
        }
        config.roster = ActorRoster::new(profiles, self.default_actor.map(ActorTypeId::new));

        config
            .validate()
            .context("scenario describes an invalid scheduler configuration")?;

        let waves = self
            .waves
            .into_iter()
            .map(resolve_wave)
            .collect::<Result<Vec<_>>>()?;

        Ok(Scenario {
            config,
            waves,
            looping: self.looping,
            arena: resolve_arena(self.arena, self.shop.pause_secs)?,
            names,
        })
    }
}

fn resolve_layout(section: LayoutSection) -> SpawnLayout {
    let defaults = SpawnLayout::default();
    SpawnLayout {
        mode: match section.mode {
            Some(ModeName::Area) => SpawnMode::Area,
            Some(ModeName::Points) => SpawnMode::Points,
            None => defaults.mode,
        },
        points: section.points,
        area: SpawnArea {
            center: section.area_center.unwrap_or(defaults.area.center),
            size: section.area_size.unwrap_or(defaults.area.size),
        },
        randomize_point: section.randomize_point.unwrap_or(defaults.randomize_point),
    }
}

fn resolve_actor(id: ActorTypeId, actor: &ActorEntry) -> ActorProfile {
    let profile = ActorProfile::new(id, actor.base_health).with_pool_weight(actor.pool_weight);
    if actor.rotation_degrees.is_none() && actor.height_offset.is_none() {
        return profile;
    }

    profile.with_placement(PlacementOverride {
        use_custom_rotation: actor.rotation_degrees.is_some(),
        rotation: actor
            .rotation_degrees
            .map_or(glam::Quat::IDENTITY, orientation_from_euler_degrees),
        use_custom_height_offset: actor.height_offset.is_some(),
        height_offset: actor.height_offset.unwrap_or_default(),
    })
}

fn resolve_wave(wave: WaveEntry) -> Result<WaveDefinition> {
    let context = format!("wave `{}`", wave.name);
    let post_wave_delay =
        seconds("post_wave_delay_secs", wave.post_wave_delay_secs).context(context.clone())?;
    let events = wave
        .events
        .into_iter()
        .map(|event| {
            let time = seconds("time_secs", event.time_secs)?;
            let locations = event
                .locations
                .into_iter()
                .map(selector)
                .collect::<Result<Vec<_>>>()?;
            Ok(SpawnEvent::new(
                time,
                event.actor.map(ActorTypeId::new),
                locations,
            ))
        })
        .collect::<Result<Vec<_>>>()
        .context(context)?;
    Ok(WaveDefinition::new(wave.name, events, post_wave_delay))
}

fn resolve_arena(section: ArenaSection, pause_secs: Option<f32>) -> Result<ArenaSettings> {
    let [min, max] = section.lifetime_secs.unwrap_or([2.0, 6.0]);
    let min_lifetime = seconds("arena.lifetime_secs", min)?;
    let max_lifetime = seconds("arena.lifetime_secs", max)?;
    ensure!(
        min_lifetime <= max_lifetime,
        "arena.lifetime_secs must be ordered as [min, max]"
    );

    Ok(ArenaSettings {
        min_lifetime,
        max_lifetime,
        shop_pause: seconds("shop.pause_secs", pause_secs.unwrap_or(3.0))?,
        unspawnable: section
            .unspawnable
            .into_iter()
            .map(ActorTypeId::new)
            .collect(),
    })
}

fn selector(index: i64) -> Result<LocationSelector> {
    if index < 0 {
        return Ok(LocationSelector::Dynamic);
    }
    let index =
        u32::try_from(index).with_context(|| format!("spawn point index {index} is too large"))?;
    Ok(LocationSelector::Index(index))
}

fn seconds(field: &str, value: f32) -> Result<Duration> {
    Duration::try_from_secs_f32(value)
        .with_context(|| format!("`{field}` must be a non-negative number of seconds, got {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_scenario_resolves() {
        let scenario = Scenario::builtin().expect("built-in scenario");
        assert!(!scenario.waves.is_empty());
        assert!(scenario.config.validate().is_ok());
        assert!(!scenario.names.is_empty());
    }

    #[test]
    fn omitted_sections_keep_library_defaults() {
        let scenario = Scenario::parse("version = 1").expect("minimal scenario");
        assert_eq!(scenario.config, SchedulerConfig::default());
        assert!(scenario.waves.is_empty());
        assert!(!scenario.looping);
    }

    #[test]
    fn negative_indices_are_dynamic() {
        let scenario = Scenario::parse(
            r#"
            version = 1

            [[waves]]
            name = "Mixed"
            post_wave_delay_secs = 1.5

            [[waves.events]]
            time_secs = 0.5
            actor = 4
            locations = [2, -1]
        "#,
        )
        .expect("scenario");

        let wave = &scenario.waves[0];
        assert_eq!(wave.name(), "Mixed");
        assert_eq!(wave.post_wave_delay(), Duration::from_millis(1_500));
        let event = &wave.spawn_events()[0];
        assert_eq!(event.time(), Duration::from_millis(500));
        assert_eq!(event.actor_type(), Some(ActorTypeId::new(4)));
        assert_eq!(
            event.target_locations(),
            &[LocationSelector::Index(2), LocationSelector::Dynamic]
        );
    }

    #[test]
    fn actor_overrides_become_placements() {
        let scenario = Scenario::parse(
            r#"
            version = 1
            default_actor = 1

            [gate]
            cap_policy = "recheck"

            [[actors]]
            id = 1
            name = "crawler"
            base_health = 30
            height_offset = 0.25

            [[actors]]
            id = 2
            name = "tank"
            base_health = 400
            pool_weight = 0
        "#,
        )
        .expect("scenario");

        assert_eq!(scenario.config.gate.cap_policy, CapPolicy::Recheck);
        let crawler = scenario
            .config
            .roster
            .profile(ActorTypeId::new(1))
            .expect("crawler");
        let placement = crawler.placement.expect("override");
        assert!(!placement.use_custom_rotation);
        assert!(placement.use_custom_height_offset);
        assert_eq!(placement.height_offset, 0.25);

        let tank = scenario
            .config
            .roster
            .profile(ActorTypeId::new(2))
            .expect("tank");
        assert_eq!(tank.pool_weight, 0);
        assert!(tank.placement.is_none());
        assert_eq!(scenario.actor_name(ActorTypeId::new(2)), "tank");
        assert_eq!(scenario.actor_name(ActorTypeId::new(8)), "#8");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Scenario::parse("version = 2").is_err());
        assert!(Scenario::parse("version = 1\n[shop]\nwaves = [0]").is_err());
        assert!(Scenario::parse("version = 1\n[gate]\nwarning_delay_secs = -1.0").is_err());
        assert!(Scenario::parse("version = 1\n[arena]\nlifetime_secs = [5.0, 1.0]").is_err());
        assert!(Scenario::parse("version = 1\ndefault_actor = 3").is_err());
        assert!(Scenario::parse("version = 1\nsurprise = true").is_err());
    }
}
