use std::collections::HashSet;

use wavefront_core::{ActorRoster, ConfigError};
use wavefront_system_spawn_gate::GateConfig;

use crate::layout::SpawnLayout;

const DEFAULT_SHOP_WAVES: [usize; 2] = [3, 6];
const DEFAULT_HEALTH_INCREMENT_PER_SHOP: u32 = 10;
const DEFAULT_RNG_SEED: u64 = 0x5eed_f00d_3a7e_c0de;
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Everything a [`crate::WaveScheduler`] needs besides its collaborators.
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// Cap, warning and placement settings forwarded to the spawn gate.
    pub gate: GateConfig,
    /// Actor types the scheduler may request.
    pub roster: ActorRoster,
    /// Spawn points and the area used for dynamic locations.
    pub layout: SpawnLayout,
    /// 1-based wave positions after which the shop opens.
    pub shop_waves: Vec<usize>,
    /// Health added to future actors every time the shop opens.
    pub health_increment_per_shop: u32,
    /// Seed for location and actor type draws.
    pub rng_seed: u64,
    /// Buffered scheduler events per subscriber before old ones are skipped.
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            roster: ActorRoster::default(),
            layout: SpawnLayout::default(),
            shop_waves: DEFAULT_SHOP_WAVES.to_vec(),
            health_increment_per_shop: DEFAULT_HEALTH_INCREMENT_PER_SHOP,
            rng_seed: DEFAULT_RNG_SEED,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    /// Rejects structurally invalid configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gate.validate()?;
        self.layout.validate()?;

        if self.shop_waves.contains(&0) {
            return Err(ConfigError::ZeroShopWave);
        }

        let mut seen = HashSet::new();
        for profile in self.roster.profiles() {
            if !seen.insert(profile.id) {
                return Err(ConfigError::DuplicateActorType(profile.id));
            }
        }

        if let Some(default_actor) = self.roster.default_actor() {
            if !seen.contains(&default_actor) {
                return Err(ConfigError::UnknownDefaultActor(default_actor));
            }
        }

        let _ = self
            .roster
            .pool()
            .try_fold(0_u32, |total, profile| total.checked_add(profile.pool_weight))
            .ok_or(ConfigError::PoolWeightOverflow)?;

        Ok(())
    }

    /// Reports whether the shop opens after the wave at 1-based `position`.
    #[must_use]
    pub fn opens_shop_after(&self, position: usize) -> bool {
        self.shop_waves.contains(&position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wavefront_core::{ActorProfile, ActorTypeId};

    #[test]
    fn defaults_are_valid() {
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn shop_positions_are_one_based() {
        let config = SchedulerConfig::default();
        assert!(config.opens_shop_after(3));
        assert!(config.opens_shop_after(6));
        assert!(!config.opens_shop_after(2));

        let broken = SchedulerConfig {
            shop_waves: vec![0, 2],
            ..SchedulerConfig::default()
        };
        assert_eq!(broken.validate(), Err(ConfigError::ZeroShopWave));
    }

    #[test]
    fn roster_errors_are_reported() {
        let duplicate = SchedulerConfig {
            roster: ActorRoster::new(
                vec![
                    ActorProfile::new(ActorTypeId::new(1), 10),
                    ActorProfile::new(ActorTypeId::new(1), 20),
                ],
                None,
            ),
            ..SchedulerConfig::default()
        };
        assert_eq!(
            duplicate.validate(),
            Err(ConfigError::DuplicateActorType(ActorTypeId::new(1)))
        );

        let unknown_default = SchedulerConfig {
            roster: ActorRoster::new(
                vec![ActorProfile::new(ActorTypeId::new(1), 10)],
                Some(ActorTypeId::new(5)),
            ),
            ..SchedulerConfig::default()
        };
        assert_eq!(
            unknown_default.validate(),
            Err(ConfigError::UnknownDefaultActor(ActorTypeId::new(5)))
        );
    }

    #[test]
    fn pool_weights_must_fit_a_weighted_draw() {
        let heavy = |weights: [u32; 2]| SchedulerConfig {
            roster: ActorRoster::new(
                vec![
                    ActorProfile::new(ActorTypeId::new(1), 10).with_pool_weight(weights[0]),
                    ActorProfile::new(ActorTypeId::new(2), 20).with_pool_weight(weights[1]),
                ],
                None,
            ),
            ..SchedulerConfig::default()
        };
        assert_eq!(
            heavy([u32::MAX, u32::MAX]).validate(),
            Err(ConfigError::PoolWeightOverflow)
        );
        assert_eq!(heavy([u32::MAX, 1]).validate(), Err(ConfigError::PoolWeightOverflow));
        assert_eq!(heavy([u32::MAX - 1, 1]).validate(), Ok(()));
        assert_eq!(heavy([u32::MAX, 0]).validate(), Ok(()));
    }
}
