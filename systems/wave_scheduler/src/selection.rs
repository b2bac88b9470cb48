use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng,
};
use wavefront_core::{ActorProfile, ActorRoster, ActorTypeId};

/// Chooses the actor type for one location of a spawn event.
///
/// The event's own type wins, then a weighted draw from the pool, then the
/// roster default.
pub(crate) fn pick_actor<R: Rng + ?Sized>(
    requested: Option<ActorTypeId>,
    roster: &ActorRoster,
    rng: &mut R,
) -> Option<ActorTypeId> {
    if requested.is_some() {
        return requested;
    }

    let pool: Vec<&ActorProfile> = roster.pool().collect();
    if let Ok(weights) = WeightedIndex::new(pool.iter().map(|profile| profile.pool_weight)) {
        return Some(pool[weights.sample(rng)].id);
    }

    roster.default_actor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const GRUNT: ActorTypeId = ActorTypeId::new(1);
    const BRUTE: ActorTypeId = ActorTypeId::new(2);
    const BOSS: ActorTypeId = ActorTypeId::new(3);

    #[test]
    fn explicit_type_bypasses_pool() {
        let roster = ActorRoster::new(vec![ActorProfile::new(GRUNT, 10)], None);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(pick_actor(Some(BOSS), &roster, &mut rng), Some(BOSS));
    }

    #[test]
    fn weighted_pool_favours_heavier_types() {
        let roster = ActorRoster::new(
            vec![
                ActorProfile::new(GRUNT, 10).with_pool_weight(9),
                ActorProfile::new(BRUTE, 50).with_pool_weight(1),
                ActorProfile::new(BOSS, 500).with_pool_weight(0),
            ],
            Some(BOSS),
        );
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let mut grunts = 0;
        let mut brutes = 0;
        for _ in 0..1_000 {
            match pick_actor(None, &roster, &mut rng) {
                Some(GRUNT) => grunts += 1,
                Some(BRUTE) => brutes += 1,
                other => panic!("unexpected pick {other:?}"),
            }
        }
        assert!(grunts > brutes * 4, "grunts {grunts}, brutes {brutes}");
        assert!(brutes > 0);
    }

    #[test]
    fn empty_pool_uses_default_then_gives_up() {
        let roster = ActorRoster::new(
            vec![ActorProfile::new(BOSS, 500).with_pool_weight(0)],
            Some(BOSS),
        );
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(pick_actor(None, &roster, &mut rng), Some(BOSS));

        let empty = ActorRoster::default();
        assert_eq!(pick_actor(None, &empty, &mut rng), None);
    }
}
