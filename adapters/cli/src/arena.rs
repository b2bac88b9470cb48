use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use glam::{Quat, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::runtime::Handle;
use tracing::{debug, info, trace};
use wavefront_core::{
    ActorFactory, ActorHandle, ActorTypeId, DeathTicket, ShopTrigger, SpawnError, WarningBeacon,
    WarningId,
};

use crate::scenario::ArenaSettings;

/// Headless stand-in for the game engine.
///
/// Actors exist only as handles. Each one dies on its own after a random
/// lifetime and reports through its death ticket.
pub(crate) struct Arena {
    settings: ArenaSettings,
    names: HashMap<ActorTypeId, String>,
    runtime: Handle,
    rng: Mutex<ChaCha8Rng>,
    next_actor: AtomicU64,
    next_warning: AtomicU64,
    shop_open: Arc<AtomicBool>,
}

impl Arena {
    pub(crate) fn new(
        settings: ArenaSettings,
        names: HashMap<ActorTypeId, String>,
        seed: u64,
        runtime: Handle,
    ) -> Self {
        Self {
            settings,
            names,
            runtime,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            next_actor: AtomicU64::new(1),
            next_warning: AtomicU64::new(1),
            shop_open: Arc::new(AtomicBool::new(false)),
        }
    }

    fn name(&self, actor_type: ActorTypeId) -> &str {
        self.names.get(&actor_type).map_or("unnamed", String::as_str)
    }

    fn lifetime(&self) -> Duration {
        let ArenaSettings {
            min_lifetime,
            max_lifetime,
            ..
        } = self.settings;
        if min_lifetime >= max_lifetime {
            return min_lifetime;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(min_lifetime..=max_lifetime)
    }
}

impl ActorFactory for Arena {
    fn spawn_actor(
        &self,
        location: Vec3,
        orientation: Quat,
        actor_type: ActorTypeId,
    ) -> Result<ActorHandle, SpawnError> {
        if self.settings.unspawnable.contains(&actor_type) {
            return Err(SpawnError::NoRepresentative(actor_type));
        }

        let actor = ActorHandle::new(self.next_actor.fetch_add(1, Ordering::Relaxed));
        let (_, yaw, _) = orientation.to_euler(glam::EulerRot::YXZ);
        debug!(
            actor = actor.get(),
            kind = self.name(actor_type),
            x = location.x,
            y = location.y,
            z = location.z,
            yaw = yaw.to_degrees(),
            "actor entered the arena"
        );
        Ok(actor)
    }

    fn set_base_health(&self, actor: ActorHandle, health: u32) {
        trace!(actor = actor.get(), health, "base health assigned");
    }

    fn on_death(&self, actor: ActorHandle, ticket: DeathTicket) {
        let lifetime = self.lifetime();
        let _ = self.runtime.spawn(async move {
            tokio::time::sleep(lifetime).await;
            debug!(actor = actor.get(), ?lifetime, "actor died");
            ticket.fire();
        });
    }
}

impl ShopTrigger for Arena {
    fn open_shop(&self) {
        if self.shop_open.swap(true, Ordering::SeqCst) {
            debug!("shop already open");
            return;
        }
        info!(pause = ?self.settings.shop_pause, "shop opened");

        let shop_open = Arc::clone(&self.shop_open);
        let pause = self.settings.shop_pause;
        let _ = self.runtime.spawn(async move {
            tokio::time::sleep(pause).await;
            shop_open.store(false, Ordering::SeqCst);
            info!("shop closed");
        });
    }
}

impl WarningBeacon for Arena {
    fn show_warning(&self, location: Vec3) -> WarningId {
        let warning = WarningId::new(self.next_warning.fetch_add(1, Ordering::Relaxed));
        trace!(
            warning = warning.get(),
            x = location.x,
            z = location.z,
            "spawn warning shown"
        );
        warning
    }

    fn clear_warning(&self, warning: WarningId) {
        trace!(warning = warning.get(), "spawn warning cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn settings() -> ArenaSettings {
        ArenaSettings {
            min_lifetime: Duration::from_secs(1),
            max_lifetime: Duration::from_secs(3),
            shop_pause: Duration::from_secs(2),
            unspawnable: vec![ActorTypeId::new(9)],
        }
    }

    fn arena() -> Arena {
        Arena::new(settings(), HashMap::new(), 5, Handle::current())
    }

    #[tokio::test(start_paused = true)]
    async fn unspawnable_types_have_no_representative() {
        let arena = arena();
        assert_eq!(
            arena.spawn_actor(Vec3::ZERO, Quat::IDENTITY, ActorTypeId::new(9)),
            Err(SpawnError::NoRepresentative(ActorTypeId::new(9)))
        );
        assert_eq!(
            arena.spawn_actor(Vec3::ZERO, Quat::IDENTITY, ActorTypeId::new(1)),
            Ok(ActorHandle::new(1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn actors_die_within_their_lifetime() {
        let arena = arena();
        let deaths = Arc::new(AtomicUsize::new(0));
        for id in 0..8 {
            let deaths = Arc::clone(&deaths);
            arena.on_death(
                ActorHandle::new(id),
                DeathTicket::new(ActorHandle::new(id), move |_| {
                    let _ = deaths.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(deaths.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2_200)).await;
        assert_eq!(deaths.load(Ordering::SeqCst), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn shop_closes_after_its_pause() {
        let arena = arena();
        arena.open_shop();
        arena.open_shop();
        assert!(arena.shop_open.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert!(!arena.shop_open.load(Ordering::SeqCst));
    }
}
