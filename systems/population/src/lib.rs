#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Thread-safe bookkeeping of the actors a scheduler has spawned.
//!
//! Every mutation goes through a single `watch` channel, so increments,
//! decrements and reservations issued from many actor lifecycles are
//! serialised without lost updates, and waiters are woken on change instead
//! of polling.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use wavefront_core::{ActorHandle, DeathTicket};

/// Point-in-time view of the tracked population.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Population {
    /// Actors that were instantiated and have not reported their death.
    pub alive: u32,
    /// Capacity slots held by spawns that are still waiting out a warning.
    pub reserved: u32,
}

impl Population {
    /// Slots counted against the cap: alive actors plus reservations.
    #[must_use]
    pub const fn occupied(&self) -> u32 {
        self.alive.saturating_add(self.reserved)
    }
}

/// Counter of live actors with floor-at-zero decrements.
#[derive(Debug)]
pub struct PopulationTracker {
    state: watch::Sender<Population>,
}

impl Default for PopulationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PopulationTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(Population::default());
        Self { state }
    }

    /// Captures the current population.
    #[must_use]
    pub fn snapshot(&self) -> Population {
        *self.state.borrow()
    }

    /// Number of actors currently alive.
    #[must_use]
    pub fn alive(&self) -> u32 {
        self.state.borrow().alive
    }

    /// Reports whether another actor fits under `cap`.
    #[must_use]
    pub fn has_room(&self, cap: u32) -> bool {
        self.state.borrow().occupied() < cap
    }

    /// Removes one actor. Decrementing an empty population is a no-op.
    pub fn decrement(&self) {
        let changed = self.state.send_if_modified(|population| {
            if population.alive == 0 {
                return false;
            }
            population.alive -= 1;
            true
        });
        if !changed {
            trace!("ignored death notification for an empty population");
        }
    }

    /// Atomically claims a capacity slot when fewer than `cap` are occupied.
    pub fn try_reserve(self: &Arc<Self>, cap: u32) -> Option<Reservation> {
        let reserved = self.state.send_if_modified(|population| {
            if population.occupied() >= cap {
                return false;
            }
            population.reserved += 1;
            true
        });

        reserved.then(|| Reservation {
            tracker: Arc::clone(self),
            committed: false,
        })
    }

    /// Waits until no actor is alive.
    ///
    /// Returns `false` when `cancel` fires first.
    pub async fn wait_for_drain(&self, cancel: &CancellationToken) -> bool {
        let mut updates = self.state.subscribe();
        let drained = async move {
            updates
                .wait_for(|population| population.alive == 0)
                .await
                .is_ok()
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            drained = drained => drained,
        }
    }

    fn death_ticket(self: &Arc<Self>, actor: ActorHandle) -> DeathTicket {
        let tracker = Arc::clone(self);
        DeathTicket::new(actor, move |actor| {
            tracker.decrement();
            trace!(actor = actor.get(), alive = tracker.alive(), "actor died");
        })
    }
}

/// Capacity slot held while a spawn waits out its warning.
///
/// Dropping the reservation releases the slot; [`Reservation::commit`]
/// turns it into a live actor instead.
#[derive(Debug)]
#[must_use = "dropping a reservation releases its slot immediately"]
pub struct Reservation {
    tracker: Arc<PopulationTracker>,
    committed: bool,
}

impl Reservation {
    /// Converts the slot into a live actor and issues its death ticket.
    pub fn commit(mut self, actor: ActorHandle) -> DeathTicket {
        self.committed = true;
        self.tracker.state.send_modify(|population| {
            population.reserved = population.reserved.saturating_sub(1);
            population.alive = population.alive.saturating_add(1);
        });
        self.tracker.death_ticket(actor)
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.tracker.state.send_modify(|population| {
            population.reserved = population.reserved.saturating_sub(1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupied_counts_reservations() {
        let population = Population {
            alive: 3,
            reserved: 2,
        };
        assert_eq!(population.occupied(), 5);
    }

    #[test]
    fn reservation_blocks_cap_until_released() {
        let tracker = Arc::new(PopulationTracker::new());
        let first = tracker.try_reserve(1).expect("slot available");
        assert!(tracker.try_reserve(1).is_none(), "cap of one is taken");
        assert!(!tracker.has_room(1));

        drop(first);
        assert_eq!(tracker.snapshot(), Population::default());
        assert!(tracker.has_room(1));
    }
}
