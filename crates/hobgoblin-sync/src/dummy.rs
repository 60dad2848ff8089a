//! Client-side dummy registry: tracks one `StateScheduler` per sync-id and
//! applies incoming create/update/destroy/deactivate/reactivate ops to it
//! (spec.md §3 "Dummy", §4.7 "dummy-side").
//!
//! Grounded on the same keyed-store shape as `registry::SyncRegistry`, but
//! one-directional: it only ever consumes ops produced by a remote master,
//! never classifies recipients.

use hashbrown::HashMap;

use crate::registry::SyncId;
use crate::state_scheduler::StateScheduler;

struct DummyEntry<S: Clone> {
    scheduler: StateScheduler<S>,
    deactivated: bool,
    /// Tick at which this dummy should be torn down, set by `on_destroy`
    /// to the sender's current update ordinal so the destroy lands in sync
    /// with the state stream rather than as soon as the packet arrives
    /// (spec.md §4.7 "destroy scheduled for the tick matching the sender's
    /// current update ordinal").
    destroy_at_tick: Option<u64>,
}

/// Client-side counterpart of [`crate::registry::SyncRegistry`]: one entry
/// per sync-id, each holding its own delay buffer.
pub struct DummyRegistry<S: Clone> {
    entries: HashMap<SyncId, DummyEntry<S>>,
    tick: u64,
    default_len: usize,
}

impl<S: Clone> DummyRegistry<S> {
    pub fn new(default_len: usize) -> DummyRegistry<S> {
        DummyRegistry {
            entries: HashMap::new(),
            tick: 0,
            default_len,
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn contains(&self, sync_id: SyncId) -> bool {
        self.entries.contains_key(&sync_id)
    }

    pub fn is_deactivated(&self, sync_id: SyncId) -> bool {
        self.entries.get(&sync_id).map(|e| e.deactivated).unwrap_or(false)
    }

    /// Create a new dummy: allocates a scheduler and seeds it with the
    /// master's full state at the given delay (spec.md §4.7).
    pub fn on_create(&mut self, sync_id: SyncId, state: S, delay: usize) {
        let mut scheduler = StateScheduler::new(self.default_len);
        scheduler.put(state, delay);
        self.entries.insert(
            sync_id,
            DummyEntry {
                scheduler,
                deactivated: false,
                destroy_at_tick: None,
            },
        );
    }

    /// Apply an incremental update at the given delay. A dummy that has
    /// never seen a create for this sync-id is ignored: the create wave
    /// always precedes updates for the same tick, so this indicates a
    /// stale or out-of-order packet.
    pub fn on_update(&mut self, sync_id: SyncId, state: S, delay: usize) {
        if let Some(entry) = self.entries.get_mut(&sync_id) {
            entry.scheduler.put(state, delay);
        }
    }

    /// A reactivation carries full state exactly like a create, but the
    /// dummy already exists (spec.md §4.7 "reactivate+full state").
    pub fn on_reactivate(&mut self, sync_id: SyncId, state: S, delay: usize) {
        if let Some(entry) = self.entries.get_mut(&sync_id) {
            entry.deactivated = false;
            entry.scheduler.put(state, delay);
        }
    }

    /// Mark the dummy deactivated: its scheduler keeps coasting on its last
    /// known state but stops being treated as actively synced
    /// (spec.md §4.7).
    pub fn on_deactivate(&mut self, sync_id: SyncId) {
        if let Some(entry) = self.entries.get_mut(&sync_id) {
            entry.deactivated = true;
        }
    }

    /// Schedule destruction for `at_tick` rather than immediately, so a
    /// destroy that arrives while earlier updates are still buffered
    /// doesn't outrun them (spec.md §8 S2: "observes a plausible create,
    /// then destroy, without ever having seen deliberately reordered
    /// partial state").
    pub fn on_destroy(&mut self, sync_id: SyncId, at_tick: u64) {
        if let Some(entry) = self.entries.get_mut(&sync_id) {
            entry.destroy_at_tick = Some(at_tick);
        }
    }

    pub fn current(&self, sync_id: SyncId) -> Option<&S> {
        self.entries.get(&sync_id).and_then(|e| e.scheduler.current())
    }

    /// Advance every live scheduler by one tick, then reap any dummy whose
    /// scheduled destroy tick has been reached. Returns the sync-ids
    /// destroyed this call.
    pub fn advance(&mut self) -> Vec<SyncId> {
        self.tick += 1;
        for entry in self.entries.values_mut() {
            entry.scheduler.advance();
        }
        let due: Vec<SyncId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.destroy_at_tick == Some(self.tick))
            .map(|(id, _)| *id)
            .collect();
        for id in &due {
            self.entries.remove(id);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_advance_surfaces_the_seeded_state() {
        let mut dummies: DummyRegistry<i32> = DummyRegistry::new(1);
        dummies.on_create(5, 100, 0);
        dummies.advance();
        assert_eq!(dummies.current(5), Some(&100));
    }

    #[test]
    fn update_arriving_at_a_delay_surfaces_after_the_matching_number_of_advances() {
        let mut dummies: DummyRegistry<i32> = DummyRegistry::new(2);
        dummies.on_create(1, 10, 0);
        dummies.advance();
        dummies.on_update(1, 20, 2);
        dummies.advance();
        assert_eq!(dummies.current(1), Some(&10));
        dummies.advance();
        assert_eq!(dummies.current(1), Some(&20));
    }

    #[test]
    fn scenario_s2_destroy_scheduled_for_a_future_tick_does_not_preempt_buffered_updates() {
        let mut dummies: DummyRegistry<i32> = DummyRegistry::new(2);
        dummies.on_create(1, 1, 0);
        dummies.advance(); // tick 1
        dummies.on_destroy(1, 3);
        dummies.on_update(1, 2, 1);
        dummies.advance(); // tick 2: still alive, state coasts on 1
        assert!(dummies.contains(1));
        assert_eq!(dummies.current(1), Some(&1));
        let destroyed = dummies.advance(); // tick 3: reap
        assert_eq!(destroyed, vec![1]);
        assert!(!dummies.contains(1));
    }

    #[test]
    fn deactivate_then_reactivate_clears_the_deactivated_flag() {
        let mut dummies: DummyRegistry<i32> = DummyRegistry::new(1);
        dummies.on_create(1, 1, 0);
        dummies.on_deactivate(1);
        assert!(dummies.is_deactivated(1));
        dummies.on_reactivate(1, 99, 0);
        assert!(!dummies.is_deactivated(1));
        dummies.advance();
        assert_eq!(dummies.current(1), Some(&99));
    }

    #[test]
    fn update_for_an_unknown_sync_id_is_silently_ignored() {
        let mut dummies: DummyRegistry<i32> = DummyRegistry::new(1);
        dummies.on_update(42, 7, 0);
        assert!(!dummies.contains(42));
    }
}
