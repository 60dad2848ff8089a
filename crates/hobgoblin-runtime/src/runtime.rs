use crate::error::RuntimeError;
use crate::object::{ActiveObject, EventContext, Handle, Ownership, PendingOps};
use crate::phases::{Phase, PhaseMask};
use hashbrown::HashMap;

struct Slot {
    object: Box<dyn ActiveObject>,
    priority: i64,
    ordinal: u64,
    ownership: Ownership,
}

/// Cooperative, event-phased scheduler over registered active objects with
/// deterministic ordering (spec.md §4.1). Grounded on
/// `t51core::world::World`/`registry::Registry`: a keyed store plus a
/// separately maintained, explicitly rebuilt ordering — here the priority
/// ordering the teacher's `Registry` leaves to `IndexMap` insertion order.
pub struct Runtime {
    slots: HashMap<Handle, Slot>,
    /// Current traversal order (descending priority, ties by insertion
    /// ordinal), rebuilt at each phase boundary.
    order: Vec<Handle>,
    next_handle: Handle,
    next_ordinal: u64,
    pending: PendingOps,
    /// Index into `Phase::ALL` for the step currently in flight.
    cursor: usize,
    stopped: bool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Runtime {
        Runtime {
            slots: HashMap::new(),
            order: Vec::new(),
            next_handle: 0,
            next_ordinal: 0,
            pending: PendingOps::new(),
            cursor: 0,
            stopped: false,
        }
    }

    /// Insert a new object into the ordered multiset keyed by
    /// `(-priority, insertion_ordinal)`. Visible to the very next phase
    /// boundary rebuild — including draw phases later in the same tick, per
    /// spec.md §4.1's "Draw is allowed to observe objects created this
    /// tick."
    pub fn add_object(
        &mut self,
        object: Box<dyn ActiveObject>,
        priority: i64,
        ownership: Ownership,
    ) -> Handle {
        let handle = self.next_handle;
        self.next_handle += 1;
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;

        self.slots.insert(
            handle,
            Slot {
                object,
                priority,
                ordinal,
                ownership,
            },
        );
        self.order.push(handle);
        handle
    }

    /// Flag an object for removal. Deferred if invoked during that object's
    /// own event; physically unlinked before the next phase begins.
    pub fn remove_object(&mut self, handle: Handle) {
        self.pending.removals.push(handle);
    }

    /// Destroy every owned object, in reverse-insertion order, leaving
    /// non-owned objects untouched.
    pub fn destroy_all_owned(&mut self) {
        let mut owned: Vec<(u64, Handle)> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.ownership == Ownership::Owned)
            .map(|(handle, slot)| (slot.ordinal, *handle))
            .collect();
        owned.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, handle) in owned {
            self.slots.remove(&handle);
        }
        self.order.retain(|handle| self.slots.contains_key(handle));
    }

    /// Linear scan by name, for diagnostics/tests only (spec.md §4.1).
    pub fn find(&self, name: &str) -> Option<&dyn ActiveObject> {
        self.slots
            .values()
            .find(|slot| slot.object.name() == name)
            .map(|slot| slot.object.as_ref())
    }

    /// Read-only iterator in current traversal order, for diagnostics/tests.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &dyn ActiveObject> + '_ {
        self.order
            .iter()
            .filter_map(move |handle| self.slots.get(handle).map(|slot| slot.object.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Request cooperative shutdown: checked between steps, never mid-step
    /// (spec.md §5 "Cancellation").
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Begin a new step: resets the phase cursor to `START_FRAME`.
    pub fn start_step(&mut self) {
        self.cursor = 0;
    }

    /// Drive the next phase belonging to `mask`, skipping phases outside
    /// it. Returns `Ok(true)` once the last phase in `mask` for this step
    /// has run (spec.md §4.1).
    pub fn advance_step(&mut self, mask: PhaseMask) -> Result<bool, RuntimeError> {
        while self.cursor < Phase::ALL.len() {
            let phase = Phase::ALL[self.cursor];
            self.cursor += 1;

            if phase.bit() & mask != 0 {
                self.rebuild_order();
                self.run_phase(phase)?;
                return Ok(!self.remaining_phase_in_mask(mask));
            }
        }
        Ok(true)
    }

    fn remaining_phase_in_mask(&self, mask: PhaseMask) -> bool {
        Phase::ALL[self.cursor..]
            .iter()
            .any(|phase| phase.bit() & mask != 0)
    }

    /// Apply deferred removals, then resort the traversal order by
    /// descending priority, ties by insertion ordinal (spec.md §4.1).
    fn rebuild_order(&mut self) {
        if !self.pending.removals.is_empty() {
            for handle in self.pending.removals.drain(..) {
                self.slots.remove(&handle);
            }
        }
        self.order.retain(|handle| self.slots.contains_key(handle));
        let slots = &self.slots;
        self.order.sort_by(|a, b| {
            let sa = &slots[a];
            let sb = &slots[b];
            sb.priority
                .cmp(&sa.priority)
                .then(sa.ordinal.cmp(&sb.ordinal))
        });
    }

    fn run_phase(&mut self, phase: Phase) -> Result<(), RuntimeError> {
        let handles: Vec<Handle> = if phase.is_draw() {
            self.order.iter().rev().copied().collect()
        } else {
            self.order.clone()
        };

        for handle in handles {
            let bit = phase.bit();
            let should_run = match self.slots.get(&handle) {
                Some(slot) => slot.object.phases() & bit != 0,
                None => false,
            };
            if !should_run {
                continue;
            }

            let name = self.slots[&handle].object.name().to_string();
            let mut ctx = EventContext::new(phase, handle, &mut self.pending);
            let slot = self
                .slots
                .get_mut(&handle)
                .expect("presence checked above");

            if let Err(source) = slot.object.on_event(&mut ctx) {
                return Err(RuntimeError::handler_throw(handle, name, phase, source));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        name: &'static str,
        mask: PhaseMask,
        log: Rc<RefCell<Vec<(&'static str, Phase)>>>,
    }

    impl ActiveObject for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn phases(&self) -> PhaseMask {
            self.mask
        }

        fn on_event(
            &mut self,
            ctx: &mut EventContext,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.log.borrow_mut().push((self.name, ctx.phase()));
            Ok(())
        }
    }

    fn run_full_step(runtime: &mut Runtime) {
        runtime.start_step();
        loop {
            if runtime.advance_step(crate::phases::ALL_MASK).unwrap() {
                break;
            }
        }
    }

    #[test]
    fn scenario_s6_update_and_draw_priority_ordering() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Runtime::new();

        let mask = Phase::Update1.bit() | Phase::Draw1.bit();
        rt.add_object(
            Box::new(Recorder {
                name: "A",
                mask,
                log: log.clone(),
            }),
            10,
            Ownership::Owned,
        );
        rt.add_object(
            Box::new(Recorder {
                name: "B",
                mask,
                log: log.clone(),
            }),
            10,
            Ownership::Owned,
        );
        rt.add_object(
            Box::new(Recorder {
                name: "C",
                mask,
                log: log.clone(),
            }),
            5,
            Ownership::Owned,
        );

        run_full_step(&mut rt);

        let recorded = log.borrow();
        let update_order: Vec<_> = recorded
            .iter()
            .filter(|(_, p)| *p == Phase::Update1)
            .map(|(n, _)| *n)
            .collect();
        let draw_order: Vec<_> = recorded
            .iter()
            .filter(|(_, p)| *p == Phase::Draw1)
            .map(|(n, _)| *n)
            .collect();

        assert_eq!(update_order, vec!["A", "B", "C"]);
        assert_eq!(draw_order, vec!["C", "B", "A"]);
    }

    #[test]
    fn destroy_all_owned_skips_non_owned_and_reverses_insertion_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Runtime::new();

        rt.add_object(
            Box::new(Recorder {
                name: "owned-1",
                mask: 0,
                log: log.clone(),
            }),
            0,
            Ownership::Owned,
        );
        rt.add_object(
            Box::new(Recorder {
                name: "kept",
                mask: 0,
                log: log.clone(),
            }),
            0,
            Ownership::NonOwned,
        );
        rt.add_object(
            Box::new(Recorder {
                name: "owned-2",
                mask: 0,
                log: log.clone(),
            }),
            0,
            Ownership::Owned,
        );

        rt.destroy_all_owned();

        assert!(rt.find("owned-1").is_none());
        assert!(rt.find("owned-2").is_none());
        assert!(rt.find("kept").is_some());
        assert_eq!(rt.len(), 1);
    }

    #[test]
    fn remove_self_mid_event_defers_unlink_to_next_phase_boundary() {
        struct SelfRemover {
            log: Rc<RefCell<Vec<Phase>>>,
        }

        impl ActiveObject for SelfRemover {
            fn name(&self) -> &str {
                "self-remover"
            }

            fn phases(&self) -> PhaseMask {
                Phase::Update1.bit() | Phase::Update2.bit()
            }

            fn on_event(
                &mut self,
                ctx: &mut EventContext,
            ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
                self.log.borrow_mut().push(ctx.phase());
                if ctx.phase() == Phase::Update1 {
                    ctx.remove_self();
                }
                Ok(())
            }
        }

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Runtime::new();
        rt.add_object(
            Box::new(SelfRemover { log: log.clone() }),
            0,
            Ownership::Owned,
        );

        run_full_step(&mut rt);

        // Update1 still dispatches, Update2 does not since the removal was
        // applied at the next phase boundary (the start of Update2).
        assert_eq!(*log.borrow(), vec![Phase::Update1]);
        assert!(rt.is_empty());
    }

    #[test]
    fn handler_error_aborts_remaining_objects_in_the_phase() {
        struct Faulty;

        impl ActiveObject for Faulty {
            fn name(&self) -> &str {
                "faulty"
            }

            fn phases(&self) -> PhaseMask {
                Phase::Update1.bit()
            }

            fn on_event(
                &mut self,
                _ctx: &mut EventContext,
            ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
                Err("boom".into())
            }
        }

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Runtime::new();
        rt.add_object(Box::new(Faulty), 10, Ownership::Owned);
        rt.add_object(
            Box::new(Recorder {
                name: "never-runs",
                mask: Phase::Update1.bit(),
                log: log.clone(),
            }),
            5,
            Ownership::Owned,
        );

        rt.start_step();
        let err = rt.advance_step(crate::phases::ALL_MASK);
        assert!(err.is_err());
        assert!(log.borrow().is_empty());
    }
}
