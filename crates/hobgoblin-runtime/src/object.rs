use crate::phases::{Phase, PhaseMask};
use std::error::Error as StdError;

/// Opaque handle identifying an active object (spec.md §3).
pub type Handle = u64;

/// Whether the runtime owns the object's lifetime (destroyed at teardown or
/// on request) or merely tracks it (spec.md §3's "owned"/"non-owned").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    NonOwned,
}

/// Mutations an object's event callback may request. Applied at the next
/// phase boundary so a running phase's traversal cursor is never invalidated
/// mid-iteration (spec.md §4.1) — grounded on
/// `t51core::world::World::transactions`/`process_transactions`, which
/// defers entity add/remove the same way relative to `process_systems`.
#[derive(Debug, Default)]
pub struct PendingOps {
    pub(crate) removals: Vec<Handle>,
}

impl PendingOps {
    pub(crate) fn new() -> Self {
        PendingOps::default()
    }
}

/// Per-callback context handed to `ActiveObject::on_event`.
pub struct EventContext<'a> {
    phase: Phase,
    handle: Handle,
    pending: &'a mut PendingOps,
}

impl<'a> EventContext<'a> {
    pub(crate) fn new(phase: Phase, handle: Handle, pending: &'a mut PendingOps) -> Self {
        EventContext {
            phase,
            handle,
            pending,
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Request removal of the object currently running (legal mid-event;
    /// physically unlinked before the next phase begins).
    #[inline]
    pub fn remove_self(&mut self) {
        self.pending.removals.push(self.handle);
    }

    /// Request removal of another object.
    #[inline]
    pub fn remove(&mut self, handle: Handle) {
        self.pending.removals.push(handle);
    }
}

/// A long-lived participant in the runtime's phase-based dispatch loop
/// (spec.md GLOSSARY).
pub trait ActiveObject {
    /// Diagnostic name, used by `Runtime::find` and logging.
    fn name(&self) -> &str;

    /// The set of phases this object implements, as a `PhaseMask` built from
    /// `Phase::bit()` ORs. Phases outside this set are not dispatched to it.
    fn phases(&self) -> PhaseMask;

    /// Handle one event phase. Returning `Err` aborts the in-flight phase
    /// for every remaining object (spec.md §4.1 "Failure semantics"). The
    /// runtime wraps the error with the failing object's handle/name/phase
    /// as `RuntimeError::HandlerThrow`.
    fn on_event(&mut self, ctx: &mut EventContext) -> Result<(), Box<dyn StdError + Send + Sync>>;
}
