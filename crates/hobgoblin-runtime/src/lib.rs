//! Cooperative, event-phased active object runtime.
//!
//! Drives a fixed set of registered objects through the fourteen event
//! phases in deterministic priority order, buffering mutations until phase
//! boundaries so iteration is never invalidated mid-phase.

pub mod error;
pub mod object;
pub mod pacer;
pub mod phases;
pub mod runtime;

pub use error::RuntimeError;
pub use object::{ActiveObject, EventContext, Handle, Ownership};
pub use pacer::{FramePacer, TickOutcome};
pub use phases::{Phase, PhaseMask, ALL_MASK, DISPLAY_MASK, DRAW_MASK, END_FRAME_MASK, NON_DRAW_MASK};
pub use runtime::Runtime;
