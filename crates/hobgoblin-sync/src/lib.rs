//! Synchronized object registry: master/dummy replication, the per-tick
//! create/update/destroy waves, the state scheduler that absorbs jitter on
//! the receiving end, and the autodiff value wrapper the waves encode
//! (spec.md §3 "Sync Registry", §4.6-4.8).

pub mod autodiff;
pub mod dummy;
pub mod filter;
pub mod registry;
pub mod state_scheduler;

pub use autodiff::{AutodiffFields, AutodiffState};
pub use dummy::DummyRegistry;
pub use filter::{AlwaysRegularSync, ControlDelegate, FilterDecision, FnDelegate, RecipientId};
pub use registry::{SyncId, SyncMaster, SyncOp, SyncRegistry};
pub use state_scheduler::StateScheduler;
