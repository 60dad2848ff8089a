//! Per-recipient filter decisions (spec.md §4.7, GLOSSARY "Filter
//! decision"). Kept as a closed enum plus a small trait rather than virtual
//! dispatch, per spec.md §9's "Runtime-polymorphic filter callbacks ...
//! implementers can prefer tagged-variant dispatch over virtual calls."

/// A connected recipient, identified by transport slot (spec.md §3
/// "the set of known recipients").
pub type RecipientId = usize;

/// Classification of one recipient for one sync wave this tick
/// (spec.md §4.7 "Filter semantics").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Send the update this tick; clear any prior deactivation.
    RegularSync,
    /// Do not send this tick; leave deactivation status unchanged.
    Skip,
    /// Ensure the recipient is marked deactivated on both sides.
    Deactivate,
}

/// The control delegate a master's sync-impl callback receives to classify
/// recipients (spec.md §4.7 "invoke the master's sync-impl callback passing
/// a control delegate whose `filter(recipients -> decision)` method...").
pub trait ControlDelegate {
    fn filter(&mut self, recipient: RecipientId) -> FilterDecision;
}

/// The common case: every recipient gets the same decision. Grounded on
/// the "default: sync to everyone" behavior most masters in the original
/// engine's test harnesses rely on when they never override the filter.
pub struct AlwaysRegularSync;

impl ControlDelegate for AlwaysRegularSync {
    fn filter(&mut self, _recipient: RecipientId) -> FilterDecision {
        FilterDecision::RegularSync
    }
}

/// Adapts a plain closure into a `ControlDelegate`, for masters whose
/// filter logic is a one-liner.
pub struct FnDelegate<F>(pub F)
where
    F: FnMut(RecipientId) -> FilterDecision;

impl<F> ControlDelegate for FnDelegate<F>
where
    F: FnMut(RecipientId) -> FilterDecision,
{
    fn filter(&mut self, recipient: RecipientId) -> FilterDecision {
        (self.0)(recipient)
    }
}
