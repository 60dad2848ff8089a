use crate::phases::Phase;

/// Error taxonomy entries from spec.md §7 that are owned by the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// An object's event callback failed. Per spec.md §4.1, this aborts the
    /// phase in flight and unwinds out of `advance_step`; the runtime itself
    /// remains consistent and the caller decides whether to continue.
    #[error("object {name:?} (handle {handle}) failed during phase {phase}: {source}")]
    HandlerThrow {
        handle: u64,
        name: String,
        phase: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Public API misuse (spec.md §7's `NotImplemented`/`LogicError`).
    #[error("logic error: {0}")]
    LogicError(String),
}

impl RuntimeError {
    pub fn handler_throw(
        handle: u64,
        name: impl Into<String>,
        phase: Phase,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        RuntimeError::HandlerThrow {
            handle,
            name: name.into(),
            phase: phase.name(),
            source: source.into(),
        }
    }
}
