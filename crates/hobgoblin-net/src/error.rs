use std::io;

/// Transport-owned error taxonomy (spec.md §7). Most of these never reach
/// application code directly — they convert into a `NodeEvent` and a state
/// transition on the owning connector instead (see `events.rs`); this type
/// exists for the handful of call sites that must fail loudly (public API
/// misuse, irrecoverable I/O).
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// A received frame violated the protocol: bad role, unknown handler
    /// index, payload underflow. Raises an event and closes the connector.
    #[error("illegal message: {0}")]
    IllegalMessage(String),

    /// Underlying socket I/O failed in a way that isn't a recoverable
    /// `WouldBlock`.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Calling a host-only method on a client-mode node or vice versa
    /// (spec.md §7 `NotImplemented`/`LogicError`).
    #[error("logic error: {0}")]
    LogicError(String),
}

impl NetError {
    pub fn illegal(msg: impl Into<String>) -> Self {
        NetError::IllegalMessage(msg.into())
    }
}

pub(crate) fn is_would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}
