/// Events a node accumulates for the host to drain, one per connector
/// transition or protocol violation (spec.md §6 "Events").
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Connected(Option<usize>),
    Disconnected(Option<usize>),
    ConnectionTimedOut(Option<usize>),
    ConnectAttemptTimedOut(u64),
    BadPassphrase {
        received: String,
        slot: Option<usize>,
    },
    Kicked,
    IllegalRegistryRequest {
        slot: usize,
        key: String,
    },
}

/// FIFO event queue owned by a `Node`. Kept deliberately dumb — a `Vec`
/// behind push/drain, mirroring how the teacher's channel layer collects
/// connection-lifecycle notifications for the main thread to poll once per
/// tick rather than reacting inline.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<NodeEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue::default()
    }

    pub fn push(&mut self, event: NodeEvent) {
        self.events.push(event);
    }

    /// Drain every queued event in arrival order.
    pub fn drain(&mut self) -> std::vec::Drain<'_, NodeEvent> {
        self.events.drain(..)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
