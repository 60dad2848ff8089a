//! One endpoint of a session: state machine, timeout clock, and the
//! reliable/unreliable channel pair (spec.md §3 "Connector", §4.4).
//!
//! Grounded on `t51core::net::endpoint::Endpoint`'s per-channel `Timing`
//! struct (incoming/outgoing timestamps) and slot-pool bookkeeping, but
//! collapsed onto one `Connector` per remote peer rather than a shared pool,
//! since RigelNet fixes the slot assignment to "client index" up front
//! (spec.md §4.3 "allocates N fixed-slot connectors").

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::frame::RpcBody;
use crate::reliable::{Admit, ReliableReceiver, ReliableSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Idle,
    Connecting,
    Accepting,
    Connected,
    Disconnected,
}

/// One endpoint of a session (spec.md §3). Owns the reliable/unreliable
/// channel state and the timeout clock; the UDP/TCP session layers drive it
/// with incoming frames and periodic ticks.
pub struct Connector {
    pub state: ConnectorState,
    pub remote: Option<SocketAddr>,
    pub rtt: Duration,
    timeout: Duration,
    last_activity: Instant,
    /// Remaining time on the timeout clock at the moment of `pause()`; the
    /// clock is frozen (not merely slowed) while `Some` (spec.md §4.4
    /// "Pauses ... freeze this timer").
    paused_remaining: Option<Duration>,
    pub reliable_tx: ReliableSender<RpcBody>,
    pub reliable_rx: ReliableReceiver<RpcBody>,
    unsafe_next_ordinal: u32,
    unsafe_highest_seen: Option<u32>,
    /// Ordinals received since the last flush, awaiting an outbound
    /// `UNSAFE_DATA` to carry them (spec.md §4.4 "piggybacked on the next
    /// `UNSAFE_DATA` frame").
    pending_acks: Vec<u32>,
    /// When a stage-0 heartbeat PING was last sent, awaiting its stage-1
    /// reply (spec.md §4.3 step 3: "if no pending heartbeat, send a PING
    /// ... and start its round-trip timer").
    ping_sent_at: Option<Instant>,
}

impl Connector {
    /// `timeout == Duration::ZERO` disables the timer (spec.md §4.4
    /// "`timeoutMs == 0` disables the timer").
    pub fn new(timeout: Duration) -> Connector {
        Connector {
            state: ConnectorState::Idle,
            remote: None,
            rtt: Duration::ZERO,
            timeout,
            last_activity: Instant::now(),
            paused_remaining: None,
            reliable_tx: ReliableSender::new(),
            reliable_rx: ReliableReceiver::new(),
            unsafe_next_ordinal: 0,
            unsafe_highest_seen: None,
            pending_acks: Vec::new(),
            ping_sent_at: None,
        }
    }

    pub fn begin_connect(&mut self, remote: SocketAddr, now: Instant) {
        self.reset(now);
        self.remote = Some(remote);
        self.state = ConnectorState::Connecting;
    }

    pub fn begin_accept(&mut self, remote: SocketAddr, now: Instant) {
        self.reset(now);
        self.remote = Some(remote);
        self.state = ConnectorState::Accepting;
    }

    pub fn mark_connected(&mut self, now: Instant) {
        self.state = ConnectorState::Connected;
        self.touch(now);
    }

    /// Return to `Idle`, clearing session state (spec.md §3 Connector
    /// fields: send/recv buffers, sequence counters, ACK table).
    pub fn reset(&mut self, now: Instant) {
        self.state = ConnectorState::Idle;
        self.remote = None;
        self.rtt = Duration::ZERO;
        self.paused_remaining = None;
        self.reliable_tx = ReliableSender::new();
        self.reliable_rx = ReliableReceiver::new();
        self.unsafe_next_ordinal = 0;
        self.unsafe_highest_seen = None;
        self.pending_acks.clear();
        self.ping_sent_at = None;
        self.last_activity = now;
    }

    /// Record that a frame was received from the remote, resetting the
    /// timeout clock.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Freeze the timeout clock, recording the remaining time
    /// (spec.md §5/§4.4: pause/unpause freezes timeouts).
    pub fn pause(&mut self, now: Instant) {
        if self.paused_remaining.is_none() && self.timeout > Duration::ZERO {
            let elapsed = now.saturating_duration_since(self.last_activity);
            self.paused_remaining = Some(self.timeout.saturating_sub(elapsed));
        }
    }

    /// Resume the timeout clock from exactly where it was frozen.
    pub fn unpause(&mut self, now: Instant) {
        if let Some(remaining) = self.paused_remaining.take() {
            self.last_activity = now.checked_sub(self.timeout.saturating_sub(remaining)).unwrap_or(now);
        }
    }

    /// True if no frame has arrived for `timeout` contiguous milliseconds.
    /// Always `false` while paused or while the timer is disabled
    /// (`timeout == Duration::ZERO`).
    pub fn is_timed_out(&self, now: Instant) -> bool {
        if self.timeout.is_zero() || self.paused_remaining.is_some() {
            return false;
        }
        now.saturating_duration_since(self.last_activity) >= self.timeout
    }

    /// Transition to `Idle`/`Disconnected`-by-timeout; caller raises the
    /// `ConnectionTimedOut` event.
    pub fn expire(&mut self, now: Instant) {
        self.reset(now);
    }

    pub fn disconnect(&mut self, now: Instant) {
        self.reset(now);
        self.state = ConnectorState::Disconnected;
    }

    /// True if there is no heartbeat round-trip currently in flight, i.e.
    /// the next tick should send one (spec.md §4.3 step 3).
    pub fn heartbeat_due(&self) -> bool {
        self.ping_sent_at.is_none()
    }

    /// Record that a stage-0 heartbeat PING was just sent, starting the
    /// round-trip timer (spec.md §4.3 step 3, §3 "measured round-trip time").
    pub fn start_heartbeat(&mut self, now: Instant) {
        self.ping_sent_at = Some(now);
    }

    /// Record a stage-1 PING reply, completing the round-trip measurement.
    /// A reply with no matching in-flight ping (already timed out, or a
    /// duplicate) is ignored.
    pub fn record_pong(&mut self, now: Instant) {
        if let Some(sent) = self.ping_sent_at.take() {
            self.rtt = now.saturating_duration_since(sent);
        }
    }

    /// Assign the next unreliable-channel ordinal (spec.md §4.4
    /// "monotonically increasing ordinal").
    pub fn next_unsafe_ordinal(&mut self) -> u32 {
        let ordinal = self.unsafe_next_ordinal;
        self.unsafe_next_ordinal = self.unsafe_next_ordinal.wrapping_add(1);
        ordinal
    }

    /// Accept or discard an `UNSAFE_DATA` frame: discarded if its ordinal is
    /// not strictly greater than the latest one seen (spec.md §4.4 "Frames
    /// with an ordinal <= the latest received are discarded").
    pub fn admit_unsafe(&mut self, ordinal: u32) -> bool {
        let admit = match self.unsafe_highest_seen {
            Some(highest) => ordinal > highest,
            None => true,
        };
        if admit {
            self.unsafe_highest_seen = Some(ordinal);
        }
        admit
    }

    /// Feed one received `DATA` frame through the reliable-channel window,
    /// queuing its ordinal for the next ack flush regardless of whether it
    /// turned out to be a duplicate (spec.md §4.4 "duplicates are ACKed and
    /// dropped").
    pub fn admit_reliable(&mut self, ordinal: u32, payload: RpcBody) -> Admit<RpcBody> {
        self.pending_acks.push(ordinal);
        self.reliable_rx.receive(ordinal, payload)
    }

    /// Drain ordinals queued for acknowledgement since the last flush.
    pub fn drain_pending_acks(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.pending_acks)
    }

    pub fn has_pending_acks(&self) -> bool {
        !self.pending_acks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn fresh_connector_starts_idle() {
        let c = Connector::new(Duration::from_millis(5000));
        assert_eq!(c.state, ConnectorState::Idle);
    }

    #[test]
    fn connect_then_mark_connected_transitions_as_expected() {
        let mut c = Connector::new(Duration::from_millis(5000));
        let now = Instant::now();
        c.begin_connect(addr(), now);
        assert_eq!(c.state, ConnectorState::Connecting);
        c.mark_connected(now);
        assert_eq!(c.state, ConnectorState::Connected);
    }

    #[test]
    fn zero_timeout_disables_the_timer() {
        let c = Connector::new(Duration::ZERO);
        let far_future = Instant::now() + Duration::from_secs(1_000_000);
        assert!(!c.is_timed_out(far_future));
    }

    #[test]
    fn connector_times_out_after_silence_exceeds_timeout() {
        let mut c = Connector::new(Duration::from_millis(100));
        let t0 = Instant::now();
        c.begin_accept(addr(), t0);
        assert!(!c.is_timed_out(t0 + Duration::from_millis(50)));
        assert!(c.is_timed_out(t0 + Duration::from_millis(150)));
    }

    #[test]
    fn touch_resets_the_timeout_clock() {
        let mut c = Connector::new(Duration::from_millis(100));
        let t0 = Instant::now();
        c.begin_accept(addr(), t0);
        let t1 = t0 + Duration::from_millis(80);
        c.touch(t1);
        assert!(!c.is_timed_out(t1 + Duration::from_millis(50)));
    }

    #[test]
    fn pause_freezes_timeout_and_unpause_resumes_from_frozen_point() {
        let mut c = Connector::new(Duration::from_millis(100));
        let t0 = Instant::now();
        c.begin_accept(addr(), t0);

        let pause_at = t0 + Duration::from_millis(90);
        c.pause(pause_at);

        // Even well past the nominal timeout deadline, a paused connector
        // never reports timed-out.
        assert!(!c.is_timed_out(pause_at + Duration::from_secs(10)));

        let resume_at = pause_at + Duration::from_secs(5);
        c.unpause(resume_at);

        // Only 10ms of timeout budget remained when paused.
        assert!(!c.is_timed_out(resume_at + Duration::from_millis(5)));
        assert!(c.is_timed_out(resume_at + Duration::from_millis(15)));
    }

    #[test]
    fn unsafe_channel_discards_ordinals_at_or_below_the_latest_seen() {
        let mut c = Connector::new(Duration::from_millis(100));
        assert!(c.admit_unsafe(5));
        assert!(!c.admit_unsafe(5));
        assert!(!c.admit_unsafe(3));
        assert!(c.admit_unsafe(6));
    }

    #[test]
    fn heartbeat_round_trip_measures_rtt() {
        let mut c = Connector::new(Duration::from_millis(5000));
        let t0 = Instant::now();
        c.begin_connect(addr(), t0);
        assert!(c.heartbeat_due());
        c.start_heartbeat(t0);
        assert!(!c.heartbeat_due());

        let t1 = t0 + Duration::from_millis(37);
        c.record_pong(t1);
        assert_eq!(c.rtt, Duration::from_millis(37));
        assert!(c.heartbeat_due());
    }

    #[test]
    fn pong_with_no_in_flight_ping_is_ignored() {
        let mut c = Connector::new(Duration::from_millis(5000));
        let t0 = Instant::now();
        c.begin_connect(addr(), t0);
        c.record_pong(t0 + Duration::from_millis(10));
        assert_eq!(c.rtt, Duration::ZERO);
    }

    #[test]
    fn reset_clears_channel_state_and_returns_to_idle() {
        let mut c = Connector::new(Duration::from_millis(100));
        let t0 = Instant::now();
        c.begin_connect(addr(), t0);
        c.mark_connected(t0);
        c.admit_unsafe(10);
        c.reset(t0);
        assert_eq!(c.state, ConnectorState::Idle);
        assert!(c.admit_unsafe(0));
    }
}
