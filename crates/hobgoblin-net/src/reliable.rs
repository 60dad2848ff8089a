//! The reliable-channel sliding window (spec.md §4.4), kept as pure data
//! structures with no socket in sight so the window/ack/retransmit logic is
//! unit-testable without real I/O — grounded on the same separation
//! `t51core::net::buffer::Buffer` draws between the byte queue and the
//! socket feeding it. Generic over the payload type `T` so the UDP session
//! layer can hand it decoded `RpcBody` values directly, with no
//! encode/decode round trip through raw bytes.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Per-tick retransmit budget (spec.md §4.4).
pub const MAX_RETRANSMITS_PER_TICK: usize = 16;

/// Upper bound on the retransmit age regardless of measured latency
/// (spec.md §4.4: `min(2*latency, 400ms)`).
pub const MAX_RETRANSMIT_AGE: Duration = Duration::from_millis(400);

fn retransmit_age(latency: Duration) -> Duration {
    let doubled = latency.saturating_add(latency);
    if doubled < MAX_RETRANSMIT_AGE {
        doubled
    } else {
        MAX_RETRANSMIT_AGE
    }
}

struct InFlight<T> {
    ordinal: u32,
    payload: T,
    last_sent: Instant,
}

/// The sender side of the reliable channel: a FIFO of unacknowledged frames,
/// retransmitted on aging past `min(2*latency, 400ms)`, capped at 16 per
/// tick (spec.md §4.4).
pub struct ReliableSender<T> {
    next_ordinal: u32,
    in_flight: Vec<InFlight<T>>,
}

impl<T> Default for ReliableSender<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ReliableSender<T> {
    pub fn new() -> ReliableSender<T> {
        ReliableSender {
            next_ordinal: 0,
            in_flight: Vec::new(),
        }
    }

    /// Stage `payload` as a new reliable frame; returns its assigned
    /// ordinal, which the caller sends immediately and records as sent now.
    pub fn send(&mut self, payload: T, now: Instant) -> u32 {
        let ordinal = self.next_ordinal;
        self.next_ordinal = self.next_ordinal.wrapping_add(1);
        self.in_flight.push(InFlight {
            ordinal,
            payload,
            last_sent: now,
        });
        ordinal
    }

    /// Retire an acknowledged frame. A no-op if the ordinal is unknown
    /// (already retired, or never sent by this sender).
    pub fn ack(&mut self, ordinal: u32) {
        self.in_flight.retain(|f| f.ordinal != ordinal);
    }

    /// Frames whose last-send age exceeds the retransmit threshold for the
    /// given measured `latency`, oldest first, capped at
    /// `MAX_RETRANSMITS_PER_TICK`. Marks every returned frame's `last_sent`
    /// as `now`.
    pub fn due_retransmits(&mut self, now: Instant, latency: Duration) -> Vec<(u32, T)> {
        let threshold = retransmit_age(latency);
        let mut due: Vec<usize> = self
            .in_flight
            .iter()
            .enumerate()
            .filter(|(_, f)| now.saturating_duration_since(f.last_sent) > threshold)
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| self.in_flight[i].last_sent);
        due.truncate(MAX_RETRANSMITS_PER_TICK);

        let mut out = Vec::with_capacity(due.len());
        for i in due {
            self.in_flight[i].last_sent = now;
            out.push((self.in_flight[i].ordinal, self.in_flight[i].payload.clone()));
        }
        out
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }
}

/// The receiver side of the reliable channel: a sliding window indexed by
/// `ordinal - recv_head`. Duplicates are acked and dropped; the head
/// advances past contiguous filled slots (spec.md §4.4).
pub struct ReliableReceiver<T> {
    recv_head: u32,
    window: BTreeMap<u32, T>,
}

impl<T> Default for ReliableReceiver<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Admit<T> {
    /// Newly-seen frame(s) delivered in contiguous order, ready for the RPC
    /// dispatcher; always ack the triggering ordinal.
    Delivered(Vec<T>),
    /// Already seen (either already delivered, or buffered ahead of the
    /// head); ack it again but do not redeliver.
    Duplicate,
}

impl<T> ReliableReceiver<T> {
    pub fn new() -> ReliableReceiver<T> {
        ReliableReceiver {
            recv_head: 0,
            window: BTreeMap::new(),
        }
    }

    /// Feed one received `DATA` frame. Returns the payloads that became
    /// deliverable (the triggering one plus any contiguous successors that
    /// were already buffered) in ordinal order.
    pub fn receive(&mut self, ordinal: u32, payload: T) -> Admit<T> {
        if ordinal < self.recv_head || self.window.contains_key(&ordinal) {
            return Admit::Duplicate;
        }
        self.window.insert(ordinal, payload);

        let mut delivered = Vec::new();
        while let Some(payload) = self.window.remove(&self.recv_head) {
            delivered.push(payload);
            self.recv_head = self.recv_head.wrapping_add(1);
        }
        Admit::Delivered(delivered)
    }

    pub fn recv_head(&self) -> u32 {
        self.recv_head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_frames_deliver_immediately() {
        let mut recv: ReliableReceiver<Vec<u8>> = ReliableReceiver::new();
        assert_eq!(
            recv.receive(0, b"a".to_vec()),
            Admit::Delivered(vec![b"a".to_vec()])
        );
        assert_eq!(
            recv.receive(1, b"b".to_vec()),
            Admit::Delivered(vec![b"b".to_vec()])
        );
        assert_eq!(recv.recv_head(), 2);
    }

    #[test]
    fn out_of_order_frame_buffers_until_gap_fills() {
        let mut recv: ReliableReceiver<Vec<u8>> = ReliableReceiver::new();
        assert_eq!(recv.receive(1, b"b".to_vec()), Admit::Delivered(vec![]));
        assert_eq!(recv.recv_head(), 0);

        assert_eq!(
            recv.receive(0, b"a".to_vec()),
            Admit::Delivered(vec![b"a".to_vec(), b"b".to_vec()])
        );
        assert_eq!(recv.recv_head(), 2);
    }

    #[test]
    fn duplicate_frame_below_head_is_reported_as_duplicate() {
        let mut recv: ReliableReceiver<Vec<u8>> = ReliableReceiver::new();
        recv.receive(0, b"a".to_vec());
        assert_eq!(recv.receive(0, b"a".to_vec()), Admit::Duplicate);
    }

    #[test]
    fn duplicate_frame_buffered_ahead_of_head_is_reported_as_duplicate() {
        let mut recv: ReliableReceiver<Vec<u8>> = ReliableReceiver::new();
        recv.receive(2, b"c".to_vec());
        assert_eq!(recv.receive(2, b"c".to_vec()), Admit::Duplicate);
    }

    #[test]
    fn sender_acks_retire_in_flight_frames() {
        let mut sender: ReliableSender<Vec<u8>> = ReliableSender::new();
        let t0 = Instant::now();
        let ord = sender.send(b"x".to_vec(), t0);
        assert_eq!(sender.pending_count(), 1);
        sender.ack(ord);
        assert_eq!(sender.pending_count(), 0);
    }

    #[test]
    fn frames_retransmit_only_after_aging_past_threshold() {
        let mut sender: ReliableSender<Vec<u8>> = ReliableSender::new();
        let t0 = Instant::now();
        sender.send(b"x".to_vec(), t0);

        let too_soon = t0 + Duration::from_millis(10);
        assert!(sender.due_retransmits(too_soon, Duration::from_millis(50)).is_empty());

        let late_enough = t0 + Duration::from_millis(120);
        let due = sender.due_retransmits(late_enough, Duration::from_millis(50));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, b"x".to_vec());
    }

    #[test]
    fn retransmit_age_is_capped_at_400ms_regardless_of_latency() {
        assert_eq!(retransmit_age(Duration::from_secs(10)), MAX_RETRANSMIT_AGE);
        assert_eq!(retransmit_age(Duration::from_millis(10)), Duration::from_millis(20));
    }

    #[test]
    fn retransmit_budget_caps_at_sixteen_per_tick() {
        let mut sender: ReliableSender<Vec<u8>> = ReliableSender::new();
        let t0 = Instant::now();
        for i in 0..20u8 {
            sender.send(vec![i], t0);
        }
        let due = sender.due_retransmits(t0 + Duration::from_millis(500), Duration::from_millis(10));
        assert_eq!(due.len(), MAX_RETRANSMITS_PER_TICK);
    }
}
