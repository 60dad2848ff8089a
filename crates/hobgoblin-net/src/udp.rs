//! UDP session: handshake, reliable/unreliable channels, retransmit
//! (spec.md §4.4). Grounded on `neutronium::net::endpoint::Endpoint`'s
//! non-blocking, main-thread-polled socket model (spec.md §5 AMBIENT note),
//! with the window/ack/retransmit protocol logic delegated to
//! `reliable.rs`/`connector.rs` so this module is mostly socket plumbing and
//! handshake sequencing.

use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::net::UdpSocket;

use crate::connector::{Connector, ConnectorState};
use crate::dispatcher::{self, Outgoing, Role, RpcContext};
use crate::error::{is_would_block, NetError};
use crate::events::{EventQueue, NodeEvent};
use crate::frame::{ArgValue, RpcBody, UdpFrame};
use crate::reliable::Admit;

const MAX_DATAGRAM: usize = 65536;

/// How often (in ticks) a connecting/accepting peer re-sends its handshake
/// frame (spec.md §4.4: "every `interval*10` ticks").
fn handshake_resend_ticks(interval: u32) -> u32 {
    interval.max(1) * 10
}

fn recv_loop(socket: &UdpSocket) -> io::Result<Vec<(SocketAddr, Vec<u8>)>> {
    let mut out = Vec::new();
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => out.push((from, buf[..n].to_vec())),
            Err(e) if is_would_block(&e) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

fn send_frame(socket: &UdpSocket, addr: SocketAddr, frame: &UdpFrame) -> io::Result<()> {
    let bytes = frame.encode().into_bytes();
    socket.send_to(&bytes, addr)?;
    Ok(())
}

/// Configuration mirroring spec.md §4.4's `start(port, interval, timeoutMs)`
/// argument list, generalized into a value the host constructs once
/// (SPEC_FULL.md AMBIENT: configuration).
pub struct UdpServerConfig {
    pub passphrase: String,
    pub max_clients: usize,
    pub interval_ticks: u32,
    pub timeout: Duration,
}

struct Slot {
    connector: Connector,
    ticks_since_resend: u32,
}

/// Server side of a UDP session: `N` fixed-slot connectors, a shared
/// listening socket, and the per-tick accept/reap/retransmit/dispatch
/// sequence from spec.md §4.4.
pub struct UdpServer {
    socket: UdpSocket,
    config: UdpServerConfig,
    slots: Vec<Slot>,
    events: EventQueue,
}

impl UdpServer {
    pub fn bind(addr: SocketAddr, config: UdpServerConfig) -> io::Result<UdpServer> {
        let socket = UdpSocket::bind(addr)?;
        let slots = (0..config.max_clients)
            .map(|_| Slot {
                connector: Connector::new(config.timeout),
                ticks_since_resend: 0,
            })
            .collect();
        Ok(UdpServer {
            socket,
            config,
            slots,
            events: EventQueue::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    pub fn connector_state(&self, slot: usize) -> Option<ConnectorState> {
        self.slots.get(slot).map(|s| s.connector.state)
    }

    /// Measured round-trip time to a slot's peer (spec.md §3 "measured
    /// round-trip time"); `Duration::ZERO` until the first heartbeat
    /// completes.
    pub fn rtt(&self, slot: usize) -> Option<Duration> {
        self.slots.get(slot).map(|s| s.connector.rtt)
    }

    fn slot_for_addr(&self, addr: SocketAddr) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.connector.remote == Some(addr))
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.connector.state == ConnectorState::Idle)
    }

    /// Drive one tick: reap timeouts, accept/resend handshakes, dispatch
    /// received frames, flush acks and retransmits (spec.md §4.4).
    pub fn tick(&mut self, now: Instant) -> Result<Vec<Outgoing>, NetError> {
        self.reap_timeouts(now);

        let datagrams = recv_loop(&self.socket).map_err(NetError::Io)?;
        let mut outgoing = Vec::new();
        for (from, bytes) in datagrams {
            self.handle_datagram(from, bytes, now, &mut outgoing)?;
        }

        self.resend_handshakes(now);
        self.send_heartbeats(now)?;
        self.deliver_outgoing(&outgoing, now)?;
        self.flush_acks()?;
        self.retransmit_unacked(now)?;
        Ok(outgoing)
    }

    /// For each connected slot with no heartbeat in flight, send a stage-0
    /// PING and start its round-trip timer (spec.md §4.3 step 3, applied to
    /// UDP connectors the same way as TCP's).
    fn send_heartbeats(&mut self, now: Instant) -> Result<(), NetError> {
        for i in 0..self.slots.len() {
            if self.slots[i].connector.state == ConnectorState::Connected
                && self.slots[i].connector.heartbeat_due()
            {
                self.slots[i].connector.start_heartbeat(now);
                let body = RpcBody::new(dispatcher::builtin::PING, vec![ArgValue::I8(0)]);
                self.send_to(i, body, now)?;
            }
        }
        Ok(())
    }

    fn reap_timeouts(&mut self, now: Instant) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.connector.state != ConnectorState::Idle && slot.connector.is_timed_out(now) {
                slot.connector.expire(now);
                self.events.push(NodeEvent::ConnectionTimedOut(Some(i)));
            }
        }
    }

    fn resend_handshakes(&mut self, _now: Instant) {
        let threshold = handshake_resend_ticks(self.config.interval_ticks);
        for slot in &mut self.slots {
            if slot.connector.state != ConnectorState::Accepting {
                continue;
            }
            slot.ticks_since_resend += 1;
            if slot.ticks_since_resend >= threshold {
                slot.ticks_since_resend = 0;
                if let Some(addr) = slot.connector.remote {
                    let _ = send_frame(
                        &self.socket,
                        addr,
                        &UdpFrame::Connect {
                            passphrase: self.config.passphrase.clone(),
                        },
                    );
                }
            }
        }
    }

    fn handle_datagram(
        &mut self,
        from: SocketAddr,
        bytes: Vec<u8>,
        now: Instant,
        outgoing: &mut Vec<Outgoing>,
    ) -> Result<(), NetError> {
        let frame = match UdpFrame::decode(bytes) {
            Ok(f) => f,
            Err(_) => return Ok(()), // malformed frame: drop silently, not fatal
        };

        match frame {
            UdpFrame::Hello { passphrase } => self.handle_hello(from, passphrase, now),
            UdpFrame::Connect { .. } => {
                // CONNECT is server-to-client only; a server never accepts one.
            }
            UdpFrame::Disconnect => {
                if let Some(i) = self.slot_for_addr(from) {
                    self.slots[i].connector.disconnect(now);
                    self.events.push(NodeEvent::Disconnected(Some(i)));
                }
            }
            UdpFrame::Data { ordinal, body } => {
                self.handle_data(from, ordinal, body, now, outgoing)?;
            }
            UdpFrame::UnsafeData { ordinal, acks, body } => {
                self.handle_unsafe_data(from, ordinal, acks, body, now, outgoing)?;
            }
        }
        Ok(())
    }

    fn handle_hello(&mut self, from: SocketAddr, passphrase: String, now: Instant) {
        if passphrase != self.config.passphrase {
            let slot = self.slot_for_addr(from);
            self.events.push(NodeEvent::BadPassphrase {
                received: passphrase,
                slot,
            });
            // Reply with our own passphrase so the client's CONNECT-arm
            // check (udp.rs's handle_datagram) fires too: spec.md §8 S4
            // requires BadPassphrase "raised on both sides", not just ours.
            let _ = send_frame(
                &self.socket,
                from,
                &UdpFrame::Connect {
                    passphrase: self.config.passphrase.clone(),
                },
            );
            return;
        }
        let slot_index = match self.slot_for_addr(from).or_else(|| self.free_slot()) {
            Some(i) => i,
            None => return, // no free slot: silently ignore the join attempt
        };
        if self.slots[slot_index].connector.state == ConnectorState::Idle {
            self.slots[slot_index].connector.begin_accept(from, now);
            self.slots[slot_index].ticks_since_resend =
                handshake_resend_ticks(self.config.interval_ticks);
        }
    }

    fn handle_data(
        &mut self,
        from: SocketAddr,
        ordinal: u32,
        body: RpcBody,
        now: Instant,
        outgoing: &mut Vec<Outgoing>,
    ) -> Result<(), NetError> {
        let slot_index = match self.slot_for_addr(from) {
            Some(i) => i,
            None => return Ok(()),
        };
        let newly_connected = self.slots[slot_index].connector.state == ConnectorState::Accepting;
        if newly_connected {
            self.slots[slot_index].connector.mark_connected(now);
            self.events.push(NodeEvent::Connected(Some(slot_index)));
        }
        self.slots[slot_index].connector.touch(now);

        let admit = self.slots[slot_index].connector.admit_reliable(ordinal, body);
        if let Admit::Delivered(bodies) = admit {
            for body in bodies {
                if dispatcher::is_ping_reply(&body) {
                    self.slots[slot_index].connector.record_pong(now);
                }
                self.run_handler(Some(slot_index), &body, outgoing)?;
            }
        }
        Ok(())
    }

    fn handle_unsafe_data(
        &mut self,
        from: SocketAddr,
        ordinal: u32,
        acks: Vec<u32>,
        body: RpcBody,
        now: Instant,
        outgoing: &mut Vec<Outgoing>,
    ) -> Result<(), NetError> {
        let slot_index = match self.slot_for_addr(from) {
            Some(i) => i,
            None => return Ok(()),
        };
        self.slots[slot_index].connector.touch(now);
        for ack in acks {
            self.slots[slot_index].connector.reliable_tx.ack(ack);
        }
        if !self.slots[slot_index].connector.admit_unsafe(ordinal) {
            return Ok(());
        }
        if body.args.is_empty() && body.handler_index == 0 {
            return Ok(()); // pure ack-flush frame, nothing to dispatch
        }
        if dispatcher::is_ping_reply(&body) {
            self.slots[slot_index].connector.record_pong(now);
        }
        self.run_handler(Some(slot_index), &body, outgoing)
    }

    fn run_handler(
        &mut self,
        slot: Option<usize>,
        body: &RpcBody,
        outgoing: &mut Vec<Outgoing>,
    ) -> Result<(), NetError> {
        let latency = slot
            .map(|i| self.slots[i].connector.rtt)
            .unwrap_or(Duration::ZERO);
        let mut ctx = RpcContext::new(Role::Server, slot, latency, &[], &mut self.events, outgoing, None);
        dispatcher::dispatch(body, &mut ctx)
    }

    fn deliver_outgoing(&mut self, outgoing: &[Outgoing], now: Instant) -> Result<(), NetError> {
        for msg in outgoing {
            let Some(slot_index) = msg.target else {
                continue;
            };
            self.send_to(slot_index, msg.body.clone(), now)?;
        }
        Ok(())
    }

    /// Queue a reliable message to a specific connected slot outside the
    /// handler-dispatch flow, for application code that pushes state rather
    /// than replying to an incoming RPC (spec.md §4.7's sync waves being
    /// the prototypical case).
    pub fn send_to(&mut self, slot_index: usize, body: RpcBody, now: Instant) -> Result<(), NetError> {
        let Some(addr) = self.slots.get(slot_index).and_then(|s| s.connector.remote) else {
            return Ok(());
        };
        let ordinal = self.slots[slot_index].connector.reliable_tx.send(body.clone(), now);
        let frame = UdpFrame::Data { ordinal, body };
        send_frame(&self.socket, addr, &frame).map_err(NetError::Io)
    }

    /// Flush any ordinals queued for acknowledgement as a dedicated
    /// `UNSAFE_DATA` frame (spec.md §4.4's ack piggyback, simplified to an
    /// immediate flush rather than waiting for unrelated unreliable
    /// traffic — see DESIGN.md).
    fn flush_acks(&mut self) -> Result<(), NetError> {
        for slot in &mut self.slots {
            if !slot.connector.has_pending_acks() {
                continue;
            }
            let Some(addr) = slot.connector.remote else {
                continue;
            };
            let acks = slot.connector.drain_pending_acks();
            let ordinal = slot.connector.next_unsafe_ordinal();
            let frame = UdpFrame::UnsafeData {
                ordinal,
                acks,
                body: RpcBody::new(0, vec![]),
            };
            send_frame(&self.socket, addr, &frame).map_err(NetError::Io)?;
        }
        Ok(())
    }

    fn retransmit_unacked(&mut self, now: Instant) -> Result<(), NetError> {
        for slot in &mut self.slots {
            let Some(addr) = slot.connector.remote else {
                continue;
            };
            let due = slot.connector.reliable_tx.due_retransmits(now, slot.connector.rtt);
            for (ordinal, body) in due {
                send_frame(&self.socket, addr, &UdpFrame::Data { ordinal, body })
                    .map_err(NetError::Io)?;
            }
        }
        Ok(())
    }
}

/// Client side of a UDP session: one connector to a server.
pub struct UdpClient {
    socket: UdpSocket,
    server: SocketAddr,
    passphrase: String,
    interval_ticks: u32,
    connector: Connector,
    ticks_since_resend: u32,
    events: EventQueue,
}

impl UdpClient {
    pub fn connect(
        local: SocketAddr,
        server: SocketAddr,
        passphrase: impl Into<String>,
        interval_ticks: u32,
        timeout: Duration,
    ) -> io::Result<UdpClient> {
        let socket = UdpSocket::bind(local)?;
        let mut connector = Connector::new(timeout);
        let now = Instant::now();
        connector.begin_connect(server, now);
        Ok(UdpClient {
            socket,
            server,
            passphrase: passphrase.into(),
            interval_ticks,
            connector,
            ticks_since_resend: handshake_resend_ticks(interval_ticks),
            events: EventQueue::new(),
        })
    }

    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    pub fn state(&self) -> ConnectorState {
        self.connector.state
    }

    /// Measured round-trip time to the server (spec.md §3 "measured
    /// round-trip time"); `Duration::ZERO` until the first heartbeat
    /// completes.
    pub fn rtt(&self) -> Duration {
        self.connector.rtt
    }

    pub fn tick(&mut self, now: Instant) -> Result<Vec<Outgoing>, NetError> {
        self.tick_with_user_data(now, None)
    }

    /// Like `tick`, but threads an application user-data pointer through to
    /// every handler dispatched this call (spec.md §4.5 "Applications use
    /// this context to locate ... the sync registry"). Needed on the client
    /// side since incoming sync-wave ops are consumed by handlers, not
    /// composed by them.
    pub fn tick_with_user_data(
        &mut self,
        now: Instant,
        mut user_data: Option<&mut dyn Any>,
    ) -> Result<Vec<Outgoing>, NetError> {
        if self.connector.state != ConnectorState::Idle && self.connector.is_timed_out(now) {
            self.connector.expire(now);
            self.events.push(NodeEvent::ConnectionTimedOut(None));
        }

        let datagrams = recv_loop(&self.socket).map_err(NetError::Io)?;
        let mut outgoing = Vec::new();
        for (from, bytes) in datagrams {
            if from != self.server {
                continue;
            }
            self.handle_datagram(bytes, now, &mut outgoing, user_data.as_deref_mut())?;
        }

        if self.connector.state == ConnectorState::Connecting {
            self.ticks_since_resend += 1;
            if self.ticks_since_resend >= handshake_resend_ticks(self.interval_ticks) {
                self.ticks_since_resend = 0;
                send_frame(
                    &self.socket,
                    self.server,
                    &UdpFrame::Hello {
                        passphrase: self.passphrase.clone(),
                    },
                )
                .map_err(NetError::Io)?;
            }
        }

        if self.connector.state == ConnectorState::Connected && self.connector.heartbeat_due() {
            self.connector.start_heartbeat(now);
            outgoing.push(Outgoing {
                target: None,
                body: RpcBody::new(dispatcher::builtin::PING, vec![ArgValue::I8(0)]),
            });
        }

        for msg in &outgoing {
            let ordinal = self.connector.reliable_tx.send(msg.body.clone(), now);
            let frame = UdpFrame::Data {
                ordinal,
                body: msg.body.clone(),
            };
            send_frame(&self.socket, self.server, &frame).map_err(NetError::Io)?;
        }

        if self.connector.has_pending_acks() {
            let acks = self.connector.drain_pending_acks();
            let ordinal = self.connector.next_unsafe_ordinal();
            send_frame(
                &self.socket,
                self.server,
                &UdpFrame::UnsafeData {
                    ordinal,
                    acks,
                    body: RpcBody::new(0, vec![]),
                },
            )
            .map_err(NetError::Io)?;
        }

        let due = self.connector.reliable_tx.due_retransmits(now, self.connector.rtt);
        for (ordinal, body) in due {
            send_frame(&self.socket, self.server, &UdpFrame::Data { ordinal, body })
                .map_err(NetError::Io)?;
        }

        Ok(outgoing)
    }

    fn handle_datagram(
        &mut self,
        bytes: Vec<u8>,
        now: Instant,
        outgoing: &mut Vec<Outgoing>,
        mut user_data: Option<&mut dyn Any>,
    ) -> Result<(), NetError> {
        let frame = match UdpFrame::decode(bytes) {
            Ok(f) => f,
            Err(_) => return Ok(()),
        };
        match frame {
            UdpFrame::Connect { passphrase } => {
                if passphrase != self.passphrase {
                    self.events.push(NodeEvent::BadPassphrase {
                        received: passphrase,
                        slot: None,
                    });
                    self.connector.expire(now);
                    return Ok(());
                }
                if self.connector.state == ConnectorState::Connecting {
                    self.connector.mark_connected(now);
                    self.events.push(NodeEvent::Connected(None));
                    // The first DATA frame from the client is what confirms
                    // the session on an ACCEPTING server connector
                    // (spec.md §4.4); a stage-0 ping is as good a first
                    // reliable frame as any, and doubles as the first
                    // heartbeat round-trip measurement.
                    self.connector.start_heartbeat(now);
                    outgoing.push(Outgoing {
                        target: None,
                        body: RpcBody::new(dispatcher::builtin::PING, vec![ArgValue::I8(0)]),
                    });
                } else {
                    self.connector.touch(now);
                }
            }
            UdpFrame::Disconnect => {
                self.connector.disconnect(now);
                self.events.push(NodeEvent::Disconnected(None));
            }
            UdpFrame::Data { ordinal, body } => {
                self.connector.touch(now);
                if let Admit::Delivered(bodies) = self.connector.admit_reliable(ordinal, body) {
                    for body in bodies {
                        if dispatcher::is_ping_reply(&body) {
                            self.connector.record_pong(now);
                        }
                        let mut ctx = RpcContext::new(
                            Role::Client,
                            None,
                            self.connector.rtt,
                            &[],
                            &mut self.events,
                            outgoing,
                            user_data.as_deref_mut(),
                        );
                        dispatcher::dispatch(&body, &mut ctx)?;
                    }
                }
            }
            UdpFrame::UnsafeData { ordinal, acks, body } => {
                self.connector.touch(now);
                for ack in acks {
                    self.connector.reliable_tx.ack(ack);
                }
                if dispatcher::is_ping_reply(&body) {
                    self.connector.record_pong(now);
                }
                if self.connector.admit_unsafe(ordinal) && !(body.args.is_empty() && body.handler_index == 0) {
                    let mut ctx = RpcContext::new(
                        Role::Client,
                        None,
                        self.connector.rtt,
                        &[],
                        &mut self.events,
                        outgoing,
                        user_data.as_deref_mut(),
                    );
                    dispatcher::dispatch(&body, &mut ctx)?;
                }
            }
            UdpFrame::Hello { .. } => {}
        }
        Ok(())
    }
}
