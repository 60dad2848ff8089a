//! TCP session: fixed-slot server and single-connector client over
//! length-prefixed streams (spec.md §4.3).
//!
//! Grounded on `t51core::net::endpoint`'s listener/accept-loop/connector-pool
//! shape, adapted from UDP datagrams to a `StreamReassembler` per connector
//! since TCP gives no datagram boundaries of its own.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use crate::connector::{Connector, ConnectorState};
use crate::dispatcher::{self, Outgoing, Role, RpcContext};
use crate::error::{is_would_block, NetError};
use crate::events::{EventQueue, NodeEvent};
use crate::frame::{ArgValue, RpcBody};
use crate::stream::{frame_chunk, StreamReassembler};

const READ_CHUNK: usize = 16 * 1024;

fn read_available(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed")),
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if is_would_block(&e) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

pub struct TcpServerConfig {
    pub passphrase: String,
    pub max_clients: usize,
    pub interval_ticks: u32,
    pub timeout: Duration,
}

struct Slot {
    stream: Option<TcpStream>,
    connector: Connector,
    reassembler: StreamReassembler,
    handshake_sent: bool,
    handshake_confirmed: bool,
    pending_writes: Vec<u8>,
}

impl Slot {
    fn new(timeout: Duration) -> Slot {
        Slot {
            stream: None,
            connector: Connector::new(timeout),
            reassembler: StreamReassembler::new(),
            handshake_sent: false,
            handshake_confirmed: false,
            pending_writes: Vec::new(),
        }
    }

    fn clear(&mut self, now: Instant) {
        self.stream = None;
        self.connector.reset(now);
        self.reassembler = StreamReassembler::new();
        self.handshake_sent = false;
        self.handshake_confirmed = false;
        self.pending_writes.clear();
    }
}

/// Server side of a TCP session: a listening socket plus `N` fixed-slot
/// connectors (spec.md §4.3 "allocates N fixed-slot connectors").
pub struct TcpServer {
    listener: TcpListener,
    config: TcpServerConfig,
    slots: Vec<Slot>,
    events: EventQueue,
}

impl TcpServer {
    pub fn bind(addr: SocketAddr, config: TcpServerConfig) -> io::Result<TcpServer> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let slots = (0..config.max_clients).map(|_| Slot::new(config.timeout)).collect();
        Ok(TcpServer {
            listener,
            config,
            slots,
            events: EventQueue::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    pub fn connector_state(&self, slot: usize) -> Option<ConnectorState> {
        self.slots.get(slot).map(|s| s.connector.state)
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.stream.is_none())
    }

    /// Drive one tick: reap timeouts, accept new connections, exchange
    /// handshakes, read/dispatch frames, write queued replies
    /// (spec.md §4.3).
    pub fn tick(&mut self, now: Instant) -> Result<Vec<Outgoing>, NetError> {
        self.reap_timeouts(now);
        self.accept_pending(now)?;

        let mut outgoing = Vec::new();
        for i in 0..self.slots.len() {
            self.service_slot(i, now, &mut outgoing)?;
        }
        Ok(outgoing)
    }

    fn reap_timeouts(&mut self, now: Instant) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.stream.is_some() && slot.connector.is_timed_out(now) {
                slot.clear(now);
                self.events.push(NodeEvent::ConnectionTimedOut(Some(i)));
            }
        }
    }

    fn accept_pending(&mut self, now: Instant) -> Result<(), NetError> {
        loop {
            match self.listener.accept() {
                Ok((stream, remote)) => {
                    let Some(i) = self.free_slot() else {
                        continue; // no room: drop the accepted stream
                    };
                    stream.set_nonblocking(true).map_err(NetError::Io)?;
                    let slot = &mut self.slots[i];
                    slot.clear(now);
                    slot.stream = Some(stream);
                    slot.connector.begin_accept(remote, now);
                }
                Err(e) if is_would_block(&e) => return Ok(()),
                Err(_) => return Ok(()), // transient accept error: try again next tick
            }
        }
    }

    fn service_slot(
        &mut self,
        i: usize,
        now: Instant,
        outgoing: &mut Vec<Outgoing>,
    ) -> Result<(), NetError> {
        if self.slots[i].stream.is_none() {
            return Ok(());
        }

        if !self.slots[i].handshake_sent {
            let frame = frame_chunk(self.config.passphrase.as_bytes());
            self.slots[i].pending_writes.extend(frame);
            self.slots[i].handshake_sent = true;
        }

        let read = {
            let stream = self.slots[i].stream.as_mut().expect("checked above");
            read_available(stream)
        };
        let bytes = match read {
            Ok(b) => b,
            Err(_) => {
                self.slots[i].clear(now);
                self.events.push(NodeEvent::Disconnected(Some(i)));
                return Ok(());
            }
        };
        if !bytes.is_empty() {
            self.slots[i].connector.touch(now);
            self.slots[i].reassembler.feed(&bytes);
        }

        while let Some(chunk) = self.slots[i].reassembler.pop_chunk() {
            if !self.slots[i].handshake_confirmed {
                let received = String::from_utf8_lossy(&chunk).into_owned();
                if received != self.config.passphrase {
                    self.events.push(NodeEvent::BadPassphrase {
                        received,
                        slot: Some(i),
                    });
                    self.slots[i].clear(now);
                    break;
                }
                self.slots[i].handshake_confirmed = true;
                self.slots[i].connector.mark_connected(now);
                self.events.push(NodeEvent::Connected(Some(i)));
                self.slots[i].pending_writes.extend(frame_chunk(
                    RpcBody::new(dispatcher::builtin::SET_CLIENT_INDEX, vec![ArgValue::U32(i as u32)])
                        .encode()
                        .into_bytes()
                        .as_slice(),
                ));
                continue;
            }
            let body = match RpcBody::decode(chunk) {
                Ok(b) => b,
                Err(_) => continue, // malformed frame: drop silently
            };
            if dispatcher::is_ping_reply(&body) {
                self.slots[i].connector.record_pong(now);
            }
            let latency = self.slots[i].connector.rtt;
            let mut ctx = RpcContext::new(Role::Server, Some(i), latency, &body.args, &mut self.events, outgoing, None);
            dispatcher::dispatch(&body, &mut ctx)?;
        }

        if self.slots[i].connector.state == ConnectorState::Connected && self.slots[i].connector.heartbeat_due() {
            self.slots[i].connector.start_heartbeat(now);
            let body = RpcBody::new(dispatcher::builtin::PING, vec![ArgValue::I8(0)]);
            self.slots[i]
                .pending_writes
                .extend(frame_chunk(body.encode().into_bytes().as_slice()));
        }

        self.flush_writes(i)?;
        Ok(())
    }

    fn flush_writes(&mut self, i: usize) -> Result<(), NetError> {
        if self.slots[i].pending_writes.is_empty() {
            return Ok(());
        }
        let Some(stream) = self.slots[i].stream.as_mut() else {
            return Ok(());
        };
        let pending = std::mem::take(&mut self.slots[i].pending_writes);
        match stream.write_all(&pending) {
            Ok(()) => Ok(()),
            Err(e) if is_would_block(&e) => {
                self.slots[i].pending_writes = pending;
                Ok(())
            }
            Err(e) => Err(NetError::Io(e)),
        }
    }

    /// Route composed replies/pushes onto their target slot's write queue,
    /// to be flushed on the next tick.
    pub fn queue_outgoing(&mut self, outgoing: Vec<Outgoing>) {
        for msg in outgoing {
            let Some(i) = msg.target else { continue };
            if let Some(slot) = self.slots.get_mut(i) {
                slot.pending_writes.extend(frame_chunk(msg.body.encode().into_bytes().as_slice()));
            }
        }
    }
}

/// Client side of a TCP session: symmetric, one connector
/// (spec.md §4.3 "Client lifecycle. Symmetric, one connector").
pub struct TcpClient {
    stream: TcpStream,
    passphrase: String,
    connector: Connector,
    reassembler: StreamReassembler,
    passphrase_sent: bool,
    handshake_confirmed: bool,
    pending_writes: Vec<u8>,
    events: EventQueue,
}

impl TcpClient {
    pub fn connect(server: SocketAddr, passphrase: impl Into<String>, timeout: Duration) -> io::Result<TcpClient> {
        let stream = TcpStream::connect(server)?;
        stream.set_nonblocking(true)?;
        let mut connector = Connector::new(timeout);
        let now = Instant::now();
        connector.begin_connect(server, now);
        Ok(TcpClient {
            stream,
            passphrase: passphrase.into(),
            connector,
            reassembler: StreamReassembler::new(),
            passphrase_sent: false,
            handshake_confirmed: false,
            pending_writes: Vec::new(),
            events: EventQueue::new(),
        })
    }

    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    pub fn state(&self) -> ConnectorState {
        self.connector.state
    }

    /// Initial receive MUST consume a passphrase; mismatch raises
    /// `BadPassphrase` and disconnects (spec.md §4.3).
    pub fn tick(&mut self, now: Instant) -> Result<Vec<Outgoing>, NetError> {
        let mut outgoing = Vec::new();
        if self.connector.state != ConnectorState::Idle && self.connector.is_timed_out(now) {
            self.connector.expire(now);
            self.events.push(NodeEvent::ConnectionTimedOut(None));
            return Ok(outgoing);
        }

        match read_available(&mut self.stream) {
            Ok(bytes) => {
                if !bytes.is_empty() {
                    self.connector.touch(now);
                    self.reassembler.feed(&bytes);
                }
            }
            Err(_) => {
                self.connector.disconnect(now);
                self.events.push(NodeEvent::Disconnected(None));
                return Ok(outgoing);
            }
        }

        while let Some(chunk) = self.reassembler.pop_chunk() {
            if !self.handshake_confirmed {
                let received = String::from_utf8_lossy(&chunk).into_owned();
                if received != self.passphrase {
                    self.events.push(NodeEvent::BadPassphrase { received, slot: None });
                    self.connector.disconnect(now);
                    break;
                }
                self.handshake_confirmed = true;
                self.connector.mark_connected(now);
                self.events.push(NodeEvent::Connected(None));
                if !self.passphrase_sent {
                    self.pending_writes.extend(frame_chunk(self.passphrase.as_bytes()));
                    self.passphrase_sent = true;
                }
                continue;
            }
            let body = match RpcBody::decode(chunk) {
                Ok(b) => b,
                Err(_) => continue,
            };
            if dispatcher::is_ping_reply(&body) {
                self.connector.record_pong(now);
            }
            let mut ctx = RpcContext::new(
                Role::Client,
                None,
                self.connector.rtt,
                &body.args,
                &mut self.events,
                &mut outgoing,
                None,
            );
            dispatcher::dispatch(&body, &mut ctx)?;
        }

        if self.connector.state == ConnectorState::Connected && self.connector.heartbeat_due() {
            self.connector.start_heartbeat(now);
            let ping = RpcBody::new(dispatcher::builtin::PING, vec![ArgValue::I8(0)]);
            self.pending_writes.extend(frame_chunk(ping.encode().into_bytes().as_slice()));
        }

        for msg in &outgoing {
            self.pending_writes.extend(frame_chunk(msg.body.encode().into_bytes().as_slice()));
        }
        self.flush_writes()?;
        Ok(outgoing)
    }

    fn flush_writes(&mut self) -> Result<(), NetError> {
        if self.pending_writes.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending_writes);
        match self.stream.write_all(&pending) {
            Ok(()) => Ok(()),
            Err(e) if is_would_block(&e) => {
                self.pending_writes = pending;
                Ok(())
            }
            Err(e) => Err(NetError::Io(e)),
        }
    }
}
