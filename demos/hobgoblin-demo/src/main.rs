//! Runnable server+client demo: one `SpempeApp` server replicates a
//! `Position` synchronized object to one `UdpClient`, exercising the full
//! Hobgoblin stack end to end (spec.md §2, §4.7).
//!
//! Grounded on `t51server`'s standalone binary shape (bind, loop, log) and
//! `gamerunner`'s config-driven startup, trimmed to a single process for
//! demonstration rather than separate server/client executables.

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use hobgoblin::sync_wire::ClientSyncState;
use hobgoblin::SpempeApp;
use hobgoblin_config::{AppConfig, RuntimeConfig, TransportConfig};
use hobgoblin_macros::Autodiff;
use hobgoblin_net::{EventQueue, NodeEvent, UdpClient};
use hobgoblin_sync::{AutodiffFields, AutodiffState, FilterDecision, RecipientId, SyncId, SyncMaster};

const POSITION_TYPE_ID: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Autodiff)]
struct Position {
    x: i32,
    y: i32,
}

/// Server-side wrapper pairing a `Position` with the sync-id/bookkeeping a
/// `SyncRegistry` wave needs (spec.md §3 "Synchronized Object").
struct PositionMaster {
    sync_id: SyncId,
    state: AutodiffState<Position>,
}

impl SyncMaster for PositionMaster {
    fn sync_id(&self) -> SyncId {
        self.sync_id
    }

    fn type_id(&self) -> u32 {
        POSITION_TYPE_ID
    }

    fn filter(&mut self, _recipient: RecipientId) -> FilterDecision {
        FilterDecision::RegularSync
    }

    fn full_state(&self) -> Vec<u8> {
        self.state.pack_full().into_bytes()
    }

    fn diff_state(&self) -> Vec<u8> {
        self.state.pack().into_bytes()
    }
}

fn drain_and_log(label: &str, log: &slog::Logger, events: &mut EventQueue) {
    for event in events.drain() {
        slog::info!(log, "event"; "side" => label, "event" => format!("{event:?}"));
    }
}

fn main() {
    let log = hobgoblin_config::logging::init().expect("logger config is always valid");

    let config = AppConfig {
        runtime: RuntimeConfig {
            tick_hz: 50,
            max_consecutive_updates: 5,
        },
        transport: TransportConfig {
            address: Some("127.0.0.1:0".into()),
            passphrase: "hobgoblin-demo".into(),
            max_clients: 4,
            timeout_ms: 5_000,
            interval_ticks: 2,
        },
    };

    let mut server = SpempeApp::new(config.clone(), log.new(slog::o!("role" => "server")))
        .expect("server binds its UDP socket");
    let server_addr: SocketAddr = server.local_addr().expect("bound socket has a local address");

    let mut client = UdpClient::connect(
        "127.0.0.1:0".parse().unwrap(),
        server_addr,
        config.transport.passphrase.clone(),
        config.transport.interval_ticks,
        config.transport.timeout(),
    )
    .expect("client binds its UDP socket");

    let mut client_state = ClientSyncState::new(2, server.dt());

    let mut master = PositionMaster {
        sync_id: server.registry_mut().allocate(POSITION_TYPE_ID),
        state: AutodiffState::new(Position { x: 0, y: 0 }),
    };

    let mut client_connected = false;
    let dt = server.dt();

    for frame in 0..60 {
        let now = Instant::now();

        client
            .tick_with_user_data(now, Some(&mut client_state))
            .expect("client tick");
        drain_and_log("client", &log, client.events_mut());
        thread::sleep(Duration::from_millis(2));

        if !client_connected {
            let connected = server
                .events_mut()
                .drain()
                .inspect(|e| slog::info!(log, "event"; "side" => "server", "event" => format!("{e:?}")))
                .any(|e| matches!(e, NodeEvent::Connected(Some(0))));
            if connected {
                server.on_client_connected(0);
                client_connected = true;
            }
        }

        if frame == 10 {
            master.state.current_mut().x = 5;
            master.state.current_mut().y = 10;
        }
        if frame == 30 {
            master.state.current_mut().x = 42;
        }

        let mut masters: [&mut dyn SyncMaster; 1] = [&mut master];
        server
            .tick(now, dt, &mut masters, &[])
            .expect("server tick");
        master.state.commit();
        drain_and_log("server", &log, server.events_mut());

        if let Some(full) = client_state.dummies.current(master.sync_id) {
            let mut observed = AutodiffState::new(Position::default());
            observed.apply_full(&mut full.clone());
            slog::debug!(log, "client observes position";
                "frame" => frame, "x" => observed.current().x, "y" => observed.current().y);
        }

        client_state.dummies.advance();
        thread::sleep(Duration::from_millis(2));
    }
}
