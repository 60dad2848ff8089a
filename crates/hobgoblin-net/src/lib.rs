//! RigelNet: reliable-over-UDP and plain-TCP transport, handshake, and
//! type-tagged RPC dispatch (spec.md §4.3-§4.5, §6).
//!
//! Grounded on `t51core::net`/`neutronium::net::endpoint`'s split between a
//! socket-facing session layer and a pure-data reliability window; see the
//! module-level docs on `udp.rs`/`tcp.rs`/`reliable.rs` for the specific
//! correspondence each module keeps.

pub mod connector;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod frame;
pub mod reliable;
pub mod stream;
pub mod tcp;
pub mod udp;

pub use connector::{Connector, ConnectorState};
pub use dispatcher::{builtin, index_handlers, HandlerFn, Outgoing, Role, RpcContext};
pub use error::NetError;
pub use events::{EventQueue, NodeEvent};
pub use frame::{ArgValue, RpcBody, RpcBodyKind, UdpFrame, UdpTypeTag};
pub use tcp::{TcpClient, TcpServer, TcpServerConfig};
pub use udp::{UdpClient, UdpServer, UdpServerConfig};
