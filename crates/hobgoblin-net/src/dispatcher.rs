//! RPC handler registry and receiver context (spec.md §4.5, §9).
//!
//! The handler table is process-wide, mutable only during
//! `index_handlers()`, and immutable from then on — spec.md §9's "populated
//! before any node is constructed; immutable thereafter" rule, implemented
//! with `OnceLock` rather than the teacher's runtime-initialized
//! `lazy_static!`/lookup table (`t51core` has no direct analogue; this
//! mirrors the init-once-then-freeze shape used by `registry.rs`'s
//! `ComponentId` assignment).

use std::any::Any;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::NetError;
use crate::events::{EventQueue, NodeEvent};
use crate::frame::{ArgValue, RpcBody};

/// Stable built-in handler indices (spec.md §6).
pub mod builtin {
    pub const PING: u16 = 0;
    pub const SET_UPDATE_NUMBER: u16 = 1;
    pub const REG_SET_INT: u16 = 2;
    pub const REG_SET_DBL: u16 = 3;
    pub const REG_SET_STR: u16 = 4;
    pub const REG_DEL_INT: u16 = 5;
    pub const REG_DEL_DBL: u16 = 6;
    pub const REG_DEL_STR: u16 = 7;
    pub const REQ_REG_SET_INT: u16 = 8;
    pub const REQ_REG_SET_DBL: u16 = 9;
    pub const REQ_REG_SET_STR: u16 = 10;
    pub const REQ_REG_DEL_INT: u16 = 11;
    pub const REQ_REG_DEL_DBL: u16 = 12;
    pub const REQ_REG_DEL_STR: u16 = 13;
    pub const REG_CLEAR_INT: u16 = 14;
    pub const REG_CLEAR_DBL: u16 = 15;
    pub const REG_CLEAR_STR: u16 = 16;
    pub const REG_CLEAR_ALL: u16 = 17;
    pub const KICK_ORDER: u16 = 18;
    pub const SET_CLIENT_INDEX: u16 = 19;

    /// Indices `[0, RESERVED)` are reserved for built-in messages
    /// (spec.md §4.5).
    pub const RESERVED: u16 = 20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// A queued reply or push composed by a handler body, addressed back to the
/// sender (`Some(slot)` on the server side) or to the server (`None` on the
/// client side).
#[derive(Clone)]
pub struct Outgoing {
    pub target: Option<usize>,
    pub body: RpcBody,
}

/// Receiver context visible to handler bodies (spec.md §4.5): the sender
/// index (server side) or `-1`/`None` (client side), the measured
/// pessimistic latency of the sender, and an application user-data slot so
/// handlers can reach the runtime and sync registry.
pub struct RpcContext<'a> {
    pub role: Role,
    pub sender_index: Option<usize>,
    pub latency: Duration,
    args: &'a [ArgValue],
    events: &'a mut EventQueue,
    outbox: &'a mut Vec<Outgoing>,
    pub user_data: Option<&'a mut dyn Any>,
}

impl<'a> RpcContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        role: Role,
        sender_index: Option<usize>,
        latency: Duration,
        args: &'a [ArgValue],
        events: &'a mut EventQueue,
        outbox: &'a mut Vec<Outgoing>,
        user_data: Option<&'a mut dyn Any>,
    ) -> RpcContext<'a> {
        RpcContext {
            role,
            sender_index,
            latency,
            args,
            events,
            outbox,
            user_data,
        }
    }

    /// Pull the `n`-th argument with type checking; `None` if the index is
    /// out of range.
    pub fn arg(&self, n: usize) -> Option<&ArgValue> {
        self.args.get(n)
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn push_event(&mut self, event: NodeEvent) {
        self.events.push(event);
    }

    /// Compose a reply addressed back to whoever sent the frame currently
    /// being handled.
    pub fn reply(&mut self, handler_index: u16, args: Vec<ArgValue>) {
        self.outbox.push(Outgoing {
            target: self.sender_index,
            body: RpcBody::new(handler_index, args),
        });
    }

    /// Compose a message to a specific client slot (server role only).
    pub fn send_to(&mut self, target: usize, handler_index: u16, args: Vec<ArgValue>) {
        self.outbox.push(Outgoing {
            target: Some(target),
            body: RpcBody::new(handler_index, args),
        });
    }
}

pub type HandlerFn = fn(&mut RpcContext) -> Result<(), NetError>;

/// True if `body` is a stage-1 PING reply, i.e. the completion of a
/// heartbeat round-trip measurement (spec.md §4.3 step 3). Transport
/// sessions check this before dispatch to feed the elapsed time into the
/// sending connector's `rtt` (spec.md §3 "measured round-trip time"),
/// since a handler body has no access to the connector that sent the
/// original ping.
pub fn is_ping_reply(body: &RpcBody) -> bool {
    body.handler_index == builtin::PING && matches!(body.args.first(), Some(ArgValue::I8(1)))
}

fn handler_ping(ctx: &mut RpcContext) -> Result<(), NetError> {
    let stage = match ctx.arg(0) {
        Some(ArgValue::I8(stage)) => *stage,
        _ => return Err(NetError::illegal("ping: missing stage arg")),
    };
    if stage == 0 {
        ctx.reply(builtin::PING, vec![ArgValue::I8(1)]);
    }
    Ok(())
}

fn handler_set_update_number(_ctx: &mut RpcContext) -> Result<(), NetError> {
    // The transport layer resets the peer's timeout clock on *every* received
    // frame (spec.md §4.4's `touch`); this handler exists only to occupy the
    // reserved slot and validate the argument shape.
    match _ctx.arg(0) {
        Some(ArgValue::U32(_)) => Ok(()),
        _ => Err(NetError::illegal("setUpdateNumber: expected u32 arg")),
    }
}

fn handler_kick_order(ctx: &mut RpcContext) -> Result<(), NetError> {
    ctx.push_event(NodeEvent::Kicked);
    Ok(())
}

fn handler_set_client_index(_ctx: &mut RpcContext) -> Result<(), NetError> {
    match _ctx.arg(0) {
        Some(ArgValue::U32(_)) => Ok(()),
        _ => Err(NetError::illegal("setClientIndex: expected u32 arg")),
    }
}

fn install_builtins(table: &mut Vec<Option<HandlerFn>>) {
    table[builtin::PING as usize] = Some(handler_ping);
    table[builtin::SET_UPDATE_NUMBER as usize] = Some(handler_set_update_number);
    table[builtin::KICK_ORDER as usize] = Some(handler_kick_order);
    table[builtin::SET_CLIENT_INDEX as usize] = Some(handler_set_client_index);
}

fn build_table(app_handlers: &[(u16, HandlerFn)]) -> Vec<Option<HandlerFn>> {
    let max_index = app_handlers
        .iter()
        .map(|(i, _)| *i)
        .max()
        .unwrap_or(0)
        .max(builtin::RESERVED - 1);
    let mut table: Vec<Option<HandlerFn>> = vec![None; max_index as usize + 1];
    install_builtins(&mut table);
    for (index, f) in app_handlers {
        table[*index as usize] = Some(*f);
    }
    table
}

static HANDLERS: OnceLock<Vec<Option<HandlerFn>>> = OnceLock::new();

/// Populate the process-wide handler table: built-ins plus `app_handlers`.
/// Must run before any `Node` is constructed (spec.md §9); calling it twice
/// is a no-op past the first call, matching the teacher's init-once
/// convention.
pub fn index_handlers(app_handlers: &[(u16, HandlerFn)]) {
    HANDLERS.get_or_init(|| build_table(app_handlers));
}

/// Look up a handler by index in the process-wide table. Falls back to a
/// builtins-only table if `index_handlers` was never explicitly called.
pub fn lookup(index: u16) -> Option<HandlerFn> {
    let table = HANDLERS.get_or_init(|| build_table(&[]));
    table.get(index as usize).copied().flatten()
}

/// Dispatch one decoded `RpcBody` against a handler table, returning
/// `IllegalMessage` for an unknown handler index (spec.md §7).
fn dispatch_in(
    table: &[Option<HandlerFn>],
    body: &RpcBody,
    ctx: &mut RpcContext,
) -> Result<(), NetError> {
    let handler = table
        .get(body.handler_index as usize)
        .copied()
        .flatten()
        .ok_or_else(|| NetError::illegal(format!("unknown handler index {}", body.handler_index)))?;
    let mut ctx = RpcContext::new(
        ctx.role,
        ctx.sender_index,
        ctx.latency,
        &body.args,
        ctx.events,
        ctx.outbox,
        ctx.user_data.take(),
    );
    handler(&mut ctx)
}

/// Dispatch against the process-wide handler table (production entry
/// point; see `dispatch_in` for the testable, table-parameterized form).
pub fn dispatch(body: &RpcBody, ctx: &mut RpcContext) -> Result<(), NetError> {
    let table = HANDLERS.get_or_init(|| build_table(&[]));
    dispatch_in(table, body, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_ctx<'a>(
        role: Role,
        args: &'a [ArgValue],
        events: &'a mut EventQueue,
        outbox: &'a mut Vec<Outgoing>,
    ) -> RpcContext<'a> {
        RpcContext::new(role, None, Duration::ZERO, args, events, outbox, None)
    }

    #[test]
    fn ping_stage_zero_composes_a_stage_one_reply() {
        let table = build_table(&[]);
        let args = [ArgValue::I8(0)];
        let mut events = EventQueue::new();
        let mut outbox = Vec::new();
        let mut ctx = empty_ctx(Role::Server, &args, &mut events, &mut outbox);
        let body = RpcBody::new(builtin::PING, vec![ArgValue::I8(0)]);
        dispatch_in(&table, &body, &mut ctx).unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].body.handler_index, builtin::PING);
        assert_eq!(outbox[0].body.args, vec![ArgValue::I8(1)]);
    }

    #[test]
    fn ping_stage_one_composes_no_reply() {
        let table = build_table(&[]);
        let args = [ArgValue::I8(1)];
        let mut events = EventQueue::new();
        let mut outbox = Vec::new();
        let mut ctx = empty_ctx(Role::Client, &args, &mut events, &mut outbox);
        let body = RpcBody::new(builtin::PING, vec![ArgValue::I8(1)]);
        dispatch_in(&table, &body, &mut ctx).unwrap();
        assert!(outbox.is_empty());
    }

    #[test]
    fn kick_order_pushes_kicked_event() {
        let table = build_table(&[]);
        let args: [ArgValue; 0] = [];
        let mut events = EventQueue::new();
        let mut outbox = Vec::new();
        let mut ctx = empty_ctx(Role::Client, &args, &mut events, &mut outbox);
        let body = RpcBody::new(builtin::KICK_ORDER, vec![]);
        dispatch_in(&table, &body, &mut ctx).unwrap();
        let drained: Vec<_> = events.drain().collect();
        assert_eq!(drained, vec![NodeEvent::Kicked]);
    }

    #[test]
    fn unknown_handler_index_is_illegal_message() {
        let table = build_table(&[]);
        let args: [ArgValue; 0] = [];
        let mut events = EventQueue::new();
        let mut outbox = Vec::new();
        let mut ctx = empty_ctx(Role::Client, &args, &mut events, &mut outbox);
        let body = RpcBody::new(9999, vec![]);
        assert!(dispatch_in(&table, &body, &mut ctx).is_err());
    }

    #[test]
    fn is_ping_reply_recognizes_stage_one_only() {
        let reply = RpcBody::new(builtin::PING, vec![ArgValue::I8(1)]);
        assert!(is_ping_reply(&reply));

        let request = RpcBody::new(builtin::PING, vec![ArgValue::I8(0)]);
        assert!(!is_ping_reply(&request));

        let other = RpcBody::new(builtin::KICK_ORDER, vec![]);
        assert!(!is_ping_reply(&other));
    }

    #[test]
    fn app_handler_registers_above_reserved_range() {
        fn custom(ctx: &mut RpcContext) -> Result<(), NetError> {
            ctx.reply(builtin::RESERVED, vec![ArgValue::Bool(true)]);
            Ok(())
        }
        let table = build_table(&[(builtin::RESERVED, custom)]);
        assert!(table[builtin::RESERVED as usize].is_some());
    }
}
