//! Wire encoding for sync-registry waves and the dummy-side RPC handlers
//! that consume them (spec.md §4.7, §6 "Built-in handlers").
//!
//! The built-in handler table (`hobgoblin_net::dispatcher::builtin`)
//! reserves indices `[0, RESERVED)` for RigelNet's own key/value registry
//! messages (`REG_SET_INT` and friends) — a different, older mechanism
//! than the per-object sync registry this crate adds. Sync-wave ops
//! therefore register their own handlers starting at `RESERVED`, the way
//! spec.md §4.5 expects application handlers to.

use std::any::Any;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use hobgoblin_codec::Packet;
use hobgoblin_net::dispatcher::builtin;
use hobgoblin_net::{ArgValue, HandlerFn, NetError, RpcContext};
use hobgoblin_sync::{AutodiffFields, DummyRegistry, SyncId, SyncOp};

pub const SYNC_CREATE: u16 = builtin::RESERVED;
pub const SYNC_UPDATE: u16 = builtin::RESERVED + 1;
pub const SYNC_DESTROY: u16 = builtin::RESERVED + 2;
pub const SYNC_DEACTIVATE: u16 = builtin::RESERVED + 3;
pub const SYNC_REACTIVATE: u16 = builtin::RESERVED + 4;

/// Every sync-wave handler registers on this list (spec.md §9
/// "populated before any node is constructed").
pub const HANDLERS: &[(u16, HandlerFn)] = &[
    (SYNC_CREATE, handler_sync_create),
    (SYNC_UPDATE, handler_sync_update),
    (SYNC_DESTROY, handler_sync_destroy),
    (SYNC_DEACTIVATE, handler_sync_deactivate),
    (SYNC_REACTIVATE, handler_sync_reactivate),
];

/// Convert one recipient-addressed `SyncOp` into an RPC body, for the
/// master side to hand to `hobgoblin_net`'s outbox.
pub fn encode(op: &SyncOp) -> (u16, Vec<ArgValue>) {
    match op {
        SyncOp::Create {
            sync_id,
            type_id,
            full_state,
        } => (
            SYNC_CREATE,
            vec![
                ArgValue::U64(*sync_id),
                ArgValue::U32(*type_id),
                ArgValue::Packet(Packet::from_bytes(full_state.clone())),
            ],
        ),
        SyncOp::Update { sync_id, diff_state } => (
            SYNC_UPDATE,
            vec![ArgValue::U64(*sync_id), ArgValue::Packet(Packet::from_bytes(diff_state.clone()))],
        ),
        SyncOp::Destroy { sync_id } => (SYNC_DESTROY, vec![ArgValue::U64(*sync_id)]),
        SyncOp::Deactivate { sync_id } => (SYNC_DEACTIVATE, vec![ArgValue::U64(*sync_id)]),
        SyncOp::Reactivate { sync_id, full_state } => (
            SYNC_REACTIVATE,
            vec![ArgValue::U64(*sync_id), ArgValue::Packet(Packet::from_bytes(full_state.clone()))],
        ),
    }
}

/// Convert a measured round-trip latency into a delay-buffer offset in
/// ticks, rounding up so a dummy never surfaces a state before the real
/// peer could plausibly have reached it (spec.md §4.6 "the buffering depth
/// ... typically 0-4 ticks").
pub fn latency_to_ticks(latency: Duration, dt: Duration) -> usize {
    if dt.is_zero() {
        return 0;
    }
    let ticks = latency.as_secs_f64() / dt.as_secs_f64();
    ticks.ceil() as usize
}

/// A per-type function able to fold an incoming diff packet onto the last
/// reconstructed full state, producing the next full state. Registered once
/// per synchronized-object type, the way `handler_sync_update` itself is
/// registered once per RPC index (spec.md §4.8: updates carry only changed
/// fields, so the dummy side needs the type's own unpack logic to fold them
/// back into a complete value before it can be scheduled or displayed).
pub type MergeFn = fn(&Packet, &Packet) -> Packet;

static MERGE_FNS: OnceLock<HashMap<u32, MergeFn>> = OnceLock::new();

/// Populate the process-wide type_id -> merge-fn table. Must run before any
/// `SpempeApp`/`UdpClient` starts processing sync traffic, mirroring
/// `hobgoblin_net::index_handlers`'s one-shot, process-wide initialization.
pub fn index_merge_fns(fns: &[(u32, MergeFn)]) {
    MERGE_FNS.get_or_init(|| fns.iter().copied().collect());
}

fn merge_fn_for(type_id: u32) -> Option<MergeFn> {
    MERGE_FNS.get().and_then(|table| table.get(&type_id)).copied()
}

/// Build a [`MergeFn`] for a concrete synchronized-object type: decode the
/// base packet with `unpack_all`, fold the diff with `unpack_diff`, then
/// re-encode the result with `pack_all` (spec.md §4.8). Monomorphizing this
/// per `T` and taking the resulting function pointer is how one generic
/// implementation serves every type_id's entry in `MERGE_FNS`.
pub fn merge_fn<T: AutodiffFields + Default>(base: &Packet, diff: &Packet) -> Packet {
    let mut value = T::default();
    value.unpack_all(&mut base.clone());
    value.unpack_diff(&mut diff.clone());
    let mut out = Packet::new();
    value.pack_all(&mut out);
    out
}

/// Client-side application state reached through `RpcContext::user_data`
/// (spec.md §4.5 "Applications use this context to locate ... the sync
/// registry"). Tracks, per sync-id, both the presentation delay buffer and
/// the last reconstructed full state (`bases`) that incoming update diffs
/// fold onto.
pub struct ClientSyncState {
    pub dummies: DummyRegistry<Packet>,
    bases: HashMap<SyncId, (u32, Packet)>,
    pub dt: Duration,
}

impl ClientSyncState {
    pub fn new(default_len: usize, dt: Duration) -> ClientSyncState {
        ClientSyncState {
            dummies: DummyRegistry::new(default_len),
            bases: HashMap::new(),
            dt,
        }
    }
}

fn state_mut<'a, 'b>(ctx: &'a mut RpcContext<'b>) -> Result<&'a mut ClientSyncState, NetError> {
    ctx.user_data
        .as_deref_mut()
        .and_then(|ud| ud.downcast_mut::<ClientSyncState>())
        .ok_or_else(|| NetError::illegal("sync handler invoked without ClientSyncState user-data"))
}

fn require_u64(ctx: &RpcContext, n: usize) -> Result<u64, NetError> {
    match ctx.arg(n) {
        Some(ArgValue::U64(v)) => Ok(*v),
        _ => Err(NetError::illegal("expected u64 sync-id argument")),
    }
}

fn require_packet(ctx: &RpcContext, n: usize) -> Result<Packet, NetError> {
    match ctx.arg(n) {
        Some(ArgValue::Packet(p)) => Ok(p.clone()),
        _ => Err(NetError::illegal("expected packet state argument")),
    }
}

fn require_u32(ctx: &RpcContext, n: usize) -> Result<u32, NetError> {
    match ctx.arg(n) {
        Some(ArgValue::U32(v)) => Ok(*v),
        _ => Err(NetError::illegal("expected u32 type-id argument")),
    }
}

fn handler_sync_create(ctx: &mut RpcContext) -> Result<(), NetError> {
    let sync_id = require_u64(ctx, 0)?;
    let type_id = require_u32(ctx, 1)?;
    let state = require_packet(ctx, 2)?;
    let latency = ctx.latency;
    let state_holder = state_mut(ctx)?;
    let delay = latency_to_ticks(latency, state_holder.dt);
    state_holder.bases.insert(sync_id, (type_id, state.clone()));
    state_holder.dummies.on_create(sync_id, state, delay);
    Ok(())
}

fn handler_sync_update(ctx: &mut RpcContext) -> Result<(), NetError> {
    let sync_id = require_u64(ctx, 0)?;
    let diff = require_packet(ctx, 1)?;
    let latency = ctx.latency;
    let state_holder = state_mut(ctx)?;
    let delay = latency_to_ticks(latency, state_holder.dt);
    let Some((type_id, base)) = state_holder.bases.get(&sync_id).cloned() else {
        return Ok(());
    };
    let merge = merge_fn_for(type_id)
        .ok_or_else(|| NetError::illegal("no merge function registered for sync object type"))?;
    let merged = merge(&base, &diff);
    state_holder.bases.insert(sync_id, (type_id, merged.clone()));
    state_holder.dummies.on_update(sync_id, merged, delay);
    Ok(())
}

fn handler_sync_destroy(ctx: &mut RpcContext) -> Result<(), NetError> {
    let sync_id = require_u64(ctx, 0)?;
    let latency = ctx.latency;
    let state_holder = state_mut(ctx)?;
    let delay = latency_to_ticks(latency, state_holder.dt) as u64;
    let at_tick = state_holder.dummies.current_tick() + delay;
    state_holder.bases.remove(&sync_id);
    state_holder.dummies.on_destroy(sync_id, at_tick);
    Ok(())
}

fn handler_sync_deactivate(ctx: &mut RpcContext) -> Result<(), NetError> {
    let sync_id = require_u64(ctx, 0)?;
    let state_holder = state_mut(ctx)?;
    state_holder.dummies.on_deactivate(sync_id);
    Ok(())
}

fn handler_sync_reactivate(ctx: &mut RpcContext) -> Result<(), NetError> {
    let sync_id = require_u64(ctx, 0)?;
    let state = require_packet(ctx, 1)?;
    let latency = ctx.latency;
    let state_holder = state_mut(ctx)?;
    let delay = latency_to_ticks(latency, state_holder.dt);
    if let Some(entry) = state_holder.bases.get_mut(&sync_id) {
        entry.1 = state.clone();
    }
    state_holder.dummies.on_reactivate(sync_id, state, delay);
    Ok(())
}
