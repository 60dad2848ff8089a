//! Master-side sync registry: sync-id allocation, the three per-tick waves,
//! and per-recipient deactivation bookkeeping (spec.md §3 "Sync Registry",
//! §4.7).
//!
//! Grounded on `t51core::registry::Registry`'s keyed-store shape (a
//! monotonic-id allocator plus a map from id to payload), generalized with
//! the recipient/deactivation/newly-connected bookkeeping spec.md §4.7
//! demands and none of which the teacher's ECS component registry needed.

use hashbrown::{HashMap, HashSet};

use crate::filter::{ControlDelegate, FilterDecision, RecipientId};

/// Opaque 64-bit identifier pairing a master to its dummies (spec.md
/// GLOSSARY). Bit 63 is reserved clear for server-assigned ids, per
/// spec.md §4.7 "monotonic 64-bit, bit 63 = 0 reserved for server-assigned"
/// — this allocator never sets it, so every id it hands out is already
/// valid for that reservation.
pub type SyncId = u64;

/// One recipient-addressed operation composed by a sync wave
/// (spec.md §4.7, §6 "Built-in handlers" regSet/regDel style messages).
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOp {
    Create {
        sync_id: SyncId,
        type_id: u32,
        full_state: Vec<u8>,
    },
    Update {
        sync_id: SyncId,
        diff_state: Vec<u8>,
    },
    Destroy {
        sync_id: SyncId,
    },
    Deactivate {
        sync_id: SyncId,
    },
    Reactivate {
        sync_id: SyncId,
        full_state: Vec<u8>,
    },
}

/// Implemented by whatever the application's `SynchronizedObject` master
/// wrapper is; the registry only ever touches masters through this narrow
/// seam (spec.md §9 "Cyclic relationships ... break with two narrow
/// interfaces").
pub trait SyncMaster {
    fn sync_id(&self) -> SyncId;
    fn type_id(&self) -> u32;
    /// Classify one recipient for the wave currently running
    /// (spec.md §4.7).
    fn filter(&mut self, recipient: RecipientId) -> FilterDecision;
    /// Full encoded state, used for `Create` and `Reactivate` ops.
    fn full_state(&self) -> Vec<u8>;
    /// Encoded diff since the last commit, used for `Update` ops. Empty
    /// means nothing changed.
    fn diff_state(&self) -> Vec<u8>;
}

struct MasterEntry {
    type_id: u32,
    deactivated: HashSet<RecipientId>,
}

/// Master-side sync registry driving the create/update/destroy waves of
/// spec.md §4.7 over one tick's `POST_UPDATE` phase.
#[derive(Default)]
pub struct SyncRegistry {
    next_sync_id: u64,
    masters: HashMap<SyncId, MasterEntry>,
    recipients: HashSet<RecipientId>,
    /// Recipients who joined since the last create wave: the next create
    /// wave sends them a synthesized create for every existing master,
    /// bypassing that master's usual filter (spec.md §4.7).
    newly_connected: HashSet<RecipientId>,
    /// Sync-ids allocated since the last create wave; cleared
    /// unconditionally after one wave runs — create/destroy waves exist
    /// only for the tick an object is created/destroyed (see DESIGN.md for
    /// the "one-shot create" judgment call this encodes).
    pending_create: HashSet<SyncId>,
}

impl SyncRegistry {
    pub fn new() -> SyncRegistry {
        SyncRegistry::default()
    }

    /// Allocate a fresh sync-id for a newly created master and register it
    /// for the next create wave (spec.md §4.7 "Allocate sync-ids").
    pub fn allocate(&mut self, type_id: u32) -> SyncId {
        let id = self.next_sync_id;
        self.next_sync_id += 1;
        self.masters.insert(
            id,
            MasterEntry {
                type_id,
                deactivated: HashSet::new(),
            },
        );
        self.pending_create.insert(id);
        id
    }

    /// Drop a master from the registry (after its destroy wave has run).
    pub fn unregister(&mut self, sync_id: SyncId) {
        self.masters.remove(&sync_id);
        self.pending_create.remove(&sync_id);
    }

    pub fn is_registered(&self, sync_id: SyncId) -> bool {
        self.masters.contains_key(&sync_id)
    }

    /// Register a new recipient: added to the known set, and flagged so
    /// the next create wave synthesizes a create for every existing master
    /// regardless of filter (spec.md §4.7).
    pub fn add_recipient(&mut self, recipient: RecipientId) {
        self.recipients.insert(recipient);
        self.newly_connected.insert(recipient);
    }

    /// Drop a recipient: clears it from every master's deactivation set so
    /// stale bookkeeping doesn't linger past a reconnect under the same id.
    pub fn remove_recipient(&mut self, recipient: RecipientId) {
        self.recipients.remove(&recipient);
        self.newly_connected.remove(&recipient);
        for entry in self.masters.values_mut() {
            entry.deactivated.remove(&recipient);
        }
    }

    pub fn recipients(&self) -> impl Iterator<Item = RecipientId> + '_ {
        self.recipients.iter().copied()
    }

    /// Run the create wave: newly-connected recipients get every live
    /// master's full state unconditionally, then masters allocated since
    /// the last wave are offered through their filter to every other
    /// recipient (spec.md §4.7).
    pub fn run_create_wave(&mut self, masters: &mut [&mut dyn SyncMaster]) -> Vec<(RecipientId, SyncOp)> {
        let mut ops = Vec::new();

        let newly: Vec<RecipientId> = self.newly_connected.drain().collect();
        for &recipient in &newly {
            for master in masters.iter_mut() {
                ops.push((
                    recipient,
                    SyncOp::Create {
                        sync_id: master.sync_id(),
                        type_id: master.type_id(),
                        full_state: master.full_state(),
                    },
                ));
            }
        }

        let pending: HashSet<SyncId> = self.pending_create.drain().collect();
        for master in masters.iter_mut() {
            let sync_id = master.sync_id();
            if !pending.contains(&sync_id) {
                continue;
            }
            let recipients: Vec<RecipientId> = self
                .recipients
                .iter()
                .copied()
                .filter(|r| !newly.contains(r))
                .collect();
            for recipient in recipients {
                match master.filter(recipient) {
                    FilterDecision::RegularSync => ops.push((
                        recipient,
                        SyncOp::Create {
                            sync_id,
                            type_id: master.type_id(),
                            full_state: master.full_state(),
                        },
                    )),
                    FilterDecision::Skip => {}
                    FilterDecision::Deactivate => {
                        if let Some(entry) = self.masters.get_mut(&sync_id) {
                            entry.deactivated.insert(recipient);
                        }
                    }
                }
            }
        }
        ops
    }

    /// Run the update wave: every live master is offered through its
    /// filter to every recipient; `DEACTIVATE`/`REGULAR_SYNC` transitions
    /// compose the matching marker exactly once (spec.md §4.7).
    pub fn run_update_wave(&mut self, masters: &mut [&mut dyn SyncMaster]) -> Vec<(RecipientId, SyncOp)> {
        let mut ops = Vec::new();
        let recipients: Vec<RecipientId> = self.recipients.iter().copied().collect();

        for master in masters.iter_mut() {
            let sync_id = master.sync_id();
            for &recipient in &recipients {
                let was_deactivated = self
                    .masters
                    .get(&sync_id)
                    .map(|e| e.deactivated.contains(&recipient))
                    .unwrap_or(false);

                match master.filter(recipient) {
                    FilterDecision::RegularSync => {
                        if was_deactivated {
                            if let Some(entry) = self.masters.get_mut(&sync_id) {
                                entry.deactivated.remove(&recipient);
                            }
                            ops.push((
                                recipient,
                                SyncOp::Reactivate {
                                    sync_id,
                                    full_state: master.full_state(),
                                },
                            ));
                        } else {
                            let diff = master.diff_state();
                            if !diff.is_empty() {
                                ops.push((recipient, SyncOp::Update { sync_id, diff_state: diff }));
                            }
                        }
                    }
                    FilterDecision::Skip => {}
                    FilterDecision::Deactivate => {
                        if !was_deactivated {
                            if let Some(entry) = self.masters.get_mut(&sync_id) {
                                entry.deactivated.insert(recipient);
                            }
                            ops.push((recipient, SyncOp::Deactivate { sync_id }));
                        }
                    }
                }
            }
        }
        ops
    }

    /// Run the destroy wave for `destroyed` sync-ids: every current
    /// recipient gets a `Destroy` op regardless of deactivation status,
    /// and the master is dropped from the registry (spec.md §4.7, §8 S2).
    pub fn run_destroy_wave(&mut self, destroyed: &[SyncId]) -> Vec<(RecipientId, SyncOp)> {
        let mut ops = Vec::new();
        for &sync_id in destroyed {
            for recipient in self.recipients.iter().copied() {
                ops.push((recipient, SyncOp::Destroy { sync_id }));
            }
            self.unregister(sync_id);
        }
        ops
    }
}
