//! Autodiff state: a value object carrying a "mirror" snapshot so only
//! fields changed since the last `commit()` go over the wire (spec.md §3
//! "Autodiff state", §4.8).
//!
//! `AutodiffFields` is implemented per-struct by `#[derive(Autodiff)]` in
//! `hobgoblin-macros`; `AutodiffState<T>` is the generic wrapper
//! `SynchronizedObject` masters/dummies actually hold, pairing a `T` with
//! its mirror the way spec.md §3 describes (mirror lives "inside the
//! object", here made an explicit field rather than a hidden shadow copy,
//! since Rust has no macro-injected private fields on a foreign struct).

use hobgoblin_codec::Packet;

/// Implemented by `#[derive(Autodiff)]` for a plain value struct whose
/// fields are all `hobgoblin_codec::WireValue` + `PartialEq` + `Copy`
/// (spec.md §4.8: "a value-type T declares fields via a set of macros").
pub trait AutodiffFields: Clone {
    /// Write a bitmask of fields that differ between `self` and `mirror`,
    /// followed by only those fields' encoded values, in declaration order
    /// (spec.md §4.8 "pack function").
    fn pack_diff(&self, mirror: &Self, out: &mut Packet);

    /// Read a bitmask and apply only the present fields to `self`, leaving
    /// the rest untouched (spec.md §4.8 "unpack function").
    fn unpack_diff(&mut self, input: &mut Packet);

    /// Write every field unconditionally, in declaration order, no mask
    /// (spec.md §4.7 "reactivate+full state": all fields present regardless
    /// of whether they happen to match some baseline value).
    fn pack_all(&self, out: &mut Packet);

    /// Read every field unconditionally, in declaration order.
    fn unpack_all(&mut self, input: &mut Packet);
}

/// A value with a mirror snapshot: `commit()` folds `current` into
/// `mirror`; `pack()`/`apply()` move only the changed fields across the
/// wire (spec.md §3 "Autodiff state").
#[derive(Debug, Clone)]
pub struct AutodiffState<T> {
    current: T,
    mirror: T,
}

impl<T: AutodiffFields> AutodiffState<T> {
    pub fn new(initial: T) -> AutodiffState<T> {
        AutodiffState {
            mirror: initial.clone(),
            current: initial,
        }
    }

    pub fn current(&self) -> &T {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut T {
        &mut self.current
    }

    /// Overwrite the mirror with the current value (spec.md §4.8
    /// "the master commits at end of tick").
    pub fn commit(&mut self) {
        self.mirror = self.current.clone();
    }

    /// True iff any field differs between `current` and the last commit —
    /// used by sync masters to decide whether an update wave has anything
    /// new to send.
    pub fn dirty(&self) -> bool {
        let mut probe = Packet::new();
        self.current.pack_diff(&self.mirror, &mut probe);
        !probe.is_empty()
    }

    /// Pack the diff between `current` and `mirror` into a fresh packet
    /// (spec.md §4.8 "the sync update packs the diff").
    pub fn pack(&self) -> Packet {
        let mut out = Packet::new();
        self.current.pack_diff(&self.mirror, &mut out);
        out
    }

    /// Apply a received diff to `current`, leaving untouched fields as-is
    /// and the mirror unaffected (spec.md §3 "on extraction, only present
    /// fields are assigned, others preserved").
    pub fn apply(&mut self, diff: &mut Packet) {
        self.current.unpack_diff(diff);
    }

    /// Encode the full current value (every field present, no mask), used
    /// for the create wave and for reactivation-after-deactivate
    /// (spec.md §4.7 "reactivate+full state").
    pub fn pack_full(&self) -> Packet {
        let mut out = Packet::new();
        self.current.pack_all(&mut out);
        out
    }

    /// Apply a received full-state snapshot to `current`, and re-baseline
    /// the mirror to match it so the next diff is computed against the
    /// just-applied state rather than whatever was there before
    /// (spec.md §4.7: reactivation replaces, it doesn't merge).
    pub fn apply_full(&mut self, full: &mut Packet) {
        self.current.unpack_all(full);
        self.mirror = self.current.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Position {
        x: i32,
        y: i32,
        label: u8,
    }

    impl AutodiffFields for Position {
        fn pack_diff(&self, mirror: &Self, out: &mut Packet) {
            let mut mask = 0u8;
            if self.x != mirror.x {
                mask |= 1 << 0;
            }
            if self.y != mirror.y {
                mask |= 1 << 1;
            }
            if self.label != mirror.label {
                mask |= 1 << 2;
            }
            if mask == 0 {
                return;
            }
            out.append(mask);
            if mask & (1 << 0) != 0 {
                out.append(self.x);
            }
            if mask & (1 << 1) != 0 {
                out.append(self.y);
            }
            if mask & (1 << 2) != 0 {
                out.append(self.label);
            }
        }

        fn unpack_diff(&mut self, input: &mut Packet) {
            let mask: u8 = input.extract();
            if mask & (1 << 0) != 0 {
                self.x = input.extract();
            }
            if mask & (1 << 1) != 0 {
                self.y = input.extract();
            }
            if mask & (1 << 2) != 0 {
                self.label = input.extract();
            }
        }

        fn pack_all(&self, out: &mut Packet) {
            out.append(self.x);
            out.append(self.y);
            out.append(self.label);
        }

        fn unpack_all(&mut self, input: &mut Packet) {
            self.x = input.extract();
            self.y = input.extract();
            self.label = input.extract();
        }
    }

    #[test]
    fn commit_then_mutate_one_field_packs_only_that_field() {
        let mut state = AutodiffState::new(Position { x: 1, y: 2, label: 9 });
        state.commit();
        state.current_mut().x = 5;

        assert!(state.dirty());
        let mut packed = state.pack();
        let mask: u8 = packed.extract();
        assert_eq!(mask, 0b001);
        assert_eq!(packed.extract::<i32>(), 5);
    }

    #[test]
    fn apply_to_a_clone_reproduces_post_mutation_state_leaving_other_fields_alone() {
        let mut master = AutodiffState::new(Position { x: 1, y: 2, label: 9 });
        master.commit();
        master.current_mut().y = 42;

        let mut packed = master.pack();

        let mut dummy_clone = Position { x: 1, y: 2, label: 9 };
        dummy_clone.unpack_diff(&mut packed);

        assert_eq!(dummy_clone, Position { x: 1, y: 42, label: 9 });
    }

    #[test]
    fn clean_state_packs_an_empty_diff() {
        let state = AutodiffState::new(Position { x: 0, y: 0, label: 0 });
        assert!(!state.dirty());
        let packed = state.pack();
        assert!(packed.is_empty());
    }

    #[test]
    fn full_state_includes_every_field_even_when_it_matches_the_zero_value() {
        let state = AutodiffState::new(Position { x: 0, y: 0, label: 0 });
        let mut packed = state.pack_full();
        assert_eq!(packed.extract::<i32>(), 0);
        assert_eq!(packed.extract::<i32>(), 0);
        assert_eq!(packed.extract::<u8>(), 0);
    }

    #[test]
    fn apply_full_replaces_current_and_rebaselines_the_mirror() {
        let mut dummy = AutodiffState::new(Position { x: 1, y: 2, label: 9 });
        let mut full = Packet::new();
        Position { x: 7, y: 8, label: 3 }.pack_all(&mut full);

        dummy.apply_full(&mut full);
        assert_eq!(*dummy.current(), Position { x: 7, y: 8, label: 3 });
        assert!(!dummy.dirty());
    }
}
