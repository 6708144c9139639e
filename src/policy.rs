//! Coherence policies: how secondaries reference primary records and how
//! relocations are absorbed.
//!
//! Four orthogonal traits drive the built-in policies:
//!
//! | policy                    | invalidates | stores | translation | tombstones |
//! |---------------------------|-------------|--------|-------------|------------|
//! | [`StableNode`]            | no          | pos    | no          | no         |
//! | [`KeyLookup`]             | no          | key    | no          | no         |
//! | [`UpdatePointer`]         | yes         | pos    | no          | no         |
//! | [`UpdatePointerTombstones`]| yes        | pos    | no          | yes        |
//! | [`TranslationArray`]      | yes         | ordinal| yes         | no         |
//! | [`TranslationArrayTombstones`]| yes     | ordinal| yes         | yes        |
//!
//! Position-storing policies are patched entry-by-entry when a record
//! relocates; translation policies patch one array slot instead and pay an
//! extra indirection on every handle resolution. Key-storing policies pay
//! a primary lookup on every secondary access and require a unique
//! primary.

use crate::index_map::RefValue;
use crate::live::{LiveCount, NoCount, PlainCount};
use crate::record::{DeadFlag, DeadOrdinal, NoMeta, OrdinalSlot, RecordMeta};
use crate::store::{DensePos, DenseStore, SlotStore, Store};
use core::fmt;
use core::hash::Hash;
use core::marker::PhantomData;
use slotmap::DefaultKey;

/// Storage position type of a policy's store.
pub type PosOf<Pol, K, P> =
    <<Pol as Policy<K, P>>::Store as Store<K, P, <Pol as Policy<K, P>>::Meta>>::Pos;

/// Strategy deciding the store kind, the handle representation, and the
/// value secondaries keep for each record.
///
/// Only translation policies carry state (the ordinal array); everything
/// that walks index maps lives in the engine, which calls back in here
/// for the state-only parts.
pub trait Policy<K, P>: Default {
    /// Store positions move under mutation.
    const INVALIDATES: bool;
    /// Secondaries store positions directly.
    const STORES_HANDLE: bool;
    /// An ordinal array indirects secondary references.
    const NEEDS_TRANSLATION: bool;
    /// Erase marks records dead instead of removing them.
    const USES_TOMBSTONES: bool;
    /// Secondaries store primary keys, so keys must be unique.
    const REQUIRES_UNIQUE_PRIMARY: bool;

    type Meta: RecordMeta;
    type Store: Store<K, P, Self::Meta>;
    /// Raw handle representation.
    type Raw: Copy + Eq + Hash + fmt::Debug;
    /// Value stored per record in every secondary.
    type SecRef: RefValue;
    type Live: LiveCount;

    /// Position a handle currently refers to, if it still resolves.
    fn handle_pos(&self, raw: Self::Raw) -> Option<PosOf<Self, K, P>>;

    /// Handle representation for the record at `pos`.
    fn make_raw(&self, pos: PosOf<Self, K, P>, meta: &Self::Meta) -> Self::Raw;

    /// Value to store in secondaries for the record at `pos`.
    fn sec_ref(&self, pos: PosOf<Self, K, P>, key: &K, meta: &Self::Meta) -> Self::SecRef;

    /// Resolve a stored secondary value back to a raw handle. `lookup`
    /// performs a primary-key lookup for key-storing policies.
    fn resolve_secref(
        &self,
        stored: &Self::SecRef,
        lookup: impl FnOnce(&K) -> Option<PosOf<Self, K, P>>,
    ) -> Option<Self::Raw>;

    /// A record was inserted at `pos`. Returns the ordinal to stamp into
    /// its metadata when a translation slot was appended.
    fn on_insert(&mut self, _pos: PosOf<Self, K, P>) -> Option<usize> {
        None
    }

    /// The insertion that just called [`Policy::on_insert`] failed.
    fn on_insert_fail(&mut self) {}

    /// The record owning `ordinal` moved to `to`.
    fn on_relocate(&mut self, _ordinal: usize, _to: PosOf<Self, K, P>) {}

    /// The record owning `ordinal` was physically removed. Swap-removes
    /// the translation slot; returns the old ordinal and position of the
    /// record whose ordinal must be re-stamped, if one was swapped.
    fn on_physical_remove(&mut self, _ordinal: usize) -> Option<(usize, PosOf<Self, K, P>)> {
        None
    }

    fn on_clear(&mut self) {}
    fn reserve(&mut self, _additional: usize) {}

    /// Translation array length, for policies that keep one.
    fn translation_len(&self) -> Option<usize> {
        None
    }
}

/// Policies that accumulate removable state: tombstoned records or a
/// translation array. Gates [`compact`](crate::MultiIndex::compact).
pub trait Compactable {}

/// Ordinal into a translation array; the handle representation of the
/// translation policies.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Ordinal(pub(crate) usize);

/// Node-stable primary; secondaries store positions directly.
#[derive(Default, Debug, Clone, Copy)]
pub struct StableNode;

impl<K, P> Policy<K, P> for StableNode {
    const INVALIDATES: bool = false;
    const STORES_HANDLE: bool = true;
    const NEEDS_TRANSLATION: bool = false;
    const USES_TOMBSTONES: bool = false;
    const REQUIRES_UNIQUE_PRIMARY: bool = false;

    type Meta = NoMeta;
    type Store = SlotStore<K, P, NoMeta>;
    type Raw = DefaultKey;
    type SecRef = DefaultKey;
    type Live = NoCount;

    fn handle_pos(&self, raw: DefaultKey) -> Option<DefaultKey> {
        Some(raw)
    }

    fn make_raw(&self, pos: DefaultKey, _meta: &NoMeta) -> DefaultKey {
        pos
    }

    fn sec_ref(&self, pos: DefaultKey, _key: &K, _meta: &NoMeta) -> DefaultKey {
        pos
    }

    fn resolve_secref(
        &self,
        stored: &DefaultKey,
        _lookup: impl FnOnce(&K) -> Option<DefaultKey>,
    ) -> Option<DefaultKey> {
        Some(*stored)
    }
}

/// Node-stable primary; secondaries store primary keys and every
/// secondary access performs a primary lookup. Requires a unique primary.
#[derive(Default, Debug, Clone, Copy)]
pub struct KeyLookup;

impl<K: RefValue, P> Policy<K, P> for KeyLookup {
    const INVALIDATES: bool = false;
    const STORES_HANDLE: bool = false;
    const NEEDS_TRANSLATION: bool = false;
    const USES_TOMBSTONES: bool = false;
    const REQUIRES_UNIQUE_PRIMARY: bool = true;

    type Meta = NoMeta;
    type Store = SlotStore<K, P, NoMeta>;
    type Raw = DefaultKey;
    type SecRef = K;
    type Live = NoCount;

    fn handle_pos(&self, raw: DefaultKey) -> Option<DefaultKey> {
        Some(raw)
    }

    fn make_raw(&self, pos: DefaultKey, _meta: &NoMeta) -> DefaultKey {
        pos
    }

    fn sec_ref(&self, _pos: DefaultKey, key: &K, _meta: &NoMeta) -> K {
        key.clone()
    }

    fn resolve_secref(
        &self,
        stored: &K,
        lookup: impl FnOnce(&K) -> Option<DefaultKey>,
    ) -> Option<DefaultKey> {
        lookup(stored)
    }
}

/// Relocating primary; secondaries store positions and every affected
/// entry is patched when a record moves.
#[derive(Default, Debug, Clone, Copy)]
pub struct UpdatePointer;

impl<K, P> Policy<K, P> for UpdatePointer {
    const INVALIDATES: bool = true;
    const STORES_HANDLE: bool = true;
    const NEEDS_TRANSLATION: bool = false;
    const USES_TOMBSTONES: bool = false;
    const REQUIRES_UNIQUE_PRIMARY: bool = false;

    type Meta = NoMeta;
    type Store = DenseStore<K, P, NoMeta>;
    type Raw = DensePos;
    type SecRef = DensePos;
    type Live = NoCount;

    fn handle_pos(&self, raw: DensePos) -> Option<DensePos> {
        Some(raw)
    }

    fn make_raw(&self, pos: DensePos, _meta: &NoMeta) -> DensePos {
        pos
    }

    fn sec_ref(&self, pos: DensePos, _key: &K, _meta: &NoMeta) -> DensePos {
        pos
    }

    fn resolve_secref(
        &self,
        stored: &DensePos,
        _lookup: impl FnOnce(&K) -> Option<DensePos>,
    ) -> Option<DensePos> {
        Some(*stored)
    }
}

/// [`UpdatePointer`] with lazy deletion. `C` selects the live counter;
/// use [`AtomicCount`](crate::live::AtomicCount) when `len()` must stay
/// readable from other threads.
#[derive(Default, Debug, Clone, Copy)]
pub struct UpdatePointerTombstones<C = PlainCount> {
    _live: PhantomData<C>,
}

impl<K, P, C: LiveCount> Policy<K, P> for UpdatePointerTombstones<C> {
    const INVALIDATES: bool = true;
    const STORES_HANDLE: bool = true;
    const NEEDS_TRANSLATION: bool = false;
    const USES_TOMBSTONES: bool = true;
    const REQUIRES_UNIQUE_PRIMARY: bool = false;

    type Meta = DeadFlag;
    type Store = DenseStore<K, P, DeadFlag>;
    type Raw = DensePos;
    type SecRef = DensePos;
    type Live = C;

    fn handle_pos(&self, raw: DensePos) -> Option<DensePos> {
        Some(raw)
    }

    fn make_raw(&self, pos: DensePos, _meta: &DeadFlag) -> DensePos {
        pos
    }

    fn sec_ref(&self, pos: DensePos, _key: &K, _meta: &DeadFlag) -> DensePos {
        pos
    }

    fn resolve_secref(
        &self,
        stored: &DensePos,
        _lookup: impl FnOnce(&K) -> Option<DensePos>,
    ) -> Option<DensePos> {
        Some(*stored)
    }
}

impl<C> Compactable for UpdatePointerTombstones<C> {}

/// Relocating primary; secondaries store ordinals into a dense array of
/// positions. Relocation repair is one slot write.
#[derive(Default, Debug, Clone)]
pub struct TranslationArray {
    slots: Vec<DensePos>,
}

impl<K, P> Policy<K, P> for TranslationArray {
    const INVALIDATES: bool = true;
    const STORES_HANDLE: bool = false;
    const NEEDS_TRANSLATION: bool = true;
    const USES_TOMBSTONES: bool = false;
    const REQUIRES_UNIQUE_PRIMARY: bool = false;

    type Meta = OrdinalSlot;
    type Store = DenseStore<K, P, OrdinalSlot>;
    type Raw = Ordinal;
    type SecRef = Ordinal;
    type Live = NoCount;

    fn handle_pos(&self, raw: Ordinal) -> Option<DensePos> {
        self.slots.get(raw.0).copied()
    }

    fn make_raw(&self, _pos: DensePos, meta: &OrdinalSlot) -> Ordinal {
        Ordinal(meta.ordinal())
    }

    fn sec_ref(&self, _pos: DensePos, _key: &K, meta: &OrdinalSlot) -> Ordinal {
        Ordinal(meta.ordinal())
    }

    fn resolve_secref(
        &self,
        stored: &Ordinal,
        _lookup: impl FnOnce(&K) -> Option<DensePos>,
    ) -> Option<Ordinal> {
        Some(*stored)
    }

    fn on_insert(&mut self, pos: DensePos) -> Option<usize> {
        self.slots.push(pos);
        Some(self.slots.len() - 1)
    }

    fn on_insert_fail(&mut self) {
        self.slots.pop();
    }

    fn on_relocate(&mut self, ordinal: usize, to: DensePos) {
        self.slots[ordinal] = to;
    }

    fn on_physical_remove(&mut self, ordinal: usize) -> Option<(usize, DensePos)> {
        let last = self.slots.len() - 1;
        self.slots.swap_remove(ordinal);
        (ordinal != last).then(|| (last, self.slots[ordinal]))
    }

    fn on_clear(&mut self) {
        self.slots.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional);
    }

    fn translation_len(&self) -> Option<usize> {
        Some(self.slots.len())
    }
}

impl Compactable for TranslationArray {}

/// [`TranslationArray`] with lazy deletion.
#[derive(Default, Debug, Clone)]
pub struct TranslationArrayTombstones<C = PlainCount> {
    slots: Vec<DensePos>,
    _live: PhantomData<C>,
}

impl<K, P, C: LiveCount> Policy<K, P> for TranslationArrayTombstones<C> {
    const INVALIDATES: bool = true;
    const STORES_HANDLE: bool = false;
    const NEEDS_TRANSLATION: bool = true;
    const USES_TOMBSTONES: bool = true;
    const REQUIRES_UNIQUE_PRIMARY: bool = false;

    type Meta = DeadOrdinal;
    type Store = DenseStore<K, P, DeadOrdinal>;
    type Raw = Ordinal;
    type SecRef = Ordinal;
    type Live = C;

    fn handle_pos(&self, raw: Ordinal) -> Option<DensePos> {
        self.slots.get(raw.0).copied()
    }

    fn make_raw(&self, _pos: DensePos, meta: &DeadOrdinal) -> Ordinal {
        Ordinal(meta.ordinal())
    }

    fn sec_ref(&self, _pos: DensePos, _key: &K, meta: &DeadOrdinal) -> Ordinal {
        Ordinal(meta.ordinal())
    }

    fn resolve_secref(
        &self,
        stored: &Ordinal,
        _lookup: impl FnOnce(&K) -> Option<DensePos>,
    ) -> Option<Ordinal> {
        Some(*stored)
    }

    fn on_insert(&mut self, pos: DensePos) -> Option<usize> {
        self.slots.push(pos);
        Some(self.slots.len() - 1)
    }

    fn on_insert_fail(&mut self) {
        self.slots.pop();
    }

    fn on_relocate(&mut self, ordinal: usize, to: DensePos) {
        self.slots[ordinal] = to;
    }

    fn on_physical_remove(&mut self, ordinal: usize) -> Option<(usize, DensePos)> {
        let last = self.slots.len() - 1;
        self.slots.swap_remove(ordinal);
        (ordinal != last).then(|| (last, self.slots[ordinal]))
    }

    fn on_clear(&mut self) {
        self.slots.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.slots.reserve(additional);
    }

    fn translation_len(&self) -> Option<usize> {
        Some(self.slots.len())
    }
}

impl<C> Compactable for TranslationArrayTombstones<C> {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: appending slots, failing the last append, relocating and
    /// swap-removing keep the array in lockstep with positions.
    #[test]
    fn translation_slots_track_positions() {
        let mut p = TranslationArray::default();

        let o0 = Policy::<u32, u32>::on_insert(&mut p, DensePos(0));
        let o1 = Policy::<u32, u32>::on_insert(&mut p, DensePos(1));
        assert_eq!((o0, o1), (Some(0), Some(1)));

        // an aborted insertion pops its slot
        let _ = Policy::<u32, u32>::on_insert(&mut p, DensePos(2));
        Policy::<u32, u32>::on_insert_fail(&mut p);
        assert_eq!(Policy::<u32, u32>::translation_len(&p), Some(2));

        Policy::<u32, u32>::on_relocate(&mut p, 1, DensePos(0));
        assert_eq!(
            Policy::<u32, u32>::handle_pos(&p, Ordinal(1)),
            Some(DensePos(0))
        );
    }

    /// Invariant: swap-removing a non-tail slot reports the re-stamp the
    /// engine must apply; removing the tail reports nothing.
    #[test]
    fn physical_remove_swaps_last_slot() {
        let mut p = TranslationArray::default();
        for i in 0..3 {
            let _ = Policy::<u32, u32>::on_insert(&mut p, DensePos(i));
        }
        let swapped = Policy::<u32, u32>::on_physical_remove(&mut p, 0);
        assert_eq!(swapped, Some((2, DensePos(2))));
        assert_eq!(
            Policy::<u32, u32>::handle_pos(&p, Ordinal(0)),
            Some(DensePos(2))
        );

        let quiet = Policy::<u32, u32>::on_physical_remove(&mut p, 1);
        assert_eq!(quiet, None);
        assert_eq!(Policy::<u32, u32>::translation_len(&p), Some(1));
    }
}
