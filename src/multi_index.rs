//! The coherence engine: one primary owner of records plus secondary
//! lookups kept in lockstep through the active policy.
//!
//! Mutations publish to the record store first, then the primary index,
//! then the secondaries in declaration order; failures unwind in reverse
//! so a rejected operation leaves no trace. Updates drop the record's
//! secondary entries, mutate in place, and rebuild, restoring the original
//! payload when the mutation or the rebuild fails.

use crate::edit::EditProxy;
use crate::handle::Handle;
use crate::index_map::{IndexKey, IndexMap, MapFamily, UniqueMapFamily};
use crate::index_spec::{HasIndex, IndexSpec, IndexTuple, SpecMap};
use crate::live::LiveCount;
use crate::policy::{Compactable, Policy, PosOf};
use crate::record::{Record, RecordMeta};
use crate::store::{Moved, Store};
use crate::view::{SecView, SecViewMut};
use core::fmt;
use core::marker::PhantomData;

/// Primary index map for a configuration.
pub type PrimaryMapOf<K, P, Pol, Prim> = <Prim as MapFamily>::Map<K, PosOf<Pol, K, P>>;

/// Handle type for a configuration.
pub type HandleOf<K, P, Pol> = Handle<<Pol as Policy<K, P>>::Raw>;

/// Why an insertion was rejected. Rejections are complete rollbacks: the
/// container is exactly as it was before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError<R> {
    /// A unique primary already holds a live record under this key.
    DuplicateKey { existing: Handle<R> },
    /// A unique secondary already indexes another record under the
    /// projected key.
    SecondaryConflict,
}

impl<R: Copy + Eq + core::hash::Hash + fmt::Debug> fmt::Display for InsertError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertError::DuplicateKey { .. } => write!(f, "key already present in primary index"),
            InsertError::SecondaryConflict => {
                write!(f, "projected key already present in a unique secondary index")
            }
        }
    }
}

impl<R: Copy + Eq + core::hash::Hash + fmt::Debug> std::error::Error for InsertError<R> {}

/// Multi-index container over `(K, P)` records.
///
/// `Pol` picks the coherence policy, `Prim` the primary index family, and
/// `Secs` is a tuple of [`IndexSpec`]s describing the secondaries.
pub struct MultiIndex<K, P, Pol, Prim, Secs>
where
    K: IndexKey,
    Pol: Policy<K, P>,
    Prim: MapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef>,
{
    store: Pol::Store,
    primary: PrimaryMapOf<K, P, Pol, Prim>,
    secondaries: Secs::Maps,
    policy: Pol,
    live: Pol::Live,
}

impl<K, P, Pol, Prim, Secs> MultiIndex<K, P, Pol, Prim, Secs>
where
    K: IndexKey,
    Pol: Policy<K, P>,
    Prim: MapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef>,
{
    const UNIQUE_PRIMARY: bool =
        <PrimaryMapOf<K, P, Pol, Prim> as IndexMap<K, PosOf<Pol, K, P>>>::UNIQUE;

    pub fn new() -> Self {
        const {
            assert!(
                !Pol::REQUIRES_UNIQUE_PRIMARY || Self::UNIQUE_PRIMARY,
                "key-storing policies require a unique primary index",
            );
        }
        Self {
            store: Default::default(),
            primary: Default::default(),
            secondaries: Default::default(),
            policy: Pol::default(),
            live: Default::default(),
        }
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        if Pol::USES_TOMBSTONES {
            self.live.get()
        } else {
            self.store.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored records, dead ones included.
    pub fn physical_len(&self) -> usize {
        self.store.len()
    }

    /// Handle of the first live record under `key` in bucket order.
    pub fn find(&self, key: &K) -> Option<HandleOf<K, P, Pol>> {
        for &pos in self.primary.for_key(key) {
            let rec = self.store.get(pos).expect("primary entry must resolve");
            if !rec.meta.dead() {
                return Some(Handle::new(self.policy.make_raw(pos, &rec.meta)));
            }
        }
        None
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Number of live records under `key`.
    pub fn count(&self, key: &K) -> usize {
        self.primary
            .for_key(key)
            .filter(|&&pos| {
                !self
                    .store
                    .get(pos)
                    .expect("primary entry must resolve")
                    .meta
                    .dead()
            })
            .count()
    }

    /// Key and payload for a handle. Dead records stay readable until they
    /// are physically removed.
    pub fn get(&self, h: HandleOf<K, P, Pol>) -> Option<(&K, &P)> {
        let pos = self.locate(h)?;
        let rec = self.store.get(pos)?;
        Some((&rec.key, &rec.payload))
    }

    /// Whether the handle's record is tombstoned. `None` when the handle
    /// no longer resolves.
    pub fn is_dead(&self, h: HandleOf<K, P, Pol>) -> Option<bool> {
        let pos = self.locate(h)?;
        Some(self.store.get(pos)?.meta.dead())
    }

    /// Live records in primary-index order.
    pub fn iter(&self) -> impl Iterator<Item = (HandleOf<K, P, Pol>, &K, &P)> + '_ {
        self.primary.iter().filter_map(|(_, &pos)| {
            let rec = self.store.get(pos).expect("primary entry must resolve");
            if rec.meta.dead() {
                return None;
            }
            Some((
                Handle::new(self.policy.make_raw(pos, &rec.meta)),
                &rec.key,
                &rec.payload,
            ))
        })
    }

    /// Live records under `key` in bucket order.
    pub fn equal_range<'a>(
        &'a self,
        key: &'a K,
    ) -> impl Iterator<Item = (HandleOf<K, P, Pol>, &'a K, &'a P)> + 'a {
        self.primary.for_key(key).filter_map(|&pos| {
            let rec = self.store.get(pos).expect("primary entry must resolve");
            (!rec.meta.dead()).then(|| {
                (
                    Handle::new(self.policy.make_raw(pos, &rec.meta)),
                    &rec.key,
                    &rec.payload,
                )
            })
        })
    }

    /// Insert a record.
    ///
    /// Under tombstones the first dead record with the same key is revived
    /// in bucket order instead of growing the store. A unique primary
    /// rejects a live duplicate; a unique secondary rejection rolls the
    /// whole insertion back.
    pub fn insert(
        &mut self,
        key: K,
        payload: P,
    ) -> Result<HandleOf<K, P, Pol>, InsertError<Pol::Raw>> {
        if Pol::USES_TOMBSTONES || Self::UNIQUE_PRIMARY {
            let mut dead_pos = None;
            let mut live_raw = None;
            for &pos in self.primary.for_key(&key) {
                let rec = self.store.get(pos).expect("primary entry must resolve");
                if rec.meta.dead() {
                    if dead_pos.is_none() {
                        dead_pos = Some(pos);
                    }
                } else if Self::UNIQUE_PRIMARY {
                    live_raw = Some(self.policy.make_raw(pos, &rec.meta));
                }
            }
            if let Some(raw) = live_raw {
                return Err(InsertError::DuplicateKey {
                    existing: Handle::new(raw),
                });
            }
            if let Some(pos) = dead_pos {
                return self.revive(pos, payload);
            }
        }

        let pos = self.store.insert(Record::new(key.clone(), payload));
        let inserted = self.primary.insert(key, pos);
        debug_assert!(inserted, "primary occupancy was checked above");

        if let Some(ordinal) = self.policy.on_insert(pos) {
            self.store
                .get_mut(pos)
                .expect("fresh record must exist")
                .meta
                .set_ordinal(ordinal);
        }

        let rec = self.store.get(pos).expect("fresh record must exist");
        let stored = self.policy.sec_ref(pos, &rec.key, &rec.meta);
        let raw = self.policy.make_raw(pos, &rec.meta);
        if !Secs::add_all(&mut self.secondaries, &rec.key, &rec.payload, &stored) {
            let k = rec.key.clone();
            self.policy.on_insert_fail();
            let removed = self.primary.remove_first(&k, |v| *v == pos);
            debug_assert!(removed.is_some(), "fresh primary entry must exist");
            let (_rec, moved) = self.store.remove(pos);
            debug_assert!(moved.is_none(), "rollback must remove the newest slot");
            return Err(InsertError::SecondaryConflict);
        }
        self.live.increment();
        Ok(Handle::new(raw))
    }

    /// Insert with a lazily built payload; the closure only runs when the
    /// key is actually free (or revivable).
    pub fn insert_with<F: FnOnce() -> P>(
        &mut self,
        key: K,
        default: F,
    ) -> Result<HandleOf<K, P, Pol>, InsertError<Pol::Raw>> {
        if Self::UNIQUE_PRIMARY {
            if let Some(existing) = self.find(&key) {
                return Err(InsertError::DuplicateKey { existing });
            }
        }
        self.insert(key, default())
    }

    /// Insert, or overwrite the live record under `key`. Returns the
    /// handle and whether a fresh record was inserted.
    pub fn insert_or_assign(
        &mut self,
        key: K,
        payload: P,
    ) -> Result<(HandleOf<K, P, Pol>, bool), InsertError<Pol::Raw>>
    where
        Prim: UniqueMapFamily,
        P: Clone,
    {
        match self.find(&key) {
            Some(h) => {
                if self.modify(h, move |dst| *dst = payload) {
                    Ok((h, false))
                } else {
                    Err(InsertError::SecondaryConflict)
                }
            }
            None => self.insert(key, payload).map(|h| (h, true)),
        }
    }

    /// Buffered edit of the record under `key` (unique primaries).
    /// Commit inserts, revives, or replaces as appropriate.
    pub fn entry(&mut self, key: K) -> EditProxy<'_, K, P, Pol, Prim, Secs>
    where
        Prim: UniqueMapFamily,
        P: Clone + Default,
    {
        let (target, buf) = match self.find_any(&key) {
            Some(h) => {
                let payload = self
                    .get(h)
                    .expect("entry target must resolve")
                    .1
                    .clone();
                (Some(h), payload)
            }
            None => (None, P::default()),
        };
        EditProxy::new(self, key, buf, target)
    }

    /// Erase every live record under `key`. Under tombstones records are
    /// marked dead; otherwise they are physically removed.
    pub fn remove(&mut self, key: &K) -> usize {
        let mut removed = 0;
        loop {
            let next = self.primary.for_key(key).copied().find(|&pos| {
                !self
                    .store
                    .get(pos)
                    .expect("primary entry must resolve")
                    .meta
                    .dead()
            });
            let Some(pos) = next else { break };
            self.erase_at(pos);
            removed += 1;
        }
        removed
    }

    /// Erase the record a handle refers to. `false` when the handle no
    /// longer resolves or the record is already dead.
    pub fn remove_handle(&mut self, h: HandleOf<K, P, Pol>) -> bool {
        let Some(pos) = self.locate(h) else {
            return false;
        };
        if self.store.get(pos).expect("located record must exist").meta.dead() {
            return false;
        }
        self.erase_at(pos);
        true
    }

    /// Erase every record whose projection under index `T` equals `key`.
    pub fn remove_by<T, I>(&mut self, key: &T::SecKey) -> usize
    where
        T: IndexSpec<K, P>,
        Secs: HasIndex<T, I, K, P, Pol::SecRef>,
    {
        let mut removed = 0;
        loop {
            let stored = <Secs as HasIndex<T, I, K, P, Pol::SecRef>>::index(&self.secondaries)
                .get_first(key)
                .cloned();
            let Some(stored) = stored else { break };
            let raw = self
                .policy
                .resolve_secref(&stored, |k| self.primary.get_first(k).copied())
                .expect("secondary entry must resolve");
            let pos = self
                .policy
                .handle_pos(raw)
                .expect("secondary entry must resolve to a position");
            self.erase_at(pos);
            removed += 1;
        }
        removed
    }

    /// Mutate the payload in place, rebuilding every secondary.
    ///
    /// Returns `false` when the handle does not resolve or when the new
    /// projections collide in a unique secondary; the record is restored
    /// in the latter case. A dead record is revived when the rebuild
    /// succeeds.
    pub fn modify<F: FnOnce(&mut P)>(&mut self, h: HandleOf<K, P, Pol>, f: F) -> bool
    where
        P: Clone,
    {
        match self.update_core(h, |p| {
            f(p);
            Ok::<(), core::convert::Infallible>(())
        }) {
            Ok(changed) => changed,
            Err(e) => match e {},
        }
    }

    /// Like [`modify`](Self::modify), but the mutator may fail. On `Err`
    /// the original payload, liveness and secondary entries are restored
    /// before the error is returned.
    pub fn try_modify<E, F: FnOnce(&mut P) -> Result<(), E>>(
        &mut self,
        h: HandleOf<K, P, Pol>,
        f: F,
    ) -> Result<bool, E>
    where
        P: Clone,
    {
        self.update_core(h, f)
    }

    /// Replace the payload. Short-circuits when the record is live and the
    /// value is unchanged.
    pub fn replace(&mut self, h: HandleOf<K, P, Pol>, new: P) -> bool
    where
        P: Clone + PartialEq,
    {
        let Some(pos) = self.locate(h) else {
            return false;
        };
        let rec = self.store.get(pos).expect("located record must exist");
        if !rec.meta.dead() && rec.payload == new {
            return true;
        }
        self.modify(h, move |dst| *dst = new)
    }

    /// Rebuild the container with only its live records, releasing
    /// tombstones and re-densifying policy state.
    pub fn compact(&mut self)
    where
        Pol: Compactable,
        P: Clone,
    {
        let mut fresh = Self::new();
        fresh.reserve(self.len());
        for (_h, k, p) in self.iter() {
            let inserted = fresh.insert(k.clone(), p.clone());
            debug_assert!(inserted.is_ok(), "live records cannot conflict during compaction");
        }
        *self = fresh;
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.primary.clear();
        Secs::clear_all(&mut self.secondaries);
        self.policy.on_clear();
        self.live.set(0);
    }

    pub fn reserve(&mut self, additional: usize) {
        self.store.reserve(additional);
        self.primary.reserve(additional);
        Secs::reserve_all(&mut self.secondaries, additional);
        self.policy.reserve(additional);
    }

    /// Read facade over secondary index `T`.
    pub fn view<T, I>(&self) -> SecView<'_, K, P, Pol, Prim, Secs, T, I>
    where
        T: IndexSpec<K, P>,
        Secs: HasIndex<T, I, K, P, Pol::SecRef>,
    {
        SecView {
            mi: self,
            _tag: PhantomData,
        }
    }

    /// Mutating facade over secondary index `T`.
    pub fn view_mut<T, I>(&mut self) -> SecViewMut<'_, K, P, Pol, Prim, Secs, T, I>
    where
        T: IndexSpec<K, P>,
        Secs: HasIndex<T, I, K, P, Pol::SecRef>,
    {
        SecViewMut {
            mi: self,
            _tag: PhantomData,
        }
    }

    /// Verify cross-index bookkeeping. Used by the property tests; costs
    /// O(records x secondaries).
    pub fn check_invariants(&self) -> Result<(), String> {
        let live = self.store.iter().filter(|(_, r)| !r.meta.dead()).count();
        if self.len() != live {
            return Err(format!("len() = {} but {} live records", self.len(), live));
        }
        if self.primary.len() != self.store.len() {
            return Err(format!(
                "primary holds {} entries for {} records",
                self.primary.len(),
                self.store.len()
            ));
        }
        if let Some(tlen) = self.policy.translation_len() {
            if tlen != self.store.len() {
                return Err(format!(
                    "translation array holds {} slots for {} records",
                    tlen,
                    self.store.len()
                ));
            }
        }
        for (pos, rec) in self.store.iter() {
            let n = self.primary.for_key(&rec.key).filter(|&&v| v == pos).count();
            if n != 1 {
                return Err(format!("record {:?} has {} primary entries", rec.key, n));
            }
            let raw = self.policy.make_raw(pos, &rec.meta);
            if self.policy.handle_pos(raw) != Some(pos) {
                return Err(format!("handle for {:?} does not round-trip", rec.key));
            }
            let stored = self.policy.sec_ref(pos, &rec.key, &rec.meta);
            let expected = if rec.meta.dead() { 0 } else { 1 };
            if !Secs::stored_times(&self.secondaries, &rec.key, &rec.payload, &stored, expected) {
                return Err(format!(
                    "record {:?} is not stored exactly {} time(s) per secondary",
                    rec.key, expected
                ));
            }
            if Self::UNIQUE_PRIMARY && !rec.meta.dead() && self.count(&rec.key) != 1 {
                return Err(format!("unique primary holds duplicates of {:?}", rec.key));
            }
        }
        let consistent = Secs::entries_consistent(&self.secondaries, |stored| {
            let raw = self
                .policy
                .resolve_secref(&stored, |k| self.primary.get_first(k).copied())?;
            let pos = self.policy.handle_pos(raw)?;
            let rec = self.store.get(pos)?;
            if rec.meta.dead() {
                return None;
            }
            Some((&rec.key, &rec.payload))
        });
        if !consistent {
            return Err("dangling or mis-projected secondary entry".to_string());
        }
        Ok(())
    }

    pub(crate) fn handle_key(&self, h: HandleOf<K, P, Pol>) -> Option<&K> {
        self.get(h).map(|(k, _)| k)
    }

    pub(crate) fn handle_payload(&self, h: HandleOf<K, P, Pol>) -> Option<&P> {
        self.get(h).map(|(_, p)| p)
    }

    /// Handle for the record under `key`, dead or live (unique primaries).
    pub(crate) fn find_any(&self, key: &K) -> Option<HandleOf<K, P, Pol>> {
        let &pos = self.primary.get_first(key)?;
        let rec = self.store.get(pos).expect("primary entry must resolve");
        Some(Handle::new(self.policy.make_raw(pos, &rec.meta)))
    }

    pub(crate) fn resolve_stored(&self, stored: &Pol::SecRef) -> Option<HandleOf<K, P, Pol>> {
        let raw = self
            .policy
            .resolve_secref(stored, |k| self.primary.get_first(k).copied())?;
        Some(Handle::new(raw))
    }

    pub(crate) fn secondary_map<T, I>(&self) -> &SpecMap<T, K, P, Pol::SecRef>
    where
        T: IndexSpec<K, P>,
        Secs: HasIndex<T, I, K, P, Pol::SecRef>,
    {
        <Secs as HasIndex<T, I, K, P, Pol::SecRef>>::index(&self.secondaries)
    }

    fn locate(&self, h: HandleOf<K, P, Pol>) -> Option<PosOf<Pol, K, P>> {
        let pos = self.policy.handle_pos(h.raw())?;
        self.store.get(pos)?;
        Some(pos)
    }

    /// Clear a tombstone and give the record a new payload.
    fn revive(
        &mut self,
        pos: PosOf<Pol, K, P>,
        payload: P,
    ) -> Result<HandleOf<K, P, Pol>, InsertError<Pol::Raw>> {
        {
            let rec = self.store.get_mut(pos).expect("dead record must exist");
            rec.payload = payload;
            rec.meta.set_dead(false);
        }
        let rec = self.store.get(pos).expect("dead record must exist");
        let stored = self.policy.sec_ref(pos, &rec.key, &rec.meta);
        let raw = self.policy.make_raw(pos, &rec.meta);
        if !Secs::add_all(&mut self.secondaries, &rec.key, &rec.payload, &stored) {
            self.store
                .get_mut(pos)
                .expect("dead record must exist")
                .meta
                .set_dead(true);
            return Err(InsertError::SecondaryConflict);
        }
        self.live.increment();
        Ok(Handle::new(raw))
    }

    /// Drop the record's secondary entries, then tombstone or physically
    /// remove it.
    fn erase_at(&mut self, pos: PosOf<Pol, K, P>) {
        let rec = self.store.get(pos).expect("erase target must exist");
        let stored = self.policy.sec_ref(pos, &rec.key, &rec.meta);
        Secs::drop_all(&mut self.secondaries, &rec.key, &rec.payload, &stored);
        if Pol::USES_TOMBSTONES {
            self.store
                .get_mut(pos)
                .expect("erase target must exist")
                .meta
                .set_dead(true);
            self.live.decrement();
        } else {
            let rec = self.store.get(pos).expect("erase target must exist");
            let k = rec.key.clone();
            let removed = self.primary.remove_first(&k, |v| *v == pos);
            debug_assert!(removed.is_some(), "primary entry missing during erase");
            self.physical_remove(pos);
        }
    }

    /// Physically remove a record whose primary and secondary entries are
    /// already gone, repairing whatever the removal relocates.
    fn physical_remove(&mut self, pos: PosOf<Pol, K, P>) -> Record<K, P, Pol::Meta> {
        let removed_ordinal = if Pol::NEEDS_TRANSLATION {
            self.store
                .get(pos)
                .expect("remove target must exist")
                .meta
                .ordinal()
        } else {
            0
        };
        let (record, moved) = self.store.remove(pos);
        if let Some(Moved { from, to }) = moved {
            let moved_rec = self.store.get(to).expect("relocated record must exist");
            let patched = self.primary.replace_first(&moved_rec.key, |v| *v == from, to);
            debug_assert!(patched, "primary entry missing during relocation");
            if Pol::STORES_HANDLE && !moved_rec.meta.dead() {
                let old = self.policy.sec_ref(from, &moved_rec.key, &moved_rec.meta);
                let new = self.policy.sec_ref(to, &moved_rec.key, &moved_rec.meta);
                Secs::patch_all(
                    &mut self.secondaries,
                    &moved_rec.key,
                    &moved_rec.payload,
                    &old,
                    &new,
                );
            }
            if Pol::NEEDS_TRANSLATION {
                let moved_rec = self.store.get(to).expect("relocated record must exist");
                self.policy.on_relocate(moved_rec.meta.ordinal(), to);
            }
        }
        if Pol::NEEDS_TRANSLATION {
            if let Some((_old_ordinal, swapped_pos)) = self.policy.on_physical_remove(removed_ordinal)
            {
                let swapped = self.store.get(swapped_pos).expect("swapped record must exist");
                let old = self.policy.sec_ref(swapped_pos, &swapped.key, &swapped.meta);
                self.store
                    .get_mut(swapped_pos)
                    .expect("swapped record must exist")
                    .meta
                    .set_ordinal(removed_ordinal);
                let swapped = self.store.get(swapped_pos).expect("swapped record must exist");
                let new = self.policy.sec_ref(swapped_pos, &swapped.key, &swapped.meta);
                if !swapped.meta.dead() {
                    Secs::patch_all(
                        &mut self.secondaries,
                        &swapped.key,
                        &swapped.payload,
                        &old,
                        &new,
                    );
                }
            }
        }
        record
    }

    /// Drop-rebuild update with restore-on-failure. The heart of `modify`,
    /// `try_modify`, `replace` and the edit proxy.
    fn update_core<E>(
        &mut self,
        h: HandleOf<K, P, Pol>,
        f: impl FnOnce(&mut P) -> Result<(), E>,
    ) -> Result<bool, E>
    where
        P: Clone,
    {
        let Some(pos) = self.locate(h) else {
            return Ok(false);
        };
        let rec = self.store.get(pos).expect("located record must exist");
        let was_dead = rec.meta.dead();
        let stored = self.policy.sec_ref(pos, &rec.key, &rec.meta);
        let old_payload = rec.payload.clone();
        if !was_dead {
            Secs::drop_all(&mut self.secondaries, &rec.key, &rec.payload, &stored);
        }
        self.store
            .get_mut(pos)
            .expect("located record must exist")
            .meta
            .set_dead(false);

        let mut guard = RestoreGuard {
            mi: &mut *self,
            pos,
            old: Some(old_payload),
            was_dead,
            armed: true,
        };
        let outcome = f(&mut guard
            .mi
            .store
            .get_mut(pos)
            .expect("located record must exist")
            .payload);
        if let Err(e) = outcome {
            guard.restore();
            return Err(e);
        }
        let rebuilt = {
            let rec = guard.mi.store.get(pos).expect("located record must exist");
            let stored = guard.mi.policy.sec_ref(pos, &rec.key, &rec.meta);
            Secs::add_all(&mut guard.mi.secondaries, &rec.key, &rec.payload, &stored)
        };
        if !rebuilt {
            guard.restore();
            return Ok(false);
        }
        guard.armed = false;
        drop(guard);
        if was_dead {
            self.live.increment();
        }
        Ok(true)
    }
}

/// Restores payload, liveness and secondary entries when an update fails
/// or unwinds.
struct RestoreGuard<'g, K, P, Pol, Prim, Secs>
where
    K: IndexKey,
    P: Clone,
    Pol: Policy<K, P>,
    Prim: MapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef>,
{
    mi: &'g mut MultiIndex<K, P, Pol, Prim, Secs>,
    pos: PosOf<Pol, K, P>,
    old: Option<P>,
    was_dead: bool,
    armed: bool,
}

impl<K, P, Pol, Prim, Secs> RestoreGuard<'_, K, P, Pol, Prim, Secs>
where
    K: IndexKey,
    P: Clone,
    Pol: Policy<K, P>,
    Prim: MapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef>,
{
    fn restore(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        let old = self.old.take().expect("restore payload present");
        {
            let rec = self
                .mi
                .store
                .get_mut(self.pos)
                .expect("restore target must exist");
            rec.payload = old;
            rec.meta.set_dead(self.was_dead);
        }
        if !self.was_dead {
            let rec = self.mi.store.get(self.pos).expect("restore target must exist");
            let stored = self.mi.policy.sec_ref(self.pos, &rec.key, &rec.meta);
            let ok = Secs::add_all(&mut self.mi.secondaries, &rec.key, &rec.payload, &stored);
            debug_assert!(ok, "restoring original secondary entries cannot conflict");
        }
    }
}

impl<K, P, Pol, Prim, Secs> Drop for RestoreGuard<'_, K, P, Pol, Prim, Secs>
where
    K: IndexKey,
    P: Clone,
    Pol: Policy<K, P>,
    Prim: MapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef>,
{
    fn drop(&mut self) {
        self.restore();
    }
}

impl<K, P, Pol, Prim, Secs> Default for MultiIndex<K, P, Pol, Prim, Secs>
where
    K: IndexKey,
    Pol: Policy<K, P>,
    Prim: MapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P, Pol, Prim, Secs> Clone for MultiIndex<K, P, Pol, Prim, Secs>
where
    K: IndexKey,
    P: Clone,
    Pol: Policy<K, P>,
    Prim: MapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef>,
{
    /// Rebuilds from the live records; the clone starts compacted.
    fn clone(&self) -> Self {
        let mut out = Self::new();
        out.reserve(self.len());
        for (_h, k, p) in self.iter() {
            let inserted = out.insert(k.clone(), p.clone());
            debug_assert!(inserted.is_ok(), "clone re-inserts cannot conflict");
        }
        out
    }
}
