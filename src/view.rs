//! Per-index read and write facades.
//!
//! A view exposes one secondary index under its own key type. Stored
//! references are materialised into [`Handle`](crate::Handle)s on every
//! access, so clients never see whether the index keeps positions,
//! ordinals, or primary keys.

use crate::index_map::{IndexKey, IndexMap, MapFamily};
use crate::index_spec::{HasIndex, IndexSpec, IndexTuple, SpecMap};
use crate::multi_index::{HandleOf, MultiIndex};
use crate::policy::Policy;
use core::marker::PhantomData;

/// Read facade over secondary index `T`.
pub struct SecView<'a, K, P, Pol, Prim, Secs, T, I>
where
    K: IndexKey,
    Pol: Policy<K, P>,
    Prim: MapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef> + HasIndex<T, I, K, P, Pol::SecRef>,
    T: IndexSpec<K, P>,
{
    pub(crate) mi: &'a MultiIndex<K, P, Pol, Prim, Secs>,
    pub(crate) _tag: PhantomData<(T, I)>,
}

impl<'a, K, P, Pol, Prim, Secs, T, I> SecView<'a, K, P, Pol, Prim, Secs, T, I>
where
    K: IndexKey,
    Pol: Policy<K, P>,
    Prim: MapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef> + HasIndex<T, I, K, P, Pol::SecRef>,
    T: IndexSpec<K, P>,
{
    fn map(&self) -> &'a SpecMap<T, K, P, Pol::SecRef> {
        self.mi.secondary_map::<T, I>()
    }

    /// Handle of the first record projecting to `key`, in bucket order.
    pub fn find(&self, key: &T::SecKey) -> Option<HandleOf<K, P, Pol>> {
        let stored = self.map().get_first(key)?;
        self.mi.resolve_stored(stored)
    }

    pub fn contains(&self, key: &T::SecKey) -> bool {
        self.map().contains(key)
    }

    pub fn count(&self, key: &T::SecKey) -> usize {
        self.map().key_count(key)
    }

    /// Number of entries. Secondaries never reference dead records, so
    /// this equals the number of live records indexed here.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Every entry as `(secondary key, handle)`.
    pub fn iter(&self) -> impl Iterator<Item = (&'a T::SecKey, HandleOf<K, P, Pol>)> + 'a
    where
        T::SecKey: 'a,
        <T::Family as MapFamily>::Map<T::SecKey, Pol::SecRef>: 'a,
    {
        let mi = self.mi;
        self.map().iter().map(move |(k, stored)| {
            (
                k,
                mi.resolve_stored(stored)
                    .expect("secondary entry must resolve"),
            )
        })
    }

    /// Handles of every record projecting to `key`, in bucket order.
    pub fn equal_range<'s>(
        &'s self,
        key: &'s T::SecKey,
    ) -> impl Iterator<Item = HandleOf<K, P, Pol>> + 's {
        let mi: &'s MultiIndex<K, P, Pol, Prim, Secs> = self.mi;
        let map: &'s SpecMap<T, K, P, Pol::SecRef> = self.map();
        map.for_key(key).map(move |stored| {
            mi.resolve_stored(stored)
                .expect("secondary entry must resolve")
        })
    }
}

/// Mutating facade over secondary index `T`.
pub struct SecViewMut<'a, K, P, Pol, Prim, Secs, T, I>
where
    K: IndexKey,
    Pol: Policy<K, P>,
    Prim: MapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef> + HasIndex<T, I, K, P, Pol::SecRef>,
    T: IndexSpec<K, P>,
{
    pub(crate) mi: &'a mut MultiIndex<K, P, Pol, Prim, Secs>,
    pub(crate) _tag: PhantomData<(T, I)>,
}

impl<K, P, Pol, Prim, Secs, T, I> SecViewMut<'_, K, P, Pol, Prim, Secs, T, I>
where
    K: IndexKey,
    Pol: Policy<K, P>,
    Prim: MapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef> + HasIndex<T, I, K, P, Pol::SecRef>,
    T: IndexSpec<K, P>,
{
    pub fn as_view(&self) -> SecView<'_, K, P, Pol, Prim, Secs, T, I> {
        SecView {
            mi: &*self.mi,
            _tag: PhantomData,
        }
    }

    pub fn find(&self, key: &T::SecKey) -> Option<HandleOf<K, P, Pol>> {
        self.as_view().find(key)
    }

    pub fn contains(&self, key: &T::SecKey) -> bool {
        self.as_view().contains(key)
    }

    pub fn count(&self, key: &T::SecKey) -> usize {
        self.as_view().count(key)
    }

    pub fn len(&self) -> usize {
        self.as_view().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_view().is_empty()
    }

    /// Erase every record projecting to `key`. Returns how many.
    pub fn remove(&mut self, key: &T::SecKey) -> usize {
        self.mi.remove_by::<T, I>(key)
    }

    /// [`MultiIndex::modify`] through this view.
    pub fn modify<F: FnOnce(&mut P)>(&mut self, h: HandleOf<K, P, Pol>, f: F) -> bool
    where
        P: Clone,
    {
        self.mi.modify(h, f)
    }

    /// [`MultiIndex::replace`] through this view.
    pub fn replace(&mut self, h: HandleOf<K, P, Pol>, value: P) -> bool
    where
        P: Clone + PartialEq,
    {
        self.mi.replace(h, value)
    }
}
