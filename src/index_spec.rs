//! Compile-time index descriptions and the secondary-index tuple.
//!
//! Each secondary is described by an [`IndexSpec`]: a container family, a
//! secondary key type, and a projection over the record. The spec type
//! doubles as the tag used to address the index
//! (`container.view::<ByName, _>()`).
//!
//! A tuple of specs implements [`IndexTuple`], which runs the coherence
//! bulk operations across every secondary in declaration order:
//! `add_all` with prefix rollback on a unique conflict, infallible
//! `drop_all`, and `patch_all` for relocation repair.

use crate::index_map::{IndexMap, MapFamily, RefValue};

/// Description of one secondary index.
///
/// The projection always receives both the primary key and the payload;
/// implementations depending on only one simply ignore the other.
pub trait IndexSpec<K, P> {
    type Family: MapFamily;
    type SecKey: crate::index_map::IndexKey;

    fn project(key: &K, payload: &P) -> Self::SecKey;
}

/// Concrete map type a spec's family produces for stored references `R`.
pub type SpecMap<S, K, P, R> =
    <<S as IndexSpec<K, P>>::Family as MapFamily>::Map<<S as IndexSpec<K, P>>::SecKey, R>;

/// Bulk operations over every secondary of a container. Implemented for
/// tuples of [`IndexSpec`]s up to arity six.
pub trait IndexTuple<K, P, R: RefValue> {
    /// Tuple of concrete secondary maps.
    type Maps: Default;

    /// Insert `stored` into every secondary in declaration order. A
    /// unique-secondary conflict removes the entries inserted so far and
    /// returns `false`, leaving the maps exactly as before the call.
    fn add_all(maps: &mut Self::Maps, key: &K, payload: &P, stored: &R) -> bool;

    /// Remove the record's entry from every secondary. Must not fail: a
    /// missing entry is a bookkeeping breach upstream.
    fn drop_all(maps: &mut Self::Maps, key: &K, payload: &P, stored: &R);

    /// Rewrite the record's entry in every secondary from `old` to `new`
    /// after a relocation.
    fn patch_all(maps: &mut Self::Maps, key: &K, payload: &P, old: &R, new: &R);

    fn clear_all(maps: &mut Self::Maps);
    fn reserve_all(maps: &mut Self::Maps, additional: usize);
    fn total_entries(maps: &Self::Maps) -> usize;

    /// True when the record appears exactly `expected` times in each
    /// secondary. Diagnostics for the consistency checker.
    fn stored_times(maps: &Self::Maps, key: &K, payload: &P, stored: &R, expected: usize) -> bool;

    /// True when every entry in every secondary resolves through `lookup`
    /// to a record whose projection reproduces the entry's key.
    fn entries_consistent<'e>(
        maps: &Self::Maps,
        lookup: impl Fn(R) -> Option<(&'e K, &'e P)>,
    ) -> bool
    where
        K: 'e,
        P: 'e;
}

macro_rules! impl_index_tuple {
    ($(($S:ident, $idx:tt)),*) => {
        impl<K, P, R: RefValue, $($S: IndexSpec<K, P>),*> IndexTuple<K, P, R> for ($($S,)*) {
            type Maps = ($(SpecMap<$S, K, P, R>,)*);

            #[allow(unused_variables, unused_mut, unused_assignments)]
            fn add_all(maps: &mut Self::Maps, key: &K, payload: &P, stored: &R) -> bool {
                let mut added = 0usize;
                let ok = loop {
                    $(
                        if !maps.$idx.insert($S::project(key, payload), stored.clone()) {
                            break false;
                        }
                        added += 1;
                    )*
                    break true;
                };
                if !ok {
                    let mut undo = added;
                    $(
                        if undo > 0 {
                            let k = $S::project(key, payload);
                            let removed = maps.$idx.remove_first(&k, |v| v == stored);
                            debug_assert!(removed.is_some(), "rollback entry missing");
                            undo -= 1;
                        }
                    )*
                }
                ok
            }

            #[allow(unused_variables)]
            fn drop_all(maps: &mut Self::Maps, key: &K, payload: &P, stored: &R) {
                $(
                    let k = $S::project(key, payload);
                    let removed = maps.$idx.remove_first(&k, |v| v == stored);
                    debug_assert!(removed.is_some(), "secondary entry missing during drop");
                )*
            }

            #[allow(unused_variables)]
            fn patch_all(maps: &mut Self::Maps, key: &K, payload: &P, old: &R, new: &R) {
                $(
                    let k = $S::project(key, payload);
                    let patched = maps.$idx.replace_first(&k, |v| v == old, new.clone());
                    debug_assert!(patched, "secondary entry missing during relocation patch");
                )*
            }

            #[allow(unused_variables)]
            fn clear_all(maps: &mut Self::Maps) {
                $( maps.$idx.clear(); )*
            }

            #[allow(unused_variables)]
            fn reserve_all(maps: &mut Self::Maps, additional: usize) {
                $( maps.$idx.reserve(additional); )*
            }

            #[allow(unused_variables)]
            fn total_entries(maps: &Self::Maps) -> usize {
                0 $( + maps.$idx.len() )*
            }

            #[allow(unused_variables)]
            fn stored_times(
                maps: &Self::Maps,
                key: &K,
                payload: &P,
                stored: &R,
                expected: usize,
            ) -> bool {
                $(
                    let k = $S::project(key, payload);
                    if maps.$idx.for_key(&k).filter(|v| *v == stored).count() != expected {
                        return false;
                    }
                )*
                true
            }

            #[allow(unused_variables)]
            fn entries_consistent<'e>(
                maps: &Self::Maps,
                lookup: impl Fn(R) -> Option<(&'e K, &'e P)>,
            ) -> bool
            where
                K: 'e,
                P: 'e,
            {
                $(
                    for (skey, r) in maps.$idx.iter() {
                        match lookup(r.clone()) {
                            Some((k, p)) => {
                                if &$S::project(k, p) != skey {
                                    return false;
                                }
                            }
                            None => return false,
                        }
                    }
                )*
                true
            }
        }
    };
}

impl_index_tuple!();
impl_index_tuple!((S0, 0));
impl_index_tuple!((S0, 0), (S1, 1));
impl_index_tuple!((S0, 0), (S1, 1), (S2, 2));
impl_index_tuple!((S0, 0), (S1, 1), (S2, 2), (S3, 3));
impl_index_tuple!((S0, 0), (S1, 1), (S2, 2), (S3, 3), (S4, 4));
impl_index_tuple!((S0, 0), (S1, 1), (S2, 2), (S3, 3), (S4, 4), (S5, 5));

/// Tuple-position markers disambiguating [`HasIndex`] when the same spec
/// type could appear at several positions. Inferred at call sites
/// (`view::<ByName, _>()`).
#[derive(Debug)]
pub struct Idx0;
#[derive(Debug)]
pub struct Idx1;
#[derive(Debug)]
pub struct Idx2;
#[derive(Debug)]
pub struct Idx3;
#[derive(Debug)]
pub struct Idx4;
#[derive(Debug)]
pub struct Idx5;

/// Access to the map of one spec within a tuple, addressed by the spec
/// type itself.
pub trait HasIndex<Tag, I, K, P, R: RefValue>: IndexTuple<K, P, R>
where
    Tag: IndexSpec<K, P>,
{
    fn index(maps: &Self::Maps) -> &SpecMap<Tag, K, P, R>;
    fn index_mut(maps: &mut Self::Maps) -> &mut SpecMap<Tag, K, P, R>;
}

macro_rules! impl_has_index {
    (($($S:ident),+), $T:ident, $I:ty, $idx:tt) => {
        impl<K, P, R: RefValue, $($S: IndexSpec<K, P>),+> HasIndex<$T, $I, K, P, R>
            for ($($S,)+)
        {
            fn index(maps: &Self::Maps) -> &SpecMap<$T, K, P, R> {
                &maps.$idx
            }
            fn index_mut(maps: &mut Self::Maps) -> &mut SpecMap<$T, K, P, R> {
                &mut maps.$idx
            }
        }
    };
}

impl_has_index!((S0), S0, Idx0, 0);

impl_has_index!((S0, S1), S0, Idx0, 0);
impl_has_index!((S0, S1), S1, Idx1, 1);

impl_has_index!((S0, S1, S2), S0, Idx0, 0);
impl_has_index!((S0, S1, S2), S1, Idx1, 1);
impl_has_index!((S0, S1, S2), S2, Idx2, 2);

impl_has_index!((S0, S1, S2, S3), S0, Idx0, 0);
impl_has_index!((S0, S1, S2, S3), S1, Idx1, 1);
impl_has_index!((S0, S1, S2, S3), S2, Idx2, 2);
impl_has_index!((S0, S1, S2, S3), S3, Idx3, 3);

impl_has_index!((S0, S1, S2, S3, S4), S0, Idx0, 0);
impl_has_index!((S0, S1, S2, S3, S4), S1, Idx1, 1);
impl_has_index!((S0, S1, S2, S3, S4), S2, Idx2, 2);
impl_has_index!((S0, S1, S2, S3, S4), S3, Idx3, 3);
impl_has_index!((S0, S1, S2, S3, S4), S4, Idx4, 4);

impl_has_index!((S0, S1, S2, S3, S4, S5), S0, Idx0, 0);
impl_has_index!((S0, S1, S2, S3, S4, S5), S1, Idx1, 1);
impl_has_index!((S0, S1, S2, S3, S4, S5), S2, Idx2, 2);
impl_has_index!((S0, S1, S2, S3, S4, S5), S3, Idx3, 3);
impl_has_index!((S0, S1, S2, S3, S4, S5), S4, Idx4, 4);
impl_has_index!((S0, S1, S2, S3, S4, S5), S5, Idx5, 5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_map::{HashUnique, IndexMap, OrdMulti};

    struct ByLen;
    impl IndexSpec<u32, String> for ByLen {
        type Family = OrdMulti;
        type SecKey = usize;
        fn project(_key: &u32, payload: &String) -> usize {
            payload.len()
        }
    }

    struct ByText;
    impl IndexSpec<u32, String> for ByText {
        type Family = HashUnique;
        type SecKey = String;
        fn project(_key: &u32, payload: &String) -> String {
            payload.clone()
        }
    }

    type Specs = (ByLen, ByText);
    type Maps = <Specs as IndexTuple<u32, String, u64>>::Maps;

    /// Invariant: a unique conflict in a later secondary removes the
    /// entries already placed in earlier ones.
    #[test]
    fn add_all_rolls_back_inserted_prefix() {
        let mut maps = Maps::default();
        let p1 = "same".to_string();
        assert!(<Specs as IndexTuple<u32, String, u64>>::add_all(
            &mut maps, &1, &p1, &11
        ));
        // second record projects to the same ByText key -> conflict
        assert!(!<Specs as IndexTuple<u32, String, u64>>::add_all(
            &mut maps, &2, &p1, &22
        ));
        // ByLen must not retain the rolled-back entry
        assert_eq!(maps.0.for_key(&4).filter(|v| **v == 22).count(), 0);
        assert_eq!(maps.0.len(), 1);
        assert_eq!(maps.1.len(), 1);
    }

    /// Invariant: drop_all removes exactly the record's entries.
    #[test]
    fn drop_all_removes_one_record() {
        let mut maps = Maps::default();
        let p1 = "aa".to_string();
        let p2 = "bb".to_string();
        assert!(<Specs as IndexTuple<u32, String, u64>>::add_all(
            &mut maps, &1, &p1, &11
        ));
        assert!(<Specs as IndexTuple<u32, String, u64>>::add_all(
            &mut maps, &2, &p2, &22
        ));
        <Specs as IndexTuple<u32, String, u64>>::drop_all(&mut maps, &1, &p1, &11);
        // same ByLen key (2), only record 2 remains
        assert_eq!(maps.0.for_key(&2).copied().collect::<Vec<_>>(), vec![22]);
        assert_eq!(
            <Specs as IndexTuple<u32, String, u64>>::total_entries(&maps),
            2
        );
    }

    /// Invariant: patch_all rewrites the stored reference everywhere.
    #[test]
    fn patch_all_rewrites_stored_reference() {
        let mut maps = Maps::default();
        let p = "xyz".to_string();
        assert!(<Specs as IndexTuple<u32, String, u64>>::add_all(
            &mut maps, &1, &p, &11
        ));
        <Specs as IndexTuple<u32, String, u64>>::patch_all(&mut maps, &1, &p, &11, &99);
        assert!(<Specs as IndexTuple<u32, String, u64>>::stored_times(
            &maps, &1, &p, &99, 1
        ));
        assert!(<Specs as IndexTuple<u32, String, u64>>::stored_times(
            &maps, &1, &p, &11, 0
        ));
    }
}
