//! Opaque, non-owning record identity.

use crate::index_map::{IndexKey, MapFamily};
use crate::index_spec::IndexTuple;
use crate::multi_index::MultiIndex;
use crate::policy::Policy;
use core::fmt;
use core::hash::Hash;

/// Non-owning reference to a record.
///
/// The representation is chosen by the policy (stable slot key, dense
/// position, ordinal, or a value resolved from a primary key) and never
/// leaks into client code. A handle identifies the same logical record
/// for as long as that record is physically present: tombstoned records
/// stay readable through their handles, and translation-array handles
/// survive relocations. After a record is physically removed, its handles
/// either stop resolving (stable policies, out-of-range ordinals) or may
/// alias a different record; resolving them is a logic error, never
/// memory-unsafe.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle<R>(R);

impl<R: Copy + Eq + Hash + fmt::Debug> Handle<R> {
    pub(crate) fn new(raw: R) -> Self {
        Handle(raw)
    }

    pub(crate) fn raw(&self) -> R {
        self.0
    }

    /// Key of the record, dead or live.
    pub fn key<'a, K, P, Pol, Prim, Secs>(
        &self,
        mi: &'a MultiIndex<K, P, Pol, Prim, Secs>,
    ) -> Option<&'a K>
    where
        K: IndexKey,
        Pol: Policy<K, P, Raw = R>,
        Prim: MapFamily,
        Secs: IndexTuple<K, P, Pol::SecRef>,
    {
        mi.handle_key(*self)
    }

    /// Payload of the record, dead or live.
    pub fn payload<'a, K, P, Pol, Prim, Secs>(
        &self,
        mi: &'a MultiIndex<K, P, Pol, Prim, Secs>,
    ) -> Option<&'a P>
    where
        K: IndexKey,
        Pol: Policy<K, P, Raw = R>,
        Prim: MapFamily,
        Secs: IndexTuple<K, P, Pol::SecRef>,
    {
        mi.handle_payload(*self)
    }

    /// Whether the record is tombstoned. `None` when the handle no longer
    /// resolves.
    pub fn is_dead<K, P, Pol, Prim, Secs>(
        &self,
        mi: &MultiIndex<K, P, Pol, Prim, Secs>,
    ) -> Option<bool>
    where
        K: IndexKey,
        Pol: Policy<K, P, Raw = R>,
        Prim: MapFamily,
        Secs: IndexTuple<K, P, Pol::SecRef>,
    {
        mi.is_dead(*self)
    }
}
