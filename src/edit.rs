//! Buffered single-key editing for unique primaries.

use crate::index_map::{IndexKey, UniqueMapFamily};
use crate::index_spec::IndexTuple;
use crate::multi_index::{HandleOf, MultiIndex};
use crate::policy::Policy;
use core::ops::{Deref, DerefMut};

/// RAII edit of the record under one key.
///
/// The proxy buffers a copy of the current payload (or a default for an
/// absent key); edits go to the buffer. [`commit`](EditProxy::commit)
/// applies the buffer through the regular insert/revive/replace paths and
/// reports success. Dropping an uncommitted proxy commits and discards
/// the outcome; call `commit` directly when the result matters.
pub struct EditProxy<'a, K, P, Pol, Prim, Secs>
where
    K: IndexKey,
    P: Clone,
    Pol: Policy<K, P>,
    Prim: UniqueMapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef>,
{
    mi: &'a mut MultiIndex<K, P, Pol, Prim, Secs>,
    key: K,
    buf: Option<P>,
    target: Option<HandleOf<K, P, Pol>>,
    committed: bool,
}

impl<'a, K, P, Pol, Prim, Secs> EditProxy<'a, K, P, Pol, Prim, Secs>
where
    K: IndexKey,
    P: Clone,
    Pol: Policy<K, P>,
    Prim: UniqueMapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef>,
{
    pub(crate) fn new(
        mi: &'a mut MultiIndex<K, P, Pol, Prim, Secs>,
        key: K,
        buf: P,
        target: Option<HandleOf<K, P, Pol>>,
    ) -> Self {
        Self {
            mi,
            key,
            buf: Some(buf),
            target,
            committed: false,
        }
    }

    /// Apply the buffered payload: insert for a new key, revive for a
    /// dead record, replace for a live one. `false` on a uniqueness
    /// rejection anywhere; the container is then unchanged.
    pub fn commit(mut self) -> bool {
        self.run_commit()
    }

    /// Discard the buffer without touching the container.
    pub fn abort(mut self) {
        self.committed = true;
        self.buf = None;
    }

    fn run_commit(&mut self) -> bool {
        if self.committed {
            return true;
        }
        self.committed = true;
        let payload = self.buf.take().expect("buffer present until commit");
        match self.target {
            Some(h) if self.mi.is_dead(h) == Some(false) => {
                self.mi.modify(h, move |dst| *dst = payload)
            }
            _ => self.mi.insert(self.key.clone(), payload).is_ok(),
        }
    }
}

impl<K, P, Pol, Prim, Secs> Deref for EditProxy<'_, K, P, Pol, Prim, Secs>
where
    K: IndexKey,
    P: Clone,
    Pol: Policy<K, P>,
    Prim: UniqueMapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef>,
{
    type Target = P;

    fn deref(&self) -> &P {
        self.buf.as_ref().expect("buffer present until commit")
    }
}

impl<K, P, Pol, Prim, Secs> DerefMut for EditProxy<'_, K, P, Pol, Prim, Secs>
where
    K: IndexKey,
    P: Clone,
    Pol: Policy<K, P>,
    Prim: UniqueMapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef>,
{
    fn deref_mut(&mut self) -> &mut P {
        self.buf.as_mut().expect("buffer present until commit")
    }
}

impl<K, P, Pol, Prim, Secs> Drop for EditProxy<'_, K, P, Pol, Prim, Secs>
where
    K: IndexKey,
    P: Clone,
    Pol: Policy<K, P>,
    Prim: UniqueMapFamily,
    Secs: IndexTuple<K, P, Pol::SecRef>,
{
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.run_commit();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::index_map::{HashUnique, OrdUnique};
    use crate::index_spec::IndexSpec;
    use crate::multi_index::MultiIndex;
    use crate::policy::StableNode;

    struct ByText;
    impl IndexSpec<u32, String> for ByText {
        type Family = HashUnique;
        type SecKey = String;
        fn project(_key: &u32, payload: &String) -> String {
            payload.clone()
        }
    }

    type M = MultiIndex<u32, String, StableNode, OrdUnique, (ByText,)>;

    /// New key: commit inserts and reports success.
    #[test]
    fn commit_inserts_new_key() {
        let mut m = M::new();
        let mut e = m.entry(5);
        *e = "five".to_string();
        assert!(e.commit());
        assert_eq!(m.find(&5).unwrap().payload(&m), Some(&"five".to_string()));
        m.check_invariants().unwrap();
    }

    /// Existing key: the buffer starts from the current payload and commit
    /// replaces in place.
    #[test]
    fn commit_replaces_existing() {
        let mut m = M::new();
        m.insert(1, "one".to_string()).unwrap();
        let mut e = m.entry(1);
        assert_eq!(&*e, "one");
        e.push_str("!");
        assert!(e.commit());
        assert_eq!(m.find(&1).unwrap().payload(&m), Some(&"one!".to_string()));
        assert_eq!(m.len(), 1);
        m.check_invariants().unwrap();
    }

    /// A commit that violates a unique secondary reports failure and
    /// leaves everything unchanged.
    #[test]
    fn failed_commit_is_a_rollback() {
        let mut m = M::new();
        m.insert(1, "taken".to_string()).unwrap();
        m.insert(2, "other".to_string()).unwrap();
        let mut e = m.entry(2);
        *e = "taken".to_string();
        assert!(!e.commit());
        assert_eq!(m.find(&2).unwrap().payload(&m), Some(&"other".to_string()));
        m.check_invariants().unwrap();
    }

    /// Dropping without commit applies the edit; abort discards it.
    #[test]
    fn drop_commits_and_abort_discards() {
        let mut m = M::new();
        m.insert(1, "a".to_string()).unwrap();
        {
            let mut e = m.entry(1);
            *e = "b".to_string();
        }
        assert_eq!(m.find(&1).unwrap().payload(&m), Some(&"b".to_string()));

        let mut e = m.entry(1);
        *e = "c".to_string();
        e.abort();
        assert_eq!(m.find(&1).unwrap().payload(&m), Some(&"b".to_string()));
        m.check_invariants().unwrap();
    }
}
