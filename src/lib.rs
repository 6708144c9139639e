//! A multi-index in-memory container.
//!
//! One logical collection of `(key, payload)` records is owned by a
//! primary index and simultaneously visible through any number of
//! secondary indices keyed by computed projections. Every mutating
//! operation keeps all indices consistent: insertions roll back
//! completely on a uniqueness rejection, updates drop and rebuild the
//! record's secondary entries with restore-on-failure, and erasure either
//! removes or tombstones the record with every index repaired in the same
//! call.
//!
//! The coherence strategy is a pluggable [`Policy`]: node-stable storage
//! with direct references ([`StableNode`]), relocating storage with
//! entry patching ([`UpdatePointer`]) or an ordinal translation array
//! ([`TranslationArray`]), primary-key indirection ([`KeyLookup`]), and
//! tombstoned variants of the relocating flavours.
//!
//! ```
//! use multi_index::{IndexSpec, MultiIndex, OrdMulti, OrdUnique, StableNode};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Employee {
//!     name: String,
//!     department: String,
//! }
//!
//! struct ByDepartment;
//! impl IndexSpec<u32, Employee> for ByDepartment {
//!     type Family = OrdMulti;
//!     type SecKey = String;
//!     fn project(_id: &u32, e: &Employee) -> String {
//!         e.department.clone()
//!     }
//! }
//!
//! let mut staff: MultiIndex<u32, Employee, StableNode, OrdUnique, (ByDepartment,)> =
//!     MultiIndex::new();
//! staff
//!     .insert(1, Employee { name: "Ada".into(), department: "Research".into() })
//!     .unwrap();
//! staff
//!     .insert(2, Employee { name: "Grace".into(), department: "Research".into() })
//!     .unwrap();
//!
//! let by_dept = staff.view::<ByDepartment, _>();
//! assert_eq!(by_dept.count(&"Research".to_string()), 2);
//! let h = by_dept.find(&"Research".to_string()).unwrap();
//! assert_eq!(h.key(&staff), Some(&1));
//! ```

pub mod edit;
pub mod handle;
pub mod index_map;
pub mod index_spec;
pub mod live;
pub mod multi_index;
pub mod policy;
pub mod record;
pub mod store;
pub mod view;

pub use edit::EditProxy;
pub use handle::Handle;
pub use index_map::{
    HashMulti, HashUnique, IndexKey, IndexMap, MapFamily, OrdMulti, OrdUnique, RefValue,
    UniqueMapFamily,
};
pub use index_spec::{HasIndex, IndexSpec, IndexTuple};
pub use live::{AtomicCount, LiveCount, NoCount, PlainCount};
pub use multi_index::{HandleOf, InsertError, MultiIndex};
pub use policy::{
    Compactable, KeyLookup, Policy, StableNode, TranslationArray, TranslationArrayTombstones,
    UpdatePointer, UpdatePointerTombstones,
};
pub use record::{Record, RecordMeta};
pub use store::{DensePos, DenseStore, Moved, SlotStore, Store};
pub use view::{SecView, SecViewMut};
