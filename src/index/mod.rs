//! Index structures and their compile-and-load lifecycle.
//!
//! Two index shapes exist, both built per page from a snapshot of that
//! page's records and both serializable to C source:
//! - [`BTreeIndex`] - ordered, supports exact and range lookups
//! - [`HashIndex`] - chained buckets, exact lookups only
//!
//! The [`IndexManager`] keeps the per-table registry, rebuilds indices
//! whenever their page is recompiled, and loads the compiled artifacts
//! for querying.

mod btree;
mod hash;
mod key;
mod manager;

pub use btree::BTreeIndex;
pub use hash::HashIndex;
pub use key::{IndexKey, KeyType};
pub use manager::{IndexDefinition, IndexKind, IndexManager, LoadedIndex};
