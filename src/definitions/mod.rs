//! Definitions module.
//!
//! This module holds the definitions snapshot types and the identity index
//! the diff engine works on:
//! - Snapshot and record types
//! - Content-addressed record sets
//! - Identity indexing (with ignore lists)
//! - Canonical JSON and snapshot fingerprints

mod types;
mod set;
mod index;
mod hash;

pub use types::{Definitions, Record, ResourceKind, ResourceMap, ResourceSelector};
pub use set::ContentSet;
pub use index::{DefinitionsIndex, Identity};
pub use hash::{canonical_json, DefinitionsHasher};
