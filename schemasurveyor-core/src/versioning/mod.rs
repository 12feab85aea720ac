//! Schema fingerprinting and version comparison.
//!
//! A snapshot's fingerprint depends only on its set of field paths and their
//! primary types. Two snapshots of the same source can be diffed to list
//! added, removed and modified fields and to flag breaking changes.

pub mod diff;
pub mod fingerprint;

pub use diff::{
    ChangeRecord, ChangeType, DiffResult, DiffSummary, FieldSummary, VersionIdentity, diff_fields,
    diff_snapshots,
};
pub use fingerprint::schema_hash;
