//! Persistence Store (spec §4.A): durable mapping from a typed identifier
//! to a JSON blob, with per-kind ordered indices and a process-wide
//! exclusive lock for multi-node operations.

mod persistence;

pub use persistence::{IndexEntry, PersistenceStore};
