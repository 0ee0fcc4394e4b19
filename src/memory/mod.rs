//! Fractal Memory (spec §4.B): four-kind typed tree {Root, Branch, Leaf,
//! Seed} persisted through the Persistence Store, with bidirectional
//! parent/child links and hierarchy invariants.

mod node;
mod pattern;
mod store;

pub use node::{MemoryNode, NodeKind};
pub use pattern::{DetectedPattern, PatternKind};
pub use store::FractalMemory;
