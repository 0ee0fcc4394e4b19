//! Memory node type and the four-kind hierarchy rule (spec §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{MetaValue, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Root,
    Branch,
    Leaf,
    Seed,
}

impl NodeKind {
    /// The directory / persistence-store "kind" tag for this node kind.
    pub fn store_kind(self) -> &'static str {
        match self {
            NodeKind::Root => "roots",
            NodeKind::Branch => "branches",
            NodeKind::Leaf => "leaves",
            NodeKind::Seed => "seeds",
        }
    }

    /// The lowercase tag used in generated node ids (`<tag>_<hex>`).
    pub fn id_tag(self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Branch => "branch",
            NodeKind::Leaf => "leaf",
            NodeKind::Seed => "seed",
        }
    }

    /// Hierarchy rule (spec §3 invariant iii): Root->Branch,
    /// Branch->{Branch, Leaf}, Leaf->Seed, Seed->nothing.
    pub fn allows_child(self, child: NodeKind) -> bool {
        matches!(
            (self, child),
            (NodeKind::Root, NodeKind::Branch)
                | (NodeKind::Branch, NodeKind::Branch)
                | (NodeKind::Branch, NodeKind::Leaf)
                | (NodeKind::Leaf, NodeKind::Seed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: String,
    pub kind: NodeKind,
    pub content: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    /// phi-resonance in [0, 1].
    pub resonance: f64,
    pub created_at: Timestamp,
    pub metadata: HashMap<String, MetaValue>,
}

impl MemoryNode {
    pub fn new(id: String, kind: NodeKind, content: String, parent: Option<String>) -> Self {
        Self {
            id,
            kind,
            content,
            parent,
            children: Vec::new(),
            resonance: 0.0,
            created_at: crate::core::now(),
            metadata: HashMap::new(),
        }
    }
}
