//! Fractal Memory (spec §4.B): four-layer typed tree over the persistence
//! store, enforcing the hierarchy rule and bidirectional parent/child links.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::core::{clamp, CoreError, MetaValue, Result, StateError};
use crate::memory::node::{MemoryNode, NodeKind};
use crate::memory::pattern::{self, DetectedPattern, PatternKind};
use crate::store::PersistenceStore;

const DEFAULT_RETRIEVE_LIMIT: usize = 10;
const CONTENT_WEIGHT: f64 = 0.7;
const RESONANCE_WEIGHT: f64 = 0.3;
const ANCESTOR_DECAY: f64 = 0.85;

fn generate_id(kind: NodeKind) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}_{}", kind.id_tag(), &hex[..12])
}

fn kind_from_id(id: &str) -> Option<NodeKind> {
    let tag = id.split('_').next()?;
    match tag {
        "root" => Some(NodeKind::Root),
        "branch" => Some(NodeKind::Branch),
        "leaf" => Some(NodeKind::Leaf),
        "seed" => Some(NodeKind::Seed),
        _ => None,
    }
}

pub struct FractalMemory {
    store: Arc<PersistenceStore>,
}

impl FractalMemory {
    pub fn new(store: Arc<PersistenceStore>) -> Self {
        Self { store }
    }

    fn load(&self, id: &str) -> Result<Option<MemoryNode>> {
        let kind = match kind_from_id(id) {
            Some(kind) => kind,
            None => return Ok(None),
        };
        self.store.get(kind.store_kind(), id)
    }

    /// Allocates and persists a new node, validating the hierarchy rule and
    /// establishing the bidirectional parent link under the store's
    /// exclusive lock.
    pub fn store(
        &self,
        kind: NodeKind,
        content: impl Into<String>,
        metadata: HashMap<String, MetaValue>,
        parent: Option<&str>,
    ) -> Result<String> {
        let content = content.into();

        self.store.atomic(|| {
            let parent_node = match (kind, parent) {
                (NodeKind::Root, Some(_)) => {
                    return Err(CoreError::State(StateError::HierarchyViolation(
                        "Root nodes cannot have a parent".into(),
                    )))
                }
                (NodeKind::Root, None) => None,
                (_, None) => {
                    return Err(CoreError::State(StateError::MissingParent(
                        "non-Root node requires a parent id".into(),
                    )))
                }
                (_, Some(parent_id)) => {
                    let node = self.load(parent_id)?.ok_or_else(|| {
                        CoreError::State(StateError::MissingParent(parent_id.to_string()))
                    })?;
                    Some(node)
                }
            };

            if let Some(ref parent_node) = parent_node {
                if !parent_node.kind.allows_child(kind) {
                    return Err(CoreError::State(StateError::HierarchyViolation(format!(
                        "{:?} cannot parent {:?}",
                        parent_node.kind, kind
                    ))));
                }
            }

            let id = generate_id(kind);
            let mut node = MemoryNode::new(id.clone(), kind, content, parent.map(str::to_string));
            node.metadata = metadata;

            if let Some(mut parent_node) = parent_node {
                parent_node.children.push(id.clone());
                self.store
                    .put(parent_node.kind.store_kind(), &parent_node.id.clone(), &parent_node)?;
            }

            self.store.put(kind.store_kind(), &id, &node)?;
            Ok(id)
        })
    }

    /// Ranked retrieval: token-overlap similarity against `query` blended
    /// with phi-resonance, optionally filtered by `kind`, expanding matches
    /// up to `depth` ancestry hops (spec §4.B).
    pub fn retrieve(
        &self,
        query: &str,
        kind: Option<NodeKind>,
        depth: usize,
    ) -> Result<Vec<MemoryNode>> {
        let kinds: Vec<NodeKind> = match kind {
            Some(k) => vec![k],
            None => vec![NodeKind::Root, NodeKind::Branch, NodeKind::Leaf, NodeKind::Seed],
        };

        let mut scored: HashMap<String, (f64, MemoryNode)> = HashMap::new();

        for k in kinds {
            for entry in self.store.list(k.store_kind())? {
                let Some(node) = self.load(&entry.id)? else { continue };
                let score = self.score(query, &node);
                self.insert_scored(&mut scored, node.clone(), score);
                if score > 0.0 {
                    self.expand_ancestors(&node, score, depth, &mut scored)?;
                }
            }
        }

        let mut results: Vec<(f64, MemoryNode)> = scored.into_values().collect();
        results.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(DEFAULT_RETRIEVE_LIMIT);
        Ok(results.into_iter().map(|(_, node)| node).collect())
    }

    fn score(&self, query: &str, node: &MemoryNode) -> f64 {
        let query_tokens: Vec<&str> = query.split_whitespace().collect();
        let content_tokens: Vec<&str> = node.content.split_whitespace().collect();
        let similarity = jaccard(&query_tokens, &content_tokens);
        CONTENT_WEIGHT * similarity + RESONANCE_WEIGHT * node.resonance
    }

    fn insert_scored(&self, scored: &mut HashMap<String, (f64, MemoryNode)>, node: MemoryNode, score: f64) {
        scored
            .entry(node.id.clone())
            .and_modify(|(existing, _)| {
                if score > *existing {
                    *existing = score;
                }
            })
            .or_insert((score, node));
    }

    fn expand_ancestors(
        &self,
        node: &MemoryNode,
        base_score: f64,
        depth: usize,
        scored: &mut HashMap<String, (f64, MemoryNode)>,
    ) -> Result<()> {
        let mut current = node.parent.clone();
        let mut hop = 1;
        while let (Some(parent_id), true) = (current, hop <= depth) {
            let Some(parent_node) = self.load(&parent_id)? else { break };
            let decayed = base_score * ANCESTOR_DECAY.powi(hop as i32);
            current = parent_node.parent.clone();
            self.insert_scored(scored, parent_node, decayed);
            hop += 1;
        }
        Ok(())
    }

    pub fn recognize_pattern(&self, text: &str, pattern_kind: Option<PatternKind>) -> Vec<DetectedPattern> {
        pattern::recognize(text, pattern_kind)
    }

    /// Total invariant check used by tests (spec §4.B, §8 invariants 1-3).
    pub fn check_invariants(&self) -> Result<()> {
        for kind in [NodeKind::Root, NodeKind::Branch, NodeKind::Leaf, NodeKind::Seed] {
            for entry in self.store.list(kind.store_kind())? {
                let node = self.load(&entry.id)?.ok_or_else(|| {
                    CoreError::State(StateError::MissingParent(format!(
                        "indexed id {} has no blob",
                        entry.id
                    )))
                })?;

                if node.kind != kind {
                    return Err(CoreError::System(crate::core::SystemError::InternalInvariant(
                        format!("node {} indexed under wrong kind", node.id),
                    )));
                }

                match (kind, &node.parent) {
                    (NodeKind::Root, None) => {}
                    (NodeKind::Root, Some(_)) => {
                        return Err(CoreError::State(StateError::HierarchyViolation(format!(
                            "root {} has a parent",
                            node.id
                        ))))
                    }
                    (_, None) => {
                        return Err(CoreError::State(StateError::MissingParent(node.id.clone())))
                    }
                    (_, Some(parent_id)) => {
                        let parent = self.load(parent_id)?.ok_or_else(|| {
                            CoreError::State(StateError::MissingParent(parent_id.clone()))
                        })?;
                        if !parent.kind.allows_child(node.kind) {
                            return Err(CoreError::State(StateError::HierarchyViolation(format!(
                                "{:?} parents {:?} ({})",
                                parent.kind, node.kind, node.id
                            ))));
                        }
                        if !parent.children.iter().any(|c| c == &node.id) {
                            return Err(CoreError::System(
                                crate::core::SystemError::InternalInvariant(format!(
                                    "parent {} does not list child {}",
                                    parent_id, node.id
                                )),
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<MemoryNode>> {
        self.load(id)
    }

    /// Returns the id of a Branch node suitable for hanging conversational
    /// Leaf nodes off, creating the Root/Branch pair on first use. The
    /// orchestrator calls this once per interaction rather than growing a
    /// new Root/Branch pair per request.
    pub fn ensure_conversation_branch(&self) -> Result<String> {
        self.ensure_branch_under_new_root("conversation memory root", "conversation history")
    }

    /// Returns the id of a Leaf node suitable for hanging security
    /// incident Seed nodes off, creating the Root/Branch/Leaf chain on
    /// first use.
    pub fn ensure_incident_leaf(&self) -> Result<String> {
        let branch = self.ensure_branch_under_new_root("conversation memory root", "conversation history")?;
        for entry in self.store.list(NodeKind::Leaf.store_kind())? {
            if let Some(node) = self.load(&entry.id)? {
                if node.parent.as_deref() == Some(branch.as_str()) && node.content == "security incident log" {
                    return Ok(node.id);
                }
            }
        }
        self.store(NodeKind::Leaf, "security incident log", HashMap::new(), Some(&branch))
    }

    /// Samples up to `n` nodes spread evenly across all kinds and across
    /// each kind's index, used by `insight_emerge` (spec §4.H). Stride
    /// sampling rather than randomness keeps retrieval deterministic and
    /// avoids a dependency purely for this one tool.
    pub fn sample_across_kinds(&self, n: usize) -> Result<Vec<MemoryNode>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let kinds = [NodeKind::Root, NodeKind::Branch, NodeKind::Leaf, NodeKind::Seed];
        let mut all_ids = Vec::new();
        for kind in kinds {
            for entry in self.store.list(kind.store_kind())? {
                all_ids.push(entry.id);
            }
        }
        if all_ids.is_empty() {
            return Ok(Vec::new());
        }
        let stride = (all_ids.len() as f64 / n as f64).ceil().max(1.0) as usize;
        let mut out = Vec::new();
        let mut idx = 0;
        while idx < all_ids.len() && out.len() < n {
            if let Some(node) = self.load(&all_ids[idx])? {
                out.push(node);
            }
            idx += stride;
        }
        Ok(out)
    }

    /// The `limit` most recently stored Leaf nodes' content, oldest first —
    /// used by the orchestrator as a lightweight conversation history for
    /// the Predictive Analyzer (spec §4.E `predict(history, current)`).
    pub fn recent_leaves(&self, limit: usize) -> Result<Vec<String>> {
        let entries = self.store.list(NodeKind::Leaf.store_kind())?;
        let start = entries.len().saturating_sub(limit);
        let mut out = Vec::new();
        for entry in &entries[start..] {
            if let Some(node) = self.load(&entry.id)? {
                out.push(node.content);
            }
        }
        Ok(out)
    }

    fn ensure_branch_under_new_root(&self, root_content: &str, branch_content: &str) -> Result<String> {
        let root_id = match self.store.list(NodeKind::Root.store_kind())?.into_iter().next() {
            Some(entry) => entry.id,
            None => self.store(NodeKind::Root, root_content, HashMap::new(), None)?,
        };
        match self.store.list(NodeKind::Branch.store_kind())?.into_iter().next() {
            Some(entry) => Ok(entry.id),
            None => self.store(NodeKind::Branch, branch_content, HashMap::new(), Some(&root_id)),
        }
    }
}

fn jaccard(a: &[&str], b: &[&str]) -> f64 {
    use std::collections::HashSet;
    let set_a: HashSet<String> = a.iter().map(|s| s.to_lowercase()).collect();
    let set_b: HashSet<String> = b.iter().map(|s| s.to_lowercase()).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    clamp(intersection / union, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> (tempfile::TempDir, FractalMemory) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PersistenceStore::open(dir.path()).unwrap());
        (dir, FractalMemory::new(store))
    }

    #[test]
    fn store_root_then_branch_then_leaf_then_seed() {
        let (_dir, memory) = memory();
        let root = memory.store(NodeKind::Root, "root content", HashMap::new(), None).unwrap();
        let branch = memory
            .store(NodeKind::Branch, "branch content", HashMap::new(), Some(&root))
            .unwrap();
        let leaf = memory
            .store(NodeKind::Leaf, "leaf content", HashMap::new(), Some(&branch))
            .unwrap();
        let seed = memory
            .store(NodeKind::Seed, "seed content", HashMap::new(), Some(&leaf))
            .unwrap();

        memory.check_invariants().unwrap();
        assert!(seed.starts_with("seed_"));
    }

    #[test]
    fn rejects_hierarchy_violation() {
        let (_dir, memory) = memory();
        let root = memory.store(NodeKind::Root, "root", HashMap::new(), None).unwrap();
        let err = memory.store(NodeKind::Seed, "bad seed", HashMap::new(), Some(&root));
        assert!(matches!(err, Err(CoreError::State(StateError::HierarchyViolation(_)))));
    }

    #[test]
    fn rejects_missing_parent() {
        let (_dir, memory) = memory();
        let err = memory.store(NodeKind::Branch, "orphan", HashMap::new(), Some("root_doesnotexist"));
        assert!(matches!(err, Err(CoreError::State(StateError::MissingParent(_)))));
    }

    #[test]
    fn parent_lists_child_after_store() {
        let (_dir, memory) = memory();
        let root = memory.store(NodeKind::Root, "root", HashMap::new(), None).unwrap();
        let branch = memory
            .store(NodeKind::Branch, "branch", HashMap::new(), Some(&root))
            .unwrap();
        let root_node = memory.get(&root).unwrap().unwrap();
        assert!(root_node.children.contains(&branch));
    }

    #[test]
    fn retrieve_ranks_by_content_overlap() {
        let (_dir, memory) = memory();
        let root = memory.store(NodeKind::Root, "root", HashMap::new(), None).unwrap();
        memory
            .store(NodeKind::Branch, "golden ratio phi convergence", HashMap::new(), Some(&root))
            .unwrap();
        memory
            .store(NodeKind::Branch, "completely unrelated text about weather", HashMap::new(), Some(&root))
            .unwrap();

        let results = memory.retrieve("golden ratio phi", None, 1).unwrap();
        assert!(!results.is_empty());
        assert!(results[0].content.contains("golden ratio"));
    }
}
