//! Pattern recognition over text spans (spec §4.B `recognize_pattern`).

use serde::{Deserialize, Serialize};

use crate::core::clamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternKind {
    SelfSimilarity,
    Depth,
    Complexity,
    PhiResonance,
}

impl PatternKind {
    pub const ALL: [PatternKind; 4] = [
        PatternKind::SelfSimilarity,
        PatternKind::Depth,
        PatternKind::Complexity,
        PatternKind::PhiResonance,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub kind: PatternKind,
    pub score: f64,
}

/// Floor below which a pattern is not reported (spec §4.B: "detected
/// patterns" implies a minimum signal).
const REPORT_FLOOR: f64 = 0.15;

fn spans(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

fn jaccard_overlap(a: &[&str], b: &[&str]) -> f64 {
    use std::collections::HashSet;
    let set_a: HashSet<&str> = a.iter().copied().collect();
    let set_b: HashSet<&str> = b.iter().copied().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    intersection / union
}

fn self_similarity(span_list: &[&str]) -> f64 {
    if span_list.len() < 2 {
        return 0.0;
    }
    let mid = span_list.len() / 2;
    jaccard_overlap(&span_list[..mid], &span_list[mid..])
}

fn complexity(span_list: &[&str]) -> f64 {
    if span_list.is_empty() {
        return 0.0;
    }
    use std::collections::HashSet;
    let distinct: HashSet<&str> = span_list.iter().copied().collect();
    distinct.len() as f64 / span_list.len() as f64
}

fn depth_score(span_list: &[&str]) -> f64 {
    // Normalize span count against a soft ceiling of 40 spans.
    clamp(span_list.len() as f64 / 40.0, 0.0, 1.0)
}

fn phi_resonance(self_sim: f64, complexity: f64, depth: f64) -> f64 {
    // Same weighted-mean shape the phi-calculator uses for its own blend.
    0.4 * self_sim + 0.3 * complexity + 0.3 * depth
}

/// Computes all four quantities over `text` and returns the ones requested
/// by `pattern_kind` (or all of them when `None`) whose score clears the
/// reporting floor.
pub fn recognize(text: &str, pattern_kind: Option<PatternKind>) -> Vec<DetectedPattern> {
    let span_list = spans(text);
    let self_sim = self_similarity(&span_list);
    let cplx = complexity(&span_list);
    let depth = depth_score(&span_list);
    let resonance = phi_resonance(self_sim, cplx, depth);

    let scores = [
        (PatternKind::SelfSimilarity, self_sim),
        (PatternKind::Depth, depth),
        (PatternKind::Complexity, cplx),
        (PatternKind::PhiResonance, resonance),
    ];

    scores
        .into_iter()
        .filter(|(kind, score)| {
            *score >= REPORT_FLOOR && pattern_kind.map(|pk| pk == *kind).unwrap_or(true)
        })
        .map(|(kind, score)| DetectedPattern { kind, score })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_no_patterns() {
        assert!(recognize("", None).is_empty());
    }

    #[test]
    fn repetitive_text_scores_high_self_similarity() {
        let patterns = recognize("alpha beta alpha beta alpha beta alpha beta", None);
        let self_sim = patterns
            .iter()
            .find(|p| p.kind == PatternKind::SelfSimilarity)
            .expect("self-similarity pattern present");
        assert!(self_sim.score > 0.5);
    }

    #[test]
    fn filters_by_requested_kind() {
        let patterns = recognize(
            "the quick brown fox jumps over the lazy dog repeatedly and again",
            Some(PatternKind::Complexity),
        );
        assert!(patterns.iter().all(|p| p.kind == PatternKind::Complexity));
    }
}
