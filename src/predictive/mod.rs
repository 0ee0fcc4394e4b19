//! Predictive Analyzer (spec §4.E): computes short-lived predictions for
//! follow-up needs. Idempotent and side-effect-free beyond a bounded LRU
//! of recent `(history, prediction)` pairs used only to compute hit-rate
//! (spec: "the analyzer itself has no hidden state beyond" that LRU).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::core::clamp;

const LRU_CAPACITY: usize = 256;
const MAX_PREDICTIONS: usize = 5;

/// A small closed set of prediction kinds (SPEC_FULL §4.E): enough to
/// exercise "up to five predictions" without an open-ended taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredictionKind {
    FollowUpQuestion,
    ClarificationNeeded,
    TopicShift,
    TaskContinuation,
    NoFurtherAction,
}

impl PredictionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PredictionKind::FollowUpQuestion => "follow-up-question",
            PredictionKind::ClarificationNeeded => "clarification-needed",
            PredictionKind::TopicShift => "topic-shift",
            PredictionKind::TaskContinuation => "task-continuation",
            PredictionKind::NoFurtherAction => "no-further-action",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub kind: PredictionKind,
    pub probability: f64,
    pub precomputed_response: Option<String>,
}

fn history_hash(history: &[String], current: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    for turn in history {
        turn.hash(&mut hasher);
    }
    current.hash(&mut hasher);
    hasher.finish()
}

const CONTINUATION_MARKERS: &[&str] = &["and then", "next", "after that", "once that's done"];
const CLARIFICATION_MARKERS: &[&str] = &["what do you mean", "which one", "not sure", "unclear"];

/// `predict` is a pure heuristic over `(history, current)`; the analyzer's
/// own mutable state is limited to the hit-rate bookkeeping the
/// orchestrator feeds back via [`PredictiveAnalyzer::record_outcome`].
pub struct PredictiveAnalyzer {
    cache: Mutex<LruCache<u64, Vec<Prediction>>>,
    hits: Mutex<(u64, u64)>,
}

impl PredictiveAnalyzer {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(LRU_CAPACITY).unwrap(),
            )),
            hits: Mutex::new((0, 0)),
        }
    }

    pub fn predict(&self, history: &[String], current: &str) -> Vec<Prediction> {
        let key = history_hash(history, current);
        if let Some(cached) = self.cache.lock().unwrap().get(&key) {
            return cached.clone();
        }

        let lowered = current.to_lowercase();
        let mut predictions = Vec::new();

        if current.trim_end().ends_with('?') {
            predictions.push(Prediction {
                kind: PredictionKind::FollowUpQuestion,
                probability: 0.75,
                precomputed_response: None,
            });
        }

        if CLARIFICATION_MARKERS.iter().any(|m| lowered.contains(m)) {
            predictions.push(Prediction {
                kind: PredictionKind::ClarificationNeeded,
                probability: 0.7,
                precomputed_response: None,
            });
        }

        if CONTINUATION_MARKERS.iter().any(|m| lowered.contains(m)) {
            predictions.push(Prediction {
                kind: PredictionKind::TaskContinuation,
                probability: 0.65,
                precomputed_response: None,
            });
        }

        if let Some(last) = history.last() {
            let overlap = token_overlap(last, current);
            if overlap < 0.1 && !last.trim().is_empty() {
                predictions.push(Prediction {
                    kind: PredictionKind::TopicShift,
                    probability: clamp(0.6 - overlap, 0.0, 1.0),
                    precomputed_response: None,
                });
            }
        }

        if predictions.is_empty() {
            predictions.push(Prediction {
                kind: PredictionKind::NoFurtherAction,
                probability: 0.5,
                precomputed_response: None,
            });
        }

        predictions.sort_by(|a, b| b.probability.partial_cmp(&a.probability).unwrap());
        predictions.truncate(MAX_PREDICTIONS);

        self.cache.lock().unwrap().put(key, predictions.clone());
        predictions
    }

    /// Fed back by the orchestrator once the real follow-up (or its
    /// absence) is known, to compute the hit-rate used in confidence
    /// weighting (spec §4.G step 5).
    pub fn record_outcome(&self, hit: bool) {
        let mut hits = self.hits.lock().unwrap();
        hits.1 += 1;
        if hit {
            hits.0 += 1;
        }
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.lock().unwrap();
        if hits.1 == 0 {
            0.5
        } else {
            hits.0 as f64 / hits.1 as f64
        }
    }
}

impl Default for PredictiveAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn token_overlap(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;
    let set_a: HashSet<String> = a.split_whitespace().map(|t| t.to_lowercase()).collect();
    let set_b: HashSet<String> = b.split_whitespace().map(|t| t.to_lowercase()).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicts_up_to_five() {
        let analyzer = PredictiveAnalyzer::new();
        let predictions = analyzer.predict(&[], "What do you mean? And then what next after that?");
        assert!(predictions.len() <= MAX_PREDICTIONS);
        assert!(!predictions.is_empty());
    }

    #[test]
    fn is_idempotent_for_same_inputs() {
        let analyzer = PredictiveAnalyzer::new();
        let history = vec!["tell me about rust".to_string()];
        let a = analyzer.predict(&history, "what about ownership?");
        let b = analyzer.predict(&history, "what about ownership?");
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.kind, y.kind);
            assert_eq!(x.probability, y.probability);
        }
    }

    #[test]
    fn question_mark_predicts_follow_up() {
        let analyzer = PredictiveAnalyzer::new();
        let predictions = analyzer.predict(&[], "How does this work?");
        assert!(predictions.iter().any(|p| p.kind == PredictionKind::FollowUpQuestion));
    }

    #[test]
    fn hit_rate_defaults_to_half_with_no_observations() {
        let analyzer = PredictiveAnalyzer::new();
        assert_eq!(analyzer.hit_rate(), 0.5);
        analyzer.record_outcome(true);
        analyzer.record_outcome(false);
        assert_eq!(analyzer.hit_rate(), 0.5);
    }
}
