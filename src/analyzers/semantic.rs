//! Semantic analyzer contract (spec §4.I): `semantic_validate(text,
//! context) -> (coherence in [0,1], issues: list(string))`. Consumed
//! directly by the Validator (§4.F), which treats `coherence` as an
//! opaque input to its approve/reject decision rule.

use std::collections::HashSet;

use crate::core::clamp;

/// Minimal context a semantic check can use: the user's original request,
/// so a reply can be checked for at least superficial topical relevance.
#[derive(Debug, Clone, Default)]
pub struct SemanticContext {
    pub request_text: String,
}

/// Pluggable coherence scorer (spec §4.I: "implementations are pluggable").
pub trait SemanticAnalyzer: Send + Sync {
    fn validate(&self, text: &str, context: &SemanticContext) -> (f64, Vec<String>);
}

const CONTRADICTION_MARKERS: &[&str] = &[
    "but also not",
    "however never",
    "always false",
    "definitely maybe",
    "is and is not",
];

/// Deterministic heuristic: starts at 1.0, deducts for emptiness,
/// degenerate repetition, literal self-contradiction markers, and (when a
/// request is known) zero topical overlap with it.
#[derive(Debug, Default)]
pub struct LexiconSemanticAnalyzer;

impl SemanticAnalyzer for LexiconSemanticAnalyzer {
    fn validate(&self, text: &str, context: &SemanticContext) -> (f64, Vec<String>) {
        let mut coherence = 1.0_f64;
        let mut issues = Vec::new();

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return (0.0, vec!["empty response body".to_string()]);
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let distinct: HashSet<&str> = tokens.iter().copied().collect();
        let repetition_ratio = distinct.len() as f64 / tokens.len() as f64;
        if tokens.len() >= 6 && repetition_ratio < 0.4 {
            coherence -= 0.3;
            issues.push("degenerate repetition".to_string());
        }

        let lowered = trimmed.to_lowercase();
        for marker in CONTRADICTION_MARKERS {
            if lowered.contains(marker) {
                coherence -= 0.4;
                issues.push(format!("self-contradiction marker: {marker}"));
            }
        }

        if !context.request_text.trim().is_empty() {
            let request_tokens: HashSet<String> = context
                .request_text
                .split_whitespace()
                .map(|t| t.to_lowercase())
                .collect();
            let text_tokens: HashSet<String> =
                tokens.iter().map(|t| t.to_lowercase()).collect();
            let overlap = request_tokens.intersection(&text_tokens).count();
            if overlap == 0 && request_tokens.len() >= 3 {
                coherence -= 0.2;
                issues.push("no topical overlap with request".to_string());
            }
        }

        (clamp(coherence, 0.0, 1.0), issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_fully_incoherent() {
        let analyzer = LexiconSemanticAnalyzer;
        let (coherence, issues) = analyzer.validate("", &SemanticContext::default());
        assert_eq!(coherence, 0.0);
        assert!(!issues.is_empty());
    }

    #[test]
    fn ordinary_answer_is_coherent() {
        let analyzer = LexiconSemanticAnalyzer;
        let ctx = SemanticContext {
            request_text: "What is the golden ratio?".to_string(),
        };
        let (coherence, issues) = analyzer.validate(
            "The golden ratio is approximately 1.618, often denoted by the Greek letter phi.",
            &ctx,
        );
        assert!(coherence >= 0.7, "coherence was {coherence}");
        assert!(issues.is_empty());
    }

    #[test]
    fn degenerate_repetition_is_flagged() {
        let analyzer = LexiconSemanticAnalyzer;
        let (coherence, issues) = analyzer.validate(
            "yes yes yes yes yes yes yes yes",
            &SemanticContext::default(),
        );
        assert!(coherence < 0.8);
        assert!(issues.iter().any(|i| i.contains("repetition")));
    }

    #[test]
    fn contradiction_marker_is_flagged() {
        let analyzer = LexiconSemanticAnalyzer;
        let (coherence, issues) = analyzer.validate(
            "The answer is always false, but also not entirely wrong.",
            &SemanticContext::default(),
        );
        assert!(coherence < 0.7);
        assert!(issues.iter().any(|i| i.contains("contradiction")));
    }
}
