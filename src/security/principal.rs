//! Principal identity and trust-profile authentication (spec §3, §4.D).
//!
//! Only a single privileged principal is supported; every other caller is
//! anonymous. Trust is a cosine similarity between a stored token-weight
//! "linguistic fingerprint" and the fingerprint of the inbound text.

use std::collections::HashMap;

use crate::core::Timestamp;

#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
    pub trust_profile: HashMap<String, f64>,
    pub last_seen: Timestamp,
}

impl Principal {
    /// Builds a trust profile from a sample of the principal's own prior
    /// text — a bag-of-tokens fingerprint weighted by frequency.
    pub fn enroll(id: impl Into<String>, sample_text: &str) -> Self {
        Self {
            id: id.into(),
            trust_profile: fingerprint(sample_text),
            last_seen: crate::core::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = crate::core::now();
    }
}

/// Token/feature fingerprint: lowercase token -> relative frequency.
pub fn fingerprint(text: &str) -> HashMap<String, f64> {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        return HashMap::new();
    }

    let mut counts: HashMap<String, f64> = HashMap::new();
    for token in &tokens {
        *counts.entry(token.clone()).or_insert(0.0) += 1.0;
    }
    let total = tokens.len() as f64;
    for value in counts.values_mut() {
        *value /= total;
    }
    counts
}

/// Cosine similarity between two sparse token-weight maps.
pub fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().map(|(token, weight)| weight * b.get(token).copied().unwrap_or(0.0)).sum();
    let norm_a = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b = b.values().map(|w| w * w).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_has_perfect_similarity() {
        let profile = fingerprint("the quick brown fox jumps over the lazy dog");
        assert!((cosine_similarity(&profile, &profile) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_vocabularies_have_zero_similarity() {
        let a = fingerprint("alpha beta gamma");
        let b = fingerprint("delta epsilon zeta");
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn empty_text_has_no_similarity() {
        let a = fingerprint("");
        let b = fingerprint("something");
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
