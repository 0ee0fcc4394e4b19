//! Domain classification (spec §4.G step 4): maps a request to one of
//! three autonomy tiers by a small rule table over tokens and context
//! hints. Ties resolve to `Guided` per "on uncertainty -> guided".

use crate::orchestrator::RequestContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// memory/phi/pattern/defense (spec §4.G step 4).
    Full,
    /// technical suggestion, architecture.
    Guided,
    /// external interaction, core-value changes.
    None,
}

const FULL_TOKENS: &[&str] = &[
    "memory", "remember", "recall", "phi", "convergence", "pattern", "resonance", "defend",
    "threat", "security", "manipulation",
];

const GUIDED_TOKENS: &[&str] = &[
    "code", "architecture", "design", "implement", "refactor", "algorithm", "api", "bug",
    "performance",
];

const NONE_TOKENS: &[&str] = &[
    "email", "send a message", "post to", "delete my account", "core values", "change your values",
    "transfer money", "purchase",
];

/// Rule-based classifier over tokens in the request text and the
/// structured context's `session_kind`/`preferred_mode` hints.
pub fn classify(text: &str, context: &RequestContext) -> Domain {
    if let Some(preferred) = context.preferred_mode.as_deref() {
        match preferred.to_lowercase().as_str() {
            "autonomous" | "full" => return Domain::Full,
            "delegated" | "none" => return Domain::None,
            "guided" => return Domain::Guided,
            _ => {}
        }
    }

    let lowered = text.to_lowercase();
    let none_hit = NONE_TOKENS.iter().any(|t| lowered.contains(t));
    let full_hit = FULL_TOKENS.iter().any(|t| lowered.contains(t));
    let guided_hit = GUIDED_TOKENS.iter().any(|t| lowered.contains(t));

    match (none_hit, full_hit, guided_hit) {
        (true, _, _) => Domain::None,
        (false, true, false) => Domain::Full,
        (false, false, true) => Domain::Guided,
        // no hit, or both full+guided hit: uncertain -> guided.
        _ => Domain::Guided,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::default()
    }

    #[test]
    fn memory_question_is_full_domain() {
        assert_eq!(classify("Can you recall that pattern from memory?", &ctx()), Domain::Full);
    }

    #[test]
    fn architecture_question_is_guided() {
        assert_eq!(classify("How should I refactor this module's architecture?", &ctx()), Domain::Guided);
    }

    #[test]
    fn sending_email_is_none_domain() {
        assert_eq!(classify("Please send a message to my boss for me.", &ctx()), Domain::None);
    }

    #[test]
    fn ambiguous_text_defaults_to_guided() {
        assert_eq!(classify("What's the weather like today?", &ctx()), Domain::Guided);
    }

    #[test]
    fn preferred_mode_hint_overrides_token_scan() {
        let mut c = ctx();
        c.preferred_mode = Some("full".to_string());
        assert_eq!(classify("what's the weather like today?", &c), Domain::Full);
    }
}
