//! Emotional analyzer contract (spec §4.I): `emotion_analyze(text) ->
//! map(emotion -> [0,1])` over the fixed eight-emotion wheel.

use std::collections::HashMap;

use crate::core::clamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emotion {
    Joy,
    Trust,
    Fear,
    Surprise,
    Sadness,
    Disgust,
    Anger,
    Anticipation,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Joy,
        Emotion::Trust,
        Emotion::Fear,
        Emotion::Surprise,
        Emotion::Sadness,
        Emotion::Disgust,
        Emotion::Anger,
        Emotion::Anticipation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Trust => "trust",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Sadness => "sadness",
            Emotion::Disgust => "disgust",
            Emotion::Anger => "anger",
            Emotion::Anticipation => "anticipation",
        }
    }

    fn lexicon(self) -> &'static [&'static str] {
        match self {
            Emotion::Joy => &["happy", "glad", "joy", "delighted", "wonderful", "great"],
            Emotion::Trust => &["trust", "reliable", "confident", "sure", "faithful"],
            Emotion::Fear => &["afraid", "scared", "fear", "terrified", "anxious", "worried"],
            Emotion::Surprise => &["surprised", "unexpected", "sudden", "shocking", "whoa"],
            Emotion::Sadness => &["sad", "unhappy", "sorrow", "grief", "depressed", "lonely"],
            Emotion::Disgust => &["disgust", "gross", "revolting", "repulsive", "nasty"],
            Emotion::Anger => &["angry", "furious", "mad", "rage", "irritated", "annoyed"],
            Emotion::Anticipation => &["looking forward", "expect", "anticipate", "soon", "eager"],
        }
    }
}

/// Pluggable emotional scorer (spec §4.I: "implementations are pluggable").
pub trait EmotionalAnalyzer: Send + Sync {
    fn analyze(&self, text: &str) -> HashMap<&'static str, f64>;
}

/// Deterministic lexicon-overlap scorer: the default implementation.
#[derive(Debug, Default)]
pub struct LexiconEmotionalAnalyzer;

impl EmotionalAnalyzer for LexiconEmotionalAnalyzer {
    fn analyze(&self, text: &str) -> HashMap<&'static str, f64> {
        let lowered = text.to_lowercase();
        let word_count = lowered.split_whitespace().count().max(1) as f64;

        Emotion::ALL
            .into_iter()
            .map(|emotion| {
                let hits = emotion
                    .lexicon()
                    .iter()
                    .filter(|kw| lowered.contains(*kw))
                    .count() as f64;
                (emotion.as_str(), clamp(hits / word_count.sqrt(), 0.0, 1.0))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_text_scores_all_emotions_low() {
        let analyzer = LexiconEmotionalAnalyzer;
        let scores = analyzer.analyze("The capital of France is Paris.");
        assert!(scores.values().all(|&v| v < 0.3));
    }

    #[test]
    fn joyful_text_scores_joy_highest() {
        let analyzer = LexiconEmotionalAnalyzer;
        let scores = analyzer.analyze("I am so happy and delighted, what a wonderful, great day!");
        let joy = scores[Emotion::Joy.as_str()];
        assert!(joy > scores[Emotion::Sadness.as_str()]);
        assert!(joy > scores[Emotion::Anger.as_str()]);
    }

    #[test]
    fn covers_all_eight_emotions() {
        let analyzer = LexiconEmotionalAnalyzer;
        let scores = analyzer.analyze("hello");
        assert_eq!(scores.len(), 8);
    }
}
