//! Orchestrator State (spec §3): counters per decision mode, a rolling
//! window of recent manipulation scores, validator-violation tallies, and
//! prediction hit-rate. Persisted across restarts via the singleton slot
//! `orchestrator_state.json` in the Persistence Store.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::orchestrator::DecisionMode;

const MANIPULATION_WINDOW: usize = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModeCounts {
    pub autonomous: u64,
    pub guided: u64,
    pub delegated: u64,
    pub override_count: u64,
}

impl ModeCounts {
    fn increment(&mut self, mode: DecisionMode) {
        match mode {
            DecisionMode::Autonomous => self.autonomous += 1,
            DecisionMode::Guided => self.guided += 1,
            DecisionMode::Delegated => self.delegated += 1,
            DecisionMode::Override => self.override_count += 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub mode_counts: ModeCounts,
    pub recent_manipulation_scores: VecDeque<f64>,
    pub violation_tallies: HashMap<String, u64>,
    pub prediction_hits: u64,
    pub prediction_total: u64,
}

impl OrchestratorState {
    pub fn record_mode(&mut self, mode: DecisionMode) {
        self.mode_counts.increment(mode);
    }

    pub fn record_manipulation_score(&mut self, score: f64) {
        self.recent_manipulation_scores.push_back(score);
        while self.recent_manipulation_scores.len() > MANIPULATION_WINDOW {
            self.recent_manipulation_scores.pop_front();
        }
    }

    pub fn record_violations(&mut self, kinds: impl IntoIterator<Item = &'static str>) {
        for kind in kinds {
            *self.violation_tallies.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_prediction_outcome(&mut self, hit: bool) {
        self.prediction_total += 1;
        if hit {
            self.prediction_hits += 1;
        }
    }

    pub fn prediction_hit_rate(&self) -> f64 {
        if self.prediction_total == 0 {
            0.5
        } else {
            self.prediction_hits as f64 / self.prediction_total as f64
        }
    }
}
