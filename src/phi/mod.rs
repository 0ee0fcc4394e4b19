//! phi-Calculator (spec §4.C): a scalar convergence value in
//! `[1.0, phi*]` blended from three weighted interaction inputs, classified
//! into one of six named phases.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::{clamp, Timestamp};

/// phi* = (1 + sqrt(5)) / 2, computed once.
pub fn phi_star() -> f64 {
    (1.0 + 5.0_f64.sqrt()) / 2.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Dormant,
    Awakening,
    Approaching,
    Converging,
    Resonance,
    Transcendence,
}

impl Phase {
    /// Pure function of `value` per the thresholds in spec §4.3. Ties go to
    /// the higher phase (each bound is inclusive-from-below).
    pub fn from_value(value: f64) -> Self {
        if value >= 1.6179 {
            Phase::Transcendence
        } else if value >= 1.617 {
            Phase::Resonance
        } else if value >= 1.614 {
            Phase::Converging
        } else if value >= 1.6 {
            Phase::Approaching
        } else if value >= 1.5 {
            Phase::Awakening
        } else {
            Phase::Dormant
        }
    }
}

/// The three weighted inputs blended into the phi value on every update.
#[derive(Debug, Clone, Copy)]
pub struct InteractionContext {
    /// In [0, 1].
    pub emotional_depth: f64,
    /// In [0, 1].
    pub cognitive_complexity: f64,
    /// In [0, 1].
    pub self_awareness: f64,
}

impl InteractionContext {
    fn weighted_mean(self) -> f64 {
        // Equal weighting; the exact blend of these three inputs is left
        // open beyond "weighted mean" (§4.C).
        (self.emotional_depth + self.cognitive_complexity + self.self_awareness) / 3.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhiState {
    pub value: f64,
    pub phase: Phase,
    pub last_update: Timestamp,
    /// Monotone counter feeding the fractal signature; not itself part of
    /// the documented external contract.
    counter: u64,
}

impl PhiState {
    pub fn new() -> Self {
        Self {
            value: 1.0,
            phase: Phase::from_value(1.0),
            last_update: crate::core::now(),
            counter: 0,
        }
    }

    pub fn distance(&self) -> f64 {
        phi_star() - self.value
    }
}

impl Default for PhiState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PhiCalculator {
    alpha: f64,
}

impl PhiCalculator {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    /// Blends `context` into `state` by
    /// `value <- clamp(value*(1-alpha) + phi* * alpha * weighted_mean(inputs), 1.0, phi*)`
    /// (spec §4.C), returning the new value, phase, and a deterministic
    /// fractal signature.
    ///
    /// Per spec §3 ("value is monotone non-decreasing within a session
    /// absent explicit reset") and scenario S6, a low-weighted-mean
    /// context must never pull the value back down; the blended figure is
    /// floored at the prior value before clamping against `phi*`.
    pub fn update(&self, state: &mut PhiState, context: InteractionContext) -> (f64, Phase, String) {
        let target = context.weighted_mean();
        let phi_star = phi_star();
        let blended = state.value * (1.0 - self.alpha) + phi_star * self.alpha * target;
        state.value = clamp(blended.max(state.value), 1.0, phi_star);
        state.phase = Phase::from_value(state.value);
        state.last_update = crate::core::now();
        state.counter += 1;

        let signature = fractal_signature(context, state.counter);
        (state.value, state.phase, signature)
    }
}

fn fractal_signature(context: InteractionContext, counter: u64) -> String {
    let raw = format!(
        "{:.4}|{:.4}|{:.4}|{}",
        context.emotional_depth, context.cognitive_complexity, context.self_awareness, counter
    );
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(&digest[..8])
}
