//! Online Thompson learning of per-signal fusion weights.
//!
//! Four independent Beta posteriors, one per retrieval signal. Sampling
//! draws one value from each posterior and normalises, so a signal that
//! keeps contributing to accepted results gradually wins weight.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::math::beta_sample;

/// The four weighted retrieval signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HybridSignal {
    Bm25,
    Vector,
    Graphrag,
    Pramana,
}

impl HybridSignal {
    pub const ALL: [HybridSignal; 4] = [
        HybridSignal::Bm25,
        HybridSignal::Vector,
        HybridSignal::Graphrag,
        HybridSignal::Pramana,
    ];

    pub fn index(self) -> usize {
        match self {
            HybridSignal::Bm25 => 0,
            HybridSignal::Vector => 1,
            HybridSignal::Graphrag => 2,
            HybridSignal::Pramana => 3,
        }
    }
}

impl std::fmt::Display for HybridSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HybridSignal::Bm25 => write!(f, "bm25"),
            HybridSignal::Vector => write!(f, "vector"),
            HybridSignal::Graphrag => write!(f, "graphrag"),
            HybridSignal::Pramana => write!(f, "pramana"),
        }
    }
}

/// Portable posterior state: four `(alpha, beta)` pairs plus the feedback
/// count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightLearnerState {
    pub alphas: [f64; 4],
    pub betas: [f64; 4],
    pub total_feedback: u64,
}

/// Four independent Beta posteriors over the retrieval signals.
#[derive(Debug, Clone)]
pub struct HybridWeightLearner {
    alphas: [f64; 4],
    betas: [f64; 4],
    total_feedback: u64,
}

impl Default for HybridWeightLearner {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridWeightLearner {
    /// Start from the (1, 1) prior on every signal.
    pub fn new() -> Self {
        Self {
            alphas: [1.0; 4],
            betas: [1.0; 4],
            total_feedback: 0,
        }
    }

    /// Draw one weight per signal and normalise to sum to one.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; 4] {
        let mut draws = [0.0f64; 4];
        for (i, draw) in draws.iter_mut().enumerate() {
            *draw = beta_sample(rng, self.alphas[i], self.betas[i]);
        }
        let sum: f64 = draws.iter().sum();
        if sum <= 0.0 {
            return [0.25; 4];
        }
        draws.map(|d| d / sum)
    }

    /// Record one outcome for a signal: success reinforces alpha, failure
    /// reinforces beta.
    pub fn update(&mut self, signal: HybridSignal, success: bool) {
        let i = signal.index();
        if success {
            self.alphas[i] += 1.0;
        } else {
            self.betas[i] += 1.0;
        }
        self.total_feedback += 1;
        tracing::debug!(
            signal = %signal,
            success,
            alpha = self.alphas[i],
            beta = self.betas[i],
            "hybrid weight updated"
        );
    }

    /// Posterior means `alpha / (alpha + beta)` per signal.
    pub fn means(&self) -> [f64; 4] {
        let mut m = [0.0f64; 4];
        for i in 0..4 {
            m[i] = self.alphas[i] / (self.alphas[i] + self.betas[i]);
        }
        m
    }

    pub fn total_feedback(&self) -> u64 {
        self.total_feedback
    }

    pub fn state(&self) -> WeightLearnerState {
        WeightLearnerState {
            alphas: self.alphas,
            betas: self.betas,
            total_feedback: self.total_feedback,
        }
    }

    /// Restore from a state document. Out-of-range values are pulled back to
    /// the prior rather than rejected.
    pub fn from_state(state: WeightLearnerState) -> Self {
        let sanitize = |v: f64| if v.is_finite() && v >= 1.0 { v } else { 1.0 };
        Self {
            alphas: state.alphas.map(sanitize),
            betas: state.betas.map(sanitize),
            total_feedback: state.total_feedback,
        }
    }
}
