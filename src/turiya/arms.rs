//! Bandit arms: one LinUCB + Beta accumulator per tier.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::math::{identity, rank_one_update, Cholesky, FEATURE_DIM, MATRIX_LEN};
use crate::types::Tier;

/// The UCB evaluation of one arm for one feature vector.
#[derive(Debug, Clone, Copy)]
pub struct UcbScore {
    pub mean: f64,
    pub stddev: f64,
    /// `mean + linucb_alpha * stddev`.
    pub score: f64,
}

/// Portable arm state: the `A` matrix flattened row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmState {
    pub tier: Tier,
    #[serde(default)]
    pub a_flat: Vec<f64>,
    #[serde(default)]
    pub b: Vec<f64>,
    #[serde(default = "one")]
    pub alpha: f64,
    #[serde(default = "one")]
    pub beta: f64,
    #[serde(default)]
    pub plays: u64,
    #[serde(default)]
    pub total_reward: f64,
    #[serde(default)]
    pub total_cost: f64,
}

fn one() -> f64 {
    1.0
}

/// LinUCB normal-equation accumulators plus a Beta posterior for one tier.
#[derive(Debug, Clone)]
pub struct TuriyaArm {
    pub tier: Tier,
    a: [f64; MATRIX_LEN],
    b: [f64; FEATURE_DIM],
    pub alpha: f64,
    pub beta: f64,
    pub plays: u64,
    pub total_reward: f64,
    pub total_cost: f64,
}

impl TuriyaArm {
    /// Fresh arm: `A = I`, `b = 0`, Beta(1, 1).
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            a: identity(),
            b: [0.0; FEATURE_DIM],
            alpha: 1.0,
            beta: 1.0,
            plays: 0,
            total_reward: 0.0,
            total_cost: 0.0,
        }
    }

    /// Evaluate `mu + alpha * sigma` for a feature vector, where
    /// `theta = A^-1 b`, `mu = theta . x`, and `sigma = sqrt(x' A^-1 x)`.
    pub fn ucb(&self, x: &[f64; FEATURE_DIM], linucb_alpha: f64) -> Result<UcbScore, CoreError> {
        let chol = Cholesky::factor(&self.a)?;
        let theta = chol.solve(&self.b);
        let mean: f64 = theta.iter().zip(x.iter()).map(|(t, xi)| t * xi).sum();
        let stddev = chol.quad_form(x).max(0.0).sqrt();
        Ok(UcbScore {
            mean,
            stddev,
            score: mean + linucb_alpha * stddev,
        })
    }

    /// Fold one observed outcome into the accumulators. `reward` must
    /// already be clamped to `[0, 1]`.
    pub fn update(&mut self, x: &[f64; FEATURE_DIM], reward: f64, cost: f64) {
        rank_one_update(&mut self.a, x);
        for (bi, xi) in self.b.iter_mut().zip(x.iter()) {
            *bi += reward * xi;
        }
        self.alpha += reward;
        self.beta += 1.0 - reward;
        self.plays += 1;
        self.total_reward += reward;
        self.total_cost += cost;
    }

    pub fn average_reward(&self) -> f64 {
        if self.plays == 0 {
            0.0
        } else {
            self.total_reward / self.plays as f64
        }
    }

    pub fn state(&self) -> ArmState {
        ArmState {
            tier: self.tier,
            a_flat: self.a.to_vec(),
            b: self.b.to_vec(),
            alpha: self.alpha,
            beta: self.beta,
            plays: self.plays,
            total_reward: self.total_reward,
            total_cost: self.total_cost,
        }
    }

    /// Restore from a state document. Wrong-sized or non-finite buffers are
    /// ignored field-by-field; core invariants (`alpha, beta >= 1`,
    /// `total_reward <= plays`) are re-established on the way in.
    pub fn from_state(state: &ArmState) -> Self {
        let mut arm = Self::new(state.tier);
        if state.a_flat.len() == MATRIX_LEN && state.a_flat.iter().all(|v| v.is_finite()) {
            arm.a.copy_from_slice(&state.a_flat);
        }
        if state.b.len() == FEATURE_DIM && state.b.iter().all(|v| v.is_finite()) {
            arm.b.copy_from_slice(&state.b);
        }
        if state.alpha.is_finite() && state.alpha >= 1.0 {
            arm.alpha = state.alpha;
        }
        if state.beta.is_finite() && state.beta >= 1.0 {
            arm.beta = state.beta;
        }
        arm.plays = state.plays;
        if state.total_reward.is_finite() {
            arm.total_reward = state.total_reward.min(state.plays as f64).max(0.0);
        }
        if state.total_cost.is_finite() && state.total_cost >= 0.0 {
            arm.total_cost = state.total_cost;
        }
        arm
    }
}
