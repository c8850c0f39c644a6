//! Exponential half-life decay and reciprocal-rank scoring.

/// Standard RRF constant (k=60 is the information-retrieval default).
pub const RRF_K: f64 = 60.0;

/// Exponential decay factor for an elapsed interval against a half-life.
///
/// Returns 1.0 at `elapsed = 0`, 0.5 at one half-life, and is monotone
/// non-increasing. Negative elapsed values (clock skew, future timestamps)
/// are clamped to zero. Satisfies the semigroup property
/// `f(a + b) = f(a) * f(b)`.
pub fn decay_factor(elapsed_ms: f64, half_life_ms: f64) -> f64 {
    let elapsed = elapsed_ms.max(0.0);
    (-std::f64::consts::LN_2 * elapsed / half_life_ms).exp()
}

/// Reciprocal-rank-fusion score contribution for a 1-based rank.
pub fn rrf_score(rank: usize, k: f64) -> f64 {
    1.0 / (k + rank as f64)
}

/// Logistic squash, used to turn score gaps into confidences.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
