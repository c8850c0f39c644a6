//! Pure numeric building blocks: exponential decay, reciprocal-rank fusion,
//! Beta/Gamma sampling, and the small SPD linear algebra the bandit needs.

mod decay;
mod linalg;
mod sampling;

pub use decay::{decay_factor, rrf_score, sigmoid, RRF_K};
pub use linalg::{identity, rank_one_update, Cholesky, FEATURE_DIM, MATRIX_LEN};
pub use sampling::{beta_sample, gamma_sample};
