//! Turiya: the contextual-bandit request router.
//!
//! Feature extraction turns the trailing conversation into a bounded
//! context vector; the router assigns a tier to it with LinUCB scores under
//! a budget dual and a cost/quality preference, and cascades low-confidence
//! decisions one tier up.

mod arms;
mod features;
mod router;

pub use arms::{ArmState, TuriyaArm, UcbScore};
pub use features::{extract_features, FeatureInput, TuriyaContext};
pub use router::{
    TierStats, TuriyaConfig, TuriyaDecision, TuriyaRouter, TuriyaState, TuriyaStats,
};
