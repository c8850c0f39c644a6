//! Chitragupta: an agentic-AI request router and memory substrate.
//!
//! Four subsystems interlock around a stream of conversation turns:
//!
//! - [`turiya`] — a contextual bandit (LinUCB over an 8-dimensional context,
//!   Beta posteriors per arm) that assigns each turn to one of four model
//!   tiers under a daily budget and a cost/quality preference, with a
//!   confidence-triggered cascade to the next tier up.
//! - [`recall`] — reciprocal-rank fusion over BM25, dense-vector, and
//!   graph-walk backends with six-valued epistemic-trust weighting, online
//!   Thompson learning of per-backend weights, a retrieval pre-gate, and an
//!   SQLite-backed vector index with a deterministic embedding fallback.
//! - [`kala`] — a seven-scale exponential-decay model (turn through year)
//!   scoring document relevance and classifying the dominant temporal scale
//!   of any age.
//! - [`lokapala`] — three streaming guardians (security, performance,
//!   correctness) that turn tool executions and turn observations into typed
//!   findings with confidence, coordinated by a controller with bounded
//!   finding rings and a typed broadcast.
//!
//! Everything outside these subsystems — transport, provider SDKs, session
//! files, UI — is a collaborator reached through the traits in [`stores`],
//! [`recall::EmbeddingService`], and [`clock::Clock`].

pub mod clock;
pub mod error;
pub mod kala;
pub mod lokapala;
pub mod math;
pub mod recall;
pub mod stores;
pub mod turiya;
pub mod types;

pub use clock::{Clock, FixedClock, Millis, SystemClock};
pub use error::CoreError;
pub use types::{MemoryScope, Tier, ToolCall, Turn, TurnRole};
