//! Hybrid recall: retrieval gating, rank fusion over pluggable backends,
//! online weight learning, and the embedding-backed vector index.

mod embedding;
mod engine;
mod fusion;
mod gate;
mod hybrid;
mod store;
mod weights;

pub use embedding::{
    cosine_similarity, fallback_embedding, EmbeddingService, FALLBACK_DIMENSIONS,
};
pub use engine::{MigrationReport, RecallEngine, RecallHit, RecallOptions};
pub use fusion::{
    fuse, BackendRanks, BackendResults, FusionConfig, HybridResult, Pramana, RankedDoc,
    SearchBackend, SourceWeights,
};
pub use gate::{retrieval_signals, should_retrieve};
pub use hybrid::{HybridConfig, HybridSearchEngine, HybridSearchStats, SearchProvider};
pub use store::{
    decode_vector, encode_vector, EntryMetadata, SourceType, VectorRecord, VectorStore,
};
pub use weights::{HybridSignal, HybridWeightLearner, WeightLearnerState};
