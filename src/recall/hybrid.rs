//! Hybrid search: gate, fan out to backends, fuse, learn.
//!
//! Backends are collaborators behind [`SearchProvider`]; an unavailable
//! backend is skipped and the fused result is partial rather than an error.
//! Accepted results feed the weight learner, which gradually reshapes how
//! much each backend counts in the fusion.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::recall::fusion::{
    fuse, BackendResults, FusionConfig, HybridResult, RankedDoc, SearchBackend, SourceWeights,
};
use crate::recall::gate::{retrieval_signals, should_retrieve};
use crate::recall::weights::{HybridSignal, HybridWeightLearner};

/// One ranked-retrieval backend (BM25, dense vector, or graph walk).
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn backend(&self) -> SearchBackend;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<RankedDoc>, CoreError>;
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct HybridConfig {
    pub fusion: FusionConfig,
    /// How many candidates to request from each backend before fusing.
    pub candidate_limit: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            fusion: FusionConfig::default(),
            candidate_limit: 50,
        }
    }
}

/// Counters for observability.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct HybridSearchStats {
    pub searches: u64,
    pub gated_out: u64,
    pub backend_errors: u64,
}

/// RRF fusion over pluggable backends with Thompson-sampled source weights.
pub struct HybridSearchEngine {
    providers: Vec<Arc<dyn SearchProvider>>,
    learner: HybridWeightLearner,
    config: HybridConfig,
    rng: StdRng,
    stats: HybridSearchStats,
}

impl HybridSearchEngine {
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>, config: HybridConfig) -> Self {
        Self::with_seed(providers, config, rand::random())
    }

    /// Seeded constructor for reproducible weight sampling in tests.
    pub fn with_seed(
        providers: Vec<Arc<dyn SearchProvider>>,
        config: HybridConfig,
        seed: u64,
    ) -> Self {
        Self {
            providers,
            learner: HybridWeightLearner::new(),
            config,
            rng: StdRng::seed_from_u64(seed),
            stats: HybridSearchStats::default(),
        }
    }

    pub fn learner(&self) -> &HybridWeightLearner {
        &self.learner
    }

    pub fn restore_learner(&mut self, learner: HybridWeightLearner) {
        self.learner = learner;
    }

    pub fn stats(&self) -> HybridSearchStats {
        self.stats
    }

    /// Query every backend and fuse. Always returns an array; failing
    /// backends are skipped with a warning.
    pub async fn hybrid_search(
        &mut self,
        query: &str,
        cancel: Option<&CancellationToken>,
    ) -> Vec<HybridResult> {
        self.stats.searches += 1;

        let sampled = self.learner.sample(&mut self.rng);
        let weights = SourceWeights {
            bm25: sampled[HybridSignal::Bm25.index()],
            vector: sampled[HybridSignal::Vector.index()],
            graphrag: sampled[HybridSignal::Graphrag.index()],
        };

        let mut gathered: Vec<BackendResults> = Vec::new();
        for provider in &self.providers {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                tracing::debug!("hybrid search cancelled; fusing partial results");
                break;
            }
            match provider.search(query, self.config.candidate_limit).await {
                Ok(docs) => gathered.push(BackendResults {
                    backend: provider.backend(),
                    docs,
                }),
                Err(e) => {
                    self.stats.backend_errors += 1;
                    tracing::warn!(
                        backend = %provider.backend(),
                        error = %e,
                        "search backend unavailable; skipping"
                    );
                }
            }
        }

        fuse(&gathered, &weights, &self.config.fusion)
    }

    /// Run the retrieval gate first; queries that do not look like recall
    /// requests skip the backends entirely.
    pub async fn gated_search(
        &mut self,
        query: &str,
        cancel: Option<&CancellationToken>,
    ) -> Vec<HybridResult> {
        if !should_retrieve(query) {
            self.stats.gated_out += 1;
            tracing::debug!(query_len = query.len(), "retrieval gate declined query");
            return Vec::new();
        }
        tracing::debug!(signals = ?retrieval_signals(query), "retrieval gate passed");
        self.hybrid_search(query, cancel).await
    }

    /// Feed one user outcome back into the weight posteriors: every source
    /// that contributed a rank to this result is updated, and the pramana
    /// signal too when the result carries a tag.
    pub fn record_feedback(&mut self, result: &HybridResult, success: bool) {
        for backend in SearchBackend::ALL {
            if result.ranks.get(backend).is_some() {
                self.learner.update(backend.signal(), success);
            }
        }
        if result.pramana.is_some() {
            self.learner.update(HybridSignal::Pramana, success);
        }
    }
}
