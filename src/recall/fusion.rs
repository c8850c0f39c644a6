//! Reciprocal-rank fusion with epistemic-trust weighting.
//!
//! Each backend contributes `w * 1/(k + rank)` for every document it
//! returned; documents found by several backends get a multi-source boost,
//! and optionally a bonus proportional to the reliability of their pramana
//! tag.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::math::{rrf_score, RRF_K};
use crate::recall::weights::HybridSignal;

// ---------------------------------------------------------------------------
// Pramana: six-valued epistemic trust
// ---------------------------------------------------------------------------

/// Epistemic-trust tag on retrieved content, ordered by decreasing
/// reliability. Unknown tags downgrade to [`Pramana::Shabda`]; downgrading
/// is safer than upgrading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pramana {
    /// Direct perception: the system observed it itself.
    Pratyaksha,
    /// Inference from observed behavior.
    Anumana,
    /// Trusted testimony (documentation, user statements).
    Shabda,
    /// Analogy with a known case.
    Upamana,
    /// Postulation to explain an observation.
    Arthapatti,
    /// Inference from absence.
    Anupalabdhi,
}

impl Pramana {
    pub const ALL: [Pramana; 6] = [
        Pramana::Pratyaksha,
        Pramana::Anumana,
        Pramana::Shabda,
        Pramana::Upamana,
        Pramana::Arthapatti,
        Pramana::Anupalabdhi,
    ];

    /// Static reliability weight. Strictly decreasing down the list.
    pub const fn reliability(self) -> f64 {
        match self {
            Pramana::Pratyaksha => 1.00,
            Pramana::Anumana => 0.85,
            Pramana::Shabda => 0.75,
            Pramana::Upamana => 0.60,
            Pramana::Arthapatti => 0.50,
            Pramana::Anupalabdhi => 0.40,
        }
    }

    /// Parse a tag, defaulting unknown input to `Shabda`.
    pub fn parse(tag: &str) -> Pramana {
        match tag.to_lowercase().as_str() {
            "pratyaksha" => Pramana::Pratyaksha,
            "anumana" => Pramana::Anumana,
            "shabda" => Pramana::Shabda,
            "upamana" => Pramana::Upamana,
            "arthapatti" => Pramana::Arthapatti,
            "anupalabdhi" => Pramana::Anupalabdhi,
            _ => Pramana::Shabda,
        }
    }
}

impl std::fmt::Display for Pramana {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Pramana::Pratyaksha => "pratyaksha",
            Pramana::Anumana => "anumana",
            Pramana::Shabda => "shabda",
            Pramana::Upamana => "upamana",
            Pramana::Arthapatti => "arthapatti",
            Pramana::Anupalabdhi => "anupalabdhi",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Backends and ranked input
// ---------------------------------------------------------------------------

/// The three search backends fused by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchBackend {
    Bm25,
    Vector,
    Graphrag,
}

impl SearchBackend {
    pub const ALL: [SearchBackend; 3] =
        [SearchBackend::Bm25, SearchBackend::Vector, SearchBackend::Graphrag];

    /// The learner signal this backend's weight is drawn from.
    pub fn signal(self) -> HybridSignal {
        match self {
            SearchBackend::Bm25 => HybridSignal::Bm25,
            SearchBackend::Vector => HybridSignal::Vector,
            SearchBackend::Graphrag => HybridSignal::Graphrag,
        }
    }
}

impl std::fmt::Display for SearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.signal())
    }
}

/// One document as returned by a single backend, best match first.
#[derive(Debug, Clone)]
pub struct RankedDoc {
    pub id: String,
    pub title: String,
    pub content: String,
    pub pramana: Option<Pramana>,
}

/// A full ranked list from one backend. Rank is 1-based list position.
#[derive(Debug, Clone)]
pub struct BackendResults {
    pub backend: SearchBackend,
    pub docs: Vec<RankedDoc>,
}

/// Per-backend weights applied inside the RRF sum.
#[derive(Debug, Clone, Copy)]
pub struct SourceWeights {
    pub bm25: f64,
    pub vector: f64,
    pub graphrag: f64,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            bm25: 1.0,
            vector: 1.0,
            graphrag: 1.0,
        }
    }
}

impl SourceWeights {
    pub fn get(&self, backend: SearchBackend) -> f64 {
        match backend {
            SearchBackend::Bm25 => self.bm25,
            SearchBackend::Vector => self.vector,
            SearchBackend::Graphrag => self.graphrag,
        }
    }
}

// ---------------------------------------------------------------------------
// Fusion
// ---------------------------------------------------------------------------

/// Fusion parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// RRF constant.
    pub rrf_k: f64,
    /// Whether to add the pramana reliability bonus.
    pub enable_pramana: bool,
    /// Bonus scale: `delta * reliability(tag)` is added to the fused score.
    pub pramana_delta: f64,
    /// Results scoring below this floor are dropped.
    pub min_score: f64,
    /// Maximum number of fused results returned.
    pub limit: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: RRF_K,
            enable_pramana: true,
            pramana_delta: 0.10,
            min_score: 0.0,
            limit: 10,
        }
    }
}

/// Per-source ranks a document achieved, 1-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRanks {
    pub bm25: Option<usize>,
    pub vector: Option<usize>,
    pub graphrag: Option<usize>,
}

impl BackendRanks {
    fn set(&mut self, backend: SearchBackend, rank: usize) {
        match backend {
            SearchBackend::Bm25 => self.bm25 = Some(rank),
            SearchBackend::Vector => self.vector = Some(rank),
            SearchBackend::Graphrag => self.graphrag = Some(rank),
        }
    }

    pub fn get(&self, backend: SearchBackend) -> Option<usize> {
        match backend {
            SearchBackend::Bm25 => self.bm25,
            SearchBackend::Vector => self.vector,
            SearchBackend::Graphrag => self.graphrag,
        }
    }
}

/// A fused search result.
#[derive(Debug, Clone)]
pub struct HybridResult {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Which backends returned this document.
    pub sources: Vec<SearchBackend>,
    pub score: f64,
    pub ranks: BackendRanks,
    pub pramana: Option<Pramana>,
}

/// Fuse per-backend ranked lists into a single scored list, best first.
pub fn fuse(
    results: &[BackendResults],
    weights: &SourceWeights,
    config: &FusionConfig,
) -> Vec<HybridResult> {
    let mut merged: HashMap<String, HybridResult> = HashMap::new();

    for backend_results in results {
        let backend = backend_results.backend;
        let weight = weights.get(backend);
        for (i, doc) in backend_results.docs.iter().enumerate() {
            let rank = i + 1;
            let contribution = weight * rrf_score(rank, config.rrf_k);
            let entry = merged.entry(doc.id.clone()).or_insert_with(|| HybridResult {
                id: doc.id.clone(),
                title: doc.title.clone(),
                content: doc.content.clone(),
                sources: Vec::new(),
                score: 0.0,
                ranks: BackendRanks::default(),
                pramana: None,
            });
            entry.score += contribution;
            if !entry.sources.contains(&backend) {
                entry.sources.push(backend);
            }
            entry.ranks.set(backend, rank);
            if entry.pramana.is_none() {
                entry.pramana = doc.pramana;
            }
        }
    }

    let mut fused: Vec<HybridResult> = merged
        .into_values()
        .map(|mut r| {
            r.score *= multi_source_boost(r.sources.len());
            if config.enable_pramana {
                let tag = r.pramana.unwrap_or(Pramana::Shabda);
                r.score += config.pramana_delta * tag.reliability();
            }
            r
        })
        .filter(|r| r.score >= config.min_score)
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    fused.truncate(config.limit);
    fused
}

/// Documents confirmed by several backends score higher.
fn multi_source_boost(source_count: usize) -> f64 {
    match source_count {
        n if n >= 3 => 1.15,
        2 => 1.05,
        _ => 1.00,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str) -> RankedDoc {
        RankedDoc {
            id: id.into(),
            title: format!("title-{id}"),
            content: format!("content-{id}"),
            pramana: None,
        }
    }

    fn doc_tagged(id: &str, pramana: Pramana) -> RankedDoc {
        RankedDoc {
            pramana: Some(pramana),
            ..doc(id)
        }
    }

    fn no_pramana() -> FusionConfig {
        FusionConfig {
            enable_pramana: false,
            ..Default::default()
        }
    }

    #[test]
    fn pramana_weights_strictly_decrease() {
        let mut prev = f64::INFINITY;
        for p in Pramana::ALL {
            assert!(p.reliability() < prev);
            prev = p.reliability();
        }
    }

    #[test]
    fn unknown_tag_downgrades_to_shabda() {
        assert_eq!(Pramana::parse("PRATYAKSHA"), Pramana::Pratyaksha);
        assert_eq!(Pramana::parse("gossip"), Pramana::Shabda);
        assert_eq!(Pramana::parse(""), Pramana::Shabda);
    }

    #[test]
    fn single_source_rank_one_scores_exact_rrf() {
        let results = vec![BackendResults {
            backend: SearchBackend::Bm25,
            docs: vec![doc("a")],
        }];
        let fused = fuse(&results, &SourceWeights::default(), &no_pramana());
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-9);
        assert_eq!(fused[0].ranks.bm25, Some(1));
        assert_eq!(fused[0].ranks.vector, None);
    }

    #[test]
    fn pratyaksha_bonus_matches_reference_value() {
        let results = vec![BackendResults {
            backend: SearchBackend::Bm25,
            docs: vec![doc_tagged("a", Pramana::Pratyaksha)],
        }];
        let fused = fuse(&results, &SourceWeights::default(), &FusionConfig::default());
        // 1/61 + 0.10 * 1.00
        assert!((fused[0].score - 0.11639344).abs() < 1e-6, "score={}", fused[0].score);
    }

    #[test]
    fn untagged_doc_gets_shabda_bonus_when_enabled() {
        let results = vec![BackendResults {
            backend: SearchBackend::Vector,
            docs: vec![doc("a")],
        }];
        let fused = fuse(&results, &SourceWeights::default(), &FusionConfig::default());
        let expected = 1.0 / 61.0 + 0.10 * 0.75;
        assert!((fused[0].score - expected).abs() < 1e-9);
    }

    #[test]
    fn multi_source_documents_are_boosted() {
        let results = vec![
            BackendResults {
                backend: SearchBackend::Bm25,
                docs: vec![doc("a")],
            },
            BackendResults {
                backend: SearchBackend::Vector,
                docs: vec![doc("a")],
            },
            BackendResults {
                backend: SearchBackend::Graphrag,
                docs: vec![doc("a")],
            },
        ];
        let fused = fuse(&results, &SourceWeights::default(), &no_pramana());
        assert_eq!(fused.len(), 1);
        let expected = 3.0 * (1.0 / 61.0) * 1.15;
        assert!((fused[0].score - expected).abs() < 1e-9);
        assert_eq!(fused[0].sources.len(), 3);
    }

    #[test]
    fn two_sources_get_smaller_boost() {
        let results = vec![
            BackendResults {
                backend: SearchBackend::Bm25,
                docs: vec![doc("a")],
            },
            BackendResults {
                backend: SearchBackend::Vector,
                docs: vec![doc("a")],
            },
        ];
        let fused = fuse(&results, &SourceWeights::default(), &no_pramana());
        let expected = 2.0 * (1.0 / 61.0) * 1.05;
        assert!((fused[0].score - expected).abs() < 1e-9);
    }

    #[test]
    fn backend_weights_scale_contributions() {
        let weights = SourceWeights {
            bm25: 0.5,
            vector: 2.0,
            graphrag: 1.0,
        };
        let results = vec![
            BackendResults {
                backend: SearchBackend::Bm25,
                docs: vec![doc("a")],
            },
            BackendResults {
                backend: SearchBackend::Vector,
                docs: vec![doc("b")],
            },
        ];
        let fused = fuse(&results, &weights, &no_pramana());
        assert_eq!(fused[0].id, "b");
        assert!((fused[0].score - 2.0 / 61.0).abs() < 1e-9);
        assert!((fused[1].score - 0.5 / 61.0).abs() < 1e-9);
    }

    #[test]
    fn min_score_floor_drops_weak_results() {
        let results = vec![BackendResults {
            backend: SearchBackend::Bm25,
            docs: (0..20).map(|i| doc(&format!("d{i}"))).collect(),
        }];
        let config = FusionConfig {
            min_score: 1.0 / 65.0,
            enable_pramana: false,
            ..Default::default()
        };
        let fused = fuse(&results, &SourceWeights::default(), &config);
        // Ranks 1..=5 score 1/61..1/65; rank 5 exactly hits the floor.
        assert_eq!(fused.len(), 5);
    }

    #[test]
    fn limit_truncates_fused_output() {
        let results = vec![BackendResults {
            backend: SearchBackend::Bm25,
            docs: (0..20).map(|i| doc(&format!("d{i}"))).collect(),
        }];
        let config = FusionConfig {
            limit: 3,
            ..no_pramana()
        };
        let fused = fuse(&results, &SourceWeights::default(), &config);
        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].id, "d0");
    }

    #[test]
    fn better_ranks_fuse_higher() {
        let results = vec![
            BackendResults {
                backend: SearchBackend::Bm25,
                docs: vec![doc("a"), doc("b")],
            },
            BackendResults {
                backend: SearchBackend::Vector,
                docs: vec![doc("b"), doc("a")],
            },
        ];
        // Symmetric ranks: stable tie broken by id.
        let fused = fuse(&results, &SourceWeights::default(), &no_pramana());
        assert_eq!(fused.len(), 2);
        assert!((fused[0].score - fused[1].score).abs() < 1e-12);
        assert_eq!(fused[0].id, "a");
    }
}
