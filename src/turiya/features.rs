//! Feature extraction for the router.
//!
//! Derives the seven-feature context from the trailing messages, optional
//! system prompt, tool set, and memory-hit count. Every heuristic is a
//! deterministic single pass over the text and every output is clamped to
//! `[0, 1]`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::math::FEATURE_DIM;
use crate::types::Turn;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// The router's feature vector, all values in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TuriyaContext {
    pub complexity: f64,
    pub urgency: f64,
    pub creativity: f64,
    pub precision: f64,
    pub code_ratio: f64,
    pub conversation_depth: f64,
    pub memory_load: f64,
}

impl TuriyaContext {
    /// Clamp every feature into `[0, 1]`.
    pub fn clamped(mut self) -> Self {
        for v in [
            &mut self.complexity,
            &mut self.urgency,
            &mut self.creativity,
            &mut self.precision,
            &mut self.code_ratio,
            &mut self.conversation_depth,
            &mut self.memory_load,
        ] {
            *v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        }
        self
    }

    /// The 8-dimensional linear-model input: seven features plus a constant
    /// bias of 1.0.
    pub fn feature_vector(&self) -> [f64; FEATURE_DIM] {
        [
            self.complexity,
            self.urgency,
            self.creativity,
            self.precision,
            self.code_ratio,
            self.conversation_depth,
            self.memory_load,
            1.0,
        ]
    }
}

// ---------------------------------------------------------------------------
// Keyword families
// ---------------------------------------------------------------------------

static MULTI_STEP_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)first.*then").unwrap(),
        Regex::new(r"(?i)step \d").unwrap(),
        Regex::new(r"(?m)^\s*\d+\.\s").unwrap(),
    ]
});

static FILE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\w./\-]+\.(rs|py|ts|tsx|js|go|java|c|cpp|h|rb|sh|md|toml|json|ya?ml)\b")
        .unwrap()
});

static EXPERT_KEYWORDS: &[&str] = &[
    "algorithm", "distributed", "concurrency", "kubernetes", "compiler", "cryptograph",
    "optimize", "architecture", "database", "protocol", "quantum", "homomorphic",
];

static URGENCY_KEYWORDS: &[&str] = &[
    "urgent", "asap", "immediately", "production", "critical", "outage", "emergency",
    "right now", "broken",
];

static CREATIVE_KEYWORDS: &[&str] = &[
    "story", "poem", "brainstorm", "imagine", "creative", "compose", "write a", "design a",
];

static PRECISION_KEYWORDS: &[&str] = &[
    "exactly", "precise", "spec", "verify", "prove", "accurate", "strictly", "must",
    "correct",
];

fn count_matches(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| text.contains(*kw)).count()
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Raw material the extractor works from.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureInput<'a> {
    /// The last few turns, oldest first.
    pub messages: &'a [Turn],
    pub system_prompt: Option<&'a str>,
    pub tool_names: &'a [String],
    pub memory_hits: usize,
    /// Normalisation ceiling for `memory_load`; zero disables the feature.
    pub max_memory_hits: usize,
}

/// Derive the routing context. Deterministic and cheap: one lowercase pass
/// plus a handful of substring counts over at most a few kilobytes.
pub fn extract_features(input: &FeatureInput<'_>) -> TuriyaContext {
    let mut text = String::new();
    for turn in input.messages {
        text.push_str(&turn.content);
        text.push('\n');
    }
    if let Some(system) = input.system_prompt {
        text.push_str(system);
    }
    let lower = text.to_lowercase();
    let total_chars = text.chars().count().max(1);

    // Code ratio: fenced-block characters plus file-path tokens.
    let code_chars = fenced_block_chars(&text)
        + FILE_PATH_RE
            .find_iter(&text)
            .map(|m| m.as_str().chars().count())
            .sum::<usize>();
    let code_ratio = (code_chars as f64 / total_chars as f64).min(1.0);

    // Complexity: length, code presence, multi-step structure, expert
    // vocabulary.
    let token_estimate = (text.len() + 3) / 4;
    let mut complexity = (token_estimate as f64 / 800.0).min(1.0) * 0.4;
    if code_ratio > 0.02 {
        complexity += 0.2;
    }
    if MULTI_STEP_RE.iter().any(|re| re.is_match(&lower)) {
        complexity += 0.2;
    }
    let expert = count_matches(&lower, EXPERT_KEYWORDS);
    complexity += match expert {
        0 => 0.0,
        1 => 0.1,
        _ => 0.2,
    };
    if !input.tool_names.is_empty() {
        complexity += 0.05;
    }

    let urgency = 0.3 * count_matches(&lower, URGENCY_KEYWORDS) as f64;
    let creativity = 0.25 * count_matches(&lower, CREATIVE_KEYWORDS) as f64;
    let mut precision = 0.2 * count_matches(&lower, PRECISION_KEYWORDS) as f64;
    if lower.chars().any(|c| c.is_ascii_digit()) {
        precision += 0.1;
    }

    let conversation_depth = (input.messages.len() as f64 / 20.0).min(1.0);
    let memory_load = if input.max_memory_hits == 0 {
        0.0
    } else {
        (input.memory_hits as f64 / input.max_memory_hits as f64).min(1.0)
    };

    TuriyaContext {
        complexity,
        urgency,
        creativity,
        precision,
        code_ratio,
        conversation_depth,
        memory_load,
    }
    .clamped()
}

/// Characters inside ``` fences. An unterminated fence counts to the end.
fn fenced_block_chars(text: &str) -> usize {
    text.split("```")
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, seg)| seg.chars().count())
        .sum()
}
