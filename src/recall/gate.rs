//! Retrieval pre-gate.
//!
//! A cheap lexical check that decides whether a query is worth sending to
//! the search backends at all. Most short conversational turns are not.

/// Minimum word count that makes a query retrieval-worthy on length alone.
const LONG_QUERY_WORDS: usize = 12;

static PAST_REFERENCE: &[&str] = &["did we", "when did", "how did"];
static MEMORY_VERBS: &[&str] = &["remember", "recall", "previously", "discussed"];
static SEARCH_VERBS: &[&str] = &["search", "find", "look up", "grep", "locate"];
static SCOPE_TAGS: &[&str] = &["session:", "project memory"];

/// The lexical cues that triggered retrieval, for rationale strings.
pub fn retrieval_signals(query: &str) -> Vec<&'static str> {
    let lower = query.to_lowercase();
    let mut signals = Vec::new();

    if PAST_REFERENCE.iter().any(|p| lower.contains(p)) {
        signals.push("past-reference");
    }
    if MEMORY_VERBS.iter().any(|p| lower.contains(p)) {
        signals.push("memory-verb");
    }
    if SEARCH_VERBS.iter().any(|p| lower.contains(p)) {
        signals.push("search-verb");
    }
    if lower.split_whitespace().count() >= LONG_QUERY_WORDS {
        signals.push("long-query");
    }
    if SCOPE_TAGS.iter().any(|p| lower.contains(p)) {
        signals.push("scope-tag");
    }
    signals
}

/// Whether `gated_search` should actually query the backends.
pub fn should_retrieve(query: &str) -> bool {
    !retrieval_signals(query).is_empty()
}
