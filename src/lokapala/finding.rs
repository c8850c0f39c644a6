//! Typed guardian findings and the bounded ring that stores them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Millis;

/// Which guardian family produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianDomain {
    Security,
    Performance,
    Correctness,
}

impl std::fmt::Display for GuardianDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Security => write!(f, "security"),
            Self::Performance => write!(f, "performance"),
            Self::Correctness => write!(f, "correctness"),
        }
    }
}

/// Finding severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A guardian-emitted observation about a tool call or turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub guardian_id: String,
    pub domain: GuardianDomain,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// In `[0, 1]`; always at or above the owning guardian's threshold.
    pub confidence: f64,
    pub auto_fixable: bool,
    pub timestamp: Millis,
}

impl Finding {
    pub fn new(
        guardian_id: &str,
        domain: GuardianDomain,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
        timestamp: Millis,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            guardian_id: guardian_id.to_string(),
            domain,
            severity,
            title: title.into(),
            description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
            auto_fixable: false,
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Finding ring
// ---------------------------------------------------------------------------

/// Default ring capacity per guardian.
pub const DEFAULT_RING_CAPACITY: usize = 200;

/// Hard ceiling on ring capacity.
pub const MAX_RING_CAPACITY: usize = 10_000;

/// Fixed-capacity circular store of findings, read newest-first.
///
/// Push is O(1) and evicts at most one finding. Iteration walks backwards
/// from the write head, so the most recent finding always comes first.
#[derive(Debug, Clone)]
pub struct FindingRing {
    buf: Vec<Finding>,
    /// Index of the next write.
    head: usize,
    capacity: usize,
}

impl FindingRing {
    /// Create a ring; the capacity is clamped to `[1, 10_000]`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_RING_CAPACITY);
        Self {
            buf: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append a finding, returning the evicted one if the ring was full.
    pub fn push(&mut self, finding: Finding) -> Option<Finding> {
        if self.buf.len() < self.capacity {
            self.buf.push(finding);
            self.head = self.buf.len() % self.capacity;
            None
        } else {
            let evicted = std::mem::replace(&mut self.buf[self.head], finding);
            self.head = (self.head + 1) % self.capacity;
            Some(evicted)
        }
    }

    /// Iterate newest-first.
    pub fn iter_newest(&self) -> impl Iterator<Item = &Finding> {
        let len = self.buf.len();
        let head = self.head;
        let cap = self.capacity;
        // Walking backwards from the element just before the write head
        // always lands inside the initialized prefix.
        (0..len).map(move |i| &self.buf[(head + cap - 1 - i) % cap])
    }

    /// Snapshot newest-first, optionally limited.
    pub fn newest(&self, limit: Option<usize>) -> Vec<Finding> {
        let take = limit.unwrap_or(usize::MAX);
        self.iter_newest().take(take).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(n: u32) -> Finding {
        Finding::new(
            "test",
            GuardianDomain::Security,
            Severity::Low,
            format!("finding-{n}"),
            "",
            0.9,
            n as i64,
        )
    }

    #[test]
    fn newest_first_before_wrap() {
        let mut ring = FindingRing::new(4);
        for n in 0..3 {
            assert!(ring.push(finding(n)).is_none());
        }
        let titles: Vec<_> = ring.iter_newest().map(|f| f.title.clone()).collect();
        assert_eq!(titles, ["finding-2", "finding-1", "finding-0"]);
    }

    #[test]
    fn wrap_evicts_exactly_one_per_push() {
        let mut ring = FindingRing::new(3);
        for n in 0..3 {
            assert!(ring.push(finding(n)).is_none());
        }
        let evicted = ring.push(finding(3)).expect("full ring evicts");
        assert_eq!(evicted.title, "finding-0");
        assert_eq!(ring.len(), 3);
        let titles: Vec<_> = ring.iter_newest().map(|f| f.title.clone()).collect();
        assert_eq!(titles, ["finding-3", "finding-2", "finding-1"]);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let mut ring = FindingRing::new(8);
        for n in 0..100 {
            ring.push(finding(n));
            assert!(ring.len() <= 8);
        }
        // The last min(N, capacity) pushes are readable, newest-first.
        let titles: Vec<_> = ring.iter_newest().map(|f| f.title.clone()).collect();
        let expected: Vec<_> = (92..100).rev().map(|n| format!("finding-{n}")).collect();
        assert_eq!(titles, expected);
    }

    #[test]
    fn capacity_is_clamped() {
        assert_eq!(FindingRing::new(0).capacity(), 1);
        assert_eq!(FindingRing::new(1_000_000).capacity(), MAX_RING_CAPACITY);
    }

    #[test]
    fn limit_applies_to_snapshot() {
        let mut ring = FindingRing::new(10);
        for n in 0..5 {
            ring.push(finding(n));
        }
        let v = ring.newest(Some(2));
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].title, "finding-4");
    }

    #[test]
    fn finding_confidence_is_clamped() {
        let f = Finding::new(
            "test",
            GuardianDomain::Performance,
            Severity::Info,
            "t",
            "d",
            1.7,
            0,
        );
        assert_eq!(f.confidence, 1.0);
    }
}
