//! Gati: the performance guardian.
//!
//! Tracks per-tool latency and global token throughput with exponentially
//! weighted statistics, watches context-window usage with hysteresis, and
//! flags tight tool-call loops.

use std::collections::{HashMap, VecDeque};

use crate::clock::Millis;
use crate::lokapala::finding::{Finding, FindingRing, GuardianDomain, Severity};
use crate::lokapala::{GuardianConfig, GuardianStats};

pub const GUARDIAN_ID: &str = "gati";

/// Spike detectors need this many prior observations before firing.
const MIN_OBSERVATIONS: u64 = 4;

/// Absolute floors below which spikes are never flagged.
const TOKEN_SPIKE_FLOOR: f64 = 500.0;
const LATENCY_SPIKE_FLOOR_MS: f64 = 500.0;

/// Context-usage thresholds (percent) and the hysteresis reset margin.
const CONTEXT_WARN_PCT: f64 = 75.0;
const CONTEXT_CRITICAL_PCT: f64 = 90.0;
const CONTEXT_RESET_MARGIN_PCT: f64 = 5.0;

/// Same tool this many times in a row trips the repeat detector.
const REPEAT_WINDOW: usize = 3;

// ---------------------------------------------------------------------------
// Exponentially weighted mean and variance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct EwStats {
    mean: f64,
    var: f64,
    count: u64,
}

impl EwStats {
    const ALPHA: f64 = 0.3;

    fn observe(&mut self, x: f64) {
        self.count += 1;
        if self.count == 1 {
            self.mean = x;
            self.var = 0.0;
            return;
        }
        // West's incremental EW update.
        let delta = x - self.mean;
        let incr = Self::ALPHA * delta;
        self.mean += incr;
        self.var = (1.0 - Self::ALPHA) * (self.var + delta * incr);
    }

    fn stddev(&self) -> f64 {
        self.var.max(0.0).sqrt()
    }

    /// Spike boundary: `max(3*mean, mean + 3*stddev, floor)`.
    fn spike_threshold(&self, floor: f64) -> f64 {
        (3.0 * self.mean).max(self.mean + 3.0 * self.stddev()).max(floor)
    }
}

/// Per-turn observations handed to the guardian after each turn completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnMetrics {
    pub tokens_consumed: u32,
    /// Context-window usage as a percentage, when the transport reports it.
    pub context_used_pct: Option<f64>,
}

// ---------------------------------------------------------------------------
// Guardian
// ---------------------------------------------------------------------------

pub struct Gati {
    enabled: bool,
    confidence_threshold: f64,
    ring: FindingRing,
    scans: u64,
    emitted: u64,
    suppressed: u64,

    tool_latency: HashMap<String, EwStats>,
    token_rate: EwStats,
    recent_tools: VecDeque<String>,
    repeat_fired: bool,
    context_warn_latched: bool,
    context_critical_latched: bool,
}

impl Gati {
    pub fn new(config: &GuardianConfig) -> Self {
        Self {
            enabled: true,
            confidence_threshold: config.confidence_threshold,
            ring: FindingRing::new(config.ring_capacity),
            scans: 0,
            emitted: 0,
            suppressed: 0,
            tool_latency: HashMap::new(),
            token_rate: EwStats::default(),
            recent_tools: VecDeque::with_capacity(REPEAT_WINDOW),
            repeat_fired: false,
            context_warn_latched: false,
            context_critical_latched: false,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn stats(&self) -> GuardianStats {
        GuardianStats {
            scans: self.scans,
            emitted: self.emitted,
            suppressed: self.suppressed,
            ring_len: self.ring.len(),
        }
    }

    pub fn findings(&self, limit: Option<usize>) -> Vec<Finding> {
        self.ring.newest(limit)
    }

    /// Streaming observation of one tool execution.
    pub fn observe_execution(
        &mut self,
        tool_name: &str,
        duration_ms: f64,
        now: Millis,
    ) -> Vec<Finding> {
        if !self.enabled {
            return Vec::new();
        }
        self.scans += 1;
        let mut findings = Vec::new();

        // Latency spike: judged against statistics from prior observations,
        // then the new sample is folded in.
        let (count, threshold, mean) = {
            let stats = self.tool_latency.entry(tool_name.to_string()).or_default();
            (
                stats.count,
                stats.spike_threshold(LATENCY_SPIKE_FLOOR_MS),
                stats.mean,
            )
        };
        if count >= MIN_OBSERVATIONS && duration_ms > threshold {
            findings.extend(self.emit(
                Severity::Medium,
                "Tool latency spike",
                format!("{tool_name} took {duration_ms:.0}ms against an average of {mean:.0}ms"),
                0.75,
                now,
            ));
        }
        self.tool_latency
            .get_mut(tool_name)
            .expect("entry just created")
            .observe(duration_ms);

        // Repeated calls: same tool three times in a row, reported once.
        if self
            .recent_tools
            .back()
            .is_some_and(|last| last != tool_name)
        {
            self.repeat_fired = false;
        }
        self.recent_tools.push_back(tool_name.to_string());
        if self.recent_tools.len() > REPEAT_WINDOW {
            self.recent_tools.pop_front();
        }
        let all_same = self.recent_tools.len() == REPEAT_WINDOW
            && self.recent_tools.iter().all(|t| t == tool_name);
        if all_same && !self.repeat_fired {
            self.repeat_fired = true;
            findings.extend(self.emit(
                Severity::Low,
                "Repeated tool calls",
                format!("{tool_name} called {REPEAT_WINDOW} times consecutively"),
                0.70,
                now,
            ));
        }

        findings
    }

    /// Streaming observation of per-turn metrics.
    pub fn observe_turn(&mut self, metrics: &TurnMetrics, now: Millis) -> Vec<Finding> {
        if !self.enabled {
            return Vec::new();
        }
        self.scans += 1;
        let mut findings = Vec::new();

        // Token burn spike against the global EWMA.
        let tokens = metrics.tokens_consumed as f64;
        if self.token_rate.count >= MIN_OBSERVATIONS {
            let threshold = self.token_rate.spike_threshold(TOKEN_SPIKE_FLOOR);
            if tokens > threshold {
                let mean = self.token_rate.mean;
                findings.extend(self.emit(
                    Severity::Medium,
                    "Token burn spike",
                    format!("turn consumed {tokens:.0} tokens against an average of {mean:.0}"),
                    0.80,
                    now,
                ));
            }
        }
        self.token_rate.observe(tokens);

        // Context-window hysteresis: one finding per crossing, reset when
        // usage drops at least the margin below the threshold.
        if let Some(pct) = metrics.context_used_pct {
            if pct < CONTEXT_CRITICAL_PCT - CONTEXT_RESET_MARGIN_PCT {
                self.context_critical_latched = false;
            }
            if pct < CONTEXT_WARN_PCT - CONTEXT_RESET_MARGIN_PCT {
                self.context_warn_latched = false;
            }

            if pct >= CONTEXT_CRITICAL_PCT {
                if !self.context_critical_latched {
                    self.context_critical_latched = true;
                    self.context_warn_latched = true;
                    findings.extend(self.emit(
                        Severity::Critical,
                        "Context window nearly exhausted",
                        format!("context usage at {pct:.0}%"),
                        0.95,
                        now,
                    ));
                }
            } else if pct >= CONTEXT_WARN_PCT && !self.context_warn_latched {
                self.context_warn_latched = true;
                findings.extend(self.emit(
                    Severity::Medium,
                    "Context window filling up",
                    format!("context usage at {pct:.0}%"),
                    0.90,
                    now,
                ));
            }
        }

        findings
    }

    fn emit(
        &mut self,
        severity: Severity,
        title: &str,
        description: String,
        confidence: f64,
        now: Millis,
    ) -> Option<Finding> {
        if confidence < self.confidence_threshold {
            self.suppressed += 1;
            return None;
        }
        let finding = Finding::new(
            GUARDIAN_ID,
            GuardianDomain::Performance,
            severity,
            title,
            description,
            confidence,
            now,
        );
        tracing::info!(
            target: "audit",
            guardian = GUARDIAN_ID,
            severity = %severity,
            title,
            "performance finding emitted"
        );
        self.emitted += 1;
        self.ring.push(finding.clone());
        Some(finding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guardian() -> Gati {
        Gati::new(&GuardianConfig::default())
    }

    #[test]
    fn latency_spike_needs_history() {
        let mut g = guardian();
        // Three quiet observations: no baseline yet, nothing fires.
        for _ in 0..3 {
            assert!(g.observe_execution("grep", 100.0, 0).is_empty());
        }
        // Fourth observation is a huge spike, but only 3 priors exist.
        assert!(g.observe_execution("grep", 10_000.0, 0).is_empty());
    }

    #[test]
    fn latency_spike_fires_after_baseline() {
        let mut g = guardian();
        for _ in 0..5 {
            g.observe_execution("grep", 100.0, 0);
        }
        let findings = g.observe_execution("grep", 5_000.0, 0);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "Tool latency spike");
    }

    #[test]
    fn latency_floor_suppresses_fast_tools() {
        let mut g = guardian();
        // Mean ~10ms: even 30x the mean stays under the 500ms floor.
        for _ in 0..6 {
            g.observe_execution("ls", 10.0, 0);
        }
        assert!(g.observe_execution("ls", 300.0, 0).is_empty());
    }

    #[test]
    fn latency_is_tracked_per_tool() {
        let mut g = guardian();
        for _ in 0..5 {
            g.observe_execution("fast", 50.0, 0);
        }
        // A different tool with no history never spikes.
        assert!(g.observe_execution("slow", 60_000.0, 0).is_empty());
    }

    #[test]
    fn repeated_calls_fire_once() {
        let mut g = guardian();
        assert!(g.observe_execution("search", 10.0, 0).is_empty());
        assert!(g.observe_execution("search", 10.0, 0).is_empty());
        let third = g.observe_execution("search", 10.0, 0);
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].title, "Repeated tool calls");
        // Fourth consecutive call does not re-fire.
        assert!(g.observe_execution("search", 10.0, 0).is_empty());
        // Breaking the run re-arms the detector.
        g.observe_execution("read", 10.0, 0);
        g.observe_execution("search", 10.0, 0);
        g.observe_execution("search", 10.0, 0);
        let again = g.observe_execution("search", 10.0, 0);
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn token_burn_spike_after_baseline() {
        let mut g = guardian();
        for _ in 0..5 {
            g.observe_turn(
                &TurnMetrics {
                    tokens_consumed: 200,
                    context_used_pct: None,
                },
                0,
            );
        }
        let findings = g.observe_turn(
            &TurnMetrics {
                tokens_consumed: 5_000,
                context_used_pct: None,
            },
            0,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "Token burn spike");
    }

    #[test]
    fn token_floor_suppresses_small_turns() {
        let mut g = guardian();
        for _ in 0..5 {
            g.observe_turn(
                &TurnMetrics {
                    tokens_consumed: 50,
                    context_used_pct: None,
                },
                0,
            );
        }
        // 400 tokens is 8x the mean but under the 500-token floor.
        let findings = g.observe_turn(
            &TurnMetrics {
                tokens_consumed: 400,
                context_used_pct: None,
            },
            0,
        );
        assert!(findings.is_empty());
    }

    fn ctx(pct: f64) -> TurnMetrics {
        TurnMetrics {
            tokens_consumed: 0,
            context_used_pct: Some(pct),
        }
    }

    #[test]
    fn context_warning_fires_once_with_hysteresis() {
        let mut g = guardian();
        let first = g.observe_turn(&ctx(78.0), 0);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].severity, Severity::Medium);
        // Still above threshold: latched, no chatter.
        assert!(g.observe_turn(&ctx(79.0), 0).is_empty());
        // Dropping to 71% is inside the 5% margin: still latched.
        assert!(g.observe_turn(&ctx(71.0), 0).is_empty());
        // Below 70% resets the latch; the next crossing fires again.
        assert!(g.observe_turn(&ctx(69.0), 0).is_empty());
        let again = g.observe_turn(&ctx(80.0), 0);
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn context_critical_escalates() {
        let mut g = guardian();
        g.observe_turn(&ctx(78.0), 0);
        let critical = g.observe_turn(&ctx(93.0), 0);
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].severity, Severity::Critical);
        // Latched at critical.
        assert!(g.observe_turn(&ctx(95.0), 0).is_empty());
        // Falling back to 80% clears critical but not the warning latch.
        assert!(g.observe_turn(&ctx(80.0), 0).is_empty());
        let re_critical = g.observe_turn(&ctx(91.0), 0);
        assert_eq!(re_critical.len(), 1);
        assert_eq!(re_critical[0].severity, Severity::Critical);
    }

    #[test]
    fn disabled_guardian_observes_nothing() {
        let mut g = guardian();
        g.set_enabled(false);
        assert!(g.observe_execution("x", 99_999.0, 0).is_empty());
        assert!(g.observe_turn(&ctx(99.0), 0).is_empty());
        assert_eq!(g.stats().scans, 0);
    }
}
