//! Satya: the correctness guardian.
//!
//! Watches the conversation itself: user corrections, runs of failing tool
//! calls, tasks that are announced but never finished, and failing test
//! runners.

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;

use crate::clock::Millis;
use crate::lokapala::finding::{Finding, FindingRing, GuardianDomain, Severity};
use crate::lokapala::{GuardianConfig, GuardianStats};
use crate::types::{Turn, TurnRole};

pub const GUARDIAN_ID: &str = "satya";

/// Consecutive tool failures that constitute a streak.
const STREAK_THRESHOLD: u32 = 3;

/// Failures within the storm window that constitute a storm.
const STORM_THRESHOLD: u32 = 5;

/// Storm window, in turns.
const STORM_WINDOW_TURNS: u32 = 6;

/// Turns an announced task may stay open before it is flagged.
const INCOMPLETE_TASK_TURNS: u32 = 15;

/// The third correction in a session escalates to critical.
const CORRECTION_ESCALATION: u32 = 3;

static CORRECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bno,?\s+that'?s\s+wrong\b",
        r"(?i)\bnot\s+what\s+i\s+(meant|asked)\b",
        r"(?i)\btry\s+again\b",
        r"(?i)\bundo\b",
        r"(?i)\bi\s+said\b",
        r"(?i)\bi\s+meant\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static TASK_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(i'?ll\s+start|let\s+me\s+begin|i'?ll\s+begin|i'?m\s+going\s+to|starting\s+(on|with))\b")
        .unwrap()
});

static TASK_COMPLETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(done|finished|completed?|all\s+changes\s+have\s+been\s+made)\b").unwrap()
});

/// Known test-runner families, matched against tool names and command args.
static TEST_RUNNERS: &[&str] = &["vitest", "pytest", "jest", "go test", "cargo test"];

fn detect_test_runner(call_name: &str, args: &serde_json::Map<String, serde_json::Value>) -> Option<&'static str> {
    let mut haystack = call_name.to_lowercase();
    for value in args.values() {
        if let Some(s) = value.as_str() {
            haystack.push(' ');
            haystack.push_str(&s.to_lowercase());
        }
    }
    TEST_RUNNERS.iter().find(|r| haystack.contains(*r)).copied()
}

#[derive(Debug, Clone)]
struct OpenTask {
    opened_turn: u32,
    excerpt: String,
    flagged: bool,
}

pub struct Satya {
    enabled: bool,
    confidence_threshold: f64,
    ring: FindingRing,
    scans: u64,
    emitted: u64,
    suppressed: u64,

    correction_count: u32,
    error_streak: u32,
    streak_fired: bool,
    /// `(turn_number, failures)` for the storm window.
    failure_window: VecDeque<(u32, u32)>,
    storm_fired: bool,
    open_task: Option<OpenTask>,
    last_turn_number: Option<u32>,
}

impl Satya {
    pub fn new(config: &GuardianConfig) -> Self {
        Self {
            enabled: true,
            confidence_threshold: config.confidence_threshold,
            ring: FindingRing::new(config.ring_capacity),
            scans: 0,
            emitted: 0,
            suppressed: 0,
            correction_count: 0,
            error_streak: 0,
            streak_fired: false,
            failure_window: VecDeque::new(),
            storm_fired: false,
            open_task: None,
            last_turn_number: None,
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

    /// Forget per-session tracking (correction counts, streaks, open tasks).
    pub fn reset_session(&mut self) {
        self.correction_count = 0;
        self.error_streak = 0;
        self.streak_fired = false;
        self.failure_window.clear();
        self.storm_fired = false;
        self.open_task = None;
        self.last_turn_number = None;
    }

    /// One-shot scan of a whole session transcript.
    pub fn scan_session(&mut self, turns: &[Turn], now: Millis) -> Vec<Finding> {
        if !self.enabled {
            return Vec::new();
        }
        self.reset_session();
        turns
            .iter()
            .flat_map(|turn| self.observe_turn(turn, now))
            .collect()
    }

    /// Streaming observation of one recorded turn.
    ///
    /// Turn numbers must increase strictly within a session; an out-of-order
    /// or replayed turn is ignored so the streak and storm windows stay
    /// well-anchored.
    pub fn observe_turn(&mut self, turn: &Turn, now: Millis) -> Vec<Finding> {
        if !self.enabled {
            return Vec::new();
        }
        if let Some(last) = self.last_turn_number {
            if turn.turn_number <= last {
                tracing::debug!(
                    turn = turn.turn_number,
                    last,
                    "out-of-order turn ignored by satya"
                );
                return Vec::new();
            }
        }
        self.last_turn_number = Some(turn.turn_number);
        self.scans += 1;

        let mut findings = Vec::new();
        match turn.role {
            TurnRole::User => self.observe_user_turn(turn, now, &mut findings),
            TurnRole::Assistant => self.observe_assistant_turn(turn, now, &mut findings),
        }
        self.observe_tool_results(turn, now, &mut findings);
        findings
    }

    fn observe_user_turn(&mut self, turn: &Turn, now: Millis, findings: &mut Vec<Finding>) {
        for pattern in CORRECTION_PATTERNS.iter() {
            if pattern.is_match(&turn.content) {
                self.correction_count += 1;
                let severity = if self.correction_count >= CORRECTION_ESCALATION {
                    Severity::Critical
                } else {
                    Severity::Medium
                };
                findings.extend(self.emit(
                    severity,
                    "User correction",
                    format!(
                        "correction #{} detected in turn {}",
                        self.correction_count, turn.turn_number
                    ),
                    0.85,
                    now,
                ));
            }
        }
    }

    fn observe_assistant_turn(&mut self, turn: &Turn, now: Millis, findings: &mut Vec<Finding>) {
        // Completion first: "done, starting on the next piece" closes the
        // old task before opening a new one.
        if TASK_COMPLETE.is_match(&turn.content) {
            self.open_task = None;
        }
        if self.open_task.is_none() && TASK_START.is_match(&turn.content) {
            self.open_task = Some(OpenTask {
                opened_turn: turn.turn_number,
                excerpt: turn.content.chars().take(80).collect(),
                flagged: false,
            });
        }

        if let Some(task) = &mut self.open_task {
            if !task.flagged && turn.turn_number.saturating_sub(task.opened_turn) > INCOMPLETE_TASK_TURNS
            {
                task.flagged = true;
                let opened = task.opened_turn;
                let excerpt = task.excerpt.clone();
                findings.extend(self.emit(
                    Severity::Medium,
                    "Incomplete task",
                    format!(
                        "task announced in turn {opened} still open at turn {}: {excerpt}",
                        turn.turn_number
                    ),
                    0.70,
                    now,
                ));
            }
        }
    }

    fn observe_tool_results(&mut self, turn: &Turn, now: Millis, findings: &mut Vec<Finding>) {
        let calls = match &turn.tool_calls {
            Some(calls) if !calls.is_empty() => calls,
            _ => return,
        };

        let mut failures = 0u32;
        let mut any_success = false;
        for call in calls {
            if call.success {
                any_success = true;
                continue;
            }
            failures += 1;
            if let Some(runner) = detect_test_runner(&call.name, &call.args) {
                findings.extend(self.emit(
                    Severity::High,
                    "Test failure",
                    format!("{runner} reported failure in turn {}", turn.turn_number),
                    0.90,
                    now,
                ));
            }
        }

        // Streak: any success in the turn resets it.
        if any_success {
            self.error_streak = 0;
            self.streak_fired = false;
        } else {
            self.error_streak += failures;
            if self.error_streak >= STREAK_THRESHOLD && !self.streak_fired {
                self.streak_fired = true;
                let streak = self.error_streak;
                findings.extend(self.emit(
                    Severity::High,
                    "Error streak",
                    format!("{streak} consecutive tool failures"),
                    0.80,
                    now,
                ));
            }
        }

        // Storm: failures within the trailing window of turns.
        self.failure_window.push_back((turn.turn_number, failures));
        while self
            .failure_window
            .front()
            .is_some_and(|(t, _)| *t + STORM_WINDOW_TURNS <= turn.turn_number)
        {
            self.failure_window.pop_front();
        }
        let windowed: u32 = self.failure_window.iter().map(|(_, f)| f).sum();
        if windowed >= STORM_THRESHOLD {
            if !self.storm_fired {
                self.storm_fired = true;
                findings.extend(self.emit(
                    Severity::Critical,
                    "Error storm",
                    format!("{windowed} tool failures within the last {STORM_WINDOW_TURNS} turns"),
                    0.90,
                    now,
                ));
            }
        } else {
            self.storm_fired = false;
        }
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
            GuardianDomain::Correctness,
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
            "correctness finding emitted"
        );
        self.emitted += 1;
        self.ring.push(finding.clone());
        Some(finding)
    }
}
