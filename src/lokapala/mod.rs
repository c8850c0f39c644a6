//! Lokapala: the guardian layer.
//!
//! Three streaming observers watch every tool execution and turn: Rakshaka
//! (security), Gati (performance), and Satya (correctness). The controller
//! fans observations out, aggregates the per-guardian finding rings, and
//! broadcasts typed events to registered listeners.

mod finding;
mod gati;
mod rakshaka;
mod satya;

pub use finding::{
    Finding, FindingRing, GuardianDomain, Severity, DEFAULT_RING_CAPACITY, MAX_RING_CAPACITY,
};
pub use gati::{Gati, TurnMetrics};
pub use rakshaka::{FileChange, Rakshaka};
pub use satya::Satya;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::types::Turn;

// ---------------------------------------------------------------------------
// Shared guardian configuration
// ---------------------------------------------------------------------------

/// Configuration shared by all three guardians.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianConfig {
    /// Findings below this confidence are discarded before emission.
    /// Clamped to `[0.05, 1.0]`.
    pub confidence_threshold: f64,
    /// Per-guardian finding ring capacity. Clamped to `[1, 10_000]`.
    pub ring_capacity: usize,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            ring_capacity: DEFAULT_RING_CAPACITY,
        }
    }
}

impl GuardianConfig {
    pub fn validated(mut self) -> Self {
        let clamped = if self.confidence_threshold.is_finite() {
            self.confidence_threshold.clamp(0.05, 1.0)
        } else {
            Self::default().confidence_threshold
        };
        if clamped != self.confidence_threshold {
            tracing::warn!(
                requested = self.confidence_threshold,
                clamped,
                "guardian confidence threshold out of range"
            );
            self.confidence_threshold = clamped;
        }
        let cap = self.ring_capacity.clamp(1, MAX_RING_CAPACITY);
        if cap != self.ring_capacity {
            tracing::warn!(
                requested = self.ring_capacity,
                clamped = cap,
                "guardian ring capacity out of range"
            );
            self.ring_capacity = cap;
        }
        self
    }
}

/// Per-guardian counters exposed through `stats()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GuardianStats {
    pub scans: u64,
    pub emitted: u64,
    pub suppressed: u64,
    pub ring_len: usize,
}

/// Aggregated controller statistics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LokapalaStats {
    pub rakshaka: GuardianStats,
    pub gati: GuardianStats,
    pub satya: GuardianStats,
}

impl LokapalaStats {
    pub fn total_emitted(&self) -> u64 {
        self.rakshaka.emitted + self.gati.emitted + self.satya.emitted
    }
}

// ---------------------------------------------------------------------------
// Events and listeners
// ---------------------------------------------------------------------------

/// Typed broadcast events. Every variant is exhaustively handled at call
/// sites; there is no string-keyed dispatch.
#[derive(Debug, Clone)]
pub enum LokapalaEvent {
    FindingEmitted(Finding),
    GuardianToggled {
        guardian: &'static str,
        enabled: bool,
    },
}

type Listener = Box<dyn Fn(&LokapalaEvent) + Send>;

/// Handle returned by [`Lokapala::on_finding`]; pass to
/// [`Lokapala::unsubscribe`] to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle(u64);

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Holds the three guardians behind one interface.
pub struct Lokapala {
    rakshaka: Rakshaka,
    gati: Gati,
    satya: Satya,
    listeners: Vec<(u64, Listener)>,
    next_listener: u64,
    clock: Arc<dyn Clock>,
}

impl Lokapala {
    pub fn new(config: GuardianConfig, clock: Arc<dyn Clock>) -> Self {
        let config = config.validated();
        Self {
            rakshaka: Rakshaka::new(&config),
            gati: Gati::new(&config),
            satya: Satya::new(&config),
            listeners: Vec::new(),
            next_listener: 0,
            clock,
        }
    }

    pub fn rakshaka(&self) -> &Rakshaka {
        &self.rakshaka
    }

    pub fn gati(&self) -> &Gati {
        &self.gati
    }

    pub fn satya(&self) -> &Satya {
        &self.satya
    }

    /// Dispatch one finished tool execution to the security and performance
    /// guardians; returns the union of new findings.
    pub fn after_tool_execution(
        &mut self,
        tool_name: &str,
        args: &serde_json::Map<String, serde_json::Value>,
        output: Option<&str>,
        duration_ms: f64,
    ) -> Vec<Finding> {
        let now = self.clock.now_millis();
        let mut findings = self.rakshaka.scan(tool_name, args, output, now);
        findings.extend(self.gati.observe_execution(tool_name, duration_ms, now));
        self.broadcast_findings(&findings);
        findings
    }

    /// Dispatch one completed turn to the correctness and performance
    /// guardians.
    pub fn after_turn(&mut self, turn: &Turn, metrics: &TurnMetrics) -> Vec<Finding> {
        let now = self.clock.now_millis();
        let mut findings = self.satya.observe_turn(turn, now);
        findings.extend(self.gati.observe_turn(metrics, now));
        self.broadcast_findings(&findings);
        findings
    }

    /// Dispatch file-change / command-output context to the security
    /// guardian.
    pub fn after_file_changes(
        &mut self,
        changes: &[FileChange],
        command_output: Option<&str>,
    ) -> Vec<Finding> {
        let now = self.clock.now_millis();
        let findings = self.rakshaka.observe_changes(changes, command_output, now);
        self.broadcast_findings(&findings);
        findings
    }

    /// All findings across every guardian ring, newest first.
    pub fn all_findings(&self, limit: Option<usize>) -> Vec<Finding> {
        let mut all: Vec<Finding> = self
            .rakshaka
            .findings(None)
            .into_iter()
            .chain(self.gati.findings(None))
            .chain(self.satya.findings(None))
            .collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            all.truncate(limit);
        }
        all
    }

    pub fn findings_by_domain(&self, domain: GuardianDomain) -> Vec<Finding> {
        self.all_findings(None)
            .into_iter()
            .filter(|f| f.domain == domain)
            .collect()
    }

    pub fn critical_findings(&self) -> Vec<Finding> {
        self.all_findings(None)
            .into_iter()
            .filter(|f| f.severity == Severity::Critical)
            .collect()
    }

    pub fn stats(&self) -> LokapalaStats {
        LokapalaStats {
            rakshaka: self.rakshaka.stats(),
            gati: self.gati.stats(),
            satya: self.satya.stats(),
        }
    }

    /// Enable or disable one guardian by domain.
    pub fn set_enabled(&mut self, domain: GuardianDomain, enabled: bool) {
        let guardian = match domain {
            GuardianDomain::Security => {
                self.rakshaka.set_enabled(enabled);
                rakshaka::GUARDIAN_ID
            }
            GuardianDomain::Performance => {
                self.gati.set_enabled(enabled);
                gati::GUARDIAN_ID
            }
            GuardianDomain::Correctness => {
                self.satya.set_enabled(enabled);
                satya::GUARDIAN_ID
            }
        };
        self.broadcast(&LokapalaEvent::GuardianToggled { guardian, enabled });
    }

    /// Register a listener; returns an unsubscribe handle. Listeners run
    /// synchronously in registration order; a panicking listener is isolated
    /// and never aborts the remaining listeners or the originating
    /// operation.
    pub fn on_finding(
        &mut self,
        listener: impl Fn(&LokapalaEvent) + Send + 'static,
    ) -> ListenerHandle {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        ListenerHandle(id)
    }

    pub fn unsubscribe(&mut self, handle: ListenerHandle) {
        self.listeners.retain(|(id, _)| *id != handle.0);
    }

    fn broadcast_findings(&self, findings: &[Finding]) {
        for finding in findings {
            self.broadcast(&LokapalaEvent::FindingEmitted(finding.clone()));
        }
    }

    fn broadcast(&self, event: &LokapalaEvent) {
        for (id, listener) in &self.listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(listener = *id, "lokapala listener panicked; continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn controller() -> Lokapala {
        Lokapala::new(GuardianConfig::default(), Arc::new(FixedClock::at(1_000)))
    }

    fn shell_args(command: &str) -> serde_json::Map<String, serde_json::Value> {
        let mut m = serde_json::Map::new();
        m.insert("command".into(), serde_json::Value::String(command.into()));
        m
    }

    #[test]
    fn tool_execution_fans_out_to_guardians() {
        let mut c = controller();
        let findings =
            c.after_tool_execution("bash", &shell_args("rm -rf /etc"), None, 12.0);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].domain, GuardianDomain::Security);
        assert_eq!(c.stats().rakshaka.emitted, 1);
        assert_eq!(c.stats().gati.scans, 1);
    }

    #[test]
    fn all_findings_merge_newest_first() {
        let clock = Arc::new(FixedClock::at(1_000));
        let mut c = Lokapala::new(GuardianConfig::default(), clock.clone());
        c.after_tool_execution("bash", &shell_args("chmod 777 /var/www"), None, 5.0);
        clock.advance(10);
        c.after_turn(
            &Turn::user(1, "try again", 0),
            &TurnMetrics::default(),
        );
        let all = c.all_findings(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].guardian_id, "satya");
        assert_eq!(all[1].guardian_id, "rakshaka");
        assert!(all[0].timestamp >= all[1].timestamp);
    }

    #[test]
    fn limit_and_domain_filters() {
        let mut c = controller();
        c.after_tool_execution("bash", &shell_args("chmod 777 /srv"), None, 5.0);
        c.after_turn(&Turn::user(1, "undo", 0), &TurnMetrics::default());
        assert_eq!(c.all_findings(Some(1)).len(), 1);
        assert_eq!(
            c.findings_by_domain(GuardianDomain::Correctness).len(),
            1
        );
        assert_eq!(c.critical_findings().len(), 1); // the chmod
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let mut c = controller();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (o1, o2) = (order.clone(), order.clone());
        c.on_finding(move |_| o1.lock().unwrap().push(1));
        c.on_finding(move |_| o2.lock().unwrap().push(2));
        c.after_turn(&Turn::user(1, "try again", 0), &TurnMetrics::default());
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let mut c = controller();
        let count = Arc::new(AtomicUsize::new(0));
        let observed = count.clone();
        c.on_finding(|_| panic!("listener bug"));
        c.on_finding(move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        let findings = c.after_turn(&Turn::user(1, "try again", 0), &TurnMetrics::default());
        // The originating operation still returns its findings and the
        // second listener still ran.
        assert_eq!(findings.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_removes_listener() {
        let mut c = controller();
        let count = Arc::new(AtomicUsize::new(0));
        let observed = count.clone();
        let handle = c.on_finding(move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        c.unsubscribe(handle);
        c.after_turn(&Turn::user(1, "try again", 0), &TurnMetrics::default());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn toggling_a_guardian_broadcasts_and_silences() {
        let mut c = controller();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        c.on_finding(move |e| {
            if let LokapalaEvent::GuardianToggled { guardian, enabled } = e {
                sink.lock().unwrap().push((*guardian, *enabled));
            }
        });
        c.set_enabled(GuardianDomain::Security, false);
        assert_eq!(*events.lock().unwrap(), vec![("rakshaka", false)]);
        let findings = c.after_tool_execution("bash", &shell_args("rm -rf /"), None, 1.0);
        assert!(findings.is_empty());
    }

    #[test]
    fn file_change_context_reaches_rakshaka() {
        let mut c = controller();
        let findings = c.after_file_changes(
            &[FileChange {
                path: "../../.ssh/id_rsa".into(),
            }],
            None,
        );
        assert_eq!(findings.len(), 2);
    }
}
