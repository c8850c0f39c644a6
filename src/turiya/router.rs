//! The Turiya router: contextual bandit assignment of turns to tiers.
//!
//! Cold starts route on a deterministic complexity/urgency heuristic; once
//! enough outcomes have been observed, per-arm LinUCB scores take over,
//! shaped by an optional budget dual and a user cost/quality preference.
//! Low-confidence decisions cascade one tier up.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::math::sigmoid;
use crate::turiya::arms::{ArmState, TuriyaArm};
use crate::turiya::features::TuriyaContext;
use crate::types::Tier;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Router configuration. Out-of-range values are clamped by `validated()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuriyaConfig {
    /// LinUCB exploration multiplier.
    pub linucb_alpha: f64,
    /// Plays before the learned regime takes over from the heuristic.
    pub cold_start_plays: u64,
    /// Cascade threshold: decisions below this confidence escalate.
    pub quality_threshold: f64,
    /// Daily budget in dollars; the dual penalty activates only when this
    /// and `expected_daily_requests` are both set.
    pub daily_budget: Option<f64>,
    pub expected_daily_requests: Option<u64>,
    /// Cost/quality preference in `[0, 1]`: 0 = quality only, 1 = cheapest.
    pub cost_weight: Option<f64>,
    /// Dual-ascent learning rate for the budget multiplier.
    pub lambda_learning_rate: f64,
    /// Estimated per-request cost by tier, increasing with tier.
    pub tier_costs: [f64; 4],
}

impl Default for TuriyaConfig {
    fn default() -> Self {
        Self {
            linucb_alpha: 0.5,
            cold_start_plays: 12,
            quality_threshold: 0.5,
            daily_budget: None,
            expected_daily_requests: None,
            cost_weight: None,
            lambda_learning_rate: 1.0,
            tier_costs: [0.0, 0.001, 0.01, 0.05],
        }
    }
}

impl TuriyaConfig {
    pub fn validated(mut self) -> Self {
        if !(self.linucb_alpha.is_finite() && self.linucb_alpha > 0.0) {
            tracing::warn!(requested = self.linucb_alpha, "linucb_alpha out of range");
            self.linucb_alpha = Self::default().linucb_alpha;
        }
        if let Some(w) = self.cost_weight {
            let clamped = if w.is_finite() { w.clamp(0.0, 1.0) } else { 0.0 };
            if clamped != w {
                tracing::warn!(requested = w, clamped, "cost_weight out of range");
            }
            self.cost_weight = Some(clamped);
        }
        if !(self.lambda_learning_rate.is_finite() && self.lambda_learning_rate >= 0.0) {
            self.lambda_learning_rate = Self::default().lambda_learning_rate;
        }
        self
    }

    fn budget_per_request(&self) -> Option<f64> {
        match (self.daily_budget, self.expected_daily_requests) {
            (Some(budget), Some(requests)) if requests > 0 => Some(budget / requests as f64),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// One routing decision. Immutable once emitted; cascading produces a new
/// decision that shares the same context.
#[derive(Debug, Clone)]
pub struct TuriyaDecision {
    pub tier: Tier,
    pub arm_index: usize,
    pub confidence: f64,
    pub cost_estimate: f64,
    pub context: Arc<TuriyaContext>,
    pub rationale: String,
    /// Set on cascade results: the tier the router originally chose.
    pub original_tier: Option<Tier>,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TierStats {
    pub tier: Tier,
    pub calls: u64,
    pub average_reward: f64,
    pub total_cost: f64,
    pub alpha: f64,
    pub beta: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TuriyaStats {
    pub tiers: Vec<TierStats>,
    pub total_requests: u64,
    pub total_cost: f64,
    pub opus_baseline_cost: f64,
    /// What routing everything to opus would have cost, minus what it did.
    pub cost_savings: f64,
    pub savings_percent: f64,
}

// ---------------------------------------------------------------------------
// Persisted state
// ---------------------------------------------------------------------------

/// Portable router state. Missing or ill-typed fields deserialize to their
/// defaults and are repaired on restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuriyaState {
    #[serde(default = "default_schema")]
    pub schema: u32,
    #[serde(default)]
    pub total_plays: u64,
    #[serde(default = "default_linucb_alpha")]
    pub linucb_alpha: f64,
    #[serde(default)]
    pub budget_lambda: f64,
    #[serde(default)]
    pub opus_baseline_cost: f64,
    #[serde(default)]
    pub arms: Vec<ArmState>,
}

fn default_linucb_alpha() -> f64 {
    0.5
}

fn default_schema() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Contextual multi-armed bandit over the four tiers.
pub struct TuriyaRouter {
    config: TuriyaConfig,
    arms: [TuriyaArm; 4],
    total_plays: u64,
    budget_lambda: f64,
    opus_baseline_cost: f64,
}

impl TuriyaRouter {
    pub fn new(config: TuriyaConfig) -> Self {
        Self {
            config: config.validated(),
            arms: Tier::ALL.map(TuriyaArm::new),
            total_plays: 0,
            budget_lambda: 0.0,
            opus_baseline_cost: 0.0,
        }
    }

    pub fn config(&self) -> &TuriyaConfig {
        &self.config
    }

    pub fn total_plays(&self) -> u64 {
        self.total_plays
    }

    pub fn budget_lambda(&self) -> f64 {
        self.budget_lambda
    }

    /// Assign a tier to the given context.
    ///
    /// Synchronous and CPU-bound. Always produces a decision in the
    /// heuristic regime; in the learned regime a broken arm matrix aborts
    /// this call with [`CoreError::Fatal`] while leaving the router usable.
    pub fn classify(&self, context: &TuriyaContext) -> Result<TuriyaDecision, CoreError> {
        let context = Arc::new(context.clamped());
        let decision = if self.total_plays < self.config.cold_start_plays {
            self.classify_heuristic(context)
        } else {
            self.classify_learned(context)?
        };
        tracing::debug!(
            tier = %decision.tier,
            confidence = decision.confidence,
            cost = decision.cost_estimate,
            plays = self.total_plays,
            "turiya decision"
        );
        Ok(decision)
    }

    /// Cold-start regime: a deterministic complexity/urgency map.
    fn classify_heuristic(&self, context: Arc<TuriyaContext>) -> TuriyaDecision {
        const BOUNDARIES: [f64; 3] = [0.10, 0.35, 0.65];

        let complexity = context.complexity;
        let mut tier = if complexity < BOUNDARIES[0] {
            Tier::NoLlm
        } else if complexity < BOUNDARIES[1] {
            Tier::Haiku
        } else if complexity < BOUNDARIES[2] {
            Tier::Sonnet
        } else {
            Tier::Opus
        };
        // High urgency buys one tier of headroom.
        if context.urgency >= 0.6 {
            tier = tier.escalated().unwrap_or(tier);
        }

        let min_distance = BOUNDARIES
            .iter()
            .map(|b| (complexity - b).abs())
            .fold(f64::MAX, f64::min);
        let confidence = sigmoid(12.0 * min_distance);

        TuriyaDecision {
            tier,
            arm_index: tier.index(),
            confidence,
            cost_estimate: self.config.tier_costs[tier.index()],
            rationale: format!(
                "[heuristic] complexity={complexity:.2} urgency={:.2} -> {tier}",
                context.urgency
            ),
            context,
            original_tier: None,
        }
    }

    /// Learned regime: LinUCB with budget penalty and preference blend.
    fn classify_learned(
        &self,
        context: Arc<TuriyaContext>,
    ) -> Result<TuriyaDecision, CoreError> {
        let x = context.feature_vector();
        let budget_active = self.config.budget_per_request().is_some();

        let mut scores = [0.0f64; 4];
        let mut details = Vec::with_capacity(4);
        for (i, arm) in self.arms.iter().enumerate() {
            let ucb = arm.ucb(&x, self.config.linucb_alpha)?;
            let mut score = ucb.score;
            if budget_active {
                score -= self.budget_lambda * self.config.tier_costs[i];
            }
            if let Some(w) = self.config.cost_weight {
                let cheapness = 1.0 - i as f64 / 3.0;
                score = (1.0 - w) * score + w * cheapness;
            }
            scores[i] = score;
            details.push(ucb);
        }

        let best = (0..4)
            .max_by(|a, b| scores[*a].partial_cmp(&scores[*b]).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or(0);
        let second_best = scores
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != best)
            .map(|(_, s)| *s)
            .fold(f64::NEG_INFINITY, f64::max);

        let tier = Tier::from_index(best).unwrap_or(Tier::Opus);
        let confidence = sigmoid(scores[best] - second_best);
        let ucb = details[best];

        Ok(TuriyaDecision {
            tier,
            arm_index: best,
            confidence,
            cost_estimate: self.config.tier_costs[best],
            rationale: format!(
                "[linucb] mu={:.3} sigma={:.3} score={:.3} lambda={:.3} -> {tier}",
                ucb.mean, ucb.stddev, scores[best], self.budget_lambda
            ),
            context,
            original_tier: None,
        })
    }

    /// Escalate a low-confidence decision one tier, up to opus. Confident
    /// decisions and opus decisions pass through unchanged.
    pub fn cascade_decision(&self, decision: &TuriyaDecision) -> TuriyaDecision {
        self.cascade_with_threshold(decision, self.config.quality_threshold)
    }

    pub fn cascade_with_threshold(
        &self,
        decision: &TuriyaDecision,
        quality_threshold: f64,
    ) -> TuriyaDecision {
        if decision.confidence >= quality_threshold || decision.tier == Tier::Opus {
            return decision.clone();
        }
        let escalated = decision.tier.escalated().unwrap_or(decision.tier);
        tracing::debug!(
            from = %decision.tier,
            to = %escalated,
            confidence = decision.confidence,
            "cascading low-confidence decision"
        );
        TuriyaDecision {
            tier: escalated,
            arm_index: escalated.index(),
            confidence: decision.confidence,
            cost_estimate: self.config.tier_costs[escalated.index()],
            context: Arc::clone(&decision.context),
            rationale: format!(
                "{} [cascade] confidence {:.2} below {:.2}",
                decision.rationale, decision.confidence, quality_threshold
            ),
            original_tier: Some(decision.tier),
        }
    }

    /// Feed an observed outcome back into the chosen arm.
    ///
    /// A decision that did not originate here (replayed from disk) is
    /// applied as a plain update against the arm it names; an out-of-range
    /// arm index is ignored.
    pub fn record_outcome(&mut self, decision: &TuriyaDecision, reward: f64) {
        let Some(arm) = self.arms.get_mut(decision.arm_index) else {
            tracing::warn!(arm = decision.arm_index, "outcome for unknown arm ignored");
            return;
        };
        let reward = if reward.is_finite() {
            reward.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let observed_cost = self.config.tier_costs[decision.tier.index()];

        let x = decision.context.feature_vector();
        arm.update(&x, reward, observed_cost);
        self.total_plays += 1;
        self.opus_baseline_cost += self.config.tier_costs[Tier::Opus.index()];

        if let Some(budget_per_request) = self.config.budget_per_request() {
            let eta = self.config.lambda_learning_rate;
            self.budget_lambda =
                (self.budget_lambda + eta * (observed_cost - budget_per_request)).max(0.0);
        }
        tracing::debug!(
            tier = %decision.tier,
            reward,
            lambda = self.budget_lambda,
            "outcome recorded"
        );
    }

    pub fn stats(&self) -> TuriyaStats {
        let tiers: Vec<TierStats> = self
            .arms
            .iter()
            .map(|arm| TierStats {
                tier: arm.tier,
                calls: arm.plays,
                average_reward: arm.average_reward(),
                total_cost: arm.total_cost,
                alpha: arm.alpha,
                beta: arm.beta,
            })
            .collect();
        let total_cost: f64 = self.arms.iter().map(|a| a.total_cost).sum();
        let cost_savings = self.opus_baseline_cost - total_cost;
        let savings_percent = if self.opus_baseline_cost > 0.0 {
            100.0 * cost_savings / self.opus_baseline_cost
        } else {
            0.0
        };
        TuriyaStats {
            tiers,
            total_requests: self.total_plays,
            total_cost,
            opus_baseline_cost: self.opus_baseline_cost,
            cost_savings,
            savings_percent,
        }
    }

    /// Consistent snapshot of the full bandit state.
    pub fn serialize(&self) -> TuriyaState {
        TuriyaState {
            schema: 1,
            total_plays: self.total_plays,
            linucb_alpha: self.config.linucb_alpha,
            budget_lambda: self.budget_lambda,
            opus_baseline_cost: self.opus_baseline_cost,
            arms: self.arms.iter().map(|a| a.state()).collect(),
        }
    }

    /// Restore a router from persisted state. Unknown arms are dropped,
    /// missing arms start fresh, and invariant-violating fields fall back to
    /// their priors.
    pub fn from_state(config: TuriyaConfig, state: &TuriyaState) -> Self {
        let mut router = Self::new(config);
        for arm_state in &state.arms {
            let idx = arm_state.tier.index();
            router.arms[idx] = TuriyaArm::from_state(arm_state);
        }
        router.total_plays = state.total_plays;
        if state.budget_lambda.is_finite() && state.budget_lambda >= 0.0 {
            router.budget_lambda = state.budget_lambda;
        }
        if state.opus_baseline_cost.is_finite() && state.opus_baseline_cost >= 0.0 {
            router.opus_baseline_cost = state.opus_baseline_cost;
        }
        if state.linucb_alpha.is_finite() && state.linucb_alpha > 0.0 {
            router.config.linucb_alpha = state.linucb_alpha;
        }
        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx(complexity: f64) -> TuriyaContext {
        TuriyaContext {
            complexity,
            ..Default::default()
        }
    }

    fn router() -> TuriyaRouter {
        TuriyaRouter::new(TuriyaConfig::default())
    }

    /// Drive a router past the cold-start threshold with a fixed reward
    /// policy: cheap tiers succeed on simple contexts, opus on complex ones.
    fn train(router: &mut TuriyaRouter, rounds: usize) {
        for i in 0..rounds {
            let c = (i % 10) as f64 / 10.0;
            let decision = router.classify(&ctx(c)).unwrap();
            let reward = match decision.tier {
                Tier::NoLlm | Tier::Haiku => 1.0 - c,
                Tier::Sonnet => 0.7,
                Tier::Opus => c,
            };
            router.record_outcome(&decision, reward);
        }
    }

    #[test]
    fn cold_start_trivial_context_routes_cheap() {
        let r = router();
        let decision = r.classify(&ctx(0.02)).unwrap();
        assert!(matches!(decision.tier, Tier::NoLlm | Tier::Haiku));
        assert!(decision.rationale.contains("[heuristic]"));
    }

    #[test]
    fn cold_start_complex_context_routes_to_opus() {
        let r = router();
        let decision = r
            .classify(&TuriyaContext {
                complexity: 0.85,
                urgency: 0.3,
                creativity: 0.5,
                precision: 0.6,
                code_ratio: 0.4,
                conversation_depth: 0.3,
                memory_load: 0.2,
            })
            .unwrap();
        assert_eq!(decision.tier, Tier::Opus);
        assert!(decision.rationale.contains("[heuristic]"));
    }

    #[test]
    fn urgency_escalates_cold_start_tier() {
        let r = router();
        let calm = r.classify(&ctx(0.2)).unwrap();
        assert_eq!(calm.tier, Tier::Haiku);
        let urgent = r
            .classify(&TuriyaContext {
                complexity: 0.2,
                urgency: 0.9,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(urgent.tier, Tier::Sonnet);
    }

    #[test]
    fn learned_regime_drops_heuristic_tag() {
        let mut r = router();
        train(&mut r, 12);
        assert_eq!(r.total_plays(), 12);
        let decision = r.classify(&ctx(0.5)).unwrap();
        assert!(!decision.rationale.contains("[heuristic]"));
        assert!(decision.rationale.contains("[linucb]"));
    }

    #[test]
    fn context_features_are_clamped_before_use() {
        let r = router();
        let decision = r
            .classify(&TuriyaContext {
                complexity: 42.0,
                urgency: -5.0,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(decision.context.complexity, 1.0);
        assert_eq!(decision.context.urgency, 0.0);
    }

    #[test]
    fn cascade_escalates_low_confidence() {
        let r = router();
        let original = TuriyaDecision {
            tier: Tier::Haiku,
            arm_index: Tier::Haiku.index(),
            confidence: 0.2,
            cost_estimate: r.config().tier_costs[1],
            context: Arc::new(ctx(0.3)),
            rationale: "[linucb] test".into(),
            original_tier: None,
        };
        let cascaded = r.cascade_decision(&original);
        assert_eq!(cascaded.tier, Tier::Sonnet);
        assert_eq!(cascaded.original_tier, Some(Tier::Haiku));
        assert!(cascaded.rationale.contains("[cascade]"));
        // The cascade shares the original context object.
        assert!(Arc::ptr_eq(&cascaded.context, &original.context));
        // Monotone: exactly one tier up, never cheaper.
        assert_eq!(cascaded.tier.index(), original.tier.index() + 1);
        assert!(cascaded.cost_estimate >= original.cost_estimate);
    }

    #[test]
    fn confident_and_opus_decisions_pass_through() {
        let r = router();
        let confident = TuriyaDecision {
            tier: Tier::Haiku,
            arm_index: 1,
            confidence: 0.9,
            cost_estimate: 0.001,
            context: Arc::new(ctx(0.2)),
            rationale: "r".into(),
            original_tier: None,
        };
        assert_eq!(r.cascade_decision(&confident).tier, Tier::Haiku);

        let opus = TuriyaDecision {
            tier: Tier::Opus,
            arm_index: 3,
            confidence: 0.1,
            cost_estimate: 0.05,
            context: Arc::new(ctx(0.9)),
            rationale: "r".into(),
            original_tier: None,
        };
        let through = r.cascade_decision(&opus);
        assert_eq!(through.tier, Tier::Opus);
        assert_eq!(through.original_tier, None);
    }

    #[test]
    fn rewards_are_clamped_and_invariants_hold() {
        let mut r = router();
        let decision = r.classify(&ctx(0.5)).unwrap();
        r.record_outcome(&decision, 7.0);
        r.record_outcome(&decision, -3.0);
        r.record_outcome(&decision, f64::NAN);
        let stats = r.stats();
        for tier in &stats.tiers {
            assert!(tier.alpha >= 1.0);
            assert!(tier.beta >= 1.0);
            assert!(tier.average_reward <= 1.0);
        }
        assert_eq!(stats.total_requests, 3);
    }

    #[test]
    fn budget_dual_rises_on_overspend() {
        let mut r = TuriyaRouter::new(TuriyaConfig {
            daily_budget: Some(1.0),
            expected_daily_requests: Some(100),
            ..Default::default()
        });
        // budget_per_request = 0.01; an opus outcome costs 0.05.
        let decision = TuriyaDecision {
            tier: Tier::Opus,
            arm_index: 3,
            confidence: 0.9,
            cost_estimate: 0.05,
            context: Arc::new(ctx(0.9)),
            rationale: "r".into(),
            original_tier: None,
        };
        r.record_outcome(&decision, 1.0);
        assert!((r.budget_lambda() - 0.04).abs() < 1e-12);
        // Cheap outcomes walk the multiplier back down, floored at zero.
        let cheap = TuriyaDecision {
            tier: Tier::NoLlm,
            arm_index: 0,
            confidence: 0.9,
            cost_estimate: 0.0,
            context: Arc::new(ctx(0.1)),
            rationale: "r".into(),
            original_tier: None,
        };
        for _ in 0..10 {
            r.record_outcome(&cheap, 1.0);
        }
        assert_eq!(r.budget_lambda(), 0.0);
    }

    #[test]
    fn cost_weight_prefers_cheap_tiers() {
        let mut r = TuriyaRouter::new(TuriyaConfig {
            cost_weight: Some(1.0),
            ..Default::default()
        });
        train(&mut r, 12);
        // With w = 1 the blend collapses to the cheapness score.
        let decision = r.classify(&ctx(0.9)).unwrap();
        assert_eq!(decision.tier, Tier::NoLlm);
    }

    #[test]
    fn unknown_arm_outcome_is_ignored() {
        let mut r = router();
        let bogus = TuriyaDecision {
            tier: Tier::Haiku,
            arm_index: 9,
            confidence: 0.5,
            cost_estimate: 0.0,
            context: Arc::new(ctx(0.5)),
            rationale: "r".into(),
            original_tier: None,
        };
        r.record_outcome(&bogus, 1.0);
        assert_eq!(r.total_plays(), 0);
    }

    #[test]
    fn stats_report_savings_against_opus_baseline() {
        let mut r = router();
        let decision = r.classify(&ctx(0.02)).unwrap(); // no-llm, cost 0
        r.record_outcome(&decision, 1.0);
        r.record_outcome(&decision, 1.0);
        let stats = r.stats();
        assert_eq!(stats.total_cost, 0.0);
        assert!((stats.opus_baseline_cost - 0.10).abs() < 1e-12);
        assert!((stats.cost_savings - 0.10).abs() < 1e-12);
        assert!((stats.savings_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn serialize_roundtrip_preserves_decisions() {
        let mut r = router();
        train(&mut r, 25);
        let state = r.serialize();
        assert_eq!(state.schema, 1);

        // Through JSON, as persisted on disk.
        let json = serde_json::to_string(&state).unwrap();
        let restored_state: TuriyaState = serde_json::from_str(&json).unwrap();
        let restored = TuriyaRouter::from_state(TuriyaConfig::default(), &restored_state);

        for i in 0..10 {
            let c = ctx(i as f64 / 10.0);
            let a = r.classify(&c).unwrap();
            let b = restored.classify(&c).unwrap();
            assert_eq!(a.tier, b.tier);
            assert_eq!(a.rationale, b.rationale);
            assert!((a.confidence - b.confidence).abs() < 1e-15);
        }
    }

    #[test]
    fn missing_state_fields_are_tolerated() {
        let state: TuriyaState =
            serde_json::from_str(r#"{"schema": 1, "total_plays": 3}"#).unwrap();
        let r = TuriyaRouter::from_state(TuriyaConfig::default(), &state);
        assert_eq!(r.total_plays(), 3);
        // Still in cold start; still classifies.
        let decision = r.classify(&ctx(0.5)).unwrap();
        assert!(decision.rationale.contains("[heuristic]"));
    }

    #[test]
    fn classify_remains_usable_after_any_sequence() {
        let mut r = router();
        // Interleave odd rewards, replayed decisions, and serialization.
        for i in 0..40 {
            let decision = r.classify(&ctx((i % 7) as f64 / 7.0)).unwrap();
            r.record_outcome(&decision, (i % 3) as f64 / 2.0);
            if i % 10 == 0 {
                let snapshot = r.serialize();
                r = TuriyaRouter::from_state(TuriyaConfig::default(), &snapshot);
            }
        }
        assert!(r.classify(&ctx(0.5)).is_ok());
    }
}
