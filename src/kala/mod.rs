//! Kala Chakra: multi-scale temporal relevance.
//!
//! Documents age along seven nested scales at once (turn, session, day,
//! week, month, quarter, year), each with its own half-life and weight.
//! A document's relevance is the weighted sum of the per-scale decay
//! factors, so recent material is dominated by the fast scales while old
//! material is carried by the slow ones.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Millis;
use crate::math::decay_factor;

const SECOND_MS: f64 = 1_000.0;
const MINUTE_MS: f64 = 60.0 * SECOND_MS;
const HOUR_MS: f64 = 60.0 * MINUTE_MS;
const DAY_MS: f64 = 24.0 * HOUR_MS;
const YEAR_MS: f64 = 365.0 * DAY_MS;

// ---------------------------------------------------------------------------
// Scales
// ---------------------------------------------------------------------------

/// The seven temporal scales, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalScale {
    Turn,
    Session,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TemporalScale {
    pub const ALL: [TemporalScale; 7] = [
        TemporalScale::Turn,
        TemporalScale::Session,
        TemporalScale::Day,
        TemporalScale::Week,
        TemporalScale::Month,
        TemporalScale::Quarter,
        TemporalScale::Year,
    ];

    pub fn index(self) -> usize {
        match self {
            TemporalScale::Turn => 0,
            TemporalScale::Session => 1,
            TemporalScale::Day => 2,
            TemporalScale::Week => 3,
            TemporalScale::Month => 4,
            TemporalScale::Quarter => 5,
            TemporalScale::Year => 6,
        }
    }
}

impl std::fmt::Display for TemporalScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TemporalScale::Turn => "turn",
            TemporalScale::Session => "session",
            TemporalScale::Day => "day",
            TemporalScale::Week => "week",
            TemporalScale::Month => "month",
            TemporalScale::Quarter => "quarter",
            TemporalScale::Year => "year",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Half-lives and scale weights, indexed by [`TemporalScale::index`].
///
/// Serialisation of the whole subsystem is exactly this record; the chakra
/// holds no other state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KalaConfig {
    pub half_life_ms: [f64; 7],
    pub scale_weights: [f64; 7],
}

impl Default for KalaConfig {
    fn default() -> Self {
        Self {
            half_life_ms: [
                60.0 * SECOND_MS, // turn
                HOUR_MS,          // session
                DAY_MS,           // day
                7.0 * DAY_MS,     // week
                30.0 * DAY_MS,    // month
                90.0 * DAY_MS,    // quarter
                YEAR_MS,          // year
            ],
            scale_weights: [0.25, 0.20, 0.18, 0.13, 0.10, 0.07, 0.07],
        }
    }
}

impl KalaConfig {
    /// Clamp every field into its valid range, logging each adjustment.
    /// Out-of-range configuration degrades, it never errors.
    pub fn validated(mut self) -> Self {
        for (i, hl) in self.half_life_ms.iter_mut().enumerate() {
            let clamped = hl.clamp(SECOND_MS, 100.0 * YEAR_MS);
            if clamped != *hl || !hl.is_finite() {
                let fixed = if hl.is_finite() {
                    clamped
                } else {
                    KalaConfig::default().half_life_ms[i]
                };
                tracing::warn!(
                    scale = %TemporalScale::ALL[i],
                    requested = *hl,
                    clamped = fixed,
                    "kala half-life out of range"
                );
                *hl = fixed;
            }
        }
        for (i, w) in self.scale_weights.iter_mut().enumerate() {
            let clamped = if w.is_finite() { w.clamp(0.0, 1.0) } else { 0.0 };
            if clamped != *w {
                tracing::warn!(
                    scale = %TemporalScale::ALL[i],
                    requested = *w,
                    clamped,
                    "kala scale weight out of range"
                );
                *w = clamped;
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Positional context
// ---------------------------------------------------------------------------

/// Where the conversation currently sits.
#[derive(Debug, Clone)]
pub struct KalaPosition {
    pub turn_number: u32,
    pub session_id: String,
}

/// Best-effort counters sourced from session storage. Any error contributes
/// zero to the assembled context.
pub trait KalaStatsProvider {
    fn turns_in_session(&self, session_id: &str) -> Result<u64, crate::error::CoreError>;
    fn sessions_on_day(&self, date: chrono::NaiveDate) -> Result<u64, crate::error::CoreError>;
    fn vasana_count(&self) -> Result<u64, crate::error::CoreError>;
}

/// The seven-scale positional snapshot handed to recall scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalaContext {
    pub turn_number: u32,
    pub session_id: String,
    /// ISO-8601 calendar date of `now`.
    pub date: chrono::NaiveDate,
    pub iso_week: u32,
    pub month: u32,
    pub quarter: u32,
    pub year: i32,
    /// Best-effort counters; zero when the backing query failed.
    pub turns_in_session: u64,
    pub sessions_today: u64,
    pub vasana_count: u64,
}

// ---------------------------------------------------------------------------
// The chakra
// ---------------------------------------------------------------------------

/// Multi-scale temporal scorer. Stateless beyond its configuration.
#[derive(Debug, Clone, Default)]
pub struct KalaChakra {
    config: KalaConfig,
}

impl KalaChakra {
    pub fn new(config: KalaConfig) -> Self {
        Self {
            config: config.validated(),
        }
    }

    pub fn config(&self) -> &KalaConfig {
        &self.config
    }

    /// Weighted multi-scale relevance of a document timestamp, in `[0, 1]`
    /// when the weights sum to one. 1.0 at `doc_ts == now`; future
    /// timestamps clamp elapsed to zero.
    pub fn relevance_score(&self, doc_ts: Millis, now: Millis) -> f64 {
        let elapsed = (now - doc_ts) as f64;
        TemporalScale::ALL
            .iter()
            .map(|scale| self.scale_term(elapsed, *scale))
            .sum()
    }

    /// A single weighted scale term when `scale` is given, or the full
    /// relevance score otherwise. Summing the single-scale terms over all
    /// seven scales reproduces [`Self::relevance_score`] exactly.
    pub fn multi_scale_relevance(
        &self,
        doc_ts: Millis,
        scale: Option<TemporalScale>,
        now: Millis,
    ) -> f64 {
        match scale {
            Some(scale) => self.scale_term((now - doc_ts) as f64, scale),
            None => self.relevance_score(doc_ts, now),
        }
    }

    fn scale_term(&self, elapsed_ms: f64, scale: TemporalScale) -> f64 {
        let i = scale.index();
        self.config.scale_weights[i] * decay_factor(elapsed_ms, self.config.half_life_ms[i])
    }

    /// Classify the dominant temporal scale of an age. Sign is ignored.
    pub fn dominant_scale(&self, elapsed_ms: i64) -> TemporalScale {
        let e = elapsed_ms.unsigned_abs() as f64;
        if e < 5.0 * MINUTE_MS {
            TemporalScale::Turn
        } else if e < 2.0 * HOUR_MS {
            TemporalScale::Session
        } else if e < 36.0 * HOUR_MS {
            TemporalScale::Day
        } else if e < 10.0 * DAY_MS {
            TemporalScale::Week
        } else if e < 45.0 * DAY_MS {
            TemporalScale::Month
        } else if e < 120.0 * DAY_MS {
            TemporalScale::Quarter
        } else {
            TemporalScale::Year
        }
    }

    /// Rescale a search score by temporal relevance while preserving its
    /// sign: the result stays within `[0.5 * |original|, |original|]`.
    pub fn boost_score(&self, original: f64, doc_ts: Millis, now: Millis) -> f64 {
        original * (0.5 + 0.5 * self.relevance_score(doc_ts, now))
    }

    /// Assemble the current positional snapshot. Counter queries are
    /// best-effort; failures contribute zero and are logged at debug.
    pub fn build_context(
        &self,
        position: &KalaPosition,
        stats: Option<&dyn KalaStatsProvider>,
        now: Millis,
    ) -> KalaContext {
        let dt: DateTime<Utc> =
            DateTime::from_timestamp_millis(now).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let date = dt.date_naive();
        let month = dt.month();

        let fetch = |label: &str, r: Result<u64, crate::error::CoreError>| match r {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(field = label, error = %e, "kala context counter unavailable");
                0
            }
        };

        let (turns_in_session, sessions_today, vasana_count) = match stats {
            Some(p) => (
                fetch("turns_in_session", p.turns_in_session(&position.session_id)),
                fetch("sessions_today", p.sessions_on_day(date)),
                fetch("vasana_count", p.vasana_count()),
            ),
            None => (0, 0, 0),
        };

        KalaContext {
            turn_number: position.turn_number,
            session_id: position.session_id.clone(),
            date,
            iso_week: dt.iso_week().week(),
            month,
            quarter: (month - 1) / 3 + 1,
            year: dt.year(),
            turns_in_session,
            sessions_today,
            vasana_count,
        }
    }
}
