//! Shared conversation records: turns, tool calls, and the model tiers the
//! router assigns work to.

use serde::{Deserialize, Serialize};

use crate::clock::Millis;

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// The four cost/quality classes a turn can be routed to, total-ordered by
/// increasing cost.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    NoLlm,
    Haiku,
    Sonnet,
    Opus,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::NoLlm, Tier::Haiku, Tier::Sonnet, Tier::Opus];
    pub const COUNT: usize = 4;

    /// Position in the cost ordering (0 = cheapest).
    pub fn index(self) -> usize {
        match self {
            Tier::NoLlm => 0,
            Tier::Haiku => 1,
            Tier::Sonnet => 2,
            Tier::Opus => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Tier> {
        Tier::ALL.get(index).copied()
    }

    /// The next tier up, or `None` at the top.
    pub fn escalated(self) -> Option<Tier> {
        Tier::from_index(self.index() + 1)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::NoLlm => write!(f, "no-llm"),
            Tier::Haiku => write!(f, "haiku"),
            Tier::Sonnet => write!(f, "sonnet"),
            Tier::Opus => write!(f, "opus"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "no-llm" | "no_llm" | "none" => Ok(Tier::NoLlm),
            "haiku" => Ok(Tier::Haiku),
            "sonnet" => Ok(Tier::Sonnet),
            "opus" => Ok(Tier::Opus),
            _ => Err(format!(
                "invalid tier '{s}', expected: no-llm, haiku, sonnet, opus"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Turns
// ---------------------------------------------------------------------------

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One tool invocation observed during a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    /// Tool arguments are intentionally polymorphic; guardians stringify
    /// non-string values and traverse nested values to a bounded depth.
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub output: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

/// A single conversation turn. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_number: u32,
    pub role: TurnRole,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default)]
    pub tokens_consumed: u32,
    pub started_at: Millis,
}

impl Turn {
    pub fn user(turn_number: u32, content: impl Into<String>, started_at: Millis) -> Self {
        Self {
            turn_number,
            role: TurnRole::User,
            content: content.into(),
            tool_calls: None,
            tokens_consumed: 0,
            started_at,
        }
    }

    pub fn assistant(turn_number: u32, content: impl Into<String>, started_at: Millis) -> Self {
        Self {
            turn_number,
            role: TurnRole::Assistant,
            content: content.into(),
            tool_calls: None,
            tokens_consumed: 0,
            started_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Memory scopes (consumed collaborator contract)
// ---------------------------------------------------------------------------

/// Addressing for long-lived memory streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryScope {
    Global,
    Project { path: String },
    Agent { agent_id: String },
}
