// Reasoning ("thinking") request shaping

use serde::{Deserialize, Serialize};

/// Lower bound for token-budget style reasoning
pub const DEFAULT_REASONING_BUDGET_FLOOR: u32 = 1024;

/// How a model exposes reasoning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningCapability {
    /// Always reasons; no parameter needed
    Always,
    /// `reasoning_effort` control
    Effort,
    /// `thinking.budget_tokens` control
    Budget,
    /// `reasoning.max_tokens` control
    ReasoningTokens,
    /// No reasoning support
    #[default]
    None,
}

/// Reasoning effort level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// Provider-specific reasoning fields attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReasoningParams {
    Effort(ReasoningEffort),
    Budget { budget_tokens: u32 },
    Tokens { max_tokens: u32 },
}

/// Token budget for reasoning: half the completion budget, never below `floor`
pub fn reasoning_budget(max_tokens: u32, floor: u32) -> u32 {
    floor.max(max_tokens / 2)
}

impl ReasoningCapability {
    pub fn supports_reasoning(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Request fields for this capability, or `None` when reasoning was not
    /// requested, is implicit, or is unsupported.
    pub fn shape(&self, requested: bool, max_tokens: u32, floor: u32) -> Option<ReasoningParams> {
        if !requested {
            return None;
        }

        match self {
            Self::Always | Self::None => None,
            Self::Effort => Some(ReasoningParams::Effort(ReasoningEffort::High)),
            Self::Budget => Some(ReasoningParams::Budget {
                budget_tokens: reasoning_budget(max_tokens, floor),
            }),
            Self::ReasoningTokens => Some(ReasoningParams::Tokens {
                max_tokens: reasoning_budget(max_tokens, floor),
            }),
        }
    }
}
