// Model records: reasoning capability and pricing lookups

use crate::reasoning::ReasoningCapability;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Known model id prefixes and how they expose reasoning.
/// Matched exactly first, then by longest prefix.
const KNOWN_REASONING_MODELS: &[(&str, ReasoningCapability)] = &[
    ("o1", ReasoningCapability::Effort),
    ("o3", ReasoningCapability::Effort),
    ("o4-mini", ReasoningCapability::Effort),
    ("gpt-5", ReasoningCapability::Effort),
    ("gpt-5-chat", ReasoningCapability::None),
    ("grok-3-mini", ReasoningCapability::Effort),
    ("claude-3-7-sonnet", ReasoningCapability::Budget),
    ("claude-sonnet-4", ReasoningCapability::Budget),
    ("claude-opus-4", ReasoningCapability::Budget),
    ("gemini-2.5", ReasoningCapability::Budget),
    ("deepseek-reasoner", ReasoningCapability::Always),
    ("deepseek-r1", ReasoningCapability::Always),
    ("qwq", ReasoningCapability::Always),
    ("anthropic/claude-3.7-sonnet", ReasoningCapability::ReasoningTokens),
    ("anthropic/claude-sonnet-4", ReasoningCapability::ReasoningTokens),
    ("google/gemini-2.5", ReasoningCapability::ReasoningTokens),
    ("deepseek/deepseek-r1", ReasoningCapability::Always),
];

/// Exact match, then longest matching prefix
fn lookup<'a, T>(entries: impl IntoIterator<Item = (&'a str, T)>, model_id: &str) -> Option<T> {
    let mut best: Option<(usize, T)> = None;

    for (key, value) in entries {
        if key == model_id {
            return Some(value);
        }
        if model_id.starts_with(key) {
            match &best {
                Some((len, _)) if *len >= key.len() => {}
                _ => best = Some((key.len(), value)),
            }
        }
    }

    best.map(|(_, value)| value)
}

/// Resolve against the built-in table; unknown models have no reasoning
pub fn resolve_capability(model_id: &str) -> ReasoningCapability {
    lookup(KNOWN_REASONING_MODELS.iter().copied(), model_id).unwrap_or_default()
}

/// A model entry; capability is resolved once when the record is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub reasoning: ReasoningCapability,
}

impl ModelRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let reasoning = resolve_capability(&id);
        Self {
            id,
            display_name: None,
            reasoning,
        }
    }

    pub fn with_reasoning(mut self, reasoning: ReasoningCapability) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Models known to the client
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: HashMap<String, ModelRecord>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = ModelRecord>) -> Self {
        let mut catalog = Self::new();
        for record in records {
            catalog.register(record);
        }
        catalog
    }

    pub fn register(&mut self, record: ModelRecord) {
        self.models.insert(record.id.clone(), record);
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelRecord> {
        self.models.get(model_id)
    }

    /// Registered record first, then the built-in table
    pub fn capability(&self, model_id: &str) -> ReasoningCapability {
        self.models
            .get(model_id)
            .map(|record| record.reasoning)
            .unwrap_or_else(|| resolve_capability(model_id))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Price of a token count for a model, in USD
pub trait CostLookup: Send + Sync {
    fn cost(&self, tokens: u32, model_id: &str, is_output: bool) -> f64;
}

/// Prices in USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    pub model: String,
    #[serde(flatten)]
    pub pricing: ModelPricing,
}

/// Static pricing table keyed by model id or id prefix
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    prices: HashMap<String, ModelPricing>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = PricingEntry>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.prices.insert(entry.model, entry.pricing);
        }
        table
    }

    pub fn with_price(mut self, model: impl Into<String>, input_per_million: f64, output_per_million: f64) -> Self {
        self.prices.insert(
            model.into(),
            ModelPricing {
                input_per_million,
                output_per_million,
            },
        );
        self
    }

    pub fn pricing(&self, model_id: &str) -> Option<ModelPricing> {
        lookup(self.prices.iter().map(|(k, v)| (k.as_str(), *v)), model_id)
    }
}

impl CostLookup for PricingTable {
    fn cost(&self, tokens: u32, model_id: &str, is_output: bool) -> f64 {
        let Some(pricing) = self.pricing(model_id) else {
            return 0.0;
        };
        let per_million = if is_output {
            pricing.output_per_million
        } else {
            pricing.input_per_million
        };
        tokens as f64 * per_million / 1_000_000.0
    }
}
