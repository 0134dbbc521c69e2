//! Model table: context window, tokenizer and pricing per model id.
//!
//! The table is built once (built-ins plus `[[models]]` overrides from
//! `condense.toml`) and then only read.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::tokenizer::Encoding;

/// Static facts about one completion model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    /// Total context window, prompt plus completion.
    pub context_tokens: usize,
    #[serde(default)]
    pub input_price_per_1k: f64,
    #[serde(default)]
    pub output_price_per_1k: f64,
    /// Overrides the encoding inferred from the model id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,
}

impl ModelConfig {
    pub fn new(id: impl Into<String>, context_tokens: usize) -> Self {
        Self {
            id: id.into(),
            context_tokens,
            input_price_per_1k: 0.0,
            output_price_per_1k: 0.0,
            encoding: None,
        }
    }

    pub fn with_prices(mut self, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.input_price_per_1k = input_per_1k;
        self.output_price_per_1k = output_per_1k;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn input_cost(&self, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.input_price_per_1k
    }

    pub fn output_cost(&self, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.output_price_per_1k
    }

    /// Encoding for this model, explicit or inferred from the id.
    pub fn resolved_encoding(&self) -> Option<Encoding> {
        self.encoding.or_else(|| Encoding::for_model(&self.id))
    }
}

/// Read-only lookup of known models.
#[derive(Debug, Clone)]
pub struct ModelTable {
    models: BTreeMap<String, ModelConfig>,
}

impl ModelTable {
    pub fn builtin() -> Self {
        let models = [
            ModelConfig::new("gpt-3.5-turbo", 16_385).with_prices(0.0015, 0.002),
            ModelConfig::new("gpt-4", 8_192).with_prices(0.03, 0.06),
            ModelConfig::new("gpt-4o", 128_000).with_prices(0.0025, 0.01),
            ModelConfig::new("gpt-4o-mini", 128_000).with_prices(0.00015, 0.0006),
        ];
        Self {
            models: models.into_iter().map(|m| (m.id.clone(), m)).collect(),
        }
    }

    /// Built-ins with `overrides` layered on top (same id replaces).
    pub fn with_overrides(overrides: &[ModelConfig]) -> Self {
        let mut table = Self::builtin();
        for model in overrides {
            table.models.insert(model.id.clone(), model.clone());
        }
        table
    }

    pub fn get(&self, id: &str) -> Result<&ModelConfig, ConfigError> {
        self.models
            .get(id)
            .ok_or_else(|| ConfigError::UnknownModel(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelConfig> {
        self.models.values()
    }
}

impl Default for ModelTable {
    fn default() -> Self {
        Self::builtin()
    }
}
