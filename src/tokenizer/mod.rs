//! Token length estimation.
//!
//! Chunk sizing and the "does this still fit?" checks of the reduction
//! controller both go through [`TokenCounter`]. The production counter is a
//! BPE tokenizer (`tiktoken-rs`) selected from the model id; unknown models
//! fall back to `cl100k_base` with a warning instead of failing.
//!
//! ```ignore
//! use condense::tokenizer::estimate_tokens;
//!
//! let n = estimate_tokens("The quick brown fox", "gpt-4o-mini");
//! assert!(n > 0);
//! ```

mod bpe;
mod heuristic;

pub use bpe::{BpeTokenizer, tokenizer_for_model};
pub use heuristic::HeuristicCounter;

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// Counts tokens in a piece of text. Must be deterministic.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// A counter that can also round-trip text through token ids.
///
/// Needed by the balanced splitter, which cuts inside the token stream.
pub trait TokenCodec: TokenCounter {
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Raw bytes behind `tokens`. A slice of a longer stream may end in the
    /// middle of a UTF-8 character. Ids must come from [`encode`](Self::encode).
    fn decode_bytes(&self, tokens: &[u32]) -> Vec<u8>;

    fn decode(&self, tokens: &[u32]) -> Result<String, String> {
        String::from_utf8(self.decode_bytes(tokens)).map_err(|e| e.to_string())
    }
}

/// BPE vocabularies known to the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Cl100kBase,
    O200kBase,
    P50kBase,
    R50kBase,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Cl100kBase => "cl100k_base",
            Encoding::O200kBase => "o200k_base",
            Encoding::P50kBase => "p50k_base",
            Encoding::R50kBase => "r50k_base",
        }
    }

    /// Encoding used by a model family, if the model id is recognized.
    pub fn for_model(model_id: &str) -> Option<Self> {
        let m = model_id.to_lowercase();
        if m.starts_with("gpt-4o") || m.starts_with("o1") || m.starts_with("o3") {
            Some(Encoding::O200kBase)
        } else if m.starts_with("gpt-4")
            || m.starts_with("gpt-3.5")
            || m.starts_with("text-embedding")
        {
            Some(Encoding::Cl100kBase)
        } else if m.starts_with("text-davinci") || m.starts_with("code-") {
            Some(Encoding::P50kBase)
        } else if m.starts_with("davinci") || m.starts_with("curie") || m.starts_with("babbage")
        {
            Some(Encoding::R50kBase)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Encoding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cl100k_base" => Ok(Encoding::Cl100kBase),
            "o200k_base" => Ok(Encoding::O200kBase),
            "p50k_base" => Ok(Encoding::P50kBase),
            "r50k_base" => Ok(Encoding::R50kBase),
            _ => Err(ConfigError::UnknownEncoding(s.to_string())),
        }
    }
}

/// Estimate the token count of `text` for `model_id`.
///
/// Unrecognized models are counted with `cl100k_base` (a warning is logged).
/// If no BPE vocabulary can be loaded at all the character heuristic is used.
pub fn estimate_tokens(text: &str, model_id: &str) -> usize {
    match tokenizer_for_model(model_id) {
        Ok(tokenizer) => tokenizer.count(text),
        Err(err) => {
            tracing::warn!(model = model_id, error = %err, "falling back to character heuristic");
            HeuristicCounter.count(text)
        }
    }
}
