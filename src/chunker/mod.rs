//! Splitting long text into token-bounded chunks.
//!
//! Two strategies:
//!
//! | Strategy   | Function           | Cuts at          | Sizes                         |
//! |------------|--------------------|------------------|-------------------------------|
//! | `lines`    | [`partition`]      | line boundaries  | greedy, last chunk may be small |
//! | `balanced` | [`split_balanced`] | token boundaries | all within one token of each other |
//!
//! Both budget against the *effective limit*: the chunk ceiling minus the
//! tokens reserved for prompt and completion.

mod balanced;
mod lines;

pub use balanced::{balanced_chunk_sizes, split_balanced};
pub use lines::partition;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// One contiguous piece of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the document, starting at 0.
    pub index: usize,
    pub text: String,
    pub token_count: usize,
    /// A single line longer than the effective limit.
    pub oversized: bool,
}

/// Which partitioning strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    #[default]
    Lines,
    Balanced,
}

impl std::fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkStrategy::Lines => write!(f, "lines"),
            ChunkStrategy::Balanced => write!(f, "balanced"),
        }
    }
}

impl std::str::FromStr for ChunkStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lines" | "line" => Ok(ChunkStrategy::Lines),
            "balanced" => Ok(ChunkStrategy::Balanced),
            _ => Err(ConfigError::InvalidValue {
                field: "strategy",
                value: s.to_string(),
                message: "expected 'lines' or 'balanced'".to_string(),
            }),
        }
    }
}

/// `max_tokens - reserved_tokens`, failing when nothing is left for content.
pub fn effective_limit(max_tokens: usize, reserved_tokens: usize) -> Result<usize, ConfigError> {
    match max_tokens.checked_sub(reserved_tokens) {
        Some(limit) if limit > 0 => Ok(limit),
        _ => Err(ConfigError::NonPositiveLimit {
            max_tokens,
            reserved_tokens,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit() {
        assert_eq!(effective_limit(450, 50).unwrap(), 400);
        assert_eq!(effective_limit(1, 0).unwrap(), 1);
    }

    #[test]
    fn test_effective_limit_non_positive() {
        for (max, reserved) in [(50, 50), (10, 400), (0, 0)] {
            let err = effective_limit(max, reserved).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::NonPositiveLimit { max_tokens, reserved_tokens }
                    if max_tokens == max && reserved_tokens == reserved
            ));
        }
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("lines".parse::<ChunkStrategy>().unwrap(), ChunkStrategy::Lines);
        assert_eq!(
            "Balanced".parse::<ChunkStrategy>().unwrap(),
            ChunkStrategy::Balanced
        );
        assert!("greedy".parse::<ChunkStrategy>().is_err());
    }
}
