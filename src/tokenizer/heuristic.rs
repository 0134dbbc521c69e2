use super::TokenCounter;

/// Character-based estimate: ~4 characters per token, rounded up.
///
/// Used when no BPE vocabulary is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}
