//! Token usage bookkeeping and the cost expression shown after a run.

use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::models::ModelConfig;

/// Prompt/completion token counts of one or more completion calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn cost(&self, model: &ModelConfig) -> f64 {
        model.input_cost(self.prompt_tokens) + model.output_cost(self.completion_tokens)
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: Self) -> Self::Output {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = TokenUsage>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), Add::add)
    }
}

/// Usage counter shared between concurrent chunk calls.
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    prompt: AtomicU64,
    completion: AtomicU64,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: TokenUsage) {
        self.prompt.fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion
            .fetch_add(usage.completion_tokens, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt.load(Ordering::Relaxed),
            completion_tokens: self.completion.load(Ordering::Relaxed),
        }
    }
}

/// Render usage and estimated cost as three lines:
///
/// ```text
/// Tokens in: 1200 Cost: $0.0360
/// Tokens out: 300 Cost: $0.0180
/// Total tokens: 1500 Cost: $0.0540
/// ```
pub fn token_usage_expression(usage: &TokenUsage, model: &ModelConfig) -> String {
    let cost_in = model.input_cost(usage.prompt_tokens);
    let cost_out = model.output_cost(usage.completion_tokens);
    format!(
        "Tokens in: {} Cost: ${:.4}\nTokens out: {} Cost: ${:.4}\nTotal tokens: {} Cost: ${:.4}",
        usage.prompt_tokens,
        cost_in,
        usage.completion_tokens,
        cost_out,
        usage.total(),
        cost_in + cost_out
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_addition() {
        let mut total = TokenUsage::new(100, 20);
        total += TokenUsage::new(50, 5);
        assert_eq!(total, TokenUsage::new(150, 25));
        assert_eq!(total.total(), 175);
    }

    #[test]
    fn test_usage_sum() {
        let sum: TokenUsage = vec![TokenUsage::new(1, 2), TokenUsage::new(3, 4)]
            .into_iter()
            .sum();
        assert_eq!(sum, TokenUsage::new(4, 6));
    }

    #[test]
    fn test_accumulator_across_threads() {
        let acc = std::sync::Arc::new(UsageAccumulator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let acc = acc.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        acc.record(TokenUsage::new(2, 1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(acc.snapshot(), TokenUsage::new(800, 400));
    }

    #[test]
    fn test_token_usage_expression() {
        let model = ModelConfig::new("gpt-4", 8192).with_prices(0.03, 0.06);
        let text = token_usage_expression(&TokenUsage::new(1200, 300), &model);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Tokens in: 1200 Cost: $0.0360");
        assert_eq!(lines[1], "Tokens out: 300 Cost: $0.0180");
        assert_eq!(lines[2], "Total tokens: 1500 Cost: $0.0540");
    }

    #[test]
    fn test_cost() {
        let model = ModelConfig::new("gpt-3.5-turbo", 16_385).with_prices(0.0015, 0.002);
        let cost = TokenUsage::new(1000, 1000).cost(&model);
        assert!((cost - 0.0035).abs() < 1e-12);
    }
}
