//! Reduction controller: partition, summarize each chunk, join, repeat until
//! the text fits, then one final completion.
//!
//! ```text
//! Pending → Partitioning → SummarizingChunks → Reducing … → Finalizing → Done
//!                                 │                 │            │
//!                                 └──── Failed ─────┴────────────┘
//! ```
//!
//! Chunks are cut on line boundaries ([`partition`](crate::chunker::partition)).
//! A line that alone exceeds the budget, such as a pass of summaries joined
//! into one line, is cut in the token stream with
//! [`split_balanced`](crate::chunker::split_balanced) instead, so every
//! request fits and truncation at `max_depth` keeps at most one budget's
//! worth of text. Choosing a [`ChunkStrategy`](crate::chunker::ChunkStrategy)
//! is only offered by the `chunks` preview command.
//!
//! A cancellation token is checked between chunks, never mid-call.

mod state;
mod summarizer;

pub use state::{ChunkFailure, DocumentState, FailurePolicy, SummaryOutcome, TruncationWarning};
pub use summarizer::Summarizer;

use serde::{Deserialize, Serialize};

use crate::invoker::RetryPolicy;
use crate::usage::TokenUsage;

/// Tunables for one [`Summarizer`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub model_id: String,
    pub temperature: f32,
    /// Completion length requested from the model.
    pub max_output_tokens: u32,
    /// Tokens kept free in the context window for the completion.
    pub reserved_completion_tokens: usize,
    /// Maximum chunk summarization passes before truncating.
    pub max_depth: usize,
    pub failure_policy: FailurePolicy,
    /// Chunks summarized at once; 1 keeps strict sequential order.
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_id: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_output_tokens: 1000,
            reserved_completion_tokens: 1000,
            max_depth: 5,
            failure_policy: FailurePolicy::BestEffort,
            concurrency: 1,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    pub fn with_reserved_completion_tokens(mut self, tokens: usize) -> Self {
        self.reserved_completion_tokens = tokens;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Progress events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StateChanged {
        state: DocumentState,
    },
    PassStarted {
        pass: usize,
        chunks: usize,
    },
    ChunkCompleted {
        pass: usize,
        index: usize,
        total: usize,
        usage: TokenUsage,
    },
    ChunkFailed {
        pass: usize,
        index: usize,
        total: usize,
        message: String,
    },
    Truncated {
        warning: TruncationWarning,
    },
}
