//! Per-document run state and the records a run produces.

use serde::{Deserialize, Serialize};

use crate::usage::TokenUsage;

/// Where a document is in the summarization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    #[default]
    Pending,
    Partitioning,
    /// First pass over the source chunks
    SummarizingChunks,
    /// Further passes over joined partial summaries
    Reducing,
    /// The single final completion call
    Finalizing,
    Done,
    Failed,
    Cancelled,
}

impl DocumentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentState::Pending => "pending",
            DocumentState::Partitioning => "partitioning",
            DocumentState::SummarizingChunks => "summarizing chunks",
            DocumentState::Reducing => "reducing",
            DocumentState::Finalizing => "finalizing",
            DocumentState::Done => "done",
            DocumentState::Failed => "failed",
            DocumentState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What to do when a chunk exhausts its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Record the failure and keep going; fail only if every chunk fails.
    #[default]
    BestEffort,
    /// Stop the document at the first failed chunk.
    FailFast,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::BestEffort => write!(f, "best-effort"),
            FailurePolicy::FailFast => write!(f, "fail-fast"),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = crate::errors::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best-effort" | "best_effort" => Ok(FailurePolicy::BestEffort),
            "fail-fast" | "fail_fast" => Ok(FailurePolicy::FailFast),
            _ => Err(crate::errors::ConfigError::InvalidValue {
                field: "failure_policy",
                value: s.to_string(),
                message: "expected 'best-effort' or 'fail-fast'".to_string(),
            }),
        }
    }
}

/// A unit of work that failed after all retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    /// 1-based reduction pass.
    pub pass: usize,
    /// Chunk index within the pass; `None` for the final call.
    pub chunk_index: Option<usize>,
    pub attempts: u32,
    pub message: String,
}

impl std::fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.chunk_index {
            Some(index) => write!(
                f,
                "pass {} chunk {}: {} ({} attempts)",
                self.pass, index, self.message, self.attempts
            ),
            None => write!(f, "final pass: {} ({} attempts)", self.message, self.attempts),
        }
    }
}

/// Content dropped because the depth cap was reached while still over budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationWarning {
    pub depth: usize,
    pub kept_tokens: usize,
    pub dropped_chunks: usize,
    pub dropped_tokens: usize,
}

impl std::fmt::Display for TruncationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reduction stopped at depth {}: kept {} tokens, dropped {} chunk(s) ({} tokens)",
            self.depth, self.kept_tokens, self.dropped_chunks, self.dropped_tokens
        )
    }
}

/// Everything a run produced, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryOutcome {
    /// Final summary; empty unless `state` is `Done`.
    pub text: String,
    /// Usage of every successful completion call in the run.
    pub usage: TokenUsage,
    pub state: DocumentState,
    pub failures: Vec<ChunkFailure>,
    pub warnings: Vec<TruncationWarning>,
    /// Number of chunk summarization passes run.
    pub passes: usize,
    /// Joined partial summaries when the run stopped before a final summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_text: Option<String>,
}

impl SummaryOutcome {
    pub fn is_success(&self) -> bool {
        self.state == DocumentState::Done
    }
}
