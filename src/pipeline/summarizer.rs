use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    ChunkFailure, DocumentState, FailurePolicy, PipelineConfig, PipelineEvent, SummaryOutcome,
    TruncationWarning,
};
use crate::chunker::{Chunk, effective_limit, partition, split_balanced};
use crate::errors::{ChunkingError, ConfigError, InvocationError};
use crate::invoker::{CompletionInvoker, CompletionRequest, validate_sampling};
use crate::models::{ModelConfig, ModelTable};
use crate::prompt::{Limit, SummaryPrompt};
use crate::tokenizer::{BpeTokenizer, TokenCodec, TokenCounter, tokenizer_for_model};
use crate::usage::UsageAccumulator;

/// Bookkeeping for one `summarize` call.
#[derive(Default)]
struct Run {
    usage: UsageAccumulator,
    failures: Vec<ChunkFailure>,
    warnings: Vec<TruncationWarning>,
    passes: usize,
}

impl Run {
    fn finish(self, state: DocumentState, text: String, partial_text: Option<String>) -> SummaryOutcome {
        SummaryOutcome {
            text,
            usage: self.usage.snapshot(),
            state,
            failures: self.failures,
            warnings: self.warnings,
            passes: self.passes,
            partial_text,
        }
    }
}

/// How the reduction loop ended.
enum Reduced {
    /// Text that fits the budget, ready for the final call.
    Ready(String),
    /// Run ended early, with whatever partial summaries exist.
    Stopped(DocumentState, Option<String>),
}

/// Summarizes documents of any length with one model.
pub struct Summarizer<I> {
    invoker: I,
    model: ModelConfig,
    config: PipelineConfig,
    codec: Arc<dyn TokenCodec>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
    cancel: CancellationToken,
}

impl<I: CompletionInvoker> Summarizer<I> {
    /// Resolve the model and its tokenizer; fails on invalid configuration.
    pub fn new(invoker: I, models: &ModelTable, config: PipelineConfig) -> Result<Self, ConfigError> {
        let model = models.get(&config.model_id)?.clone();
        validate_sampling(config.temperature, config.max_output_tokens)?;
        if config.max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_depth",
                value: "0".to_string(),
                message: "at least one reduction pass is required".to_string(),
            });
        }

        let codec: Arc<dyn TokenCodec> = match model.resolved_encoding() {
            Some(encoding) => Arc::new(BpeTokenizer::new(encoding)?),
            None => Arc::new(tokenizer_for_model(&model.id)?),
        };

        Ok(Self {
            invoker,
            model,
            config,
            codec,
            event_tx: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the tokenizer used for budgeting and splitting.
    pub fn with_codec(mut self, codec: Arc<dyn TokenCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token budget per chunk for summaries of size `limit`.
    pub fn chunk_budget(&self, limit: &Limit) -> Result<usize, ConfigError> {
        let prompt = SummaryPrompt { limit }.render();
        effective_limit(self.model.context_tokens, self.reserved_tokens(&prompt))
    }

    fn reserved_tokens(&self, system_prompt: &str) -> usize {
        self.codec.count(system_prompt) + self.config.reserved_completion_tokens
    }

    /// Summarize `text` down to `limit`.
    ///
    /// Only configuration problems are returned as errors, before any call
    /// is made. Failed chunks, cancellation and truncation are reported in
    /// the outcome together with the usage spent so far.
    pub async fn summarize(&self, text: &str, limit: &Limit) -> Result<SummaryOutcome, ConfigError> {
        let system_prompt = SummaryPrompt { limit }.render();
        let reserved = self.reserved_tokens(&system_prompt);
        let budget = effective_limit(self.model.context_tokens, reserved)?;

        let mut run = Run::default();
        self.set_state(DocumentState::Pending).await;

        if text.trim().is_empty() {
            debug!("empty input, nothing to summarize");
            self.set_state(DocumentState::Done).await;
            return Ok(run.finish(DocumentState::Done, String::new(), None));
        }

        info!(model = %self.model.id, budget, limit = %limit, "starting summarization");
        self.set_state(DocumentState::Partitioning).await;

        let working = match self
            .reduce(text.to_string(), &system_prompt, reserved, &mut run)
            .await?
        {
            Reduced::Ready(working) => working,
            Reduced::Stopped(state, partial) => {
                self.set_state(state).await;
                return Ok(run.finish(state, String::new(), partial));
            }
        };

        if self.cancel.is_cancelled() {
            self.set_state(DocumentState::Cancelled).await;
            return Ok(run.finish(DocumentState::Cancelled, String::new(), Some(working)));
        }

        self.set_state(DocumentState::Finalizing).await;
        let request = self.request(&system_prompt, &working);
        match self.config.retry.invoke(&self.invoker, &request).await {
            Ok(completion) => {
                run.usage.record(completion.usage);
                let usage = run.usage.snapshot();
                info!(
                    passes = run.passes,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    failures = run.failures.len(),
                    "summarization done"
                );
                self.set_state(DocumentState::Done).await;
                Ok(run.finish(DocumentState::Done, completion.text, None))
            }
            Err(err) => {
                error!(error = %err, "final summary failed");
                run.failures.push(ChunkFailure {
                    pass: run.passes + 1,
                    chunk_index: None,
                    attempts: err.attempts(),
                    message: err.to_string(),
                });
                self.set_state(DocumentState::Failed).await;
                Ok(run.finish(DocumentState::Failed, String::new(), Some(working)))
            }
        }
    }

    /// Summarize chunk by chunk until the text fits in one chunk.
    ///
    /// After `max_depth` passes the first chunk is kept and the rest dropped,
    /// with a [`TruncationWarning`].
    async fn reduce(
        &self,
        mut working: String,
        system_prompt: &str,
        reserved: usize,
        run: &mut Run,
    ) -> Result<Reduced, ConfigError> {
        let mut depth = 0;
        loop {
            let chunks = match self.candidates(&working, reserved) {
                Ok(chunks) => chunks,
                Err(ChunkingError::Config(err)) => return Err(err),
                Err(err) => {
                    error!(pass = depth, error = %err, "failed to split oversized text");
                    let partial = (depth > 0).then_some(working);
                    return Ok(Reduced::Stopped(DocumentState::Failed, partial));
                }
            };
            if chunks.len() <= 1 {
                return Ok(Reduced::Ready(working));
            }

            if depth >= self.config.max_depth {
                let warning = TruncationWarning {
                    depth,
                    kept_tokens: chunks[0].token_count,
                    dropped_chunks: chunks.len() - 1,
                    dropped_tokens: chunks[1..].iter().map(|c| c.token_count).sum(),
                };
                warn!(%warning, "summary still over budget, truncating");
                self.emit(PipelineEvent::Truncated {
                    warning: warning.clone(),
                })
                .await;
                run.warnings.push(warning);
                let kept = chunks.into_iter().next().map(|c| c.text).unwrap_or_default();
                return Ok(Reduced::Ready(kept));
            }

            depth += 1;
            self.set_state(if depth == 1 {
                DocumentState::SummarizingChunks
            } else {
                DocumentState::Reducing
            })
            .await;

            let failures_before = run.failures.len();
            let partials = self.summarize_pass(&chunks, system_prompt, depth, run).await;
            run.passes = depth;
            let joined = (!partials.is_empty()).then(|| partials.join(" "));

            if self.cancel.is_cancelled() {
                info!(pass = depth, "run cancelled");
                return Ok(Reduced::Stopped(DocumentState::Cancelled, joined));
            }
            let Some(joined) = joined else {
                error!(pass = depth, chunks = chunks.len(), "every chunk failed");
                return Ok(Reduced::Stopped(DocumentState::Failed, None));
            };
            if self.config.failure_policy == FailurePolicy::FailFast
                && run.failures.len() > failures_before
            {
                return Ok(Reduced::Stopped(DocumentState::Failed, Some(joined)));
            }

            info!(
                pass = depth,
                chunks = chunks.len(),
                summarized = partials.len(),
                "reduction pass complete"
            );
            working = joined;
        }
    }

    /// Line-based chunks of `text`, every one within the budget.
    ///
    /// A line longer than the budget (a summary pass often returns one long
    /// line) is split in the token stream instead.
    fn candidates(&self, text: &str, reserved: usize) -> Result<Vec<Chunk>, ChunkingError> {
        let context = self.model.context_tokens;
        let chunks = partition(text, context, reserved, self.codec.as_ref())?;
        if !chunks.iter().any(|c| c.oversized) {
            return Ok(chunks);
        }

        let mut fitted = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            if !chunk.oversized {
                fitted.push(chunk);
                continue;
            }
            let pieces = split_balanced(&chunk.text, context, reserved, self.codec.as_ref())?;
            debug!(
                chunk = chunk.index,
                tokens = chunk.token_count,
                pieces = pieces.len(),
                "re-split oversized line"
            );
            fitted.extend(pieces);
        }
        for (index, chunk) in fitted.iter_mut().enumerate() {
            chunk.index = index;
        }
        Ok(fitted)
    }

    /// One pass over `chunks`; returns the successful summaries in chunk order.
    async fn summarize_pass(
        &self,
        chunks: &[Chunk],
        system_prompt: &str,
        pass: usize,
        run: &mut Run,
    ) -> Vec<String> {
        let total = chunks.len();
        self.emit(PipelineEvent::PassStarted { pass, chunks: total })
            .await;

        let stop = self.cancel.child_token();
        let usage = &run.usage;
        let mut results: Vec<(usize, Result<String, InvocationError>)> = stream::iter(chunks)
            .map(|chunk| self.summarize_chunk(chunk, system_prompt, pass, total, &stop, usage))
            .buffer_unordered(self.config.concurrency.max(1))
            .filter_map(|result| async move { result })
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);

        let mut partials = Vec::with_capacity(results.len());
        for (index, result) in results {
            match result {
                Ok(text) => partials.push(text),
                Err(err) => run.failures.push(ChunkFailure {
                    pass,
                    chunk_index: Some(index),
                    attempts: err.attempts(),
                    message: err.to_string(),
                }),
            }
        }
        partials
    }

    /// `None` when the chunk was skipped because the pass was stopped.
    async fn summarize_chunk(
        &self,
        chunk: &Chunk,
        system_prompt: &str,
        pass: usize,
        total: usize,
        stop: &CancellationToken,
        usage: &UsageAccumulator,
    ) -> Option<(usize, Result<String, InvocationError>)> {
        if stop.is_cancelled() {
            return None;
        }
        debug!(pass, chunk = chunk.index, total, tokens = chunk.token_count, "summarizing chunk");

        let request = self.request(system_prompt, &chunk.text);
        match self.config.retry.invoke(&self.invoker, &request).await {
            Ok(completion) => {
                usage.record(completion.usage);
                self.emit(PipelineEvent::ChunkCompleted {
                    pass,
                    index: chunk.index,
                    total,
                    usage: completion.usage,
                })
                .await;
                Some((chunk.index, Ok(completion.text)))
            }
            Err(err) => {
                warn!(pass, chunk = chunk.index, error = %err, "chunk failed");
                self.emit(PipelineEvent::ChunkFailed {
                    pass,
                    index: chunk.index,
                    total,
                    message: err.to_string(),
                })
                .await;
                if self.config.failure_policy == FailurePolicy::FailFast {
                    stop.cancel();
                }
                Some((chunk.index, Err(err)))
            }
        }
    }

    fn request(&self, system_prompt: &str, user_text: &str) -> CompletionRequest {
        CompletionRequest {
            system_prompt: system_prompt.to_string(),
            user_text: user_text.to_string(),
            model_id: self.model.id.clone(),
            temperature: self.config.temperature,
            max_output_tokens: self.config.max_output_tokens,
        }
    }

    async fn set_state(&self, state: DocumentState) {
        debug!(%state, "document state");
        self.emit(PipelineEvent::StateChanged { state }).await;
    }

    /// Emit an event to the event channel if configured.
    async fn emit(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::testing::ScriptedInvoker;
    use crate::invoker::{Completion, RetryPolicy};
    use crate::prompt::LimitUnit;
    use crate::tokenizer::testing::{WordCodec, WordCounter};
    use crate::usage::TokenUsage;
    use std::time::Duration;

    const CONTEXT: usize = 200;
    const LIMIT: Limit = Limit {
        count: 50,
        unit: LimitUnit::Characters,
    };

    fn config() -> PipelineConfig {
        PipelineConfig::default()
            .with_model("test-model")
            .with_reserved_completion_tokens(20)
            .with_retry(RetryPolicy::fixed(3, Duration::ZERO))
    }

    fn summarizer(
        invoker: Arc<ScriptedInvoker>,
        config: PipelineConfig,
    ) -> Summarizer<Arc<ScriptedInvoker>> {
        let models = ModelTable::with_overrides(&[ModelConfig::new("test-model", CONTEXT)]);
        Summarizer::new(invoker, &models, config)
            .unwrap()
            .with_codec(Arc::new(WordCodec::default()))
    }

    fn budget() -> usize {
        let idle = Arc::new(ScriptedInvoker::replying("", TokenUsage::default()));
        summarizer(idle, config()).chunk_budget(&LIMIT).unwrap()
    }

    /// `lines` lines of exactly `budget()` words, tagged `c0`, `c1`, ...
    fn document(lines: usize) -> String {
        let words = budget();
        (0..lines)
            .map(|i| {
                let mut line = vec![format!("c{}", i)];
                line.extend(std::iter::repeat_n("w".to_string(), words - 1));
                format!("{}\n", line.join(" "))
            })
            .collect()
    }

    fn chunk_tag(text: &str) -> Option<String> {
        text.split_whitespace()
            .next()
            .filter(|w| w.starts_with('c'))
            .map(|w| w.to_string())
    }

    /// Chunk calls answer `p<i>` for 10/2 tokens, the final call echoes with 5/3.
    fn tagging_invoker(fail: impl Fn(&str) -> bool + Send + Sync + 'static) -> ScriptedInvoker {
        ScriptedInvoker::new(move |_, req| match chunk_tag(&req.user_text) {
            Some(tag) if fail(&tag) => Err(InvocationError::Status {
                status: 500,
                body: format!("{} unavailable", tag),
            }),
            Some(tag) => Ok(Completion {
                text: tag.replacen('c', "p", 1),
                usage: TokenUsage::new(10, 2),
            }),
            None => Ok(Completion {
                text: format!("final: {}", req.user_text),
                usage: TokenUsage::new(5, 3),
            }),
        })
    }

    #[tokio::test]
    async fn test_short_text_makes_exactly_one_call() {
        let invoker = Arc::new(ScriptedInvoker::replying("brief", TokenUsage::new(30, 5)));
        let s = summarizer(invoker.clone(), config());

        let text = "A short note about the weather.";
        let outcome = s.summarize(text, &LIMIT).await.unwrap();

        assert_eq!(outcome.state, DocumentState::Done);
        assert_eq!(outcome.text, "brief");
        assert_eq!(outcome.usage, TokenUsage::new(30, 5));
        assert_eq!(outcome.passes, 0);
        let calls = invoker.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].user_text, text);
        assert!(calls[0].system_prompt.contains("50 characters"));
        assert_eq!(calls[0].model_id, "test-model");
    }

    #[tokio::test]
    async fn test_retry_success_reports_only_successful_usage() {
        let invoker = Arc::new(ScriptedInvoker::new(|n, _| {
            if n < 2 {
                Err(InvocationError::Status {
                    status: 502,
                    body: "bad gateway".into(),
                })
            } else {
                Ok(Completion {
                    text: "brief".into(),
                    usage: TokenUsage::new(30, 5),
                })
            }
        }));
        let s = summarizer(invoker.clone(), config());

        let outcome = s.summarize("Short text.", &LIMIT).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.usage, TokenUsage::new(30, 5));
        assert!(outcome.failures.is_empty());
        assert_eq!(invoker.call_count(), 3);
    }

    #[tokio::test]
    async fn test_best_effort_skips_failed_chunk() {
        let invoker = Arc::new(tagging_invoker(|tag| tag == "c2"));
        let s = summarizer(invoker.clone(), config());

        let outcome = s.summarize(&document(5), &LIMIT).await.unwrap();

        assert_eq!(outcome.state, DocumentState::Done);
        assert_eq!(outcome.text, "final: p0 p1 p3 p4");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].chunk_index, Some(2));
        assert_eq!(outcome.failures[0].attempts, 3);
        assert_eq!(outcome.passes, 1);
        assert_eq!(outcome.usage, TokenUsage::new(4 * 10 + 5, 4 * 2 + 3));
        assert_eq!(invoker.call_count(), 4 + 3 + 1);
    }

    #[tokio::test]
    async fn test_chunks_are_sent_in_document_order() {
        let invoker = Arc::new(tagging_invoker(|_| false));
        let s = summarizer(invoker.clone(), config());

        s.summarize(&document(5), &LIMIT).await.unwrap();

        let tags: Vec<Option<String>> = invoker
            .calls()
            .iter()
            .map(|c| chunk_tag(&c.user_text))
            .collect();
        let expected: Vec<Option<String>> = (0..5)
            .map(|i| Some(format!("c{}", i)))
            .chain(std::iter::once(None))
            .collect();
        assert_eq!(tags, expected);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_failure() {
        let invoker = Arc::new(tagging_invoker(|tag| tag == "c1"));
        let s = summarizer(
            invoker.clone(),
            config().with_failure_policy(FailurePolicy::FailFast),
        );

        let outcome = s.summarize(&document(5), &LIMIT).await.unwrap();

        assert_eq!(outcome.state, DocumentState::Failed);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.usage, TokenUsage::new(10, 2));
        assert_eq!(outcome.partial_text.as_deref(), Some("p0"));
        assert!(outcome.text.is_empty());
        assert_eq!(invoker.call_count(), 1 + 3);
    }

    #[tokio::test]
    async fn test_all_chunks_failing_fails_document() {
        let invoker = Arc::new(tagging_invoker(|_| true));
        let s = summarizer(invoker.clone(), config());

        let outcome = s.summarize(&document(5), &LIMIT).await.unwrap();

        assert_eq!(outcome.state, DocumentState::Failed);
        assert_eq!(outcome.failures.len(), 5);
        assert_eq!(outcome.usage, TokenUsage::default());
        assert!(outcome.partial_text.is_none());
        assert_eq!(invoker.call_count(), 15);
    }

    #[tokio::test]
    async fn test_final_call_failure_keeps_usage_and_partials() {
        let invoker = Arc::new(ScriptedInvoker::new(|_, req| {
            match chunk_tag(&req.user_text) {
                Some(tag) => Ok(Completion {
                    text: tag.replacen('c', "p", 1),
                    usage: TokenUsage::new(10, 2),
                }),
                None => Err(InvocationError::Rejected("context too long".into())),
            }
        }));
        let s = summarizer(invoker.clone(), config());

        let outcome = s.summarize(&document(3), &LIMIT).await.unwrap();

        assert_eq!(outcome.state, DocumentState::Failed);
        assert_eq!(outcome.usage, TokenUsage::new(30, 6));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].chunk_index, None);
        assert_eq!(outcome.partial_text.as_deref(), Some("p0 p1 p2"));
    }

    #[tokio::test]
    async fn test_depth_cap_truncates_with_warning() {
        let invoker = Arc::new(ScriptedInvoker::new(|_, req| {
            Ok(Completion {
                text: req.user_text.clone(),
                usage: TokenUsage::new(1, 1),
            })
        }));
        let s = summarizer(invoker.clone(), config().with_max_depth(1));
        let words = budget();

        let outcome = s.summarize(&document(5), &LIMIT).await.unwrap();

        assert_eq!(outcome.state, DocumentState::Done);
        assert_eq!(outcome.warnings.len(), 1);
        let warning = &outcome.warnings[0];
        assert_eq!(warning.depth, 1);
        assert_eq!(warning.kept_tokens, words);
        assert_eq!(warning.dropped_chunks, 4);
        assert_eq!(warning.dropped_tokens, 4 * words);
        assert!(outcome.text.starts_with("c0 "));
        assert_eq!(invoker.call_count(), 6);
    }

    #[tokio::test]
    async fn test_reduction_recurses_until_text_fits() {
        let invoker = Arc::new(ScriptedInvoker::new(|_, req| {
            let words = req.user_text.split_whitespace().count() / 3;
            Ok(Completion {
                text: format!("{}\n", vec!["r"; words].join(" ")),
                usage: TokenUsage::new(1, 1),
            })
        }));
        let s = summarizer(invoker.clone(), config());

        let outcome = s.summarize(&document(5), &LIMIT).await.unwrap();

        assert_eq!(outcome.state, DocumentState::Done);
        assert_eq!(outcome.passes, 2);
        assert!(outcome.warnings.is_empty());
        assert_eq!(invoker.call_count(), 5 + 2 + 1);
        assert_eq!(outcome.usage, TokenUsage::new(8, 8));
    }

    /// Answers every call with half as many words, on a single line.
    fn halving_invoker() -> ScriptedInvoker {
        ScriptedInvoker::new(|_, req| {
            let words = req.user_text.split_whitespace().count() / 2;
            Ok(Completion {
                text: vec!["s"; words.max(1)].join(" "),
                usage: TokenUsage::new(1, 1),
            })
        })
    }

    #[tokio::test]
    async fn test_single_line_summaries_are_resplit_until_they_fit() {
        let invoker = Arc::new(halving_invoker());
        let s = summarizer(invoker.clone(), config());
        let words = budget();

        let outcome = s.summarize(&document(10), &LIMIT).await.unwrap();

        assert_eq!(outcome.state, DocumentState::Done);
        assert!(outcome.passes > 1);
        assert!(outcome.warnings.is_empty());
        let calls = invoker.calls();
        assert!(calls.iter().all(|c| WordCounter.count(&c.user_text) <= words));
        let last = calls.last().unwrap();
        assert!(!last.user_text.contains('\n'));
    }

    #[tokio::test]
    async fn test_single_line_summary_truncated_at_depth_cap() {
        let invoker = Arc::new(ScriptedInvoker::new(|_, req| {
            Ok(Completion {
                text: req.user_text.split_whitespace().collect::<Vec<_>>().join(" "),
                usage: TokenUsage::new(1, 1),
            })
        }));
        let s = summarizer(invoker.clone(), config().with_max_depth(1));
        let words = budget();

        let outcome = s.summarize(&document(5), &LIMIT).await.unwrap();

        assert_eq!(outcome.state, DocumentState::Done);
        assert_eq!(outcome.passes, 1);
        assert_eq!(outcome.warnings.len(), 1);
        let warning = &outcome.warnings[0];
        assert_eq!(warning.kept_tokens, words);
        assert_eq!(warning.dropped_chunks, 4);
        assert_eq!(warning.dropped_tokens, 4 * words);

        let calls = invoker.calls();
        assert_eq!(calls.len(), 6);
        let last = calls.last().unwrap();
        assert_eq!(WordCounter.count(&last.user_text), words);
        assert!(last.user_text.starts_with("c0 "));
    }

    #[tokio::test]
    async fn test_single_oversized_input_line_is_split() {
        let invoker = Arc::new(halving_invoker());
        let s = summarizer(invoker.clone(), config());
        let words = budget();
        let text = vec!["word"; 3 * words].join(" ");

        let outcome = s.summarize(&text, &LIMIT).await.unwrap();

        assert_eq!(outcome.state, DocumentState::Done);
        assert_eq!(outcome.passes, 2);
        let calls = invoker.calls();
        assert_eq!(calls.len(), 3 + 2 + 1);
        for call in &calls[..3] {
            assert_eq!(WordCounter.count(&call.user_text), words);
        }
        assert!(calls.iter().all(|c| WordCounter.count(&c.user_text) <= words));
    }

    #[tokio::test]
    async fn test_parallel_results_are_joined_in_chunk_order() {
        let invoker = Arc::new(tagging_invoker(|_| false).with_delay(|req| {
            let index: u64 = chunk_tag(&req.user_text)?.trim_start_matches('c').parse().ok()?;
            Some(Duration::from_millis((5 - index) * 15))
        }));
        let s = summarizer(invoker.clone(), config().with_concurrency(5));

        let outcome = s.summarize(&document(5), &LIMIT).await.unwrap();

        assert_eq!(outcome.text, "final: p0 p1 p2 p3 p4");
        assert_eq!(outcome.usage, TokenUsage::new(55, 13));
    }

    #[tokio::test]
    async fn test_cancellation_between_chunks() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let invoker = Arc::new(ScriptedInvoker::new(move |_, req| {
            trigger.cancel();
            Ok(Completion {
                text: chunk_tag(&req.user_text).unwrap_or_default().replacen('c', "p", 1),
                usage: TokenUsage::new(10, 2),
            })
        }));
        let s = summarizer(invoker.clone(), config()).with_cancellation(token);

        let outcome = s.summarize(&document(5), &LIMIT).await.unwrap();

        assert_eq!(outcome.state, DocumentState::Cancelled);
        assert_eq!(invoker.call_count(), 1);
        assert_eq!(outcome.usage, TokenUsage::new(10, 2));
        assert_eq!(outcome.partial_text.as_deref(), Some("p0"));
    }

    #[tokio::test]
    async fn test_events_report_progress_and_states() {
        let (tx, mut rx) = mpsc::channel(256);
        let invoker = Arc::new(tagging_invoker(|tag| tag == "c2"));
        let s = summarizer(invoker, config()).with_event_channel(tx);

        s.summarize(&document(5), &LIMIT).await.unwrap();
        drop(s);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let completed = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::ChunkCompleted { total: 5, .. }))
            .count();
        let failed = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::ChunkFailed { index: 2, .. }))
            .count();
        let states: Vec<DocumentState> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::StateChanged { state } => Some(*state),
                _ => None,
            })
            .collect();

        assert_eq!(completed, 4);
        assert_eq!(failed, 1);
        assert_eq!(
            states,
            vec![
                DocumentState::Pending,
                DocumentState::Partitioning,
                DocumentState::SummarizingChunks,
                DocumentState::Finalizing,
                DocumentState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let invoker = Arc::new(ScriptedInvoker::replying("x", TokenUsage::new(1, 1)));
        let s = summarizer(invoker.clone(), config());

        for text in ["", "  \n\n"] {
            let outcome = s.summarize(text, &LIMIT).await.unwrap();
            assert_eq!(outcome.state, DocumentState::Done);
            assert!(outcome.text.is_empty());
        }
        assert_eq!(invoker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_budget_exhausted_by_prompt_fails_before_calls() {
        let invoker = Arc::new(ScriptedInvoker::replying("x", TokenUsage::new(1, 1)));
        let models = ModelTable::with_overrides(&[ModelConfig::new("test-model", 30)]);
        let s = Summarizer::new(invoker.clone(), &models, config())
            .unwrap()
            .with_codec(Arc::new(WordCodec::default()));

        let err = s.summarize("some text", &LIMIT).await.unwrap_err();

        assert!(matches!(err, ConfigError::NonPositiveLimit { max_tokens: 30, .. }));
        assert_eq!(invoker.call_count(), 0);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let models = ModelTable::builtin();
        let invoker = || Arc::new(ScriptedInvoker::replying("x", TokenUsage::default()));

        let err = Summarizer::new(invoker(), &models, config()).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownModel(_)));

        let err = Summarizer::new(invoker(), &models, config().with_model("gpt-4").with_temperature(2.0))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidTemperature(_)));

        let err = Summarizer::new(invoker(), &models, config().with_model("gpt-4").with_max_depth(0))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidValue { field: "max_depth", .. }));
    }

    #[test]
    fn test_chunk_budget_subtracts_prompt_and_reserve() {
        let idle = Arc::new(ScriptedInvoker::replying("", TokenUsage::default()));
        let s = summarizer(idle, config());
        let prompt_words = WordCounter.count(&SummaryPrompt { limit: &LIMIT }.render());
        assert_eq!(s.chunk_budget(&LIMIT).unwrap(), CONTEXT - prompt_words - 20);
    }
}
