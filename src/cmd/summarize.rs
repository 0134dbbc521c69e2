//! Summarization commands: `condense summarize` and `condense batch`.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use condense::batch::{BatchProgress, load_inputs, run_batch, write_summaries_zip};
use condense::config::{CondenseConfig, CondenseToml};
use condense::extract::extract_path;
use condense::invoker::OpenAiInvoker;
use condense::models::ModelTable;
use condense::pipeline::{FailurePolicy, PipelineConfig, PipelineEvent, Summarizer};
use condense::prompt::Limit;
use condense::ui::SummaryUI;
use condense::ui::icons::{COINS, WARN};
use condense::usage::token_usage_expression;

use super::super::{Cli, SummaryArgs};
use super::load_config;

/// Merge command-line overrides into the configured pipeline settings.
///
/// Pure logic, so the precedence rules can be unit-tested.
pub fn resolve_settings(toml: &CondenseToml, args: &SummaryArgs) -> Result<(PipelineConfig, Limit)> {
    let limit = match &args.limit {
        Some(s) => s.parse::<Limit>(),
        None => toml.limit(),
    }
    .context("Invalid --limit")?;

    let mut config = toml.pipeline_config();
    if let Some(model) = &args.model {
        config = config.with_model(model.clone());
    }
    if let Some(t) = args.temperature {
        config = config.with_temperature(t);
    }
    if let Some(n) = args.max_output_tokens {
        config = config.with_max_output_tokens(n);
    }
    if let Some(n) = args.reserved_tokens {
        config = config.with_reserved_completion_tokens(n);
    }
    if let Some(d) = args.max_depth {
        config = config.with_max_depth(d);
    }
    if let Some(c) = args.concurrency {
        config = config.with_concurrency(c);
    }
    if args.fail_fast {
        config = config.with_failure_policy(FailurePolicy::FailFast);
    }
    if let Some(n) = args.retries {
        let mut retry = config.retry;
        retry.max_attempts = n;
        config = config.with_retry(retry);
    }
    Ok((config, limit))
}

fn build_summarizer(
    config: &CondenseConfig,
    models: &ModelTable,
    pipeline: PipelineConfig,
) -> Result<Summarizer<OpenAiInvoker>> {
    let api_key = config.api_key()?;
    let invoker = OpenAiInvoker::new(
        api_key,
        config.toml.api.base_url.clone(),
        config.toml.api_timeout(),
    )
    .context("Failed to create HTTP client")?;
    Summarizer::new(invoker, models, pipeline).context("Invalid summarization settings")
}

/// Cancel `token` on Ctrl-C. In-flight calls finish, no new chunk starts.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing in-flight calls");
            token.cancel();
        }
    });
}

fn make_ui(cli: &Cli, total_documents: Option<u64>) -> Arc<SummaryUI> {
    if cli.quiet || cli.log_json {
        Arc::new(SummaryUI::hidden())
    } else {
        Arc::new(SummaryUI::new(total_documents, cli.verbose))
    }
}

/// Summarize one document and print or write the result.
pub async fn cmd_summarize(
    cli: &Cli,
    work_dir: &Path,
    input: &Path,
    output: Option<&Path>,
    json: bool,
    args: &SummaryArgs,
) -> Result<()> {
    let config = load_config(cli, work_dir)?;
    let (pipeline, limit) = resolve_settings(&config.toml, args)?;
    let models = config.toml.model_table();

    let document = extract_path(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(100);
    let ui = make_ui(cli, None);
    let ui_clone = ui.clone();
    let display_handle = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            ui_clone.handle_event(&event);
        }
    });

    let summarizer = build_summarizer(&config, &models, pipeline)?
        .with_event_channel(event_tx)
        .with_cancellation(cancel);
    let model = summarizer.model().clone();
    let outcome = summarizer.summarize(&document.text, &limit).await?;
    drop(summarizer);
    display_handle.await.ok();
    ui.finish();

    for warning in &outcome.warnings {
        eprintln!("{}{}", WARN, console::style(warning).yellow());
    }
    for failure in &outcome.failures {
        eprintln!("{}{}", WARN, console::style(failure).red());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if outcome.is_success() {
        match output {
            Some(path) => {
                std::fs::write(path, &outcome.text)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                eprintln!("Summary written to {}", path.display());
            }
            None => println!("{}", outcome.text),
        }
    }

    eprintln!();
    eprintln!("{}{}", COINS, model.id);
    eprintln!("{}", token_usage_expression(&outcome.usage, &model));

    if !outcome.is_success() {
        if let Some(partial) = &outcome.partial_text
            && !json
        {
            eprintln!();
            eprintln!("Partial summary:");
            eprintln!("{}", partial);
        }
        anyhow::bail!("Summarization of {} ended in state {}", document.name, outcome.state);
    }
    Ok(())
}

/// Summarize every document under `input` into a zip archive.
pub async fn cmd_batch(
    cli: &Cli,
    work_dir: &Path,
    input: &Path,
    output: &Path,
    max_errors: Option<usize>,
    args: &SummaryArgs,
) -> Result<()> {
    let config = load_config(cli, work_dir)?;
    let (pipeline, limit) = resolve_settings(&config.toml, args)?;
    let models = config.toml.model_table();
    let max_errors = max_errors.unwrap_or(config.toml.batch.max_errors);

    let inputs = load_inputs(input)
        .with_context(|| format!("Failed to load documents from {}", input.display()))?;
    if inputs.is_empty() {
        anyhow::bail!("No documents found in {}", input.display());
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(100);
    let ui = make_ui(cli, Some(inputs.len() as u64));
    let ui_clone = ui.clone();
    let display_handle = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            ui_clone.handle_event(&event);
        }
    });

    let summarizer = build_summarizer(&config, &models, pipeline)?
        .with_event_channel(event_tx)
        .with_cancellation(cancel);
    let model = summarizer.model().clone();

    let report = run_batch(&summarizer, inputs, &limit, max_errors, |progress| match progress {
        BatchProgress::Started { index, total, name } => ui.start_document(index, total, name),
        BatchProgress::Finished(result) => ui.finish_document(result),
    })
    .await?;
    drop(summarizer);
    display_handle.await.ok();
    ui.finish();

    write_summaries_zip(&report, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let done = report.summaries().count();
    println!(
        "{} of {} documents summarized, written to {}",
        done,
        report.documents.len(),
        output.display()
    );
    if let Some(elapsed) = report.elapsed() {
        eprintln!("Elapsed: {}s", elapsed.num_seconds());
    }
    if report.error_count() > 0 {
        eprintln!("{}{} documents failed:", WARN, report.error_count());
        eprint!("{}", report.error_report());
    }
    if report.stopped_early {
        eprintln!(
            "{}Stopped after {} errors; remaining documents were skipped",
            WARN, max_errors
        );
    }
    eprintln!();
    eprintln!("{}", token_usage_expression(&report.usage, &model));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use condense::prompt::LimitUnit;

    #[test]
    fn test_resolve_settings_uses_config_defaults() {
        let toml = CondenseToml::parse("[defaults]\nlimit = \"3 sentences\"").unwrap();
        let (config, limit) = resolve_settings(&toml, &SummaryArgs::default()).unwrap();

        assert_eq!(limit, Limit::new(3, LimitUnit::Sentences));
        assert_eq!(config.model_id, "gpt-4o-mini");
        assert_eq!(config.failure_policy, FailurePolicy::BestEffort);
    }

    #[test]
    fn test_resolve_settings_cli_wins() {
        let toml = CondenseToml::parse("[pipeline]\nconcurrency = 2").unwrap();
        let args = SummaryArgs {
            limit: Some("100 tokens".to_string()),
            model: Some("gpt-4".to_string()),
            concurrency: Some(8),
            fail_fast: true,
            retries: Some(1),
            ..Default::default()
        };
        let (config, limit) = resolve_settings(&toml, &args).unwrap();

        assert_eq!(limit, Limit::new(100, LimitUnit::Tokens));
        assert_eq!(config.model_id, "gpt-4");
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn test_resolve_settings_rejects_bad_limit() {
        let args = SummaryArgs {
            limit: Some("zero words".to_string()),
            ..Default::default()
        };
        assert!(resolve_settings(&CondenseToml::default(), &args).is_err());
    }
}
