//! Chunk preview (`condense chunks`).

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use condense::chunker::{Chunk, ChunkStrategy, effective_limit, partition, split_balanced};
use condense::extract::extract_path;
use condense::tokenizer::{BpeTokenizer, tokenizer_for_model};
use condense::ui::icons::WARN;

use super::super::Cli;
use super::load_config;

/// Widest chunk preview, in characters.
const PREVIEW_CHARS: usize = 60;

#[allow(clippy::too_many_arguments)]
pub fn cmd_chunks(
    cli: &Cli,
    work_dir: &Path,
    input: &Path,
    model: Option<&str>,
    max_tokens: Option<usize>,
    reserved: usize,
    strategy: &str,
    show_text: bool,
) -> Result<()> {
    let config = load_config(cli, work_dir)?;
    let models = config.toml.model_table();
    let model_id = model.unwrap_or(&config.toml.defaults.model);
    let model = models.get(model_id)?;
    let strategy: ChunkStrategy = strategy.parse()?;

    let max_tokens = max_tokens.unwrap_or(model.context_tokens);
    let limit = effective_limit(max_tokens, reserved)?;

    let document = extract_path(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let tokenizer = match model.resolved_encoding() {
        Some(encoding) => BpeTokenizer::new(encoding)?,
        None => tokenizer_for_model(&model.id)?,
    };

    let chunks = match strategy {
        ChunkStrategy::Lines => partition(&document.text, max_tokens, reserved, &tokenizer)?,
        ChunkStrategy::Balanced => {
            split_balanced(&document.text, max_tokens, reserved, &tokenizer)?
        }
    };

    let total: usize = chunks.iter().map(|c| c.token_count).sum();
    println!(
        "{}: {} chunks, {} tokens, limit {} ({} strategy, {})",
        style(&document.name).bold(),
        chunks.len(),
        total,
        limit,
        strategy,
        tokenizer.encoding().name()
    );
    for chunk in &chunks {
        println!("{}", describe_chunk(chunk));
        if show_text {
            println!("{}", style(&chunk.text).dim());
        }
    }
    Ok(())
}

fn describe_chunk(chunk: &Chunk) -> String {
    let first_line = chunk.text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut preview: String = first_line.trim().chars().take(PREVIEW_CHARS).collect();
    if first_line.trim().chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    let flag = if chunk.oversized {
        format!(" {}oversized", WARN)
    } else {
        String::new()
    };
    format!(
        "  #{:<4} {:>7} tokens{}  {}",
        chunk.index + 1,
        chunk.token_count,
        flag,
        style(preview).dim()
    )
}
