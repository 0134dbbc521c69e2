use tracing::{debug, warn};

use super::{Chunk, effective_limit};
use crate::errors::ConfigError;
use crate::tokenizer::TokenCounter;

/// Split `text` into chunks of whole lines, each within the effective limit.
///
/// Lines keep their line breaks, so concatenating the chunk texts gives back
/// `text` exactly. Text that fits the limit comes back as a single chunk.
/// Empty text yields no chunks. A line that alone exceeds the limit becomes
/// its own chunk with `oversized` set.
pub fn partition(
    text: &str,
    max_tokens_per_chunk: usize,
    reserved_tokens: usize,
    counter: &dyn TokenCounter,
) -> Result<Vec<Chunk>, ConfigError> {
    let limit = effective_limit(max_tokens_per_chunk, reserved_tokens)?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    let total = counter.count(text);
    if total <= limit {
        return Ok(vec![Chunk {
            index: 0,
            text: text.to_string(),
            token_count: total,
            oversized: false,
        }]);
    }

    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut running = 0usize;

    for line in text.split_inclusive('\n') {
        let line_tokens = counter.count(line);

        if running + line_tokens > limit && !buffer.is_empty() {
            push_chunk(&mut chunks, std::mem::take(&mut buffer), running, limit);
            running = 0;
        }

        if line_tokens > limit {
            warn!(
                line_tokens,
                limit,
                chunk = chunks.len(),
                "line exceeds chunk limit, emitting as oversized chunk"
            );
        }

        buffer.push_str(line);
        running += line_tokens;
    }

    if !buffer.is_empty() {
        push_chunk(&mut chunks, buffer, running, limit);
    }

    debug!(chunks = chunks.len(), total_tokens = total, limit, "partitioned text");
    Ok(chunks)
}

fn push_chunk(chunks: &mut Vec<Chunk>, text: String, token_count: usize, limit: usize) {
    chunks.push(Chunk {
        index: chunks.len(),
        text,
        token_count,
        oversized: token_count > limit,
    });
}
