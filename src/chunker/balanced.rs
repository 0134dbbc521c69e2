use tracing::debug;

use super::{Chunk, effective_limit};
use crate::errors::{ChunkingError, ConfigError};
use crate::tokenizer::TokenCodec;

/// Near-equal chunk sizes covering `total_tokens` with at most `max_chunk_size` each.
///
/// With `k = ceil(total / max)` and `avg = ceil(total / k)`, the first
/// `k - (k * avg - total)` chunks hold `avg` tokens and the rest `avg - 1`.
pub fn balanced_chunk_sizes(
    total_tokens: usize,
    max_chunk_size: usize,
) -> Result<Vec<usize>, ConfigError> {
    if max_chunk_size == 0 {
        return Err(ConfigError::NonPositiveLimit {
            max_tokens: 0,
            reserved_tokens: 0,
        });
    }
    if total_tokens == 0 {
        return Ok(Vec::new());
    }

    let k = total_tokens.div_ceil(max_chunk_size);
    let average = total_tokens.div_ceil(k);
    let shorter = k * average - total_tokens;
    let standard = k - shorter;

    let mut sizes = vec![average; standard];
    sizes.extend(std::iter::repeat_n(average - 1, shorter));
    Ok(sizes)
}

/// Slice the token stream of `text` into balanced chunks and decode each.
///
/// Cuts fall inside the token stream, not on line boundaries. A cut inside a
/// multibyte character moves the character's leading bytes into the next
/// chunk, so chunk texts concatenate back to `text` while `token_count`
/// still reports the balanced slice size.
pub fn split_balanced(
    text: &str,
    max_tokens_per_chunk: usize,
    reserved_tokens: usize,
    codec: &dyn TokenCodec,
) -> Result<Vec<Chunk>, ChunkingError> {
    let limit = effective_limit(max_tokens_per_chunk, reserved_tokens)?;
    let tokens = codec.encode(text);
    let sizes = balanced_chunk_sizes(tokens.len(), limit)?;

    let produced: usize = sizes.iter().sum();
    if produced != tokens.len() {
        return Err(ChunkingError::SizeMismatch {
            produced,
            expected: tokens.len(),
        });
    }

    let last = sizes.len().saturating_sub(1);
    let mut chunks = Vec::with_capacity(sizes.len());
    let mut pending: Vec<u8> = Vec::new();
    let mut start = 0;
    for (index, size) in sizes.into_iter().enumerate() {
        pending.extend(codec.decode_bytes(&tokens[start..start + size]));
        let complete = match std::str::from_utf8(&pending) {
            Ok(_) => pending.len(),
            // Incomplete trailing character: carry it over.
            Err(e) if e.error_len().is_none() && index < last => e.valid_up_to(),
            Err(e) => {
                return Err(ChunkingError::Decode {
                    index,
                    message: e.to_string(),
                });
            }
        };
        let carry = pending.split_off(complete);
        let text = String::from_utf8(std::mem::replace(&mut pending, carry)).map_err(|e| {
            ChunkingError::Decode {
                index,
                message: e.to_string(),
            }
        })?;
        chunks.push(Chunk {
            index,
            text,
            token_count: size,
            oversized: false,
        });
        start += size;
    }

    debug!(chunks = chunks.len(), total_tokens = tokens.len(), limit, "balanced split");
    Ok(chunks)
}
