//! Text statistics and cost estimates, without calling any model.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::errors::ConfigError;
use crate::models::ModelTable;
use crate::tokenizer::{BpeTokenizer, Encoding, TokenCounter, tokenizer_for_model};

// A sentence ends at terminal punctuation followed by whitespace or the end of text.
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+(\s+|$)").unwrap());

/// Counts that do not depend on a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextStats {
    pub sentences: usize,
    pub words: usize,
    pub characters: usize,
}

pub fn text_stats(text: &str) -> TextStats {
    TextStats {
        sentences: count_sentences(text),
        words: text.split_whitespace().count(),
        characters: text.chars().count(),
    }
}

fn count_sentences(text: &str) -> usize {
    SENTENCE_END
        .split(text)
        .filter(|s| !s.trim().is_empty())
        .count()
}

/// Token count and input cost of a text for one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelEstimate {
    pub model_id: String,
    pub encoding: Encoding,
    pub tokens: usize,
    pub input_cost: f64,
}

/// Statistics for a text plus an estimate for every known model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenReport {
    pub stats: TextStats,
    pub estimates: Vec<ModelEstimate>,
}

/// Analyze `text` against every model in `models`.
///
/// Texts are tokenized once per distinct encoding.
pub fn token_report(text: &str, models: &ModelTable) -> Result<TokenReport, ConfigError> {
    let mut counted: Vec<(Encoding, usize)> = Vec::new();
    let mut estimates = Vec::new();

    for model in models.iter() {
        let tokenizer = match model.resolved_encoding() {
            Some(encoding) => BpeTokenizer::new(encoding)?,
            None => tokenizer_for_model(&model.id)?,
        };
        let encoding = tokenizer.encoding();
        let tokens = match counted.iter().find(|(e, _)| *e == encoding) {
            Some((_, n)) => *n,
            None => {
                let n = tokenizer.count(text);
                counted.push((encoding, n));
                n
            }
        };
        estimates.push(ModelEstimate {
            model_id: model.id.clone(),
            encoding,
            tokens,
            input_cost: model.input_cost(tokens as u64),
        });
    }

    Ok(TokenReport {
        stats: text_stats(text),
        estimates,
    })
}
