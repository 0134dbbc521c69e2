//! tiktoken-backed BPE tokenizer.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use super::{Encoding, TokenCodec, TokenCounter};
use crate::errors::ConfigError;

static CL100K: OnceLock<CoreBPE> = OnceLock::new();
static O200K: OnceLock<CoreBPE> = OnceLock::new();
static P50K: OnceLock<CoreBPE> = OnceLock::new();
static R50K: OnceLock<CoreBPE> = OnceLock::new();

/// Load (once per process) the vocabulary for `encoding`.
fn load(encoding: Encoding) -> Result<&'static CoreBPE, ConfigError> {
    let (cell, loader): (&'static OnceLock<CoreBPE>, fn() -> anyhow::Result<CoreBPE>) =
        match encoding {
            Encoding::Cl100kBase => (&CL100K, tiktoken_rs::cl100k_base),
            Encoding::O200kBase => (&O200K, tiktoken_rs::o200k_base),
            Encoding::P50kBase => (&P50K, tiktoken_rs::p50k_base),
            Encoding::R50kBase => (&R50K, tiktoken_rs::r50k_base),
        };

    if let Some(bpe) = cell.get() {
        return Ok(bpe);
    }
    let bpe = loader().map_err(|e| {
        tracing::error!(encoding = %encoding, error = %e, "failed to load BPE vocabulary");
        ConfigError::UnknownEncoding(encoding.name().to_string())
    })?;
    Ok(cell.get_or_init(|| bpe))
}

/// Token counter and codec over a tiktoken vocabulary.
#[derive(Clone)]
pub struct BpeTokenizer {
    bpe: &'static CoreBPE,
    encoding: Encoding,
}

impl BpeTokenizer {
    pub fn new(encoding: Encoding) -> Result<Self, ConfigError> {
        Ok(Self {
            bpe: load(encoding)?,
            encoding,
        })
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
}

impl std::fmt::Debug for BpeTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BpeTokenizer")
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl TokenCounter for BpeTokenizer {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

impl TokenCodec for BpeTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_with_special_tokens(text)
    }

    fn decode_bytes(&self, tokens: &[u32]) -> Vec<u8> {
        self.bpe
            ._decode_native_and_split(tokens.to_vec())
            .flatten()
            .collect()
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, String> {
        self.bpe.decode(tokens.to_vec()).map_err(|e| e.to_string())
    }
}

/// Resolve the tokenizer for a model id.
///
/// Unknown models get `cl100k_base` and a warning. Fails only when no
/// vocabulary can be loaded at all.
pub fn tokenizer_for_model(model_id: &str) -> Result<BpeTokenizer, ConfigError> {
    let encoding = match Encoding::for_model(model_id) {
        Some(encoding) => encoding,
        None => {
            tracing::warn!(
                model = model_id,
                fallback = %Encoding::default(),
                "unrecognized model, using default encoding"
            );
            Encoding::default()
        }
    };
    BpeTokenizer::new(encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_matches_encode_len() {
        let tokenizer = BpeTokenizer::new(Encoding::Cl100kBase).unwrap();
        let text = "Hello, world! This is a tokenizer test.";
        assert_eq!(tokenizer.count(text), tokenizer.encode(text).len());
        assert!(tokenizer.count(text) < text.len());
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let tokenizer = BpeTokenizer::new(Encoding::O200kBase).unwrap();
        let text = "Zusammenfassung eines langen Dokuments.\nZweite Zeile.";
        let tokens = tokenizer.encode(text);
        assert_eq!(tokenizer.decode(&tokens).unwrap(), text);
    }

    #[test]
    fn test_decode_bytes_of_partial_character() {
        let tokenizer = BpeTokenizer::new(Encoding::Cl100kBase).unwrap();
        let text = "\u{13000}\u{13001} Zürich";
        let tokens = tokenizer.encode(text);
        let cut = (1..tokens.len())
            .find(|&i| tokenizer.decode(&tokens[..i]).is_err())
            .expect("a rare character spans several tokens");

        let head = tokenizer.decode_bytes(&tokens[..cut]);
        assert!(std::str::from_utf8(&head).is_err());

        let mut bytes = head;
        bytes.extend(tokenizer.decode_bytes(&tokens[cut..]));
        assert_eq!(bytes, text.as_bytes());
    }

    #[test]
    fn test_tokenizer_for_model_selects_family() {
        assert_eq!(
            tokenizer_for_model("gpt-4o").unwrap().encoding(),
            Encoding::O200kBase
        );
        assert_eq!(
            tokenizer_for_model("gpt-3.5-turbo").unwrap().encoding(),
            Encoding::Cl100kBase
        );
    }

    #[test]
    fn test_tokenizer_for_unknown_model_falls_back() {
        let tokenizer = tokenizer_for_model("mistral-large").unwrap();
        assert_eq!(tokenizer.encoding(), Encoding::Cl100kBase);
    }

    #[test]
    fn test_vocabulary_is_loaded_once() {
        let a = BpeTokenizer::new(Encoding::Cl100kBase).unwrap();
        let b = BpeTokenizer::new(Encoding::Cl100kBase).unwrap();
        assert!(std::ptr::eq(a.bpe, b.bpe));
    }
}
