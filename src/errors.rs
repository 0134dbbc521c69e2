//! Typed error hierarchy for condense.
//!
//! One enum per subsystem:
//! - `ConfigError`: invalid budgets, models, limits and config files (fatal, raised before any API call)
//! - `InvocationError`: a completion round-trip failed
//! - `ExtractionError`: a source document could not be turned into text
//! - `ChunkingError`: balanced splitting could not rebuild text from tokens
//! - `BatchError`: batch output could not be written

use std::path::PathBuf;
use thiserror::Error;

/// Configuration problems. These are raised before any completion call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "Effective token limit must be positive: {max_tokens} max tokens minus {reserved_tokens} reserved leaves no room for content"
    )]
    NonPositiveLimit {
        max_tokens: usize,
        reserved_tokens: usize,
    },

    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    #[error("No tokenizer encoding available for '{0}'")]
    UnknownEncoding(String),

    #[error("Temperature must be within [0, 1], got {0}")]
    InvalidTemperature(f32),

    #[error("max_output_tokens must be a positive integer")]
    ZeroOutputTokens,

    #[error("Invalid limit '{input}': {message}")]
    InvalidLimit { input: String, message: String },

    #[error("Invalid value '{value}' for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        value: String,
        message: String,
    },

    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Missing API key: set OPENAI_API_KEY in the environment or a .env file")]
    MissingApiKey,
}

/// Errors from a single completion round-trip.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server returned error status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("Completion rejected: {0}")]
    Rejected(String),

    #[error("Completion failed after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<InvocationError>,
    },
}

impl InvocationError {
    /// Number of attempts that were made before this error was returned.
    pub fn attempts(&self) -> u32 {
        match self {
            InvocationError::Exhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}

/// Errors while turning a source document into plain text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported file format: {name}")]
    Unsupported { name: String },

    #[error("Failed to extract text from PDF {name}: {message}")]
    Pdf { name: String, message: String },

    #[error("Document {name} contains no text")]
    Empty { name: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Errors from the balanced (token-sliced) splitter.
#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to decode tokens of chunk {index}: {message}")]
    Decode { index: usize, message: String },

    #[error("Balanced split lost tokens: produced {produced}, expected {expected}")]
    SizeMismatch { produced: usize, expected: usize },
}

/// Errors while writing batch results.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}
