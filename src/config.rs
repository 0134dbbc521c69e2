//! Configuration from `condense.toml`, environment and command line.
//!
//! Layering is file → environment → CLI. Every field has a default, so an
//! empty or missing file is a valid configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [defaults]
//! model = "gpt-4o-mini"
//! temperature = 0.3
//! max_output_tokens = 1000
//! reserved_completion_tokens = 1000
//! limit = "500 characters"
//!
//! [retry]
//! max_attempts = 3
//! delay_secs = 30
//!
//! [pipeline]
//! max_depth = 5
//! failure_policy = "best-effort"
//! concurrency = 1
//!
//! [batch]
//! max_errors = 3
//!
//! [api]
//! base_url = "https://api.openai.com/v1"
//! timeout_secs = 120
//!
//! [[models]]
//! id = "my-local-model"
//! context_tokens = 32768
//! encoding = "cl100k_base"
//! ```
//!
//! Environment: `OPENAI_API_KEY`, `CONDENSE_MODEL`, `CONDENSE_API_BASE`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::DEFAULT_MAX_ERRORS;
use crate::errors::ConfigError;
use crate::invoker::{Backoff, DEFAULT_API_BASE, RetryPolicy};
use crate::models::{ModelConfig, ModelTable};
use crate::pipeline::{FailurePolicy, PipelineConfig};
use crate::prompt::Limit;

pub const CONFIG_FILE_NAME: &str = "condense.toml";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const MODEL_ENV: &str = "CONDENSE_MODEL";
pub const API_BASE_ENV: &str = "CONDENSE_API_BASE";

/// Model and sampling defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Context tokens kept free for the completion
    #[serde(default = "default_reserved_completion_tokens")]
    pub reserved_completion_tokens: usize,
    /// Target summary size, e.g. "500 characters" or "3 sentences"
    #[serde(default = "default_limit")]
    pub limit: String,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_output_tokens() -> u32 {
    1000
}

fn default_reserved_completion_tokens() -> usize {
    1000
}

fn default_limit() -> String {
    "500 characters".to_string()
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            reserved_completion_tokens: default_reserved_completion_tokens(),
            limit: default_limit(),
        }
    }
}

/// Retry behavior for completion calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
    /// Double the delay after each failure, up to `max_delay_secs`
    #[serde(default)]
    pub exponential: bool,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_secs() -> u64 {
    30
}

fn default_max_delay_secs() -> u64 {
    300
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
            exponential: false,
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        let base = Duration::from_secs(self.delay_secs);
        let backoff = if self.exponential {
            Backoff::Exponential {
                base,
                max: Duration::from_secs(self.max_delay_secs.max(self.delay_secs)),
            }
        } else {
            Backoff::Fixed(base)
        };
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff,
        }
    }
}

/// Reduction controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_max_depth() -> usize {
    5
}

fn default_concurrency() -> usize {
    1
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            failure_policy: FailurePolicy::default(),
            concurrency: default_concurrency(),
        }
    }
}

/// Batch mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSection {
    /// Failed documents after which a batch stops; 0 never stops
    #[serde(default = "default_max_errors")]
    pub max_errors: usize,
}

fn default_max_errors() -> usize {
    DEFAULT_MAX_ERRORS
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            max_errors: default_max_errors(),
        }
    }
}

/// Completion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// The complete condense.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CondenseToml {
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub batch: BatchSection,
    #[serde(default)]
    pub api: ApiSection,
    /// Additional or replacement model definitions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelConfig>,
}

impl CondenseToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `condense.toml` from `dir`, or defaults if there is none.
    pub fn load_or_default(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `CONDENSE_MODEL` and `CONDENSE_API_BASE` when set.
    pub fn apply_env(&mut self) {
        if let Ok(model) = std::env::var(MODEL_ENV)
            && !model.trim().is_empty()
        {
            self.defaults.model = model.trim().to_string();
        }
        if let Ok(base) = std::env::var(API_BASE_ENV)
            && !base.trim().is_empty()
        {
            self.api.base_url = base.trim().to_string();
        }
    }

    pub fn model_table(&self) -> ModelTable {
        ModelTable::with_overrides(&self.models)
    }

    pub fn limit(&self) -> Result<Limit, ConfigError> {
        self.defaults.limit.parse()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_model(self.defaults.model.clone())
            .with_temperature(self.defaults.temperature)
            .with_max_output_tokens(self.defaults.max_output_tokens)
            .with_reserved_completion_tokens(self.defaults.reserved_completion_tokens)
            .with_max_depth(self.pipeline.max_depth)
            .with_failure_policy(self.pipeline.failure_policy)
            .with_concurrency(self.pipeline.concurrency)
            .with_retry(self.retry.policy())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let d = &self.defaults;

        if !(0.0..=1.0).contains(&d.temperature) {
            warnings.push(format!(
                "Invalid temperature {}: must be between 0 and 1",
                d.temperature
            ));
        }
        if d.max_output_tokens == 0 {
            warnings.push("max_output_tokens must be positive".to_string());
        }
        if let Err(e) = self.limit() {
            warnings.push(e.to_string());
        }

        let table = self.model_table();
        match table.get(&d.model) {
            Ok(model) if d.reserved_completion_tokens >= model.context_tokens => {
                warnings.push(format!(
                    "reserved_completion_tokens ({}) leaves no room in the {} token context of '{}'",
                    d.reserved_completion_tokens, model.context_tokens, model.id
                ));
            }
            Ok(_) => {}
            Err(_) => warnings.push(format!(
                "Unknown default model '{}': add it under [[models]]",
                d.model
            )),
        }
        for model in &self.models {
            if model.context_tokens == 0 {
                warnings.push(format!("Model '{}' has context_tokens = 0", model.id));
            }
        }

        if self.pipeline.max_depth == 0 {
            warnings.push("pipeline.max_depth must be at least 1".to_string());
        }
        if self.pipeline.concurrency == 0 {
            warnings.push("pipeline.concurrency of 0 is treated as 1".to_string());
        }
        if self.retry.max_attempts == 0 {
            warnings.push("retry.max_attempts of 0 is treated as 1".to_string());
        }
        if self.api.timeout_secs == 0 {
            warnings.push("api.timeout_secs must be positive".to_string());
        }

        warnings
    }
}

/// Loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct CondenseConfig {
    pub toml: CondenseToml,
    /// File the configuration was read from, if any.
    pub source: Option<PathBuf>,
}

impl CondenseConfig {
    /// Load `explicit` (which must exist) or `condense.toml` in `dir`, then
    /// apply environment overrides. `.env` is read first if present.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let (mut toml, source) = match explicit {
            Some(path) => (CondenseToml::load(path)?, Some(path.to_path_buf())),
            None => {
                let path = dir.join(CONFIG_FILE_NAME);
                let source = path.exists().then_some(path);
                (CondenseToml::load_or_default(dir)?, source)
            }
        };
        toml.apply_env();
        Ok(Self { toml, source })
    }

    /// API key from `OPENAI_API_KEY`.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(ConfigError::MissingApiKey),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
