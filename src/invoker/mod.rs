//! Completion invoker: the boundary to the text-generation service.
//!
//! The pipeline only sees the [`CompletionInvoker`] trait, so tests swap in a
//! scripted fake and production uses [`OpenAiInvoker`]. Retries live in
//! [`RetryPolicy`], outside any particular invoker.

mod openai;
mod retry;

pub use openai::{DEFAULT_API_BASE, OpenAiInvoker};
pub use retry::{Backoff, RetryPolicy};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, InvocationError};
use crate::models::ModelTable;
use crate::usage::TokenUsage;

/// One completion round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_text: String,
    pub model_id: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl CompletionRequest {
    /// Model must be in `models`, temperature in `[0, 1]`, output budget positive.
    pub fn validate(&self, models: &ModelTable) -> Result<(), ConfigError> {
        models.get(&self.model_id)?;
        validate_sampling(self.temperature, self.max_output_tokens)
    }
}

pub(crate) fn validate_sampling(temperature: f32, max_output_tokens: u32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&temperature) {
        return Err(ConfigError::InvalidTemperature(temperature));
    }
    if max_output_tokens == 0 {
        return Err(ConfigError::ZeroOutputTokens);
    }
    Ok(())
}

/// Generated text plus the usage reported for it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Performs a single completion call.
///
/// Implementations must be safe to call again with the same request.
#[async_trait]
pub trait CompletionInvoker: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, InvocationError>;
}

#[async_trait]
impl<T: CompletionInvoker + ?Sized> CompletionInvoker for std::sync::Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, InvocationError> {
        (**self).complete(request).await
    }
}

/// Scripted invoker for tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    type Responder =
        Box<dyn Fn(usize, &CompletionRequest) -> Result<Completion, InvocationError> + Send + Sync>;
    type DelayFn = Box<dyn Fn(&CompletionRequest) -> Option<Duration> + Send + Sync>;

    /// Answers every call through a closure and records what it was asked.
    ///
    /// The closure gets the zero-based call number and the request.
    pub struct ScriptedInvoker {
        calls: Mutex<Vec<CompletionRequest>>,
        respond: Responder,
        delay: Option<DelayFn>,
    }

    impl ScriptedInvoker {
        pub fn new(
            respond: impl Fn(usize, &CompletionRequest) -> Result<Completion, InvocationError>
            + Send
            + Sync
            + 'static,
        ) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
                delay: None,
            }
        }

        /// Always answers `text` with the given usage.
        pub fn replying(text: &str, usage: TokenUsage) -> Self {
            let text = text.to_string();
            Self::new(move |_, _| {
                Ok(Completion {
                    text: text.clone(),
                    usage,
                })
            })
        }

        pub fn with_delay(
            mut self,
            delay: impl Fn(&CompletionRequest) -> Option<Duration> + Send + Sync + 'static,
        ) -> Self {
            self.delay = Some(Box::new(delay));
            self
        }

        pub fn calls(&self) -> Vec<CompletionRequest> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionInvoker for ScriptedInvoker {
        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<Completion, InvocationError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(request.clone());
                calls.len() - 1
            };
            if let Some(delay) = self.delay.as_ref().and_then(|d| d(request)) {
                tokio::time::sleep(delay).await;
            }
            (self.respond)(n, request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "Summarize.".into(),
            user_text: "text".into(),
            model_id: "gpt-4o-mini".into(),
            temperature: 0.3,
            max_output_tokens: 500,
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(request().validate(&ModelTable::builtin()).is_ok());
    }

    #[test]
    fn test_unknown_model_rejected() {
        let mut req = request();
        req.model_id = "not-a-model".into();
        assert!(matches!(
            req.validate(&ModelTable::builtin()).unwrap_err(),
            ConfigError::UnknownModel(_)
        ));
    }

    #[test]
    fn test_temperature_bounds() {
        let mut req = request();
        req.temperature = 1.0;
        assert!(req.validate(&ModelTable::builtin()).is_ok());
        req.temperature = 1.2;
        assert!(matches!(
            req.validate(&ModelTable::builtin()).unwrap_err(),
            ConfigError::InvalidTemperature(_)
        ));
        req.temperature = -0.1;
        assert!(req.validate(&ModelTable::builtin()).is_err());
    }

    #[test]
    fn test_zero_output_tokens_rejected() {
        let mut req = request();
        req.max_output_tokens = 0;
        assert!(matches!(
            req.validate(&ModelTable::builtin()).unwrap_err(),
            ConfigError::ZeroOutputTokens
        ));
    }

    #[tokio::test]
    async fn test_arc_invoker_delegates() {
        let fake = std::sync::Arc::new(testing::ScriptedInvoker::replying(
            "ok",
            TokenUsage::new(3, 1),
        ));
        let completion = fake.complete(&request()).await.unwrap();
        assert_eq!(completion.text, "ok");
        assert_eq!(fake.call_count(), 1);
    }
}
