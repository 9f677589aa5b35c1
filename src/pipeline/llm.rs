//! Model access for the fallback stages.
//!
//! The retry/split ladder in [`crate::pipeline::vision`] only needs two
//! things from a backend: send messages, get text and token counts back.
//! [`VisionModel`] pins that seam down so the ladder can be driven by a
//! scripted fake in tests, while production wraps a real provider through
//! [`ProviderVisionModel`].

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, ModelError};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tracing::debug;

/// One completed model call.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Minimal chat surface the fallback stages call through.
pub trait VisionModel: Send + Sync {
    fn complete(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<ModelReply, ModelError>>;
}

/// Production [`VisionModel`] over an `edgequake_llm` provider.
pub struct ProviderVisionModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl ProviderVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }
}

impl VisionModel for ProviderVisionModel {
    fn complete(&self, messages: Vec<ChatMessage>) -> BoxFuture<'_, Result<ModelReply, ModelError>> {
        async move {
            let response = self
                .provider
                .chat(&messages, Some(&self.options))
                .await
                .map_err(|e| ModelError::classify(&e.to_string()))?;
            debug!(
                input_tokens = response.prompt_tokens,
                output_tokens = response.completion_tokens,
                "model call complete"
            );
            Ok(ModelReply {
                content: response.content,
                input_tokens: response.prompt_tokens as u64,
                output_tokens: response.completion_tokens as u64,
            })
        }
        .boxed()
    }
}

/// Build `CompletionOptions` from the extraction config.
pub fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Default model when the caller names a provider but no model.
const DEFAULT_MODEL: &str = "gpt-4o";

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. Pre-built provider (`config.provider`), used as-is; this is also how
///    tests inject fakes.
/// 2. Named provider (`config.provider_name`) plus optional model; the
///    factory reads the matching API key from the environment.
/// 3. Environment pair `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, a
///    deployment-level choice, honoured before auto-detection so it wins
///    even when several API keys are present.
/// 4. Full auto-detection (`ProviderFactory::from_env`), preferring OpenAI
///    when its key is set.
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                 Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                 Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ExtractionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }
}
