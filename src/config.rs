//! Configuration types for the extraction cascade.
//!
//! All behaviour is controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config across documents and to see in one place why
//! two runs behaved differently.

use crate::error::ExtractError;
use crate::guide::ExtractionGuide;
use crate::normalize::PriceStyle;
use crate::pipeline::ocr::OcrEngine;
use crate::progress::ProgressHandle;
use crate::retry::RetryPolicy;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Thresholds the quality gate compares cheap-stage output against.
///
/// The defaults are tuned for multi-hundred-row vendor price lists; a short
/// brochure-style list will fail the row threshold and escalate to the
/// vision model, which is the intended behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    /// Minimum rows for a cheap-stage result to stand. Default: 500.
    pub min_rows: usize,
    /// Minimum fraction of rows with a recovered code. Default: 0.70.
    pub min_code_ratio: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_rows: 500,
            min_code_ratio: 0.70,
        }
    }
}

/// Configuration for one extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use fiyatex::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .concurrency(8)
///     .model("gpt-4o")
///     .default_currency("EUR")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI for the vision fallback. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Rendering DPI for the OCR fallback. Default: 300.
    ///
    /// OCR engines want more pixels per glyph than a vision model does, so
    /// the two stages rasterise independently.
    pub ocr_dpi: u32,

    /// Cap on either rendered image dimension in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Concurrent vision calls per document. Default: 5.
    pub concurrency: usize,

    /// Model identifier, e.g. "gpt-4o". If None, uses the provider default.
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "anthropic"). If None along with
    /// `provider`, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1, since extraction wants determinism.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Backoff policy for transient model errors.
    pub retry: RetryPolicy,

    /// Per-model-call timeout in seconds. Default: 120.
    ///
    /// A timeout here triggers the retry-then-split ladder rather than
    /// failing the page outright.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Quality-gate thresholds for cheap-stage results.
    pub quality: QualityThresholds,

    /// Currency code used when none is detected. Default: "TRY".
    pub default_currency: String,

    /// Separator convention for price strings. Default: [`PriceStyle::Eu`].
    pub price_style: PriceStyle,

    /// Skip the cheap stages and go straight to the vision fallback.
    pub force_fallback: bool,

    /// Per-document prompt overrides for the vision stage.
    pub guide: Option<ExtractionGuide>,

    /// OCR engine for the pre-vision text recovery stage. None skips OCR.
    pub ocr: Option<Arc<dyn OcrEngine>>,

    /// Progress callback. None means no events are emitted.
    pub progress: Option<ProgressHandle>,

    /// Directory for raw model responses, one subdirectory per source stem.
    /// None disables dumping.
    pub debug_dir: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            ocr_dpi: 300,
            max_rendered_pixels: 2000,
            concurrency: 5,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            retry: RetryPolicy::default(),
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            quality: QualityThresholds::default(),
            default_currency: "TRY".to_string(),
            price_style: PriceStyle::Eu,
            force_fallback: false,
            guide: None,
            ocr: None,
            progress: None,
            debug_dir: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("ocr_dpi", &self.ocr_dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("quality", &self.quality)
            .field("default_currency", &self.default_currency)
            .field("price_style", &self.price_style)
            .field("force_fallback", &self.force_fallback)
            .field("ocr", &self.ocr.as_ref().map(|_| "<dyn OcrEngine>"))
            .field("debug_dir", &self.debug_dir)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn ocr_dpi(mut self, dpi: u32) -> Self {
        self.config.ocr_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn quality(mut self, thresholds: QualityThresholds) -> Self {
        self.config.quality = thresholds;
        self
    }

    pub fn default_currency(mut self, code: impl Into<String>) -> Self {
        self.config.default_currency = code.into();
        self
    }

    pub fn price_style(mut self, style: PriceStyle) -> Self {
        self.config.price_style = style;
        self
    }

    pub fn force_fallback(mut self, v: bool) -> Self {
        self.config.force_fallback = v;
        self
    }

    pub fn guide(mut self, guide: ExtractionGuide) -> Self {
        self.config.guide = Some(guide);
        self
    }

    pub fn ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr = Some(engine);
        self
    }

    pub fn progress(mut self, handle: ProgressHandle) -> Self {
        self.config.progress = Some(handle);
        self
    }

    pub fn debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.debug_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(ExtractError::InvalidConfig(
                "concurrency must be ≥ 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&c.quality.min_code_ratio) {
            return Err(ExtractError::InvalidConfig(format!(
                "min_code_ratio must be within 0–1, got {}",
                c.quality.min_code_ratio
            )));
        }
        if c.default_currency.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "default_currency must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExtractionConfig::builder().build().unwrap();
        assert_eq!(config.dpi, 150);
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.quality.min_rows, 500);
        assert_eq!(config.default_currency, "TRY");
        assert!(!config.force_fallback);
    }

    #[test]
    fn builder_clamps_out_of_range_values() {
        let config = ExtractionConfig::builder()
            .dpi(9999)
            .concurrency(0)
            .temperature(5.0)
            .build()
            .unwrap();
        assert_eq!(config.dpi, 400);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.temperature, 2.0);
    }

    #[test]
    fn invalid_ratio_rejected() {
        let result = ExtractionConfig::builder()
            .quality(QualityThresholds {
                min_rows: 10,
                min_code_ratio: 1.5,
            })
            .build();
        assert!(matches!(result, Err(ExtractError::InvalidConfig(_))));
    }
}
