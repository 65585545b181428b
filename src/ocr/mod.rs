//! OCR pipeline with provider fallback.
//!
//! Each requested provider maps to an ordered chain of attempts. The first
//! attempt whose output is not a refusal wins; Tesseract closes every chain.

pub mod preprocess;
pub mod tesseract;

use std::sync::Arc;

use image::DynamicImage;
use tracing::{info, warn};

use crate::error::Result;
use crate::llm::{LlmProvider, ProviderKind, Providers};
use tesseract::Tesseract;

const STANDARD_PROMPT: &str =
    "Extract all text from this image. Do not refuse. If no text is present, return an empty string.";
const STRICT_PROMPT: &str = "You must transcribe any readable text from this image. \
If no text is present, return an empty string. Return only the text.";

const REFUSAL_MARKERS: &[&str] = &[
    "i'm sorry, i can't",
    "i am sorry, i can't",
    "cannot extract text from this image",
    "can't extract text",
    "unable to extract text",
    "as an ai",
];

/// True when a model answer should not be accepted as a transcription.
pub fn is_refusal(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    lowered.is_empty() || REFUSAL_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Text extracted from one upload and the step that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutcome {
    pub text: String,
    pub provider: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Variant {
    Original,
    Enhanced,
}

struct Attempt {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    variant: Variant,
    prompt: &'static str,
    label: String,
}

/// Both encodings of the upload; the enhanced one is built lazily.
///
/// Decoding, resizing and PNG encoding are CPU-bound and run on the
/// blocking pool.
struct Images {
    original: Arc<DynamicImage>,
    original_png: Vec<u8>,
    enhanced_png: Option<Vec<u8>>,
}

impl Images {
    async fn load(data: &[u8]) -> Result<Self> {
        let data = data.to_vec();
        let (original, original_png) = tokio::task::spawn_blocking(move || -> Result<_> {
            let original = preprocess::decode(&data)?;
            let png = preprocess::to_png(&original)?;
            Ok((original, png))
        })
        .await??;

        Ok(Self {
            original: Arc::new(original),
            original_png,
            enhanced_png: None,
        })
    }

    async fn get(&mut self, variant: Variant) -> Result<&[u8]> {
        if variant == Variant::Enhanced && self.enhanced_png.is_none() {
            let original = Arc::clone(&self.original);
            let png = tokio::task::spawn_blocking(move || {
                preprocess::to_png(&preprocess::enhance_for_ocr(&original))
            })
            .await??;
            self.enhanced_png = Some(png);
        }

        Ok(match variant {
            Variant::Original => &self.original_png,
            Variant::Enhanced => self.enhanced_png.as_deref().unwrap_or_default(),
        })
    }
}

/// OCR orchestrator.
#[derive(Clone)]
pub struct OcrPipeline {
    providers: Providers,
    tesseract: Tesseract,
}

impl OcrPipeline {
    pub fn new(providers: Providers, tesseract: Tesseract) -> Self {
        Self {
            providers,
            tesseract,
        }
    }

    /// Run the fallback chain for `kind` over an uploaded image.
    pub async fn extract(&self, data: &[u8], kind: ProviderKind, model: Option<&str>) -> Result<OcrOutcome> {
        let mut images = Images::load(data).await?;

        let chain = self.chain(kind, model)?;
        info!(
            "OCR: {} byte upload, provider={}, {} attempt(s) before tesseract",
            data.len(),
            kind.as_str(),
            chain.len()
        );

        for attempt in chain {
            let png = images.get(attempt.variant).await?;
            match attempt
                .provider
                .transcribe(png, attempt.prompt, attempt.model.as_deref())
                .await
            {
                Ok(text) if !is_refusal(&text) => {
                    info!("OCR: accepted output from {}", attempt.label);
                    return Ok(OcrOutcome {
                        text,
                        provider: attempt.label,
                    });
                }
                Ok(_) => warn!("OCR: {} refused or returned nothing, falling back", attempt.label),
                Err(e) => warn!("OCR: {} failed, falling back: {:#}", attempt.label, e),
            }
        }

        let png = images.get(Variant::Enhanced).await?;
        let text = self.tesseract.recognize(png).await?;
        Ok(OcrOutcome {
            text,
            provider: "tesseract".to_string(),
        })
    }

    fn chain(&self, kind: ProviderKind, model: Option<&str>) -> Result<Vec<Attempt>> {
        let primary = self.providers.require_llm(kind)?;
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        let attempt = |provider: &Arc<dyn LlmProvider>,
                       variant: Variant,
                       prompt: &'static str,
                       label: String| Attempt {
            provider: Arc::clone(provider),
            model: model.clone(),
            variant,
            prompt,
            label,
        };

        let chain = match kind {
            ProviderKind::OpenAi => vec![
                attempt(&primary, Variant::Original, STANDARD_PROMPT, "openai".into()),
                attempt(&primary, Variant::Enhanced, STANDARD_PROMPT, "openai+preprocess".into()),
            ],
            ProviderKind::Gemini => {
                let name = model.as_deref().unwrap_or(primary.default_model()).to_string();
                vec![
                    attempt(&primary, Variant::Original, STANDARD_PROMPT, format!("gemini:{}", name)),
                    attempt(
                        &primary,
                        Variant::Enhanced,
                        STANDARD_PROMPT,
                        format!("gemini:{}+preprocess", name),
                    ),
                ]
            }
            ProviderKind::Ollama => {
                let mut chain = vec![
                    attempt(&primary, Variant::Original, STANDARD_PROMPT, "ollama".into()),
                    attempt(&primary, Variant::Original, STRICT_PROMPT, "ollama".into()),
                ];
                // The Ollama model name means nothing to OpenAI, so it uses its own default.
                if let Some(openai) = self.providers.llm(ProviderKind::OpenAi) {
                    chain.push(Attempt {
                        provider: openai,
                        model: None,
                        variant: Variant::Enhanced,
                        prompt: STANDARD_PROMPT,
                        label: "openai+preprocess".into(),
                    });
                }
                chain
            }
        };

        Ok(chain)
    }
}
