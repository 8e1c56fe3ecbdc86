//! Image Post-Processing Chain
//!
//! Background removal → product compositing → text overlay. Each stage
//! runs only when its inputs are present, and a failing stage leaves the
//! image as it was, so the chain always ends with a valid image.

use std::sync::Arc;

use super::{SoftFailure, Stage};
use crate::providers::{BackgroundRemover, BrandColor, Compositor, TextOverlay};

const HEADLINE_MAX_WORDS: usize = 6;
const HEADLINE_MAX_CHARS: usize = 40;

/// Inputs that switch stages on
#[derive(Debug, Clone, Default)]
pub struct PostProcessOptions {
    /// Product photo to cut out and composite
    pub product_photo: Option<Vec<u8>>,
    /// Accent for compositing and styling for the overlay
    pub brand_color: Option<BrandColor>,
    /// Source of the overlay headline
    pub topic: String,
}

/// Chain output
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    pub stages_applied: Vec<Stage>,
    pub product_composited: bool,
    pub background_removal_method: Option<String>,
    pub failures: Vec<SoftFailure>,
}

/// Post-processing chain service
#[derive(Clone)]
pub struct PostProcessingChain {
    remover: Option<Arc<dyn BackgroundRemover>>,
    compositor: Arc<dyn Compositor>,
    overlay: Option<Arc<dyn TextOverlay>>,
}

impl PostProcessingChain {
    pub fn new(
        remover: Option<Arc<dyn BackgroundRemover>>,
        compositor: Arc<dyn Compositor>,
        overlay: Option<Arc<dyn TextOverlay>>,
    ) -> Self {
        Self {
            remover,
            compositor,
            overlay,
        }
    }

    /// Run every applicable stage over `raw`
    pub async fn process(&self, raw: Vec<u8>, options: &PostProcessOptions) -> ProcessedImage {
        let mut processed = ProcessedImage {
            bytes: raw,
            stages_applied: Vec::new(),
            product_composited: false,
            background_removal_method: None,
            failures: Vec::new(),
        };

        // 1. Background removal
        let cutout = match &options.product_photo {
            Some(photo) => self.remove_background(photo, &mut processed).await,
            None => None,
        };

        // 2. Compositing (only with a cutout)
        if let Some(cutout) = cutout {
            match self
                .compositor
                .composite(&processed.bytes, &cutout, options.brand_color)
                .await
            {
                Ok(bytes) => {
                    processed.bytes = bytes;
                    processed.product_composited = true;
                    processed.stages_applied.push(Stage::Compositing);
                }
                Err(error) => processed.failures.push(SoftFailure::record(
                    Stage::Compositing,
                    error,
                    "keeping background without product",
                )),
            }
        }

        // 3. Text overlay (only with a brand color and a headline)
        if let Some(color) = options.brand_color {
            self.overlay_headline(&options.topic, color, &mut processed)
                .await;
        }

        processed
    }

    async fn remove_background(
        &self,
        photo: &[u8],
        processed: &mut ProcessedImage,
    ) -> Option<Vec<u8>> {
        let Some(remover) = &self.remover else {
            processed.failures.push(SoftFailure::record(
                Stage::BackgroundRemoval,
                "background removal is not configured",
                "skipping product compositing",
            ));
            return None;
        };

        match remover.remove_background(photo).await {
            Ok(cutout) => {
                processed.background_removal_method = Some(cutout.method);
                processed.stages_applied.push(Stage::BackgroundRemoval);
                Some(cutout.bytes)
            }
            Err(error) => {
                processed.failures.push(SoftFailure::record(
                    Stage::BackgroundRemoval,
                    error,
                    "skipping product compositing",
                ));
                None
            }
        }
    }

    async fn overlay_headline(
        &self,
        topic: &str,
        color: BrandColor,
        processed: &mut ProcessedImage,
    ) {
        let Some(headline) = extract_headline(topic) else {
            tracing::debug!(topic, "No headline extracted; skipping text overlay");
            return;
        };
        let Some(overlay) = &self.overlay else {
            tracing::debug!("Text overlay is not configured; skipping");
            return;
        };

        match overlay.overlay(&processed.bytes, &headline, color).await {
            Ok(bytes) => {
                processed.bytes = bytes;
                processed.stages_applied.push(Stage::TextOverlay);
            }
            Err(error) => processed.failures.push(SoftFailure::record(
                Stage::TextOverlay,
                error,
                "keeping image without headline",
            )),
        }
    }
}

/// Short title-cased headline from the topic's first clause
pub fn extract_headline(topic: &str) -> Option<String> {
    let clause = topic
        .split(['.', ':', '!', '?', '|', ';', '\n'])
        .map(str::trim)
        .find(|clause| !clause.is_empty())?;

    let mut headline = String::new();
    for word in clause.split_whitespace().take(HEADLINE_MAX_WORDS) {
        let word = title_case(word);
        let extra = if headline.is_empty() { 0 } else { 1 };
        if headline.chars().count() + extra + word.chars().count() > HEADLINE_MAX_CHARS {
            break;
        }
        if !headline.is_empty() {
            headline.push(' ');
        }
        headline.push_str(&word);
    }

    (!headline.is_empty()).then_some(headline)
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
