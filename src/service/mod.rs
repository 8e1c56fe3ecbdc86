//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate the database, the quota ledger and the external
//! providers.

mod generation;
mod postprocess;
mod quota;
mod sourcing;
mod stock;
mod style;

pub use generation::{
    BrandingOverrides, GeneratedImageView, GenerationRequest, GenerationResponse,
    GenerationService, RegenerateMode, StockSelection,
};
pub use postprocess::{PostProcessOptions, PostProcessingChain, ProcessedImage, extract_headline};
pub use quota::{AccountUsage, QuotaLedger, QuotaReservation, UsageRemaining, current_period};
pub use sourcing::{
    AiTrigger, ImageSourceKind, ImageSourcingStrategy, ProducedImage, SourcingOutcome,
    SourcingRequest,
};
pub use stock::{KeywordTiers, StockImageSelector, keyword_tiers, rotated_terms};
pub use style::{StylePreferences, resolve_style};

use serde::Serialize;
use std::fmt::Display;

use crate::metrics::SOFT_FAILURES_TOTAL;

/// Pipeline stage a soft failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    StockLookup,
    ImageQuota,
    AiGeneration,
    ImageFetch,
    BackgroundRemoval,
    Compositing,
    TextOverlay,
    Storage,
    DownloadTracking,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StockLookup => "stock_lookup",
            Self::ImageQuota => "image_quota",
            Self::AiGeneration => "ai_generation",
            Self::ImageFetch => "image_fetch",
            Self::BackgroundRemoval => "background_removal",
            Self::Compositing => "compositing",
            Self::TextOverlay => "text_overlay",
            Self::Storage => "storage",
            Self::DownloadTracking => "download_tracking",
        }
    }
}

/// A degraded, non-fatal step reported back in the response envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoftFailure {
    pub stage: Stage,
    pub message: String,
}

impl SoftFailure {
    /// Log and count a soft failure.
    ///
    /// `fallback` names what the pipeline does instead.
    pub fn record(stage: Stage, error: impl Display, fallback: &str) -> Self {
        let message = error.to_string();
        tracing::warn!(
            stage = stage.as_str(),
            error = %message,
            fallback,
            "Soft failure; continuing with degraded output"
        );
        SOFT_FAILURES_TOTAL.with_label_values(&[stage.as_str()]).inc();
        Self { stage, message }
    }
}
