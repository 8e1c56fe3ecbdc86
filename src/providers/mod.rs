//! External collaborators
//!
//! Traits the generation pipeline depends on, plus the HTTP clients that
//! implement them in production:
//! - Text generation (OpenAI-compatible chat completions)
//! - Stock photos (Unsplash-compatible search)
//! - AI images (OpenAI-compatible image generation)
//! - Background removal and text overlay (image tools service)
//! - Compositing (in-process, `image` crate)
//! - Image download by URL

mod ai_image;
mod compositor;
mod image_tools;
mod stock;
mod text;

pub use ai_image::OpenAiImageGenerator;
pub use compositor::LocalCompositor;
pub use image_tools::{HttpImageFetcher, ImageToolsClient};
pub use stock::UnsplashClient;
pub use text::OpenAiTextGenerator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::data::{ContentKind, ImageProvenance, ImageStyle};

/// Errors raised by external collaborators
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or protocol failure
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// Unexpected response shape
    #[error("{provider} response could not be decoded: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    /// Call exceeded its time budget
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    /// Image decode/encode failure
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
}

impl ProviderError {
    pub fn decode(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            provider,
            message: message.into(),
        }
    }
}

/// Turn a reqwest response into the decoded body or a status error.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            provider,
            status: status.as_u16(),
            body: truncate_for_log(&body),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|source| ProviderError::Transport { provider, source })?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::decode(provider, e.to_string()))
}

fn truncate_for_log(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

/// Run a provider call under its time budget, recording the outcome.
pub(crate) async fn bounded<T, F>(
    provider: &'static str,
    budget: Duration,
    call: F,
) -> Result<T, ProviderError>
where
    F: std::future::Future<Output = Result<T, ProviderError>>,
{
    let started = std::time::Instant::now();
    let result = match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(provider, budget)),
    };

    let status = match &result {
        Ok(_) => "ok",
        Err(ProviderError::Timeout(..)) => "timeout",
        Err(_) => "error",
    };
    crate::metrics::observe_provider_call(provider, status, started.elapsed());
    tracing::debug!(
        provider,
        status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Provider call finished"
    );

    result
}

/// Shared reqwest client builder for provider clients
pub(crate) fn build_http_client(user_agent: &str) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .build()
}

// =============================================================================
// Shared request context
// =============================================================================

/// Business facts the copy is written about
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BusinessContext {
    pub name: String,
    pub industry: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
}

/// Optional branding the caller can override per request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BrandFields {
    pub tagline: Option<String>,
    pub cta_text: Option<String>,
    pub keywords: Vec<String>,
    pub service_area: Option<String>,
    pub primary_color: Option<BrandColor>,
    pub secondary_color: Option<BrandColor>,
}

/// RGB color parsed from `#RRGGBB` (or `#RGB`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrandColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl BrandColor {
    pub fn parse(value: &str) -> Option<Self> {
        let hex = value.trim().strip_prefix('#').unwrap_or(value.trim());
        if !hex.is_ascii() {
            return None;
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Serialize for BrandColor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

// =============================================================================
// Text generation
// =============================================================================

/// Everything the text provider needs for one call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRequest {
    pub kind: ContentKind,
    pub business: BusinessContext,
    pub topic: String,
    pub tone: String,
    pub brand: BrandFields,
    /// Marketing framework recommendation, passed through untouched
    pub framework: Option<String>,
}

/// One platform's post inside a social bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformPost {
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,
}

/// Fixed platform → post mapping returned for social packs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformBundle {
    pub facebook: PlatformPost,
    pub instagram: PlatformPost,
    pub linkedin: PlatformPost,
    pub x: PlatformPost,
}

/// Rendered copy
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TextOutput {
    Plain(String),
    Bundle(PlatformBundle),
}

impl TextOutput {
    /// Storage format tag
    pub fn format(&self) -> &'static str {
        match self {
            Self::Plain(_) => "plain",
            Self::Bundle(_) => "bundle",
        }
    }

    /// Serialized form for the audit record
    pub fn to_stored(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Plain(text) => Ok(text.clone()),
            Self::Bundle(bundle) => serde_json::to_string(bundle),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Write copy for the request. The output shape follows `request.kind`.
    async fn generate(&self, request: &TextRequest) -> Result<TextOutput, ProviderError>;
}

// =============================================================================
// Stock photos
// =============================================================================

/// Orientation filter passed to the stock provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Squarish,
}

impl Orientation {
    pub fn for_kind(kind: ContentKind) -> Self {
        if kind.prefers_square() {
            Self::Squarish
        } else {
            Self::Landscape
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Squarish => "squarish",
        }
    }
}

/// Credit the stock provider requires us to show and report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAttribution {
    pub photographer_name: String,
    pub photographer_url: Option<String>,
    /// Endpoint to ping when the user picks this photo
    pub download_location: Option<String>,
}

/// A stock photo offered to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub provenance: ImageProvenance,
    pub attribution: StockAttribution,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StockPhotoProvider: Send + Sync {
    /// Search photos. No matches is an empty vector, not an error.
    async fn search(
        &self,
        query: &str,
        orientation: Orientation,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<CandidateImage>, ProviderError>;

    /// Report that a photo was picked (provider terms of use)
    async fn track_download(&self, download_location: &str) -> Result<(), ProviderError>;
}

// =============================================================================
// AI images
// =============================================================================

/// Raw image as produced by a provider
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    Url(String),
}

/// Input for one AI image
#[derive(Debug, Clone, PartialEq)]
pub struct AiImageRequest {
    pub kind: ContentKind,
    pub topic: String,
    pub business_name: String,
    pub industry: String,
    pub style: ImageStyle,
    pub brand: BrandFields,
}

/// Output of the AI image provider
#[derive(Debug, Clone, PartialEq)]
pub struct AiImage {
    pub source: ImageSource,
    pub style: ImageStyle,
    pub size: String,
    pub prompt: String,
    /// Set when the provider rewrote the prompt
    pub revised_prompt: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &AiImageRequest) -> Result<AiImage, ProviderError>;
}

// =============================================================================
// Post-processing collaborators
// =============================================================================

/// Product photo with its background removed
#[derive(Debug, Clone, PartialEq)]
pub struct Cutout {
    /// Transparent PNG
    pub bytes: Vec<u8>,
    /// Which removal method the service used, kept for audit
    pub method: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    async fn remove_background(&self, image: &[u8]) -> Result<Cutout, ProviderError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Compositor: Send + Sync {
    /// Place `cutout` onto `background`, accenting with the brand color
    async fn composite(
        &self,
        background: &[u8],
        cutout: &[u8],
        accent: Option<BrandColor>,
    ) -> Result<Vec<u8>, ProviderError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextOverlay: Send + Sync {
    async fn overlay(
        &self,
        image: &[u8],
        headline: &str,
        color: BrandColor,
    ) -> Result<Vec<u8>, ProviderError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}
