//! API request and response DTOs

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PlanLimits;
use crate::data::{
    Business, ContentKind, Draft, EntityId, GeneratedImageRecord, GeneratedTextRecord, ImageStyle,
};
use crate::error::AppError;
use crate::providers::{BrandColor, CandidateImage};
use crate::service::{
    AccountUsage, BrandingOverrides, GenerationRequest, ImageSourceKind, RegenerateMode,
    SoftFailure, StockSelection, UsageRemaining,
};

const MAX_TOPIC_CHARS: usize = 500;
const MAX_SEEN_URLS: usize = 500;

fn default_true() -> bool {
    true
}

// =============================================================================
// Generation
// =============================================================================

/// POST /api/v1/generate body
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub kind: Option<ContentKind>,
    #[serde(default)]
    pub business_id: String,
    #[serde(default)]
    pub topic: String,
    pub tone: Option<String>,
    #[serde(default)]
    pub branding: BrandingOverrides,
    pub framework: Option<String>,
    #[serde(default)]
    pub regenerate_mode: RegenerateMode,
    #[serde(default = "default_true")]
    pub include_image: bool,
    #[serde(default)]
    pub source: ImageSourceKind,
    #[serde(default)]
    pub include_ai_image: bool,
    pub style: Option<String>,
    /// Base64 (or data URL) product photo
    pub product_photo: Option<String>,
    pub page: Option<u32>,
    #[serde(default)]
    pub randomize_stock: bool,
    #[serde(default)]
    pub seen_stock_urls: Vec<String>,
    #[serde(default)]
    pub save_as_draft: bool,
    pub draft_id: Option<String>,
}

impl GenerateRequest {
    /// Check field shapes and decode the product photo
    pub fn into_request(self, max_photo_bytes: usize) -> Result<GenerationRequest, AppError> {
        if self.topic.chars().count() > MAX_TOPIC_CHARS {
            return Err(AppError::Validation(format!(
                "topic must be at most {MAX_TOPIC_CHARS} characters"
            )));
        }
        if self.seen_stock_urls.len() > MAX_SEEN_URLS {
            return Err(AppError::Validation(format!(
                "seen_stock_urls must hold at most {MAX_SEEN_URLS} entries"
            )));
        }
        if self.page == Some(0) {
            return Err(AppError::Validation("page starts at 1".to_string()));
        }

        let product_photo = self
            .product_photo
            .as_deref()
            .map(|photo| decode_product_photo(photo, max_photo_bytes))
            .transpose()?;

        Ok(GenerationRequest {
            kind: self.kind,
            business_id: self.business_id,
            topic: self.topic,
            tone: self.tone,
            branding: self.branding,
            framework: self.framework,
            regenerate_mode: self.regenerate_mode,
            include_image: self.include_image,
            image_source: self.source,
            include_ai_image: self.include_ai_image,
            style: self.style,
            product_photo,
            page: self.page,
            randomize_stock: self.randomize_stock,
            seen_stock_urls: self.seen_stock_urls,
            save_as_draft: self.save_as_draft,
            draft_id: self.draft_id,
        })
    }
}

fn decode_product_photo(photo: &str, max_bytes: usize) -> Result<Vec<u8>, AppError> {
    let encoded = match photo.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => photo,
    };
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|_| AppError::Validation("product_photo must be base64".to_string()))?;
    if bytes.is_empty() {
        return Err(AppError::Validation("product_photo is empty".to_string()));
    }
    if bytes.len() > max_bytes {
        return Err(AppError::Validation(format!(
            "product_photo exceeds {max_bytes} bytes"
        )));
    }
    if image::guess_format(&bytes).is_err() {
        return Err(AppError::Validation(
            "product_photo is not a recognised image".to_string(),
        ));
    }
    Ok(bytes)
}

// =============================================================================
// Usage
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct UsageLimits {
    /// `null` = unlimited
    pub content: Option<i64>,
    pub image: Option<i64>,
}

impl From<PlanLimits> for UsageLimits {
    fn from(limits: PlanLimits) -> Self {
        let finite = |limit: i64| (limit != PlanLimits::UNLIMITED).then_some(limit);
        Self {
            content: finite(limits.content_limit),
            image: finite(limits.image_limit),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageCounts {
    pub content: i64,
    pub image: i64,
    pub zero_stock_fallback: i64,
}

/// GET /api/v1/usage response
#[derive(Debug, Clone, Serialize)]
pub struct UsageResponse {
    pub account_id: String,
    pub plan: String,
    pub period: String,
    pub limits: UsageLimits,
    pub used: UsageCounts,
    pub remaining: UsageRemaining,
}

impl From<AccountUsage> for UsageResponse {
    fn from(usage: AccountUsage) -> Self {
        let remaining = usage.remaining_after(0, 0);
        Self {
            plan: usage.plan.as_str().to_string(),
            limits: usage.limits.into(),
            used: UsageCounts {
                content: usage.counters.content_count,
                image: usage.counters.image_count,
                zero_stock_fallback: usage.counters.fallback_count,
            },
            remaining,
            account_id: usage.account_id,
            period: usage.period,
        }
    }
}

// =============================================================================
// Businesses
// =============================================================================

/// POST /api/v1/businesses body
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBusinessRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub industry: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub tagline: Option<String>,
    pub brand_primary_color: Option<String>,
    pub brand_secondary_color: Option<String>,
    #[serde(default)]
    pub preferred_styles: Vec<String>,
    #[serde(default)]
    pub avoided_styles: Vec<String>,
}

impl CreateBusinessRequest {
    pub fn into_business(self, account_id: &str) -> Result<Business, AppError> {
        let name = self.name.trim().to_string();
        let industry = self.industry.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("name is required".to_string()));
        }
        if industry.is_empty() {
            return Err(AppError::Validation("industry is required".to_string()));
        }

        let color = |field: &str, value: Option<String>| -> Result<Option<String>, AppError> {
            match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                Some(value) => BrandColor::parse(value)
                    .map(|color| Some(color.to_hex()))
                    .ok_or_else(|| AppError::Validation(format!("{field} must be a hex color"))),
                None => Ok(None),
            }
        };
        let styles = |field: &str, names: Vec<String>| -> Result<String, AppError> {
            let parsed = names
                .iter()
                .map(|name| {
                    ImageStyle::parse(name)
                        .map(|style| style.as_str())
                        .ok_or_else(|| {
                            AppError::Validation(format!("{field}: unknown style '{name}'"))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            serde_json::to_string(&parsed).map_err(|e| AppError::Internal(e.into()))
        };
        let optional = |value: Option<String>| {
            value
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let now = Utc::now();
        Ok(Business {
            id: EntityId::new().0,
            account_id: account_id.to_string(),
            name,
            industry,
            description: optional(self.description),
            location: optional(self.location),
            website: optional(self.website),
            tagline: optional(self.tagline),
            brand_primary_color: color("brand_primary_color", self.brand_primary_color)?,
            brand_secondary_color: color("brand_secondary_color", self.brand_secondary_color)?,
            preferred_styles: styles("preferred_styles", self.preferred_styles)?,
            avoided_styles: styles("avoided_styles", self.avoided_styles)?,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BusinessResponse {
    pub id: String,
    pub name: String,
    pub industry: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub tagline: Option<String>,
    pub brand_primary_color: Option<String>,
    pub brand_secondary_color: Option<String>,
    pub preferred_styles: Vec<String>,
    pub avoided_styles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Business> for BusinessResponse {
    fn from(business: Business) -> Self {
        Self {
            preferred_styles: business.preferred_style_names(),
            avoided_styles: business.avoided_style_names(),
            id: business.id,
            name: business.name,
            industry: business.industry,
            description: business.description,
            location: business.location,
            website: business.website,
            tagline: business.tagline,
            brand_primary_color: business.brand_primary_color,
            brand_secondary_color: business.brand_secondary_color,
            created_at: business.created_at,
        }
    }
}

// =============================================================================
// Drafts
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct TextRecordResponse {
    pub id: String,
    pub kind: String,
    pub topic: String,
    pub tone: Option<String>,
    /// String for plain kinds, platform object for bundles
    pub content: serde_json::Value,
    pub content_format: String,
    pub created_at: DateTime<Utc>,
}

impl From<GeneratedTextRecord> for TextRecordResponse {
    fn from(record: GeneratedTextRecord) -> Self {
        let content = match record.content_format.as_str() {
            "bundle" => serde_json::from_str(&record.content)
                .unwrap_or_else(|_| serde_json::Value::String(record.content.clone())),
            _ => serde_json::Value::String(record.content.clone()),
        };
        Self {
            id: record.id,
            kind: record.kind,
            topic: record.topic,
            tone: record.tone,
            content,
            content_format: record.content_format,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageRecordResponse {
    pub id: String,
    pub url: String,
    pub provenance: String,
    pub style: Option<String>,
    pub size: Option<String>,
    pub prompt: Option<String>,
    pub revised_prompt: Option<String>,
    pub ai_trigger: Option<String>,
    pub product_composited: bool,
    pub stages_applied: Vec<String>,
    pub background_removal_method: Option<String>,
    pub photographer_name: Option<String>,
    pub photographer_url: Option<String>,
    pub draft_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<GeneratedImageRecord> for ImageRecordResponse {
    fn from(record: GeneratedImageRecord) -> Self {
        Self {
            stages_applied: record.stage_names(),
            id: record.id,
            url: record.url,
            provenance: record.provenance,
            style: record.style,
            size: record.size,
            prompt: record.prompt,
            revised_prompt: record.revised_prompt,
            ai_trigger: record.ai_trigger,
            product_composited: record.product_composited,
            background_removal_method: record.background_removal_method,
            photographer_name: record.photographer_name,
            photographer_url: record.photographer_url,
            draft_id: record.draft_id,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftResponse {
    pub id: String,
    pub business_id: String,
    pub kind: String,
    pub topic: String,
    pub text: Option<TextRecordResponse>,
    pub image: Option<ImageRecordResponse>,
    pub created_at: DateTime<Utc>,
}

impl DraftResponse {
    pub fn new(
        draft: Draft,
        text: Option<GeneratedTextRecord>,
        image: Option<GeneratedImageRecord>,
    ) -> Self {
        Self {
            id: draft.id,
            business_id: draft.business_id,
            kind: draft.kind,
            topic: draft.topic,
            text: text.map(Into::into),
            image: image.map(Into::into),
            created_at: draft.created_at,
        }
    }
}

// =============================================================================
// Stock selection
// =============================================================================

/// POST /api/v1/images/stock-selection body
#[derive(Debug, Clone, Deserialize)]
pub struct StockSelectionRequest {
    pub business_id: String,
    pub kind: ContentKind,
    pub topic: String,
    pub image: CandidateImage,
    pub draft_id: Option<String>,
}

impl From<StockSelectionRequest> for StockSelection {
    fn from(request: StockSelectionRequest) -> Self {
        Self {
            business_id: request.business_id,
            kind: request.kind,
            topic: request.topic,
            candidate: request.image,
            draft_id: request.draft_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StockSelectionResponse {
    pub image: ImageRecordResponse,
    pub errors: Vec<SoftFailure>,
}
