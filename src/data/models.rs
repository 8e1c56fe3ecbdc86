//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Accounts and usage
// =============================================================================

/// Billing plan of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Starter,
    Pro,
    Agency,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Agency => "agency",
        }
    }

    /// Unknown values fall back to the free plan
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "starter" => Self::Starter,
            "pro" => Self::Pro,
            "agency" => Self::Agency,
            _ => Self::Free,
        }
    }
}

/// An account as known to this service
///
/// The plan is owned by the billing system and refreshed from the
/// session claims on every authenticated request.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    pub plan: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn plan_tier(&self) -> PlanTier {
        PlanTier::parse(&self.plan)
    }
}

/// Monthly usage counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UsageCounters {
    pub content_count: i64,
    pub image_count: i64,
    /// AI images generated only because stock returned nothing
    pub fallback_count: i64,
}

// =============================================================================
// Content kinds
// =============================================================================

/// What the caller wants written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentKind {
    /// Long-form article
    BlogPost,
    /// Single social post
    SocialPost,
    /// Multi-platform social bundle
    SocialPack,
    /// Business-profile update post
    BusinessUpdate,
    /// Email newsletter
    Email,
    /// Reply to a customer review
    ReviewReply,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlogPost => "blog-post",
            Self::SocialPost => "social-post",
            Self::SocialPack => "social-pack",
            Self::BusinessUpdate => "business-update",
            Self::Email => "email",
            Self::ReviewReply => "review-reply",
        }
    }

    /// Review replies never carry an image
    pub fn supports_image(&self) -> bool {
        !matches!(self, Self::ReviewReply)
    }

    /// Social formats are cropped square, everything else landscape
    pub fn prefers_square(&self) -> bool {
        matches!(self, Self::SocialPost | Self::SocialPack)
    }
}

/// Visual style of an AI-generated image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageStyle {
    Photorealistic,
    Lifestyle,
    FlatLay,
    Minimalist,
    Editorial,
    Cinematic,
    Illustration,
    Vibrant,
}

impl ImageStyle {
    pub const ALL: [ImageStyle; 8] = [
        Self::Photorealistic,
        Self::Lifestyle,
        Self::FlatLay,
        Self::Minimalist,
        Self::Editorial,
        Self::Cinematic,
        Self::Illustration,
        Self::Vibrant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photorealistic => "photorealistic",
            Self::Lifestyle => "lifestyle",
            Self::FlatLay => "flat-lay",
            Self::Minimalist => "minimalist",
            Self::Editorial => "editorial",
            Self::Cinematic => "cinematic",
            Self::Illustration => "illustration",
            Self::Vibrant => "vibrant",
        }
    }

    /// Lenient parse: case, spaces and underscores are ignored
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '_'], "-");
        Self::ALL
            .into_iter()
            .find(|style| {
                style.as_str() == normalized || style.as_str().replace('-', "") == normalized
            })
    }

    /// Phrase appended to the image prompt
    pub fn prompt_hint(&self) -> &'static str {
        match self {
            Self::Photorealistic => "photorealistic, natural lighting, high detail",
            Self::Lifestyle => "candid lifestyle photography, real people, warm atmosphere",
            Self::FlatLay => "overhead flat-lay composition, clean surface, neatly arranged items",
            Self::Minimalist => "minimalist composition, generous negative space, soft palette",
            Self::Editorial => "editorial magazine photography, considered composition",
            Self::Cinematic => "cinematic wide shot, dramatic lighting, shallow depth of field",
            Self::Illustration => "modern flat illustration, clean vector shapes",
            Self::Vibrant => "bold vibrant colors, energetic composition, high contrast",
        }
    }
}

// =============================================================================
// Business profile
// =============================================================================

/// Brand context a generation runs against
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Business {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub industry: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub tagline: Option<String>,
    /// Hex color, e.g. "#1F6FEB"
    pub brand_primary_color: Option<String>,
    pub brand_secondary_color: Option<String>,
    /// JSON array of image style names
    pub preferred_styles: String,
    /// JSON array of image style names
    pub avoided_styles: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Business {
    pub fn preferred_style_names(&self) -> Vec<String> {
        parse_string_list(&self.preferred_styles)
    }

    pub fn avoided_style_names(&self) -> Vec<String> {
        parse_string_list(&self.avoided_styles)
    }
}

fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(raw).unwrap_or_default()
}

// =============================================================================
// Generation records
// =============================================================================

/// Audit record of one text generation
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GeneratedTextRecord {
    pub id: String,
    pub account_id: String,
    pub business_id: String,
    pub kind: String,
    pub topic: String,
    pub tone: Option<String>,
    /// Plain text, or the JSON-encoded platform bundle
    pub content: String,
    /// "plain" or "bundle"
    pub content_format: String,
    pub draft_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Where an image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageProvenance {
    Stock,
    Ai,
    /// AI background with a product photo composited in
    Composite,
}

impl ImageProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Ai => "ai",
            Self::Composite => "composite",
        }
    }
}

/// Record of the image that was actually produced or chosen
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GeneratedImageRecord {
    pub id: String,
    pub account_id: String,
    pub business_id: String,
    pub kind: String,
    pub topic: String,
    /// Permanent URL or data URL
    pub url: String,
    pub provenance: String,
    pub style: Option<String>,
    pub size: Option<String>,
    pub prompt: Option<String>,
    pub revised_prompt: Option<String>,
    /// Why the AI path ran: explicit, opt_in, zero_stock_fallback
    pub ai_trigger: Option<String>,
    pub product_composited: bool,
    /// JSON array of post-processing stage names that ran
    pub stages_applied: String,
    pub background_removal_method: Option<String>,
    pub photographer_name: Option<String>,
    pub photographer_url: Option<String>,
    pub download_location: Option<String>,
    pub draft_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GeneratedImageRecord {
    pub fn stage_names(&self) -> Vec<String> {
        parse_string_list(&self.stages_applied)
    }
}

/// A saved, user-visible content artifact
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Draft {
    pub id: String,
    pub account_id: String,
    pub business_id: String,
    pub kind: String,
    pub topic: String,
    pub text_id: Option<String>,
    pub image_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
