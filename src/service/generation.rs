//! Generation Orchestrator
//!
//! One request, in order: validate → quota check → text → image →
//! persist → respond. Text is the primary deliverable and fails the
//! request; everything image-related degrades into soft failures.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::quota::{QuotaLedger, UsageRemaining};
use super::sourcing::{
    AiTrigger, ImageSourceKind, ImageSourcingStrategy, ProducedImage, SourcingOutcome,
    SourcingRequest,
};
use super::style::StylePreferences;
use super::{SoftFailure, Stage};
use crate::data::{
    Business, ContentKind, Database, Draft, EntityId, GeneratedImageRecord, GeneratedTextRecord,
    ImageProvenance,
};
use crate::error::{AppError, QuotaKind};
use crate::metrics::{GENERATIONS_TOTAL, QUOTA_REJECTIONS_TOTAL};
use crate::providers::{
    BrandColor, BrandFields, BusinessContext, CandidateImage, ImageSource, TextGenerator,
    TextOutput, TextRequest,
};
use crate::storage::{ImageStorage, to_data_url};

const DEFAULT_TONE: &str = "professional";

/// Which parts of the content to (re)generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegenerateMode {
    #[default]
    All,
    TextOnly,
    ImageOnly,
}

impl RegenerateMode {
    pub fn includes_text(&self) -> bool {
        matches!(self, Self::All | Self::TextOnly)
    }

    pub fn includes_image(&self) -> bool {
        matches!(self, Self::All | Self::ImageOnly)
    }
}

/// Per-request branding that overrides the stored business profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BrandingOverrides {
    pub tagline: Option<String>,
    pub cta_text: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub service_area: Option<String>,
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
}

/// One generation call
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub kind: Option<ContentKind>,
    pub business_id: String,
    pub topic: String,
    pub tone: Option<String>,
    pub branding: BrandingOverrides,
    /// Marketing framework recommendation, passed through to the copy writer
    pub framework: Option<String>,
    pub regenerate_mode: RegenerateMode,
    /// Whether the caller wants an image at all
    pub include_image: bool,
    pub image_source: ImageSourceKind,
    pub include_ai_image: bool,
    pub style: Option<String>,
    pub product_photo: Option<Vec<u8>>,
    pub page: Option<u32>,
    pub randomize_stock: bool,
    pub seen_stock_urls: Vec<String>,
    pub save_as_draft: bool,
    /// Existing draft a regenerated image is attached to
    pub draft_id: Option<String>,
}

/// The image returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedImageView {
    pub id: String,
    pub url: String,
    pub provenance: ImageProvenance,
    pub style: Option<String>,
    pub size: Option<String>,
    pub prompt: Option<String>,
    pub revised_prompt: Option<String>,
    pub ai_trigger: Option<AiTrigger>,
    pub product_composited: bool,
    pub stages_applied: Vec<Stage>,
}

/// Unified response envelope
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
    pub text: Option<TextOutput>,
    pub text_id: Option<String>,
    pub image: Option<GeneratedImageView>,
    pub stock_options: Option<Vec<CandidateImage>>,
    pub draft_id: Option<String>,
    pub usage_remaining: UsageRemaining,
    pub errors: Vec<SoftFailure>,
}

/// Input validated in step 1
struct ValidatedRequest {
    kind: ContentKind,
    business: Business,
    brand: BrandFields,
    wants_image: bool,
}

/// Ids written in step 5
struct Persisted {
    text_id: Option<String>,
    image: Option<GeneratedImageView>,
    draft_id: Option<String>,
}

/// Generation orchestrator service
pub struct GenerationService {
    db: Arc<Database>,
    ledger: Arc<QuotaLedger>,
    text: Arc<dyn TextGenerator>,
    sourcing: Arc<ImageSourcingStrategy>,
    storage: Option<Arc<ImageStorage>>,
}

impl GenerationService {
    pub fn new(
        db: Arc<Database>,
        ledger: Arc<QuotaLedger>,
        text: Arc<dyn TextGenerator>,
        sourcing: Arc<ImageSourcingStrategy>,
        storage: Option<Arc<ImageStorage>>,
    ) -> Self {
        Self {
            db,
            ledger,
            text,
            sourcing,
            storage,
        }
    }

    pub fn ledger(&self) -> &Arc<QuotaLedger> {
        &self.ledger
    }

    /// Run one generation request end to end
    pub async fn generate(
        &self,
        account_id: &str,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, AppError> {
        let kind_label = request.kind.map(|kind| kind.as_str()).unwrap_or("unknown");
        let result = self.run(account_id, request).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(AppError::Validation(_)) | Err(AppError::NotFound) => "invalid",
            Err(AppError::QuotaExceeded(_)) => "quota_exceeded",
            Err(AppError::TextGeneration(_)) => "text_failed",
            Err(_) => "error",
        };
        GENERATIONS_TOTAL
            .with_label_values(&[kind_label, outcome])
            .inc();

        result
    }

    async fn run(
        &self,
        account_id: &str,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, AppError> {
        // 1. Validate
        let validated = self.validate(account_id, &request).await?;
        let kind = validated.kind;

        // 2. Quota check; content quota only guards text production
        let usage = self.ledger.snapshot(account_id).await?;
        let spends_content = request.regenerate_mode.includes_text();
        if spends_content && !usage.has_remaining(QuotaKind::Content) {
            return Err(reject(QuotaKind::Content));
        }
        if request.regenerate_mode == RegenerateMode::ImageOnly
            && request.image_source == ImageSourceKind::Ai
            && !usage.has_remaining(QuotaKind::Image)
        {
            return Err(reject(QuotaKind::Image));
        }
        let content_reservation = if spends_content && request.save_as_draft {
            match self.ledger.claim(&usage, QuotaKind::Content).await? {
                Some(reservation) => Some(reservation),
                None => return Err(reject(QuotaKind::Content)),
            }
        } else {
            None
        };

        // 3. Text
        let text = if request.regenerate_mode.includes_text() {
            let text_request = TextRequest {
                kind,
                business: business_context(&validated.business),
                topic: request.topic.trim().to_string(),
                tone: request
                    .tone
                    .as_deref()
                    .map(str::trim)
                    .filter(|tone| !tone.is_empty())
                    .unwrap_or(DEFAULT_TONE)
                    .to_string(),
                brand: validated.brand.clone(),
                framework: request.framework.clone(),
            };
            match self.text.generate(&text_request).await {
                Ok(output) => Some(output),
                Err(error) => {
                    tracing::error!(kind = kind.as_str(), %error, "Text generation failed");
                    if let Some(reservation) = content_reservation {
                        self.ledger.release_quietly(reservation).await;
                    }
                    return Err(AppError::TextGeneration(error.to_string()));
                }
            }
        } else {
            None
        };

        // 4. Image
        let SourcingOutcome {
            stock_options,
            ai_image,
            failures: mut errors,
        } = if validated.wants_image {
            let sourcing_request = SourcingRequest {
                kind,
                topic: request.topic.trim().to_string(),
                business_name: validated.business.name.clone(),
                industry: validated.business.industry.clone(),
                source: request.image_source,
                include_ai_image: request.include_ai_image,
                style: request.style.clone(),
                product_photo: request.product_photo.clone(),
                brand: validated.brand.clone(),
                style_preferences: StylePreferences::from_business(&validated.business),
                page: request.page,
                randomize_stock: request.randomize_stock,
                seen_stock_urls: request.seen_stock_urls.iter().cloned().collect::<HashSet<_>>(),
            };
            self.sourcing.source(&sourcing_request, &usage).await
        } else {
            SourcingOutcome::default()
        };

        // 5. Persist
        let persisted = self
            .persist(
                account_id,
                &request,
                &validated,
                text.as_ref(),
                ai_image.as_ref(),
                &mut errors,
            )
            .await;
        let persisted = match persisted {
            Ok(persisted) => persisted,
            Err(error) => {
                if let Some(reservation) = content_reservation {
                    self.ledger.release_quietly(reservation).await;
                }
                if let Some(image) = ai_image {
                    self.sourcing.discard(image).await;
                }
                return Err(error);
            }
        };

        let content_used = i64::from(content_reservation.is_some());
        let images_used = i64::from(ai_image.is_some());
        if let Some(reservation) = content_reservation {
            self.ledger.commit(reservation);
        }
        if let Some(image) = ai_image {
            self.sourcing.keep(image);
        }

        // 6. Respond. An AI image makes the stock options moot.
        let stock_options =
            (persisted.image.is_none() && !stock_options.is_empty()).then_some(stock_options);

        tracing::info!(
            account_id,
            kind = kind.as_str(),
            text = persisted.text_id.is_some(),
            image = persisted.image.is_some(),
            stock_options = stock_options.as_ref().map_or(0, Vec::len),
            draft = persisted.draft_id.is_some(),
            soft_failures = errors.len(),
            "Generation completed"
        );

        Ok(GenerationResponse {
            text,
            text_id: persisted.text_id,
            image: persisted.image,
            stock_options,
            draft_id: persisted.draft_id,
            usage_remaining: usage.remaining_after(content_used, images_used),
            errors,
        })
    }

    async fn validate(
        &self,
        account_id: &str,
        request: &GenerationRequest,
    ) -> Result<ValidatedRequest, AppError> {
        let kind = request
            .kind
            .ok_or_else(|| AppError::Validation("kind is required".to_string()))?;
        if request.topic.trim().is_empty() {
            return Err(AppError::Validation("topic is required".to_string()));
        }
        if request.business_id.trim().is_empty() {
            return Err(AppError::Validation("business_id is required".to_string()));
        }

        let business = self
            .db
            .get_business(account_id, request.business_id.trim())
            .await?
            .ok_or(AppError::NotFound)?;
        if business.name.trim().is_empty() {
            return Err(AppError::Validation("business name is required".to_string()));
        }
        if business.industry.trim().is_empty() {
            return Err(AppError::Validation("business industry is required".to_string()));
        }

        let wants_image = request.regenerate_mode.includes_image()
            && request.include_image
            && kind.supports_image();
        if request.regenerate_mode == RegenerateMode::ImageOnly && !wants_image {
            return Err(AppError::Validation(format!(
                "image-only regenerate needs include_image and a kind that carries images (got {})",
                kind.as_str()
            )));
        }

        if let Some(draft_id) = &request.draft_id {
            self.db
                .get_draft(account_id, draft_id)
                .await?
                .ok_or(AppError::NotFound)?;
        }

        let brand = brand_fields(&business, &request.branding)?;

        Ok(ValidatedRequest {
            kind,
            business,
            brand,
            wants_image,
        })
    }

    async fn persist(
        &self,
        account_id: &str,
        request: &GenerationRequest,
        validated: &ValidatedRequest,
        text: Option<&TextOutput>,
        ai_image: Option<&ProducedImage>,
        errors: &mut Vec<SoftFailure>,
    ) -> Result<Persisted, AppError> {
        let now = Utc::now();
        let topic = request.topic.trim().to_string();
        let kind = validated.kind.as_str().to_string();

        // Text is written for audit even when no draft is saved
        let text_id = match text {
            Some(output) => {
                let record = GeneratedTextRecord {
                    id: EntityId::new().0,
                    account_id: account_id.to_string(),
                    business_id: validated.business.id.clone(),
                    kind: kind.clone(),
                    topic: topic.clone(),
                    tone: request.tone.clone(),
                    content: output
                        .to_stored()
                        .map_err(|e| AppError::Internal(e.into()))?,
                    content_format: output.format().to_string(),
                    draft_id: None,
                    created_at: now,
                };
                self.db.insert_generated_text(&record).await?;
                Some(record.id)
            }
            None => None,
        };

        let image = match ai_image {
            Some(image) => {
                let id = EntityId::new().0;
                let provenance = if image.product_composited {
                    ImageProvenance::Composite
                } else {
                    ImageProvenance::Ai
                };
                let url = self.store_image(account_id, &id, &image.source, errors).await;
                let record = GeneratedImageRecord {
                    id,
                    account_id: account_id.to_string(),
                    business_id: validated.business.id.clone(),
                    kind: kind.clone(),
                    topic: topic.clone(),
                    url,
                    provenance: provenance.as_str().to_string(),
                    style: Some(image.style.as_str().to_string()),
                    size: Some(image.size.clone()),
                    prompt: Some(image.prompt.clone()),
                    revised_prompt: image.revised_prompt.clone(),
                    ai_trigger: Some(image.trigger.as_str().to_string()),
                    product_composited: image.product_composited,
                    stages_applied: serde_json::to_string(&image.stages_applied)
                        .map_err(|e| AppError::Internal(e.into()))?,
                    background_removal_method: image.background_removal_method.clone(),
                    photographer_name: None,
                    photographer_url: None,
                    download_location: None,
                    draft_id: None,
                    created_at: now,
                };
                self.db.insert_generated_image(&record).await?;
                Some(GeneratedImageView {
                    id: record.id,
                    url: record.url,
                    provenance,
                    style: record.style,
                    size: record.size,
                    prompt: record.prompt,
                    revised_prompt: record.revised_prompt,
                    ai_trigger: Some(image.trigger),
                    product_composited: image.product_composited,
                    stages_applied: image.stages_applied.clone(),
                })
            }
            None => None,
        };

        // New drafts are paid for by the content slot, so only text-bearing modes create one
        let draft_id = if request.save_as_draft && request.regenerate_mode.includes_text() {
            let draft = Draft {
                id: EntityId::new().0,
                account_id: account_id.to_string(),
                business_id: validated.business.id.clone(),
                kind,
                topic,
                text_id: text_id.clone(),
                image_id: image.as_ref().map(|image| image.id.clone()),
                created_at: now,
            };
            self.db.insert_draft_with_links(&draft).await?;
            Some(draft.id)
        } else if let (Some(draft_id), Some(image)) = (&request.draft_id, &image) {
            if !self.db.set_draft_image(account_id, draft_id, &image.id).await? {
                tracing::warn!(
                    draft_id = %draft_id,
                    "Draft disappeared before the image was linked"
                );
            }
            Some(draft_id.clone())
        } else {
            None
        };

        Ok(Persisted {
            text_id,
            image,
            draft_id,
        })
    }

    /// Permanent URL for the final image; data URL when storage is absent or failing
    async fn store_image(
        &self,
        account_id: &str,
        id: &str,
        source: &ImageSource,
        errors: &mut Vec<SoftFailure>,
    ) -> String {
        let bytes = match source {
            ImageSource::Url(url) => return url.clone(),
            ImageSource::Bytes(bytes) => bytes,
        };

        if let Some(storage) = &self.storage {
            match storage.upload_generated(account_id, id, bytes.clone()).await {
                Ok(url) => return url,
                Err(error) => errors.push(SoftFailure::record(
                    Stage::Storage,
                    error,
                    "inlining image as data URL",
                )),
            }
        }
        to_data_url(bytes)
    }

    /// Record the stock photo the user picked
    ///
    /// Stock images are free: no quota is touched. Download tracking is
    /// best-effort.
    pub async fn record_stock_selection(
        &self,
        account_id: &str,
        selection: StockSelection,
    ) -> Result<(GeneratedImageRecord, Vec<SoftFailure>), AppError> {
        if selection.topic.trim().is_empty() {
            return Err(AppError::Validation("topic is required".to_string()));
        }
        match url::Url::parse(selection.candidate.url.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(AppError::Validation(
                    "image url must be an http(s) URL".to_string(),
                ));
            }
        }
        let business = self
            .db
            .get_business(account_id, &selection.business_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if let Some(draft_id) = &selection.draft_id {
            self.db
                .get_draft(account_id, draft_id)
                .await?
                .ok_or(AppError::NotFound)?;
        }

        let attribution = &selection.candidate.attribution;
        let mut record = GeneratedImageRecord {
            id: EntityId::new().0,
            account_id: account_id.to_string(),
            business_id: business.id,
            kind: selection.kind.as_str().to_string(),
            topic: selection.topic.trim().to_string(),
            url: selection.candidate.url.clone(),
            provenance: ImageProvenance::Stock.as_str().to_string(),
            style: None,
            size: None,
            prompt: None,
            revised_prompt: None,
            ai_trigger: None,
            product_composited: false,
            stages_applied: "[]".to_string(),
            background_removal_method: None,
            photographer_name: Some(attribution.photographer_name.clone()),
            photographer_url: attribution.photographer_url.clone(),
            download_location: attribution.download_location.clone(),
            draft_id: None,
            created_at: Utc::now(),
        };
        self.db.insert_generated_image(&record).await?;

        if let Some(draft_id) = &selection.draft_id {
            if self.db.set_draft_image(account_id, draft_id, &record.id).await? {
                record.draft_id = Some(draft_id.clone());
            }
        }

        let mut errors = Vec::new();
        if let (Some(location), Some(selector)) = (
            attribution.download_location.as_deref(),
            self.sourcing.stock_selector(),
        ) {
            if let Err(error) = selector.provider().track_download(location).await {
                errors.push(SoftFailure::record(
                    Stage::DownloadTracking,
                    error,
                    "selection saved without download tracking",
                ));
            }
        }

        Ok((record, errors))
    }
}

/// A stock candidate the user picked
#[derive(Debug, Clone)]
pub struct StockSelection {
    pub business_id: String,
    pub kind: ContentKind,
    pub topic: String,
    pub candidate: CandidateImage,
    pub draft_id: Option<String>,
}

fn reject(kind: QuotaKind) -> AppError {
    QUOTA_REJECTIONS_TOTAL.with_label_values(&[kind.as_str()]).inc();
    tracing::info!(quota = kind.as_str(), "Generation refused: quota exceeded");
    AppError::QuotaExceeded(kind)
}

fn business_context(business: &Business) -> BusinessContext {
    BusinessContext {
        name: business.name.trim().to_string(),
        industry: business.industry.trim().to_string(),
        description: business.description.clone(),
        location: business.location.clone(),
        website: business.website.clone(),
    }
}

/// Merge stored branding with request overrides
fn brand_fields(
    business: &Business,
    overrides: &BrandingOverrides,
) -> Result<BrandFields, AppError> {
    let color = |label: &str, value: Option<&String>| -> Result<Option<BrandColor>, AppError> {
        match value.map(|value| value.trim()).filter(|value| !value.is_empty()) {
            Some(value) => BrandColor::parse(value)
                .map(Some)
                .ok_or_else(|| AppError::Validation(format!("{label} must be a hex color"))),
            None => Ok(None),
        }
    };
    let text = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    Ok(BrandFields {
        tagline: text(&overrides.tagline).or_else(|| text(&business.tagline)),
        cta_text: text(&overrides.cta_text),
        keywords: overrides
            .keywords
            .iter()
            .flatten()
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty())
            .collect(),
        service_area: text(&overrides.service_area).or_else(|| text(&business.location)),
        primary_color: color(
            "primary_color",
            overrides
                .primary_color
                .as_ref()
                .or(business.brand_primary_color.as_ref()),
        )?,
        secondary_color: color(
            "secondary_color",
            overrides
                .secondary_color
                .as_ref()
                .or(business.brand_secondary_color.as_ref()),
        )?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QuotaConfig, ZeroStockFallbackConfig};
    use crate::data::PlanTier;
    use crate::providers::{
        AiImage, MockCompositor, MockImageFetcher, MockImageGenerator, MockStockPhotoProvider,
        MockTextGenerator, ProviderError, StockAttribution,
    };
    use crate::service::{PostProcessingChain, StockImageSelector};
    use tempfile::TempDir;

    const ACCOUNT: &str = "acct-1";

    struct Harness {
        service: GenerationService,
        db: Arc<Database>,
        business_id: String,
        _temp_dir: TempDir,
    }

    fn text_ok() -> MockTextGenerator {
        let mut text = MockTextGenerator::new();
        text.expect_generate()
            .returning(|request| Ok(TextOutput::Plain(format!("Copy about {}", request.topic))));
        text
    }

    fn stock_returning(count: usize) -> MockStockPhotoProvider {
        let mut provider = MockStockPhotoProvider::new();
        provider.expect_search().returning(move |query, _, page, _| {
            Ok((0..count)
                .map(|i| CandidateImage {
                    url: format!("https://img.test/{}/{page}/{i}", query.replace(' ', "-")),
                    thumbnail_url: None,
                    description: None,
                    provenance: ImageProvenance::Stock,
                    attribution: StockAttribution {
                        photographer_name: "Ana".to_string(),
                        photographer_url: None,
                        download_location: Some(format!("https://api.test/dl/{i}")),
                    },
                })
                .collect())
        });
        provider
    }

    fn generator_ok() -> MockImageGenerator {
        let mut generator = MockImageGenerator::new();
        generator.expect_generate().returning(|request| {
            Ok(AiImage {
                source: ImageSource::Bytes(b"\x89PNG\r\n\x1a\nai".to_vec()),
                style: request.style,
                size: "1792x1024".to_string(),
                prompt: "prompt".to_string(),
                revised_prompt: None,
            })
        });
        generator
    }

    async fn harness(
        plan: PlanTier,
        text: MockTextGenerator,
        stock: Option<MockStockPhotoProvider>,
        generator: MockImageGenerator,
    ) -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&temp_dir.path().join("generation.db"))
                .await
                .unwrap(),
        );
        db.upsert_account(ACCOUNT, plan).await.unwrap();

        let now = Utc::now();
        let business = Business {
            id: EntityId::new().0,
            account_id: ACCOUNT.to_string(),
            name: "Harbor Bistro".to_string(),
            industry: "restaurant".to_string(),
            description: None,
            location: Some("Portland".to_string()),
            website: None,
            tagline: None,
            brand_primary_color: None,
            brand_secondary_color: None,
            preferred_styles: "[]".to_string(),
            avoided_styles: "[]".to_string(),
            created_at: now,
            updated_at: now,
        };
        db.insert_business(&business).await.unwrap();

        let ledger = Arc::new(QuotaLedger::new(db.clone(), QuotaConfig::default()));
        let sourcing = ImageSourcingStrategy::new(
            stock.map(|provider| StockImageSelector::new(Arc::new(provider), 3)),
            Some(Arc::new(generator)),
            Arc::new(MockImageFetcher::new()),
            PostProcessingChain::new(None, Arc::new(MockCompositor::new()), None),
            ledger.clone(),
            ZeroStockFallbackConfig::default(),
            5,
            10,
        );
        let service = GenerationService::new(
            db.clone(),
            ledger,
            Arc::new(text),
            Arc::new(sourcing),
            None,
        );

        Harness {
            service,
            db,
            business_id: business.id,
            _temp_dir: temp_dir,
        }
    }

    fn patio_request(business_id: &str) -> GenerationRequest {
        GenerationRequest {
            kind: Some(ContentKind::BusinessUpdate),
            business_id: business_id.to_string(),
            topic: "new patio opens".to_string(),
            include_image: true,
            image_source: ImageSourceKind::Stock,
            page: Some(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn business_update_returns_text_and_stock_options() {
        let h = harness(
            PlanTier::Free,
            text_ok(),
            Some(stock_returning(3)),
            MockImageGenerator::new(),
        )
        .await;

        let response = h
            .service
            .generate(ACCOUNT, patio_request(&h.business_id))
            .await
            .unwrap();

        assert!(response.text.is_some());
        assert!(response.image.is_none());
        let options = response.stock_options.expect("stock options");
        assert!((1..=5).contains(&options.len()));
        assert_eq!(response.usage_remaining.content, Some(5));
        assert!(response.draft_id.is_none());
        assert!(response.errors.is_empty());
    }

    #[tokio::test]
    async fn saving_a_draft_spends_one_content_slot() {
        let h = harness(
            PlanTier::Free,
            text_ok(),
            Some(stock_returning(3)),
            MockImageGenerator::new(),
        )
        .await;

        let mut request = patio_request(&h.business_id);
        request.save_as_draft = true;
        let response = h.service.generate(ACCOUNT, request).await.unwrap();

        assert_eq!(response.usage_remaining.content, Some(4));
        let draft_id = response.draft_id.expect("draft id");
        let draft = h.db.get_draft(ACCOUNT, &draft_id).await.unwrap().unwrap();
        assert_eq!(draft.text_id, response.text_id);
        assert!(draft.image_id.is_none());
    }

    #[tokio::test]
    async fn quota_exhaustion_refuses_without_provider_calls() {
        let mut text = MockTextGenerator::new();
        text.expect_generate()
            .times(5)
            .returning(|_| Ok(TextOutput::Plain("copy".to_string())));
        let h = harness(PlanTier::Free, text, None, MockImageGenerator::new()).await;

        for _ in 0..5 {
            let mut request = patio_request(&h.business_id);
            request.include_image = false;
            request.save_as_draft = true;
            h.service.generate(ACCOUNT, request).await.unwrap();
        }

        let mut request = patio_request(&h.business_id);
        request.save_as_draft = true;
        let result = h.service.generate(ACCOUNT, request).await;
        assert!(matches!(result, Err(AppError::QuotaExceeded(QuotaKind::Content))));
    }

    #[tokio::test]
    async fn text_failure_persists_nothing_and_releases_the_slot() {
        let mut text = MockTextGenerator::new();
        text.expect_generate()
            .returning(|_| Err(ProviderError::Timeout("text", std::time::Duration::from_secs(60))));
        let h = harness(PlanTier::Free, text, None, MockImageGenerator::new()).await;

        let mut request = patio_request(&h.business_id);
        request.save_as_draft = true;
        let result = h.service.generate(ACCOUNT, request).await;

        assert!(matches!(result, Err(AppError::TextGeneration(_))));
        let usage = h.service.ledger().snapshot(ACCOUNT).await.unwrap();
        assert_eq!(usage.counters.content_count, 0);
    }

    #[tokio::test]
    async fn zero_stock_produces_a_persisted_ai_image() {
        let h = harness(PlanTier::Free, text_ok(), Some(stock_returning(0)), generator_ok()).await;

        let response = h
            .service
            .generate(ACCOUNT, patio_request(&h.business_id))
            .await
            .unwrap();

        let image = response.image.expect("fallback image");
        assert_eq!(image.ai_trigger, Some(AiTrigger::ZeroStockFallback));
        assert!(image.url.starts_with("data:image/png;base64,"));
        assert!(response.stock_options.is_none());
        assert_eq!(response.usage_remaining.image, Some(2));

        let record = h.db.get_generated_image(&image.id).await.unwrap().unwrap();
        assert_eq!(record.provenance, "ai");
        assert_eq!(record.ai_trigger.as_deref(), Some("zero_stock_fallback"));
    }

    #[tokio::test]
    async fn ai_failure_is_soft() {
        let mut generator = MockImageGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Err(ProviderError::decode("ai_image", "content policy")));
        let h = harness(PlanTier::Free, text_ok(), Some(stock_returning(0)), generator).await;

        let response = h
            .service
            .generate(ACCOUNT, patio_request(&h.business_id))
            .await
            .unwrap();

        assert!(response.text.is_some());
        assert!(response.image.is_none());
        assert!(response.stock_options.is_none());
        assert!(response.errors.iter().any(|e| e.stage == Stage::AiGeneration));
        assert_eq!(response.usage_remaining.image, Some(3));
    }

    #[tokio::test]
    async fn review_replies_never_carry_images() {
        let mut stock = MockStockPhotoProvider::new();
        stock.expect_search().never();
        let h = harness(PlanTier::Free, text_ok(), Some(stock), MockImageGenerator::new()).await;

        let mut request = patio_request(&h.business_id);
        request.kind = Some(ContentKind::ReviewReply);
        let response = h.service.generate(ACCOUNT, request).await.unwrap();

        assert!(response.image.is_none());
        assert!(response.stock_options.is_none());
    }

    #[tokio::test]
    async fn image_only_ai_regenerate_is_refused_when_images_are_exhausted() {
        let mut generator = MockImageGenerator::new();
        generator.expect_generate().never();
        let h = harness(PlanTier::Free, MockTextGenerator::new(), None, generator).await;
        let period = crate::service::current_period();
        for _ in 0..3 {
            h.db
                .try_increment_usage(ACCOUNT, &period, crate::data::UsageCounter::Image, Some(3))
                .await
                .unwrap();
        }

        let mut request = patio_request(&h.business_id);
        request.regenerate_mode = RegenerateMode::ImageOnly;
        request.image_source = ImageSourceKind::Ai;
        let result = h.service.generate(ACCOUNT, request).await;

        assert!(matches!(result, Err(AppError::QuotaExceeded(QuotaKind::Image))));
    }

    #[tokio::test]
    async fn image_only_regenerate_ignores_content_quota() {
        let mut text = MockTextGenerator::new();
        text.expect_generate().never();
        let h = harness(
            PlanTier::Free,
            text,
            Some(stock_returning(3)),
            MockImageGenerator::new(),
        )
        .await;
        let period = crate::service::current_period();
        for _ in 0..5 {
            h.db
                .try_increment_usage(ACCOUNT, &period, crate::data::UsageCounter::Content, Some(5))
                .await
                .unwrap();
        }

        let mut request = patio_request(&h.business_id);
        request.regenerate_mode = RegenerateMode::ImageOnly;
        request.save_as_draft = true;
        let response = h.service.generate(ACCOUNT, request).await.unwrap();

        assert!(response.text.is_none());
        assert!(response.stock_options.is_some());
        assert!(response.draft_id.is_none());
        assert_eq!(response.usage_remaining.content, Some(0));
        let usage = h.service.ledger().snapshot(ACCOUNT).await.unwrap();
        assert_eq!(usage.counters.content_count, 5);
    }

    #[tokio::test]
    async fn validation_errors_come_before_any_work() {
        let h = harness(
            PlanTier::Free,
            MockTextGenerator::new(),
            None,
            MockImageGenerator::new(),
        )
        .await;

        let mut missing_kind = patio_request(&h.business_id);
        missing_kind.kind = None;
        assert!(matches!(
            h.service.generate(ACCOUNT, missing_kind).await,
            Err(AppError::Validation(_))
        ));

        let mut bad_color = patio_request(&h.business_id);
        bad_color.branding.primary_color = Some("teal".to_string());
        assert!(matches!(
            h.service.generate(ACCOUNT, bad_color).await,
            Err(AppError::Validation(_))
        ));

        assert!(matches!(
            h.service.generate(ACCOUNT, patio_request("missing")).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn stock_selection_is_recorded_and_linked_to_the_draft() {
        let mut stock = MockStockPhotoProvider::new();
        stock
            .expect_track_download()
            .times(1)
            .returning(|_| Err(ProviderError::decode("stock", "rate limited")));
        let h = harness(PlanTier::Free, text_ok(), Some(stock), MockImageGenerator::new()).await;

        let mut request = patio_request(&h.business_id);
        request.include_image = false;
        request.save_as_draft = true;
        let draft_id = h.service.generate(ACCOUNT, request).await.unwrap().draft_id.unwrap();

        let (record, errors) = h
            .service
            .record_stock_selection(
                ACCOUNT,
                StockSelection {
                    business_id: h.business_id.clone(),
                    kind: ContentKind::BusinessUpdate,
                    topic: "new patio opens".to_string(),
                    candidate: CandidateImage {
                        url: "https://img.test/patio.jpg".to_string(),
                        thumbnail_url: None,
                        description: Some("patio".to_string()),
                        provenance: ImageProvenance::Stock,
                        attribution: StockAttribution {
                            photographer_name: "Ana".to_string(),
                            photographer_url: Some("https://unsplash.com/@ana".to_string()),
                            download_location: Some("https://api.test/dl/1".to_string()),
                        },
                    },
                    draft_id: Some(draft_id.clone()),
                },
            )
            .await
            .unwrap();

        assert_eq!(record.provenance, "stock");
        assert_eq!(record.draft_id.as_deref(), Some(draft_id.as_str()));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, Stage::DownloadTracking);

        let draft = h.db.get_draft(ACCOUNT, &draft_id).await.unwrap().unwrap();
        assert_eq!(draft.image_id, Some(record.id));
        let usage = h.service.ledger().snapshot(ACCOUNT).await.unwrap();
        assert_eq!(usage.counters.image_count, 0);
    }
}
