//! Image Sourcing Strategy
//!
//! Decides per request between free stock options and the paid AI
//! generator. AI only runs on explicit intent (`source = ai`, opt-in flag)
//! or as a last resort when stock came back empty, and only after an image
//! quota slot has been claimed. Nothing in here fails the request: every
//! error becomes "no AI image" plus a soft failure.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::postprocess::{PostProcessOptions, PostProcessingChain};
use super::quota::{AccountUsage, QuotaLedger, QuotaReservation};
use super::stock::StockImageSelector;
use super::style::{StylePreferences, resolve_style};
use super::{SoftFailure, Stage};
use crate::config::ZeroStockFallbackConfig;
use crate::data::{ContentKind, ImageStyle};
use crate::error::QuotaKind;
use crate::metrics::{AI_IMAGES_TOTAL, QUOTA_REJECTIONS_TOTAL};
use crate::providers::{
    AiImageRequest, BrandFields, CandidateImage, ImageFetcher, ImageGenerator, ImageSource,
};

/// Where the caller wants the image to come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSourceKind {
    #[default]
    Stock,
    Ai,
}

/// Why the AI path ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AiTrigger {
    /// `source = ai`
    Explicit,
    /// `include_ai_image = true`
    OptIn,
    /// Stock returned zero candidates
    ZeroStockFallback,
}

impl AiTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::OptIn => "opt_in",
            Self::ZeroStockFallback => "zero_stock_fallback",
        }
    }
}

/// Everything the strategy needs for one request
#[derive(Debug, Clone)]
pub struct SourcingRequest {
    pub kind: ContentKind,
    pub topic: String,
    pub business_name: String,
    pub industry: String,
    pub source: ImageSourceKind,
    pub include_ai_image: bool,
    pub style: Option<String>,
    pub product_photo: Option<Vec<u8>>,
    pub brand: BrandFields,
    pub style_preferences: StylePreferences,
    /// Explicit stock page; ignored when `randomize_stock` is set
    pub page: Option<u32>,
    pub randomize_stock: bool,
    /// URLs the client has already shown in this session
    pub seen_stock_urls: HashSet<String>,
}

/// An AI image after post-processing, holding its quota claims
#[derive(Debug)]
pub struct ProducedImage {
    /// Final bytes, or the provider URL when the bytes could not be fetched
    pub source: ImageSource,
    pub style: ImageStyle,
    pub size: String,
    pub prompt: String,
    pub revised_prompt: Option<String>,
    pub trigger: AiTrigger,
    pub stages_applied: Vec<Stage>,
    pub product_composited: bool,
    pub background_removal_method: Option<String>,
    /// Image quota slot; commit once persisted
    pub reservation: QuotaReservation,
    /// Zero-stock fallback slot, when that was the trigger
    pub fallback_reservation: Option<QuotaReservation>,
}

/// Strategy result. The orchestrator folds this into the envelope.
#[derive(Debug, Default)]
pub struct SourcingOutcome {
    pub stock_options: Vec<CandidateImage>,
    pub ai_image: Option<ProducedImage>,
    pub failures: Vec<SoftFailure>,
}

/// Image sourcing strategy service
pub struct ImageSourcingStrategy {
    selector: Option<StockImageSelector>,
    generator: Option<Arc<dyn ImageGenerator>>,
    fetcher: Arc<dyn ImageFetcher>,
    chain: PostProcessingChain,
    ledger: Arc<QuotaLedger>,
    fallback: ZeroStockFallbackConfig,
    stock_candidates: usize,
    random_page_max: u32,
}

impl ImageSourcingStrategy {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        selector: Option<StockImageSelector>,
        generator: Option<Arc<dyn ImageGenerator>>,
        fetcher: Arc<dyn ImageFetcher>,
        chain: PostProcessingChain,
        ledger: Arc<QuotaLedger>,
        fallback: ZeroStockFallbackConfig,
        stock_candidates: usize,
        random_page_max: u32,
    ) -> Self {
        Self {
            selector,
            generator,
            fetcher,
            chain,
            ledger,
            fallback,
            stock_candidates,
            random_page_max: random_page_max.max(1),
        }
    }

    pub fn stock_selector(&self) -> Option<&StockImageSelector> {
        self.selector.as_ref()
    }

    fn stock_page(&self, request: &SourcingRequest) -> u32 {
        if request.randomize_stock {
            use rand::Rng;
            rand::thread_rng().gen_range(1..=self.random_page_max)
        } else {
            request.page.unwrap_or(1).max(1)
        }
    }

    /// Apply the decision rule once for this request
    pub async fn source(&self, request: &SourcingRequest, usage: &AccountUsage) -> SourcingOutcome {
        let mut outcome = SourcingOutcome::default();

        if request.source == ImageSourceKind::Stock {
            match &self.selector {
                Some(selector) => {
                    let page = self.stock_page(request);
                    outcome.stock_options = selector
                        .select(
                            &request.topic,
                            &request.industry,
                            request.kind,
                            page,
                            &request.seen_stock_urls,
                            self.stock_candidates,
                        )
                        .await;
                }
                None => outcome.failures.push(SoftFailure::record(
                    Stage::StockLookup,
                    "stock provider is not configured",
                    "treating as zero stock candidates",
                )),
            }
        }

        let trigger = if request.source == ImageSourceKind::Ai {
            Some(AiTrigger::Explicit)
        } else if request.include_ai_image {
            Some(AiTrigger::OptIn)
        } else if outcome.stock_options.is_empty() {
            Some(AiTrigger::ZeroStockFallback)
        } else {
            None
        };

        if let Some(trigger) = trigger {
            if usage.has_remaining(QuotaKind::Image) {
                outcome.ai_image = self
                    .generate_ai(request, usage, trigger, &mut outcome.failures)
                    .await;
            } else {
                QUOTA_REJECTIONS_TOTAL
                    .with_label_values(&[QuotaKind::Image.as_str()])
                    .inc();
                tracing::info!(
                    trigger = trigger.as_str(),
                    "Image quota exhausted; AI image skipped"
                );
                outcome.failures.push(SoftFailure::record(
                    Stage::ImageQuota,
                    "monthly image quota exceeded",
                    "no AI image",
                ));
            }
        }

        outcome
    }

    async fn generate_ai(
        &self,
        request: &SourcingRequest,
        usage: &AccountUsage,
        trigger: AiTrigger,
        failures: &mut Vec<SoftFailure>,
    ) -> Option<ProducedImage> {
        let Some(generator) = &self.generator else {
            failures.push(SoftFailure::record(
                Stage::AiGeneration,
                "AI image provider is not configured",
                "no AI image",
            ));
            return None;
        };

        let fallback_reservation = if trigger == AiTrigger::ZeroStockFallback {
            if !self.fallback.enabled {
                failures.push(SoftFailure::record(
                    Stage::StockLookup,
                    "no stock photos matched and the zero-stock AI fallback is disabled",
                    "no image",
                ));
                return None;
            }
            match self.ledger.claim_fallback(usage, self.fallback.monthly_cap).await {
                Ok(Some(reservation)) => Some(reservation),
                Ok(None) => {
                    failures.push(SoftFailure::record(
                        Stage::ImageQuota,
                        "monthly zero-stock fallback cap reached",
                        "no AI image",
                    ));
                    return None;
                }
                Err(error) => {
                    failures.push(SoftFailure::record(Stage::ImageQuota, error, "no AI image"));
                    return None;
                }
            }
        } else {
            None
        };

        // Claim the paid slot before spending anything
        let reservation = match self.ledger.claim(usage, QuotaKind::Image).await {
            Ok(Some(reservation)) => reservation,
            Ok(None) => {
                QUOTA_REJECTIONS_TOTAL.with_label_values(&[QuotaKind::Image.as_str()]).inc();
                failures.push(SoftFailure::record(
                    Stage::ImageQuota,
                    "monthly image quota exceeded",
                    "no AI image",
                ));
                self.release_all(None, fallback_reservation).await;
                return None;
            }
            Err(error) => {
                failures.push(SoftFailure::record(Stage::ImageQuota, error, "no AI image"));
                self.release_all(None, fallback_reservation).await;
                return None;
            }
        };

        let style = {
            let mut rng = rand::thread_rng();
            resolve_style(
                request.style.as_deref(),
                &request.topic,
                &request.industry,
                request.kind,
                &request.style_preferences,
                &mut rng,
            )
        };
        let ai_request = AiImageRequest {
            kind: request.kind,
            topic: request.topic.clone(),
            business_name: request.business_name.clone(),
            industry: request.industry.clone(),
            style,
            brand: request.brand.clone(),
        };

        let generated = match generator.generate(&ai_request).await {
            Ok(generated) => generated,
            Err(error) => {
                failures.push(SoftFailure::record(Stage::AiGeneration, error, "no AI image"));
                self.release_all(Some(reservation), fallback_reservation).await;
                return None;
            }
        };
        AI_IMAGES_TOTAL.with_label_values(&[trigger.as_str()]).inc();

        let options = PostProcessOptions {
            product_photo: request.product_photo.clone(),
            brand_color: request.brand.primary_color,
            topic: request.topic.clone(),
        };

        let needs_processing = options.product_photo.is_some() || options.brand_color.is_some();
        let processed = match generated.source {
            ImageSource::Bytes(bytes) => Ok(self.chain.process(bytes, &options).await),
            ImageSource::Url(url) if needs_processing => match self.fetcher.fetch(&url).await {
                Ok(bytes) => Ok(self.chain.process(bytes, &options).await),
                Err(error) => {
                    failures.push(SoftFailure::record(
                        Stage::ImageFetch,
                        error,
                        "using provider URL without post-processing",
                    ));
                    Err(url)
                }
            },
            // Nothing to post-process; the caller persists the URL
            ImageSource::Url(url) => Err(url),
        };

        let (source, stages_applied, product_composited, background_removal_method) =
            match processed {
                Ok(processed) => {
                    failures.extend(processed.failures);
                    (
                        ImageSource::Bytes(processed.bytes),
                        processed.stages_applied,
                        processed.product_composited,
                        processed.background_removal_method,
                    )
                }
                Err(url) => (ImageSource::Url(url), Vec::new(), false, None),
            };

        Some(ProducedImage {
            source,
            style: generated.style,
            size: generated.size,
            prompt: generated.prompt,
            revised_prompt: generated.revised_prompt,
            trigger,
            stages_applied,
            product_composited,
            background_removal_method,
            reservation,
            fallback_reservation,
        })
    }

    async fn release_all(
        &self,
        reservation: Option<QuotaReservation>,
        fallback_reservation: Option<QuotaReservation>,
    ) {
        for reservation in [reservation, fallback_reservation].into_iter().flatten() {
            self.ledger.release_quietly(reservation).await;
        }
    }

    /// Give back the claims of an image that ended up not being persisted
    pub async fn discard(&self, image: ProducedImage) {
        self.release_all(Some(image.reservation), image.fallback_reservation)
            .await;
    }

    /// Keep the claims of a persisted image
    pub fn keep(&self, image: ProducedImage) {
        self.ledger.commit(image.reservation);
        if let Some(fallback) = image.fallback_reservation {
            self.ledger.commit(fallback);
        }
    }
}
