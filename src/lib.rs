//! Copysmith - marketing copy and image generation service
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - /api/v1 generation, usage, businesses, drafts            │
//! │  - Metrics                                                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Generation orchestrator                                  │
//! │  - Quota ledger, image sourcing, post-processing            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Data / Storage / Providers                     │
//! │  - SQLite (sqlx)                                            │
//! │  - R2 storage for final images                              │
//! │  - Text, stock, AI image and image-tool clients             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Business logic layer
//! - `providers`: External collaborators
//! - `data`: Database layer
//! - `storage`: Cloudflare R2 image storage
//! - `auth`: Bearer session authentication
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod providers;
pub mod service;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use providers::{
    BackgroundRemover, Compositor, ImageFetcher, ImageGenerator, StockPhotoProvider,
    TextGenerator, TextOverlay,
};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Monthly usage counters
    pub ledger: Arc<service::QuotaLedger>,

    /// Generation orchestrator
    pub generation: Arc<service::GenerationService>,
}

/// External collaborators the pipeline talks to
///
/// `None` means the collaborator is not configured and the matching
/// stage is skipped.
#[derive(Clone)]
pub struct Providers {
    pub text: Arc<dyn TextGenerator>,
    pub stock: Option<Arc<dyn StockPhotoProvider>>,
    pub ai_image: Option<Arc<dyn ImageGenerator>>,
    pub background_remover: Option<Arc<dyn BackgroundRemover>>,
    pub text_overlay: Option<Arc<dyn TextOverlay>>,
    pub compositor: Arc<dyn Compositor>,
    pub fetcher: Arc<dyn ImageFetcher>,
}

impl Providers {
    /// Build the HTTP clients named in `providers.*`
    pub fn from_config(config: &config::AppConfig) -> Result<Self, error::AppError> {
        let provider_error = |e: providers::ProviderError| error::AppError::Config(e.to_string());

        let text = providers::OpenAiTextGenerator::new(&config.providers.text)
            .map_err(provider_error)?;

        let stock = match &config.providers.stock {
            Some(stock) => Some(Arc::new(
                providers::UnsplashClient::new(stock).map_err(provider_error)?,
            ) as Arc<dyn StockPhotoProvider>),
            None => None,
        };

        let ai_image = match &config.providers.ai_image {
            Some(ai_image) => Some(Arc::new(
                providers::OpenAiImageGenerator::new(ai_image).map_err(provider_error)?,
            ) as Arc<dyn ImageGenerator>),
            None => None,
        };

        let tools = match &config.providers.image_tools {
            Some(tools) => Some(Arc::new(
                providers::ImageToolsClient::new(tools).map_err(provider_error)?,
            )),
            None => None,
        };

        let fetcher = providers::HttpImageFetcher::new(
            Duration::from_secs(config.generation.fetch_timeout_seconds),
            // AI renders are larger than product photos; allow headroom
            config.generation.max_product_photo_bytes.saturating_mul(4),
        )
        .map_err(provider_error)?;

        Ok(Self {
            text: Arc::new(text),
            stock,
            ai_image,
            background_remover: tools
                .clone()
                .map(|tools| tools as Arc<dyn BackgroundRemover>),
            text_overlay: tools.map(|tools| tools as Arc<dyn TextOverlay>),
            compositor: Arc::new(providers::LocalCompositor::new()),
            fetcher: Arc::new(fetcher),
        })
    }
}

impl AppState {
    /// Initialize application state with the configured providers
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let providers = Providers::from_config(&config)?;
        Self::with_providers(config, providers).await
    }

    /// Initialize application state around the given providers
    ///
    /// # Steps
    /// 1. Connect to SQLite database (runs migrations)
    /// 2. Connect to R2 storage, when configured
    /// 3. Wire the quota ledger and the generation pipeline
    pub async fn with_providers(
        config: config::AppConfig,
        providers: Providers,
    ) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        // 2. Connect to R2 storage
        let storage = match &config.storage {
            Some(storage) => {
                let storage = storage::ImageStorage::new(storage)?;
                tracing::info!("Image storage initialized");
                Some(Arc::new(storage))
            }
            None => {
                tracing::warn!("No image storage configured; final images are kept as data URLs");
                None
            }
        };

        // 3. Pipeline
        let ledger = Arc::new(service::QuotaLedger::new(db.clone(), config.quota.clone()));
        let selector = providers.stock.map(|stock| {
            service::StockImageSelector::new(stock, config.generation.stock_batch_size)
        });
        let chain = service::PostProcessingChain::new(
            providers.background_remover,
            providers.compositor,
            providers.text_overlay,
        );
        let sourcing = service::ImageSourcingStrategy::new(
            selector,
            providers.ai_image,
            providers.fetcher,
            chain,
            ledger.clone(),
            config.generation.zero_stock_fallback.clone(),
            config.generation.stock_candidates,
            config.generation.random_page_max,
        );
        let generation = service::GenerationService::new(
            db.clone(),
            ledger.clone(),
            providers.text,
            Arc::new(sourcing),
            storage,
        );

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            ledger,
            generation: Arc::new(generation),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::{compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);
    // base64 inflates the product photo by a third; leave room for the rest of the body
    let body_limit = state.config.generation.max_product_photo_bytes / 3 * 4 + 64 * 1024;

    let protected = Router::new()
        .nest("/api/v1", api::api_router())
        .merge(api::metrics_router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
