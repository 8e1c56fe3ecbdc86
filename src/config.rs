//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

use crate::data::PlanTier;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub providers: ProvidersConfig,
    /// Image storage (R2 / S3 compatible). Absent means images are kept as data URLs.
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "copy.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://copy.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Session token configuration
///
/// Tokens are minted by the account service and only verified here.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HMAC secret (32+ bytes)
    pub session_secret: String,
    /// Upper bound on token age in seconds, whatever the token's own expiry says
    #[serde(default = "default_session_max_age")]
    pub session_max_age: i64,
}

fn default_session_max_age() -> i64 {
    60 * 60 * 24 * 7
}

/// External collaborators
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub text: TextProviderConfig,
    #[serde(default)]
    pub stock: Option<StockProviderConfig>,
    #[serde(default)]
    pub ai_image: Option<AiImageProviderConfig>,
    #[serde(default)]
    pub image_tools: Option<ImageToolsConfig>,
}

/// OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TextProviderConfig {
    #[serde(default = "default_openai_api_base")]
    pub api_base: String,
    pub api_key: String,
    #[serde(default = "default_text_model")]
    pub model: String,
    #[serde(default = "default_text_timeout")]
    pub timeout_seconds: u64,
}

/// Unsplash-compatible stock photo search
#[derive(Debug, Clone, Deserialize)]
pub struct StockProviderConfig {
    #[serde(default = "default_unsplash_api_base")]
    pub api_base: String,
    pub access_key: String,
    #[serde(default = "default_stock_timeout")]
    pub timeout_seconds: u64,
}

/// OpenAI-compatible image generation endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct AiImageProviderConfig {
    #[serde(default = "default_openai_api_base")]
    pub api_base: String,
    pub api_key: String,
    #[serde(default = "default_image_model")]
    pub model: String,
    /// Landscape size; square kinds always use 1024x1024
    #[serde(default = "default_image_size")]
    pub size: String,
    #[serde(default = "default_ai_image_timeout")]
    pub timeout_seconds: u64,
}

/// Background removal and text overlay service
#[derive(Debug, Clone, Deserialize)]
pub struct ImageToolsConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    #[serde(default = "default_image_tools_timeout")]
    pub timeout_seconds: u64,
}

fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_unsplash_api_base() -> String {
    "https://api.unsplash.com".to_string()
}

fn default_text_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_size() -> String {
    "1792x1024".to_string()
}

fn default_text_timeout() -> u64 {
    60
}

fn default_stock_timeout() -> u64 {
    10
}

fn default_ai_image_timeout() -> u64 {
    90
}

fn default_image_tools_timeout() -> u64 {
    30
}

/// Image storage configuration (Cloudflare R2 or any S3 endpoint)
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket for generated images
    pub bucket: String,
    /// Public URL for the bucket (Custom Domain)
    /// e.g., "https://images.example.com"
    pub public_url: String,
    /// Cloudflare account ID, used to derive the R2 endpoint
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Monthly limits for one plan
///
/// `-1` means unlimited.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct PlanLimits {
    pub content_limit: i64,
    pub image_limit: i64,
}

impl PlanLimits {
    pub const UNLIMITED: i64 = -1;

    pub const fn new(content_limit: i64, image_limit: i64) -> Self {
        Self {
            content_limit,
            image_limit,
        }
    }
}

/// Plan tier to limit mapping
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_free_limits")]
    pub free: PlanLimits,
    #[serde(default = "default_starter_limits")]
    pub starter: PlanLimits,
    #[serde(default = "default_pro_limits")]
    pub pro: PlanLimits,
    #[serde(default = "default_agency_limits")]
    pub agency: PlanLimits,
}

impl QuotaConfig {
    pub fn limits_for(&self, plan: PlanTier) -> PlanLimits {
        match plan {
            PlanTier::Free => self.free,
            PlanTier::Starter => self.starter,
            PlanTier::Pro => self.pro,
            PlanTier::Agency => self.agency,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free: default_free_limits(),
            starter: default_starter_limits(),
            pro: default_pro_limits(),
            agency: default_agency_limits(),
        }
    }
}

fn default_free_limits() -> PlanLimits {
    PlanLimits::new(5, 3)
}

fn default_starter_limits() -> PlanLimits {
    PlanLimits::new(50, 25)
}

fn default_pro_limits() -> PlanLimits {
    PlanLimits::new(200, 100)
}

fn default_agency_limits() -> PlanLimits {
    PlanLimits::new(PlanLimits::UNLIMITED, PlanLimits::UNLIMITED)
}

/// Generation pipeline tuning
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// Stock candidates returned per request
    #[serde(default = "default_stock_candidates")]
    pub stock_candidates: usize,
    /// Images requested from the stock provider per query term
    #[serde(default = "default_stock_batch_size")]
    pub stock_batch_size: u32,
    /// Upper bound for the randomized stock page
    #[serde(default = "default_random_page_max")]
    pub random_page_max: u32,
    /// Timeout for downloading image bytes by URL
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
    /// Maximum decoded size of an uploaded product photo
    #[serde(default = "default_max_product_photo_bytes")]
    pub max_product_photo_bytes: usize,
    #[serde(default)]
    pub zero_stock_fallback: ZeroStockFallbackConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            stock_candidates: default_stock_candidates(),
            stock_batch_size: default_stock_batch_size(),
            random_page_max: default_random_page_max(),
            fetch_timeout_seconds: default_fetch_timeout(),
            max_product_photo_bytes: default_max_product_photo_bytes(),
            zero_stock_fallback: ZeroStockFallbackConfig::default(),
        }
    }
}

/// AI generation triggered only because stock returned nothing
#[derive(Debug, Clone, Deserialize)]
pub struct ZeroStockFallbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fallback generations allowed per account per month (None = only the image quota applies)
    #[serde(default = "default_fallback_monthly_cap")]
    pub monthly_cap: Option<i64>,
}

impl Default for ZeroStockFallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            monthly_cap: default_fallback_monthly_cap(),
        }
    }
}

fn default_stock_candidates() -> usize {
    5
}

fn default_stock_batch_size() -> u32 {
    3
}

fn default_random_page_max() -> u32 {
    10
}

fn default_fetch_timeout() -> u64 {
    20
}

fn default_max_product_photo_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_fallback_monthly_cap() -> Option<i64> {
    Some(10)
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (COPYSMITH__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/copysmith.db")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (COPYSMITH__*)
            .add_source(
                Environment::with_prefix("COPYSMITH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if !(1..=10).contains(&self.generation.stock_candidates) {
            return Err(crate::error::AppError::Config(
                "generation.stock_candidates must be between 1 and 10".to_string(),
            ));
        }

        let mut timeouts = vec![
            ("providers.text.timeout_seconds", self.providers.text.timeout_seconds),
            (
                "generation.fetch_timeout_seconds",
                self.generation.fetch_timeout_seconds,
            ),
        ];
        if let Some(stock) = &self.providers.stock {
            timeouts.push(("providers.stock.timeout_seconds", stock.timeout_seconds));
        }
        if let Some(ai_image) = &self.providers.ai_image {
            timeouts.push(("providers.ai_image.timeout_seconds", ai_image.timeout_seconds));
        }
        if let Some(tools) = &self.providers.image_tools {
            timeouts.push(("providers.image_tools.timeout_seconds", tools.timeout_seconds));
        }
        if let Some((key, _)) = timeouts.into_iter().find(|(_, seconds)| *seconds == 0) {
            return Err(crate::error::AppError::Config(format!(
                "{key} must be greater than 0"
            )));
        }

        let mut endpoints = vec![("providers.text.api_base", &self.providers.text.api_base)];
        if let Some(stock) = &self.providers.stock {
            endpoints.push(("providers.stock.api_base", &stock.api_base));
        }
        if let Some(ai_image) = &self.providers.ai_image {
            endpoints.push(("providers.ai_image.api_base", &ai_image.api_base));
        }
        if let Some(tools) = &self.providers.image_tools {
            endpoints.push(("providers.image_tools.api_base", &tools.api_base));
        }
        if let Some(storage) = &self.storage {
            endpoints.push(("storage.public_url", &storage.public_url));
        }
        for (key, value) in endpoints {
            let parsed = url::Url::parse(value).map_err(|e| {
                crate::error::AppError::Config(format!("{key} is not a valid URL: {e}"))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(crate::error::AppError::Config(format!(
                    "{key} must use http or https"
                )));
            }
        }

        if self.providers.stock.is_none() {
            tracing::warn!(
                "No stock provider configured; every image request will need the AI path"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/copysmith-test.db"),
            },
            auth: AuthConfig {
                session_secret: "x".repeat(32),
                session_max_age: default_session_max_age(),
            },
            providers: ProvidersConfig {
                text: TextProviderConfig {
                    api_base: default_openai_api_base(),
                    api_key: "sk-test".to_string(),
                    model: default_text_model(),
                    timeout_seconds: 60,
                },
                stock: Some(StockProviderConfig {
                    api_base: default_unsplash_api_base(),
                    access_key: "unsplash".to_string(),
                    timeout_seconds: 10,
                }),
                ai_image: None,
                image_tools: None,
            },
            storage: None,
            quota: QuotaConfig::default(),
            generation: GenerationConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_http_endpoints() {
        let mut config = valid_config();
        config.providers.text.api_base = "ftp://models.internal".to_string();
        assert!(config.validate().is_err());

        config.providers.text.api_base = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_short_session_secret() {
        let mut config = valid_config();
        config.auth.session_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("auth.session_secret")
        ));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = valid_config();
        if let Some(stock) = config.providers.stock.as_mut() {
            stock.timeout_seconds = 0;
        }

        let error = config.validate().expect_err("zero timeout must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("providers.stock.timeout_seconds")
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_stock_candidates() {
        let mut config = valid_config();
        config.generation.stock_candidates = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn plan_limits_follow_tier() {
        let quota = QuotaConfig::default();
        assert_eq!(quota.limits_for(PlanTier::Free), PlanLimits::new(5, 3));
        assert_eq!(
            quota.limits_for(PlanTier::Agency).content_limit,
            PlanLimits::UNLIMITED
        );
    }
}
