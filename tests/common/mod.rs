//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use copysmith::data::{ImageProvenance, PlanTier};
use copysmith::providers::{
    AiImage, AiImageRequest, CandidateImage, ImageFetcher, ImageGenerator, ImageSource,
    LocalCompositor, Orientation, ProviderError, StockAttribution, StockPhotoProvider,
    TextGenerator, TextOutput, TextRequest,
};
use copysmith::{AppState, Providers, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const TEST_SECRET: &str = "test-secret-key-32-bytes-long!!!";

/// Text provider that echoes the topic, or fails for topics containing "fail"
pub struct FakeText;

#[async_trait]
impl TextGenerator for FakeText {
    async fn generate(&self, request: &TextRequest) -> Result<TextOutput, ProviderError> {
        if request.topic.contains("fail") {
            return Err(ProviderError::decode("text", "model overloaded"));
        }
        Ok(TextOutput::Plain(format!(
            "{} for {}: {}",
            request.kind.as_str(),
            request.business.name,
            request.topic
        )))
    }
}

/// Stock provider returning `per_query` distinct photos for each search
pub struct FakeStock {
    pub per_query: usize,
    pub searches: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl FakeStock {
    pub fn new(per_query: usize) -> Self {
        Self {
            per_query,
            searches: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StockPhotoProvider for FakeStock {
    async fn search(
        &self,
        query: &str,
        _orientation: Orientation,
        page: u32,
        _per_page: u32,
    ) -> Result<Vec<CandidateImage>, ProviderError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok((0..self.per_query)
            .map(|i| CandidateImage {
                url: format!(
                    "https://images.test/{}/{page}/{i}.jpg",
                    query.replace(' ', "-")
                ),
                thumbnail_url: None,
                description: Some(query.to_string()),
                provenance: ImageProvenance::Stock,
                attribution: StockAttribution {
                    photographer_name: "Test Photographer".to_string(),
                    photographer_url: Some("https://images.test/@tester".to_string()),
                    download_location: Some(format!("https://images.test/download/{i}")),
                },
            })
            .collect())
    }

    async fn track_download(&self, _download_location: &str) -> Result<(), ProviderError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// AI image provider returning a small real PNG
pub struct FakeImageGenerator {
    pub calls: AtomicUsize,
}

impl FakeImageGenerator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ImageGenerator for FakeImageGenerator {
    async fn generate(&self, request: &AiImageRequest) -> Result<AiImage, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AiImage {
            source: ImageSource::Bytes(tiny_png()),
            style: request.style,
            size: "1024x1024".to_string(),
            prompt: format!("{} photo", request.topic),
            revised_prompt: Some(format!("A {} photo", request.style.as_str())),
        })
    }
}

/// Fetcher that never succeeds; fake generators return bytes
pub struct NoFetch;

#[async_trait]
impl ImageFetcher for NoFetch {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, ProviderError> {
        Err(ProviderError::decode("fetch", "network disabled in tests"))
    }
}

pub fn tiny_png() -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(8, 8, image::Rgba([200, 120, 40, 255]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}

/// Fakes for every collaborator, exposed so tests can inspect call counts
pub struct Fakes {
    pub stock: Arc<FakeStock>,
    pub ai_image: Arc<FakeImageGenerator>,
}

impl Fakes {
    pub fn new(stock_per_query: usize) -> Self {
        Self {
            stock: Arc::new(FakeStock::new(stock_per_query)),
            ai_image: Arc::new(FakeImageGenerator::new()),
        }
    }

    fn providers(&self) -> Providers {
        Providers {
            text: Arc::new(FakeText),
            stock: Some(self.stock.clone() as Arc<dyn StockPhotoProvider>),
            ai_image: Some(self.ai_image.clone() as Arc<dyn ImageGenerator>),
            background_remover: None,
            text_overlay: None,
            compositor: Arc::new(LocalCompositor::new()),
            fetcher: Arc::new(NoFetch),
        }
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub fakes: Fakes,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Server whose stock provider returns three photos per query
    pub async fn new() -> Self {
        Self::with_fakes(Fakes::new(3)).await
    }

    pub async fn with_fakes(fakes: Fakes) -> Self {
        copysmith::metrics::init_metrics();
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "test.example.com".to_string(),
                protocol: "https".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            auth: config::AuthConfig {
                session_secret: TEST_SECRET.to_string(),
                session_max_age: 604800,
            },
            providers: config::ProvidersConfig {
                text: config::TextProviderConfig {
                    api_base: "http://127.0.0.1:9".to_string(),
                    api_key: "unused".to_string(),
                    model: "test-model".to_string(),
                    timeout_seconds: 5,
                },
                stock: None,
                ai_image: None,
                image_tools: None,
            },
            storage: None,
            quota: config::QuotaConfig::default(),
            generation: config::GenerationConfig::default(),
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let state = AppState::with_providers(config, fakes.providers())
            .await
            .unwrap();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = copysmith::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", addr),
            state,
            fakes,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Signed bearer token for an account on the given plan
    pub fn token_for(&self, account_id: &str, plan: PlanTier) -> String {
        use copysmith::auth::session::{Session, create_session_token};

        let session = Session::new(account_id, plan, chrono::Duration::days(1));
        create_session_token(&session, &self.state.config.auth.session_secret)
            .expect("Failed to create test token")
    }

    /// Create a business through the API and return its id
    pub async fn create_business(&self, token: &str, industry: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/v1/businesses"))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "name": "Harbor Bistro",
                "industry": industry,
                "location": "Portland, OR",
                "brand_primary_color": "#1F6FEB",
                "preferred_styles": ["lifestyle"]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    /// POST /api/v1/generate with a JSON body
    pub async fn generate(&self, token: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url("/api/v1/generate"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}
