//! Image tools service client (background removal, text overlay) and URL fetcher

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{
    BackgroundRemover, BrandColor, Cutout, ImageFetcher, ProviderError, TextOverlay, bounded,
    build_http_client, read_json,
};
use crate::config::ImageToolsConfig;

const TOOLS_PROVIDER: &str = "image_tools";
const FETCH_PROVIDER: &str = "image_fetch";

/// Client for the background-removal / text-overlay service
#[derive(Clone)]
pub struct ImageToolsClient {
    http_client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RemoveBackgroundResponse {
    image: String,
    #[serde(default)]
    method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverlayResponse {
    image: String,
}

impl ImageToolsClient {
    pub fn new(config: &ImageToolsConfig) -> Result<Self, ProviderError> {
        let http_client = build_http_client(concat!("copysmith/", env!("CARGO_PKG_VERSION")))
            .map_err(|source| ProviderError::Transport {
                provider: TOOLS_PROVIDER,
                source,
            })?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ProviderError> {
        let mut request = self
            .http_client
            .post(format!("{}{}", self.api_base, path))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: TOOLS_PROVIDER,
                source,
            })?;
        read_json(TOOLS_PROVIDER, response).await
    }
}

fn decode_image(encoded: &str) -> Result<Vec<u8>, ProviderError> {
    // Accept both bare base64 and data URLs
    let payload = encoded
        .split_once(";base64,")
        .map(|(_, data)| data)
        .unwrap_or(encoded);
    BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| ProviderError::decode(TOOLS_PROVIDER, format!("invalid image payload: {e}")))
}

#[async_trait]
impl BackgroundRemover for ImageToolsClient {
    async fn remove_background(&self, image: &[u8]) -> Result<Cutout, ProviderError> {
        let body = json!({ "image": BASE64_STANDARD.encode(image) });
        let response: RemoveBackgroundResponse =
            bounded(TOOLS_PROVIDER, self.timeout, self.post("/remove-background", body)).await?;

        Ok(Cutout {
            bytes: decode_image(&response.image)?,
            method: response.method.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[async_trait]
impl TextOverlay for ImageToolsClient {
    async fn overlay(
        &self,
        image: &[u8],
        headline: &str,
        color: BrandColor,
    ) -> Result<Vec<u8>, ProviderError> {
        let body = json!({
            "image": BASE64_STANDARD.encode(image),
            "text": headline,
            "color": color.to_hex(),
        });
        let response: OverlayResponse =
            bounded(TOOLS_PROVIDER, self.timeout, self.post("/overlay-text", body)).await?;

        decode_image(&response.image)
    }
}

/// Downloads image bytes for URL-only provider results
#[derive(Clone)]
pub struct HttpImageFetcher {
    http_client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, ProviderError> {
        let http_client = build_http_client(concat!("copysmith/", env!("CARGO_PKG_VERSION")))
            .map_err(|source| ProviderError::Transport {
                provider: FETCH_PROVIDER,
                source,
            })?;

        Ok(Self {
            http_client,
            timeout,
            max_bytes,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let mut response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: FETCH_PROVIDER,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: FETCH_PROVIDER,
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let too_large = |len: u64| {
            ProviderError::decode(
                FETCH_PROVIDER,
                format!("image is at least {} bytes, limit is {}", len, self.max_bytes),
            )
        };
        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(too_large(len));
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: FETCH_PROVIDER,
                source,
            })?
        {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(too_large((bytes.len() + chunk.len()) as u64));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        bounded(FETCH_PROVIDER, self.timeout, self.download(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_accepts_data_url_and_bare_base64() {
        let encoded = BASE64_STANDARD.encode([9u8, 8, 7]);
        assert_eq!(decode_image(&encoded).unwrap(), vec![9, 8, 7]);
        assert_eq!(
            decode_image(&format!("data:image/png;base64,{encoded}")).unwrap(),
            vec![9, 8, 7]
        );
        assert!(decode_image("not base64!").is_err());
    }

    async fn serve_image(body: Vec<u8>) -> String {
        let app = axum::Router::new().route(
            "/image.png",
            axum::routing::get(move || {
                let body = body.clone();
                async move { body }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/image.png")
    }

    #[tokio::test]
    async fn fetch_returns_bytes_within_the_limit() {
        let url = serve_image(vec![7u8; 512]).await;
        let fetcher = HttpImageFetcher::new(Duration::from_secs(5), 1024).unwrap();

        assert_eq!(fetcher.fetch(&url).await.unwrap(), vec![7u8; 512]);
    }

    #[tokio::test]
    async fn fetch_rejects_oversized_images() {
        let url = serve_image(vec![7u8; 4096]).await;
        let fetcher = HttpImageFetcher::new(Duration::from_secs(5), 1024).unwrap();

        assert!(matches!(
            fetcher.fetch(&url).await,
            Err(ProviderError::Decode { .. })
        ));
    }

    #[test]
    fn remove_background_response_defaults_method() {
        let response: RemoveBackgroundResponse =
            serde_json::from_str(r#"{"image":"AQID"}"#).unwrap();
        assert!(response.method.is_none());
    }
}
