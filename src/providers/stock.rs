//! Unsplash-compatible stock photo search

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{
    CandidateImage, Orientation, ProviderError, StockAttribution, StockPhotoProvider, bounded,
    build_http_client, read_json,
};
use crate::config::StockProviderConfig;
use crate::data::ImageProvenance;

const PROVIDER: &str = "stock";

/// Stock photo client
#[derive(Clone)]
pub struct UnsplashClient {
    http_client: reqwest::Client,
    api_base: String,
    access_key: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    urls: PhotoUrls,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    alt_description: Option<String>,
    user: Photographer,
    #[serde(default)]
    links: Option<PhotoLinks>,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: String,
    #[serde(default)]
    small: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Photographer {
    name: String,
    #[serde(default)]
    links: Option<PhotographerLinks>,
}

#[derive(Debug, Deserialize)]
struct PhotographerLinks {
    #[serde(default)]
    html: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhotoLinks {
    #[serde(default)]
    download_location: Option<String>,
}

impl From<Photo> for CandidateImage {
    fn from(photo: Photo) -> Self {
        Self {
            url: photo.urls.regular,
            thumbnail_url: photo.urls.small,
            description: photo.description.or(photo.alt_description),
            provenance: ImageProvenance::Stock,
            attribution: StockAttribution {
                photographer_name: photo.user.name,
                photographer_url: photo.user.links.and_then(|links| links.html),
                download_location: photo.links.and_then(|links| links.download_location),
            },
        }
    }
}

impl UnsplashClient {
    pub fn new(config: &StockProviderConfig) -> Result<Self, ProviderError> {
        let http_client = build_http_client(concat!("copysmith/", env!("CARGO_PKG_VERSION")))
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_key: config.access_key.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    fn authorization(&self) -> String {
        format!("Client-ID {}", self.access_key)
    }

    async fn search_once(
        &self,
        query: &str,
        orientation: Orientation,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<CandidateImage>, ProviderError> {
        let page = page.max(1).to_string();
        let per_page = per_page.clamp(1, 30).to_string();
        let response = self
            .http_client
            .get(format!("{}/search/photos", self.api_base))
            .header("Authorization", self.authorization())
            .header("Accept-Version", "v1")
            .query(&[
                ("query", query),
                ("orientation", orientation.as_str()),
                ("page", page.as_str()),
                ("per_page", per_page.as_str()),
                ("content_filter", "high"),
            ])
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        let search: SearchResponse = read_json(PROVIDER, response).await?;
        Ok(search.results.into_iter().map(CandidateImage::from).collect())
    }

    async fn ping_download(&self, download_location: &str) -> Result<(), ProviderError> {
        let response = self
            .http_client
            .get(download_location)
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: response.status().as_u16(),
                body: String::new(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StockPhotoProvider for UnsplashClient {
    async fn search(
        &self,
        query: &str,
        orientation: Orientation,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<CandidateImage>, ProviderError> {
        bounded(
            PROVIDER,
            self.timeout,
            self.search_once(query, orientation, page, per_page),
        )
        .await
    }

    async fn track_download(&self, download_location: &str) -> Result<(), ProviderError> {
        bounded(PROVIDER, self.timeout, self.ping_download(download_location)).await
    }
}
