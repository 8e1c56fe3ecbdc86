//! OpenAI-compatible image generation client

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{
    AiImage, AiImageRequest, ImageGenerator, ImageSource, ProviderError, bounded,
    build_http_client, read_json,
};
use crate::config::AiImageProviderConfig;

const PROVIDER: &str = "ai_image";
const SQUARE_SIZE: &str = "1024x1024";

/// Paid AI image generator
#[derive(Clone)]
pub struct OpenAiImageGenerator {
    http_client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    landscape_size: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

impl OpenAiImageGenerator {
    pub fn new(config: &AiImageProviderConfig) -> Result<Self, ProviderError> {
        let http_client = build_http_client(concat!("copysmith/", env!("CARGO_PKG_VERSION")))
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            landscape_size: config.size.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    fn size_for(&self, request: &AiImageRequest) -> String {
        if request.kind.prefers_square() {
            SQUARE_SIZE.to_string()
        } else {
            self.landscape_size.clone()
        }
    }

    async fn request_image(&self, prompt: &str, size: &str) -> Result<ImageData, ProviderError> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "size": size,
            "n": 1,
        });

        let response = self
            .http_client
            .post(format!("{}/images/generations", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        let images: ImagesResponse = read_json(PROVIDER, response).await?;
        images
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::decode(PROVIDER, "response contained no images"))
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate(&self, request: &AiImageRequest) -> Result<AiImage, ProviderError> {
        let prompt = build_prompt(request);
        let size = self.size_for(request);

        let data = bounded(PROVIDER, self.timeout, self.request_image(&prompt, &size)).await?;
        let source = image_source(data.b64_json, data.url)?;

        Ok(AiImage {
            source,
            style: request.style,
            size,
            prompt,
            revised_prompt: data.revised_prompt,
        })
    }
}

fn image_source(
    b64_json: Option<String>,
    url: Option<String>,
) -> Result<ImageSource, ProviderError> {
    if let Some(encoded) = b64_json {
        let bytes = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|e| ProviderError::decode(PROVIDER, format!("invalid b64_json: {e}")))?;
        return Ok(ImageSource::Bytes(bytes));
    }
    url.map(ImageSource::Url)
        .ok_or_else(|| ProviderError::decode(PROVIDER, "image had neither b64_json nor url"))
}

/// Compose the image prompt from topic, business and style
fn build_prompt(request: &AiImageRequest) -> String {
    let mut prompt = format!(
        "Marketing image for {}, a {} business, illustrating: {}. Style: {}.",
        request.business_name,
        request.industry,
        request.topic,
        request.style.prompt_hint()
    );
    if let Some(color) = request.brand.primary_color {
        prompt.push_str(&format!(" Incorporate subtle accents in {}.", color.to_hex()));
    }
    if let Some(area) = &request.brand.service_area {
        prompt.push_str(&format!(" Setting evokes {area}."));
    }
    prompt.push_str(" No text, letters, logos or watermarks in the image.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ContentKind, ImageStyle};
    use crate::providers::{BrandColor, BrandFields};

    fn request(kind: ContentKind) -> AiImageRequest {
        AiImageRequest {
            kind,
            topic: "new patio opens".to_string(),
            business_name: "Harbor Bistro".to_string(),
            industry: "restaurant".to_string(),
            style: ImageStyle::Lifestyle,
            brand: BrandFields {
                primary_color: BrandColor::parse("#1F6FEB"),
                ..Default::default()
            },
        }
    }

    #[test]
    fn prompt_carries_style_and_brand_color() {
        let prompt = build_prompt(&request(ContentKind::BlogPost));
        assert!(prompt.contains("new patio opens"));
        assert!(prompt.contains(ImageStyle::Lifestyle.prompt_hint()));
        assert!(prompt.contains("#1F6FEB"));
    }

    #[test]
    fn b64_payload_is_preferred_over_url() {
        let encoded = BASE64_STANDARD.encode([1u8, 2, 3]);
        let source = image_source(Some(encoded), Some("https://cdn.example.com/a.png".to_string()))
            .unwrap();
        assert_eq!(source, ImageSource::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn url_only_payload_is_kept_as_url() {
        let source = image_source(None, Some("https://cdn.example.com/a.png".to_string())).unwrap();
        assert_eq!(source, ImageSource::Url("https://cdn.example.com/a.png".to_string()));
        assert!(image_source(None, None).is_err());
    }

    #[test]
    fn images_response_surfaces_revised_prompt() {
        let raw = r#"{"created":1,"data":[{"url":"https://cdn.example.com/a.png","revised_prompt":"A sunny patio"}]}"#;
        let response: ImagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.data[0].revised_prompt.as_deref(), Some("A sunny patio"));
    }
}
