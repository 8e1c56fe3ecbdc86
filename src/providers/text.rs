//! OpenAI-compatible chat completions client

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{
    PlatformBundle, ProviderError, TextGenerator, TextOutput, TextRequest, bounded,
    build_http_client, read_json,
};
use crate::config::TextProviderConfig;
use crate::data::ContentKind;

const PROVIDER: &str = "text";

/// Copy writer backed by a chat completions endpoint
#[derive(Clone)]
pub struct OpenAiTextGenerator {
    http_client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiTextGenerator {
    pub fn new(config: &TextProviderConfig) -> Result<Self, ProviderError> {
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
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    async fn complete(&self, request: &TextRequest) -> Result<String, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt(request.kind) },
                { "role": "user", "content": user_prompt(request) },
            ],
        });
        if request.kind == ContentKind::SocialPack {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        let completion: ChatCompletion = read_json(PROVIDER, response).await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::decode(PROVIDER, "completion had no content"))
    }
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    async fn generate(&self, request: &TextRequest) -> Result<TextOutput, ProviderError> {
        let content = bounded(PROVIDER, self.timeout, self.complete(request)).await?;
        parse_output(request.kind, content)
    }
}

/// Shape the raw completion by content kind
fn parse_output(kind: ContentKind, content: String) -> Result<TextOutput, ProviderError> {
    match kind {
        ContentKind::SocialPack => {
            let bundle: PlatformBundle = serde_json::from_str(strip_code_fence(&content))
                .map_err(|e| {
                    ProviderError::decode(PROVIDER, format!("invalid platform bundle: {e}"))
                })?;
            Ok(TextOutput::Bundle(bundle))
        }
        _ => Ok(TextOutput::Plain(content)),
    }
}

/// Models sometimes wrap JSON in a markdown fence despite json mode
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn system_prompt(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::BlogPost => {
            "You write long-form blog articles for small businesses. Use a title line, short sections with headings and a closing call to action. Plain markdown only."
        }
        ContentKind::SocialPost => {
            "You write a single social media post for a small business. Keep it under 280 words, conversational, with at most three hashtags at the end."
        }
        ContentKind::SocialPack => {
            "You write one coordinated campaign across four social platforms. Respond with a JSON object with keys facebook, instagram, linkedin and x. Each value is an object with a body string and an optional hashtags array of strings. Respect each platform's length and tone conventions."
        }
        ContentKind::BusinessUpdate => {
            "You write a short business profile update post (what's new, offer or event). Two to four sentences, one clear call to action, no hashtags."
        }
        ContentKind::Email => {
            "You write an email newsletter. Start with a line 'Subject: ...', then a greeting, a short body and a sign-off from the business."
        }
        ContentKind::ReviewReply => {
            "You write a public reply from a business owner to a customer review. Be gracious, specific and brief."
        }
    }
}

fn user_prompt(request: &TextRequest) -> String {
    let business = &request.business;
    let brand = &request.brand;
    let mut lines = vec![
        format!("Business: {}", business.name),
        format!("Industry: {}", business.industry),
    ];
    if let Some(description) = &business.description {
        lines.push(format!("About: {description}"));
    }
    if let Some(location) = &business.location {
        lines.push(format!("Location: {location}"));
    }
    if let Some(website) = &business.website {
        lines.push(format!("Website: {website}"));
    }
    lines.push(format!("Topic: {}", request.topic));
    lines.push(format!("Tone: {}", request.tone));
    if let Some(tagline) = &brand.tagline {
        lines.push(format!("Tagline: {tagline}"));
    }
    if let Some(cta) = &brand.cta_text {
        lines.push(format!("Call to action: {cta}"));
    }
    if !brand.keywords.is_empty() {
        lines.push(format!("Work in these keywords: {}", brand.keywords.join(", ")));
    }
    if let Some(area) = &brand.service_area {
        lines.push(format!("Service area: {area}"));
    }
    if let Some(framework) = &request.framework {
        lines.push(format!("Structure the copy using the {framework} framework."));
    }
    lines.join("\n")
}
