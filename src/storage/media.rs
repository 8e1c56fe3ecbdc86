//! Generated image storage using Cloudflare R2
//!
//! Final images are uploaded once and served from the bucket's custom
//! domain. Without a bucket the pipeline falls back to data URLs.

use aws_sdk_s3::Client as S3Client;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};

use crate::error::AppError;
use crate::storage::build_r2_http_client;

/// Image storage service
///
/// Uploads final images to R2 and returns public URLs.
pub struct ImageStorage {
    /// S3-compatible client for R2
    client: S3Client,
    /// Bucket name
    bucket: String,
    /// Public URL base (Custom Domain)
    /// e.g., "https://images.example.com"
    public_url: String,
}

impl ImageStorage {
    /// Create new image storage client
    ///
    /// # Errors
    /// Returns error if S3 client initialization fails
    pub fn new(config: &crate::config::StorageConfig) -> Result<Self, AppError> {
        use aws_sdk_s3::config::BehaviorVersion;
        use aws_sdk_s3::config::{Credentials, Region};

        if config.bucket.trim().is_empty() {
            return Err(AppError::Config("storage.bucket cannot be empty".to_string()));
        }

        // R2 endpoint: https://{account_id}.r2.cloudflarestorage.com
        let endpoint = format!("https://{}.r2.cloudflarestorage.com", config.account_id);

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "copysmith-r2",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .http_client(build_r2_http_client())
            .region(Region::new("auto"))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .build();

        Ok(Self {
            client: S3Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
        })
    }

    /// Upload a generated image
    ///
    /// Stores under `generated/{account_id}/{id}.{ext}`.
    ///
    /// # Returns
    /// Public URL for the uploaded file
    pub async fn upload_generated(
        &self,
        account_id: &str,
        id: &str,
        data: Vec<u8>,
    ) -> Result<String, AppError> {
        use aws_sdk_s3::primitives::ByteStream;

        let content_type = sniff_content_type(&data);
        let key = format!("generated/{}/{}.{}", account_id, id, extension_for(content_type));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .cache_control("public, max-age=31536000") // 1 year
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("R2 upload failed: {}", e)))?;

        Ok(self.get_public_url(&key))
    }

    /// Get public URL for a key
    pub fn get_public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }
}

/// MIME type guessed from magic bytes
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    image::guess_format(data)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

/// Inline an image as a `data:` URL
pub fn to_data_url(data: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        sniff_content_type(data),
        BASE64_STANDARD.encode(data)
    )
}
