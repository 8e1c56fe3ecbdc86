//! In-process product compositing (`image` crate)

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageReader, Rgba, RgbaImage, imageops};
use std::io::Cursor;

use super::{BrandColor, Compositor, ProviderError};

const PROVIDER: &str = "compositor";

/// Share of the background height the product occupies
const PRODUCT_HEIGHT_RATIO: f32 = 0.6;
/// Accent bar height as a share of the background height
const ACCENT_BAR_RATIO: f32 = 0.04;

/// Places a product cutout bottom-centre on the background
#[derive(Debug, Clone, Default)]
pub struct LocalCompositor;

impl LocalCompositor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Compositor for LocalCompositor {
    async fn composite(
        &self,
        background: &[u8],
        cutout: &[u8],
        accent: Option<BrandColor>,
    ) -> Result<Vec<u8>, ProviderError> {
        let background = background.to_vec();
        let cutout = cutout.to_vec();
        tokio::task::spawn_blocking(move || compose(&background, &cutout, accent))
            .await
            .map_err(|e| ProviderError::decode(PROVIDER, format!("compositing task failed: {e}")))?
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, ProviderError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ProviderError::decode(PROVIDER, e.to_string()))?;
    Ok(reader.decode()?)
}

fn compose(
    background: &[u8],
    cutout: &[u8],
    accent: Option<BrandColor>,
) -> Result<Vec<u8>, ProviderError> {
    let mut canvas = decode(background)?.to_rgba8();
    let product = decode(cutout)?;

    let (width, height) = canvas.dimensions();
    let (product_width, product_height) = product.dimensions();
    if product_width == 0 || product_height == 0 {
        return Err(ProviderError::decode(PROVIDER, "cutout has no pixels"));
    }

    let bar_height = accent
        .map(|_| ((height as f32 * ACCENT_BAR_RATIO).round() as u32).max(1))
        .unwrap_or(0);

    // Scale to the target height, never wider than the canvas
    let target_height = ((height as f32 * PRODUCT_HEIGHT_RATIO).round() as u32).max(1);
    let scale = (target_height as f32 / product_height as f32)
        .min(width as f32 / product_width as f32);
    let scaled_width = ((product_width as f32 * scale).round() as u32).clamp(1, width);
    let scaled_height = ((product_height as f32 * scale).round() as u32).clamp(1, height);
    let product = product
        .resize_exact(scaled_width, scaled_height, imageops::FilterType::Lanczos3)
        .to_rgba8();

    let x = (width as i64 - scaled_width as i64) / 2;
    let y = (height as i64 - bar_height as i64 - scaled_height as i64).max(0);
    imageops::overlay(&mut canvas, &product, x, y);

    if let Some(color) = accent {
        paint_accent_bar(&mut canvas, color, bar_height);
    }

    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)?;
    Ok(buffer)
}

fn paint_accent_bar(canvas: &mut RgbaImage, color: BrandColor, bar_height: u32) {
    let (width, height) = canvas.dimensions();
    let pixel = Rgba([color.r, color.g, color.b, 255]);
    for y in height.saturating_sub(bar_height)..height {
        for x in 0..width {
            canvas.put_pixel(x, y, pixel);
        }
    }
}
