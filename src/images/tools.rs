use std::io::Cursor;
use std::sync::Arc;

use image::imageops::FilterType;
use image::io::{Limits, Reader as ImageReader};
use image::{DynamicImage, GenericImageView, ImageFormat};
use tokio::sync::Semaphore;

use super::ImageError;

// Largest side libwebp can encode
const WEBP_MAX_DIMENSION: u32 = 16383;
const MAX_SOURCE_DIMENSION: u32 = WEBP_MAX_DIMENSION;

/// Requested bounding box. A missing side is unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetSize {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl TargetSize {
    pub fn new(width: Option<u32>, height: Option<u32>) -> Self {
        Self { width, height }
    }

    pub fn is_original(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }
}

/// Re-encodes images to lossy WebP off the async runtime.
pub struct Transcoder {
    quality: f32,
    permits: Arc<Semaphore>,
}

impl Transcoder {
    pub fn new(quality: f32, concurrency: usize) -> Self {
        let concurrency = if concurrency == 0 {
            log::warn!("transcode_concurrency is 0, clamping to 1");
            1
        } else {
            concurrency
        };

        Self {
            quality: quality.clamp(0.0, 100.0),
            permits: Arc::new(Semaphore::new(concurrency)),
        }
    }

    pub async fn transcode(
        &self,
        data: Vec<u8>,
        hint: Option<ImageFormat>,
        target: TargetSize,
    ) -> Result<Vec<u8>, ImageError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ImageError::Task(format!("Failed to acquire transcode permit: {}", e)))?;

        let quality = self.quality;
        tokio::task::spawn_blocking(move || transcode_image(&data, hint, target, quality))
            .await
            .map_err(|e| ImageError::Task(e.to_string()))?
    }
}

pub fn transcode_image(
    data: &[u8],
    hint: Option<ImageFormat>,
    target: TargetSize,
    quality: f32,
) -> Result<Vec<u8>, ImageError> {
    let img = decode_image(data, hint)?;
    let img = fit_inside(img, target);
    encode_webp(&img, quality)
}

// Decode trusting the bytes first, then the declared type
pub fn decode_image(data: &[u8], hint: Option<ImageFormat>) -> Result<DynamicImage, ImageError> {
    match (decode_as(data, None), hint) {
        (Ok(img), _) => Ok(img),
        (Err(ImageError::TooLarge(reason)), _) => Err(ImageError::TooLarge(reason)),
        (Err(first), Some(format)) => {
            log::debug!("Guessed decode failed ({}), retrying as {:?}", first, format);
            decode_as(data, Some(format))
        }
        (Err(first), None) => Err(first),
    }
}

fn decode_as(data: &[u8], format: Option<ImageFormat>) -> Result<DynamicImage, ImageError> {
    let reader = || match format {
        Some(format) => Ok(ImageReader::with_format(Cursor::new(data), format)),
        None => ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode(e.to_string())),
    };

    // Only the header is read here, pixels are never allocated for oversized sources
    let (width, height) = reader()?
        .into_dimensions()
        .map_err(|e| ImageError::Decode(e.to_string()))?;
    check_source_dimensions(width, height)?;

    let mut reader = reader()?;
    reader.limits(decoder_limits());
    reader.decode().map_err(|e| ImageError::Decode(e.to_string()))
}

fn decoder_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_DIMENSION);
    limits.max_image_height = Some(MAX_SOURCE_DIMENSION);
    limits
}

pub fn check_source_dimensions(width: u32, height: u32) -> Result<(), ImageError> {
    if width > MAX_SOURCE_DIMENSION || height > MAX_SOURCE_DIMENSION {
        return Err(ImageError::TooLarge(format!(
            "{}x{} (max {} pixels per side)",
            width, height, MAX_SOURCE_DIMENSION
        )));
    }
    Ok(())
}

/// Shrinks `img` to fit inside the target box, keeping its aspect ratio.
/// Never enlarges and never crops.
pub fn fit_inside(img: DynamicImage, target: TargetSize) -> DynamicImage {
    if target.is_original() {
        return img;
    }

    let (current_width, current_height) = img.dimensions();
    let box_width = target.width.unwrap_or(u32::MAX);
    let box_height = target.height.unwrap_or(u32::MAX);

    if current_width <= box_width && current_height <= box_height {
        return img;
    }

    img.resize(box_width, box_height, FilterType::Lanczos3)
}

pub fn encode_webp(img: &DynamicImage, quality: f32) -> Result<Vec<u8>, ImageError> {
    let (width, height) = img.dimensions();
    if width > WEBP_MAX_DIMENSION || height > WEBP_MAX_DIMENSION {
        return Err(ImageError::Encode(format!(
            "{}x{} exceeds the WebP limit of {} pixels per side",
            width, height, WEBP_MAX_DIMENSION
        )));
    }

    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode(quality)
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), width, height).encode(quality)
    };

    Ok(encoded.to_vec())
}
