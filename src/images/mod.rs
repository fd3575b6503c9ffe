pub mod fetch;
pub mod format;
pub mod key;
pub mod optimizer;
pub mod tools;

use std::sync::Arc;

use thiserror::Error;

pub use fetch::{FetchedImage, OriginFetcher};
pub use key::CacheKey;
pub use optimizer::{ImageOptimizer, ImageRequest};
pub use tools::{TargetSize, Transcoder};

/// Extension of every transcoded image, and of every cache entry.
pub const OUTPUT_EXTENSION: &str = "webp";
pub const OUTPUT_CONTENT_TYPE: &str = "image/webp";

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),

    #[error("Origin request timed out")]
    FetchTimeout,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Origin responded with status: {0}")]
    UpstreamStatus(reqwest::StatusCode),

    #[error("Source image too large: {0}")]
    TooLarge(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptimizedImage {
    pub data: Arc<[u8]>,
    pub cache: CacheStatus,
}

/// The client should be sent to `url` instead of receiving optimized bytes.
#[derive(Debug, Clone)]
pub struct Fallback {
    pub url: String,
    pub reason: Arc<ImageError>,
}

impl Fallback {
    pub fn new(url: impl Into<String>, reason: Arc<ImageError>) -> Self {
        Self {
            url: url.into(),
            reason,
        }
    }
}
