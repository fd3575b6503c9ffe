use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.4 Safari/605.1.15";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub address: String,
    /// Origin fetch timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_image_cache_dir")]
    pub image_cache_dir: PathBuf,
    /// Lossy WebP quality, 0-100.
    #[serde(default = "default_image_quality")]
    pub image_quality: f32,
    #[serde(default = "default_max_connections_per_host")]
    pub max_connections_per_host: usize,
    #[serde(default = "default_transcode_concurrency")]
    pub transcode_concurrency: usize,
    /// Largest origin body accepted, in bytes.
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,
}

fn default_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_image_cache_dir() -> PathBuf {
    PathBuf::from("cache/images")
}

fn default_image_quality() -> f32 {
    75.0
}

fn default_max_connections_per_host() -> usize {
    100
}

fn default_transcode_concurrency() -> usize {
    4
}

fn default_max_source_bytes() -> usize {
    10 * 1024 * 1024
}
