#[macro_use]
extern crate rocket;

pub mod api;
pub mod cache;
pub mod config;
pub mod cors;
pub mod images;

use log::info;
use rocket::figment::Figment;
use rocket::{Build, Rocket};
use thiserror::Error;

use cache::ImageCache;
use config::AppConfig;
use cors::CORS;
use images::{ImageOptimizer, OriginFetcher, Transcoder};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] rocket::figment::Error),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Builds the server from an already-merged figment.
pub fn build(figment: Figment) -> Result<Rocket<Build>, StartupError> {
    let config = figment.extract::<AppConfig>()?;

    let cache = ImageCache::new(&config.image_cache_dir);
    info!("Image cache directory: {}", cache.dir().display());

    let fetcher = OriginFetcher::new(
        config.timeout,
        &config.user_agent,
        config.max_connections_per_host,
        config.max_source_bytes,
    )?;
    info!(
        "Origin fetcher initialized ({}s timeout, {} connections per host)",
        config.timeout, config.max_connections_per_host
    );

    let transcoder = Transcoder::new(config.image_quality, config.transcode_concurrency);
    let optimizer = ImageOptimizer::new(cache, fetcher, transcoder);

    info!(
        "Starting image cache server on {}:{}",
        config.address, config.port
    );

    Ok(rocket::custom(figment)
        .attach(CORS)
        .manage(optimizer)
        .mount("/", routes![api::images::resize_image]))
}
