use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use super::fetch::OriginFetcher;
use super::format;
use super::tools::{TargetSize, Transcoder};
use super::{CacheKey, CacheStatus, Fallback, ImageError, OptimizedImage};
use crate::cache::ImageCache;

type SharedTranscode = Shared<BoxFuture<'static, Result<Arc<[u8]>, Arc<ImageError>>>>;

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub url: String,
    pub target: TargetSize,
    /// Skip both the cache read and the cache write.
    pub bypass_cache: bool,
}

/// Serves transcoded images from the disk cache, producing them on a miss.
///
/// Concurrent misses for one key share a single fetch and transcode. That
/// work runs in its own task, so it completes and fills the cache even if
/// every waiting client goes away.
pub struct ImageOptimizer {
    cache: ImageCache,
    fetcher: Arc<OriginFetcher>,
    transcoder: Arc<Transcoder>,
    in_flight: Arc<Mutex<HashMap<CacheKey, SharedTranscode>>>,
}

impl ImageOptimizer {
    pub fn new(cache: ImageCache, fetcher: OriginFetcher, transcoder: Transcoder) -> Self {
        Self {
            cache,
            fetcher: Arc::new(fetcher),
            transcoder: Arc::new(transcoder),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub async fn optimize(&self, request: &ImageRequest) -> Result<OptimizedImage, Fallback> {
        if format::has_unsupported_extension(&request.url) {
            log::debug!("Unsupported extension, redirecting to {}", request.url);
            return Err(Fallback::new(
                &request.url,
                Arc::new(ImageError::UnsupportedFormat(request.url.clone())),
            ));
        }

        let key = CacheKey::derive(&request.url, request.target.width, request.target.height);

        if !request.bypass_cache {
            if let Some(data) = self.cache.get_image(&key).await {
                log::debug!("Image cache hit: {}", key);
                return Ok(OptimizedImage {
                    data: Arc::from(data),
                    cache: CacheStatus::Hit,
                });
            }
        }

        log::info!("Image cache miss: {} for {}", key, request.url);

        let produced = if request.bypass_cache {
            produce(&self.fetcher, &self.transcoder, &request.url, request.target)
                .await
                .map_err(Arc::new)
        } else {
            self.produce_shared(key, request).await
        };

        match produced {
            Ok(data) => Ok(OptimizedImage {
                data,
                cache: CacheStatus::Miss,
            }),
            Err(reason) => {
                match reason.as_ref() {
                    ImageError::UnsupportedFormat(kind) => {
                        log::debug!("Unsupported format {} from {}, redirecting", kind, request.url)
                    }
                    other => log::warn!("Falling back to origin for {}: {}", request.url, other),
                }
                Err(Fallback::new(&request.url, reason))
            }
        }
    }

    async fn produce_shared(
        &self,
        key: CacheKey,
        request: &ImageRequest,
    ) -> Result<Arc<[u8]>, Arc<ImageError>> {
        let shared = {
            let mut in_flight = self.in_flight.lock();
            if let Some(existing) = in_flight.get(&key) {
                log::debug!("Joining in-flight transcode for {}", key);
                existing.clone()
            } else {
                let shared = self.spawn_producer(key.clone(), request);
                in_flight.insert(key, shared.clone());
                shared
            }
        };

        shared.await
    }

    // Caller holds the in-flight lock, so the task cannot deregister before it is registered
    fn spawn_producer(&self, key: CacheKey, request: &ImageRequest) -> SharedTranscode {
        let fetcher = Arc::clone(&self.fetcher);
        let transcoder = Arc::clone(&self.transcoder);
        let cache = self.cache.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let url = request.url.clone();
        let target = request.target;

        let handle = tokio::spawn(async move {
            let result = produce(&fetcher, &transcoder, &url, target).await;
            if let Ok(data) = &result {
                cache.spawn_store(key.clone(), Arc::clone(data));
            }
            in_flight.lock().remove(&key);
            result.map_err(Arc::new)
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(Arc::new(ImageError::Task(e.to_string()))),
            }
        }
        .boxed()
        .shared()
    }
}

async fn produce(
    fetcher: &OriginFetcher,
    transcoder: &Transcoder,
    url: &str,
    target: TargetSize,
) -> Result<Arc<[u8]>, ImageError> {
    let fetched = fetcher.fetch(url).await?;

    if format::is_unsupported_content_type(&fetched.content_type) {
        return Err(ImageError::UnsupportedFormat(fetched.content_type));
    }

    let hint = format::format_from_content_type(&fetched.content_type);
    let data = transcoder.transcode(fetched.data, hint, target).await?;

    Ok(Arc::from(data))
}
