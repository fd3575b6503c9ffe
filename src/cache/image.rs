use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::fs;

use crate::images::CacheKey;

// Transcoded images stored on disk forever, one flat file per key
#[derive(Debug, Clone)]
pub struct ImageCache {
    dir: PathBuf,
}

impl ImageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    /// Any read failure counts as a miss, whatever its cause.
    pub async fn get_image(&self, key: &CacheKey) -> Option<Vec<u8>> {
        match fs::read(self.path_for(key)).await {
            Ok(data) => Some(data),
            Err(e) => {
                log::debug!("Cache miss for {}: {}", key, e);
                None
            }
        }
    }

    /// Writes through a temporary file so readers never see a partial entry.
    pub async fn store_image(&self, key: &CacheKey, data: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.{}.tmp", key, random_suffix()));

        if let Err(e) = fs::write(&tmp, data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }

        Ok(())
    }

    /// Fire-and-forget write; failures are logged and otherwise ignored.
    pub fn spawn_store(&self, key: CacheKey, data: Arc<[u8]>) {
        let cache = self.clone();
        tokio::spawn(async move {
            match cache.store_image(&key, &data).await {
                Ok(()) => log::debug!("Cached {} ({} bytes)", key, data.len()),
                Err(e) => log::warn!("Failed to write {} to image cache: {}", key, e),
            }
        });
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}
