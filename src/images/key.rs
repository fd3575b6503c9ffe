use std::fmt;

use super::OUTPUT_EXTENSION;

const FINGERPRINT_LEN: usize = 12;

/// File name of a cache entry: `img_<fingerprint>_<size>.webp`.
///
/// Only the URL string and the requested box are hashed, never the fetched
/// bytes, so the URL is used exactly as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(url: &str, width: Option<u32>, height: Option<u32>) -> Self {
        let digest = format!("{:x}", md5::compute(url.as_bytes()));
        let fingerprint = &digest[..FINGERPRINT_LEN];

        CacheKey(format!(
            "img_{}_{}.{}",
            fingerprint,
            size_descriptor(width, height),
            OUTPUT_EXTENSION
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn size_descriptor(width: Option<u32>, height: Option<u32>) -> String {
    if width.is_none() && height.is_none() {
        return "original".to_string();
    }

    let side = |v: Option<u32>| v.map_or_else(|| "auto".to_string(), |v| v.to_string());
    format!("{}x{}", side(width), side(height))
}
