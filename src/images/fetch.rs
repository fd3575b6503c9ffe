use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::{header, Client, Url};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::format;
use super::ImageError;

type HostLimits = Mutex<HashMap<String, Arc<Semaphore>>>;

pub struct FetchedImage {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Pooled HTTP client for source images.
///
/// Connections are reused across requests; in-flight requests to a single
/// host are capped by a per-host semaphore, and bodies larger than
/// `max_body_bytes` are refused.
pub struct OriginFetcher {
    client: Client,
    max_per_host: usize,
    max_body_bytes: usize,
    hosts: HostLimits,
}

/// Holds a host's permit; forgets the host once nobody else is using it.
struct HostPermit<'a> {
    hosts: &'a HostLimits,
    host: String,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for HostPermit<'_> {
    fn drop(&mut self) {
        // The permit owns an Arc of the semaphore, release it before counting
        self.permit.take();

        let mut hosts = self.hosts.lock();
        let idle = hosts
            .get(&self.host)
            .map_or(false, |limit| Arc::strong_count(limit) == 1);
        if idle {
            hosts.remove(&self.host);
        }
    }
}

impl OriginFetcher {
    pub fn new(
        timeout: u64,
        user_agent: &str,
        max_per_host: usize,
        max_body_bytes: usize,
    ) -> Result<Self, reqwest::Error> {
        let max_per_host = max_per_host.max(1);
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .user_agent(user_agent)
            .pool_max_idle_per_host(max_per_host)
            .build()?;

        Ok(Self {
            client,
            max_per_host,
            max_body_bytes,
            hosts: Mutex::new(HashMap::new()),
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedImage, ImageError> {
        let parsed = Url::parse(url).map_err(|e| ImageError::InvalidUrl(format!("{}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ImageError::InvalidUrl(format!("{}: missing host", url)))?
            .to_string();

        let _permit = self.acquire_host(host).await?;

        let mut response = self
            .client
            .get(parsed)
            .header(header::ACCEPT, "image/avif,image/webp,image/*,*/*;q=0.8")
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::UpstreamStatus(status));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes as u64 {
                return Err(ImageError::TooLarge(format!(
                    "{} bytes declared (max {} bytes)",
                    length, self.max_body_bytes
                )));
            }
        }

        let declared = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify)? {
            if data.len() + chunk.len() > self.max_body_bytes {
                return Err(ImageError::TooLarge(format!(
                    "body exceeds {} bytes",
                    self.max_body_bytes
                )));
            }
            data.extend_from_slice(&chunk);
        }

        // If content type is missing or generic, try to detect from image data
        let content_type = if format::is_generic_content_type(&declared) {
            format::sniff_content_type(&data)
                .map(str::to_string)
                .unwrap_or(declared)
        } else {
            declared
        };

        log::debug!("Fetched {} ({} bytes, {})", url, data.len(), content_type);

        Ok(FetchedImage { data, content_type })
    }

    async fn acquire_host(&self, host: String) -> Result<HostPermit<'_>, ImageError> {
        // Declared first so a cancelled wait drops the semaphore handle before the guard
        let mut guard = HostPermit {
            hosts: &self.hosts,
            host,
            permit: None,
        };

        let permit = self
            .host_limit(&guard.host)
            .acquire_owned()
            .await
            .map_err(|e| ImageError::Task(e.to_string()))?;
        guard.permit = Some(permit);

        Ok(guard)
    }

    fn host_limit(&self, host: &str) -> Arc<Semaphore> {
        let mut hosts = self.hosts.lock();
        hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_host)))
            .clone()
    }

    #[cfg(test)]
    fn tracked_hosts(&self) -> usize {
        self.hosts.lock().len()
    }
}

fn classify(error: reqwest::Error) -> ImageError {
    if error.is_timeout() {
        ImageError::FetchTimeout
    } else {
        ImageError::Network(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> OriginFetcher {
        OriginFetcher::new(2, crate::config::DEFAULT_USER_AGENT, 4, 1024).unwrap()
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn rejects_relative_url() {
        let err = fetcher().fetch("/images/photo.jpg").await.err().unwrap();
        assert!(matches!(err, ImageError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_a_network_error() {
        let err = fetcher()
            .fetch(&format!("http://127.0.0.1:{}/photo.jpg", closed_port()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ImageError::Network(_)));
    }

    #[test]
    fn host_limits_are_shared_per_host() {
        let fetcher = fetcher();
        let a = fetcher.host_limit("example.com");
        let b = fetcher.host_limit("example.com");
        let c = fetcher.host_limit("cdn.example.com");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(a.available_permits(), 4);
    }

    #[tokio::test]
    async fn finished_requests_forget_their_host() {
        let fetcher = fetcher();
        let port = closed_port();

        for i in 1..=20 {
            let _ = fetcher
                .fetch(&format!("http://127.0.0.{}:{}/x.png", i, port))
                .await;
        }

        assert_eq!(fetcher.tracked_hosts(), 0);
    }

    #[tokio::test]
    async fn host_stays_tracked_while_in_use() {
        let fetcher = fetcher();

        let held = fetcher.acquire_host("example.com".to_string()).await.unwrap();
        let other = fetcher.acquire_host("example.com".to_string()).await.unwrap();
        assert_eq!(fetcher.tracked_hosts(), 1);

        drop(held);
        assert_eq!(fetcher.tracked_hosts(), 1);

        drop(other);
        assert_eq!(fetcher.tracked_hosts(), 0);
    }

    #[tokio::test]
    async fn abandoned_wait_forgets_its_host() {
        let fetcher = OriginFetcher::new(2, crate::config::DEFAULT_USER_AGENT, 1, 1024).unwrap();
        let held = fetcher.acquire_host("example.com".to_string()).await.unwrap();

        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            fetcher.acquire_host("example.com".to_string()),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(fetcher.tracked_hosts(), 1);

        drop(held);
        assert_eq!(fetcher.tracked_hosts(), 0);
    }
}
