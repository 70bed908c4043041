use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const MAX_CONCURRENT_PRELOADS: usize = 4;

#[cfg(target_arch = "wasm32")]
pub trait ImageSourceBounds {}
#[cfg(target_arch = "wasm32")]
impl<T> ImageSourceBounds for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait ImageSourceBounds: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync> ImageSourceBounds for T {}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait ImageSource: ImageSourceBounds {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpImageSource {
    client: reqwest::Client,
}

impl HttpImageSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpImageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("Image fetch failed ({}): {}", resp.status(), url));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Memoizes illustration bytes by URL. Failed fetches are not remembered.
pub struct ImageCache<S: ImageSource> {
    source: S,
    images: Mutex<HashMap<String, Arc<Vec<u8>>>>,
}

impl<S: ImageSource> ImageCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            images: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.images.lock().ok()?.get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.images.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn preload(&self, url: &str) -> Result<Arc<Vec<u8>>> {
        if let Some(hit) = self.get(url) {
            return Ok(hit);
        }
        debug!("Preloading image {}", url);
        let bytes = Arc::new(self.source.fetch(url).await?);
        self.images
            .lock()
            .map_err(|_| anyhow!("Image cache lock poisoned"))?
            .insert(url.to_string(), bytes.clone());
        Ok(bytes)
    }

    /// Fetches all URLs concurrently; the first failure aborts the batch.
    pub async fn preload_all(&self, urls: &[String]) -> Result<()> {
        futures_util::stream::iter(urls.iter().map(|url| self.preload(url)))
            .buffer_unordered(MAX_CONCURRENT_PRELOADS)
            .try_for_each(|_| async { Ok(()) })
            .await
    }
}
