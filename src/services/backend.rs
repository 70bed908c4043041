use crate::core::config::Config;
use crate::core::state::StoryRecord;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{multipart, Client};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub const TRANSCRIPT_PATH: &str = "/api/generate-transcript";
pub const AUDIO_PATH: &str = "/api/generate-audio";
pub const IMAGES_PATH: &str = "/api/generate-image";
pub const QUIZ_PATH: &str = "/api/generate-quiz";
pub const CREATE_STORY_PATH: &str = "/api/story/create";
pub const STORIES_PATH: &str = "/api/story/get";
pub const TRANSCRIBE_PATH: &str = "/api/transcribe-audio";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error! status: {0}")]
    Status(u16),

    #[error("backend reported an error: {0}")]
    Remote(String),

    #[error("returned an empty value")]
    EmptyPayload,

    #[error("unexpected payload: {0}")]
    Decode(#[from] serde_json::Error),
}

#[cfg(target_arch = "wasm32")]
pub trait BackendBounds {}
#[cfg(target_arch = "wasm32")]
impl<T> BackendBounds for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait BackendBounds: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync> BackendBounds for T {}

/// The story service. Every call answers with `{ "data": .. }` or
/// `{ "error": ".." }`; implementations return the unwrapped `data`.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait StoryBackend: BackendBounds {
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, BackendError>;
    async fn get_json(&self, path: &str) -> Result<Value, BackendError>;
    async fn post_audio(
        &self,
        path: &str,
        audio: Vec<u8>,
        file_name: &str,
    ) -> Result<Value, BackendError>;

    async fn fetch_all_stories(&self) -> Result<Vec<StoryRecord>, BackendError> {
        decode(self.get_json(STORIES_PATH).await?)
    }

    async fn fetch_story(&self, id: &str) -> Result<StoryRecord, BackendError> {
        decode(self.get_json(&format!("{}/{}", STORIES_PATH, id)).await?)
    }

    /// Turns a voice recording into the topic text the user spoke.
    async fn transcribe_audio(&self, audio: Vec<u8>) -> Result<String, BackendError> {
        decode(self.post_audio(TRANSCRIBE_PATH, audio, "record.webm").await?)
    }
}

pub fn decode<T: DeserializeOwned>(data: Value) -> Result<T, BackendError> {
    Ok(serde_json::from_value(data)?)
}

/// Falsy payloads count as missing.
fn is_empty_payload(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

pub fn unwrap_envelope(mut body: Value) -> Result<Value, BackendError> {
    if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
        let message = match err.as_str() {
            Some(s) => s.to_string(),
            None => err.to_string(),
        };
        return Err(BackendError::Remote(message));
    }
    match body.get_mut("data").map(Value::take) {
        Some(data) if !is_empty_payload(&data) => Ok(data),
        _ => Err(BackendError::EmptyPayload),
    }
}

#[derive(Debug)]
pub struct HttpBackend {
    base_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let base = config.backend_endpoint.trim();
        if base.is_empty() {
            return Err(anyhow!("backend_endpoint is not configured"));
        }
        url::Url::parse(base).with_context(|| format!("Invalid backend_endpoint: {}", base))?;

        #[allow(unused_mut)]
        let mut builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        {
            if let Some(secs) = config.request_timeout_seconds {
                builder = builder.timeout(std::time::Duration::from_secs(secs));
            }
        }
        #[cfg(target_arch = "wasm32")]
        {
            if config.request_timeout_seconds.is_some() {
                log::warn!("request_timeout_seconds is ignored in the browser");
            }
        }

        Ok(Self {
            base_url: base.trim_end_matches('/').to_string(),
            client: builder.build().context("Failed to build HTTP client")?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_envelope(resp: reqwest::Response) -> Result<Value, BackendError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        let text = resp.text().await?;
        unwrap_envelope(serde_json::from_str(&text)?)
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl StoryBackend for HttpBackend {
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, BackendError> {
        debug!("POST {}", path);
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        Self::read_envelope(resp).await
    }

    async fn get_json(&self, path: &str) -> Result<Value, BackendError> {
        debug!("GET {}", path);
        let resp = self
            .client
            .get(self.url(path))
            .header("Content-Type", "application/json")
            .send()
            .await?;
        Self::read_envelope(resp).await
    }

    async fn post_audio(
        &self,
        path: &str,
        audio: Vec<u8>,
        file_name: &str,
    ) -> Result<Value, BackendError> {
        debug!("POST {} ({} bytes of audio)", path, audio.len());
        let part = multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("audio/webm")?;
        let form = multipart::Form::new().part("file", part);
        let resp = self.client.post(self.url(path)).multipart(form).send().await?;
        Self::read_envelope(resp).await
    }
}
