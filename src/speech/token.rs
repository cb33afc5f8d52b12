//! Short-lived speech token fetch with client-side caching.
//!
//! Tokens are valid for a few minutes; the client caches the last one and
//! refreshes only when it is about to go stale.

use crate::config::SpeechConfig;
use crate::error::SpeechError;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Headroom subtracted from the issued lifetime so a token is never handed
/// out moments before it expires.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechToken {
    pub token: String,
    pub region: String,
}

#[derive(Debug)]
struct CachedToken {
    value: SpeechToken,
    fetched_at: Instant,
}

pub struct SpeechTokenClient {
    http: Client,
    base_url: String,
    max_age: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl SpeechTokenClient {
    pub fn new(base_url: impl Into<String>, token_ttl: Duration) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            max_age: token_ttl.saturating_sub(REFRESH_MARGIN),
            cached: Mutex::new(None),
        }
    }

    pub fn from_settings(config: &SpeechConfig) -> Self {
        Self::new(
            config.token_endpoint.clone(),
            Duration::from_secs(config.token_ttl_secs),
        )
    }

    /// Current token, served from cache while fresh.
    pub async fn get(&self) -> Result<SpeechToken, SpeechError> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.fetched_at.elapsed() < self.max_age {
                return Ok(entry.value.clone());
            }
        }

        let url = format!("{}/get-speech-token", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SpeechError::TokenFetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SpeechError::TokenFetch(format!(
                "status {}",
                response.status()
            )));
        }
        let value: SpeechToken = response
            .json()
            .await
            .map_err(|e| SpeechError::TokenFetch(e.to_string()))?;

        tracing::debug!(region = %value.region, "refreshed speech token");
        *cached = Some(CachedToken {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }
}
