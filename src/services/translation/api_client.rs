use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::core::config::TranslationConfig;
use crate::core::errors::{TranslationError, TranslationResult};
use crate::middleware::circuit_breaker::CircuitBreaker;
use crate::services::translation::Translator;
use crate::utils::Metrics;

/// Longest input the web endpoint accepts
const MAX_CHARS: usize = 5000;

/// Client for the Google web translation endpoint, guarded by a circuit
/// breaker. Source language is auto-detected by default.
pub struct GoogleTranslator {
    http_client: reqwest::Client,
    endpoint: String,
    source: String,
    target: String,
    circuit_breaker: CircuitBreaker,
    metrics: Option<Metrics>,
}

impl GoogleTranslator {
    pub fn new(
        config: &TranslationConfig,
        circuit_breaker: Option<CircuitBreaker>,
        metrics: Option<Metrics>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(4)
            .build()
            .context("Failed to create translation HTTP client")?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            source: config.source_language.clone(),
            target: config.target_language.clone(),
            circuit_breaker: circuit_breaker.unwrap_or_default(),
            metrics,
        })
    }

    async fn request(&self, text: &str) -> TranslationResult<String> {
        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", self.source.as_str()),
                ("tl", self.target.as_str()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslationError::ApiStatus {
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = response.json().await?;
        parse_translation(&body)
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    #[instrument(skip(self), fields(target = %self.target))]
    async fn translate(&self, text: &str) -> TranslationResult<String> {
        let trimmed = text.trim();
        let length = trimmed.chars().count();
        if length > MAX_CHARS {
            return Err(TranslationError::InvalidLength(length));
        }
        if trimmed.is_empty() || self.source == self.target {
            return Ok(text.to_string());
        }

        if !self.circuit_breaker.allow_request() {
            debug!("Circuit breaker is open, skipping translation request");
            return Err(TranslationError::CircuitOpen);
        }

        let start = Instant::now();
        let result = self.request(trimmed).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => self.circuit_breaker.record_success(),
            Err(e) => {
                warn!("Translation request failed: {}", e);
                self.circuit_breaker.record_failure();
            }
        }
        if let Some(ref m) = self.metrics {
            m.record_translation_call(result.is_ok(), duration);
        }

        result
    }
}

/// The endpoint answers with nested arrays; the first element holds one
/// `[translated, original, ...]` segment per sentence.
fn parse_translation(body: &serde_json::Value) -> TranslationResult<String> {
    let segments = body
        .get(0)
        .and_then(|s| s.as_array())
        .ok_or_else(|| TranslationError::InvalidResponse("missing segment list".to_string()))?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(|t| t.as_str()))
        .collect();

    if translated.trim().is_empty() {
        return Err(TranslationError::InvalidResponse(
            "empty translation".to_string(),
        ));
    }

    Ok(translated.trim().to_string())
}
