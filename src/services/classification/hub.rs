use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use image::DynamicImage;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::config::ClassifierConfig;
use crate::core::errors::{ClassificationError, ClassificationResult};
use crate::core::types::Prediction;
use crate::services::classification::{rank_predictions, ImageClassifier};
use crate::utils::encode_png;

/// Hosted inference API client (Hugging Face `image-classification` task).
/// The API answers with the same `[{label, score}]` records the local
/// backend produces.
pub struct HubClassifier {
    http_client: reqwest::Client,
    url: String,
    model_id: String,
    api_token: Option<String>,
}

impl HubClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create inference HTTP client")?;

        Ok(Self {
            http_client,
            url: format!(
                "{}/{}",
                config.hub_endpoint.trim_end_matches('/'),
                config.model_id
            ),
            model_id: config.model_id.clone(),
            api_token: config.hub_api_token.clone(),
        })
    }
}

#[async_trait]
impl ImageClassifier for HubClassifier {
    #[instrument(skip(self, image), fields(model = %self.model_id))]
    async fn classify(
        &self,
        image: &DynamicImage,
        top_k: usize,
    ) -> ClassificationResult<Vec<Prediction>> {
        let image = image.clone();
        let png = tokio::task::spawn_blocking(move || encode_png(&image))
            .await
            .map_err(|e| ClassificationError::TaskFailed(e.to_string()))?
            .map_err(|e| ClassificationError::TaskFailed(format!("PNG encoding failed: {}", e)))?;

        let body = serde_json::json!({
            "inputs": general_purpose::STANDARD.encode(&png),
            "parameters": { "top_k": top_k },
        });

        let mut request = self.http_client.post(&self.url).json(&body);
        if let Some(ref token) = self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassificationError::ApiStatus {
                status: status.as_u16(),
                body,
            });
        }

        let predictions: Vec<Prediction> = response.json().await?;
        debug!("Inference API returned {} predictions", predictions.len());

        let ranked = rank_predictions(predictions, top_k);
        if ranked.is_empty() {
            return Err(ClassificationError::EmptyResult);
        }
        Ok(ranked)
    }

    fn backend_name(&self) -> String {
        format!("hub:{}", self.model_id)
    }
}
