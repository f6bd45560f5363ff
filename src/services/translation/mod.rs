pub mod api_client;

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::warn;

use crate::core::errors::TranslationResult;
use crate::utils::Metrics;

pub use api_client::GoogleTranslator;

/// Free text in, translated text out
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> TranslationResult<String>;
}

/// Translates classifier labels. Never fails: each label is translated
/// independently and falls back to itself.
#[derive(Clone)]
pub struct LabelTranslator {
    translator: Arc<dyn Translator>,
    metrics: Option<Metrics>,
}

impl LabelTranslator {
    pub fn new(translator: Arc<dyn Translator>, metrics: Option<Metrics>) -> Self {
        Self {
            translator,
            metrics,
        }
    }

    /// Best-effort translation: any failure yields `label` itself
    pub async fn translate(&self, label: &str) -> String {
        match self.translator.translate(label).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!("Translation of {:?} failed, keeping original: {}", label, e);
                if let Some(ref m) = self.metrics {
                    m.record_translation_fallback();
                }
                label.to_string()
            }
        }
    }

    /// Translate several labels concurrently, preserving order
    pub async fn translate_all(&self, labels: &[&str]) -> Vec<String> {
        join_all(labels.iter().map(|label| self.translate(label))).await
    }
}
