// Image classification backends
//
// The model itself is a black box: anything that turns a decoded image into
// ranked `{label, score}` records can sit behind `ImageClassifier`.

pub mod hub;
pub mod onnx;

use anyhow::Result;
use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;

use crate::core::config::{ClassifierBackend, ClassifierConfig};
use crate::core::errors::ClassificationResult;
use crate::core::types::Prediction;

pub use hub::HubClassifier;
pub use onnx::OnnxClassifier;

#[async_trait]
pub trait ImageClassifier: Send + Sync {
    /// Up to `top_k` predictions, highest score first
    async fn classify(
        &self,
        image: &DynamicImage,
        top_k: usize,
    ) -> ClassificationResult<Vec<Prediction>>;

    /// Human-readable backend description for logs and `/health`
    fn backend_name(&self) -> String;
}

/// Sort by descending score and keep the first `top_k`. Scores are passed
/// through untouched: no renormalisation.
pub fn rank_predictions(mut predictions: Vec<Prediction>, top_k: usize) -> Vec<Prediction> {
    predictions.sort_by(|a, b| b.score.total_cmp(&a.score));
    predictions.truncate(top_k);
    predictions
}

/// Build the classifier selected by `CLASSIFIER_BACKEND`
pub fn build_classifier(config: &ClassifierConfig) -> Result<Arc<dyn ImageClassifier>> {
    let classifier: Arc<dyn ImageClassifier> = match config.backend {
        ClassifierBackend::Onnx => Arc::new(OnnxClassifier::load(config)?),
        ClassifierBackend::Hub => Arc::new(HubClassifier::new(config)?),
    };
    Ok(classifier)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::errors::ClassificationError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed prediction list (or an error) and counts calls
    pub struct StubClassifier {
        predictions: Vec<Prediction>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubClassifier {
        pub fn new(predictions: Vec<Prediction>) -> Self {
            Self {
                predictions,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                predictions: Vec::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }

        /// tabby 0.92, Egyptian cat 0.05, then three small tails
        pub fn tabby() -> Self {
            Self::new(vec![
                Prediction::new("tabby, tabby cat", 0.92),
                Prediction::new("Egyptian cat", 0.05),
                Prediction::new("tiger cat", 0.015),
                Prediction::new("lynx, catamount", 0.004),
                Prediction::new("carton", 0.001),
            ])
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageClassifier for StubClassifier {
        async fn classify(
            &self,
            _image: &DynamicImage,
            top_k: usize,
        ) -> ClassificationResult<Vec<Prediction>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ClassificationError::TaskFailed("stub failure".to_string()));
            }
            Ok(rank_predictions(self.predictions.clone(), top_k))
        }

        fn backend_name(&self) -> String {
            "stub".to_string()
        }
    }
}
