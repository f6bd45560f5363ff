// Analyzer: runs one interaction cycle over the submitted images

use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::core::errors::{AnalysisError, AnalysisResult, ClassificationError, ClassificationResult};
use crate::core::types::{
    AnalysisReport, CacheEntry, ChartRow, ImageId, ImageReport, SubmittedImage, TOP_K,
};
use crate::orchestration::session::SessionState;
use crate::services::classification::ImageClassifier;
use crate::services::presentation::format_report;
use crate::services::translation::LabelTranslator;
use crate::utils::{decode_image, thumbnail_data_url, Metrics};

pub struct Analyzer {
    classifier: Arc<dyn ImageClassifier>,
    labels: LabelTranslator,
    metrics: Metrics,
    thumbnail_max_width: u32,
}

impl Analyzer {
    pub fn new(
        classifier: Arc<dyn ImageClassifier>,
        labels: LabelTranslator,
        metrics: Metrics,
        thumbnail_max_width: u32,
    ) -> Self {
        Self {
            classifier,
            labels,
            metrics,
            thumbnail_max_width,
        }
    }

    pub fn backend_name(&self) -> String {
        self.classifier.backend_name()
    }

    /// Cached result for `id`, or classify + translate and store it.
    ///
    /// A hit makes no classifier or translator call. On a miss the top
    /// labels are translated one by one (failures keep the English label)
    /// and the translated top label is the first chart row's label.
    pub async fn get_or_compute(
        &self,
        state: &mut SessionState,
        id: &ImageId,
        image: &DynamicImage,
    ) -> ClassificationResult<Arc<CacheEntry>> {
        if let Some(entry) = state.get(id) {
            debug!("Cache hit for {}", id);
            self.metrics.record_cache_hit();
            return Ok(entry);
        }
        self.metrics.record_cache_miss();

        let start = Instant::now();
        let result = self.classifier.classify(image, TOP_K).await;
        self.metrics
            .record_classifier_call(result.is_ok(), start.elapsed());
        let predictions = result?;

        let top_result = predictions
            .first()
            .cloned()
            .ok_or(ClassificationError::EmptyResult)?;

        let originals: Vec<&str> = predictions.iter().map(|p| p.label.as_str()).collect();
        let translated = self.labels.translate_all(&originals).await;

        let chart_data: Vec<ChartRow> = predictions
            .iter()
            .zip(translated)
            .map(|(prediction, class)| ChartRow {
                class,
                confidence: prediction.score,
                original: prediction.label.clone(),
            })
            .collect();
        let translated_label = chart_data[0].class.clone();

        debug!(
            "Classified {} as {:?} ({:.4}) in {:.2}s",
            id,
            top_result.label,
            top_result.score,
            start.elapsed().as_secs_f64()
        );

        Ok(state.insert(
            id.clone(),
            CacheEntry {
                top_result,
                chart_data,
                translated_label,
            },
        ))
    }

    /// Analyze every submitted image in order.
    ///
    /// Entries computed before a failing image stay cached; the failing
    /// image aborts the rest of the cycle.
    #[instrument(skip(self, state, images), fields(total_images = images.len(), epoch = state.epoch()))]
    pub async fn analyze(
        &self,
        state: &mut SessionState,
        images: Vec<SubmittedImage>,
    ) -> AnalysisResult<AnalysisReport> {
        let start = Instant::now();
        let total_images = images.len();

        let mut reports = Vec::with_capacity(total_images);
        for submitted in images {
            match self.analyze_one(state, submitted).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!("Analysis stopped: {}", e);
                    self.metrics.record_interaction(false, reports.len());
                    return Err(e);
                }
            }
        }

        self.metrics.record_interaction(true, total_images);
        if total_images > 0 {
            info!(
                "Analyzed {} image(s) in {:.2}s ({} cached)",
                total_images,
                start.elapsed().as_secs_f64(),
                state.cached_results()
            );
        }

        Ok(AnalysisReport {
            epoch: state.epoch(),
            total_images,
            images: reports,
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    async fn analyze_one(
        &self,
        state: &mut SessionState,
        submitted: SubmittedImage,
    ) -> AnalysisResult<ImageReport> {
        let index = submitted.index;
        let max_width = self.thumbnail_max_width;
        let bytes = Arc::clone(&submitted.bytes);

        // Decoding happens before the cache lookup: unreadable bytes fail
        // even when an entry already exists under the same id
        let (image, data_url) = tokio::task::spawn_blocking(move || {
            let image = decode_image(&bytes)
                .map_err(|source| AnalysisError::DecodeFailed { index, source })?;
            let data_url = thumbnail_data_url(&image, max_width)
                .map_err(|source| AnalysisError::ThumbnailFailed { index, source })?;
            Ok::<_, AnalysisError>((image, data_url))
        })
        .await
        .map_err(|e| AnalysisError::TaskJoinFailed(e.to_string()))??;

        let entry = self
            .get_or_compute(state, &submitted.id, &image)
            .await
            .map_err(|source| AnalysisError::ClassificationFailed { index, source })?;

        Ok(format_report(index, &submitted.id, data_url, &entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ImageSource, Prediction};
    use crate::services::classification::testing::StubClassifier;
    use crate::services::translation::testing::StubTranslator;
    use crate::utils::image_ops::solid_png;

    struct Fixture {
        analyzer: Analyzer,
        classifier: Arc<StubClassifier>,
        translator: Arc<StubTranslator>,
        metrics: Metrics,
    }

    fn fixture(classifier: StubClassifier, translator: StubTranslator) -> Fixture {
        let classifier = Arc::new(classifier);
        let translator = Arc::new(translator);
        let metrics = Metrics::new();
        let analyzer = Analyzer::new(
            classifier.clone(),
            LabelTranslator::new(translator.clone(), Some(metrics.clone())),
            metrics.clone(),
            64,
        );
        Fixture {
            analyzer,
            classifier,
            translator,
            metrics,
        }
    }

    fn korean() -> StubTranslator {
        StubTranslator::with_dictionary(&[
            ("tabby, tabby cat", "얼룩 고양이"),
            ("Egyptian cat", "이집트 고양이"),
        ])
    }

    fn upload(index: usize, name: &str, bytes: Vec<u8>) -> SubmittedImage {
        let size = bytes.len();
        SubmittedImage {
            index,
            id: ImageId::from_upload(name, size),
            source: ImageSource::Upload {
                name: name.to_string(),
                size,
            },
            bytes: Arc::new(bytes),
        }
    }

    #[tokio::test]
    async fn test_tabby_end_to_end() {
        let f = fixture(StubClassifier::tabby(), korean());
        let mut state = SessionState::new();

        let report = f
            .analyzer
            .analyze(&mut state, vec![upload(0, "cat.png", solid_png(8, 8, [120, 90, 60]))])
            .await
            .unwrap();

        assert_eq!(report.total_images, 1);
        let image = &report.images[0];
        assert!(image.heading.starts_with("😎 🐱"));
        assert_eq!(image.heading, "😎 🐱 얼룩 고양이");
        assert!(image.caption.contains("92.00%"));
        assert!(image.thumbnail_data_url.starts_with("data:image/png;base64,"));
        assert_eq!(image.chart.len(), 5);
        assert_eq!(image.chart[4].label, "[ko] carton");

        let total: f32 = image.chart.iter().map(|b| b.confidence).sum();
        assert!((total - 0.99).abs() < 1e-4);

        // Five labels, one call each; no extra call for the top label
        assert_eq!(f.translator.calls(), 5);
    }

    #[tokio::test]
    async fn test_second_pass_is_served_from_cache() {
        let f = fixture(StubClassifier::tabby(), korean());
        let mut state = SessionState::new();
        let png = solid_png(8, 8, [10, 20, 30]);

        let first = f
            .analyzer
            .analyze(&mut state, vec![upload(0, "cat.png", png.clone())])
            .await
            .unwrap();
        let second = f
            .analyzer
            .analyze(&mut state, vec![upload(0, "cat.png", png)])
            .await
            .unwrap();

        assert_eq!(f.classifier.calls(), 1);
        assert_eq!(f.translator.calls(), 5);
        assert_eq!(first.images, second.images);

        let snapshot = f.metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_reset_forces_recompute() {
        let f = fixture(StubClassifier::tabby(), korean());
        let mut state = SessionState::new();
        let png = solid_png(8, 8, [10, 20, 30]);

        f.analyzer
            .analyze(&mut state, vec![upload(0, "cat.png", png.clone())])
            .await
            .unwrap();
        state.reset();
        f.analyzer
            .analyze(&mut state, vec![upload(0, "cat.png", png)])
            .await
            .unwrap();

        assert_eq!(f.classifier.calls(), 2);
    }

    #[tokio::test]
    async fn test_decode_failure_keeps_earlier_entries() {
        let f = fixture(StubClassifier::tabby(), korean());
        let mut state = SessionState::new();

        let err = f
            .analyzer
            .analyze(
                &mut state,
                vec![
                    upload(0, "cat.png", solid_png(8, 8, [1, 2, 3])),
                    upload(1, "broken.png", b"not an image".to_vec()),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::DecodeFailed { index: 1, .. }));
        assert!(err.is_client_error());
        assert_eq!(state.cached_results(), 1);
        assert_eq!(f.metrics.snapshot().interactions_failed, 1);
    }

    #[tokio::test]
    async fn test_failing_translator_keeps_english_labels() {
        let f = fixture(StubClassifier::tabby(), StubTranslator::failing());
        let mut state = SessionState::new();

        let report = f
            .analyzer
            .analyze(&mut state, vec![upload(0, "cat.png", solid_png(4, 4, [0, 0, 0]))])
            .await
            .unwrap();

        let image = &report.images[0];
        assert_eq!(image.heading, "😎 🐱 tabby, tabby cat");
        assert_eq!(image.details[1].translated, "Egyptian cat");
        assert_eq!(f.metrics.snapshot().translation_fallbacks, 5);
    }

    #[tokio::test]
    async fn test_classifier_failure_caches_nothing() {
        let f = fixture(StubClassifier::failing(), korean());
        let mut state = SessionState::new();

        let err = f
            .analyzer
            .analyze(&mut state, vec![upload(0, "cat.png", solid_png(4, 4, [0, 0, 0]))])
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::ClassificationFailed { index: 0, .. }));
        assert!(!err.is_client_error());
        assert_eq!(state.cached_results(), 0);
        assert_eq!(f.translator.calls(), 0);
    }

    #[tokio::test]
    async fn test_low_confidence_unknown_label() {
        let f = fixture(
            StubClassifier::new(vec![
                Prediction::new("carton", 0.3),
                Prediction::new("envelope", 0.2),
            ]),
            StubTranslator::with_dictionary(&[("carton", "상자")]),
        );
        let mut state = SessionState::new();

        let report = f
            .analyzer
            .analyze(&mut state, vec![upload(0, "box.jpg", solid_png(4, 4, [9, 9, 9]))])
            .await
            .unwrap();

        assert_eq!(report.images[0].heading, "🧐 📷 상자");
        assert_eq!(report.images[0].chart.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_submission() {
        let f = fixture(StubClassifier::tabby(), korean());
        let mut state = SessionState::new();

        let report = f.analyzer.analyze(&mut state, Vec::new()).await.unwrap();
        assert_eq!(report.total_images, 0);
        assert!(report.images.is_empty());
        assert_eq!(f.classifier.calls(), 0);
    }
}
