// Local ViT classifier on ONNX Runtime
//
// Expects an image-classification export (e.g. `optimum-cli export onnx
// --model google/vit-base-patch16-224`) with a single NCHW float input and a
// `[1, num_labels]` logits output.

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::core::config::ClassifierConfig;
use crate::core::errors::{ClassificationError, ClassificationResult};
use crate::core::types::Prediction;
use crate::services::classification::{rank_predictions, ImageClassifier};
use crate::services::onnx_builder::build_session;

/// ViT image processor normalisation (mean = std = 0.5 on every channel)
const NORM_MEAN: f32 = 0.5;
const NORM_STD: f32 = 0.5;

pub struct OnnxClassifier {
    inner: Arc<OnnxInner>,
    model_id: String,
    backend: String,
}

struct OnnxInner {
    session: Mutex<Session>,
    input_name: String,
    labels: Vec<String>,
    input_size: u32,
}

impl OnnxClassifier {
    /// Load the model file and its label map from disk
    pub fn load(config: &ClassifierConfig) -> Result<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(ClassificationError::ModelNotFound(config.model_path.clone()).into());
        }

        let labels = load_labels(Path::new(&config.labels_path))?;

        let model_bytes = std::fs::read(model_path)
            .with_context(|| format!("Failed to read model {}", model_path.display()))?;
        info!(
            "Loading {} from {} ({:.1} MB, {} labels)",
            config.model_id,
            model_path.display(),
            model_bytes.len() as f64 / 1_048_576.0,
            labels.len()
        );

        let (backend, session) = build_session(
            &model_bytes,
            &config.model_id,
            config.inference_backend.as_deref(),
        )?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .context("Model has no inputs")?;
        debug!("Model input tensor: {}", input_name);

        Ok(Self {
            inner: Arc::new(OnnxInner {
                session: Mutex::new(session),
                input_name,
                labels,
                input_size: config.input_size,
            }),
            model_id: config.model_id.clone(),
            backend,
        })
    }
}

#[async_trait]
impl ImageClassifier for OnnxClassifier {
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    async fn classify(
        &self,
        image: &DynamicImage,
        top_k: usize,
    ) -> ClassificationResult<Vec<Prediction>> {
        let inner = Arc::clone(&self.inner);
        let image = image.clone();

        tokio::task::spawn_blocking(move || inner.run(&image, top_k))
            .await
            .map_err(|e| ClassificationError::TaskFailed(e.to_string()))?
    }

    fn backend_name(&self) -> String {
        format!("onnx:{} ({})", self.model_id, self.backend)
    }
}

impl OnnxInner {
    fn run(&self, image: &DynamicImage, top_k: usize) -> ClassificationResult<Vec<Prediction>> {
        let input = preprocess(image, self.input_size);
        let input_value = Value::from_array(input)?;

        let logits = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![self.input_name.as_str() => input_value])?;
            let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
            let dims: &[i64] = shape.as_ref();
            check_output_shape(dims, self.labels.len())?;
            data.to_vec()
        };

        let predictions = softmax(&logits)
            .into_iter()
            .zip(self.labels.iter())
            .map(|(score, label)| Prediction::new(label.clone(), score))
            .collect();

        let ranked = rank_predictions(predictions, top_k);
        if ranked.is_empty() {
            return Err(ClassificationError::EmptyResult);
        }
        Ok(ranked)
    }
}

/// Bilinear resize to `size`×`size`, RGB, scaled to [0,1] then normalised,
/// laid out as `[1, 3, size, size]`.
fn preprocess(image: &DynamicImage, size: u32) -> Array4<f32> {
    let rgb = image
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();
    let side = size as usize;

    Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        let pixel = rgb.get_pixel(x as u32, y as u32);
        (pixel[c] as f32 / 255.0 - NORM_MEAN) / NORM_STD
    })
}

/// Logits must come as `[1, num_labels]`
fn check_output_shape(dims: &[i64], num_labels: usize) -> ClassificationResult<()> {
    match dims {
        [1, n] if *n as usize == num_labels => Ok(()),
        [1, n] => Err(ClassificationError::LabelMismatch {
            logits: *n as usize,
            labels: num_labels,
        }),
        other => Err(ClassificationError::UnexpectedOutput(format!(
            "expected [1, {}], got {:?}",
            num_labels, other
        ))),
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Labels from a Hugging Face `config.json` (`id2label`) or, for any other
/// extension, a text file with one label per line in class-index order.
fn load_labels(path: &Path) -> ClassificationResult<Vec<String>> {
    let unavailable = |reason: String| ClassificationError::LabelsUnavailable {
        path: path.display().to_string(),
        reason,
    };

    let content = std::fs::read_to_string(path).map_err(|e| unavailable(e.to_string()))?;

    let labels = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        parse_id2label(&content).map_err(unavailable)?
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    };

    if labels.is_empty() {
        return Err(unavailable("no labels found".to_string()));
    }
    Ok(labels)
}

fn parse_id2label(content: &str) -> Result<Vec<String>, String> {
    #[derive(serde::Deserialize)]
    struct ModelConfig {
        id2label: BTreeMap<String, String>,
    }

    let config: ModelConfig = serde_json::from_str(content).map_err(|e| e.to_string())?;

    let mut indexed = Vec::with_capacity(config.id2label.len());
    for (id, label) in config.id2label {
        let id: usize = id
            .parse()
            .map_err(|_| format!("non-numeric class id {:?}", id))?;
        indexed.push((id, label));
    }
    indexed.sort_by_key(|(id, _)| *id);

    for (expected, (id, _)) in indexed.iter().enumerate() {
        if *id != expected {
            return Err(format!("class ids are not contiguous: missing {}", expected));
        }
    }

    Ok(indexed.into_iter().map(|(_, label)| label).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one_and_keeps_order() {
        let probs = softmax(&[2.0, 1.0, 0.1]);
        let total: f32 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            31,
            17,
            image::Rgb([255, 0, 128]),
        ));
        let tensor = preprocess(&img, 8);
        assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-5);
        assert!((tensor[[0, 1, 4, 4]] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_output_shape_check() {
        assert!(check_output_shape(&[1, 1000], 1000).is_ok());
        assert!(matches!(
            check_output_shape(&[1, 21843], 1000),
            Err(ClassificationError::LabelMismatch { logits: 21843, labels: 1000 })
        ));
        assert!(matches!(
            check_output_shape(&[2, 1000], 1000),
            Err(ClassificationError::UnexpectedOutput(_))
        ));
        assert!(matches!(
            check_output_shape(&[1, 197, 768], 1000),
            Err(ClassificationError::UnexpectedOutput(_))
        ));
    }

    #[test]
    fn test_id2label_is_ordered_numerically() {
        let json = r#"{"id2label": {"10": "k", "2": "c", "0": "a", "1": "b", "3": "d",
            "4": "e", "5": "f", "6": "g", "7": "h", "8": "i", "9": "j"}}"#;
        let labels = parse_id2label(json).unwrap();
        assert_eq!(labels.len(), 11);
        assert_eq!(labels[2], "c");
        assert_eq!(labels[10], "k");
    }

    #[test]
    fn test_id2label_rejects_gaps() {
        let json = r#"{"id2label": {"0": "a", "2": "c"}}"#;
        assert!(parse_id2label(json).is_err());
    }

    #[test]
    fn test_missing_model_file() {
        let mut config = crate::core::Config::for_tests().classifier;
        config.model_path = "does/not/exist.onnx".to_string();
        let err = OnnxClassifier::load(&config).err().unwrap();
        assert!(err.to_string().contains("does/not/exist.onnx"));
    }
}
