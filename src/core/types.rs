// Shared data model: image identities, predictions, cache entries, reports

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Number of ranked labels requested from the classifier per image
pub const TOP_K: usize = 5;

/// Identifier a cache entry is stored under.
///
/// Uploads use `"{name}_{size}"`; camera captures use
/// `"camera_{epoch}_{index}"`. Camera ids are only stable while the epoch
/// and the capture's position in the submission stay the same.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn from_upload(name: &str, size: usize) -> Self {
        Self(format!("{}_{}", name, size))
    }

    pub fn from_camera(epoch: u64, index: usize) -> Self {
        Self(format!("camera_{}_{}", epoch, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a submitted image came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    Upload { name: String, size: usize },
    Camera,
}

/// One image of an interaction cycle, still undecoded
#[derive(Clone)]
pub struct SubmittedImage {
    /// Position in this interaction's image list (uploads first, then camera)
    pub index: usize,
    pub id: ImageId,
    pub source: ImageSource,
    pub bytes: Arc<Vec<u8>>,
}

impl fmt::Debug for SubmittedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmittedImage")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("source", &self.source)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// A single `{label, score}` record as produced by a classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// One chart row: translated label, confidence and the label it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRow {
    pub class: String,
    pub confidence: f32,
    pub original: String,
}

/// Memoized classification of one image. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub top_result: Prediction,
    pub chart_data: Vec<ChartRow>,
    pub translated_label: String,
}

/// A horizontal bar of the confidence chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartBar {
    pub label: String,
    pub confidence: f32,
}

/// Expandable detail line for one ranked label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailLine {
    pub translated: String,
    pub original: String,
    pub percent: String,
}

/// Everything shown for one image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageReport {
    pub index: usize,
    pub image_id: ImageId,
    pub image_caption: String,
    pub thumbnail_data_url: String,
    pub emoji: String,
    pub heading: String,
    pub caption: String,
    pub chart: Vec<ChartBar>,
    pub details: Vec<DetailLine>,
}

/// Result of one interaction cycle
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub epoch: u64,
    pub total_images: usize,
    pub images: Vec<ImageReport>,
    pub processing_time_ms: f64,
}

/// Multipart field names for the current epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WidgetKeys {
    pub uploader: String,
    pub camera: String,
}

impl WidgetKeys {
    pub fn for_epoch(epoch: u64) -> Self {
        Self {
            uploader: format!("uploader_{}", epoch),
            camera: format!("camera_{}", epoch),
        }
    }
}
