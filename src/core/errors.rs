// Custom error types for the classification service
//
// Using thiserror so each layer keeps its own error vocabulary while
// handlers can still match on the variant to choose a status code.

use thiserror::Error;

/// Classifier backend errors
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("ONNX inference failed: {0}")]
    InferenceFailed(#[from] ort::Error),

    #[error("Model output has unexpected shape: {0}")]
    UnexpectedOutput(String),

    #[error("Model file not found at {0}")]
    ModelNotFound(String),

    #[error("Failed to load labels from {path}: {reason}")]
    LabelsUnavailable { path: String, reason: String },

    #[error("Model produced {logits} scores but {labels} labels are configured")]
    LabelMismatch { logits: usize, labels: usize },

    #[error("Inference API request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Inference API returned {status}: {body}")]
    ApiStatus { status: u16, body: String },

    #[error("Classifier returned no predictions")]
    EmptyResult,

    #[error("Inference task failed: {0}")]
    TaskFailed(String),
}

/// Translation errors. None of these ever reach the user: the label
/// translator substitutes the original text instead.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Translation request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Translation API returned {status}")]
    ApiStatus { status: u16 },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Text length {0} is outside the accepted range (1..=5000)")]
    InvalidLength(usize),

    #[error("Circuit breaker is open, translation API is unavailable")]
    CircuitOpen,
}

/// Problems with the submitted images themselves
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Multipart error: {0}")]
    Multipart(String),

    #[error("File type not allowed: {file_name} (allowed: {allowed})")]
    ExtensionNotAllowed { file_name: String, allowed: String },

    #[error("Empty upload: {0}")]
    EmptyUpload(String),
}

/// Failure of one interaction cycle, tagged with the image it happened on
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Image #{} could not be decoded: {source}", .index + 1)]
    DecodeFailed {
        index: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("Classification failed for image #{}: {source}", .index + 1)]
    ClassificationFailed {
        index: usize,
        #[source]
        source: ClassificationError,
    },

    #[error("Thumbnail encoding failed for image #{}: {source}", .index + 1)]
    ThumbnailFailed {
        index: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("Image task join failed: {0}")]
    TaskJoinFailed(String),
}

impl AnalysisError {
    /// Whether the failure is the client's fault (bad bytes) rather than ours
    pub fn is_client_error(&self) -> bool {
        matches!(self, AnalysisError::DecodeFailed { .. })
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown classifier backend: {0} (expected 'onnx' or 'hub')")]
    UnknownClassifierBackend(String),

    #[error("Model input size must be between 32 and 1024, got {0}")]
    InvalidInputSize(u32),

    #[error("Invalid translation config: {0}")]
    InvalidTranslationConfig(String),

    #[error("Upload limit must be > 0 MB, got {0}")]
    InvalidUploadLimit(usize),

    #[error("Invalid display config: {0}")]
    InvalidDisplayConfig(String),

    #[error("Invalid session config: {0}")]
    InvalidSessionConfig(String),
}

pub type ClassificationResult<T> = Result<T, ClassificationError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type AnalysisResult<T> = Result<T, AnalysisError>;
