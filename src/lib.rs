// Library exports for the image classification demo
//
// Classifier and translator sit behind traits; sessions, caching and
// presentation are plain library code driven by the axum handlers in `api`.

pub mod api;
pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{AnalysisError, ClassificationError, ConfigError, InputError, TranslationError},
    types::{AnalysisReport, CacheEntry, ChartRow, ImageId, ImageReport, Prediction, TOP_K},
};

pub use middleware::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use orchestration::{Analyzer, InputCollector, SessionState, SessionStore};

pub use services::{
    build_classifier, classify_emoji, format_report, GoogleTranslator, ImageClassifier,
    LabelTranslator, Translator,
};

pub use utils::Metrics;
