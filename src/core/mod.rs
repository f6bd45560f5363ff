pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::{ClassifierBackend, Config};
pub use errors::{
    AnalysisError, ClassificationError, ConfigError, InputError, TranslationError,
};
pub use types::{
    AnalysisReport, CacheEntry, ChartBar, ChartRow, DetailLine, ImageId, ImageReport,
    ImageSource, Prediction, SubmittedImage, WidgetKeys, TOP_K,
};
