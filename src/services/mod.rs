pub mod classification;
pub mod onnx_builder;
pub mod presentation;
pub mod translation;

// Re-export commonly used services
pub use classification::{build_classifier, HubClassifier, ImageClassifier, OnnxClassifier};
pub use presentation::{classify_emoji, format_report};
pub use translation::{GoogleTranslator, LabelTranslator, Translator};
