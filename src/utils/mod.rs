pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{decode_image, encode_png, file_extension, thumbnail, thumbnail_data_url};
pub use metrics::{Metrics, MetricsSnapshot};
