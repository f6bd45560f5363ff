// Presentation: turns a cached classification into what the page shows
//
// Formatting depends only on the cache entry, so a cache hit renders exactly
// what the original miss rendered.

pub mod emoji;
pub mod html;

use crate::core::types::{CacheEntry, ChartBar, DetailLine, ImageId, ImageReport};

pub use emoji::classify_emoji;

/// `0.92` → `"92.00%"`
pub fn format_percent(score: f32) -> String {
    format!("{:.2}%", score as f64 * 100.0)
}

pub fn format_report(
    index: usize,
    image_id: &ImageId,
    thumbnail_data_url: String,
    entry: &CacheEntry,
) -> ImageReport {
    let top = &entry.top_result;
    let emoji = classify_emoji(&top.label, top.score);

    ImageReport {
        index,
        image_id: image_id.clone(),
        image_caption: format!("Image #{}", index + 1),
        thumbnail_data_url,
        heading: format!("{} {}", emoji, entry.translated_label),
        emoji,
        caption: format!("({}) - confidence: {}", top.label, format_percent(top.score)),
        chart: entry
            .chart_data
            .iter()
            .map(|row| ChartBar {
                label: row.class.clone(),
                confidence: row.confidence,
            })
            .collect(),
        details: entry
            .chart_data
            .iter()
            .map(|row| DetailLine {
                translated: row.class.clone(),
                original: row.original.clone(),
                percent: format_percent(row.confidence),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ChartRow, Prediction};

    fn entry() -> CacheEntry {
        CacheEntry {
            top_result: Prediction::new("tabby, tabby cat", 0.92),
            chart_data: vec![
                ChartRow {
                    class: "얼룩 고양이".to_string(),
                    confidence: 0.92,
                    original: "tabby, tabby cat".to_string(),
                },
                ChartRow {
                    class: "이집트 고양이".to_string(),
                    confidence: 0.05,
                    original: "Egyptian cat".to_string(),
                },
            ],
            translated_label: "얼룩 고양이".to_string(),
        }
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.92), "92.00%");
        assert_eq!(format_percent(0.0), "0.00%");
        assert_eq!(format_percent(1.0), "100.00%");
        assert_eq!(format_percent(0.12345), "12.35%");
    }

    #[test]
    fn test_report_fields() {
        let report = format_report(0, &ImageId::from_upload("cat.png", 10), "data:".into(), &entry());
        assert_eq!(report.image_caption, "Image #1");
        assert_eq!(report.heading, "😎 🐱 얼룩 고양이");
        assert_eq!(report.caption, "(tabby, tabby cat) - confidence: 92.00%");
        assert_eq!(report.chart.len(), 2);
        assert_eq!(report.chart[1].label, "이집트 고양이");
        assert_eq!(report.details[1].original, "Egyptian cat");
        assert_eq!(report.details[1].percent, "5.00%");
    }

    #[test]
    fn test_report_is_deterministic() {
        let id = ImageId::from_upload("cat.png", 10);
        let a = format_report(2, &id, "data:x".into(), &entry());
        let b = format_report(2, &id, "data:x".into(), &entry());
        assert_eq!(a, b);
    }
}
