/// Confidence above this is shown as confident
const CONFIDENT_ABOVE: f32 = 0.8;
/// Confidence above this (and not confident) is shown as uncertain
const UNCERTAIN_ABOVE: f32 = 0.5;

const CONFIDENT: &str = "😎";
const UNCERTAIN: &str = "🤔";
const VERY_UNCERTAIN: &str = "🧐";
const GENERIC_ICON: &str = "📷";

/// Category keywords in priority order; the first category with a keyword
/// contained in the lowercased label wins.
const CATEGORIES: &[(&[&str], &str)] = &[
    (&["dog", "golden retriever", "poodle", "terrier"], "🐶"),
    (&["cat", "tabby"], "🐱"),
    (&["bird"], "🐦"),
    (&["fish", "shark"], "🐟"),
];

/// `"{tier} {icon}"` for a label and its confidence. Pure.
pub fn classify_emoji(label: &str, confidence: f32) -> String {
    format!("{} {}", confidence_marker(confidence), category_icon(label))
}

fn confidence_marker(confidence: f32) -> &'static str {
    if confidence > CONFIDENT_ABOVE {
        CONFIDENT
    } else if confidence > UNCERTAIN_ABOVE {
        UNCERTAIN
    } else {
        VERY_UNCERTAIN
    }
}

fn category_icon(label: &str) -> &'static str {
    let label = label.to_lowercase();
    CATEGORIES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| label.contains(k)))
        .map(|(_, icon)| *icon)
        .unwrap_or(GENERIC_ICON)
}
