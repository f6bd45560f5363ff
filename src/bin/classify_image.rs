//! Classify images from the command line with the server's pipeline
//! Run with: cargo run --release --bin classify_image -- <image_path>...

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use image_classifier::{
    core::types::{ImageId, ImageSource, SubmittedImage},
    core::Config,
    orchestration::{Analyzer, SessionState},
    services::{build_classifier, GoogleTranslator, LabelTranslator},
    utils::Metrics,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("image_classifier=info,ort=off")
        .with_target(false)
        .init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("Usage: classify_image <image_path>...");
        std::process::exit(1);
    }

    let config = Config::new().context("Failed to load configuration")?;
    let metrics = Metrics::new();

    info!("Loading classifier {}", config.classifier.model_id);
    let classifier = build_classifier(&config.classifier)?;
    let translator = Arc::new(GoogleTranslator::new(
        &config.translation,
        None,
        Some(metrics.clone()),
    )?);
    let analyzer = Analyzer::new(
        classifier,
        LabelTranslator::new(translator, Some(metrics.clone())),
        metrics.clone(),
        config.display.thumbnail_max_width,
    );

    let mut images = Vec::with_capacity(paths.len());
    for (index, path) in paths.iter().enumerate() {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path))?;
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        let size = bytes.len();
        images.push(SubmittedImage {
            index,
            id: ImageId::from_upload(&name, size),
            source: ImageSource::Upload { name, size },
            bytes: Arc::new(bytes),
        });
    }

    let mut session = SessionState::new();
    let report = analyzer.analyze(&mut session, images).await?;

    println!("\n=== Results ===");
    for image in &report.images {
        println!("\n{} [{}]", image.image_caption, image.image_id);
        println!("  {}", image.heading);
        println!("  {}", image.caption);
        for line in &image.details {
            println!("    {:>7}  {} ({})", line.percent, line.translated, line.original);
        }
    }
    println!(
        "\n{} image(s) in {:.0} ms",
        report.total_images, report.processing_time_ms
    );

    Ok(())
}
