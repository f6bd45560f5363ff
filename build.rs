use std::env;

fn main() {
    // The model is loaded at runtime; only point out a missing default
    let model_path = env::var("MODEL_PATH")
        .unwrap_or_else(|_| "models/vit-base-patch16-224.onnx".to_string());

    println!("cargo:rerun-if-env-changed=MODEL_PATH");
    println!("cargo:rerun-if-changed={}", model_path);

    match std::fs::metadata(&model_path) {
        Ok(meta) => println!(
            "cargo:warning=Classifier model: {} ({:.1} MB)",
            model_path,
            meta.len() as f64 / 1_048_576.0
        ),
        Err(_) => println!(
            "cargo:warning=Classifier model not found at {} (needed at runtime unless CLASSIFIER_BACKEND=hub)",
            model_path
        ),
    }

    // Detect enabled acceleration features
    let mut enabled_features = Vec::new();

    if env::var("CARGO_FEATURE_CUDA").is_ok() {
        enabled_features.push("CUDA");
    }
    if env::var("CARGO_FEATURE_TENSORRT").is_ok() {
        enabled_features.push("TensorRT");
    }
    if env::var("CARGO_FEATURE_DIRECTML").is_ok() {
        enabled_features.push("DirectML");
    }
    if env::var("CARGO_FEATURE_COREML").is_ok() {
        enabled_features.push("CoreML");
    }
    if env::var("CARGO_FEATURE_OPENVINO").is_ok() {
        enabled_features.push("OpenVINO");
    }

    if !enabled_features.is_empty() {
        println!("cargo:warning=GPU acceleration enabled: {}", enabled_features.join(", "));
    }

    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("windows-gnu") && enabled_features.contains(&"CUDA") {
        println!("cargo:warning=WARNING: CUDA binaries may not be available for Windows GNU target");
        println!("cargo:warning=Consider using DirectML instead: cargo build --features directml");
    }
}
