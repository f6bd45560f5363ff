// ONNX Runtime session builder with hardware acceleration selection

use anyhow::{Context, Result};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info, warn};

#[cfg(feature = "tensorrt")]
use ort::execution_providers::TensorRTExecutionProvider;

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;

#[cfg(all(target_os = "macos", feature = "coreml"))]
use ort::execution_providers::CoreMLExecutionProvider;

#[cfg(all(target_os = "windows", feature = "directml"))]
use ort::execution_providers::DirectMLExecutionProvider;

#[cfg(feature = "openvino")]
use ort::execution_providers::OpenVINOExecutionProvider;

/// Intra-op threads for CPU inference. Windows is capped at 6 because
/// thread synchronization overhead dominates beyond that.
fn optimal_intra_op_threads() -> usize {
    let total_cores = num_cpus::get();

    #[cfg(target_os = "windows")]
    let optimal = std::cmp::min(6, total_cores).max(1);

    #[cfg(not(target_os = "windows"))]
    let optimal = total_cores.max(1);

    debug!("CPU threads: {} total cores, using {} for inference", total_cores, optimal);
    optimal
}

/// Build a session, trying the compiled-in accelerators in order of
/// preference (TensorRT, CUDA, CoreML, DirectML, OpenVINO) before CPU.
///
/// `forced_backend` (from `INFERENCE_BACKEND`) skips the probing and uses
/// only the named provider; `"AUTO"` behaves like `None`.
///
/// Returns `(backend_name, session)`.
pub fn build_session(
    model_bytes: &[u8],
    model_name: &str,
    forced_backend: Option<&str>,
) -> Result<(String, Session)> {
    if let Some(forced) = forced_backend.filter(|b| !b.eq_ignore_ascii_case("auto")) {
        info!("INFERENCE_BACKEND={}, forcing backend for {}", forced, model_name);
        return build_forced(forced, model_bytes, model_name);
    }

    #[cfg(feature = "tensorrt")]
    {
        if let Ok(session) = Session::builder()
            .and_then(|b| b.with_execution_providers([TensorRTExecutionProvider::default().build()]))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(optimal_intra_op_threads()))
            .and_then(|b| b.commit_from_memory(model_bytes))
        {
            info!("Using TensorRT acceleration for {}", model_name);
            return Ok(("TensorRT".to_string(), session));
        }
    }

    #[cfg(feature = "cuda")]
    {
        if let Ok(session) = Session::builder()
            .and_then(|b| b.with_execution_providers([CUDAExecutionProvider::default().build()]))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(optimal_intra_op_threads()))
            .and_then(|b| b.commit_from_memory(model_bytes))
        {
            info!("Using CUDA acceleration for {}", model_name);
            return Ok(("CUDA".to_string(), session));
        }
    }

    #[cfg(all(target_os = "macos", feature = "coreml"))]
    {
        if let Ok(session) = Session::builder()
            .and_then(|b| b.with_execution_providers([CoreMLExecutionProvider::default().build()]))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(optimal_intra_op_threads()))
            .and_then(|b| b.commit_from_memory(model_bytes))
        {
            info!("Using CoreML acceleration for {}", model_name);
            return Ok(("CoreML".to_string(), session));
        }
    }

    #[cfg(all(target_os = "windows", feature = "directml"))]
    {
        // DirectML needs sequential execution and no memory pattern
        if let Ok(session) = Session::builder()
            .and_then(|b| b.with_execution_providers([DirectMLExecutionProvider::default().build()]))
            .and_then(|b| b.with_parallel_execution(false))
            .and_then(|b| b.with_memory_pattern(false))
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level1))
            .and_then(|b| b.commit_from_memory(model_bytes))
        {
            info!("Using DirectML acceleration for {}", model_name);
            return Ok(("DirectML".to_string(), session));
        }
    }

    #[cfg(feature = "openvino")]
    {
        if let Ok(session) = Session::builder()
            .and_then(|b| {
                b.with_execution_providers([OpenVINOExecutionProvider::default()
                    .with_device_type("CPU")
                    .build()])
            })
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(optimal_intra_op_threads()))
            .and_then(|b| b.commit_from_memory(model_bytes))
        {
            info!("Using OpenVINO acceleration for {}", model_name);
            return Ok(("OpenVINO-CPU".to_string(), session));
        }
    }

    build_cpu(model_bytes, model_name)
}

fn build_cpu(model_bytes: &[u8], model_name: &str) -> Result<(String, Session)> {
    let session = Session::builder()
        .with_context(|| format!("Failed to create ONNX session builder for {}", model_name))?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .with_context(|| format!("Failed to configure CPU execution provider for {}", model_name))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(optimal_intra_op_threads())
        .context("Failed to set intra-op threads")?
        .commit_from_memory(model_bytes)
        .with_context(|| format!("Failed to load {} model", model_name))?;

    info!("Using CPU inference for {}", model_name);
    Ok(("CPU".to_string(), session))
}

fn build_forced(backend: &str, model_bytes: &[u8], model_name: &str) -> Result<(String, Session)> {
    match backend.to_uppercase().as_str() {
        "CPU" => build_cpu(model_bytes, model_name),

        #[cfg(feature = "cuda")]
        "CUDA" => {
            let session = Session::builder()?
                .with_execution_providers([CUDAExecutionProvider::default().build()])?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_memory(model_bytes)
                .with_context(|| format!("CUDA session for {} failed", model_name))?;
            Ok(("CUDA".to_string(), session))
        }

        #[cfg(feature = "tensorrt")]
        "TENSORRT" => {
            let session = Session::builder()?
                .with_execution_providers([TensorRTExecutionProvider::default().build()])?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .commit_from_memory(model_bytes)
                .with_context(|| format!("TensorRT session for {} failed", model_name))?;
            Ok(("TensorRT".to_string(), session))
        }

        #[cfg(all(target_os = "macos", feature = "coreml"))]
        "COREML" => {
            let session = Session::builder()?
                .with_execution_providers([CoreMLExecutionProvider::default().build()])?
                .commit_from_memory(model_bytes)
                .with_context(|| format!("CoreML session for {} failed", model_name))?;
            Ok(("CoreML".to_string(), session))
        }

        #[cfg(all(target_os = "windows", feature = "directml"))]
        "DIRECTML" => {
            let session = Session::builder()?
                .with_execution_providers([DirectMLExecutionProvider::default().build()])?
                .with_parallel_execution(false)?
                .with_memory_pattern(false)?
                .commit_from_memory(model_bytes)
                .with_context(|| format!("DirectML session for {} failed", model_name))?;
            Ok(("DirectML".to_string(), session))
        }

        #[cfg(feature = "openvino")]
        "OPENVINO" => {
            let session = Session::builder()?
                .with_execution_providers([OpenVINOExecutionProvider::default()
                    .with_device_type("CPU")
                    .build()])?
                .commit_from_memory(model_bytes)
                .with_context(|| format!("OpenVINO session for {} failed", model_name))?;
            Ok(("OpenVINO-CPU".to_string(), session))
        }

        other => {
            warn!(
                "INFERENCE_BACKEND={} is not compiled in, falling back to CPU for {}",
                other, model_name
            );
            build_cpu(model_bytes, model_name)
        }
    }
}
