//! redact - obscure sensitive regions in still images
//!
//! This tool:
//! 1. Loads the redaction config (`REDACT_CONFIG` + `REDACT_*` env overrides)
//! 2. Brings up a detector (ONNX model, or a detections sidecar for replays)
//! 3. Decodes each input image and runs it through the pipeline
//! 4. Writes the redacted image to `--out` and prints detections as JSON lines

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use redact_kernel::{
    Detection, DetectorAdapter, Frame, LabelRegistry, Pipeline, ProcessRequest, RedactConfig,
    StubBackend,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Images to redact (any format the decoder supports: png, jpeg).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Directory for redacted output images.
    #[arg(long, default_value = "redacted")]
    out: PathBuf,
    /// Detect on the fast (smaller) working copy.
    #[arg(long)]
    fast: bool,
    /// Per-run confidence threshold override.
    #[arg(long)]
    confidence: Option<f32>,
    /// ONNX model path (requires the `backend-tract` feature).
    #[arg(long, env = "REDACT_MODEL_PATH")]
    model: Option<PathBuf>,
    /// JSON detections sidecar to replay instead of running a model.
    #[arg(long)]
    detections: Option<PathBuf>,
    /// Process inputs concurrently on the worker pool.
    #[arg(long)]
    batch: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Serialize)]
struct DetectionLine<'a> {
    input: String,
    frame_id: &'a str,
    detections: &'a [Detection],
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut config = {
        let _stage = ui.stage("Load config");
        RedactConfig::load()?
    };
    if let Some(model) = &args.model {
        config.detector.model_path = Some(model.clone());
    }

    let (pipeline, reference) = {
        let _stage = ui.stage("Load detector");
        let (adapter, reference) =
            build_adapter(&config, args.detections.as_deref(), &args.inputs[0])?;
        (Pipeline::new(config, adapter)?, reference)
    };

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create output dir {}", args.out.display()))?;

    let mut frames = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let decoded = image::open(input)
            .with_context(|| format!("failed to decode {}", input.display()))?;
        let frame = Frame::from_dynamic(decoded)?;
        if let Some(size) = reference.filter(|&size| size != frame.dimensions()) {
            log::warn!(
                "{} is {}x{} but the detections were drawn on {}x{}; boxes will be rescaled",
                input.display(),
                frame.width(),
                frame.height(),
                size.0,
                size.1
            );
        }
        let mut request = ProcessRequest::new().with_frame_id(frame.content_id());
        if let Some(threshold) = args.confidence {
            request = request.with_confidence_threshold(threshold);
        }
        if args.fast {
            request = request.fast();
        }
        frames.push((input.clone(), frame, request));
    }

    let progress = ui.frames(frames.len() as u64);
    if args.batch {
        let (inputs, jobs): (Vec<PathBuf>, Vec<(Frame, ProcessRequest)>) = frames
            .into_iter()
            .map(|(input, frame, request)| (input, (frame, request)))
            .unzip();
        let requests: Vec<ProcessRequest> = jobs.iter().map(|(_, r)| r.clone()).collect();
        let results = pipeline.process_batch(jobs);
        for ((input, request), redacted) in inputs.iter().zip(&requests).zip(results) {
            emit(&args.out, input, request, redacted.frame, &redacted.detections)?;
            progress.inc(1);
        }
    } else {
        for (input, frame, request) in frames {
            let redacted = pipeline.process(frame, &request);
            emit(&args.out, &input, &request, redacted.frame, &redacted.detections)?;
            progress.inc(1);
        }
    }
    progress.finish_and_clear();

    let stats = pipeline.stats();
    log::info!(
        "processed {} frames: avg {:.1}ms min {:.1}ms max {:.1}ms ({:.1} fps), {} cache hits, {} failures",
        stats.requests,
        stats.avg_ms,
        stats.min_ms,
        stats.max_ms,
        stats.fps,
        stats.cache_hits,
        stats.failures
    );
    if stats.failures > 0 {
        log::warn!(
            "{} frame(s) were written without redaction; see errors above",
            stats.failures
        );
    }
    Ok(())
}

/// Returns the adapter and, for sidecar replays, the image size the boxes
/// were drawn on. A bare sidecar is taken to describe the first input.
fn build_adapter(
    config: &RedactConfig,
    sidecar: Option<&Path>,
    first_input: &Path,
) -> Result<(DetectorAdapter, Option<(u32, u32)>)> {
    let labels = LabelRegistry::exposure();
    if let Some(path) = sidecar {
        log::info!("replaying detections from {}", path.display());
        let mut stub = StubBackend::from_json_file(path)?;
        if stub.reference_size().is_none() {
            let (width, height) = image::image_dimensions(first_input)
                .with_context(|| format!("failed to read size of {}", first_input.display()))?;
            log::info!(
                "sidecar has no width/height; using {}x{} from {}",
                width,
                height,
                first_input.display()
            );
            stub = stub.with_reference_size(width, height);
        }
        let reference = stub.reference_size();
        return Ok((DetectorAdapter::new(stub, labels), reference));
    }
    match &config.detector.model_path {
        Some(model_path) => Ok((load_model(config, model_path, labels)?, None)),
        None => Err(anyhow!(
            "no detector: pass --model (or REDACT_MODEL_PATH) or --detections"
        )),
    }
}

#[cfg(feature = "backend-tract")]
fn load_model(config: &RedactConfig, model_path: &Path, labels: LabelRegistry) -> Result<DetectorAdapter> {
    let backend = redact_kernel::TractBackend::new(model_path, config.detector.input_size)
        .map_err(|e| redact_kernel::RedactError::ModelNotReady(format!("{:#}", e)))?
        .with_nms_threshold(config.detector.nms_threshold);
    Ok(DetectorAdapter::new(backend, labels))
}

#[cfg(not(feature = "backend-tract"))]
fn load_model(_config: &RedactConfig, model_path: &Path, _labels: LabelRegistry) -> Result<DetectorAdapter> {
    Err(redact_kernel::RedactError::ModelNotReady(format!(
        "cannot load {}: built without the backend-tract feature",
        model_path.display()
    ))
    .into())
}

fn emit(
    out_dir: &Path,
    input: &Path,
    request: &ProcessRequest,
    frame: Frame,
    detections: &[Detection],
) -> Result<()> {
    let name = input
        .file_name()
        .ok_or_else(|| anyhow!("input {} has no file name", input.display()))?;
    let target = out_dir.join(name);
    frame
        .into_image()
        .save(&target)
        .with_context(|| format!("failed to write {}", target.display()))?;

    let line = DetectionLine {
        input: input.display().to_string(),
        frame_id: request.frame_id.as_deref().unwrap_or(""),
        detections,
    };
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}
