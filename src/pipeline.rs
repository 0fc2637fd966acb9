//! Per-frame orchestration: cache -> downscale -> detect -> rectify -> select
//! -> composite -> cache.
//!
//! `Pipeline::process` never fails. Any per-frame error is logged and the caller
//! gets its frame back unmodified with no detections. `try_process` runs the
//! same steps but surfaces the error instead.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use crate::cache::TemporalCache;
use crate::composite::composite;
use crate::config::RedactConfig;
use crate::detect::{Detection, DetectorAdapter};
use crate::error::{RedactError, Result};
use crate::frame::Frame;
use crate::rectify::{downscale, rectify};
use crate::select::{select, RedactionRegion};

/// Number of recent processing times kept for statistics.
pub const STATS_WINDOW: usize = 100;

/// Per-call options. Never written back into shared configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessRequest {
    /// Opt-in cache key. `None` bypasses the cache entirely.
    pub frame_id: Option<String>,
    /// Replaces the configured threshold for this call only.
    pub confidence_threshold: Option<f32>,
    /// Use the fast resize factor for this call.
    pub fast_mode: bool,
}

impl ProcessRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame_id(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = Some(frame_id.into());
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    pub fn fast(mut self) -> Self {
        self.fast_mode = true;
        self
    }
}

/// Output of one `process` call.
#[derive(Debug)]
pub struct Redacted {
    /// The caller's frame with regions obscured in place, or the cached copy
    /// on a cache hit.
    pub frame: Frame,
    /// Regions that were redacted, in original-frame coordinates.
    pub detections: Vec<Detection>,
}

/// Snapshot of pipeline counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub requests: u64,
    pub cache_hits: u64,
    pub failures: u64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub fps: f64,
    pub cache_size: usize,
}

#[derive(Default)]
struct StatsWindow {
    requests: u64,
    cache_hits: u64,
    failures: u64,
    times: VecDeque<Duration>,
}

impl StatsWindow {
    fn record(&mut self, elapsed: Duration) {
        if self.times.len() == STATS_WINDOW {
            self.times.pop_front();
        }
        self.times.push_back(elapsed);
    }
}

enum Outcome {
    Cached(Frame, Vec<Detection>),
    Processed(Vec<Detection>),
}

pub struct Pipeline {
    config: RedactConfig,
    adapter: DetectorAdapter,
    cache: TemporalCache,
    workers: rayon::ThreadPool,
    stats: Mutex<StatsWindow>,
}

impl Pipeline {
    /// Validate `config` and bring the detector up.
    ///
    /// Fails with `ModelNotReady` if the backend has no model or its warm-up
    /// fails; no frame is accepted in that case.
    pub fn new(config: RedactConfig, adapter: DetectorAdapter) -> Result<Self> {
        config.validate().map_err(|err| match err.downcast::<RedactError>() {
            Ok(redact) => redact,
            Err(other) => RedactError::InvalidConfig(format!("{:#}", other)),
        })?;
        adapter.warm_up()?;
        let unknown = config.redact_classes.unknown_to(adapter.labels());
        if !unknown.is_empty() {
            log::warn!(
                "redact classes not produced by this detector: {}",
                unknown.join(", ")
            );
        }

        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(config.performance.max_workers)
            .thread_name(|idx| format!("redact-worker-{}", idx))
            .build()
            .map_err(|e| RedactError::InvalidConfig(format!("failed to build worker pool: {}", e)))?;
        let cache = TemporalCache::new(config.cache.ttl, config.cache.max_entries);

        log::info!(
            "pipeline ready: backend={} resize={} fast_resize={} threshold={} workers={}",
            adapter.backend_name(),
            config.performance.resize_factor,
            config.performance.fast_resize_factor,
            config.detector.confidence_threshold,
            config.performance.max_workers
        );
        Ok(Self {
            config,
            adapter,
            cache,
            workers,
            stats: Mutex::new(StatsWindow::default()),
        })
    }

    pub fn config(&self) -> &RedactConfig {
        &self.config
    }

    pub fn cache(&self) -> &TemporalCache {
        &self.cache
    }

    /// Redact `frame`, containing any failure.
    ///
    /// On error the original, unmodified frame is returned with an empty
    /// detection list and the error is logged.
    pub fn process(&self, frame: Frame, request: &ProcessRequest) -> Redacted {
        let started = Instant::now();
        let mut frame = frame;
        let result = self.run(&mut frame, request);
        let mut stats = self.stats_lock();
        stats.requests += 1;
        stats.record(started.elapsed());

        match result {
            Ok(Outcome::Cached(cached, detections)) => {
                stats.cache_hits += 1;
                Redacted {
                    frame: cached,
                    detections,
                }
            }
            Ok(Outcome::Processed(detections)) => Redacted { frame, detections },
            Err(err) => {
                stats.failures += 1;
                log::error!(
                    "frame {} passed through unredacted: {}",
                    request.frame_id.as_deref().unwrap_or("-"),
                    err
                );
                Redacted {
                    frame,
                    detections: Vec::new(),
                }
            }
        }
    }

    /// Same steps as `process`, but errors are returned to the caller.
    ///
    /// On error the frame is dropped; callers that need it back should use
    /// `process`.
    pub fn try_process(&self, frame: Frame, request: &ProcessRequest) -> Result<Redacted> {
        let mut frame = frame;
        Ok(match self.run(&mut frame, request)? {
            Outcome::Cached(cached, detections) => Redacted {
                frame: cached,
                detections,
            },
            Outcome::Processed(detections) => Redacted { frame, detections },
        })
    }

    /// Process independent frames on the worker pool. Output order matches input.
    pub fn process_batch(&self, frames: Vec<(Frame, ProcessRequest)>) -> Vec<Redacted> {
        self.workers.install(|| {
            frames
                .into_par_iter()
                .map(|(frame, request)| self.process(frame, &request))
                .collect()
        })
    }

    pub fn stats(&self) -> PipelineStats {
        let window = self.stats_lock();
        let mut snapshot = PipelineStats {
            requests: window.requests,
            cache_hits: window.cache_hits,
            failures: window.failures,
            cache_size: self.cache.len(),
            ..PipelineStats::default()
        };
        if !window.times.is_empty() {
            let millis: Vec<f64> = window
                .times
                .iter()
                .map(|t| t.as_secs_f64() * 1000.0)
                .collect();
            snapshot.avg_ms = millis.iter().sum::<f64>() / millis.len() as f64;
            snapshot.min_ms = millis.iter().copied().fold(f64::INFINITY, f64::min);
            snapshot.max_ms = millis.iter().copied().fold(0.0, f64::max);
            if snapshot.avg_ms > 0.0 {
                snapshot.fps = 1000.0 / snapshot.avg_ms;
            }
        }
        snapshot
    }

    fn run(&self, frame: &mut Frame, request: &ProcessRequest) -> Result<Outcome> {
        if let Some(id) = request.frame_id.as_deref() {
            if let Some((cached, detections)) = self.cache.lookup(id) {
                log::debug!("cache hit for frame {}", id);
                return Ok(Outcome::Cached(cached, detections));
            }
        }

        let threshold = request
            .confidence_threshold
            .unwrap_or(self.config.detector.confidence_threshold);
        let scale = if request.fast_mode {
            self.config.performance.fast_resize_factor
        } else {
            self.config.performance.resize_factor
        };

        let regions = self.find_regions(frame, threshold, scale)?;
        composite(frame, &regions, &self.config.blur);
        let detections: Vec<Detection> = regions
            .into_iter()
            .map(RedactionRegion::into_detection)
            .collect();

        if let Some(id) = request.frame_id.as_deref() {
            self.cache.store(id, frame, &detections);
        }
        Ok(Outcome::Processed(detections))
    }

    /// Everything up to compositing. Leaves `frame` untouched.
    fn find_regions(
        &self,
        frame: &Frame,
        threshold: f32,
        scale: f32,
    ) -> Result<Vec<RedactionRegion>> {
        let working = downscale(frame, scale)?;
        let (target, inference_scale) = match working.as_ref() {
            Some(copy) => (copy, scale),
            None => (frame, 1.0),
        };

        let raw = self
            .adapter
            .detect(target, threshold, self.config.detector.max_detections)?;
        let (width, height) = frame.dimensions();
        let rectified = rectify(&raw, inference_scale, width, height);
        let regions = select(&rectified, &self.config.redact_classes, threshold);
        log::debug!(
            "{} detections, {} selected for redaction",
            rectified.len(),
            regions.len()
        );
        Ok(regions)
    }

    fn stats_lock(&self) -> MutexGuard<'_, StatsWindow> {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
