use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::composite::{BlurSettings, BlurStage};
use crate::error::RedactError;
use crate::labels::{RedactSet, DEFAULT_REDACT_CLASSES};

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_MAX_DETECTIONS: usize = 20;
const DEFAULT_NMS_THRESHOLD: f32 = 0.45;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_RESIZE_FACTOR: f32 = 0.5;
const DEFAULT_FAST_RESIZE_FACTOR: f32 = 0.3;
const DEFAULT_MAX_WORKERS: usize = 4;
const DEFAULT_CACHE_TTL_MS: u64 = 100;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 30;

#[derive(Debug, Deserialize, Default)]
struct RedactConfigFile {
    detector: Option<DetectorConfigFile>,
    performance: Option<PerformanceConfigFile>,
    redact_classes: Option<Vec<String>>,
    blur: Option<BlurConfigFile>,
    cache: Option<CacheConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    confidence_threshold: Option<f32>,
    max_detections: Option<usize>,
    nms_threshold: Option<f32>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PerformanceConfigFile {
    resize_factor: Option<f32>,
    fast_resize_factor: Option<f32>,
    max_workers: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct BlurConfigFile {
    stages: Option<Vec<BlurStage>>,
    adaptive: Option<bool>,
    edge_padding: Option<u32>,
    blend_alpha: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct CacheConfigFile {
    ttl_secs: Option<f64>,
    max_entries: Option<usize>,
}

/// Immutable configuration snapshot for a pipeline.
#[derive(Debug, Clone)]
pub struct RedactConfig {
    pub detector: DetectorSettings,
    pub performance: PerformanceSettings,
    pub redact_classes: RedactSet,
    pub blur: BlurSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub confidence_threshold: f32,
    pub max_detections: usize,
    pub nms_threshold: f32,
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSettings {
    /// Scale applied to the working copy before detection. 1.0 disables it.
    pub resize_factor: f32,
    /// Scale used instead of `resize_factor` when a call asks for fast mode.
    pub fast_resize_factor: f32,
    pub max_workers: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for RedactConfig {
    fn default() -> Self {
        Self {
            detector: DetectorSettings {
                confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
                max_detections: DEFAULT_MAX_DETECTIONS,
                nms_threshold: DEFAULT_NMS_THRESHOLD,
                model_path: None,
                input_size: DEFAULT_INPUT_SIZE,
            },
            performance: PerformanceSettings {
                resize_factor: DEFAULT_RESIZE_FACTOR,
                fast_resize_factor: DEFAULT_FAST_RESIZE_FACTOR,
                max_workers: DEFAULT_MAX_WORKERS,
            },
            redact_classes: RedactSet::new(DEFAULT_REDACT_CLASSES),
            blur: BlurSettings::default(),
            cache: CacheSettings {
                ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
                max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            },
        }
    }
}

impl RedactConfig {
    /// Defaults, then the file named by `REDACT_CONFIG`, then `REDACT_*` env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("REDACT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overlaid with a single config file, no env overrides.
    pub fn from_path(path: &Path) -> Result<Self> {
        let cfg = Self::from_file(read_config_file(path)?)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RedactConfigFile) -> Result<Self> {
        let detector = file.detector.unwrap_or_default();
        let performance = file.performance.unwrap_or_default();
        let blur = file.blur.unwrap_or_default();
        let cache = file.cache.unwrap_or_default();

        let ttl = cache
            .ttl_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|_| {
                    invalid(format!("cache ttl_secs {} is not a valid duration", secs))
                })
            })
            .transpose()?;

        let defaults = Self::default();
        Ok(Self {
            detector: DetectorSettings {
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(defaults.detector.confidence_threshold),
                max_detections: detector
                    .max_detections
                    .unwrap_or(defaults.detector.max_detections),
                nms_threshold: detector
                    .nms_threshold
                    .unwrap_or(defaults.detector.nms_threshold),
                model_path: detector.model_path,
                input_size: detector.input_size.unwrap_or(defaults.detector.input_size),
            },
            performance: PerformanceSettings {
                resize_factor: performance
                    .resize_factor
                    .unwrap_or(defaults.performance.resize_factor),
                fast_resize_factor: performance
                    .fast_resize_factor
                    .unwrap_or(defaults.performance.fast_resize_factor),
                max_workers: performance
                    .max_workers
                    .unwrap_or(defaults.performance.max_workers),
            },
            redact_classes: match file.redact_classes {
                Some(classes) => RedactSet::new(classes),
                None => defaults.redact_classes,
            },
            blur: BlurSettings {
                stages: blur.stages.unwrap_or(defaults.blur.stages),
                adaptive: blur.adaptive.unwrap_or(defaults.blur.adaptive),
                edge_padding: blur.edge_padding.unwrap_or(defaults.blur.edge_padding),
                blend_alpha: blur.blend_alpha.unwrap_or(defaults.blur.blend_alpha),
            },
            cache: CacheSettings {
                ttl: ttl.unwrap_or(defaults.cache.ttl),
                max_entries: cache.max_entries.unwrap_or(defaults.cache.max_entries),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("REDACT_CONFIDENCE_THRESHOLD") {
            self.detector.confidence_threshold = value.trim().parse().map_err(|_| {
                anyhow!("REDACT_CONFIDENCE_THRESHOLD must be a number in (0, 1)")
            })?;
        }
        if let Ok(value) = std::env::var("REDACT_RESIZE_FACTOR") {
            self.performance.resize_factor = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("REDACT_RESIZE_FACTOR must be a number in (0, 1]"))?;
        }
        if let Ok(classes) = std::env::var("REDACT_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.redact_classes = RedactSet::new(parsed);
            }
        }
        if let Ok(ttl) = std::env::var("REDACT_CACHE_TTL_MS") {
            let millis: u64 = ttl
                .trim()
                .parse()
                .map_err(|_| anyhow!("REDACT_CACHE_TTL_MS must be an integer number of milliseconds"))?;
            self.cache.ttl = Duration::from_millis(millis);
        }
        if let Ok(path) = std::env::var("REDACT_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.detector.confidence_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(invalid(format!(
                "confidence_threshold {} outside (0, 1)",
                threshold
            )));
        }
        if self.detector.max_detections == 0 {
            return Err(invalid("max_detections must be at least 1".into()));
        }
        let nms = self.detector.nms_threshold;
        if !(0.0..=1.0).contains(&nms) {
            return Err(invalid(format!("nms_threshold {} outside [0, 1]", nms)));
        }
        if self.detector.input_size == 0 {
            return Err(invalid("input_size must be positive".into()));
        }
        for (name, factor) in [
            ("resize_factor", self.performance.resize_factor),
            ("fast_resize_factor", self.performance.fast_resize_factor),
        ] {
            if !(factor > 0.0 && factor <= 1.0) {
                return Err(invalid(format!("{} {} outside (0, 1]", name, factor)));
            }
        }
        if self.performance.max_workers == 0 {
            return Err(invalid("max_workers must be at least 1".into()));
        }
        if self.cache.max_entries == 0 {
            return Err(invalid("cache max_entries must be at least 1".into()));
        }
        self.blur.validate()?;
        Ok(())
    }
}

fn invalid(message: String) -> anyhow::Error {
    RedactError::InvalidConfig(message).into()
}

fn read_config_file(path: &Path) -> Result<RedactConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = RedactConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.detector.confidence_threshold, 0.5);
        assert_eq!(cfg.detector.max_detections, 20);
        assert_eq!(cfg.performance.resize_factor, 0.5);
        assert_eq!(cfg.performance.fast_resize_factor, 0.3);
        assert_eq!(cfg.cache.ttl, Duration::from_millis(100));
        assert_eq!(cfg.cache.max_entries, 30);
        assert_eq!(cfg.redact_classes.len(), 5);
        assert_eq!(cfg.blur, BlurSettings::default());
    }

    #[test]
    fn invalid_values_surface_as_invalid_config() {
        let mut cfg = RedactConfig::default();
        cfg.performance.resize_factor = 0.0;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RedactError>(),
            Some(RedactError::InvalidConfig(_))
        ));

        let mut cfg = RedactConfig::default();
        cfg.detector.confidence_threshold = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn split_csv_trims_and_skips_blanks() {
        assert_eq!(split_csv(" a, ,b ,"), vec!["a", "b"]);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file: RedactConfigFile =
            serde_json::from_str(r#"{"blur": {"edge_padding": 5}}"#).unwrap();
        let cfg = RedactConfig::from_file(file).unwrap();
        assert_eq!(cfg.blur.edge_padding, 5);
        assert_eq!(cfg.blur.stages.len(), 3);
        assert_eq!(cfg.blur.blend_alpha, 0.8);
    }
}
