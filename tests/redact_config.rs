use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use redact_kernel::config::RedactConfig;
use redact_kernel::{BlurStage, RedactError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "REDACT_CONFIG",
        "REDACT_CONFIDENCE_THRESHOLD",
        "REDACT_RESIZE_FACTOR",
        "REDACT_CLASSES",
        "REDACT_CACHE_TTL_MS",
        "REDACT_MODEL_PATH",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "detector": {
            "confidence_threshold": 0.6,
            "max_detections": 8,
            "model_path": "/models/exposure.onnx"
        },
        "performance": {
            "resize_factor": 0.75,
            "max_workers": 2
        },
        "redact_classes": ["ANUS_EXPOSED"],
        "blur": {
            "stages": [
                {"type": "pixelate", "size": 10},
                {"type": "gaussian", "kernel": 9}
            ],
            "edge_padding": 6,
            "blend_alpha": 1.0
        },
        "cache": {
            "ttl_secs": 0.25,
            "max_entries": 5
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("REDACT_CONFIG", file.path());
    std::env::set_var("REDACT_CONFIDENCE_THRESHOLD", "0.35");
    std::env::set_var("REDACT_CLASSES", "BUTTOCKS_EXPOSED, ANUS_EXPOSED");

    let cfg = RedactConfig::load().expect("load config");

    assert_eq!(cfg.detector.confidence_threshold, 0.35);
    assert_eq!(cfg.detector.max_detections, 8);
    assert_eq!(
        cfg.detector.model_path.as_deref(),
        Some(std::path::Path::new("/models/exposure.onnx"))
    );
    assert_eq!(cfg.performance.resize_factor, 0.75);
    assert_eq!(cfg.performance.fast_resize_factor, 0.3);
    assert_eq!(cfg.performance.max_workers, 2);
    assert!(cfg.redact_classes.contains("BUTTOCKS_EXPOSED"));
    assert!(cfg.redact_classes.contains("ANUS_EXPOSED"));
    assert_eq!(cfg.redact_classes.len(), 2);
    assert_eq!(
        cfg.blur.stages,
        vec![
            BlurStage::Pixelate { size: 10 },
            BlurStage::Gaussian {
                kernel: 9,
                sigma: 0.0
            },
        ]
    );
    assert!(cfg.blur.adaptive);
    assert_eq!(cfg.blur.edge_padding, 6);
    assert_eq!(cfg.blur.blend_alpha, 1.0);
    assert_eq!(cfg.cache.ttl, Duration::from_millis(250));
    assert_eq!(cfg.cache.max_entries, 5);

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
redact_classes = ["FEMALE_BREAST_EXPOSED"]

[performance]
fast_resize_factor = 0.2

[[blur.stages]]
type = "motion_blur"
kernel = 11
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("REDACT_CONFIG", file.path());
    std::env::set_var("REDACT_CACHE_TTL_MS", "40");

    let cfg = RedactConfig::load().expect("load config");
    assert_eq!(cfg.performance.fast_resize_factor, 0.2);
    assert_eq!(cfg.blur.stages, vec![BlurStage::MotionBlur { kernel: 11 }]);
    assert!(cfg.redact_classes.contains("FEMALE_BREAST_EXPOSED"));
    assert_eq!(cfg.cache.ttl, Duration::from_millis(40));

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = RedactConfig::load().expect("load defaults");
    assert_eq!(cfg.detector.confidence_threshold, 0.5);
    assert_eq!(cfg.performance.resize_factor, 0.5);
    assert_eq!(cfg.redact_classes.len(), 5);
    assert!(cfg.detector.model_path.is_none());
}

#[test]
fn out_of_range_values_are_invalid_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("REDACT_RESIZE_FACTOR", "1.5");
    let err = RedactConfig::load().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RedactError>(),
        Some(RedactError::InvalidConfig(_))
    ));

    clear_env();
    std::env::set_var("REDACT_CONFIDENCE_THRESHOLD", "not-a-number");
    assert!(RedactConfig::load().is_err());

    clear_env();
}
