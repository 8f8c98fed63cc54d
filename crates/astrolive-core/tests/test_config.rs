use std::path::PathBuf;
use std::time::Duration;

use astrolive_core::acquisition::config::{AlignMode, DisplayFormat, StackMethod};
use astrolive_core::acquisition::AcquisitionConfig;
use astrolive_core::AstroliveError;

#[test]
fn test_defaults() {
    let config = AcquisitionConfig::default();
    assert!(config.enabled);
    assert_eq!(config.capture_interval(), Duration::from_secs(10));
    assert_eq!(config.min_solve_interval(), Duration::from_secs(30));
    assert_eq!(config.display_format, DisplayFormat::Png);
    assert!(config.write_scientific);
    assert!(!config.stacking.enabled);
    assert_eq!(config.stacking.method, StackMethod::Median);
    assert_eq!(config.stacking.align, AlignMode::FeatureBased);
    assert_eq!(config.stacking.max_frames, 100);
    assert!(config.mount.slewing_detection.enabled);
    assert!(!config.mount.slewing_detection.wait_for_completion);
    assert!(config.solver.astap_path.is_none());
}

#[test]
fn test_partial_toml_overrides_defaults() {
    let text = r#"
        capture_interval_s = 2.5
        display_format = "tiff"

        [stacking]
        enabled = true
        method = "mean"
        align = "none"

        [mount.slewing_detection]
        wait_for_completion = true
    "#;
    let config = AcquisitionConfig::from_toml_str(text).unwrap();
    assert_eq!(config.capture_interval(), Duration::from_millis(2500));
    assert_eq!(config.display_format, DisplayFormat::Tiff);
    assert_eq!(config.display_format.extension(), "tiff");
    assert!(config.stacking.enabled);
    assert_eq!(config.stacking.method, StackMethod::Mean);
    assert_eq!(config.stacking.align, AlignMode::None);
    // Untouched fields keep their defaults.
    assert_eq!(config.stacking.max_frames, 100);
    assert!(config.mount.slewing_detection.wait_for_completion);
    assert!(config.mount.slewing_detection.check_before_capture);
    assert!(config.auto_solve);
}

#[test]
fn test_toml_round_trip() {
    let mut config = AcquisitionConfig::default();
    config.output_dir = PathBuf::from("/tmp/night");
    config.solver.astap_path = Some(PathBuf::from("/usr/bin/astap_cli"));
    config.solver.min_confidence = Some(0.75);
    config.stacking.align = AlignMode::None;

    let text = config.to_toml_string().unwrap();
    assert_eq!(AcquisitionConfig::from_toml_str(&text).unwrap(), config);
}

#[test]
fn test_invalid_durations_collapse_to_zero() {
    let mut config = AcquisitionConfig::default();
    config.capture_interval_s = -5.0;
    config.min_solve_interval_s = f64::NAN;
    assert_eq!(config.capture_interval(), Duration::ZERO);
    assert_eq!(config.min_solve_interval(), Duration::ZERO);
}

#[test]
fn test_max_integration_zero_disables() {
    let mut config = AcquisitionConfig::default();
    assert_eq!(config.stacking.max_integration(), None);
    config.stacking.max_integration_s = 600.0;
    assert_eq!(
        config.stacking.max_integration(),
        Some(Duration::from_secs(600))
    );
}

#[test]
fn test_stack_dir_is_under_output_dir() {
    let mut config = AcquisitionConfig::default();
    config.output_dir = PathBuf::from("/data/session");
    assert_eq!(config.stack_dir(), PathBuf::from("/data/session/stacks"));
}

#[test]
fn test_invalid_toml_is_a_config_error() {
    let result = AcquisitionConfig::from_toml_str("capture_interval_s = \"soon\"");
    assert!(matches!(result, Err(AstroliveError::Config(_))));

    let result = AcquisitionConfig::from_toml_str("[stacking]\nmethod = \"sum\"");
    assert!(matches!(result, Err(AstroliveError::Config(_))));
}

#[test]
fn test_config_file_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("astrolive.toml");
    std::fs::write(&path, "save_frames = false\n[solver]\ntimeout_s = 5.0\n").unwrap();

    let config = AcquisitionConfig::from_toml_file(&path).unwrap();
    assert!(!config.save_frames);
    assert_eq!(config.solver.timeout(), Duration::from_secs(5));

    assert!(AcquisitionConfig::from_toml_file(&dir.path().join("missing.toml")).is_err());
}
