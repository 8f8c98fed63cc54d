mod common;

use ndarray::{Array2, Array3};

use astrolive_core::acquisition::config::{AlignMode, StackMethod, StackingConfig};
use astrolive_core::frame::PixelData;
use astrolive_core::io::fits::read_fits;
use astrolive_core::stack::{FrameAlignment, StackingEngine};

use common::{flat_f32, flat_u8, star_field, STARS};

fn config(method: StackMethod, max_frames: usize, sigma_clip: bool) -> StackingConfig {
    let mut config = StackingConfig::default();
    config.method = method;
    config.max_frames = max_frames;
    config.sigma_clip.enabled = sigma_clip;
    config.align = AlignMode::None;
    config
}

fn engine(config: StackingConfig) -> StackingEngine {
    StackingEngine::new(config, std::env::temp_dir().join("astrolive-unused"))
}

fn composite_value(engine: &StackingEngine) -> (u8, u16) {
    let snapshot = engine.get_snapshot().unwrap();
    (snapshot.preview[[0, 0, 0]], snapshot.scientific[[0, 0, 0]])
}

#[test]
fn test_median_of_three() {
    let e = engine(config(StackMethod::Median, 10, false));
    for v in [10.0, 20.0, 200.0] {
        e.add_frame(&flat_f32(4, 4, v)).unwrap();
    }
    assert_eq!(e.frame_count(), 3);
    assert_eq!(composite_value(&e), (20, 20 * 257));
}

#[test]
fn test_sigma_clip_rejects_outliers() {
    // median 14, MAD 4 -> limit 3 * 1.4826 * 4 = 17.8; 200 and 220 rejected.
    let values = [10.0, 12.0, 14.0, 200.0, 220.0];

    let clipped = engine(config(StackMethod::Median, 10, true));
    let plain = engine(config(StackMethod::Median, 10, false));
    for v in values {
        clipped.add_frame(&flat_f32(3, 3, v)).unwrap();
        plain.add_frame(&flat_f32(3, 3, v)).unwrap();
    }
    assert_eq!(composite_value(&clipped).0, 12);
    assert_eq!(composite_value(&plain).0, 14);
}

#[test]
fn test_sigma_clip_single_hot_frame() {
    let mut cfg = config(StackMethod::Median, 10, true);
    cfg.sigma_clip.sigma = 2.0;
    let e = engine(cfg);
    for v in [100.0, 100.0, 255.0] {
        e.add_frame(&flat_f32(3, 3, v)).unwrap();
    }
    assert_eq!(composite_value(&e).0, 100);
}

#[test]
fn test_sigma_clip_needs_three_frames() {
    let e = engine(config(StackMethod::Median, 10, true));
    e.add_frame(&flat_f32(2, 2, 10.0)).unwrap();
    e.add_frame(&flat_f32(2, 2, 30.0)).unwrap();
    // Two members: plain median, the average of both.
    assert_eq!(composite_value(&e).0, 20);
}

#[test]
fn test_sigma_clip_identical_frames() {
    // MAD = 0 keeps every sample equal to the median.
    let e = engine(config(StackMethod::Median, 10, true));
    for _ in 0..4 {
        e.add_frame(&flat_f32(2, 2, 42.0)).unwrap();
    }
    assert_eq!(composite_value(&e).0, 42);
}

#[test]
fn test_median_window_is_bounded() {
    let e = engine(config(StackMethod::Median, 3, false));
    for v in 1..=5 {
        let outcome = e.add_frame(&flat_f32(2, 2, v as f32)).unwrap();
        assert!(outcome.frame_count <= 3);
    }
    assert_eq!(e.frame_count(), 3);
    // Oldest frames dropped: median of [3, 4, 5].
    assert_eq!(composite_value(&e).0, 4);
}

#[test]
fn test_mean_of_two() {
    let e = engine(config(StackMethod::Mean, 10, false));
    e.add_frame(&flat_f32(2, 2, 10.0)).unwrap();
    e.add_frame(&flat_f32(2, 2, 20.0)).unwrap();
    assert_eq!(composite_value(&e).0, 15);
}

#[test]
fn test_mean_rollover_restarts_from_latest() {
    let e = engine(config(StackMethod::Mean, 2, false));
    e.add_frame(&flat_f32(2, 2, 10.0)).unwrap();
    e.add_frame(&flat_f32(2, 2, 20.0)).unwrap();
    let outcome = e.add_frame(&flat_f32(2, 2, 90.0)).unwrap();
    assert_eq!(outcome.frame_count, 1);
    assert_eq!(composite_value(&e).0, 90);
}

#[test]
fn test_zero_max_frames_is_unbounded() {
    let median = engine(config(StackMethod::Median, 0, false));
    let mean = engine(config(StackMethod::Mean, 0, false));
    for _ in 0..150 {
        median.add_frame(&flat_u8(2, 2, 7)).unwrap();
        mean.add_frame(&flat_u8(2, 2, 7)).unwrap();
    }
    assert_eq!(median.frame_count(), 150);
    assert_eq!(mean.frame_count(), 150);
}

#[test]
fn test_u16_conversion_and_scaling() {
    let e = engine(config(StackMethod::Median, 10, false));
    e.add_frame(&PixelData::mono_u16(Array2::from_elem((2, 2), u16::MAX)))
        .unwrap();
    assert_eq!(composite_value(&e), (255, u16::MAX));

    let e = engine(config(StackMethod::Median, 10, false));
    e.add_frame(&PixelData::mono_u16(Array2::from_elem((2, 2), 32_768)))
        .unwrap();
    // 32768 * 255 / 65535 = 127.5: truncated for the preview, * 257 for FITS.
    let (preview, scientific) = composite_value(&e);
    assert_eq!(preview, 127);
    assert!((scientific as i32 - 32_767).abs() <= 1);
}

#[test]
fn test_out_of_range_values_are_clamped() {
    let e = engine(config(StackMethod::Mean, 10, false));
    let mut data = Array3::<f32>::from_elem((2, 2, 1), 300.0);
    data[[1, 1, 0]] = -20.0;
    e.add_frame(&PixelData::F32(data)).unwrap();

    let snapshot = e.get_snapshot().unwrap();
    assert_eq!(snapshot.preview[[0, 0, 0]], 255);
    assert_eq!(snapshot.scientific[[0, 0, 0]], u16::MAX);
    assert_eq!(snapshot.preview[[1, 1, 0]], 0);
    assert_eq!(snapshot.scientific[[1, 1, 0]], 0);
}

#[test]
fn test_empty_frame_is_ignored() {
    let e = engine(config(StackMethod::Median, 10, false));
    assert!(e.add_frame(&PixelData::U8(Array3::zeros((0, 0, 1)))).is_none());
    assert_eq!(e.frame_count(), 0);
    assert!(e.get_snapshot().is_none());
}

#[test]
fn test_shape_change_restarts_window() {
    let e = engine(config(StackMethod::Median, 10, false));
    e.add_frame(&flat_u8(4, 4, 10)).unwrap();
    e.add_frame(&flat_u8(4, 4, 10)).unwrap();

    let outcome = e.add_frame(&flat_u8(8, 6, 50)).unwrap();
    assert!(outcome.restarted);
    assert_eq!(outcome.frame_count, 1);

    let snapshot = e.get_snapshot().unwrap();
    assert_eq!(snapshot.dim(), (8, 6, 1));
    assert_eq!(snapshot.frame_count, 1);
}

#[test]
fn test_reset_clears_stack() {
    let e = engine(config(StackMethod::Median, 10, false));
    e.add_frame(&flat_u8(2, 2, 10)).unwrap();
    let before = e.started_at();
    e.reset();
    assert_eq!(e.frame_count(), 0);
    assert!(e.get_snapshot().is_none());
    assert!(e.started_at() >= before);
}

#[test]
fn test_color_frames_keep_channels() {
    let e = engine(config(StackMethod::Mean, 10, false));
    let mut data = Array3::<u8>::zeros((3, 3, 3));
    data.index_axis_mut(ndarray::Axis(2), 0).fill(200);
    data.index_axis_mut(ndarray::Axis(2), 2).fill(50);
    e.add_frame(&PixelData::U8(data)).unwrap();

    let snapshot = e.get_snapshot().unwrap();
    assert_eq!(snapshot.dim(), (3, 3, 3));
    assert_eq!(snapshot.preview[[1, 1, 0]], 200);
    assert_eq!(snapshot.preview[[1, 1, 1]], 0);
    assert_eq!(snapshot.preview[[1, 1, 2]], 50);
}

#[test]
fn test_write_snapshot_persists_png_and_fits() {
    let dir = tempfile::tempdir().unwrap();
    let e = StackingEngine::new(config(StackMethod::Median, 10, false), dir.path());
    for v in [40u8, 50, 60] {
        e.add_frame(&flat_u8(6, 5, v)).unwrap();
    }

    let snapshot = e.write_snapshot("stack", true, true).unwrap().unwrap();
    let png = snapshot.preview_path.clone().unwrap();
    let fits = snapshot.fits_path.clone().unwrap();

    assert!(png.is_file());
    assert!(fits.is_file());
    let png_name = png.file_name().unwrap().to_string_lossy().to_string();
    assert!(png_name.starts_with("stack_"));
    assert!(png_name.ends_with(".png"));
    assert_eq!(fits.extension().unwrap(), "fits");
    assert_eq!(snapshot.solve_path(), Some(fits.as_path()));

    let image = read_fits(&fits).unwrap();
    assert_eq!(image.header.get_i64("NFRAMES"), Some(3));
    let start = image.header.get_f64("STACKST").unwrap();
    let end = image.header.get_f64("STACKEND").unwrap();
    assert!(start <= end);
    assert_eq!(image.data.dim(), (6, 5, 1));
    assert_eq!(image.data[[0, 0, 0]], 50 * 257);

    let last = e.last_snapshot().unwrap();
    assert_eq!(last.frame_count, 3);

    // Only the two outputs remain; no temporary files are left behind.
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 2);
}

#[test]
fn test_write_snapshot_preview_only() {
    let dir = tempfile::tempdir().unwrap();
    let e = StackingEngine::new(config(StackMethod::Median, 10, false), dir.path());
    e.add_frame(&flat_u8(4, 4, 10)).unwrap();

    let snapshot = e.write_snapshot("stack", true, false).unwrap().unwrap();
    assert!(snapshot.fits_path.is_none());
    assert_eq!(snapshot.solve_path(), snapshot.preview_path.as_deref());
}

#[test]
fn test_write_snapshot_empty_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let e = StackingEngine::new(config(StackMethod::Median, 10, false), dir.path());
    assert!(e.write_snapshot("stack", true, true).unwrap().is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_write_failure_leaves_stack_intact() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let e = StackingEngine::new(config(StackMethod::Median, 10, false), blocker.join("stacks"));
    e.add_frame(&flat_u8(4, 4, 10)).unwrap();
    e.add_frame(&flat_u8(4, 4, 20)).unwrap();

    assert!(e.write_snapshot("stack", true, true).is_err());
    assert_eq!(e.frame_count(), 2);
    assert!(e.last_snapshot().is_none());
    assert!(e.get_snapshot().is_some());
}

#[test]
fn test_alignment_registers_shifted_frames() {
    let mut cfg = config(StackMethod::Median, 10, false);
    cfg.align = AlignMode::FeatureBased;
    let e = engine(cfg);

    let reference = star_field(128, 128, STARS, |x, y| (x, y));
    let shifted = star_field(128, 128, STARS, |x, y| (x + 3.0, y - 2.0));

    let first = e.add_frame(&PixelData::mono_f32(reference.clone())).unwrap();
    assert_eq!(first.alignment, FrameAlignment::Reference);

    let second = e.add_frame(&PixelData::mono_f32(shifted)).unwrap();
    assert_eq!(second.alignment, FrameAlignment::Aligned);

    // The brightest star sits where the reference has it.
    let snapshot = e.get_snapshot().unwrap();
    let peak = snapshot.preview[[18, 20, 0]] as f32;
    assert!((peak - reference[[18, 20]]).abs() < 20.0, "peak {peak}");
}

#[test]
fn test_alignment_registers_rotated_scaled_frames() {
    let mut cfg = config(StackMethod::Median, 10, false);
    cfg.align = AlignMode::FeatureBased;
    let e = engine(cfg);

    let bright: Vec<(f64, f64, f64)> = STARS.iter().map(|&(x, y, p)| (x, y, p + 40.0)).collect();
    let (s, c) = 4.0f64.to_radians().sin_cos();
    let transformed = star_field(128, 128, &bright, |x, y| {
        let (px, py) = ((x - 64.0) * 1.03, (y - 64.0) * 1.03);
        (c * px - s * py + 66.5, s * px + c * py + 62.5)
    });

    e.add_frame(&PixelData::mono_f32(star_field(128, 128, &bright, |x, y| (x, y))))
        .unwrap();
    let second = e.add_frame(&PixelData::mono_f32(transformed)).unwrap();
    assert_eq!(second.alignment, FrameAlignment::Aligned);

    // Misregistered stars would average down towards the background.
    let snapshot = e.get_snapshot().unwrap();
    let bright_pixels = snapshot.preview.iter().filter(|&&v| v >= 200).count();
    assert!(bright_pixels >= 2, "{bright_pixels} pixels >= 200");
}

#[test]
fn test_alignment_failure_accepts_frame_and_replaces_reference() {
    let mut cfg = config(StackMethod::Median, 10, false);
    cfg.align = AlignMode::FeatureBased;
    let e = engine(cfg);

    let reference = star_field(128, 128, STARS, |x, y| (x, y));
    e.add_frame(&PixelData::mono_f32(reference)).unwrap();

    let starless = e.add_frame(&flat_f32(128, 128, 10.0)).unwrap();
    assert_eq!(starless.alignment, FrameAlignment::Failed);
    assert_eq!(starless.frame_count, 2);
}

#[test]
fn test_alignment_disabled() {
    let e = engine(config(StackMethod::Median, 10, false));
    let outcome = e.add_frame(&flat_u8(4, 4, 1)).unwrap();
    assert_eq!(outcome.alignment, FrameAlignment::Disabled);
}
