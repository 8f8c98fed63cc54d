use std::time::Duration;

/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Upper bound of the stacking working domain; frames are normalized to [0, 255].
pub const STACK_VALUE_MAX: f32 = 255.0;

/// Scale from the 8-bit working domain to the approximate 16-bit export (255 * 257 = 65535).
pub const SCIENTIFIC_SCALE: f32 = 257.0;

/// Consistency constant relating MAD to the standard deviation of a normal distribution.
pub const MAD_TO_SIGMA: f32 = 1.4826;

/// Minimum sequence length before sigma clipping is applied in median mode.
pub const SIGMA_CLIP_MIN_FRAMES: usize = 3;

/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;

/// Detection threshold in robust sigmas above the background.
pub const STAR_DETECTION_SIGMA: f32 = 5.0;

/// Floor for the detection threshold as a fraction of (peak - background).
/// Keeps noiseless synthetic frames and very clean skies detectable.
pub const STAR_DETECTION_PEAK_FRACTION: f32 = 0.05;

/// Brightest stars kept for triangle matching.
pub const MAX_REGISTRATION_STARS: usize = 40;

/// Nearest neighbours used to build triangles around each star.
pub const TRIANGLE_NEIGHBOURS: usize = 4;

/// Maximum distance in invariant space for two triangles to match.
pub const TRIANGLE_MATCH_TOLERANCE: f64 = 0.03;

/// Maximum residual (pixels) for a correspondence to count as an inlier.
pub const REGISTRATION_PIXEL_TOLERANCE: f64 = 3.0;

/// Inlier triangle matches required before a transform is accepted.
pub const MIN_INLIER_MATCHES: usize = 3;

/// Floor on inlier matches when fewer triangles matched overall.
pub const MIN_INLIER_FLOOR: usize = 2;

/// Unique star correspondences required for the final fit.
pub const MIN_STAR_CORRESPONDENCES: usize = 4;

/// Accepted range of the transform's linear scale factor.
pub const MIN_TRANSFORM_SCALE: f64 = 0.5;
pub const MAX_TRANSFORM_SCALE: f64 = 2.0;

/// Samples retained per telemetry stage.
pub const TELEMETRY_WINDOW_LEN: usize = 100;

/// Rolling telemetry summary is logged every this many cycles.
pub const TELEMETRY_LOG_EVERY: u64 = 10;

/// Pause after a cycle that ended with an unhandled error.
pub const ITERATION_BACKOFF: Duration = Duration::from_millis(500);

/// Shortest interval sleep between cycles.
pub const MIN_LOOP_WAIT: Duration = Duration::from_millis(50);

/// Sleep while acquisition is disabled.
pub const DISABLED_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Bound on joining the loop thread in `stop()`.
pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for an exposure to become ready.
pub const EXPOSURE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// FITS logical record size in bytes.
pub const FITS_BLOCK_SIZE: usize = 2880;

/// FITS header card size in bytes.
pub const FITS_CARD_SIZE: usize = 80;
