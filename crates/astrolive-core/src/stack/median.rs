use std::collections::VecDeque;

use ndarray::{Array3, ArrayViewMut2, Axis};
use rayon::prelude::*;

use crate::consts::{MAD_TO_SIGMA, PARALLEL_PIXEL_THRESHOLD, SIGMA_CLIP_MIN_FRAMES};

/// Per-pixel median of a frame sequence, optionally with MAD sigma clipping.
///
/// With `sigma_clip = Some(sigma)` and at least three frames, samples whose
/// distance from the median exceeds `sigma * 1.4826 * MAD` are rejected and
/// the survivors re-medianed. Pixels where every sample is rejected keep
/// the unclipped median.
///
/// Parallelizes at the row level for images >= 256x256.
pub fn median_compose(frames: &VecDeque<Array3<f32>>, sigma_clip: Option<f32>) -> Option<Array3<f32>> {
    let first = frames.front()?;
    let (h, w, c) = first.dim();
    let n = frames.len();
    let clip = sigma_clip.filter(|_| n >= SIGMA_CLIP_MIN_FRAMES);

    let mut result = Array3::<f32>::zeros((h, w, c));

    let compose_row = |row: usize, mut out: ArrayViewMut2<f32>| {
        let mut values = vec![0.0f32; n];
        let mut scratch = Vec::with_capacity(n);
        for col in 0..w {
            for ch in 0..c {
                for (i, frame) in frames.iter().enumerate() {
                    values[i] = frame[[row, col, ch]];
                }
                out[[col, ch]] = match clip {
                    Some(sigma) => clipped_median(&mut values, &mut scratch, sigma),
                    None => compute_median(&mut values),
                };
            }
        }
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD && n > 1 {
        result
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, out)| compose_row(row, out));
    } else {
        for (row, out) in result.axis_iter_mut(Axis(0)).enumerate() {
            compose_row(row, out);
        }
    }
    Some(result)
}

fn clipped_median(values: &mut [f32], scratch: &mut Vec<f32>, sigma: f32) -> f32 {
    let median = compute_median(values);

    scratch.clear();
    scratch.extend(values.iter().map(|v| (v - median).abs()));
    let mad = compute_median(scratch);
    let limit = sigma * MAD_TO_SIGMA * mad;

    scratch.clear();
    scratch.extend(values.iter().copied().filter(|v| (v - median).abs() <= limit));
    if scratch.is_empty() {
        median
    } else {
        compute_median(scratch)
    }
}

/// Median via `select_nth_unstable`; averages the two middle values for even counts.
pub fn compute_median(values: &mut [f32]) -> f32 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        values[0]
    } else if n % 2 == 1 {
        let mid = n / 2;
        *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1
    } else {
        let mid = n / 2;
        values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        values[..mid].select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b));
        (values[mid - 1] + values[mid]) / 2.0
    }
}
