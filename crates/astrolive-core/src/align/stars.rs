use std::collections::HashMap;

use ndarray::Array2;

use crate::consts::{MAD_TO_SIGMA, STAR_DETECTION_PEAK_FRACTION, STAR_DETECTION_SIGMA};

/// A detected point source with an intensity-weighted centroid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Star {
    /// Column coordinate (sub-pixel).
    pub x: f64,
    /// Row coordinate (sub-pixel).
    pub y: f64,
    /// Background-subtracted summed intensity.
    pub flux: f64,
    pub area: usize,
}

/// Robust background level and noise of an image: (median, 1.4826 * MAD).
pub fn background_stats(data: &Array2<f32>) -> (f32, f32) {
    let mut values: Vec<f32> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let median = median_in_place(&mut values);
    for v in values.iter_mut() {
        *v = (*v - median).abs();
    }
    let mad = median_in_place(&mut values);
    (median, MAD_TO_SIGMA * mad)
}

fn median_in_place(values: &mut [f32]) -> f32 {
    let mid = values.len() / 2;
    let upper = *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1;
    if values.len() % 2 == 1 {
        upper
    } else {
        let lower = values[..mid]
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        (lower + upper) / 2.0
    }
}

/// Detect up to `max_stars` point sources, brightest first.
///
/// Pixels above `background + max(5 * noise, 5% of (peak - background))` are
/// grouped into 8-connected components; each component yields one star at
/// its background-subtracted intensity-weighted centroid.
pub fn detect_stars(data: &Array2<f32>, max_stars: usize) -> Vec<Star> {
    let (h, w) = data.dim();
    if h == 0 || w == 0 || max_stars == 0 {
        return Vec::new();
    }

    let (background, noise) = background_stats(data);
    let peak = data
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !(peak > background) {
        return Vec::new();
    }
    let threshold = background
        + (STAR_DETECTION_SIGMA * noise).max(STAR_DETECTION_PEAK_FRACTION * (peak - background));

    let labels = label_components(data, threshold);

    #[derive(Default)]
    struct Accum {
        sum: f64,
        sum_x: f64,
        sum_y: f64,
        area: usize,
    }

    let mut accums: HashMap<u32, Accum> = HashMap::new();
    for ((row, col), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let weight = (data[[row, col]] - background) as f64;
        let acc = accums.entry(label).or_default();
        acc.sum += weight;
        acc.sum_x += weight * col as f64;
        acc.sum_y += weight * row as f64;
        acc.area += 1;
    }

    let mut stars: Vec<Star> = accums
        .into_values()
        .filter(|a| a.sum > 0.0)
        .map(|a| Star {
            x: a.sum_x / a.sum,
            y: a.sum_y / a.sum,
            flux: a.sum,
            area: a.area,
        })
        .collect();

    stars.sort_unstable_by(|a, b| b.flux.total_cmp(&a.flux));
    stars.truncate(max_stars);
    stars
}

/// Two-pass union-find labeling of pixels above `threshold` with
/// 8-connectivity. Returned labels are resolved to their root; 0 is background.
fn label_components(data: &Array2<f32>, threshold: f32) -> Array2<u32> {
    let (h, w) = data.dim();
    let mut labels = Array2::<u32>::zeros((h, w));
    // Index 0 unused; labels start at 1.
    let mut parent: Vec<u32> = vec![0];

    for row in 0..h {
        for col in 0..w {
            if !(data[[row, col]] > threshold) {
                continue;
            }

            let mut neighbours = [0u32; 4];
            if col > 0 {
                neighbours[0] = labels[[row, col - 1]];
            }
            if row > 0 {
                neighbours[1] = labels[[row - 1, col]];
                if col > 0 {
                    neighbours[2] = labels[[row - 1, col - 1]];
                }
                if col + 1 < w {
                    neighbours[3] = labels[[row - 1, col + 1]];
                }
            }

            let smallest = neighbours.iter().copied().filter(|&l| l > 0).min();
            match smallest {
                None => {
                    let label = parent.len() as u32;
                    parent.push(label);
                    labels[[row, col]] = label;
                }
                Some(min_label) => {
                    labels[[row, col]] = min_label;
                    for &other in neighbours.iter().filter(|&&l| l > 0 && l != min_label) {
                        union(&mut parent, min_label, other);
                    }
                }
            }
        }
    }

    for i in 1..parent.len() {
        parent[i] = find(&parent, i as u32);
    }
    labels.mapv_inplace(|l| parent[l as usize]);
    labels
}

fn find(parent: &[u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        x = parent[x as usize];
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (small, big) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[big as usize] = small;
    }
}
