use ndarray::{Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// 2-D affine transform in pixel coordinates:
/// `x' = a*x + b*y + c`, `y' = d*x + e*y + f` (x = column, y = row).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            e: 1.0,
            f: 0.0,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// Geometric mean scale factor, `sqrt(|det|)`.
    pub fn scale(&self) -> f64 {
        self.determinant().abs().sqrt()
    }

    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() < 1e-12 {
            return None;
        }
        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        Some(Self {
            a,
            b,
            c: -(a * self.c + b * self.f),
            d,
            e,
            f: -(d * self.c + e * self.f),
        })
    }

    /// Least-squares fit mapping each `src` point onto its `dst` partner.
    /// Needs at least three non-collinear pairs.
    pub fn fit(pairs: &[((f64, f64), (f64, f64))]) -> Option<Self> {
        if pairs.len() < 3 {
            return None;
        }
        // Centre the source points so the normal equations stay well conditioned.
        let n = pairs.len() as f64;
        let mx = pairs.iter().map(|p| p.0 .0).sum::<f64>() / n;
        let my = pairs.iter().map(|p| p.0 .1).sum::<f64>() / n;

        // Normal equations: M * [p q r]^T = v, with M = sum [u v 1]^T [u v 1].
        let mut m = [[0.0f64; 3]; 3];
        let mut vx = [0.0f64; 3];
        let mut vy = [0.0f64; 3];
        for &((x, y), (xp, yp)) in pairs {
            let row = [x - mx, y - my, 1.0];
            for i in 0..3 {
                for j in 0..3 {
                    m[i][j] += row[i] * row[j];
                }
                vx[i] += row[i] * xp;
                vy[i] += row[i] * yp;
            }
        }
        let [a, b, c0] = solve3(&m, &vx)?;
        let [d, e, f0] = solve3(&m, &vy)?;
        let c = c0 - a * mx - b * my;
        let f = f0 - d * mx - e * my;
        Some(Self { a, b, c, d, e, f })
    }
}

/// Cramer's rule for a 3x3 system.
fn solve3(m: &[[f64; 3]; 3], v: &[f64; 3]) -> Option<[f64; 3]> {
    let det = det3(m);
    let norm = m.iter().flatten().fold(0.0f64, |acc, x| acc.max(x.abs()));
    if !det.is_finite() || det.abs() <= 1e-12 * norm.powi(3).max(1.0) {
        return None;
    }
    let mut out = [0.0; 3];
    for (k, slot) in out.iter_mut().enumerate() {
        let mut mk = *m;
        for i in 0..3 {
            mk[i][k] = v[i];
        }
        *slot = det3(&mk) / det;
    }
    Some(out)
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Resample `frame` onto the reference grid given the frame-to-reference
/// transform. Each output pixel `p` takes the bilinear sample at
/// `T^-1(p)` in the frame; samples outside the frame are 0.
pub fn warp_to_reference(frame: &Array3<f32>, to_reference: &Affine) -> Option<Array3<f32>> {
    let inv = to_reference.inverse()?;
    let (h, w, c) = frame.dim();
    let mut out = Array3::<f32>::zeros((h, w, c));

    for ch in 0..c {
        let plane = frame.index_axis(Axis(2), ch);
        let warped = warp_plane(plane, &inv);
        out.index_axis_mut(Axis(2), ch).assign(&warped);
    }
    Some(out)
}

fn warp_plane(plane: ArrayView2<f32>, inv: &Affine) -> Array2<f32> {
    let (h, w) = plane.dim();
    let mut out = Array2::<f32>::zeros((h, w));

    let fill_row = |row: usize, dst: &mut [f32]| {
        for (col, v) in dst.iter_mut().enumerate() {
            let (sx, sy) = inv.apply(col as f64, row as f64);
            *v = bilinear_sample(plane, sy, sx);
        }
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut dst)| {
                if let Some(slice) = dst.as_slice_mut() {
                    fill_row(row, slice);
                }
            });
    } else {
        for (row, mut dst) in out.axis_iter_mut(Axis(0)).enumerate() {
            if let Some(slice) = dst.as_slice_mut() {
                fill_row(row, slice);
            }
        }
    }
    out
}

/// Bilinear interpolation with zero padding outside the image.
pub fn bilinear_sample(data: ArrayView2<f32>, y: f64, x: f64) -> f32 {
    let (h, w) = data.dim();

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x1 = x0 + 1;
    let y1 = y0 + 1;

    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let sample = |r: i64, c: i64| -> f32 {
        if r >= 0 && r < h as i64 && c >= 0 && c < w as i64 {
            data[[r as usize, c as usize]]
        } else {
            0.0
        }
    };

    let v00 = sample(y0, x0);
    let v10 = sample(y0, x1);
    let v01 = sample(y1, x0);
    let v11 = sample(y1, x1);

    v00 * (1.0 - fx) * (1.0 - fy)
        + v10 * fx * (1.0 - fy)
        + v01 * (1.0 - fx) * fy
        + v11 * fx * fy
}
