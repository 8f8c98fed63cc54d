use std::collections::HashMap;

use tracing::debug;

use super::affine::Affine;
use super::stars::Star;
use super::triangles::{build_triangles, match_triangles, Triangle};
use crate::consts::{
    MAX_TRANSFORM_SCALE, MIN_INLIER_FLOOR, MIN_INLIER_MATCHES, MIN_STAR_CORRESPONDENCES,
    MIN_TRANSFORM_SCALE, REGISTRATION_PIXEL_TOLERANCE, TRIANGLE_MATCH_TOLERANCE,
    TRIANGLE_NEIGHBOURS,
};
use crate::error::AlignmentError;

/// Estimated frame-to-reference transform.
#[derive(Clone, Debug, PartialEq)]
pub struct Registration {
    pub transform: Affine,
    /// Unique star correspondences used for the final fit.
    pub correspondences: usize,
    /// Triangle matches consistent with the transform.
    pub inlier_matches: usize,
}

/// Find the affine transform mapping `frame` star positions onto `reference`.
///
/// Every matched triangle pair proposes an exact transform; the proposal
/// agreeing with the most other matches wins and is refined by a
/// least-squares fit over the star correspondences of its inliers.
pub fn find_transform(
    frame: &[Star],
    reference: &[Star],
) -> Result<Registration, AlignmentError> {
    if frame.len() < 3 || reference.len() < 3 {
        return Err(AlignmentError::TooFewStars {
            reference: reference.len(),
            frame: frame.len(),
        });
    }

    let frame_tris = build_triangles(frame, TRIANGLE_NEIGHBOURS);
    let reference_tris = build_triangles(reference, TRIANGLE_NEIGHBOURS);
    let matches = match_triangles(&frame_tris, &reference_tris, TRIANGLE_MATCH_TOLERANCE);
    if matches.is_empty() {
        return Err(AlignmentError::NoMatch);
    }

    let mut best: Option<(Affine, Vec<usize>)> = None;
    for (f, r) in &matches {
        let Some(candidate) = Affine::fit(&vertex_pairs(frame, reference, f, r)) else {
            continue;
        };
        let inliers: Vec<usize> = matches
            .iter()
            .enumerate()
            .filter(|(_, (mf, mr))| agrees(&candidate, frame, reference, mf, mr))
            .map(|(i, _)| i)
            .collect();
        if best.as_ref().map_or(true, |(_, b)| inliers.len() > b.len()) {
            best = Some((candidate, inliers));
        }
    }

    let (candidate, inliers) = best.ok_or(AlignmentError::NoMatch)?;
    // A single triangle always fits exactly, so it proves nothing.
    let required = MIN_INLIER_MATCHES.min(matches.len()).max(MIN_INLIER_FLOOR);
    if inliers.len() < required {
        return Err(AlignmentError::NoMatch);
    }

    // Unique star correspondences from the inlier triangles.
    let mut pairs: HashMap<usize, usize> = HashMap::new();
    for &i in &inliers {
        let (f, r) = &matches[i];
        for k in 0..3 {
            pairs.entry(f.vertices[k]).or_insert(r.vertices[k]);
        }
    }
    let points: Vec<((f64, f64), (f64, f64))> = pairs
        .iter()
        .map(|(&fi, &ri)| ((frame[fi].x, frame[fi].y), (reference[ri].x, reference[ri].y)))
        .collect();
    if points.len() < MIN_STAR_CORRESPONDENCES {
        return Err(AlignmentError::NoMatch);
    }
    let transform = Affine::fit(&points).unwrap_or(candidate);

    let scale = transform.scale();
    if !(MIN_TRANSFORM_SCALE..=MAX_TRANSFORM_SCALE).contains(&scale) {
        return Err(AlignmentError::Degenerate { scale });
    }

    debug!(
        matches = matches.len(),
        inliers = inliers.len(),
        correspondences = points.len(),
        scale,
        "Registered frame"
    );

    Ok(Registration {
        transform,
        correspondences: points.len(),
        inlier_matches: inliers.len(),
    })
}

fn vertex_pairs(
    frame: &[Star],
    reference: &[Star],
    f: &Triangle,
    r: &Triangle,
) -> Vec<((f64, f64), (f64, f64))> {
    (0..3)
        .map(|k| {
            let fs = &frame[f.vertices[k]];
            let rs = &reference[r.vertices[k]];
            ((fs.x, fs.y), (rs.x, rs.y))
        })
        .collect()
}

fn agrees(t: &Affine, frame: &[Star], reference: &[Star], f: &Triangle, r: &Triangle) -> bool {
    (0..3).all(|k| {
        let fs = &frame[f.vertices[k]];
        let rs = &reference[r.vertices[k]];
        let (x, y) = t.apply(fs.x, fs.y);
        ((x - rs.x).powi(2) + (y - rs.y).powi(2)).sqrt() <= REGISTRATION_PIXEL_TOLERANCE
    })
}
