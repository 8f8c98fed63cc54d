use std::collections::HashSet;

use super::stars::Star;

/// A star triangle described by a similarity-invariant pair of side ratios.
///
/// `vertices` are star indices ordered by the length of the opposite side,
/// shortest first, so two matching triangles also match vertex by vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub vertices: [usize; 3],
    /// (L2 / L1, L1 / L0) for sides sorted ascending.
    pub invariant: [f64; 2],
}

/// Triangles formed by each star and every pair among its `neighbours`
/// nearest neighbours. Duplicates are dropped, as are degenerate triangles.
pub fn build_triangles(stars: &[Star], neighbours: usize) -> Vec<Triangle> {
    let n = stars.len();
    if n < 3 {
        return Vec::new();
    }
    let k = neighbours.min(n - 1);

    let mut seen: HashSet<[usize; 3]> = HashSet::new();
    let mut triangles = Vec::new();

    for (i, star) in stars.iter().enumerate() {
        let mut others: Vec<(f64, usize)> = stars
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(j, s)| (dist(star, s), j))
            .collect();
        others.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
        let nearest: Vec<usize> = others.iter().take(k).map(|&(_, j)| j).collect();

        for (a, &j) in nearest.iter().enumerate() {
            for &l in &nearest[a + 1..] {
                let mut key = [i, j, l];
                key.sort_unstable();
                if !seen.insert(key) {
                    continue;
                }
                if let Some(tri) = make_triangle(stars, key) {
                    triangles.push(tri);
                }
            }
        }
    }
    triangles
}

fn make_triangle(stars: &[Star], idx: [usize; 3]) -> Option<Triangle> {
    // Side opposite vertex v joins the other two vertices.
    let mut sides = [
        (dist(&stars[idx[1]], &stars[idx[2]]), idx[0]),
        (dist(&stars[idx[0]], &stars[idx[2]]), idx[1]),
        (dist(&stars[idx[0]], &stars[idx[1]]), idx[2]),
    ];
    sides.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
    let (l0, l1, l2) = (sides[0].0, sides[1].0, sides[2].0);
    if l0 < 1e-6 || l1 < 1e-6 {
        return None;
    }
    Some(Triangle {
        vertices: [sides[0].1, sides[1].1, sides[2].1],
        invariant: [l2 / l1, l1 / l0],
    })
}

/// All (frame, reference) triangle pairs whose invariants lie within `tolerance`.
pub fn match_triangles(
    frame: &[Triangle],
    reference: &[Triangle],
    tolerance: f64,
) -> Vec<(Triangle, Triangle)> {
    let tol_sq = tolerance * tolerance;
    let mut matches = Vec::new();
    for f in frame {
        for r in reference {
            let d0 = f.invariant[0] - r.invariant[0];
            let d1 = f.invariant[1] - r.invariant[1];
            if d0 * d0 + d1 * d1 < tol_sq {
                matches.push((*f, *r));
            }
        }
    }
    matches
}

fn dist(a: &Star, b: &Star) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}
