//! Convex point set preparation

use std::collections::HashSet;

use iwbridge_core::Vec3;

/// Points closer than this fraction of the set's extent are merged
const WELD_TOLERANCE: f32 = 1e-5;

/// Remove duplicate points, keeping first occurrences in order
pub fn dedup_points(points: &[[f32; 3]]) -> Vec<[f32; 3]> {
    let cell = weld_distance(points);
    let mut seen = HashSet::with_capacity(points.len());
    points
        .iter()
        .copied()
        .filter(|p| seen.insert(p.map(|v| (v / cell).round() as i64)))
        .collect()
}

fn weld_distance(points: &[[f32; 3]]) -> f32 {
    let extent = points
        .iter()
        .flat_map(|p| p.iter())
        .fold(0.0f32, |acc, v| acc.max(v.abs()));
    (extent * WELD_TOLERANCE).max(f32::MIN_POSITIVE.sqrt())
}

/// Why a point set cannot span a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    TooFewPoints(usize),
    Collinear,
    Coplanar,
}

impl std::fmt::Display for Degeneracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Degeneracy::TooFewPoints(n) => write!(f, "{n} distinct points, at least 4 required"),
            Degeneracy::Collinear => f.write_str("all points are collinear"),
            Degeneracy::Coplanar => f.write_str("all points are coplanar"),
        }
    }
}

/// Check that `points` (already deduplicated) contain four non-coplanar points
pub fn check_volume(points: &[[f32; 3]]) -> Result<(), Degeneracy> {
    if points.len() < 4 {
        return Err(Degeneracy::TooFewPoints(points.len()));
    }
    let eps = weld_distance(points);
    let p: Vec<Vec3> = points.iter().map(|&v| Vec3::from_array(v)).collect();

    let a = p[0];
    let b = *p
        .iter()
        .max_by(|x, y| (**x - a).length().total_cmp(&(**y - a).length()))
        .unwrap_or(&a);
    let ab = b - a;
    if ab.length() <= eps {
        return Err(Degeneracy::TooFewPoints(1));
    }

    let line_distance = |v: Vec3| (v - a).cross(ab).length() / ab.length();
    let c = *p
        .iter()
        .max_by(|x, y| line_distance(**x).total_cmp(&line_distance(**y)))
        .unwrap_or(&a);
    if line_distance(c) <= eps {
        return Err(Degeneracy::Collinear);
    }

    let normal = ab.cross(c - a).normalized();
    let plane_distance = |v: Vec3| (v - a).dot(normal).abs();
    if p.iter().all(|&v| plane_distance(v) <= eps) {
        return Err(Degeneracy::Coplanar);
    }
    Ok(())
}

/// Vertices of an `segments`-sided prism around local Z
pub fn prism_points(radius: f32, half_height: f32, segments: usize) -> Vec<[f32; 3]> {
    let mut points = Vec::with_capacity(segments * 2);
    for z in [-half_height, half_height] {
        for i in 0..segments {
            let angle = std::f32::consts::TAU * i as f32 / segments as f32;
            points.push([radius * angle.cos(), radius * angle.sin(), z]);
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUBE: [[f32; 3]; 8] = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 1.0],
        [0.0, 1.0, 1.0],
        [1.0, 1.0, 1.0],
    ];

    #[test]
    fn test_dedup_keeps_order() {
        let points = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [1.0, 0.000001, 0.0]];
        assert_eq!(dedup_points(&points), vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_cube_has_volume() {
        assert_eq!(check_volume(&CUBE), Ok(()));
    }

    #[test]
    fn test_degenerate_sets() {
        assert_eq!(check_volume(&CUBE[..3]), Err(Degeneracy::TooFewPoints(3)));
        assert_eq!(check_volume(&CUBE[..4]), Err(Degeneracy::Coplanar));
        let line = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [3.0, 0.0, 0.0]];
        assert_eq!(check_volume(&line), Err(Degeneracy::Collinear));
    }

    #[test]
    fn test_prism() {
        let points = prism_points(1.0, 2.0, 16);
        assert_eq!(points.len(), 32);
        assert_eq!(check_volume(&points), Ok(()));
        assert!((points[4][1] - 1.0).abs() < 1e-6);
    }
}
