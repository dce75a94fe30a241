//! Bone matrix helpers
//!
//! Matrices are row-major and act on row vectors (`p' = p * M`), so a
//! child's world matrix is `local * parent_world`.

use iwbridge_core::Transform;

pub type Mat4 = [[f32; 4]; 4];

pub const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

pub fn multiply(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [[0.0f32; 4]; 4];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = (0..4).map(|k| a[r][k] * b[k][c]).sum();
        }
    }
    out
}

/// Scale, then rotate, then translate
pub fn from_transform(t: &Transform) -> Mat4 {
    let [x, y, z, w] = normalize_quat(t.rotation);
    let [sx, sy, sz] = t.scale;

    // Rows are the rotated basis vectors
    let rotation = [
        [1.0 - 2.0 * (y * y + z * z), 2.0 * (x * y + z * w), 2.0 * (x * z - y * w)],
        [2.0 * (x * y - z * w), 1.0 - 2.0 * (x * x + z * z), 2.0 * (y * z + x * w)],
        [2.0 * (x * z + y * w), 2.0 * (y * z - x * w), 1.0 - 2.0 * (x * x + y * y)],
    ];

    let mut m = IDENTITY;
    for (row, s) in [sx, sy, sz].into_iter().enumerate() {
        for col in 0..3 {
            m[row][col] = rotation[row][col] * s;
        }
    }
    m[3][..3].copy_from_slice(&t.position);
    m
}

/// Inverse of an affine matrix, `None` when singular
pub fn inverse_affine(m: &Mat4) -> Option<Mat4> {
    let a = |r: usize, c: usize| m[r][c];
    let det = a(0, 0) * (a(1, 1) * a(2, 2) - a(1, 2) * a(2, 1))
        - a(0, 1) * (a(1, 0) * a(2, 2) - a(1, 2) * a(2, 0))
        + a(0, 2) * (a(1, 0) * a(2, 1) - a(1, 1) * a(2, 0));
    if det.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / det;

    let mut out = IDENTITY;
    out[0][0] = (a(1, 1) * a(2, 2) - a(1, 2) * a(2, 1)) * inv_det;
    out[0][1] = (a(0, 2) * a(2, 1) - a(0, 1) * a(2, 2)) * inv_det;
    out[0][2] = (a(0, 1) * a(1, 2) - a(0, 2) * a(1, 1)) * inv_det;
    out[1][0] = (a(1, 2) * a(2, 0) - a(1, 0) * a(2, 2)) * inv_det;
    out[1][1] = (a(0, 0) * a(2, 2) - a(0, 2) * a(2, 0)) * inv_det;
    out[1][2] = (a(0, 2) * a(1, 0) - a(0, 0) * a(1, 2)) * inv_det;
    out[2][0] = (a(1, 0) * a(2, 1) - a(1, 1) * a(2, 0)) * inv_det;
    out[2][1] = (a(0, 1) * a(2, 0) - a(0, 0) * a(2, 1)) * inv_det;
    out[2][2] = (a(0, 0) * a(1, 1) - a(0, 1) * a(1, 0)) * inv_det;

    // t' = -t * A^-1
    for c in 0..3 {
        out[3][c] = -(0..3).map(|k| m[3][k] * out[k][c]).sum::<f32>();
    }
    Some(out)
}

pub fn transform_point(m: &Mat4, p: [f32; 3]) -> [f32; 3] {
    let mut out = [0.0f32; 3];
    for (c, v) in out.iter_mut().enumerate() {
        *v = p[0] * m[0][c] + p[1] * m[1][c] + p[2] * m[2][c] + m[3][c];
    }
    out
}

pub fn normalize_quat(q: [f32; 4]) -> [f32; 4] {
    let len = q.iter().map(|v| v * v).sum::<f32>().sqrt();
    if len <= f32::EPSILON {
        [0.0, 0.0, 0.0, 1.0]
    } else {
        q.map(|v| v / len)
    }
}

/// Y-up to Z-up: a +90 degree rotation about X
pub fn y_up_to_z_up(v: [f32; 3]) -> [f32; 3] {
    [v[0], -v[2], v[1]]
}

/// Conjugate a rotation into the Z-up frame (rotate its axis)
pub fn y_up_to_z_up_quat(q: [f32; 4]) -> [f32; 4] {
    let [x, y, z] = y_up_to_z_up([q[0], q[1], q[2]]);
    [x, y, z, q[3]]
}

/// Scale factors follow the axis permutation
pub fn y_up_to_z_up_scale(s: [f32; 3]) -> [f32; 3] {
    [s[0], s[2], s[1]]
}

/// Row-major storage of a row-vector matrix equals glTF's column-major
/// storage of the matching column-vector matrix.
pub fn to_gltf_columns(m: &Mat4) -> [f32; 16] {
    let mut out = [0.0f32; 16];
    for (r, row) in m.iter().enumerate() {
        out[r * 4..r * 4 + 4].copy_from_slice(row);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_translation_then_parent() {
        let child = from_transform(&Transform {
            position: [1.0, 0.0, 0.0],
            ..Transform::IDENTITY
        });
        let parent = from_transform(&Transform {
            position: [0.0, 2.0, 0.0],
            ..Transform::IDENTITY
        });
        let world = multiply(&child, &parent);
        assert!(close(transform_point(&world, [0.0; 3]), [1.0, 2.0, 0.0]));
    }

    #[test]
    fn test_rotation_about_z() {
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let m = from_transform(&Transform {
            rotation: [0.0, 0.0, half, half],
            ..Transform::IDENTITY
        });
        assert!(close(transform_point(&m, [1.0, 0.0, 0.0]), [0.0, 1.0, 0.0]));
    }

    #[test]
    fn test_inverse_roundtrip() {
        let m = from_transform(&Transform {
            position: [3.0, -1.0, 2.0],
            rotation: [0.2, 0.4, 0.1, 0.9],
            scale: [2.0, 1.0, 0.5],
        });
        let inv = inverse_affine(&m).unwrap();
        let p = [0.3, 0.7, -1.1];
        assert!(close(transform_point(&inv, transform_point(&m, p)), p));
    }

    #[test]
    fn test_singular_matrix() {
        let m = from_transform(&Transform {
            scale: [0.0, 1.0, 1.0],
            ..Transform::IDENTITY
        });
        assert!(inverse_affine(&m).is_none());
    }

    #[test]
    fn test_axis_conversion() {
        assert_eq!(y_up_to_z_up([0.0, 1.0, 0.0]), [0.0, 0.0, 1.0]);
        assert_eq!(y_up_to_z_up([0.0, 0.0, 1.0]), [0.0, -1.0, 0.0]);
        assert_eq!(y_up_to_z_up_scale([1.0, 2.0, 3.0]), [1.0, 3.0, 2.0]);
    }
}
