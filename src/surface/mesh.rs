//! Triangle mesh utilities
//!
//! Meshes are plain `(vertices, faces)` pairs: `Vec<[f64; 3]>` positions and
//! `Vec<[usize; 3]>` counter-clockwise (outward) vertex indices.

use std::collections::HashMap;

#[inline]
pub fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Un-normalised face normal (length = twice the triangle area)
#[inline]
pub fn face_normal(v0: [f64; 3], v1: [f64; 3], v2: [f64; 3]) -> [f64; 3] {
    cross(sub(v1, v0), sub(v2, v0))
}

/// Centroid of every face (mean of its three vertices)
pub fn face_centroids(vertices: &[[f64; 3]], faces: &[[usize; 3]]) -> Vec<[f64; 3]> {
    faces
        .iter()
        .map(|&[i0, i1, i2]| {
            let (a, b, c) = (vertices[i0], vertices[i1], vertices[i2]);
            [
                (a[0] + b[0] + c[0]) / 3.0,
                (a[1] + b[1] + c[1]) / 3.0,
                (a[2] + b[2] + c[2]) / 3.0,
            ]
        })
        .collect()
}

/// Signed volume enclosed by a closed mesh (positive for outward winding)
pub fn enclosed_volume(vertices: &[[f64; 3]], faces: &[[usize; 3]]) -> f64 {
    faces
        .iter()
        .map(|&[i0, i1, i2]| dot(vertices[i0], cross(vertices[i1], vertices[i2])) / 6.0)
        .sum()
}

/// True when every directed edge appears exactly once and its reverse
/// exactly once: a closed, consistently oriented 2-manifold edge structure
pub fn is_closed_oriented(faces: &[[usize; 3]]) -> bool {
    let mut directed: HashMap<(usize, usize), usize> = HashMap::with_capacity(faces.len() * 3);

    for &[i0, i1, i2] in faces {
        for &(a, b) in &[(i0, i1), (i1, i2), (i2, i0)] {
            if a == b {
                return false;
            }
            *directed.entry((a, b)).or_insert(0) += 1;
        }
    }

    directed
        .iter()
        .all(|(&(a, b), &n)| n == 1 && directed.get(&(b, a)) == Some(&1))
}

/// Drop vertices not referenced by any face and renumber the faces
pub fn compact(vertices: &[[f64; 3]], faces: &[[usize; 3]]) -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    let mut remap = vec![usize::MAX; vertices.len()];
    let mut new_vertices = Vec::new();

    let new_faces = faces
        .iter()
        .map(|face| {
            let mut out = [0usize; 3];
            for (slot, &v) in out.iter_mut().zip(face.iter()) {
                if remap[v] == usize::MAX {
                    remap[v] = new_vertices.len();
                    new_vertices.push(vertices[v]);
                }
                *slot = remap[v];
            }
            out
        })
        .collect();

    (new_vertices, new_faces)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Unit-ish tetrahedron with outward winding
    pub(crate) fn tetrahedron() -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
        let vertices = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let faces = vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]];
        (vertices, faces)
    }

    #[test]
    fn test_tetrahedron_is_closed_and_outward() {
        let (v, f) = tetrahedron();
        assert!(is_closed_oriented(&f));
        let vol = enclosed_volume(&v, &f);
        assert!((vol - 1.0 / 6.0).abs() < 1e-12, "volume {}", vol);
    }

    #[test]
    fn test_open_mesh_detected() {
        let (_, f) = tetrahedron();
        assert!(!is_closed_oriented(&f[..3]));

        // Flipping one face breaks orientation
        let mut flipped = f.clone();
        flipped[0] = [0, 1, 2];
        assert!(!is_closed_oriented(&flipped));
    }

    #[test]
    fn test_centroids() {
        let (v, f) = tetrahedron();
        let c = face_centroids(&v, &f);
        assert_eq!(c.len(), 4);
        assert!((c[3][0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((c[3][1] - 1.0 / 3.0).abs() < 1e-12);
        assert!((c[3][2] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_compact_drops_dangling_vertices() {
        let (mut v, f) = tetrahedron();
        v.insert(0, [9.0, 9.0, 9.0]);
        let shifted: Vec<[usize; 3]> = f.iter().map(|t| [t[0] + 1, t[1] + 1, t[2] + 1]).collect();
        let (cv, cf) = compact(&v, &shifted);
        assert_eq!(cv.len(), 4);
        assert!(cf.iter().flatten().all(|&i| i < 4));
        assert!(is_closed_oriented(&cf));
    }
}
