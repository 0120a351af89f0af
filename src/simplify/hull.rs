//! Incremental 3D convex hull on voxel index coordinates
//!
//! Beneath-beyond insertion: a new point removes every face it can see and
//! is joined to the horizon. Points are integer voxel indices, so face
//! normals (cross products of index differences) and plane offsets are exact
//! integers in f64 and every orientation test is exact.

use std::collections::HashMap;

use crate::surface::mesh::{cross, dot, sub};

#[derive(Debug, Clone)]
pub struct ConvexHull {
    points: Vec<[f64; 3]>,
    /// Faces wound counter-clockwise seen from outside
    faces: Vec<[usize; 3]>,
    /// Outward, un-normalised face normals
    normals: Vec<[f64; 3]>,
}

impl ConvexHull {
    /// Hull of a point set, or None when the points are coplanar, collinear
    /// or fewer than four
    pub fn build(points: &[[f64; 3]]) -> Option<Self> {
        let seed = initial_tetrahedron(points)?;

        let mut hull = ConvexHull { points: points.to_vec(), faces: Vec::new(), normals: Vec::new() };

        let [a, b, c, d] = seed;
        let interior = {
            let (pa, pb, pc, pd) = (points[a], points[b], points[c], points[d]);
            [
                (pa[0] + pb[0] + pc[0] + pd[0]) / 4.0,
                (pa[1] + pb[1] + pc[1] + pd[1]) / 4.0,
                (pa[2] + pb[2] + pc[2] + pd[2]) / 4.0,
            ]
        };
        for face in [[a, b, c], [a, c, d], [a, d, b], [b, d, c]] {
            hull.push_face(face, interior);
        }

        for p in 0..points.len() {
            if seed.contains(&p) {
                continue;
            }
            hull.insert(p);
        }

        Some(hull)
    }

    fn push_face(&mut self, face: [usize; 3], interior: [f64; 3]) {
        let [a, b, c] = face;
        let n = cross(sub(self.points[b], self.points[a]), sub(self.points[c], self.points[a]));
        if dot(n, sub(interior, self.points[a])) > 0.0 {
            self.faces.push([a, c, b]);
            self.normals.push([-n[0], -n[1], -n[2]]);
        } else {
            self.faces.push(face);
            self.normals.push(n);
        }
    }

    /// Signed offset of `p` from the plane of face `f` (an exact integer)
    #[inline]
    fn height(&self, f: usize, p: [f64; 3]) -> f64 {
        dot(self.normals[f], sub(p, self.points[self.faces[f][0]]))
    }

    fn insert(&mut self, p: usize) {
        let q = self.points[p];
        let mut visible: Vec<bool> = (0..self.faces.len()).map(|f| self.height(f, q) > 0.5).collect();
        if !visible.iter().any(|&v| v) {
            return;
        }

        let mut face_of_edge: HashMap<(usize, usize), usize> = HashMap::with_capacity(self.faces.len() * 3);
        for (f, &[a, b, c]) in self.faces.iter().enumerate() {
            for e in [(a, b), (b, c), (c, a)] {
                face_of_edge.insert(e, f);
            }
        }

        // Coplanar faces joined to the visible region are replaced too, so no
        // new face can be degenerate
        let mut stack: Vec<usize> = (0..visible.len()).filter(|&f| visible[f]).collect();
        while let Some(f) = stack.pop() {
            let [a, b, c] = self.faces[f];
            for (x, y) in [(a, b), (b, c), (c, a)] {
                if let Some(&g) = face_of_edge.get(&(y, x)) {
                    if !visible[g] && self.height(g, q) > -0.5 {
                        visible[g] = true;
                        stack.push(g);
                    }
                }
            }
        }

        // Horizon: directed edges of visible faces whose twin lies on a hidden face
        let mut horizon = Vec::new();
        for (f, &[a, b, c]) in self.faces.iter().enumerate() {
            if !visible[f] {
                continue;
            }
            for (x, y) in [(a, b), (b, c), (c, a)] {
                match face_of_edge.get(&(y, x)) {
                    Some(&g) if visible[g] => {}
                    _ => horizon.push((x, y)),
                }
            }
        }

        let mut faces = Vec::with_capacity(self.faces.len() + horizon.len());
        let mut normals = Vec::with_capacity(self.faces.len() + horizon.len());
        for (f, &vis) in visible.iter().enumerate() {
            if !vis {
                faces.push(self.faces[f]);
                normals.push(self.normals[f]);
            }
        }
        self.faces = faces;
        self.normals = normals;

        for (a, b) in horizon {
            let n = cross(sub(self.points[b], self.points[a]), sub(q, self.points[a]));
            self.faces.push([a, b, p]);
            self.normals.push(n);
        }
    }

    /// True when `q` lies inside or on the hull
    pub fn contains(&self, q: [f64; 3]) -> bool {
        self.faces
            .iter()
            .zip(self.normals.iter())
            .all(|(f, &n)| dot(n, sub(q, self.points[f[0]])) <= 1e-9)
    }

    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }
}

/// Four affinely independent points: first point, farthest from it,
/// farthest from that line, farthest from that plane
fn initial_tetrahedron(points: &[[f64; 3]]) -> Option<[usize; 4]> {
    if points.len() < 4 {
        return None;
    }
    let a = 0;

    let b = argmax(points, |p| dot(sub(p, points[a]), sub(p, points[a])))?;
    let ab = sub(points[b], points[a]);

    let c = argmax(points, |p| {
        let n = cross(ab, sub(p, points[a]));
        dot(n, n)
    })?;
    let n = cross(ab, sub(points[c], points[a]));

    let d = argmax(points, |p| dot(n, sub(p, points[a])).abs())?;

    Some([a, b, c, d])
}

/// Index of the largest strictly positive score
fn argmax<F>(points: &[[f64; 3]], score: F) -> Option<usize>
where
    F: Fn([f64; 3]) -> f64,
{
    let mut best = None;
    let mut best_score = 0.0;
    for (i, &p) in points.iter().enumerate() {
        let s = score(p);
        if s > best_score {
            best_score = s;
            best = Some(i);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::mesh::is_closed_oriented;

    fn cube_points(n: usize) -> Vec<[f64; 3]> {
        let mut pts = Vec::new();
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    pts.push([i as f64, j as f64, k as f64]);
                }
            }
        }
        pts
    }

    #[test]
    fn test_cube_hull_contains_lattice_only() {
        let hull = ConvexHull::build(&cube_points(4)).unwrap();
        assert!(is_closed_oriented(hull.faces()));
        assert!(hull.contains([1.5, 1.5, 1.5]));
        assert!(hull.contains([0.0, 3.0, 3.0]));
        assert!(!hull.contains([3.5, 1.0, 1.0]));
        assert!(!hull.contains([-0.1, 0.0, 0.0]));
    }

    #[test]
    fn test_l_shape_hull_fills_notch() {
        // L-shaped slab: the notch corner lies inside the hull
        let mut pts = Vec::new();
        for k in 0..2 {
            for j in 0..6 {
                for i in 0..6 {
                    if i < 2 || j < 2 {
                        pts.push([i as f64, j as f64, k as f64]);
                    }
                }
            }
        }
        let hull = ConvexHull::build(&pts).unwrap();
        assert!(hull.contains([3.0, 3.0, 1.0]));
        assert!(!hull.contains([5.0, 5.0, 0.0]));
        assert!(is_closed_oriented(hull.faces()));
    }

    #[test]
    fn test_coplanar_points_are_degenerate() {
        let pts: Vec<[f64; 3]> = (0..9).map(|i| [(i % 3) as f64, (i / 3) as f64, 2.0]).collect();
        assert!(ConvexHull::build(&pts).is_none());
        assert!(ConvexHull::build(&[[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]).is_none());
    }
}
