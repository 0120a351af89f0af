//! Isosurface extraction by marching tetrahedra
//!
//! Every grid cube is split into the six Kuhn tetrahedra that share the
//! diagonal from corner 0 to corner 7. Neighbouring cubes then agree on every
//! face diagonal, so the triangles of adjacent cells meet edge to edge and
//! the output is watertight wherever the field stays below the iso-level at
//! the grid border. Vertices are shared through a map keyed on the grid edge
//! they lie on.

use std::collections::HashMap;

use super::mesh::{cross, dot, sub};
use crate::volume::idx3d;

/// Corner offsets (dx, dy, dz); corner c has x = bit 0, y = bit 1, z = bit 2
const CUBE_CORNER_OFFSETS: [(usize, usize, usize); 8] = [
    (0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 1, 0),
    (0, 0, 1), (1, 0, 1), (0, 1, 1), (1, 1, 1),
];

/// Kuhn decomposition: one tetrahedron per ordering of the three axes
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

struct Extractor<'a> {
    field: &'a [f64],
    dims: (usize, usize, usize),
    iso: f64,
    spacing: [f64; 3],
    shift: [f64; 3],
    vertices: Vec<[f64; 3]>,
    faces: Vec<[usize; 3]>,
    edge_vertex: HashMap<(usize, usize), usize>,
}

impl<'a> Extractor<'a> {
    #[inline]
    fn grid_position(&self, gid: usize) -> [f64; 3] {
        let (nx, ny, _) = self.dims;
        let i = gid % nx;
        let j = (gid / nx) % ny;
        let k = gid / (nx * ny);
        [
            (i as f64 + self.shift[0]) * self.spacing[0],
            (j as f64 + self.shift[1]) * self.spacing[1],
            (k as f64 + self.shift[2]) * self.spacing[2],
        ]
    }

    /// Vertex on the grid edge from an inside corner to an outside corner
    fn edge_vertex(&mut self, inside: usize, outside: usize) -> usize {
        let key = (inside.min(outside), inside.max(outside));
        if let Some(&v) = self.edge_vertex.get(&key) {
            return v;
        }

        let (va, vb) = (self.field[inside], self.field[outside]);
        // inside > iso >= outside, so the denominator is never zero
        let mu = (self.iso - va) / (vb - va);
        let pa = self.grid_position(inside);
        let pb = self.grid_position(outside);
        let p = [
            pa[0] + (pb[0] - pa[0]) * mu,
            pa[1] + (pb[1] - pa[1]) * mu,
            pa[2] + (pb[2] - pa[2]) * mu,
        ];

        let v = self.vertices.len();
        self.vertices.push(p);
        self.edge_vertex.insert(key, v);
        v
    }

    /// Emit a triangle, wound so its normal points from inside to outside
    fn emit(&mut self, tri: [usize; 3], outward: [f64; 3]) {
        let [a, b, c] = tri;
        if a == b || b == c || a == c {
            return;
        }
        let n = cross(
            sub(self.vertices[b], self.vertices[a]),
            sub(self.vertices[c], self.vertices[a]),
        );
        if dot(n, outward) < 0.0 {
            self.faces.push([a, c, b]);
        } else {
            self.faces.push([a, b, c]);
        }
    }

    fn tetrahedron(&mut self, corners: [usize; 4]) {
        let mut inside = Vec::with_capacity(4);
        let mut outside = Vec::with_capacity(4);
        for &g in &corners {
            if self.field[g] > self.iso {
                inside.push(g);
            } else {
                outside.push(g);
            }
        }
        if inside.is_empty() || outside.is_empty() {
            return;
        }

        let mean = |ids: &[usize], this: &Self| {
            let mut m = [0.0; 3];
            for &g in ids {
                let p = this.grid_position(g);
                m[0] += p[0];
                m[1] += p[1];
                m[2] += p[2];
            }
            let n = ids.len() as f64;
            [m[0] / n, m[1] / n, m[2] / n]
        };
        let outward = sub(mean(&outside, self), mean(&inside, self));

        match inside.len() {
            1 => {
                let a = inside[0];
                let t = [
                    self.edge_vertex(a, outside[0]),
                    self.edge_vertex(a, outside[1]),
                    self.edge_vertex(a, outside[2]),
                ];
                self.emit(t, outward);
            }
            3 => {
                let d = outside[0];
                let t = [
                    self.edge_vertex(inside[0], d),
                    self.edge_vertex(inside[1], d),
                    self.edge_vertex(inside[2], d),
                ];
                self.emit(t, outward);
            }
            _ => {
                // Quad around the tetrahedron: ac, ad, bd, bc
                let (a, b) = (inside[0], inside[1]);
                let (c, d) = (outside[0], outside[1]);
                let ac = self.edge_vertex(a, c);
                let ad = self.edge_vertex(a, d);
                let bd = self.edge_vertex(b, d);
                let bc = self.edge_vertex(b, c);
                self.emit([ac, ad, bd], outward);
                self.emit([ac, bd, bc], outward);
            }
        }
    }
}

/// Extract the `iso` level set of a scalar field
///
/// Voxels with value > `iso` are inside. Vertex positions are
/// `(grid index + shift) * spacing`, so a padded field can be mapped back to
/// the unpadded frame with a negative shift.
///
/// Returns (vertices, faces) with outward-wound faces.
pub fn extract_isosurface(
    field: &[f64],
    dims: (usize, usize, usize),
    iso: f64,
    spacing: [f64; 3],
    shift: [f64; 3],
) -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    let (nx, ny, nz) = dims;
    let mut ex = Extractor {
        field,
        dims,
        iso,
        spacing,
        shift,
        vertices: Vec::new(),
        faces: Vec::new(),
        edge_vertex: HashMap::new(),
    };

    if nx < 2 || ny < 2 || nz < 2 {
        return (ex.vertices, ex.faces);
    }

    for z in 0..(nz - 1) {
        for y in 0..(ny - 1) {
            for x in 0..(nx - 1) {
                let mut gids = [0usize; 8];
                let mut n_inside = 0;
                for (c, &(dx, dy, dz)) in CUBE_CORNER_OFFSETS.iter().enumerate() {
                    gids[c] = idx3d(x + dx, y + dy, z + dz, nx, ny);
                    if field[gids[c]] > iso {
                        n_inside += 1;
                    }
                }
                if n_inside == 0 || n_inside == 8 {
                    continue;
                }

                for tet in &TETRAHEDRA {
                    ex.tetrahedron([gids[tet[0]], gids[tet[1]], gids[tet[2]], gids[tet[3]]]);
                }
            }
        }
    }

    (ex.vertices, ex.faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::mesh::{enclosed_volume, is_closed_oriented};

    fn sphere_field(n: usize, radius: f64) -> Vec<f64> {
        let c = (n as f64 - 1.0) / 2.0;
        let mut field = vec![0.0; n * n * n];
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    let d = ((i as f64 - c).powi(2) + (j as f64 - c).powi(2) + (k as f64 - c).powi(2)).sqrt();
                    // Linear ramp through 0.5 at the sphere radius
                    field[idx3d(i, j, k, n, n)] = (0.5 + (radius - d) * 0.25).clamp(0.0, 1.0);
                }
            }
        }
        field
    }

    #[test]
    fn test_single_voxel_gives_closed_octahedron_like_surface() {
        let n = 3;
        let mut field = vec![0.0; n * n * n];
        field[idx3d(1, 1, 1, n, n)] = 1.0;

        let (v, f) = extract_isosurface(&field, (n, n, n), 0.5, [1.0; 3], [0.0; 3]);
        assert!(!f.is_empty());
        assert!(is_closed_oriented(&f));
        assert!(enclosed_volume(&v, &f) > 0.0);
    }

    #[test]
    fn test_sphere_is_closed_and_round() {
        let n = 24;
        let radius = 8.0;
        let field = sphere_field(n, radius);
        let (v, f) = extract_isosurface(&field, (n, n, n), 0.5, [1.0; 3], [0.0; 3]);

        assert!(is_closed_oriented(&f), "surface should be watertight");

        let c = (n as f64 - 1.0) / 2.0;
        for p in &v {
            let d = ((p[0] - c).powi(2) + (p[1] - c).powi(2) + (p[2] - c).powi(2)).sqrt();
            assert!((d - radius).abs() < 0.6, "vertex at distance {}", d);
        }

        let vol = enclosed_volume(&v, &f);
        let expected = 4.0 / 3.0 * std::f64::consts::PI * radius.powi(3);
        assert!((vol - expected).abs() / expected < 0.05, "volume {} vs {}", vol, expected);
    }

    #[test]
    fn test_shift_and_spacing() {
        let n = 3;
        let mut field = vec![0.0; n * n * n];
        field[idx3d(1, 1, 1, n, n)] = 1.0;

        let (v0, _) = extract_isosurface(&field, (n, n, n), 0.5, [1.0; 3], [0.0; 3]);
        let (v1, _) = extract_isosurface(&field, (n, n, n), 0.5, [2.0, 2.0, 2.0], [-1.0, -1.0, -1.0]);
        for (a, b) in v0.iter().zip(v1.iter()) {
            for axis in 0..3 {
                assert!(((a[axis] - 1.0) * 2.0 - b[axis]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_empty_field_has_no_surface() {
        let field = vec![0.0; 27];
        let (v, f) = extract_isosurface(&field, (3, 3, 3), 0.5, [1.0; 3], [0.0; 3]);
        assert!(v.is_empty() && f.is_empty());
    }
}
