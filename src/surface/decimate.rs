//! Quadric-error edge-collapse decimation
//!
//! Garland-Heckbert simplification: each vertex carries the sum of the
//! area-weighted plane quadrics of its faces, edges are collapsed cheapest
//! first from a binary heap, and stale heap entries are skipped through
//! per-vertex version stamps. A collapse is only accepted when it keeps the
//! mesh a closed, consistently oriented 2-manifold (link condition) and no
//! surrounding face flips over.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::mesh::{compact, dot, face_normal, norm, sub};

/// Upper triangle of the symmetric 4x4 quadric:
/// [a2, ab, ac, ad, b2, bc, bd, c2, cd, d2]
type Quadric = [f64; 10];

/// Faces around a collapse may not turn further than this (cosine)
const MIN_NORMAL_COSINE: f64 = 0.1;

/// Never collapse a closed mesh below a tetrahedron
const MIN_FACES: usize = 4;

fn plane_quadric(v0: [f64; 3], v1: [f64; 3], v2: [f64; 3]) -> Quadric {
    let n = face_normal(v0, v1, v2);
    let len = norm(n);
    if len < 1e-15 {
        return [0.0; 10];
    }
    // |n| is twice the area; weight planes by area
    let area = 0.5 * len;
    let (a, b, c) = (n[0] / len, n[1] / len, n[2] / len);
    let d = -(a * v0[0] + b * v0[1] + c * v0[2]);
    [
        a * a * area, a * b * area, a * c * area, a * d * area,
        b * b * area, b * c * area, b * d * area,
        c * c * area, c * d * area,
        d * d * area,
    ]
}

#[inline]
fn add_quadric(q: &mut Quadric, r: &Quadric) {
    for (a, b) in q.iter_mut().zip(r.iter()) {
        *a += b;
    }
}

#[inline]
fn quadric_error(q: &Quadric, p: [f64; 3]) -> f64 {
    let [x, y, z] = p;
    q[0] * x * x + 2.0 * q[1] * x * y + 2.0 * q[2] * x * z + 2.0 * q[3] * x
        + q[4] * y * y + 2.0 * q[5] * y * z + 2.0 * q[6] * y
        + q[7] * z * z + 2.0 * q[8] * z
        + q[9]
}

/// Minimiser of the quadric, or None when the 3x3 system is near singular
fn quadric_minimum(q: &Quadric) -> Option<[f64; 3]> {
    let m = [[q[0], q[1], q[2]], [q[1], q[4], q[5]], [q[2], q[5], q[7]]];
    let rhs = [-q[3], -q[6], -q[8]];

    let det3 = |m: &[[f64; 3]; 3]| {
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    };

    let det = det3(&m);
    let scale = q[0] + q[4] + q[7];
    if scale <= 0.0 || det.abs() <= 1e-10 * scale * scale * scale {
        return None;
    }

    // Cramer's rule
    let mut x = [0.0; 3];
    for (col, xi) in x.iter_mut().enumerate() {
        let mut mc = m;
        for row in 0..3 {
            mc[row][col] = rhs[row];
        }
        *xi = det3(&mc) / det;
    }
    Some(x)
}

/// Heap entry for a candidate collapse of `v` into `u`
#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: f64,
    u: usize,
    v: usize,
    stamp_u: u32,
    stamp_v: u32,
    position: [f64; 3],
}

impl Ord for Candidate {
    // Reversed so BinaryHeap pops the cheapest collapse first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.u.cmp(&self.u))
            .then_with(|| other.v.cmp(&self.v))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

struct Decimator {
    positions: Vec<[f64; 3]>,
    quadrics: Vec<Quadric>,
    faces: Vec<[usize; 3]>,
    face_alive: Vec<bool>,
    vertex_faces: Vec<Vec<usize>>,
    vertex_alive: Vec<bool>,
    stamps: Vec<u32>,
    heap: BinaryHeap<Candidate>,
    alive_faces: usize,
}

impl Decimator {
    fn new(vertices: &[[f64; 3]], faces: &[[usize; 3]]) -> Self {
        let n = vertices.len();
        let mut quadrics = vec![[0.0; 10]; n];
        let mut vertex_faces = vec![Vec::new(); n];

        for (fi, &[a, b, c]) in faces.iter().enumerate() {
            let q = plane_quadric(vertices[a], vertices[b], vertices[c]);
            for &v in &[a, b, c] {
                add_quadric(&mut quadrics[v], &q);
                vertex_faces[v].push(fi);
            }
        }

        let mut dec = Decimator {
            positions: vertices.to_vec(),
            quadrics,
            faces: faces.to_vec(),
            face_alive: vec![true; faces.len()],
            vertex_faces,
            vertex_alive: vec![true; n],
            stamps: vec![0; n],
            heap: BinaryHeap::new(),
            alive_faces: faces.len(),
        };

        let mut edges: Vec<(usize, usize)> = faces
            .iter()
            .flat_map(|&[a, b, c]| [(a, b), (b, c), (c, a)])
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect();
        edges.sort_unstable();
        edges.dedup();
        for (a, b) in edges {
            dec.push_candidate(a, b);
        }

        dec
    }

    fn push_candidate(&mut self, u: usize, v: usize) {
        let mut q = self.quadrics[u];
        add_quadric(&mut q, &self.quadrics[v]);

        let pu = self.positions[u];
        let pv = self.positions[v];
        let mid = [(pu[0] + pv[0]) / 2.0, (pu[1] + pv[1]) / 2.0, (pu[2] + pv[2]) / 2.0];
        let edge_len = norm(sub(pv, pu));

        let mut options = Vec::with_capacity(4);
        if let Some(p) = quadric_minimum(&q) {
            // The optimum of a nearly flat patch can lie far off the edge
            if norm(sub(p, mid)) <= edge_len {
                options.push(p);
            }
        }
        options.extend_from_slice(&[mid, pu, pv]);

        let mut best = (f64::INFINITY, mid);
        for p in options {
            let cost = quadric_error(&q, p);
            if cost < best.0 {
                best = (cost, p);
            }
        }

        self.heap.push(Candidate {
            cost: best.0.max(0.0),
            u,
            v,
            stamp_u: self.stamps[u],
            stamp_v: self.stamps[v],
            position: best.1,
        });
    }

    fn incident(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.vertex_faces[v].iter().copied().filter(move |&f| self.face_alive[f])
    }

    fn neighbours(&self, v: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .incident(v)
            .flat_map(|f| self.faces[f])
            .filter(|&w| w != v)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Link condition plus normal-flip test for collapsing `v` into `u` at `p`
    fn can_collapse(&self, u: usize, v: usize, p: [f64; 3]) -> bool {
        let shared = self
            .incident(u)
            .filter(|&f| self.faces[f].contains(&v))
            .count();
        if shared != 2 {
            return false;
        }

        let nu = self.neighbours(u);
        let nv = self.neighbours(v);
        let common = nu.iter().filter(|w| nv.binary_search(w).is_ok()).count();
        if common != 2 {
            return false;
        }

        for &moving in &[u, v] {
            for f in self.incident(moving) {
                let face = self.faces[f];
                if face.contains(&u) && face.contains(&v) {
                    continue;
                }
                let old: Vec<[f64; 3]> = face.iter().map(|&w| self.positions[w]).collect();
                let new: Vec<[f64; 3]> = face
                    .iter()
                    .map(|&w| if w == moving { p } else { self.positions[w] })
                    .collect();
                let n_old = face_normal(old[0], old[1], old[2]);
                let n_new = face_normal(new[0], new[1], new[2]);
                let (l_old, l_new) = (norm(n_old), norm(n_new));
                if l_old < 1e-15 {
                    continue;
                }
                if l_new < 1e-12 * l_old.max(1.0) {
                    return false;
                }
                if dot(n_old, n_new) / (l_old * l_new) < MIN_NORMAL_COSINE {
                    return false;
                }
            }
        }

        true
    }

    fn collapse(&mut self, u: usize, v: usize, p: [f64; 3]) {
        let v_faces: Vec<usize> = self.incident(v).collect();
        for f in v_faces {
            let face = &mut self.faces[f];
            if face.contains(&u) {
                self.face_alive[f] = false;
                self.alive_faces -= 1;
            } else {
                for w in face.iter_mut() {
                    if *w == v {
                        *w = u;
                    }
                }
                self.vertex_faces[u].push(f);
            }
        }

        let removed_from = self.neighbours(u);
        for w in removed_from {
            let alive = &self.face_alive;
            self.vertex_faces[w].retain(|&f| alive[f]);
        }
        let alive = &self.face_alive;
        self.vertex_faces[u].retain(|&f| alive[f]);
        self.vertex_faces[v].clear();

        let qv = self.quadrics[v];
        add_quadric(&mut self.quadrics[u], &qv);
        self.positions[u] = p;
        self.vertex_alive[v] = false;
        self.stamps[u] += 1;
        self.stamps[v] += 1;

        for w in self.neighbours(u) {
            self.push_candidate(u.min(w), u.max(w));
        }
    }

    fn run(&mut self, target_faces: usize) {
        let floor = target_faces.max(MIN_FACES);
        while self.alive_faces > floor {
            let Some(c) = self.heap.pop() else {
                break;
            };
            if !self.vertex_alive[c.u]
                || !self.vertex_alive[c.v]
                || self.stamps[c.u] != c.stamp_u
                || self.stamps[c.v] != c.stamp_v
            {
                continue;
            }
            if !self.can_collapse(c.u, c.v, c.position) {
                continue;
            }
            self.collapse(c.u, c.v, c.position);
        }
    }
}

/// Reduce a closed mesh to at most `target_faces` triangles where possible
///
/// The result is compacted (no unreferenced vertices). When the mesh runs out
/// of admissible collapses first, the face count stays above the target; the
/// caller decides how to report that.
pub fn decimate(
    vertices: &[[f64; 3]],
    faces: &[[usize; 3]],
    target_faces: usize,
) -> (Vec<[f64; 3]>, Vec<[usize; 3]>) {
    if faces.len() <= target_faces {
        return compact(vertices, faces);
    }

    let mut dec = Decimator::new(vertices, faces);
    dec.run(target_faces);

    let kept: Vec<[usize; 3]> = dec
        .faces
        .iter()
        .zip(dec.face_alive.iter())
        .filter(|(_, &alive)| alive)
        .map(|(f, _)| *f)
        .collect();
    compact(&dec.positions, &kept)
}
