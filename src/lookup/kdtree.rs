//! Static 3D k-d tree for k-nearest-neighbour queries
//!
//! Built once over a point set by recursive median splits on an implicit
//! index array (no node allocation). Queries return the k nearest points by
//! Euclidean distance, ties broken by point index so results are
//! deterministic.

#[derive(Debug, Clone)]
pub struct KdTree {
    points: Vec<[f64; 3]>,
    /// Point indices; each subrange [lo, hi) stores its split point at the middle
    order: Vec<usize>,
    /// Split axis per middle position of `order`
    axes: Vec<u8>,
}

impl KdTree {
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        let n = points.len();
        let mut tree = KdTree { points, order: (0..n).collect(), axes: vec![0; n] };
        tree.build(0, n);
        tree
    }

    fn build(&mut self, lo: usize, hi: usize) {
        if hi - lo <= 1 {
            return;
        }

        // Split on the axis of largest spread
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for &i in &self.order[lo..hi] {
            for a in 0..3 {
                min[a] = min[a].min(self.points[i][a]);
                max[a] = max[a].max(self.points[i][a]);
            }
        }
        let axis = (0..3)
            .max_by(|&a, &b| (max[a] - min[a]).total_cmp(&(max[b] - min[b])))
            .unwrap_or(0);

        let mid = lo + (hi - lo) / 2;
        let points = &self.points;
        self.order[lo..hi].select_nth_unstable_by(mid - lo, |&a, &b| {
            points[a][axis].total_cmp(&points[b][axis]).then(a.cmp(&b))
        });
        self.axes[mid] = axis as u8;

        self.build(lo, mid);
        self.build(mid + 1, hi);
    }

    /// The `k` nearest points to `q` as (squared distance, index), nearest first
    pub fn nearest(&self, q: [f64; 3], k: usize) -> Vec<(f64, usize)> {
        let mut best: Vec<(f64, usize)> = Vec::with_capacity(k + 1);
        if k > 0 {
            self.search(0, self.points.len(), q, k, &mut best);
        }
        best
    }

    fn search(&self, lo: usize, hi: usize, q: [f64; 3], k: usize, best: &mut Vec<(f64, usize)>) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let idx = self.order[mid];
        let p = self.points[idx];
        let d2 = (p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2) + (p[2] - q[2]).powi(2);
        insert_bounded(best, (d2, idx), k);

        if hi - lo == 1 {
            return;
        }

        let axis = self.axes[mid] as usize;
        let diff = q[axis] - p[axis];
        let (near, far) = if diff < 0.0 { ((lo, mid), (mid + 1, hi)) } else { ((mid + 1, hi), (lo, mid)) };

        self.search(near.0, near.1, q, k, best);
        let worst = if best.len() < k { f64::INFINITY } else { best[best.len() - 1].0 };
        if diff * diff <= worst {
            self.search(far.0, far.1, q, k, best);
        }
    }
}

/// Keep `best` sorted by (distance, index) and at most `k` long
fn insert_bounded(best: &mut Vec<(f64, usize)>, cand: (f64, usize), k: usize) {
    let pos = best
        .iter()
        .position(|&(d, i)| cand.0.total_cmp(&d).then(cand.1.cmp(&i)).is_lt())
        .unwrap_or(best.len());
    if pos < k {
        best.insert(pos, cand);
        best.truncate(k);
    }
}
