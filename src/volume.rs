//! Voxel volumes and binary masks
//!
//! Data is stored flat in Fortran order to match NIfTI:
//! index = x + y*nx + z*nx*ny. Physical positions used by the engine are in
//! the millimetre grid frame `index * voxel_size` (no rotation); the affine is
//! only needed to map results back to scanner space.

use crate::error::{Result, VirtueError};

/// Identity affine (row-major 4x4)
pub const IDENTITY_AFFINE: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

/// Flat Fortran-order index
#[inline(always)]
pub fn idx3d(i: usize, j: usize, k: usize, nx: usize, ny: usize) -> usize {
    i + j * nx + k * nx * ny
}

/// A 3-D voxel array with its geometry
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    pub data: Vec<T>,
    pub dims: (usize, usize, usize),
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Voxel-to-scanner affine (4x4, row-major)
    pub affine: [f64; 16],
}

/// Binary volume, values restricted to {0, 1}
pub type Mask = Volume<u8>;

impl<T> Volume<T> {
    pub fn new(
        data: Vec<T>,
        dims: (usize, usize, usize),
        voxel_size: (f64, f64, f64),
        affine: [f64; 16],
    ) -> Result<Self> {
        let expected = dims.0 * dims.1 * dims.2;
        if data.len() != expected {
            return Err(VirtueError::geometry(format!(
                "volume has {} voxels but dimensions {:?} imply {}",
                data.len(),
                dims,
                expected
            )));
        }
        if voxel_size.0 <= 0.0 || voxel_size.1 <= 0.0 || voxel_size.2 <= 0.0 {
            return Err(VirtueError::geometry(format!(
                "voxel sizes must be positive, got {:?}",
                voxel_size
            )));
        }
        Ok(Self { data, dims, voxel_size, affine })
    }

    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        idx3d(i, j, k, self.dims.0, self.dims.1)
    }

    pub fn n_voxels(&self) -> usize {
        self.data.len()
    }

    /// Position of voxel (i, j, k) in the mm grid frame
    #[inline]
    pub fn position_mm(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        [
            i as f64 * self.voxel_size.0,
            j as f64 * self.voxel_size.1,
            k as f64 * self.voxel_size.2,
        ]
    }

    /// True when both volumes share dimensions and voxel size
    pub fn same_grid<U>(&self, other: &Volume<U>) -> bool {
        let (a, b) = (self.voxel_size, other.voxel_size);
        self.dims == other.dims
            && (a.0 - b.0).abs() < 1e-6
            && (a.1 - b.1).abs() < 1e-6
            && (a.2 - b.2).abs() < 1e-6
    }

    /// Map a point in the mm grid frame to scanner coordinates
    pub fn mm_to_scanner(&self, p: [f64; 3]) -> [f64; 3] {
        let v = [
            p[0] / self.voxel_size.0,
            p[1] / self.voxel_size.1,
            p[2] / self.voxel_size.2,
        ];
        let a = &self.affine;
        [
            a[0] * v[0] + a[1] * v[1] + a[2] * v[2] + a[3],
            a[4] * v[0] + a[5] * v[1] + a[6] * v[2] + a[7],
            a[8] * v[0] + a[9] * v[1] + a[10] * v[2] + a[11],
        ]
    }
}

impl Volume<f64> {
    /// Binarise a scalar image (value > threshold)
    pub fn to_mask(&self, threshold: f64) -> Mask {
        Volume {
            data: self.data.iter().map(|&v| u8::from(v > threshold)).collect(),
            dims: self.dims,
            voxel_size: self.voxel_size,
            affine: self.affine,
        }
    }
}

impl Mask {
    /// Number of foreground voxels
    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&v| v > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Mask as 0.0 / 1.0 values
    pub fn to_f64(&self) -> Vec<f64> {
        self.data.iter().map(|&v| if v > 0 { 1.0 } else { 0.0 }).collect()
    }

    /// Tight bounding box of the foreground, None for an empty mask
    pub fn bounding_box(&self) -> Option<Region> {
        let (nx, ny, nz) = self.dims;
        let mut lo = [usize::MAX; 3];
        let mut hi = [0usize; 3];
        let mut found = false;

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    if self.data[idx3d(i, j, k, nx, ny)] == 0 {
                        continue;
                    }
                    found = true;
                    for (axis, c) in [i, j, k].into_iter().enumerate() {
                        lo[axis] = lo[axis].min(c);
                        hi[axis] = hi[axis].max(c);
                    }
                }
            }
        }

        found.then(|| Region {
            offset: (lo[0], lo[1], lo[2]),
            dims: (hi[0] - lo[0] + 1, hi[1] - lo[1] + 1, hi[2] - lo[2] + 1),
        })
    }
}

/// Axis-aligned sub-grid of a volume (offset and extent in voxels)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub offset: (usize, usize, usize),
    pub dims: (usize, usize, usize),
}

impl Region {
    /// Whole-volume region
    pub fn full(dims: (usize, usize, usize)) -> Self {
        Self { offset: (0, 0, 0), dims }
    }

    /// Grow by `margin` voxels on every side, clipped to `bounds`
    pub fn expand(&self, margin: usize, bounds: (usize, usize, usize)) -> Self {
        let grow = |off: usize, len: usize, max: usize| {
            let lo = off.saturating_sub(margin);
            let hi = (off + len + margin).min(max);
            (lo, hi - lo)
        };
        let (ox, dx) = grow(self.offset.0, self.dims.0, bounds.0);
        let (oy, dy) = grow(self.offset.1, self.dims.1, bounds.1);
        let (oz, dz) = grow(self.offset.2, self.dims.2, bounds.2);
        Self { offset: (ox, oy, oz), dims: (dx, dy, dz) }
    }

    pub fn n_voxels(&self) -> usize {
        self.dims.0 * self.dims.1 * self.dims.2
    }

    /// Whether (i, j, k) in parent coordinates lies inside the region
    pub fn contains(&self, i: usize, j: usize, k: usize) -> bool {
        let (ox, oy, oz) = self.offset;
        let (dx, dy, dz) = self.dims;
        i >= ox && i < ox + dx && j >= oy && j < oy + dy && k >= oz && k < oz + dz
    }
}
