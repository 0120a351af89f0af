//! Mask helpers
//!
//! Synthetic geometric masks (spheres, boxes) and voxel statistics shared by
//! the simplifier, the pipeline and the tests.

use crate::volume::{idx3d, Mask, Volume, IDENTITY_AFFINE};

/// Binary sphere mask on an isotropic 1 mm grid
///
/// Voxels within `radius` of `center` (voxel coordinates) are set to 1.
pub fn sphere_mask(dims: (usize, usize, usize), center: [f64; 3], radius: f64) -> Mask {
    let (nx, ny, nz) = dims;
    let mut data = vec![0u8; nx * ny * nz];
    let r2 = radius * radius;

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let dx = i as f64 - center[0];
                let dy = j as f64 - center[1];
                let dz = k as f64 - center[2];
                if dx * dx + dy * dy + dz * dz <= r2 {
                    data[idx3d(i, j, k, nx, ny)] = 1;
                }
            }
        }
    }

    Volume { data, dims, voxel_size: (1.0, 1.0, 1.0), affine: IDENTITY_AFFINE }
}

/// Set an axis-aligned box of voxels (inclusive lower, exclusive upper) to 1
pub fn fill_box(mask: &mut Mask, lo: (usize, usize, usize), hi: (usize, usize, usize)) {
    let (nx, ny, _) = mask.dims;
    for k in lo.2..hi.2 {
        for j in lo.1..hi.1 {
            for i in lo.0..hi.0 {
                mask.data[idx3d(i, j, k, nx, ny)] = 1;
            }
        }
    }
}

/// Centroid of the voxels where `select(index)` holds, in the mm grid frame
///
/// Returns None when nothing is selected.
pub fn centroid_mm<F>(mask: &Mask, select: F) -> Option<[f64; 3]>
where
    F: Fn(usize) -> bool,
{
    let (nx, ny, nz) = mask.dims;
    let mut sum = [0.0f64; 3];
    let mut count = 0usize;

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                if select(idx3d(i, j, k, nx, ny)) {
                    sum[0] += i as f64;
                    sum[1] += j as f64;
                    sum[2] += k as f64;
                    count += 1;
                }
            }
        }
    }

    if count == 0 {
        return None;
    }

    let n = count as f64;
    Some([
        sum[0] / n * mask.voxel_size.0,
        sum[1] / n * mask.voxel_size.1,
        sum[2] / n * mask.voxel_size.2,
    ])
}
