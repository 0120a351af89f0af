//! Gaussian smoothing of volumes
//!
//! Separable 1D convolutions along x, y and z. Samples outside the grid are
//! treated as zero, so a binary mask blurs down towards 0 at the border and
//! its 0.5 isosurface never touches the edge of a sufficiently padded grid.

/// Create a normalised 1D Gaussian kernel truncated at 3 sigma
fn make_gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (3.0 * sigma).ceil() as usize;
    let size = 2 * radius + 1;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut kernel: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();

    let sum: f64 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }

    kernel
}

/// Number of voxels the kernel reaches beyond a voxel (3 sigma, rounded up)
pub fn kernel_reach(sigma: f64) -> usize {
    if sigma > 0.0 {
        (3.0 * sigma).ceil() as usize
    } else {
        0
    }
}

/// Convolve every line along one axis with zero padding
///
/// `stride` is the flat-index step along the axis, `len` its extent.
fn convolve_axis(
    data: &[f64],
    kernel: &[f64],
    nx: usize, ny: usize, nz: usize,
    axis: usize,
) -> Vec<f64> {
    let (len, stride) = match axis {
        0 => (nx, 1),
        1 => (ny, nx),
        _ => (nz, nx * ny),
    };
    let half = (kernel.len() / 2) as isize;
    let mut out = vec![0.0; data.len()];
    let mut line = vec![0.0; len];

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                // Visit each line once, from its first voxel
                let first = match axis {
                    0 => i == 0,
                    1 => j == 0,
                    _ => k == 0,
                };
                if !first {
                    continue;
                }
                let start = i + j * nx + k * nx * ny;

                for (p, v) in line.iter_mut().enumerate() {
                    *v = data[start + p * stride];
                }

                for p in 0..len {
                    let mut sum = 0.0;
                    for (ki, &kv) in kernel.iter().enumerate() {
                        let q = p as isize + ki as isize - half;
                        if q >= 0 && (q as usize) < len {
                            sum += line[q as usize] * kv;
                        }
                    }
                    out[start + p * stride] = sum;
                }
            }
        }
    }

    out
}

/// Isotropic 3D Gaussian smoothing (sigma in voxels)
///
/// A non-positive sigma returns the input unchanged.
pub fn gaussian_smooth_3d(data: &[f64], nx: usize, ny: usize, nz: usize, sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 {
        return data.to_vec();
    }

    let kernel = make_gaussian_kernel(sigma);
    let smoothed_x = convolve_axis(data, &kernel, nx, ny, nz, 0);
    let smoothed_xy = convolve_axis(&smoothed_x, &kernel, nx, ny, nz, 1);
    convolve_axis(&smoothed_xy, &kernel, nx, ny, nz, 2)
}

/// Embed a volume in a larger zero-filled grid with `pad` voxels per side
///
/// Returns the padded data and its dimensions.
pub fn pad_zeros(
    data: &[f64],
    nx: usize, ny: usize, nz: usize,
    pad: usize,
) -> (Vec<f64>, (usize, usize, usize)) {
    let (px, py, pz) = (nx + 2 * pad, ny + 2 * pad, nz + 2 * pad);
    let mut out = vec![0.0; px * py * pz];

    for k in 0..nz {
        for j in 0..ny {
            let src = j * nx + k * nx * ny;
            let dst = pad + (j + pad) * px + (k + pad) * px * py;
            out[dst..dst + nx].copy_from_slice(&data[src..src + nx]);
        }
    }

    (out, (px, py, pz))
}
