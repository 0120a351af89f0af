//! Mask simplification
//!
//! Reduces a tumour segmentation to a single solid region: the largest
//! 26-connected component, optionally replaced by its convex hull image.
//! The growth centre is the centroid of that component before the hull is
//! applied.

pub mod hull;

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::error::{Result, VirtueError};
use crate::utils::mask::centroid_mm;
use crate::volume::{idx3d, Mask, Region};
use hull::ConvexHull;

/// Simplified mask and the growth centre (mm, grid frame)
#[derive(Debug, Clone)]
pub struct Simplified {
    pub mask: Mask,
    pub centroid: [f64; 3],
    /// Voxel count of the largest component
    pub component_voxels: usize,
    pub n_components: usize,
}

/// Label 26-connected components with BFS
///
/// Returns per-voxel labels (0 = background, 1..=n) and voxel counts per
/// label (index 0 unused).
pub fn label_components(mask: &Mask) -> (Vec<u32>, Vec<usize>) {
    let (nx, ny, nz) = mask.dims;
    let mut labels = vec![0u32; mask.data.len()];
    let mut sizes = vec![0usize];
    let mut queue = VecDeque::new();

    for start in 0..mask.data.len() {
        if mask.data[start] == 0 || labels[start] != 0 {
            continue;
        }

        let label = sizes.len() as u32;
        let mut count = 0;
        labels[start] = label;
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            count += 1;
            let i = (idx % nx) as isize;
            let j = ((idx / nx) % ny) as isize;
            let k = (idx / (nx * ny)) as isize;

            for dk in -1..=1isize {
                for dj in -1..=1isize {
                    for di in -1..=1isize {
                        let (ni, nj, nk) = (i + di, j + dj, k + dk);
                        if ni < 0 || nj < 0 || nk < 0 {
                            continue;
                        }
                        let (ni, nj, nk) = (ni as usize, nj as usize, nk as usize);
                        if ni >= nx || nj >= ny || nk >= nz {
                            continue;
                        }
                        let n = idx3d(ni, nj, nk, nx, ny);
                        if mask.data[n] != 0 && labels[n] == 0 {
                            labels[n] = label;
                            queue.push_back(n);
                        }
                    }
                }
            }
        }

        sizes.push(count);
    }

    (labels, sizes)
}

/// Voxel indices of `label` that have a 6-neighbour outside it
fn boundary_points(labels: &[u32], label: u32, dims: (usize, usize, usize), bbox: &Region) -> Vec<[f64; 3]> {
    let (nx, ny, nz) = dims;
    let inside = |i: isize, j: isize, k: isize| {
        i >= 0
            && j >= 0
            && k >= 0
            && (i as usize) < nx
            && (j as usize) < ny
            && (k as usize) < nz
            && labels[idx3d(i as usize, j as usize, k as usize, nx, ny)] == label
    };

    let mut points = Vec::new();
    let (ox, oy, oz) = bbox.offset;
    let (bx, by, bz) = bbox.dims;
    for k in oz..oz + bz {
        for j in oy..oy + by {
            for i in ox..ox + bx {
                let (ii, jj, kk) = (i as isize, j as isize, k as isize);
                if !inside(ii, jj, kk) {
                    continue;
                }
                let interior = inside(ii - 1, jj, kk)
                    && inside(ii + 1, jj, kk)
                    && inside(ii, jj - 1, kk)
                    && inside(ii, jj + 1, kk)
                    && inside(ii, jj, kk - 1)
                    && inside(ii, jj, kk + 1);
                if !interior {
                    points.push([i as f64, j as f64, k as f64]);
                }
            }
        }
    }
    points
}

/// Reduce a mask to a single solid region
///
/// * `keep_largest_only`: drop every component but the largest
/// * `use_convex_hull`: replace the largest component's bounding box with its
///   convex hull image
pub fn simplify(mask: &Mask, use_convex_hull: bool, keep_largest_only: bool) -> Result<Simplified> {
    if !use_convex_hull && !keep_largest_only {
        return Err(VirtueError::configuration(
            "mask simplification needs at least one of convex hull or largest component",
        ));
    }
    if mask.is_empty() {
        return Err(VirtueError::geometry("tumour mask has no foreground voxels"));
    }

    let (labels, sizes) = label_components(mask);
    // First label wins ties
    let mut largest = 1u32;
    for (label, &size) in sizes.iter().enumerate().skip(1) {
        if size > sizes[largest as usize] {
            largest = label as u32;
        }
    }
    let component_voxels = sizes[largest as usize];
    let n_components = sizes.len() - 1;

    let centroid = centroid_mm(mask, |i| labels[i] == largest)
        .ok_or_else(|| VirtueError::geometry("largest component is empty"))?;

    let mut out = mask.clone();
    if keep_largest_only {
        for (v, &l) in out.data.iter_mut().zip(labels.iter()) {
            *v = u8::from(l == largest);
        }
    }

    if use_convex_hull {
        let component = Mask { data: labels.iter().map(|&l| u8::from(l == largest)).collect(), ..mask.clone() };
        let bbox = component
            .bounding_box()
            .ok_or_else(|| VirtueError::geometry("largest component is empty"))?;

        let points = boundary_points(&labels, largest, mask.dims, &bbox);
        match ConvexHull::build(&points) {
            Some(hull) => {
                let (nx, ny, _) = mask.dims;
                let (ox, oy, oz) = bbox.offset;
                let (bx, by, bz) = bbox.dims;
                for k in oz..oz + bz {
                    for j in oy..oy + by {
                        for i in ox..ox + bx {
                            let inside = hull.contains([i as f64, j as f64, k as f64]);
                            out.data[idx3d(i, j, k, nx, ny)] = u8::from(inside);
                        }
                    }
                }
                debug!(hull_faces = hull.faces().len(), "convex hull applied");
            }
            None => {
                // Flat or thinner: the component is its own hull
                warn!(voxels = component_voxels, "largest component is degenerate, convex hull skipped");
            }
        }
    }

    debug!(
        n_components,
        component_voxels,
        output_voxels = out.foreground_count(),
        "mask simplified"
    );

    Ok(Simplified { mask: out, centroid, component_voxels, n_components })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::mask::{fill_box, sphere_mask};

    fn empty(dims: (usize, usize, usize)) -> Mask {
        sphere_mask(dims, [0.0; 3], -1.0)
    }

    #[test]
    fn test_labels_diagonal_neighbours_join() {
        let mut mask = empty((5, 5, 5));
        let i = mask.idx(1, 1, 1);
        mask.data[i] = 1;
        let i = mask.idx(2, 2, 2);
        mask.data[i] = 1;
        let i = mask.idx(4, 4, 4);
        mask.data[i] = 1;
        let (labels, sizes) = label_components(&mask);
        assert_eq!(sizes.len(), 3);
        assert_eq!(labels[mask.idx(1, 1, 1)], labels[mask.idx(2, 2, 2)]);
        assert_eq!(sizes[1], 2);
        assert_eq!(sizes[2], 1);
    }

    #[test]
    fn test_largest_component_kept() {
        let mut mask = empty((30, 20, 20));
        fill_box(&mut mask, (1, 1, 1), (6, 6, 5)); // 100 voxels
        fill_box(&mut mask, (12, 2, 2), (22, 12, 7)); // 500 voxels

        let s = simplify(&mask, false, true).unwrap();
        assert_eq!(s.n_components, 2);
        assert_eq!(s.component_voxels, 500);
        assert_eq!(s.mask.foreground_count(), 500);
        assert!((s.centroid[0] - 16.5).abs() < 1e-9);
        assert!((s.centroid[1] - 6.5).abs() < 1e-9);
        assert!((s.centroid[2] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_hull_fills_concavity() {
        // Two slabs joined by a thin bridge, plus a notch
        let mut mask = empty((20, 20, 20));
        fill_box(&mut mask, (2, 2, 2), (6, 12, 8));
        fill_box(&mut mask, (10, 2, 2), (14, 12, 8));
        fill_box(&mut mask, (6, 2, 2), (10, 4, 8));
        let before = mask.foreground_count();

        let s = simplify(&mask, true, true).unwrap();
        assert!(s.mask.foreground_count() > before);
        // Gap between the slabs lies inside the hull
        assert_eq!(s.mask.data[s.mask.idx(8, 10, 5)], 1);
        // Nothing outside the bounding box
        assert_eq!(s.mask.data[s.mask.idx(15, 5, 5)], 0);
        // Hull keeps every original voxel of the component
        for (a, b) in mask.data.iter().zip(s.mask.data.iter()) {
            assert!(*b >= *a);
        }
    }

    #[test]
    fn test_flat_component_unchanged_by_hull() {
        let mut mask = empty((10, 10, 10));
        fill_box(&mut mask, (2, 2, 5), (8, 8, 6));
        let s = simplify(&mask, true, true).unwrap();
        assert_eq!(s.mask.data, mask.data);
    }

    #[test]
    fn test_hull_without_largest_keeps_other_components_outside_bbox() {
        let mut mask = empty((30, 20, 20));
        fill_box(&mut mask, (1, 1, 1), (3, 3, 3));
        fill_box(&mut mask, (10, 2, 2), (20, 12, 7));
        let s = simplify(&mask, true, false).unwrap();
        assert_eq!(s.mask.data[s.mask.idx(1, 1, 1)], 1);
        assert_eq!(s.mask.foreground_count(), 8 + 500);
    }

    #[test]
    fn test_errors() {
        let mask = sphere_mask((10, 10, 10), [5.0; 3], 2.0);
        assert!(matches!(simplify(&mask, false, false), Err(VirtueError::Configuration(_))));
        let mask = empty((4, 4, 4));
        assert!(matches!(simplify(&mask, true, true), Err(VirtueError::Geometry(_))));
    }
}
