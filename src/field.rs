//! Displacement field assembly
//!
//! Applies the growth law to every voxel of a grid (or a cropped region of
//! it). Displacements are millimetre vectors in the grid frame, directed
//! radially from the growth centre:
//!
//! - inverse: P_new = P + e * k * Dt (where each output voxel samples the atlas)
//! - forward: P_new = P - e * k * Dt
//!
//! with e the unit vector from the centre to P and k the scaled displacement
//! factor. The two directions are independent passes.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, VirtueError};
use crate::growth::GrowthLaw;
use crate::lookup::LookupTable;
use crate::spherical::point_to_spherical;
use crate::volume::{idx3d, Region, Volume};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDirection {
    /// Maps each deformed-space voxel back to where its tissue came from
    Inverse,
    /// Maps undeformed tissue to its displaced position
    Forward,
}

impl FieldDirection {
    fn sign(self) -> f64 {
        match self {
            FieldDirection::Inverse => 1.0,
            FieldDirection::Forward => -1.0,
        }
    }
}

impl fmt::Display for FieldDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDirection::Inverse => write!(f, "inverse"),
            FieldDirection::Forward => write!(f, "forward"),
        }
    }
}

/// Dense displacement vectors over a region of a voxel grid
#[derive(Debug, Clone)]
pub struct DisplacementField {
    pub direction: FieldDirection,
    /// Region of the full grid covered by `displacements`
    pub region: Region,
    /// Dimensions of the full grid
    pub grid_dims: (usize, usize, usize),
    pub voxel_size: (f64, f64, f64),
    /// Flat Fortran order over `region`, mm
    pub displacements: Vec<[f64; 3]>,
}

impl DisplacementField {
    /// Displacement at full-grid voxel (i, j, k); zero outside the region
    pub fn at(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        if !self.region.contains(i, j, k) {
            return [0.0; 3];
        }
        let (ox, oy, oz) = self.region.offset;
        let (rx, ry, _) = self.region.dims;
        self.displacements[idx3d(i - ox, j - oy, k - oz, rx, ry)]
    }

    /// Largest displacement length
    pub fn max_magnitude(&self) -> f64 {
        self.displacements
            .iter()
            .map(|d| (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt())
            .fold(0.0, f64::max)
    }

    /// Absolute deformed positions in scanner space over the region
    ///
    /// This is the deformation-field convention used by warp tools: voxel
    /// (i, j, k) stores the scanner coordinate its value is taken from.
    pub fn to_scanner_positions<T>(&self, grid: &Volume<T>) -> Vec<[f64; 3]> {
        let (ox, oy, oz) = self.region.offset;
        let (rx, ry, rz) = self.region.dims;
        let mut out = Vec::with_capacity(self.displacements.len());
        for k in 0..rz {
            for j in 0..ry {
                for i in 0..rx {
                    let p = grid.position_mm(i + ox, j + oy, k + oz);
                    let d = self.displacements[idx3d(i, j, k, rx, ry)];
                    out.push(grid.mm_to_scanner([p[0] + d[0], p[1] + d[1], p[2] + d[2]]));
                }
            }
        }
        out
    }
}

/// Field plus counts of the non-fatal conditions met while building it
#[derive(Debug, Clone)]
pub struct FieldBuild {
    pub field: DisplacementField,
    /// Voxels whose interpolated tumour radius exceeded the brain radius
    pub violations: usize,
    /// Voxels that coincided with the growth centre
    pub substitutions: usize,
}

/// Evaluate the growth law at every voxel of `region`
pub fn build_field<T>(
    grid: &Volume<T>,
    region: &Region,
    origin: [f64; 3],
    lookup: &LookupTable,
    law: &GrowthLaw,
    scale_factor: f64,
    direction: FieldDirection,
) -> Result<FieldBuild> {
    if !scale_factor.is_finite() || scale_factor < 0.0 {
        return Err(VirtueError::configuration(format!(
            "scale factor must be finite and non-negative, got {}",
            scale_factor
        )));
    }
    let (nx, ny, nz) = grid.dims;
    let (ox, oy, oz) = region.offset;
    let (rx, ry, rz) = region.dims;
    if ox + rx > nx || oy + ry > ny || oz + rz > nz {
        return Err(VirtueError::geometry(format!(
            "region {:?}+{:?} exceeds grid {:?}",
            region.offset, region.dims, grid.dims
        )));
    }

    let sign = direction.sign();
    let mut displacements = vec![[0.0; 3]; region.n_voxels()];
    let mut violations = 0;
    let mut substitutions = 0;

    for k in 0..rz {
        for j in 0..ry {
            for i in 0..rx {
                let p = grid.position_mm(i + ox, j + oy, k + oz);
                let (s, at_origin) = point_to_spherical(p, origin);
                if at_origin {
                    substitutions += 1;
                    continue;
                }

                let (dt, db) = lookup.distances(s.elevation, s.azimuth);
                if dt > db {
                    violations += 1;
                }

                let k_factor = law.factor(s.radius, dt, db) * scale_factor;
                if k_factor == 0.0 {
                    continue;
                }

                let mag = sign * k_factor * dt / s.radius;
                displacements[idx3d(i, j, k, rx, ry)] = [
                    (p[0] - origin[0]) * mag,
                    (p[1] - origin[1]) * mag,
                    (p[2] - origin[2]) * mag,
                ];
            }
        }
    }

    let field = DisplacementField {
        direction,
        region: *region,
        grid_dims: grid.dims,
        voxel_size: grid.voxel_size,
        displacements,
    };

    debug!(%direction, violations, substitutions, "displacement field assembled");
    info!(%direction, voxels = region.n_voxels(), max_displacement_mm = field.max_magnitude(), "field built");

    Ok(FieldBuild { field, violations, substitutions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::GrowthModel;
    use crate::lookup::{DirectionSample, DirectionTable};
    use crate::volume::{Mask, IDENTITY_AFFINE};

    /// Lookup with constant radii in every direction
    fn constant_lookup(origin: [f64; 3], dt: f64, db: f64) -> LookupTable {
        let samples = |d: f64| {
            let mut v = Vec::new();
            for ie in 0..=6 {
                for ia in 0..8 {
                    v.push(DirectionSample {
                        elevation: std::f64::consts::PI * ie as f64 / 6.0,
                        azimuth: -3.0 + 0.75 * ia as f64,
                        distance: d,
                    });
                }
            }
            v
        };
        LookupTable {
            origin,
            tumour: DirectionTable::new(samples(dt)).unwrap(),
            brain: DirectionTable::new(samples(db)).unwrap(),
        }
    }

    fn grid(n: usize) -> Mask {
        Volume { data: vec![0; n * n * n], dims: (n, n, n), voxel_size: (1.0, 1.0, 1.0), affine: IDENTITY_AFFINE }
    }

    #[test]
    fn test_linear_profile_along_axis() {
        let origin = [10.0, 10.0, 10.0];
        let g = grid(21);
        let lookup = constant_lookup(origin, 2.0, 8.0);
        let law = GrowthLaw::new(GrowthModel::Linear, None).unwrap();
        let build = build_field(&g, &Region::full(g.dims), origin, &lookup, &law, 1.0, FieldDirection::Inverse).unwrap();
        let f = &build.field;

        assert_eq!(build.substitutions, 1);
        assert_eq!(build.violations, 0);
        assert_eq!(f.at(10, 10, 10), [0.0; 3]);

        // Inside the tumour: full Dt outward
        let d = f.at(11, 10, 10);
        assert!((d[0] - 2.0).abs() < 1e-9 && d[1].abs() < 1e-12 && d[2].abs() < 1e-12);

        // Halfway through the band: half of Dt
        let d = f.at(15, 10, 10);
        assert!((d[0] - 1.0).abs() < 1e-9);

        // At and beyond the brain radius: nothing
        let d = f.at(18, 10, 10);
        assert!(d[0].abs() < 1e-9);
        assert_eq!(f.at(20, 20, 20), [0.0; 3]);
    }

    #[test]
    fn test_forward_is_opposite_sign() {
        let origin = [7.5, 8.0, 8.25];
        let g = grid(16);
        let lookup = constant_lookup(origin, 3.0, 7.0);
        let law = GrowthLaw::new(GrowthModel::Exponential, None).unwrap();
        let full = Region::full(g.dims);
        let inv = build_field(&g, &full, origin, &lookup, &law, 1.0, FieldDirection::Inverse).unwrap();
        let fwd = build_field(&g, &full, origin, &lookup, &law, 1.0, FieldDirection::Forward).unwrap();
        for (a, b) in inv.field.displacements.iter().zip(fwd.field.displacements.iter()) {
            for axis in 0..3 {
                assert!((a[axis] + b[axis]).abs() < 1e-12);
            }
        }
        assert_eq!(inv.substitutions, 0);
    }

    #[test]
    fn test_scale_factor_scales_field() {
        let origin = [6.0, 6.0, 6.0];
        let g = grid(13);
        let lookup = constant_lookup(origin, 2.0, 6.0);
        let law = GrowthLaw::new(GrowthModel::Linear, None).unwrap();
        let full = Region::full(g.dims);
        let one = build_field(&g, &full, origin, &lookup, &law, 1.0, FieldDirection::Inverse).unwrap();
        let half = build_field(&g, &full, origin, &lookup, &law, 0.5, FieldDirection::Inverse).unwrap();
        assert!((one.field.max_magnitude() - 2.0 * half.field.max_magnitude()).abs() < 1e-12);

        let err = build_field(&g, &full, origin, &lookup, &law, f64::NAN, FieldDirection::Inverse).unwrap_err();
        assert!(matches!(err, VirtueError::Configuration(_)));
    }

    #[test]
    fn test_cropped_region_matches_full_grid() {
        let origin = [10.0, 9.0, 11.0];
        let g = grid(20);
        let lookup = constant_lookup(origin, 2.0, 9.0);
        let law = GrowthLaw::new(GrowthModel::Linear, None).unwrap();
        let full = build_field(&g, &Region::full(g.dims), origin, &lookup, &law, 1.0, FieldDirection::Inverse).unwrap();
        let crop = Region { offset: (4, 5, 6), dims: (10, 8, 9) };
        let part = build_field(&g, &crop, origin, &lookup, &law, 1.0, FieldDirection::Inverse).unwrap();

        assert_eq!(part.field.displacements.len(), 10 * 8 * 9);
        for &(i, j, k) in &[(4, 5, 6), (9, 9, 11), (13, 12, 14)] {
            assert_eq!(part.field.at(i, j, k), full.field.at(i, j, k));
        }
        assert_eq!(part.field.at(0, 0, 0), [0.0; 3]);

        let too_big = Region { offset: (15, 0, 0), dims: (10, 1, 1) };
        assert!(build_field(&g, &too_big, origin, &lookup, &law, 1.0, FieldDirection::Inverse).is_err());
    }

    #[test]
    fn test_violations_counted() {
        let origin = [5.0, 5.0, 5.0];
        let g = grid(11);
        let lookup = constant_lookup(origin, 6.0, 4.0);
        let law = GrowthLaw::new(GrowthModel::Linear, None).unwrap();
        let build = build_field(&g, &Region::full(g.dims), origin, &lookup, &law, 1.0, FieldDirection::Inverse).unwrap();
        assert_eq!(build.violations, 11 * 11 * 11 - 1);
        // Outside Db nothing moves even though Dt > Db
        assert_eq!(build.field.at(10, 5, 5), [0.0; 3]);
    }

    #[test]
    fn test_scanner_positions_identity_affine() {
        let origin = [4.0, 4.0, 4.0];
        let g = grid(9);
        let lookup = constant_lookup(origin, 1.5, 3.5);
        let law = GrowthLaw::new(GrowthModel::Linear, None).unwrap();
        let build = build_field(&g, &Region::full(g.dims), origin, &lookup, &law, 1.0, FieldDirection::Inverse).unwrap();
        let pos = build.field.to_scanner_positions(&g);
        let idx = g.idx(5, 4, 4);
        assert!((pos[idx][0] - (5.0 + 1.5)).abs() < 1e-9);
        assert_eq!(pos[g.idx(0, 0, 0)], [0.0, 0.0, 0.0]);
    }
}
