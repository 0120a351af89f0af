//! End-to-end deformation tests on synthetic sphere masks

mod common;

use common::{distance, magnitude, sphere_pair};
use virtue_core::config::DeformationConfig;
use virtue_core::deform::compute_deformation;
use virtue_core::error::{VirtueError, Warning};
use virtue_core::growth::GrowthModel;
use virtue_core::lookup::build_lookup;
use virtue_core::nifti_io::{read_mask, read_vector_field, write_deformation_field, write_volume};
use virtue_core::simplify::simplify;
use virtue_core::spherical::point_to_spherical;
use virtue_core::surface::extract_surface;
use virtue_core::volume::{Mask, Volume};

const N: usize = 48;
const TUMOUR_CENTER: [f64; 3] = [22.0, 24.0, 24.0];
const BRAIN_CENTER: [f64; 3] = [24.0, 24.0, 24.0];

fn masks() -> (Mask, Mask) {
    sphere_pair(N, TUMOUR_CENTER, 6.0, BRAIN_CENTER, 20.0)
}

fn linear_config() -> DeformationConfig {
    DeformationConfig { model: GrowthModel::Linear, ..DeformationConfig::default() }
}

#[test]
fn test_linear_expansion_end_to_end() {
    let (tumour, brain) = masks();
    let config = linear_config();
    let out = compute_deformation(&tumour, &brain, &config).unwrap();
    assert!(out.forward.is_none());
    let field = out.inverse.unwrap();

    let origin = out.report.origin;
    assert_eq!(origin, TUMOUR_CENTER);

    // Same surfaces and lookup as the pipeline builds internally
    let simplified = simplify(&tumour, true, true).unwrap();
    let t = extract_surface(&simplified.mask, &config.tumour_surface).unwrap().surface;
    let b = extract_surface(&brain, &config.brain_surface).unwrap().surface;
    let table = build_lookup(&b, &t, origin).unwrap().table;

    // Inside the tumour every voxel moves outward by the full Dt
    for &(i, j, k) in &[(24, 24, 24), (22, 26, 24), (21, 24, 22)] {
        let p = brain.position_mm(i, j, k);
        let (s, _) = point_to_spherical(p, origin);
        let (dt, db) = table.distances(s.elevation, s.azimuth);
        assert!(dt > 4.0 && dt < 7.0, "Dt {} out of range", dt);
        assert!(db > dt);

        let d = field.at(i, j, k);
        assert!((magnitude(d) - dt).abs() < 1e-9);
        let outward = (p[0] - origin[0]) * d[0] + (p[1] - origin[1]) * d[1] + (p[2] - origin[2]) * d[2];
        assert!(outward > 0.0);
    }

    // Linear decay through the band, zero at and beyond the brain surface
    for i in 23..N {
        let p = brain.position_mm(i, 24, 24);
        let (s, _) = point_to_spherical(p, origin);
        let (dt, db) = table.distances(s.elevation, s.azimuth);
        let expected = if s.radius >= db {
            0.0
        } else if s.radius <= dt {
            dt
        } else {
            (1.0 - (s.radius - dt) / (db - dt)) * dt
        };
        assert!((magnitude(field.at(i, 24, 24)) - expected).abs() < 1e-9, "voxel x={}", i);
    }
    assert_eq!(field.at(0, 0, 0), [0.0; 3]);
    assert_eq!(field.at(N - 1, N - 1, N - 1), [0.0; 3]);

    // The growth centre itself stays put
    assert_eq!(field.at(22, 24, 24), [0.0; 3]);
    assert!(out
        .report
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::NumericDegeneracy { stage: "field", substitutions: 1 })));
}

#[test]
fn test_exponential_mapping_is_monotone_along_rays() {
    let (tumour, brain) = masks();
    let config = DeformationConfig { compute_forward: true, ..DeformationConfig::default() };
    let out = compute_deformation(&tumour, &brain, &config).unwrap();
    let inverse = out.inverse.unwrap();
    let forward = out.forward.unwrap();
    let origin = out.report.origin;

    for &(dx, dy, dz) in &[(1i64, 0i64, 0i64), (0, -1, 0), (0, 0, 1), (-1, 0, 0)] {
        let mut prev = f64::NEG_INFINITY;
        let mut step = 1i64;
        loop {
            let i = origin[0] as i64 + dx * step;
            let j = origin[1] as i64 + dy * step;
            let k = origin[2] as i64 + dz * step;
            if i < 0 || j < 0 || k < 0 || i >= N as i64 || j >= N as i64 || k >= N as i64 {
                break;
            }
            let (i, j, k) = (i as usize, j as usize, k as usize);
            let p = brain.position_mm(i, j, k);
            let moved = distance(p, origin) + magnitude(inverse.at(i, j, k));
            assert!(moved > prev, "mapping folds at step {} along {:?}", step, (dx, dy, dz));
            prev = moved;

            let (a, b) = (inverse.at(i, j, k), forward.at(i, j, k));
            for axis in 0..3 {
                assert!((a[axis] + b[axis]).abs() < 1e-12);
            }
            step += 1;
        }
    }
}

#[test]
fn test_scale_factor_zero_gives_identity() {
    let (tumour, brain) = masks();
    let config = DeformationConfig { scale_factor: 0.0, ..linear_config() };
    let out = compute_deformation(&tumour, &brain, &config).unwrap();
    assert_eq!(out.inverse.unwrap().max_magnitude(), 0.0);
}

#[test]
fn test_rejects_mismatched_or_empty_masks() {
    let (tumour, brain) = masks();
    let config = linear_config();

    let small = sphere_pair(32, [16.0; 3], 4.0, [16.0; 3], 10.0).1;
    let err = compute_deformation(&tumour, &small, &config).unwrap_err();
    assert!(matches!(err, VirtueError::Geometry(_)));

    let empty = Volume { data: vec![0u8; N * N * N], ..brain.clone() };
    assert!(matches!(compute_deformation(&empty, &brain, &config), Err(VirtueError::Geometry(_))));
    assert!(matches!(compute_deformation(&tumour, &empty, &config), Err(VirtueError::Geometry(_))));
}

#[test]
fn test_nifti_masks_to_warp_file() {
    let dir = tempfile::tempdir().unwrap();
    let (tumour, brain) = masks();
    let affine = [1.0, 0.0, 0.0, -24.0, 0.0, 1.0, 0.0, -24.0, 0.0, 0.0, 1.0, -24.0, 0.0, 0.0, 0.0, 1.0];
    let as_image = |m: &Mask| Volume::new(m.to_f64(), m.dims, m.voxel_size, affine).unwrap();

    let tumour_path = dir.path().join("tumour.nii.gz");
    let brain_path = dir.path().join("brain.nii");
    write_volume(&tumour_path, &as_image(&tumour)).unwrap();
    write_volume(&brain_path, &as_image(&brain)).unwrap();

    let tumour = read_mask(&tumour_path, 0.5).unwrap();
    let brain = read_mask(&brain_path, 0.5).unwrap();
    let config = DeformationConfig { crop_margin: Some(3), ..linear_config() };
    let out = compute_deformation(&tumour, &brain, &config).unwrap();
    let field = out.inverse.unwrap();
    assert_eq!(field.region.offset, (1, 1, 1));

    let warp_path = dir.path().join("warp.nii.gz");
    write_deformation_field(&warp_path, &field, &brain).unwrap();
    let (positions, dims, warp_affine) = read_vector_field(&warp_path).unwrap();
    assert_eq!(dims, field.region.dims);
    assert!((warp_affine[3] + 23.0).abs() < 1e-5);

    // Region voxel (0, 0, 0) is grid voxel (1, 1, 1): outside the brain, unmoved
    for axis in 0..3 {
        assert!((positions[0][axis] + 23.0).abs() < 1e-4);
    }
    // Grid voxel (24, 24, 24) sits inside the tumour
    let (rx, ry, _) = dims;
    let idx = 23 + 23 * rx + 23 * rx * ry;
    let d = field.at(24, 24, 24);
    assert!((positions[idx][0] - d[0]).abs() < 1e-4);
    assert!(d[0] > 3.0);
}
