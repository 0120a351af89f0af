//! Radial coordinate mapping about an arbitrary origin
//!
//! Spherical coordinates are (radius, elevation, azimuth) with
//! elevation = arccos(z / r) measured from the +z axis and
//! azimuth = atan2(y, x), both computed after translating so the origin is
//! at (0, 0, 0). The origin is always passed explicitly; in the engine it is
//! the tumour growth centre.

use tracing::debug;

use crate::error::{Result, VirtueError};

/// Elevation assigned to points at zero radius, where arccos(z / r) is undefined
pub const SENTINEL_ELEVATION: f64 = 0.1;

/// A point in spherical coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spherical {
    pub radius: f64,
    pub elevation: f64,
    pub azimuth: f64,
}

/// Result of a batch conversion
#[derive(Debug, Clone)]
pub struct SphericalBatch {
    pub coords: Vec<Spherical>,
    /// Points that coincided with the origin and received the sentinel elevation
    pub substitutions: usize,
}

/// Convert an offset from the origin; the flag is set when the sentinel was used
#[inline]
fn offset_to_spherical(x: f64, y: f64, z: f64) -> (Spherical, bool) {
    let radius = (x * x + y * y + z * z).sqrt();
    let azimuth = y.atan2(x);
    if radius > 0.0 {
        // Clamp guards against |z/r| creeping past 1 through rounding
        let elevation = (z / radius).clamp(-1.0, 1.0).acos();
        (Spherical { radius, elevation, azimuth }, false)
    } else {
        (Spherical { radius: 0.0, elevation: SENTINEL_ELEVATION, azimuth }, true)
    }
}

/// Spherical coordinates of a single point relative to `origin`
///
/// The returned flag is true when the point coincides with the origin.
pub fn point_to_spherical(p: [f64; 3], origin: [f64; 3]) -> (Spherical, bool) {
    offset_to_spherical(p[0] - origin[0], p[1] - origin[1], p[2] - origin[2])
}

/// Batch form: convert every point relative to `origin`
pub fn to_spherical(points: &[[f64; 3]], origin: [f64; 3]) -> SphericalBatch {
    let mut substitutions = 0;
    let coords = points
        .iter()
        .map(|&p| {
            let (s, substituted) = point_to_spherical(p, origin);
            substitutions += usize::from(substituted);
            s
        })
        .collect();

    if substitutions > 0 {
        debug!(substitutions, "zero-radius points given sentinel elevation");
    }

    SphericalBatch { coords, substitutions }
}

/// Componentwise form: separate x, y, z slices (already relative to the origin)
///
/// Returns (radius, elevation, azimuth, substitutions).
pub fn to_spherical_components(
    xs: &[f64],
    ys: &[f64],
    zs: &[f64],
) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>, usize)> {
    check_lengths("x, y, z", &[xs.len(), ys.len(), zs.len()])?;

    let n = xs.len();
    let mut radius = Vec::with_capacity(n);
    let mut elevation = Vec::with_capacity(n);
    let mut azimuth = Vec::with_capacity(n);
    let mut substitutions = 0;

    for i in 0..n {
        let (s, substituted) = offset_to_spherical(xs[i], ys[i], zs[i]);
        radius.push(s.radius);
        elevation.push(s.elevation);
        azimuth.push(s.azimuth);
        substitutions += usize::from(substituted);
    }

    Ok((radius, elevation, azimuth, substitutions))
}

fn check_lengths(names: &str, lens: &[usize]) -> Result<()> {
    if lens.windows(2).any(|w| w[0] != w[1]) {
        return Err(VirtueError::configuration(format!(
            "{} component slices differ in length: {:?}",
            names, lens
        )));
    }
    Ok(())
}

/// Unit vector for a direction given as (elevation, azimuth)
#[inline]
pub fn direction(elevation: f64, azimuth: f64) -> [f64; 3] {
    let (sin_el, cos_el) = elevation.sin_cos();
    let (sin_az, cos_az) = azimuth.sin_cos();
    [sin_el * cos_az, sin_el * sin_az, cos_el]
}

/// Cartesian point for spherical coordinates about `origin`
#[inline]
pub fn spherical_to_cartesian(s: Spherical, origin: [f64; 3]) -> [f64; 3] {
    let d = direction(s.elevation, s.azimuth);
    [
        origin[0] + s.radius * d[0],
        origin[1] + s.radius * d[1],
        origin[2] + s.radius * d[2],
    ]
}

/// Batch inverse of [`to_spherical`]
pub fn to_cartesian(coords: &[Spherical], origin: [f64; 3]) -> Vec<[f64; 3]> {
    coords.iter().map(|&s| spherical_to_cartesian(s, origin)).collect()
}

/// Componentwise inverse: (radius, elevation, azimuth) slices to x, y, z
/// relative to the origin
pub fn to_cartesian_components(
    radius: &[f64],
    elevation: &[f64],
    azimuth: &[f64],
) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    check_lengths("radius, elevation, azimuth", &[radius.len(), elevation.len(), azimuth.len()])?;

    let n = radius.len();
    let mut xs = Vec::with_capacity(n);
    let mut ys = Vec::with_capacity(n);
    let mut zs = Vec::with_capacity(n);
    for ((&r, &el), &az) in radius.iter().zip(elevation).zip(azimuth) {
        let d = direction(el, az);
        xs.push(r * d[0]);
        ys.push(r * d[1]);
        zs.push(r * d[2]);
    }
    Ok((xs, ys, zs))
}

/// Unit direction vectors for paired (elevation, azimuth) angles
pub fn to_cartesian_angles(elevation: &[f64], azimuth: &[f64]) -> Result<Vec<[f64; 3]>> {
    check_lengths("elevation, azimuth", &[elevation.len(), azimuth.len()])?;
    Ok(elevation.iter().zip(azimuth).map(|(&el, &az)| direction(el, az)).collect())
}

/// Great-circle angle between two directions given as (azimuth, polar angle)
pub fn angle_between(az_a: f64, pol_a: f64, az_b: f64, pol_b: f64) -> f64 {
    let cos_angle = pol_a.sin() * pol_b.sin() * (az_a - az_b).cos() + pol_a.cos() * pol_b.cos();
    cos_angle.clamp(-1.0, 1.0).acos()
}
