//! Distance lookup tables
//!
//! For every face centroid of a surface the radial distance from the growth
//! centre is recorded against its direction (elevation, azimuth). Queries at
//! arbitrary directions interpolate by inverse angular distance over the
//! k = 4 nearest sampled directions, found with a k-d tree over unit
//! direction vectors.

pub mod cache;
pub mod kdtree;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, VirtueError, Warning};
use crate::spherical::{direction, to_spherical};
use crate::surface::Surface;
use cache::LookupCache;
use kdtree::KdTree;

/// Number of sampled directions blended per query
pub const NEIGHBOURS: usize = 4;

/// Angular distance below which a query counts as an exact hit (radians)
const EXACT_HIT: f64 = 1e-12;

/// One sampled direction and its radial distance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionSample {
    pub elevation: f64,
    pub azimuth: f64,
    pub distance: f64,
}

/// Radial distances of one surface, indexed by direction
#[derive(Debug, Clone)]
pub struct DirectionTable {
    samples: Vec<DirectionSample>,
    tree: KdTree,
}

impl DirectionTable {
    pub fn new(samples: Vec<DirectionSample>) -> Result<Self> {
        if samples.is_empty() {
            return Err(VirtueError::geometry("direction table needs at least one sample"));
        }
        let units = samples.iter().map(|s| direction(s.elevation, s.azimuth)).collect();
        Ok(Self { tree: KdTree::new(units), samples })
    }

    /// Sample every face centroid of `surface` about `origin`
    ///
    /// Returns the table and the number of centroids that coincided with the
    /// origin.
    pub fn from_surface(surface: &Surface, origin: [f64; 3]) -> Result<(Self, usize)> {
        let batch = to_spherical(surface.centroids(), origin);
        let samples = batch
            .coords
            .iter()
            .map(|s| DirectionSample { elevation: s.elevation, azimuth: s.azimuth, distance: s.radius })
            .collect();
        Ok((Self::new(samples)?, batch.substitutions))
    }

    pub fn samples(&self) -> &[DirectionSample] {
        &self.samples
    }

    /// Interpolated radial distance in direction (elevation, azimuth)
    pub fn query(&self, elevation: f64, azimuth: f64) -> f64 {
        let u = direction(elevation, azimuth);
        let nearest = self.tree.nearest(u, NEIGHBOURS);

        let mut weighted = 0.0;
        let mut total = 0.0;
        for &(d2, i) in &nearest {
            // Chord length to great-circle angle
            let chord = d2.sqrt().min(2.0);
            let angle = 2.0 * (chord / 2.0).asin();
            if angle < EXACT_HIT {
                return self.samples[i].distance;
            }
            let w = 1.0 / angle;
            weighted += w * self.samples[i].distance;
            total += w;
        }
        weighted / total
    }
}

/// Tumour (Dt) and brain (Db) distance tables about one growth centre
#[derive(Debug, Clone)]
pub struct LookupTable {
    pub origin: [f64; 3],
    pub tumour: DirectionTable,
    pub brain: DirectionTable,
}

impl LookupTable {
    /// Interpolated (Dt, Db) in direction (elevation, azimuth)
    #[inline]
    pub fn distances(&self, elevation: f64, azimuth: f64) -> (f64, f64) {
        (self.tumour.query(elevation, azimuth), self.brain.query(elevation, azimuth))
    }

    /// Sampled tumour directions where the tumour surface lies beyond the brain surface
    pub fn violations(&self) -> usize {
        self.tumour
            .samples()
            .iter()
            .filter(|s| s.distance > self.brain.query(s.elevation, s.azimuth))
            .count()
    }
}

/// Lookup table plus the non-fatal conditions met while building it
#[derive(Debug, Clone)]
pub struct LookupBuild {
    pub table: LookupTable,
    pub warnings: Vec<Warning>,
    pub from_cache: bool,
}

/// Build the Dt/Db lookup for `origin` from the two surfaces
///
/// Sampled tumour directions lying beyond the brain surface are reported as a
/// warning, not an error.
pub fn build_lookup(brain: &Surface, tumour: &Surface, origin: [f64; 3]) -> Result<LookupBuild> {
    if brain.is_empty() {
        return Err(VirtueError::geometry("brain surface has no faces"));
    }
    if tumour.is_empty() {
        return Err(VirtueError::geometry("tumour surface has no faces"));
    }

    let mut warnings = Vec::new();

    let (tumour_table, t_subs) = DirectionTable::from_surface(tumour, origin)?;
    let (brain_table, b_subs) = DirectionTable::from_surface(brain, origin)?;
    let substitutions = t_subs + b_subs;
    if substitutions > 0 {
        warnings.push(Warning::NumericDegeneracy { stage: "lookup", substitutions });
    }

    let table = LookupTable { origin, tumour: tumour_table, brain: brain_table };
    let violations = table.violations();
    if violations > 0 {
        warnings.push(Warning::GeometryViolation { stage: "lookup", directions: violations });
    }
    debug!(
        tumour_samples = table.tumour.samples().len(),
        brain_samples = table.brain.samples().len(),
        violations,
        "distance lookup built"
    );

    Ok(LookupBuild { table, warnings, from_cache: false })
}

/// Load the lookup for `origin` from `cache`, or run `build` and store its table
///
/// `build` only runs on a miss, so callers can defer surface extraction to it.
/// Cache failures are never fatal: they are logged, reported as warnings and
/// the table is recomputed.
pub fn load_or_build<F>(cache: Option<&LookupCache>, origin: [f64; 3], build: F) -> Result<LookupBuild>
where
    F: FnOnce() -> Result<LookupBuild>,
{
    let Some(cache) = cache else {
        return build();
    };

    let mut warnings = Vec::new();
    match cache.load(origin) {
        Ok(Some(table)) => {
            info!(path = %cache.path().display(), "distance lookup loaded from cache");
            return Ok(LookupBuild { table, warnings, from_cache: true });
        }
        Ok(None) => debug!(path = %cache.path().display(), "distance lookup cache miss"),
        Err(e) => {
            warn!(error = %e, "distance lookup cache unreadable, recomputing");
            warnings.push(Warning::CacheUnavailable { path: cache.path(), reason: e.to_string() });
        }
    }

    let mut built = build()?;
    match cache.store(&built.table) {
        Ok(path) => info!(path = %path.display(), "distance lookup cached"),
        Err(e) => {
            warn!(error = %e, "could not write distance lookup cache");
            warnings.push(Warning::CacheUnavailable { path: cache.path(), reason: e.to_string() });
        }
    }
    warnings.append(&mut built.warnings);
    built.warnings = warnings;

    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spherical::spherical_to_cartesian;
    use crate::spherical::Spherical;
    use std::f64::consts::PI;

    /// Icosahedron-ish shell: centroids on a sphere of `radius` around `origin`
    fn shell(radius: f64, origin: [f64; 3]) -> Surface {
        let mut vertices = Vec::new();
        let n_el = 8;
        let n_az = 12;
        for ie in 1..n_el {
            for ia in 0..n_az {
                let s = Spherical {
                    radius,
                    elevation: PI * ie as f64 / n_el as f64,
                    azimuth: -PI + 2.0 * PI * ia as f64 / n_az as f64,
                };
                vertices.push(spherical_to_cartesian(s, origin));
            }
        }
        // Degenerate "faces" that sit on each vertex: centroid == vertex
        let faces = (0..vertices.len()).map(|i| [i, i, i]).collect();
        Surface::new(vertices, faces).unwrap()
    }

    #[test]
    fn test_exact_hit_returns_sample() {
        let table = DirectionTable::new(vec![
            DirectionSample { elevation: 1.0, azimuth: 0.5, distance: 3.0 },
            DirectionSample { elevation: 2.0, azimuth: -1.0, distance: 7.0 },
        ])
        .unwrap();
        assert_eq!(table.query(1.0, 0.5), 3.0);
        assert_eq!(table.query(2.0, -1.0), 7.0);
    }

    #[test]
    fn test_interpolation_is_weighted_mean() {
        let table = DirectionTable::new(vec![
            DirectionSample { elevation: PI / 2.0, azimuth: 0.0, distance: 2.0 },
            DirectionSample { elevation: PI / 2.0, azimuth: 0.2, distance: 4.0 },
        ])
        .unwrap();
        // Midway between the two: equal weights
        let mid = table.query(PI / 2.0, 0.1);
        assert!((mid - 3.0).abs() < 1e-9, "{}", mid);
        // Closer to the first sample
        let near = table.query(PI / 2.0, 0.05);
        assert!(near > 2.0 && near < 3.0);
    }

    #[test]
    fn test_constant_shell_interpolates_constant() {
        let origin = [5.0, 5.0, 5.0];
        let brain = shell(30.0, origin);
        let tumour = shell(4.0, origin);
        let build = build_lookup(&brain, &tumour, origin).unwrap();
        assert!(!build.from_cache);
        assert!(build.warnings.is_empty());
        for &(el, az) in &[(0.3, 0.1), (1.7, -2.9), (3.0, 1.0)] {
            let (dt, db) = build.table.distances(el, az);
            assert!((dt - 4.0).abs() < 1e-9);
            assert!((db - 30.0).abs() < 1e-9);
        }
        assert_eq!(build.table.violations(), 0);
    }

    #[test]
    fn test_violations_counted() {
        let origin = [0.0; 3];
        let build = build_lookup(&shell(3.0, origin), &shell(5.0, origin), origin).unwrap();
        let n = build.table.tumour.samples().len();
        assert_eq!(build.table.violations(), n);
        assert!(build
            .warnings
            .contains(&Warning::GeometryViolation { stage: "lookup", directions: n }));
    }

    #[test]
    fn test_empty_surface_is_geometry_error() {
        let empty = Surface::new(Vec::new(), Vec::new()).unwrap();
        let origin = [0.0; 3];
        let err = build_lookup(&empty, &shell(2.0, origin), origin).unwrap_err();
        assert!(matches!(err, VirtueError::Geometry(_)));
    }
}
