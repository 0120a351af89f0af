//! End-to-end deformation: masks in, displacement fields out
//!
//! Tumour mask -> simplified region + growth centre -> tumour and brain
//! surfaces -> Dt/Db lookup -> growth law over the grid.

use tracing::{info, warn};

use crate::config::DeformationConfig;
use crate::error::{Result, VirtueError, Warning};
use crate::field::{build_field, DisplacementField, FieldDirection};
use crate::lookup::cache::{Fingerprint, LookupCache};
use crate::lookup::{build_lookup, load_or_build};
use crate::simplify::simplify;
use crate::surface::extract_surface;
use crate::volume::{Mask, Region};

/// What happened during a run, next to the fields it produced
#[derive(Debug, Clone)]
pub struct DeformationReport {
    /// Growth centre, mm in the grid frame
    pub origin: [f64; 3],
    /// Voxels in the simplified tumour region
    pub tumour_voxels: usize,
    /// Surface face counts, None when the lookup came from the cache
    pub tumour_faces: Option<usize>,
    pub brain_faces: Option<usize>,
    pub lookup_from_cache: bool,
    /// Grid region the fields cover
    pub region: Region,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone)]
pub struct DeformationOutput {
    pub inverse: Option<DisplacementField>,
    pub forward: Option<DisplacementField>,
    pub report: DeformationReport,
}

/// Check the masks are usable together
pub fn check_masks(tumour: &Mask, brain: &Mask) -> Result<()> {
    if brain.is_empty() {
        return Err(VirtueError::geometry("brain mask has no foreground voxels"));
    }
    if tumour.is_empty() {
        return Err(VirtueError::geometry("tumour mask has no foreground voxels"));
    }
    if !tumour.same_grid(brain) {
        return Err(VirtueError::geometry(format!(
            "tumour mask grid {:?} @ {:?} mm differs from brain mask grid {:?} @ {:?} mm",
            tumour.dims, tumour.voxel_size, brain.dims, brain.voxel_size
        )));
    }
    Ok(())
}

/// Compute the configured displacement fields for a tumour inside a brain
pub fn compute_deformation(
    tumour: &Mask,
    brain: &Mask,
    config: &DeformationConfig,
) -> Result<DeformationOutput> {
    config.validate()?;
    check_masks(tumour, brain)?;
    let law = config.growth_law()?;
    let mut warnings = Vec::new();

    let simplified = simplify(tumour, config.use_convex_hull, config.keep_largest_only)?;
    let origin = simplified.centroid;
    info!(
        components = simplified.n_components,
        voxels = simplified.mask.foreground_count(),
        origin = ?origin,
        "tumour region simplified"
    );

    let cache = match &config.lookup_dir {
        Some(dir) => {
            let params = (
                &config.tumour_surface,
                &config.brain_surface,
                config.use_convex_hull,
                config.keep_largest_only,
            );
            Some(LookupCache::new(dir, Fingerprint::new(tumour, brain, &params)?))
        }
        None => None,
    };

    let mut faces = None;
    let build = load_or_build(cache.as_ref(), origin, || {
        let tumour_ex = extract_surface(&simplified.mask, &config.tumour_surface)?;
        let brain_ex = extract_surface(brain, &config.brain_surface)?;
        info!(
            tumour_faces = tumour_ex.surface.n_faces(),
            brain_faces = brain_ex.surface.n_faces(),
            "surfaces extracted"
        );
        faces = Some((tumour_ex.surface.n_faces(), brain_ex.surface.n_faces()));

        let mut build = build_lookup(&brain_ex.surface, &tumour_ex.surface, origin)?;
        build.warnings.extend(tumour_ex.shortfall("tumour"));
        build.warnings.extend(brain_ex.shortfall("brain"));
        Ok(build)
    })?;
    warnings.extend(build.warnings);
    let lookup_from_cache = build.from_cache;
    let table = build.table;
    let (tumour_faces, brain_faces) = match faces {
        Some((t, b)) => (Some(t), Some(b)),
        None => (None, None),
    };

    let region = match (config.crop_margin, brain.bounding_box()) {
        (Some(margin), Some(bbox)) => bbox.expand(margin, brain.dims),
        _ => Region::full(brain.dims),
    };

    let mut directions = Vec::new();
    if config.compute_inverse {
        directions.push(FieldDirection::Inverse);
    }
    if config.compute_forward {
        directions.push(FieldDirection::Forward);
    }

    let mut inverse = None;
    let mut forward = None;
    let mut counted = false;
    for direction in directions {
        let build = build_field(brain, &region, origin, &table, &law, config.scale_factor, direction)?;
        // Both passes visit the same voxels, so report their counts once
        if !counted {
            if build.violations > 0 {
                warnings.push(Warning::GeometryViolation { stage: "field", directions: build.violations });
            }
            if build.substitutions > 0 {
                warnings.push(Warning::NumericDegeneracy { stage: "field", substitutions: build.substitutions });
            }
            counted = true;
        }
        match direction {
            FieldDirection::Inverse => inverse = Some(build.field),
            FieldDirection::Forward => forward = Some(build.field),
        }
    }

    for w in &warnings {
        warn!("{}", w);
    }

    Ok(DeformationOutput {
        inverse,
        forward,
        report: DeformationReport {
            origin,
            tumour_voxels: simplified.mask.foreground_count(),
            tumour_faces,
            brain_faces,
            lookup_from_cache,
            region,
            warnings,
        },
    })
}
