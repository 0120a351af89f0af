//! Surface extraction from binary masks
//!
//! Pipeline:
//! 1. Pad the mask with zeros so the surface closes at the grid border
//! 2. Isotropic Gaussian smoothing
//! 3. 0.5-level isosurface (marching tetrahedra)
//! 4. Quadric-error decimation to the requested face count
//! 5. Per-face centroids
//!
//! Coordinates are millimetres in the grid frame (`index * voxel_size`).

pub mod decimate;
pub mod isosurface;
pub mod mesh;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, VirtueError, Warning};
use crate::utils::smoothing::{gaussian_smooth_3d, kernel_reach, pad_zeros};
use crate::volume::Mask;

/// Iso-level separating inside from outside in the smoothed mask
pub const ISO_LEVEL: f64 = 0.5;

/// How far to decimate the raw isosurface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Aim for this many faces; no decimation if the raw surface is smaller
    TargetFaces(usize),
    /// Remove this fraction of the raw faces, in [0, 1)
    Fraction(f64),
}

/// Surface-extraction parameters for one mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceParams {
    /// Gaussian smoothing sigma in voxels
    pub sigma: f64,
    pub reduction: Reduction,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self { sigma: 2.0, reduction: Reduction::Fraction(0.8) }
    }
}

impl SurfaceParams {
    pub fn with_target_faces(sigma: f64, faces: usize) -> Self {
        Self { sigma, reduction: Reduction::TargetFaces(faces) }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sigma > 0.0) || !self.sigma.is_finite() {
            return Err(VirtueError::configuration(format!(
                "smoothing sigma must be positive, got {}",
                self.sigma
            )));
        }
        if let Reduction::Fraction(f) = self.reduction {
            if !(0.0..1.0).contains(&f) {
                return Err(VirtueError::configuration(format!(
                    "reduction fraction must be in [0, 1), got {}",
                    f
                )));
            }
        }
        Ok(())
    }

    /// Face count to decimate a surface of `current` faces down to
    pub fn target_faces(&self, current: usize) -> usize {
        match self.reduction {
            Reduction::TargetFaces(t) => t.min(current),
            Reduction::Fraction(f) => (current as f64 * (1.0 - f)).floor() as usize,
        }
    }
}

/// Triangulated closed surface with per-face centroids
#[derive(Debug, Clone)]
pub struct Surface {
    vertices: Vec<[f64; 3]>,
    faces: Vec<[usize; 3]>,
    centroids: Vec<[f64; 3]>,
}

impl Surface {
    /// Build a surface, checking every face index
    pub fn new(vertices: Vec<[f64; 3]>, faces: Vec<[usize; 3]>) -> Result<Self> {
        if let Some(bad) = faces.iter().flatten().find(|&&i| i >= vertices.len()) {
            return Err(VirtueError::geometry(format!(
                "face references vertex {} but the surface has {} vertices",
                bad,
                vertices.len()
            )));
        }
        let centroids = mesh::face_centroids(&vertices, &faces);
        Ok(Self { vertices, faces, centroids })
    }

    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    pub fn centroids(&self) -> &[[f64; 3]] {
        &self.centroids
    }

    pub fn n_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// Extracted surface plus decimation bookkeeping
#[derive(Debug, Clone)]
pub struct SurfaceExtraction {
    pub surface: Surface,
    /// Faces of the isosurface before decimation
    pub raw_faces: usize,
    pub target_faces: usize,
}

impl SurfaceExtraction {
    /// Warning when decimation stopped above its target
    pub fn shortfall(&self, surface: &'static str) -> Option<Warning> {
        let achieved = self.surface.n_faces();
        (achieved > self.target_faces).then(|| Warning::DecimationShortfall {
            surface,
            target: self.target_faces,
            achieved,
        })
    }
}

/// Extract a closed, decimated surface from a binary mask
pub fn extract_surface(mask: &Mask, params: &SurfaceParams) -> Result<SurfaceExtraction> {
    params.validate()?;
    if mask.is_empty() {
        return Err(VirtueError::geometry("mask has no foreground voxels, no surface to extract"));
    }

    let (nx, ny, nz) = mask.dims;
    let pad = kernel_reach(params.sigma) + 1;
    let (padded, pdims) = pad_zeros(&mask.to_f64(), nx, ny, nz, pad);
    let smoothed = gaussian_smooth_3d(&padded, pdims.0, pdims.1, pdims.2, params.sigma);

    let (vsx, vsy, vsz) = mask.voxel_size;
    let shift = -(pad as f64);
    let (vertices, faces) = isosurface::extract_isosurface(
        &smoothed,
        pdims,
        ISO_LEVEL,
        [vsx, vsy, vsz],
        [shift, shift, shift],
    );

    if faces.is_empty() {
        return Err(VirtueError::geometry(format!(
            "mask too small for smoothing sigma {}: no isosurface at level {}",
            params.sigma, ISO_LEVEL
        )));
    }

    let raw_faces = faces.len();
    let target = params.target_faces(raw_faces);
    if target == 0 {
        return Err(VirtueError::geometry(format!(
            "decimating {} faces with {:?} leaves no faces",
            raw_faces, params.reduction
        )));
    }

    let (vertices, faces) = decimate::decimate(&vertices, &faces, target);
    debug!(raw_faces, target, faces = faces.len(), vertices = vertices.len(), "surface extracted");
    if faces.len() > target {
        warn!(target, achieved = faces.len(), "decimation stopped above target face count");
    }

    Ok(SurfaceExtraction {
        surface: Surface::new(vertices, faces)?,
        raw_faces,
        target_faces: target,
    })
}
