//! VIRTUE: virtual tumour expansion
//!
//! Deformation fields that model the mass effect of a non-infiltrating
//! tumour growing inside the brain.
//!
//! # Modules
//! - `surface`: Mask to smoothed, decimated triangle surface
//! - `simplify`: Largest component and convex hull of the tumour mask
//! - `spherical`: Radial coordinates about the growth centre
//! - `lookup`: Tumour and brain radius per direction, with an on-disk cache
//! - `growth`: Displacement factor between the two surfaces
//! - `field`: Displacement field assembly
//! - `deform`: The whole pipeline from masks to fields
//! - `nifti_io`: NIfTI mask input and deformation field output

// Core modules
pub mod error;
pub mod volume;
pub mod config;

// Algorithm modules
pub mod surface;
pub mod simplify;
pub mod spherical;
pub mod lookup;
pub mod growth;
pub mod field;
pub mod deform;
pub mod utils;

// I/O modules
pub mod nifti_io;

pub use config::DeformationConfig;
pub use deform::{compute_deformation, DeformationOutput, DeformationReport};
pub use error::{Result, VirtueError, Warning};
pub use field::{DisplacementField, FieldDirection};
pub use growth::{displacement_factor, GrowthLaw, GrowthModel};
pub use volume::{Mask, Region, Volume};
