//! Volume utilities shared across the pipeline

pub mod mask;
pub mod smoothing;

pub use mask::{centroid_mm, fill_box, sphere_mask};
pub use smoothing::{gaussian_smooth_3d, kernel_reach, pad_zeros};
