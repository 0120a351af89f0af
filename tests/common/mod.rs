//! Common test utilities for virtue-core integration tests

#![allow(dead_code)]

use virtue_core::utils::sphere_mask;
use virtue_core::volume::Mask;

/// Tumour and brain sphere masks on one isotropic grid
pub fn sphere_pair(
    n: usize,
    tumour_center: [f64; 3],
    tumour_radius: f64,
    brain_center: [f64; 3],
    brain_radius: f64,
) -> (Mask, Mask) {
    (
        sphere_mask((n, n, n), tumour_center, tumour_radius),
        sphere_mask((n, n, n), brain_center, brain_radius),
    )
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64).sqrt()
}

/// Distances of `points` from `center`
pub fn radii(points: &[[f64; 3]], center: [f64; 3]) -> Vec<f64> {
    points.iter().map(|p| distance(*p, center)).collect()
}

pub fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

pub fn magnitude(v: [f64; 3]) -> f64 {
    distance(v, [0.0; 3])
}

/// RMS difference between two vector fields
pub fn rms_difference(a: &[[f64; 3]], b: &[[f64; 3]]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let sum: f64 = a.iter().zip(b.iter()).map(|(x, y)| distance(*x, *y).powi(2)).sum();
    (sum / a.len() as f64).sqrt()
}
