//! Non-infiltrating growth law
//!
//! The displacement factor k(r) in [0, 1] scales the tumour radius Dt into a
//! displacement along the radial direction: tissue at or inside the tumour
//! surface moves by the full Dt, tissue at or beyond the brain surface Db
//! does not move, and the factor decays in between with
//! t = (r - Dt) / (Db - Dt).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VirtueError};

/// Rates below this are treated as linear decay
const LINEAR_LIMIT: f64 = 1e-9;

/// Upper bound for the dynamically chosen rate
const MAX_LAMBDA: f64 = 50.0;

/// Shape of the decay between the tumour and brain surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthModel {
    /// k = 1 - t
    Linear,
    /// Normalised exponential with the steepest rate that keeps the
    /// deformation one-to-one, optionally capped by lambda
    Exponential,
    /// Normalised exponential with a fixed rate lambda
    ExponentialConstant,
}

impl GrowthModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthModel::Linear => "linear",
            GrowthModel::Exponential => "exponential",
            GrowthModel::ExponentialConstant => "exponential_constant",
        }
    }
}

impl FromStr for GrowthModel {
    type Err = VirtueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(GrowthModel::Linear),
            "exponential" | "exp" => Ok(GrowthModel::Exponential),
            "exponential_constant" | "exponential-constant" => Ok(GrowthModel::ExponentialConstant),
            _ => Err(VirtueError::configuration(format!(
                "unknown growth model '{}', expected linear, exponential or exponential_constant",
                s
            ))),
        }
    }
}

impl fmt::Display for GrowthModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalised exponential decay, 1 at t = 0 and 0 at t = 1
#[inline]
fn exponential_decay(t: f64, lambda: f64) -> f64 {
    if lambda < LINEAR_LIMIT {
        return 1.0 - t;
    }
    ((-lambda * t).exp() - (-lambda).exp()) / -(-lambda).exp_m1()
}

/// lambda / (1 - e^-lambda): steepest slope of the normalised decay, at t = 0
#[inline]
fn initial_slope(lambda: f64) -> f64 {
    if lambda < LINEAR_LIMIT {
        1.0
    } else {
        lambda / -(-lambda).exp_m1()
    }
}

/// Largest rate keeping r -> r + k(r) * Dt monotone on [Dt, Db]
///
/// Solves lambda / (1 - e^-lambda) = (Db - Dt) / Dt. No positive rate
/// qualifies when the ratio is at most 1, and 0 (linear) is returned.
pub fn dynamic_lambda(dt: f64, db: f64) -> f64 {
    if dt <= 0.0 {
        return MAX_LAMBDA;
    }
    let ratio = (db - dt) / dt;
    if !(ratio > 1.0) {
        return 0.0;
    }
    if initial_slope(MAX_LAMBDA) <= ratio {
        return MAX_LAMBDA;
    }

    // initial_slope is increasing and initial_slope(x) >= x
    let (mut lo, mut hi) = (0.0, ratio.min(MAX_LAMBDA));
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if initial_slope(mid) > ratio {
            hi = mid;
        } else {
            lo = mid;
        }
        if hi - lo < 1e-12 {
            break;
        }
    }
    lo
}

/// Growth law with its model and validated rate parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthLaw {
    pub model: GrowthModel,
    /// None when not supplied (non-positive values count as not supplied)
    pub lambda: Option<f64>,
}

impl GrowthLaw {
    pub fn new(model: GrowthModel, lambda: Option<f64>) -> Result<Self> {
        let lambda = lambda.filter(|&l| l > 0.0);
        if let Some(l) = lambda {
            if !l.is_finite() {
                return Err(VirtueError::configuration(format!("lambda must be finite, got {}", l)));
            }
        }
        if model == GrowthModel::ExponentialConstant && lambda.is_none() {
            return Err(VirtueError::configuration(
                "lambda is required (and must be positive) for the exponential_constant model",
            ));
        }
        Ok(Self { model, lambda })
    }

    /// Rate used along a direction with tumour radius `dt` and brain radius `db`
    pub fn rate(&self, dt: f64, db: f64) -> f64 {
        match self.model {
            GrowthModel::Linear => 0.0,
            GrowthModel::Exponential => {
                let dynamic = dynamic_lambda(dt, db);
                match self.lambda {
                    Some(cap) => dynamic.min(cap),
                    None => dynamic,
                }
            }
            GrowthModel::ExponentialConstant => self.lambda.unwrap_or(0.0),
        }
    }

    /// Displacement factor in [0, 1] at radius `r`
    pub fn factor(&self, r: f64, dt: f64, db: f64) -> f64 {
        // Outside the brain first, so Dt > Db never moves tissue there
        if r >= db {
            return 0.0;
        }
        if r <= dt {
            return 1.0;
        }

        let t = (r - dt) / (db - dt);
        let k = match self.model {
            GrowthModel::Linear => 1.0 - t,
            _ => exponential_decay(t, self.rate(dt, db)),
        };
        k.clamp(0.0, 1.0)
    }
}

/// One-shot form of [`GrowthLaw::factor`]
pub fn displacement_factor(
    radius: f64,
    dt: f64,
    db: f64,
    model: GrowthModel,
    lambda: Option<f64>,
) -> Result<f64> {
    Ok(GrowthLaw::new(model, lambda)?.factor(radius, dt, db))
}
