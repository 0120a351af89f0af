//! Configuration for the deformation engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VirtueError};
use crate::growth::{GrowthLaw, GrowthModel};
use crate::surface::{Reduction, SurfaceParams};

/// Every parameter of one deformation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeformationConfig {
    /// Decay profile between the tumour and brain surfaces.
    pub model: GrowthModel,

    /// Exponential rate: an upper bound for `exponential`, the fixed rate for
    /// `exponential_constant`. Non-positive values count as not supplied.
    pub lambda: Option<f64>,

    /// Multiplier applied to every displacement.
    pub scale_factor: f64,

    /// Produce the inverse field (the one used to warp an atlas).
    pub compute_inverse: bool,

    /// Produce the forward field.
    pub compute_forward: bool,

    /// Replace the tumour by the convex hull of its largest component.
    pub use_convex_hull: bool,

    /// Drop every tumour component but the largest.
    pub keep_largest_only: bool,

    /// Directory for Dt/Db lookup caches.
    pub lookup_dir: Option<PathBuf>,

    /// Restrict the field to the brain bounding box grown by this margin (voxels).
    pub crop_margin: Option<usize>,

    /// Threshold used when binarising floating-point mask images.
    pub mask_threshold: f64,

    pub brain_surface: SurfaceParams,

    pub tumour_surface: SurfaceParams,
}

impl Default for DeformationConfig {
    fn default() -> Self {
        Self {
            model: GrowthModel::Exponential,
            lambda: None,
            scale_factor: 1.0,
            compute_inverse: true,
            compute_forward: false,
            use_convex_hull: true,
            keep_largest_only: true,
            lookup_dir: None,
            crop_margin: None,
            mask_threshold: 0.5,
            brain_surface: SurfaceParams::with_target_faces(2.0, 3000),
            tumour_surface: SurfaceParams::with_target_faces(2.0, 900),
        }
    }
}

impl DeformationConfig {
    /// Load configuration from `VIRTUE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `var` returns for the `VIRTUE_*` keys.
    /// Unparseable values are ignored.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = var("VIRTUE_MODEL") {
            if let Ok(model) = val.parse() {
                config.model = model;
            }
        }

        if let Some(val) = var("VIRTUE_LAMBDA") {
            if let Ok(lambda) = val.parse::<f64>() {
                config.lambda = Some(lambda);
            }
        }

        if let Some(val) = var("VIRTUE_SCALE") {
            if let Ok(scale) = val.parse() {
                config.scale_factor = scale;
            }
        }

        if let Some(val) = var("VIRTUE_LOOKUP_DIR") {
            if !val.is_empty() {
                config.lookup_dir = Some(PathBuf::from(val));
            }
        }

        if let Some(val) = var("VIRTUE_BRAIN_FACES") {
            if let Ok(faces) = val.parse() {
                config.brain_surface.reduction = Reduction::TargetFaces(faces);
            }
        }

        if let Some(val) = var("VIRTUE_TUMOUR_FACES") {
            if let Ok(faces) = val.parse() {
                config.tumour_surface.reduction = Reduction::TargetFaces(faces);
            }
        }

        if let Some(val) = var("VIRTUE_SIGMA") {
            if let Ok(sigma) = val.parse() {
                config.brain_surface.sigma = sigma;
                config.tumour_surface.sigma = sigma;
            }
        }

        config
    }

    /// Growth law for this configuration.
    pub fn growth_law(&self) -> Result<GrowthLaw> {
        GrowthLaw::new(self.model, self.lambda)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.compute_inverse && !self.compute_forward {
            return Err(VirtueError::configuration(
                "nothing to compute: enable the inverse or the forward field",
            ));
        }

        if !self.use_convex_hull && !self.keep_largest_only {
            return Err(VirtueError::configuration(
                "at least one of use_convex_hull and keep_largest_only must be set",
            ));
        }

        if !self.scale_factor.is_finite() || self.scale_factor < 0.0 {
            return Err(VirtueError::configuration(format!(
                "scale_factor must be finite and non-negative, got {}",
                self.scale_factor
            )));
        }

        if !(0.0..1.0).contains(&self.mask_threshold) {
            return Err(VirtueError::configuration(format!(
                "mask_threshold must be in [0, 1), got {}",
                self.mask_threshold
            )));
        }

        let scoped = |which: &str, err: VirtueError| match err {
            VirtueError::Configuration(msg) => {
                VirtueError::configuration(format!("{} surface: {}", which, msg))
            }
            other => other,
        };
        self.brain_surface.validate().map_err(|e| scoped("brain", e))?;
        self.tumour_surface.validate().map_err(|e| scoped("tumour", e))?;

        self.growth_law()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = DeformationConfig::default();
        assert_eq!(config.model, GrowthModel::Exponential);
        assert_eq!(config.lambda, None);
        assert_eq!(config.scale_factor, 1.0);
        assert!(config.compute_inverse && !config.compute_forward);
        assert!(config.use_convex_hull && config.keep_largest_only);
        assert_eq!(config.brain_surface.reduction, Reduction::TargetFaces(3000));
        assert_eq!(config.tumour_surface.reduction, Reduction::TargetFaces(900));
        assert_eq!(config.tumour_surface.sigma, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = DeformationConfig::from_vars(vars(&[
            ("VIRTUE_MODEL", "LINEAR"),
            ("VIRTUE_LAMBDA", "0.8"),
            ("VIRTUE_SCALE", "1.5"),
            ("VIRTUE_LOOKUP_DIR", "/tmp/virtue"),
            ("VIRTUE_BRAIN_FACES", "2000"),
            ("VIRTUE_TUMOUR_FACES", "not-a-number"),
            ("VIRTUE_SIGMA", "1.5"),
        ]));
        assert_eq!(config.model, GrowthModel::Linear);
        assert_eq!(config.lambda, Some(0.8));
        assert_eq!(config.scale_factor, 1.5);
        assert_eq!(config.lookup_dir, Some(PathBuf::from("/tmp/virtue")));
        assert_eq!(config.brain_surface.reduction, Reduction::TargetFaces(2000));
        assert_eq!(config.tumour_surface.reduction, Reduction::TargetFaces(900));
        assert_eq!(config.brain_surface.sigma, 1.5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DeformationConfig::default();
        config.compute_inverse = false;
        assert!(config.validate().is_err());

        config = DeformationConfig::default();
        config.use_convex_hull = false;
        config.keep_largest_only = false;
        assert!(config.validate().is_err());

        config = DeformationConfig::default();
        config.scale_factor = -1.0;
        assert!(config.validate().is_err());

        config = DeformationConfig::default();
        config.model = GrowthModel::ExponentialConstant;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lambda"));
        config.lambda = Some(2.0);
        assert!(config.validate().is_ok());

        config = DeformationConfig::default();
        config.tumour_surface.sigma = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tumour surface"));
    }

    #[test]
    fn test_serde_round_trip() {
        let mut config = DeformationConfig::default();
        config.lambda = Some(0.25);
        config.crop_margin = Some(4);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"exponential\""));
        let back: DeformationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
