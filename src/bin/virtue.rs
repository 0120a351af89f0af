//! Virtual tumour expansion.
//!
//! Reads a tumour mask and a brain mask on the same grid and writes
//! deformation fields that grow the tumour inside the brain.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use virtue_core::config::DeformationConfig;
use virtue_core::deform::compute_deformation;
use virtue_core::growth::GrowthModel;
use virtue_core::nifti_io::{read_mask, write_deformation_field};
use virtue_core::surface::Reduction;

#[derive(Parser, Debug)]
#[command(name = "virtue")]
#[command(about = "Deformation fields modelling the mass effect of a growing tumour")]
struct Args {
    /// Tumour mask (.nii or .nii.gz)
    #[arg(long)]
    tumour: PathBuf,

    /// Brain mask on the same grid
    #[arg(long)]
    brain: PathBuf,

    /// Output path for the inverse deformation field
    #[arg(long)]
    deformation_field: Option<PathBuf>,

    /// Output path for the forward deformation field
    #[arg(long)]
    deformation_field_forward: Option<PathBuf>,

    /// Growth model: linear, exponential or exponential_constant
    #[arg(short = 'k', long)]
    model: Option<GrowthModel>,

    /// Exponential rate (cap for exponential, fixed for exponential_constant)
    #[arg(short = 'l', long)]
    lambda: Option<f64>,

    /// Displacement scale factor
    #[arg(long)]
    scale: Option<f64>,

    /// Directory for cached distance lookups
    #[arg(long, env = "VIRTUE_LOOKUP_DIR")]
    distance_lookup: Option<PathBuf>,

    /// Restrict the field to the brain bounding box plus this many voxels
    #[arg(long)]
    crop_margin: Option<usize>,

    /// Target face count for the brain surface
    #[arg(long)]
    brain_faces: Option<usize>,

    /// Target face count for the tumour surface
    #[arg(long)]
    tumour_faces: Option<usize>,

    /// Keep the tumour as-is instead of replacing it with its convex hull
    #[arg(long)]
    no_convex_hull: bool,

    /// Log level
    #[arg(long, env = "VIRTUE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> DeformationConfig {
        let mut config = DeformationConfig::from_env();
        if let Some(model) = self.model {
            config.model = model;
        }
        if self.lambda.is_some() {
            config.lambda = self.lambda;
        }
        if let Some(scale) = self.scale {
            config.scale_factor = scale;
        }
        if self.distance_lookup.is_some() {
            config.lookup_dir = self.distance_lookup.clone();
        }
        if self.crop_margin.is_some() {
            config.crop_margin = self.crop_margin;
        }
        if let Some(faces) = self.brain_faces {
            config.brain_surface.reduction = Reduction::TargetFaces(faces);
        }
        if let Some(faces) = self.tumour_faces {
            config.tumour_surface.reduction = Reduction::TargetFaces(faces);
        }
        if self.no_convex_hull {
            config.use_convex_hull = false;
        }
        // Inverse unless only the forward output was asked for
        config.compute_forward = self.deformation_field_forward.is_some();
        config.compute_inverse = self.deformation_field.is_some() || !config.compute_forward;
        config
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt().with_env_filter(filter).with_target(false).init();

    if args.deformation_field.is_none() && args.deformation_field_forward.is_none() {
        anyhow::bail!("no output requested: pass --deformation-field and/or --deformation-field-forward");
    }

    let config = args.config();
    config.validate()?;
    info!(model = %config.model, lambda = ?config.lambda, scale = config.scale_factor, "starting");

    let start = Instant::now();
    let tumour = read_mask(&args.tumour, config.mask_threshold)
        .with_context(|| format!("reading tumour mask {}", args.tumour.display()))?;
    let brain = read_mask(&args.brain, config.mask_threshold)
        .with_context(|| format!("reading brain mask {}", args.brain.display()))?;
    info!(dims = ?brain.dims, voxel_size = ?brain.voxel_size, "masks loaded");

    let output = compute_deformation(&tumour, &brain, &config)?;
    let report = &output.report;
    info!(
        origin = ?report.origin,
        tumour_voxels = report.tumour_voxels,
        from_cache = report.lookup_from_cache,
        warnings = report.warnings.len(),
        "deformation computed"
    );

    if let (Some(path), Some(field)) = (&args.deformation_field, &output.inverse) {
        write_deformation_field(path, field, &brain)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "inverse field written");
    }
    if let (Some(path), Some(field)) = (&args.deformation_field_forward, &output.forward) {
        write_deformation_field(path, field, &brain)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "forward field written");
    }

    if !report.warnings.is_empty() {
        warn!(count = report.warnings.len(), "finished with warnings");
    }
    info!(elapsed = ?start.elapsed(), "done");
    Ok(())
}
