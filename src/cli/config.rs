//! Conversion from CLI arguments to engine configuration

use crate::cli::main_impl::{Cli, CliAlgorithm, RemovalArgs};
use crate::{
    config::{EngineConfig, InpaintAlgorithm, RemovalMethod, RemovalOptions},
    services::OutputFormatHandler,
};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Image extensions accepted when expanding directories
pub(crate) const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "tif", "tiff"];

/// Suffix appended to the stem of exported files
const OUTPUT_SUFFIX: &str = "_clean";

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Engine configuration from `--config` (or defaults) plus flag overrides
    pub(crate) fn engine_config(cli: &Cli) -> Result<EngineConfig> {
        let mut config = match &cli.config {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => EngineConfig::default(),
        };

        if let Some(dir) = &cli.scratch_dir {
            config.scratch_dir = Some(dir.clone());
        }
        if let Some(quality) = cli.jpeg_quality {
            config.jpeg_quality = quality;
        }

        config.validate().context("Invalid engine configuration")?;
        Ok(config)
    }

    pub(crate) fn removal_options(args: &RemovalArgs) -> Result<RemovalOptions> {
        RemovalOptions::builder()
            .algorithm(match args.algorithm {
                CliAlgorithm::Telea => InpaintAlgorithm::Telea,
                CliAlgorithm::NavierStokes => InpaintAlgorithm::NavierStokes,
            })
            .dilate_pixels(args.dilate)
            .inpaint_radius(args.radius)
            .method(if args.cloud {
                RemovalMethod::Cloud
            } else {
                RemovalMethod::Local
            })
            .lossless(args.lossless)
            .build()
            .context("Invalid removal options")
    }

    /// `<dir>/<stem>_clean.<ext>`, defaulting to the input's directory
    pub(crate) fn output_path(input: &Path, output_dir: Option<&Path>, extension: &str) -> PathBuf {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        let dir = output_dir
            .or_else(|| input.parent())
            .unwrap_or_else(|| Path::new("."));
        dir.join(format!("{}{}.{}", stem, OUTPUT_SUFFIX, extension))
    }

    /// Like [`output_path`](Self::output_path), numbered `_clean_2`, `_clean_3`, ...
    /// when an earlier item of the same run already claimed the name
    pub(crate) fn unique_output_path(
        input: &Path,
        output_dir: &Path,
        extension: &str,
        taken: &mut HashSet<PathBuf>,
    ) -> PathBuf {
        let first = Self::output_path(input, Some(output_dir), extension);
        if taken.insert(first.clone()) {
            return first;
        }

        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        (2_u32..)
            .map(|n| output_dir.join(format!("{}{}_{}.{}", stem, OUTPUT_SUFFIX, n, extension)))
            .find(|candidate| taken.insert(candidate.clone()))
            .unwrap_or(first)
    }

    pub(crate) fn is_image_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    }

    /// Expand files and directories into a sorted list of images
    pub(crate) fn collect_images(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for input in inputs {
            if input.is_file() {
                if Self::is_image_file(input) {
                    files.push(input.clone());
                } else {
                    log::warn!("Skipping unsupported file: {}", input.display());
                }
            } else if input.is_dir() {
                let max_depth = if recursive { usize::MAX } else { 1 };
                for entry in walkdir::WalkDir::new(input).max_depth(max_depth) {
                    let entry = entry?;
                    if entry.file_type().is_file() && Self::is_image_file(entry.path()) {
                        files.push(entry.path().to_path_buf());
                    }
                }
            } else {
                anyhow::bail!(
                    "Input path does not exist or is not accessible: {}",
                    input.display()
                );
            }
        }

        files.sort();
        files.dedup();
        Ok(files)
    }

    pub(crate) fn ensure_video(path: &Path) -> Result<()> {
        if !OutputFormatHandler::is_video_path(path) {
            anyhow::bail!("Not a supported video file: {}", path.display());
        }
        Ok(())
    }
}
