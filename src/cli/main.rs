//! Watermark removal CLI tool
//!
//! Thin shell over [`WatermarkRemover`]: every command runs one session,
//! exports the produced scratch files to their destinations and sweeps the
//! scratch directory before exiting.

use super::config::CliConfigBuilder;
use crate::{
    engine::WatermarkRemover,
    services::{ConsoleProgressReporter, ProgressReporter},
    tracing_config::init_cli_tracing,
    types::{BatchEvent, BatchItem, BatchStatus, Region, VideoJobState},
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Observer polling interval for video jobs
const VIDEO_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Watermark removal CLI tool
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "watermark-remover")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit JSON log lines (requires the tracing-json feature)
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Engine configuration file (JSON)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Override the scratch directory
    #[arg(long, value_name = "DIR", global = true)]
    pub scratch_dir: Option<PathBuf>,

    /// JPEG quality (0-100) for JPEG outputs
    #[arg(long, global = true)]
    pub jpeg_quality: Option<u8>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Remove a watermark from one image
    Remove {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[command(flatten)]
        removal: RemovalArgs,

        /// Output file [default: <input>_clean.<ext>]
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Remove the same watermark from many images
    Batch {
        /// Image files or directories
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        removal: RemovalArgs,

        /// Directory receiving the cleaned images
        #[arg(long, value_name = "DIR")]
        output_dir: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Remove a watermark from every frame of a video
    Video {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[command(flatten)]
        removal: RemovalArgs,

        /// Output file [default: <input>_clean.mp4]
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Print image or video dimensions
    Info {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Manage the cloud API key
    Key {
        #[command(subcommand)]
        action: KeyCommand,
    },

    /// Remove all scratch files
    Cleanup,
}

#[derive(Subcommand)]
pub enum KeyCommand {
    /// Store the API key
    Set { key: String },
    /// Remove the stored API key
    Clear,
    /// Show whether a key is stored
    Status,
    /// Check the stored key against the service
    Test,
    /// List image-capable models for the stored key
    Models,
}

/// Region and removal options shared by the processing commands
#[derive(Args, Debug, Clone)]
pub struct RemovalArgs {
    /// Watermark rectangle as x,y,width,height in source pixels
    #[arg(long, value_name = "X,Y,W,H")]
    pub region: Region,

    /// Local inpainting algorithm
    #[arg(long, value_enum, default_value_t = CliAlgorithm::Telea)]
    pub algorithm: CliAlgorithm,

    /// Grow the region by this many pixels (0-10)
    #[arg(long, default_value_t = 3)]
    pub dilate: u32,

    /// Inpainting neighbourhood radius (1-15)
    #[arg(long, default_value_t = 5.0)]
    pub radius: f32,

    /// Use the cloud inpainting service (images only)
    #[arg(long)]
    pub cloud: bool,

    /// Force a lossless output format
    #[arg(long)]
    pub lossless: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliAlgorithm {
    Telea,
    NavierStokes,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, cli.json_logs).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::engine_config(&cli)?;
    let engine = WatermarkRemover::new(config).context("Failed to start session")?;

    let outcome = run_command(&cli, &engine).await;

    match engine.cleanup_all() {
        Ok(removed) => log::debug!("Removed {} scratch file(s)", removed),
        Err(e) => warn!("Scratch cleanup failed: {}", e),
    }

    outcome
}

async fn run_command(cli: &Cli, engine: &WatermarkRemover) -> Result<()> {
    match &cli.command {
        Command::Remove {
            input,
            removal,
            output,
        } => remove_one(engine, input, removal, output.as_deref()).await,
        Command::Batch {
            inputs,
            removal,
            output_dir,
            recursive,
        } => run_batch(engine, inputs, removal, output_dir, *recursive, cli.verbose > 0).await,
        Command::Video {
            input,
            removal,
            output,
        } => run_video(engine, input, removal, output.as_deref(), cli.verbose > 0).await,
        Command::Info { input } => show_info(engine, input).await,
        Command::Key { action } => manage_key(engine, action).await,
        Command::Cleanup => {
            let removed = engine.cleanup_all()?;
            println!("Removed {} scratch file(s)", removed);
            Ok(())
        },
    }
}

fn bar_style() -> Result<ProgressStyle> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("#>-"))
}

fn extension_of(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("png")
}

async fn remove_one(
    engine: &WatermarkRemover,
    input: &Path,
    removal: &RemovalArgs,
    output: Option<&Path>,
) -> Result<()> {
    let options = CliConfigBuilder::removal_options(removal)?;
    let result = engine
        .process_one(input, removal.region, &options)
        .await
        .with_context(|| format!("Failed to process {}", input.display()))?;

    let destination = output.map_or_else(
        || CliConfigBuilder::output_path(input, None, extension_of(&result.output_path)),
        Path::to_path_buf,
    );
    engine.export(&result.output_path, &destination).await?;

    println!(
        "{} -> {} ({} -> {} bytes, {}% smaller)",
        input.display(),
        destination.display(),
        result.original_size_bytes,
        result.processed_size_bytes,
        result.size_reduction_percent()
    );
    Ok(())
}

async fn run_batch(
    engine: &WatermarkRemover,
    inputs: &[PathBuf],
    removal: &RemovalArgs,
    output_dir: &Path,
    recursive: bool,
    verbose: bool,
) -> Result<()> {
    let options = CliConfigBuilder::removal_options(removal)?;
    let files = CliConfigBuilder::collect_images(inputs, recursive)?;
    if files.is_empty() {
        warn!("No supported images found in the provided inputs");
        return Ok(());
    }
    if output_dir.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            output_dir.display()
        );
    }
    info!("Found {} image(s) to process", files.len());

    let mut items: Vec<BatchItem> = files.iter().map(BatchItem::new).collect();
    let reporter = ConsoleProgressReporter::new(verbose);
    let bar = ProgressBar::new(items.len() as u64);
    bar.set_style(bar_style()?);

    let summary = engine
        .run_batch(&mut items, removal.region, &options, |event| {
            if verbose {
                reporter.report_batch_event(&event);
            }
            match &event {
                BatchEvent::Progress(progress) => bar.set_message(progress.current_name.clone()),
                BatchEvent::ItemUpdated { update, .. } if update.status.is_terminal() => bar.inc(1),
                BatchEvent::ItemUpdated { .. } => {},
                BatchEvent::Finished(_) => bar.finish_and_clear(),
            }
        })
        .await?;

    let mut taken = HashSet::new();
    let mut export_failures = 0_usize;
    for item in &items {
        match (item.status, &item.processed_path) {
            (BatchStatus::Completed, Some(processed)) => {
                let destination = CliConfigBuilder::unique_output_path(
                    &item.source_path,
                    output_dir,
                    extension_of(processed),
                    &mut taken,
                );
                if let Err(e) = engine.export(processed, &destination).await {
                    export_failures += 1;
                    eprintln!("Export failed: {}: {}", item.source_path.display(), e);
                }
            },
            (BatchStatus::Failed, _) => eprintln!(
                "Failed: {}: {}",
                item.display_name,
                item.error.as_deref().unwrap_or("unknown error")
            ),
            _ => {},
        }
    }

    println!(
        "Batch finished: {} completed, {} failed, {} skipped",
        summary.completed, summary.failed, summary.skipped
    );
    if summary.failed > 0 || export_failures > 0 {
        anyhow::bail!(
            "{} item(s) failed, {} export(s) failed",
            summary.failed,
            export_failures
        );
    }
    Ok(())
}

async fn run_video(
    engine: &WatermarkRemover,
    input: &Path,
    removal: &RemovalArgs,
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    CliConfigBuilder::ensure_video(input)?;
    let options = CliConfigBuilder::removal_options(removal)?;
    let descriptor = engine.video_info(input).await?;
    info!(
        "{}x{} @ {:.2} fps, {} frames ({})",
        descriptor.width, descriptor.height, descriptor.fps, descriptor.frame_count, descriptor.codec
    );

    let job = engine.start_video(input, removal.region, &options)?;
    let reporter = ConsoleProgressReporter::new(verbose);
    let bar = ProgressBar::new(u64::from(descriptor.frame_count));
    bar.set_style(bar_style()?);

    let mut ticker = tokio::time::interval(VIDEO_POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;

    while !job.state().is_terminal() {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(progress) = job.poll_progress() {
                    bar.set_length(u64::from(progress.total_frames));
                    bar.set_position(u64::from(progress.current_frame));
                    if verbose {
                        reporter.report_video_progress(&progress);
                    }
                }
            },
            _ = &mut ctrl_c, if !cancel_requested => {
                warn!("Cancelling video job");
                cancel_requested = true;
                job.cancel();
            },
        }
    }
    bar.finish_and_clear();

    let state = job.state();
    let result = job.wait().await;
    if state == VideoJobState::Cancelled {
        println!("Video processing cancelled");
        return Ok(());
    }
    let result = result.with_context(|| format!("Failed to process {}", input.display()))?;

    let destination = output.map_or_else(
        || CliConfigBuilder::output_path(input, None, crate::video::OUTPUT_EXTENSION),
        Path::to_path_buf,
    );
    engine.export(&result.output_path, &destination).await?;
    println!(
        "{} -> {} ({} frames in {:.1}s)",
        input.display(),
        destination.display(),
        result.frames_processed,
        result.duration_seconds
    );
    Ok(())
}

async fn show_info(engine: &WatermarkRemover, input: &Path) -> Result<()> {
    if crate::services::OutputFormatHandler::is_video_path(input) {
        let video = engine.video_info(input).await?;
        println!(
            "{}: {}x{}, {:.2} fps, {} frames, {:.1}s, codec {}{}",
            input.display(),
            video.width,
            video.height,
            video.fps,
            video.frame_count,
            video.duration_seconds,
            video.codec,
            if video.has_audio { ", audio" } else { "" }
        );
    } else {
        let image = engine.image_info(input)?;
        println!("{}: {}x{}", input.display(), image.width, image.height);
    }
    Ok(())
}

async fn manage_key(engine: &WatermarkRemover, action: &KeyCommand) -> Result<()> {
    match action {
        KeyCommand::Set { key } => {
            engine.set_api_key(key)?;
            println!("API key saved");
        },
        KeyCommand::Clear => {
            engine.clear_api_key()?;
            println!("API key removed");
        },
        KeyCommand::Status => {
            if engine.api_key_configured() {
                println!("API key configured");
            } else {
                println!("No API key configured");
            }
        },
        KeyCommand::Test => {
            engine.test_cloud_connection().await?;
            println!("Connection OK");
        },
        KeyCommand::Models => {
            for model in engine.list_cloud_models().await? {
                println!("{}", model);
            }
        },
    }
    Ok(())
}
