//! Watermark removal CLI tool
//!
//! Command-line interface for removing watermarks from images, batches and
//! videos using the watermark-remover library.

#[cfg(feature = "cli")]
use watermark_remover::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
