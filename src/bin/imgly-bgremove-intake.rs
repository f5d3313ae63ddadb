//! IMG.LY Background Removal Intake CLI Tool
//!
//! Validates one image, hands it to the configured background removal
//! service, and downloads the transparent PNG result.

#[cfg(feature = "cli")]
use imgly_bgremove_intake::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
