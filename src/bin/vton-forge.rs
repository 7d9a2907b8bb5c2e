//! vton-forge CLI
//!
//! Batch edit and virtual try-on generation against object storage.

#[cfg(feature = "cli")]
use vton_forge::cli;

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
