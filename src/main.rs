use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use deskew::{crop_image, estimate_skew, load, save, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load input image
    let raster = load(&cli.input)
        .with_context(|| format!("Failed to load input file: {:?}", cli.input))?;

    info!(
        width = raster.width(),
        height = raster.height(),
        depth = ?raster.depth(),
        "loaded {:?}",
        cli.input
    );

    // Detect skew; the correction is applied lazily once the crop is known
    let skew = estimate_skew(&raster, &cli.skew_config(), false)
        .context("Failed to detect skew")?;

    if !skew.meets(cli.min_confidence) {
        warn!(
            angle = skew.angle,
            confidence = skew.confidence,
            min_confidence = cli.min_confidence,
            "discarding skew correction"
        );
        bail!(
            "skew confidence {:.2} below threshold {:.2} (detected angle {:.2}°)",
            skew.confidence,
            cli.min_confidence,
            skew.angle
        );
    }

    // Crop on the unrotated pixels, then straighten only what is kept
    let page = match cli.crop_config() {
        Some(config) => {
            let (cropped, rect) = crop_image(&raster, &config).context("Failed to crop image")?;
            info!(
                x = rect.x,
                y = rect.y,
                width = rect.width,
                height = rect.height,
                "cropped to content"
            );
            cropped
        }
        None => raster,
    };

    let corrected = skew.correct(&page).context("Failed to rotate image")?;

    save(corrected, &cli.output, None)
        .with_context(|| format!("Failed to save output: {:?}", cli.output))?;

    info!(
        angle = skew.angle,
        confidence = skew.confidence,
        output = %cli.output.display(),
        "deskew complete"
    );

    Ok(())
}
