use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::crop::{CropConfig, EdgeClean};
use crate::detection::{SkewConfig, DEFAULT_REFINE_REDUCTION, DEFAULT_SWEEP_REDUCTION};

#[derive(Parser, Debug)]
#[command(name = "deskew")]
#[command(version, about = "Straighten a scanned page and optionally crop it to its content")]
pub struct Cli {
    /// Input image path
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output path; the extension selects the encoding
    #[arg(short, long, default_value = "deskewed.jpg")]
    pub output: PathBuf,

    /// The angle range, in degrees, to sweep when detecting skew
    #[arg(short = 'r', long, default_value = "10")]
    pub sweep_range: f32,

    /// Angular resolution (tenths of a degree) used during the sweep
    #[arg(short = 'd', long, default_value = "1")]
    pub sweep_delta: f32,

    /// Minimum confidence required to apply the detected skew correction; 0 disables the check
    #[arg(short = 'c', long, default_value = "2.0")]
    pub min_confidence: f64,

    /// Binarization threshold; 0 picks one automatically
    #[arg(short, long, default_value = "0")]
    pub threshold: u8,

    /// Crop the page to its content before writing it
    #[arg(long)]
    pub crop: bool,

    /// Pixels to ignore on the left and right border when cropping
    #[arg(long, default_value = "0")]
    pub clear_lr: u32,

    /// Pixels to ignore on the top and bottom border when cropping
    #[arg(long, default_value = "0")]
    pub clear_tb: u32,

    /// Border noise removal applied when cropping
    #[arg(long, value_enum, default_value = "none")]
    pub edge_clean: EdgeCleanArg,

    /// Padding kept on the left and right of the content
    #[arg(long, default_value = "0")]
    pub pad_lr: u32,

    /// Padding kept above and below the content
    #[arg(long, default_value = "0")]
    pub pad_tb: u32,

    /// Largest fraction the crop may widen to fit a standard page shape
    #[arg(long, default_value = "0")]
    pub max_widen: f32,

    /// Show detection details
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EdgeCleanArg {
    None,
    SideNoise,
    Max,
}

impl From<EdgeCleanArg> for EdgeClean {
    fn from(arg: EdgeCleanArg) -> Self {
        match arg {
            EdgeCleanArg::None => EdgeClean::None,
            EdgeCleanArg::SideNoise => EdgeClean::SideNoise,
            EdgeCleanArg::Max => EdgeClean::MaxAggressive,
        }
    }
}

impl Cli {
    pub fn skew_config(&self) -> SkewConfig {
        SkewConfig {
            sweep_range: self.sweep_range,
            sweep_delta: self.sweep_delta,
            sweep_reduction: DEFAULT_SWEEP_REDUCTION,
            refine_reduction: DEFAULT_REFINE_REDUCTION,
            threshold: self.threshold,
        }
    }

    /// Crop settings, or `None` when cropping was not requested
    pub fn crop_config(&self) -> Option<CropConfig> {
        self.crop.then(|| CropConfig {
            margin_clear_lr: self.clear_lr,
            margin_clear_tb: self.clear_tb,
            edge_clean: self.edge_clean.into(),
            padding_lr: self.pad_lr,
            padding_tb: self.pad_tb,
            max_widen: self.max_widen,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_core_defaults() {
        let cli = Cli::parse_from(["deskew", "scan.png"]);
        assert_eq!(cli.skew_config(), SkewConfig::default());
        assert_eq!(cli.output, PathBuf::from("deskewed.jpg"));
        assert_eq!(cli.min_confidence, 2.0);
        assert!(cli.crop_config().is_none());
    }

    #[test]
    fn test_crop_flags() {
        let cli = Cli::parse_from([
            "deskew",
            "scan.png",
            "--crop",
            "--clear-lr",
            "20",
            "--clear-tb",
            "20",
            "--edge-clean",
            "side-noise",
            "--pad-lr",
            "10",
            "--pad-tb",
            "10",
            "--max-widen",
            "0.02",
        ]);
        assert_eq!(
            cli.crop_config(),
            Some(CropConfig {
                margin_clear_lr: 20,
                margin_clear_tb: 20,
                edge_clean: EdgeClean::SideNoise,
                padding_lr: 10,
                padding_tb: 10,
                max_widen: 0.02,
            })
        );
    }

    #[test]
    fn test_sweep_flags() {
        let cli = Cli::parse_from(["deskew", "-r", "6", "-d", "2", "-t", "140", "scan.png"]);
        let config = cli.skew_config();
        assert_eq!(config.sweep_range, 6.0);
        assert_eq!(config.sweep_delta, 2.0);
        assert_eq!(config.threshold, 140);
    }
}
