pub mod binarize;
pub mod cli;
pub mod codec;
pub mod crop;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod raster;
pub mod transform;

pub use cli::Cli;
pub use codec::{format_for_path, load, save};
pub use crop::{crop_image, plan_crop, CropConfig, EdgeClean};
pub use detection::{correct, estimate_skew, SkewConfig, SkewResult};
pub use error::{DeskewError, Result};
pub use geometry::Rectangle;
pub use raster::{Depth, Raster};
pub use transform::rotate;
