use std::path::Path;

use image::{DynamicImage, ImageFormat, ImageReader};
use tracing::{debug, instrument};

use crate::error::{DeskewError, Result};
use crate::raster::Raster;

/// Format used when a path carries no recognised extension
pub const DEFAULT_FORMAT: ImageFormat = ImageFormat::Png;

/// Decode an image file into a raster
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load(path: impl AsRef<Path>) -> Result<Raster> {
    let path = path.as_ref();
    let decoded = ImageReader::open(path)
        .map_err(image::ImageError::IoError)
        .and_then(|reader| reader.with_guessed_format().map_err(image::ImageError::IoError))
        .and_then(|reader| reader.decode())
        .map_err(|source| DeskewError::DecodeFailed {
            path: path.to_path_buf(),
            source,
        })?;

    let raster = Raster::from_dynamic(decoded);
    debug!(
        width = raster.width(),
        height = raster.height(),
        depth = ?raster.depth(),
        "image decoded"
    );
    Ok(raster)
}

/// Output format implied by the file extension, if it names one we encode
pub fn format_for_path(path: &Path) -> Option<ImageFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        "webp" => Some(ImageFormat::WebP),
        "tif" | "tiff" => Some(ImageFormat::Tiff),
        "bmp" => Some(ImageFormat::Bmp),
        "pnm" | "pbm" | "pgm" | "ppm" => Some(ImageFormat::Pnm),
        _ => None,
    }
}

/// Encode a raster to `path`.
///
/// Without an explicit `format` the extension decides, falling back to
/// `DEFAULT_FORMAT`. Alpha is dropped for JPEG, which cannot store it.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn save(raster: Raster, path: impl AsRef<Path>, format: Option<ImageFormat>) -> Result<()> {
    let path = path.as_ref();
    let format = format
        .or_else(|| format_for_path(path))
        .unwrap_or(DEFAULT_FORMAT);

    let image = match (format, raster.into_dynamic()) {
        (ImageFormat::Jpeg, rgba @ DynamicImage::ImageRgba8(_)) => {
            DynamicImage::ImageRgb8(rgba.to_rgb8())
        }
        (_, image) => image,
    };

    debug!(?format, width = image.width(), height = image.height(), "encoding image");

    image
        .save_with_format(path, format)
        .map_err(|source| DeskewError::EncodeFailed {
            path: path.to_path_buf(),
            source,
        })
}
