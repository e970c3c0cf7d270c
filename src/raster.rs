use image::{imageops, DynamicImage, GrayImage, ImageBuffer, Luma, Pixel, RgbImage, RgbaImage};

use crate::error::{DeskewError, Result};
use crate::geometry::Rectangle;

/// Sample value marking foreground (ink) in a binary raster
pub const BLACK: u8 = 0;
/// Sample value marking background (paper) in a binary raster
pub const WHITE: u8 = 255;

/// Pixel depth of a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// Bilevel image, one byte per pixel holding either `BLACK` or `WHITE`
    Binary,
    /// 8-bit luma
    Gray,
    /// 24-bit colour
    Rgb,
    /// 32-bit colour with alpha
    Rgba,
}

impl Depth {
    /// Logical bits per pixel
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            Depth::Binary => 1,
            Depth::Gray => 8,
            Depth::Rgb => 24,
            Depth::Rgba => 32,
        }
    }

    /// Stored bytes per pixel
    pub fn channels(self) -> u32 {
        match self {
            Depth::Binary | Depth::Gray => 1,
            Depth::Rgb => 3,
            Depth::Rgba => 4,
        }
    }
}

/// An owned in-memory page image tagged with its depth.
///
/// Every transform in this crate borrows a raster and hands back a new one;
/// nothing mutates a raster in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Raster {
    Binary(GrayImage),
    Gray(GrayImage),
    Rgb(RgbImage),
    Rgba(RgbaImage),
}

impl Raster {
    /// Wrap a bilevel image, snapping every sample to `BLACK` or `WHITE`
    pub fn binary(mut image: GrayImage) -> Self {
        for pixel in image.pixels_mut() {
            pixel[0] = if pixel[0] < 128 { BLACK } else { WHITE };
        }
        Raster::Binary(image)
    }

    /// Adopt a decoded image, narrowing anything wider than 8 bits per channel.
    /// Grayscale images that only contain pure black and white are tagged binary.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(gray) => {
                if is_bilevel(&gray) {
                    Raster::Binary(gray)
                } else {
                    Raster::Gray(gray)
                }
            }
            DynamicImage::ImageRgb8(rgb) => Raster::Rgb(rgb),
            DynamicImage::ImageRgba8(rgba) => Raster::Rgba(rgba),
            other if other.color().has_alpha() => Raster::Rgba(other.to_rgba8()),
            other if !other.color().has_color() => Raster::Gray(other.to_luma8()),
            other => Raster::Rgb(other.to_rgb8()),
        }
    }

    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            Raster::Binary(gray) | Raster::Gray(gray) => DynamicImage::ImageLuma8(gray),
            Raster::Rgb(rgb) => DynamicImage::ImageRgb8(rgb),
            Raster::Rgba(rgba) => DynamicImage::ImageRgba8(rgba),
        }
    }

    pub fn depth(&self) -> Depth {
        match self {
            Raster::Binary(_) => Depth::Binary,
            Raster::Gray(_) => Depth::Gray,
            Raster::Rgb(_) => Depth::Rgb,
            Raster::Rgba(_) => Depth::Rgba,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Raster::Binary(img) | Raster::Gray(img) => img.dimensions(),
            Raster::Rgb(img) => img.dimensions(),
            Raster::Rgba(img) => img.dimensions(),
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.dimensions().1
    }

    /// Bytes per row of the backing buffer
    pub fn stride(&self) -> usize {
        self.width() as usize * self.depth().channels() as usize
    }

    pub fn is_empty(&self) -> bool {
        let (width, height) = self.dimensions();
        width == 0 || height == 0
    }

    /// Luma scratch copy used by the binarisation helpers
    pub fn to_luma(&self) -> GrayImage {
        match self {
            Raster::Binary(img) | Raster::Gray(img) => img.clone(),
            Raster::Rgb(img) => imageops::grayscale(img),
            Raster::Rgba(img) => imageops::grayscale(img),
        }
    }

    /// Copy the pixels inside `rect` into a new raster of the same depth
    pub fn extract(&self, rect: &Rectangle) -> Result<Raster> {
        let (width, height) = self.dimensions();
        if !rect.fits_within(width, height) {
            return Err(DeskewError::InvalidCropRegion(format!(
                "{:?} is not contained in a {}x{} raster",
                rect, width, height
            )));
        }

        Ok(match self {
            Raster::Binary(img) => Raster::Binary(copy_region(img, rect)),
            Raster::Gray(img) => Raster::Gray(copy_region(img, rect)),
            Raster::Rgb(img) => Raster::Rgb(copy_region(img, rect)),
            Raster::Rgba(img) => Raster::Rgba(copy_region(img, rect)),
        })
    }
}

fn copy_region<P>(img: &ImageBuffer<P, Vec<u8>>, rect: &Rectangle) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    imageops::crop_imm(img, rect.x, rect.y, rect.width, rect.height).to_image()
}

fn is_bilevel(gray: &GrayImage) -> bool {
    gray.pixels().all(|&Luma([v])| v == BLACK || v == WHITE)
}
