use image::{ImageBuffer, Luma, Pixel, Rgb, Rgba};
use nalgebra::Matrix3;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{DeskewError, Result};
use crate::geometry::{image_center, rotation_about, transform_point};
use crate::raster::{Raster, WHITE};

/// How source samples are read during inverse mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sampling {
    Nearest,
    Bilinear,
}

/// Rotate a raster by `degrees` (positive = clockwise) about its centre.
///
/// The output keeps the input dimensions; corners uncovered by the rotation
/// are filled with white. Binary rasters are sampled nearest-neighbour so they
/// stay bilevel, every other depth is interpolated bilinearly.
pub fn rotate(raster: &Raster, degrees: f64) -> Result<Raster> {
    if !degrees.is_finite() {
        return Err(DeskewError::RotationFailed(format!(
            "angle {degrees} is not finite"
        )));
    }
    if raster.is_empty() {
        return Err(DeskewError::RotationFailed("raster is empty".to_string()));
    }

    let (width, height) = raster.dimensions();
    let forward = rotation_about(image_center(width, height), degrees);

    // Compute inverse matrix for backward mapping
    let inverse = forward.try_inverse().ok_or_else(|| {
        DeskewError::RotationFailed(format!("rotation by {degrees} is not invertible"))
    })?;

    debug!(width, height, degrees, depth = ?raster.depth(), "rotating raster");

    Ok(match raster {
        Raster::Binary(img) => {
            Raster::Binary(warp(img, &inverse, Sampling::Nearest, Luma([WHITE]))?)
        }
        Raster::Gray(img) => {
            Raster::Gray(warp(img, &inverse, Sampling::Bilinear, Luma([WHITE]))?)
        }
        Raster::Rgb(img) => Raster::Rgb(warp(img, &inverse, Sampling::Bilinear, Rgb([WHITE; 3]))?),
        Raster::Rgba(img) => {
            Raster::Rgba(warp(img, &inverse, Sampling::Bilinear, Rgba([WHITE; 4]))?)
        }
    })
}

/// Inverse-map every output pixel through `inverse`, one scanline per task
fn warp<P>(
    img: &ImageBuffer<P, Vec<u8>>,
    inverse: &Matrix3<f64>,
    sampling: Sampling,
    fill: P,
) -> Result<ImageBuffer<P, Vec<u8>>>
where
    P: Pixel<Subpixel = u8> + Sync,
{
    let (width, height) = img.dimensions();
    let channels = P::CHANNEL_COUNT as usize;
    let row_len = width as usize * channels;

    let len = row_len.checked_mul(height as usize).ok_or_else(|| {
        DeskewError::RotationFailed(format!("{width}x{height} output is too large"))
    })?;
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|err| {
        DeskewError::RotationFailed(format!("cannot allocate {width}x{height} output: {err}"))
    })?;
    data.resize(len, 0u8);

    data.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let (src_x, src_y) = transform_point(inverse, x as f64, y as f64);
                let pixel = match sampling {
                    Sampling::Nearest => nearest(img, src_x, src_y),
                    Sampling::Bilinear => bilinear(img, src_x, src_y),
                }
                .unwrap_or(fill);
                row[x * channels..(x + 1) * channels].copy_from_slice(pixel.channels());
            }
        });

    ImageBuffer::from_raw(width, height, data).ok_or_else(|| {
        DeskewError::RotationFailed("output buffer does not match its dimensions".to_string())
    })
}

fn nearest<P>(img: &ImageBuffer<P, Vec<u8>>, x: f64, y: f64) -> Option<P>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = img.dimensions();
    let px = x.round();
    let py = y.round();
    if px < 0.0 || py < 0.0 || px >= width as f64 || py >= height as f64 {
        return None;
    }
    Some(*img.get_pixel(px as u32, py as u32))
}

/// Bilinear interpolation; `None` once the sample falls off the source
fn bilinear<P>(img: &ImageBuffer<P, Vec<u8>>, x: f64, y: f64) -> Option<P>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = img.dimensions();
    if x < -0.5 || y < -0.5 || x > width as f64 - 0.5 || y > height as f64 - 0.5 {
        return None;
    }

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x_frac = x - x.floor();
    let y_frac = y - y.floor();

    let get_pixel = |px: i64, py: i64| -> P {
        let px = px.clamp(0, width as i64 - 1) as u32;
        let py = py.clamp(0, height as i64 - 1) as u32;
        *img.get_pixel(px, py)
    };

    let (p00, p10) = (get_pixel(x0, y0), get_pixel(x0 + 1, y0));
    let (p01, p11) = (get_pixel(x0, y0 + 1), get_pixel(x0 + 1, y0 + 1));
    let (p00, p10, p01, p11) = (p00.channels(), p10.channels(), p01.channels(), p11.channels());

    let channels = P::CHANNEL_COUNT as usize;
    let mut result = [0u8; 4];
    for c in 0..channels {
        let top = p00[c] as f64 * (1.0 - x_frac) + p10[c] as f64 * x_frac;
        let bottom = p01[c] as f64 * (1.0 - x_frac) + p11[c] as f64 * x_frac;
        result[c] = (top * (1.0 - y_frac) + bottom * y_frac)
            .round()
            .clamp(0.0, 255.0) as u8;
    }

    Some(*P::from_slice(&result[..channels]))
}
