//! Binarisation and reduction helpers shared by skew detection and cropping.
//!
//! Working masks are `GrayImage`s holding `FOREGROUND` for ink and
//! `BACKGROUND` for paper, the convention `imageproc`'s morphology and
//! labelling functions expect.

use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::stats::histogram;

use crate::geometry::Rectangle;
use crate::raster::{Raster, BLACK};

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Dark and light classes whose mean luma differ by less than this are paper
/// texture rather than ink on paper
pub const MIN_CONTRAST: f64 = 48.0;

/// Pick a threshold automatically: luma values strictly below it are ink.
///
/// An image without two well separated classes (uniform or only paper grain)
/// has no content, so it gets a threshold nothing falls under.
pub fn auto_threshold(luma: &GrayImage) -> u8 {
    let counts = histogram(luma).channels[0];

    // Otsu's level is the brightest value of the dark class
    let level = otsu_level(luma);
    match class_means(&counts, level) {
        (Some(dark), Some(light)) if light - dark >= MIN_CONTRAST => level.saturating_add(1),
        _ => 0,
    }
}

/// Mean luma of the values at or below `level` and of those above it
fn class_means(counts: &[u32; 256], level: u8) -> (Option<f64>, Option<f64>) {
    let mean = |range: std::ops::RangeInclusive<usize>| {
        let (weight, sum) = counts[range.clone()]
            .iter()
            .zip(range)
            .fold((0u64, 0u64), |(w, s), (&c, v)| {
                (w + c as u64, s + c as u64 * v as u64)
            });
        (weight > 0).then(|| sum as f64 / weight as f64)
    };

    let level = level as usize;
    (mean(0..=level), mean(level + 1..=255))
}

/// Produce a foreground mask of `raster`.
///
/// `threshold` of 0 selects `auto_threshold`; binary rasters use their black
/// pixels directly and ignore it.
pub fn binarize(raster: &Raster, threshold: u8) -> GrayImage {
    if let Raster::Binary(img) = raster {
        return GrayImage::from_fn(img.width(), img.height(), |x, y| {
            Luma([mask_value(img.get_pixel(x, y)[0] == BLACK)])
        });
    }

    let luma = raster.to_luma();
    let threshold = if threshold == 0 {
        auto_threshold(&luma)
    } else {
        threshold
    };

    let mut mask = luma;
    for pixel in mask.pixels_mut() {
        *pixel = Luma([mask_value(pixel[0] < threshold)]);
    }
    mask
}

/// Downsample a mask by `factor`, marking an output pixel as foreground when
/// any pixel of its source block is (rank-1 reduction).
pub fn reduce(mask: &GrayImage, factor: u32) -> GrayImage {
    if factor <= 1 {
        return mask.clone();
    }

    let (width, height) = mask.dimensions();
    let mut reduced = GrayImage::new(width.div_ceil(factor), height.div_ceil(factor));

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] == FOREGROUND {
            reduced.put_pixel(x / factor, y / factor, Luma([FOREGROUND]));
        }
    }

    reduced
}

/// Minimal rectangle enclosing every foreground pixel of the mask
pub fn foreground_bounds(mask: &GrayImage) -> Option<Rectangle> {
    let (width, height) = mask.dimensions();
    let mut min_x = width;
    let mut max_x = 0;
    let mut min_y = height;
    let mut max_y = 0;

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] == FOREGROUND {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }

    if min_x <= max_x && min_y <= max_y {
        Some(Rectangle::new(
            min_x,
            min_y,
            max_x - min_x + 1,
            max_y - min_y + 1,
        ))
    } else {
        None
    }
}

fn mask_value(is_ink: bool) -> u8 {
    if is_ink {
        FOREGROUND
    } else {
        BACKGROUND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::WHITE;

    fn page_with_block() -> GrayImage {
        GrayImage::from_fn(40, 30, |x, y| {
            if (10..20).contains(&x) && (5..8).contains(&y) {
                Luma([30])
            } else {
                Luma([220])
            }
        })
    }

    #[test]
    fn test_auto_threshold_splits_classes() {
        let threshold = auto_threshold(&page_with_block());
        assert!(threshold > 30 && threshold <= 220);
    }

    #[test]
    fn test_auto_threshold_uniform_is_empty() {
        let blank = GrayImage::from_pixel(10, 10, Luma([WHITE]));
        assert_eq!(auto_threshold(&blank), 0);
        let mask = binarize(&Raster::Gray(blank), 0);
        assert!(foreground_bounds(&mask).is_none());
    }

    #[test]
    fn test_paper_texture_is_not_ink() {
        let textured =
            GrayImage::from_fn(200, 150, |x, y| Luma([250 + ((x * 7 + y * 13) % 6) as u8]));
        assert_eq!(auto_threshold(&textured), 0);
        let mask = binarize(&Raster::Gray(textured.clone()), 0);
        assert!(foreground_bounds(&mask).is_none());

        // Ink on the same paper is still found
        let mut inked = textured;
        for x in 40..60 {
            inked.put_pixel(x, 70, Luma([20]));
        }
        let mask = binarize(&Raster::Gray(inked), 0);
        assert_eq!(
            foreground_bounds(&mask),
            Some(Rectangle::new(40, 70, 20, 1))
        );
    }

    #[test]
    fn test_class_means() {
        let mut counts = [0u32; 256];
        counts[10] = 2;
        counts[30] = 2;
        counts[200] = 4;
        assert_eq!(class_means(&counts, 100), (Some(20.0), Some(200.0)));
        assert_eq!(class_means(&counts, 5), (None, Some(110.0)));
        assert_eq!(class_means(&counts, 255), (Some(110.0), None));
    }

    #[test]
    fn test_binarize_gray_with_override() {
        let mask = binarize(&Raster::Gray(page_with_block()), 100);
        assert_eq!(mask.get_pixel(12, 6)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(0, 0)[0], BACKGROUND);

        // Nothing is darker than 20
        let mask = binarize(&Raster::Gray(page_with_block()), 20);
        assert!(foreground_bounds(&mask).is_none());
    }

    #[test]
    fn test_binarize_binary_uses_black_pixels() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([WHITE]));
        img.put_pixel(2, 3, Luma([BLACK]));
        let mask = binarize(&Raster::Binary(img), 200);
        assert_eq!(
            foreground_bounds(&mask),
            Some(Rectangle::new(2, 3, 1, 1))
        );
    }

    #[test]
    fn test_reduce_keeps_isolated_pixels() {
        let mut mask = GrayImage::new(9, 9);
        mask.put_pixel(7, 5, Luma([FOREGROUND]));
        let reduced = reduce(&mask, 4);
        assert_eq!(reduced.dimensions(), (3, 3));
        assert_eq!(reduced.get_pixel(1, 1)[0], FOREGROUND);
        assert_eq!(
            reduced.pixels().filter(|p| p[0] == FOREGROUND).count(),
            1
        );
    }

    #[test]
    fn test_foreground_bounds() {
        let mask = binarize(&Raster::Gray(page_with_block()), 0);
        assert_eq!(
            foreground_bounds(&mask),
            Some(Rectangle::new(10, 5, 10, 3))
        );
    }
}
