use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::{debug, instrument};

use crate::binarize::{binarize, foreground_bounds, BACKGROUND, FOREGROUND};
use crate::error::{DeskewError, Result};
use crate::geometry::Rectangle;
use crate::raster::Raster;

/// Width over height of an A4 sheet
pub const A4_ASPECT: f64 = 210.0 / 297.0;
/// Width over height of a US Letter sheet
pub const LETTER_ASPECT: f64 = 8.5 / 11.0;

/// Side noise fits within 1/N of the frame in each direction
const SIDE_NOISE_DIVISOR: u32 = 20;
const AGGRESSIVE_SIDE_NOISE_DIVISOR: u32 = 8;
/// Ink closer than 2/N of the frame's short side belongs to the same blob
const ISOLATION_DIVISOR: u32 = 50;
/// Speckles are smaller than (short side / N)^2 pixels
const SPECKLE_DIVISOR: u32 = 200;
const MIN_SPECKLE_AREA: u32 = 4;

/// How much border noise to suppress before measuring content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeClean {
    #[default]
    None,
    /// Drop small isolated blobs touching the edges (scanner specks)
    SideNoise,
    /// Opening, wide side-noise removal and speckle removal together
    MaxAggressive,
}

/// Parameters for crop planning; all distances are in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CropConfig {
    /// Columns treated as background on the left and right
    pub margin_clear_lr: u32,
    /// Rows treated as background at the top and bottom
    pub margin_clear_tb: u32,
    pub edge_clean: EdgeClean,
    /// Padding added back on the left and right of the content
    pub padding_lr: u32,
    /// Padding added back above and below the content
    pub padding_tb: u32,
    /// Largest fraction of the content width the crop may grow by to reach a
    /// standard page aspect
    pub max_widen: f32,
}

impl CropConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.max_widen.is_finite() || self.max_widen < 0.0 {
            return Err(DeskewError::InvalidInput(format!(
                "max widen must be a non-negative fraction, got {}",
                self.max_widen
            )));
        }
        Ok(())
    }
}

/// Bounding box and size of one connected component
#[derive(Debug, Clone, Copy)]
struct Component {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixel_count: u32,
}

impl Component {
    fn new(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            pixel_count: 1,
        }
    }

    fn expand(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.pixel_count += 1;
    }

    fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

type Labels = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Label the 8-connected components of `groups` and measure each one over
/// the `ink` pixels it covers. Slot `i` of the returned list describes label
/// `i + 1`.
fn label_components(groups: &GrayImage, ink: &GrayImage) -> (Labels, Vec<Option<Component>>) {
    let labels = connected_components(groups, Connectivity::Eight, Luma([BACKGROUND]));
    let mut components: Vec<Option<Component>> = Vec::new();

    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 || ink.get_pixel(x, y)[0] != FOREGROUND {
            continue;
        }
        if components.len() < label {
            components.resize(label, None);
        }
        match &mut components[label - 1] {
            Some(component) => component.expand(x, y),
            slot => *slot = Some(Component::new(x, y)),
        }
    }

    (labels, components)
}

/// Clear every pixel whose component is flagged in `remove`
fn erase(mask: &mut GrayImage, labels: &Labels, remove: &[bool]) {
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label > 0 && remove.get(label - 1) == Some(&true) {
            mask.put_pixel(x, y, Luma([BACKGROUND]));
        }
    }
}

/// Blank out the cleared margins and return the frame that is left
fn clear_margins(mask: &mut GrayImage, lr: u32, tb: u32) -> Option<Rectangle> {
    let (width, height) = mask.dimensions();
    for (x, y, pixel) in mask.enumerate_pixels_mut() {
        if x < lr || x >= width.saturating_sub(lr) || y < tb || y >= height.saturating_sub(tb) {
            *pixel = Luma([BACKGROUND]);
        }
    }

    Rectangle::clamped(
        lr as i64,
        tb as i64,
        width as i64 - lr as i64,
        height as i64 - tb as i64,
        width,
        height,
    )
}

/// Remove small isolated blobs touching the frame. Ink within twice the
/// isolation radius of other ink counts as one blob, so words and lines that
/// reach the frame stay attached to the text they belong to. A blob is noise
/// when it fits inside 1/`divisor` of the frame in both directions. Returns
/// how many went.
fn remove_side_noise(mask: &mut GrayImage, frame: &Rectangle, divisor: u32) -> usize {
    let radius = (frame.width.min(frame.height) / ISOLATION_DIVISOR).clamp(1, u8::MAX as u32);
    let groups = morphology::dilate(mask, Norm::LInf, radius as u8);
    let (labels, components) = label_components(&groups, mask);
    let max_width = frame.width / divisor;
    let max_height = frame.height / divisor;

    let remove: Vec<bool> = components
        .iter()
        .map(|component| {
            component.is_some_and(|c| {
                let touches = c.min_x == frame.x
                    || c.min_y == frame.y
                    || c.max_x as u64 + 1 == frame.right()
                    || c.max_y as u64 + 1 == frame.bottom();
                touches && c.width() <= max_width && c.height() <= max_height
            })
        })
        .collect();

    erase(mask, &labels, &remove);
    remove.iter().filter(|&&r| r).count()
}

/// Remove every component smaller than `min_area` pixels
fn remove_speckles(mask: &mut GrayImage, min_area: u32) -> usize {
    let (labels, components) = label_components(mask, mask);
    let remove: Vec<bool> = components
        .iter()
        .map(|component| component.is_some_and(|c| c.pixel_count < min_area))
        .collect();

    erase(mask, &labels, &remove);
    remove.iter().filter(|&&r| r).count()
}

/// Extra width to give the content so it approaches the narrowest standard
/// page aspect that is wider than it, capped at `max_widen * width`
fn widen_amount(content: &Rectangle, max_widen: f32) -> i64 {
    if max_widen <= 0.0 {
        return 0;
    }

    let width = content.width as f64;
    let height = content.height as f64;
    let aspect = width / height;

    [A4_ASPECT, LETTER_ASPECT]
        .into_iter()
        .find(|&target| target > aspect)
        .map(|target| {
            let needed = target * height - width;
            needed.min(max_widen as f64 * width).round() as i64
        })
        .unwrap_or(0)
}

/// Compute the crop rectangle for `raster`.
///
/// Content is measured on a binarised scratch copy with the configured
/// margins cleared and edge noise removed; the result is widened, padded and
/// clamped to the raster in its original pixel space.
#[instrument(skip_all, fields(width = raster.width(), height = raster.height()))]
pub fn plan_crop(raster: &Raster, config: &CropConfig) -> Result<Rectangle> {
    if raster.is_empty() {
        return Err(DeskewError::InvalidInput("raster is empty".to_string()));
    }
    config.validate()?;

    let (width, height) = raster.dimensions();
    let mut mask = binarize(raster, 0);

    let frame = clear_margins(&mut mask, config.margin_clear_lr, config.margin_clear_tb)
        .ok_or_else(|| {
            DeskewError::InvalidCropRegion(format!(
                "margins {}x{} leave nothing of a {}x{} raster",
                config.margin_clear_lr, config.margin_clear_tb, width, height
            ))
        })?;

    match config.edge_clean {
        EdgeClean::None => {}
        EdgeClean::SideNoise => {
            let removed = remove_side_noise(&mut mask, &frame, SIDE_NOISE_DIVISOR);
            debug!(removed, "side noise removed");
        }
        EdgeClean::MaxAggressive => {
            mask = morphology::open(&mask, Norm::LInf, 1);
            let removed = remove_side_noise(&mut mask, &frame, AGGRESSIVE_SIDE_NOISE_DIVISOR);
            let side = frame.width.min(frame.height) / SPECKLE_DIVISOR;
            let speckles = remove_speckles(&mut mask, (side * side).max(MIN_SPECKLE_AREA));
            debug!(removed, speckles, "aggressive edge cleaning");
        }
    }

    let content = foreground_bounds(&mask).ok_or_else(|| {
        DeskewError::InvalidCropRegion("no foreground content left after cleaning".to_string())
    })?;

    let extra = widen_amount(&content, config.max_widen);
    let pad_lr = config.padding_lr as i64;
    let pad_tb = config.padding_tb as i64;

    let left = content.x as i64 - extra / 2 - pad_lr;
    let right = content.right() as i64 + (extra - extra / 2) + pad_lr;
    let top = content.y as i64 - pad_tb;
    let bottom = content.bottom() as i64 + pad_tb;

    let rect = Rectangle::clamped(left, top, right, bottom, width, height).ok_or_else(|| {
        DeskewError::InvalidCropRegion(format!(
            "[{left}, {top}]-[{right}, {bottom}] collapses inside a {width}x{height} raster"
        ))
    })?;

    debug!(?content, widened_by = extra, ?rect, "crop planned");

    Ok(rect)
}

/// Plan the crop and extract it from the same full-fidelity raster
pub fn crop_image(raster: &Raster, config: &CropConfig) -> Result<(Raster, Rectangle)> {
    let rect = plan_crop(raster, config)?;
    let cropped = raster.extract(&rect)?;
    Ok((cropped, rect))
}
