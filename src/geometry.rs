use nalgebra::{Matrix3, Vector3};

/// Axis-aligned rectangle in the pixel space of the raster it was computed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rectangle {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width` x `height` raster
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the rectangle is non-empty and lies entirely inside a raster
    /// of the given dimensions
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        !self.is_empty() && self.right() <= width as u64 && self.bottom() <= height as u64
    }

    /// Build a rectangle from signed edges (right/bottom exclusive), clamped to
    /// `[0, width] x [0, height]`. Returns `None` if clamping leaves no area.
    pub fn clamped(
        left: i64,
        top: i64,
        right: i64,
        bottom: i64,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        let left = left.clamp(0, width as i64);
        let right = right.clamp(0, width as i64);
        let top = top.clamp(0, height as i64);
        let bottom = bottom.clamp(0, height as i64);

        if right <= left || bottom <= top {
            return None;
        }

        Some(Self::new(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}

/// Centre of a raster in pixel-index coordinates
pub fn image_center(width: u32, height: u32) -> (f64, f64) {
    (
        (width as f64 - 1.0) / 2.0,
        (height as f64 - 1.0) / 2.0,
    )
}

/// Affine matrix rotating points by `degrees` about `center`.
///
/// Image coordinates have y pointing down, so a positive angle turns content
/// clockwise on screen.
pub fn rotation_about(center: (f64, f64), degrees: f64) -> Matrix3<f64> {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (cx, cy) = center;

    let translate_to_origin = Matrix3::new(
        1.0, 0.0, -cx,
        0.0, 1.0, -cy,
        0.0, 0.0, 1.0,
    );

    let rotate = Matrix3::new(
        cos, -sin, 0.0,
        sin, cos, 0.0,
        0.0, 0.0, 1.0,
    );

    let translate_back = Matrix3::new(
        1.0, 0.0, cx,
        0.0, 1.0, cy,
        0.0, 0.0, 1.0,
    );

    translate_back * rotate * translate_to_origin
}

/// Transform a point using the affine matrix
pub fn transform_point(matrix: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let result = matrix * Vector3::new(x, y, 1.0);
    (result.x / result.z, result.y / result.z)
}
