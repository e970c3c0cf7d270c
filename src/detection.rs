use image::GrayImage;
use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::binarize::{binarize, reduce, FOREGROUND};
use crate::error::{DeskewError, Result};
use crate::geometry::image_center;
use crate::raster::Raster;
use crate::transform::rotate;

/// Default full width of the angle sweep, in degrees
pub const DEFAULT_SWEEP_RANGE: f32 = 10.0;
/// Default sweep resolution, in tenths of a degree
pub const DEFAULT_SWEEP_DELTA: f32 = 1.0;
pub const DEFAULT_SWEEP_REDUCTION: u32 = 4;
pub const DEFAULT_REFINE_REDUCTION: u32 = 1;

/// Corrections smaller than this many degrees are not worth resampling for
pub const MIN_ROTATION_DEGREES: f32 = 0.1;

/// Finest step the refinement sweep will take, in degrees
const MIN_REFINE_STEP: f64 = 0.01;
/// Widest sweep accepted, in degrees; row projections stop meaning anything
/// past a quarter turn
pub const MAX_SWEEP_RANGE: f32 = 90.0;
/// Upper bound on the number of angles a coarse sweep may evaluate
pub const MAX_SWEEP_CANDIDATES: f64 = 10_000.0;

/// Parameters of the sweep-and-refine skew search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewConfig {
    /// Full width of the sweep, centred on 0, in degrees
    pub sweep_range: f32,
    /// Sweep step in tenths of a degree
    pub sweep_delta: f32,
    /// Downsampling applied before the coarse sweep
    pub sweep_reduction: u32,
    /// Downsampling applied before refinement; at most `sweep_reduction`
    pub refine_reduction: u32,
    /// Binarisation threshold, 0 selects one automatically
    pub threshold: u8,
}

impl Default for SkewConfig {
    fn default() -> Self {
        Self {
            sweep_range: DEFAULT_SWEEP_RANGE,
            sweep_delta: DEFAULT_SWEEP_DELTA,
            sweep_reduction: DEFAULT_SWEEP_REDUCTION,
            refine_reduction: DEFAULT_REFINE_REDUCTION,
            threshold: 0,
        }
    }
}

impl SkewConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.sweep_range.is_finite()
            || self.sweep_range <= 0.0
            || self.sweep_range > MAX_SWEEP_RANGE
        {
            return Err(DeskewError::InvalidInput(format!(
                "sweep range must be in (0, {MAX_SWEEP_RANGE}] degrees, got {}",
                self.sweep_range
            )));
        }
        if !self.sweep_delta.is_finite()
            || self.sweep_delta <= 0.0
            || self.sweep_delta > self.sweep_range * 10.0
        {
            return Err(DeskewError::InvalidInput(format!(
                "sweep delta must be in (0, {}] tenths of a degree, got {}",
                self.sweep_range * 10.0,
                self.sweep_delta
            )));
        }
        let candidates = self.sweep_range as f64 * 10.0 / self.sweep_delta as f64;
        if candidates > MAX_SWEEP_CANDIDATES {
            return Err(DeskewError::InvalidInput(format!(
                "sweep delta {} needs {candidates:.0} angles, limit {MAX_SWEEP_CANDIDATES}",
                self.sweep_delta
            )));
        }
        if self.sweep_reduction == 0 || self.refine_reduction == 0 {
            return Err(DeskewError::InvalidInput(
                "reduction factors must be at least 1".to_string(),
            ));
        }
        if self.refine_reduction > self.sweep_reduction {
            return Err(DeskewError::InvalidInput(format!(
                "refine reduction {} exceeds sweep reduction {}",
                self.refine_reduction, self.sweep_reduction
            )));
        }
        Ok(())
    }

    /// Coarse sweep step in degrees
    fn sweep_step(&self) -> f64 {
        self.sweep_delta as f64 / 10.0
    }
}

/// Outcome of skew estimation
#[derive(Debug, Clone, PartialEq)]
pub struct SkewResult {
    /// Detected skew in degrees, positive when the content is turned clockwise
    pub angle: f32,
    /// Peak sharpness of the sweep; only comparable under the same `SkewConfig`
    pub confidence: f32,
    /// Corrected raster, present only when requested
    pub rotated: Option<Raster>,
}

impl SkewResult {
    /// Caller-level acceptance policy: a minimum of 0 or less accepts anything
    pub fn meets(&self, min_confidence: f64) -> bool {
        min_confidence <= 0.0 || self.confidence as f64 >= min_confidence
    }

    /// Rotate `raster` so that the detected skew is removed
    pub fn correct(&self, raster: &Raster) -> Result<Raster> {
        correct(raster, self.angle)
    }
}

/// A scored candidate angle
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    angle: f64,
    score: f64,
}

/// Foreground pixel offsets from the mask centre
struct Foreground {
    points: Vec<(f64, f64)>,
    width: u32,
    height: u32,
    /// Horizontal extent of the foreground in pixels
    span: u32,
}

impl Foreground {
    fn from_mask(mask: &GrayImage) -> Self {
        let (width, height) = mask.dimensions();
        let (cx, cy) = image_center(width, height);
        let points = mask
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == FOREGROUND)
            .map(|(x, y, _)| (x as f64 - cx, y as f64 - cy))
            .collect::<Vec<_>>();

        let (left, right) = points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(dx, _)| {
                (lo.min(dx), hi.max(dx))
            });
        let span = if points.is_empty() {
            0
        } else {
            (right - left) as u32 + 1
        };

        Self {
            points,
            width,
            height,
            span,
        }
    }

    /// Smallest angle, in degrees, that moves one end of the foreground two
    /// pixels against the other. Sweeps finer than this cannot tell angles
    /// apart at this resolution.
    fn resolution(&self) -> f64 {
        (2.0 / self.span.max(1) as f64).atan().to_degrees()
    }

    /// Sum of squared differences between adjacent rows of the row histogram
    /// of the foreground rotated back by `degrees`. Text lines brought level
    /// turn into sharp steps in the histogram.
    fn projection_score(&self, degrees: f64) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }

        let (sin, cos) = degrees.to_radians().sin_cos();
        let cy = (self.height as f64 - 1.0) / 2.0;
        let margin = (self.width as f64 / 2.0 * sin.abs()).ceil() + 1.0;
        let mut counts = vec![0u32; self.height as usize + 2 * margin as usize + 1];

        for &(dx, dy) in &self.points {
            let row = dy * cos - dx * sin + cy + margin;
            counts[row.round() as usize] += 1;
        }

        counts
            .windows(2)
            .map(|pair| {
                let diff = pair[1] as f64 - pair[0] as f64;
                diff * diff
            })
            .sum()
    }

    /// Score every angle, fanning out across threads. Results keep the input
    /// order so the reduction stays deterministic.
    fn sweep(&self, angles: &[f64]) -> Vec<Candidate> {
        angles
            .par_iter()
            .map(|&angle| Candidate {
                angle,
                score: self.projection_score(angle),
            })
            .collect()
    }
}

/// Pick the best candidate: highest score, then smallest absolute angle, then
/// the earliest evaluated.
fn best_candidate(candidates: &[Candidate]) -> Option<(usize, Candidate)> {
    let mut best: Option<(usize, Candidate)> = None;
    for (index, &candidate) in candidates.iter().enumerate() {
        if !candidate.score.is_finite() {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, current)) => {
                candidate.score > current.score
                    || (candidate.score == current.score
                        && candidate.angle.abs() < current.angle.abs())
            }
        };
        if better {
            best = Some((index, candidate));
        }
    }
    best
}

/// Evenly spaced angles `start, start + step, ...` up to `end` inclusive
fn angle_range(start: f64, end: f64, step: f64) -> Vec<f64> {
    let count = ((end - start) / step + 1e-9).floor() as usize;
    (0..=count).map(|i| start + i as f64 * step).collect()
}

/// Angles `center + i * step` reaching `half_window` either side of `center`,
/// restricted to `[lo, hi]`. `center` itself is always included.
fn refine_angles(center: f64, half_window: f64, step: f64, lo: f64, hi: f64) -> Vec<f64> {
    let count = (half_window / step + 1e-9).floor() as i64;
    (-count..=count)
        .map(|i| center + i as f64 * step)
        .filter(|&angle| angle == center || (angle >= lo - 1e-9 && angle <= hi + 1e-9))
        .collect()
}

/// Estimate the skew of `raster` and optionally produce the corrected raster.
///
/// The foreground is swept coarsely over `±sweep_range / 2` at
/// `sweep_reduction`, then refined around the peak at `refine_reduction`
/// over at least two coarse steps, or wider when the reduced foreground is
/// too narrow to place the coarse peak that precisely. Confidence is the best
/// coarse score over the worst one, and 0 when the peak sits on either end of
/// the sweep.
#[instrument(
    skip_all,
    fields(width = raster.width(), height = raster.height(), depth = ?raster.depth())
)]
pub fn estimate_skew(raster: &Raster, config: &SkewConfig, rotate: bool) -> Result<SkewResult> {
    if raster.is_empty() {
        return Err(DeskewError::InvalidInput("raster is empty".to_string()));
    }
    config.validate()?;

    let mask = binarize(raster, config.threshold);

    // Coarse sweep
    let coarse = Foreground::from_mask(&reduce(&mask, config.sweep_reduction));
    if coarse.points.is_empty() {
        return Err(DeskewError::SkewDetectionFailed(
            "raster has no foreground content".to_string(),
        ));
    }

    let step = config.sweep_step();
    let half_range = config.sweep_range as f64 / 2.0;
    let sweep = coarse.sweep(&angle_range(-half_range, half_range, step));

    let (peak_index, peak) = best_candidate(&sweep)
        .filter(|(_, c)| c.score > 0.0)
        .ok_or_else(|| {
            DeskewError::SkewDetectionFailed("no usable projection peak".to_string())
        })?;

    let min_score = sweep
        .iter()
        .map(|c| c.score)
        .fold(f64::INFINITY, f64::min);
    let at_edge = peak_index == 0 || peak_index + 1 == sweep.len();
    let confidence = if at_edge || min_score <= 0.0 {
        0.0
    } else {
        peak.score / min_score
    };

    debug!(
        candidates = sweep.len(),
        points = coarse.points.len(),
        angle = peak.angle,
        score = peak.score,
        confidence,
        "coarse sweep"
    );

    // Refinement around the coarse peak
    let fine = Foreground::from_mask(&reduce(&mask, config.refine_reduction));
    let fine_step = (step / 10.0).max(MIN_REFINE_STEP);
    let half_window = (2.0 * step).max(coarse.resolution());
    let refined = fine.sweep(&refine_angles(
        peak.angle,
        half_window,
        fine_step,
        -half_range,
        half_range,
    ));
    let angle = best_candidate(&refined)
        .map(|(_, c)| c.angle)
        .unwrap_or(peak.angle);

    debug!(
        candidates = refined.len(),
        points = fine.points.len(),
        half_window,
        angle,
        "refined sweep"
    );

    let mut result = SkewResult {
        angle: angle as f32,
        confidence: confidence as f32,
        rotated: None,
    };
    if rotate {
        result.rotated = Some(result.correct(raster)?);
    }

    Ok(result)
}

/// Undo a clockwise skew of `angle` degrees. Corrections below
/// `MIN_ROTATION_DEGREES` return an unmodified copy.
pub fn correct(raster: &Raster, angle: f32) -> Result<Raster> {
    if angle.abs() < MIN_ROTATION_DEGREES {
        return Ok(raster.clone());
    }
    rotate(raster, -(angle as f64))
}
