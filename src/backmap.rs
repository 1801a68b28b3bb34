//! Projection of per-object feature values onto a label mask.
//!
//! ```text
//!   LabelMask            FeatureVector            RecoloredRaster<u8>
//!   0 1 1                [10, 20]                 ·   0   0
//!   2 2 0      ──────▶   min→low, max→high  ───▶  255 255 ·
//! ```
//!
//! The i-th value of the feature vector belongs to the i-th smallest nonzero
//! id of the mask. Background (`0`) is never given a value; it is reported in
//! a separate mask so a renderer can keep it transparent.

use std::fmt;

use crate::data::mask::LabelMask;

// ---------------------------------------------------------------------------
// Display pixel types
// ---------------------------------------------------------------------------

/// Unsigned integer types a raster can be rendered into.
pub trait DisplayPixel: Copy + PartialOrd + Default + fmt::Debug + Into<f64> {
    const MAX: Self;

    /// Round to the nearest representable value, saturating at the bounds.
    fn from_f64(v: f64) -> Self;
}

impl DisplayPixel for u8 {
    const MAX: Self = u8::MAX;

    fn from_f64(v: f64) -> Self {
        v.round().clamp(0.0, f64::from(u8::MAX)) as u8
    }
}

impl DisplayPixel for u16 {
    const MAX: Self = u16::MAX;

    fn from_f64(v: f64) -> Self {
        v.round().clamp(0.0, f64::from(u16::MAX)) as u16
    }
}

/// Inclusive display range `low..=high`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputRange<T> {
    low: T,
    high: T,
}

impl<T: DisplayPixel> OutputRange<T> {
    pub fn new(low: T, high: T) -> Result<Self, BackmapError> {
        if low > high {
            return Err(BackmapError::InvalidRange {
                low: low.into(),
                high: high.into(),
            });
        }
        Ok(Self { low, high })
    }

    /// `0..=T::MAX`.
    pub fn full() -> Self {
        Self {
            low: T::default(),
            high: T::MAX,
        }
    }

    pub fn low(&self) -> T {
        self.low
    }

    pub fn high(&self) -> T {
        self.high
    }

    /// Value every object gets when all features are equal.
    pub fn midpoint(&self) -> T {
        let (lo, hi): (f64, f64) = (self.low.into(), self.high.into());
        T::from_f64(lo + (hi - lo) / 2.0)
    }
}

impl Default for OutputRange<u8> {
    fn default() -> Self {
        Self::full()
    }
}

// ---------------------------------------------------------------------------
// Errors and outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackmapError {
    #[error("{features} feature values for {objects} objects in the mask")]
    ShapeMismatch { features: usize, objects: usize },
    #[error("feature value at position {index} is not finite ({value})")]
    NonFiniteFeature { index: usize, value: f64 },
    #[error("output range {low}..={high} is inverted")]
    InvalidRange { low: f64, high: f64 },
}

/// Recoverable situations the backmap resolved on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Condition {
    #[default]
    Normal,
    /// The mask has no objects; the raster is background only.
    EmptyMask,
    /// All feature values were equal; every object got the range midpoint.
    DegenerateRange,
}

/// A mask-shaped raster of rescaled feature values.
///
/// Positions flagged in [`background`](Self::background) carry filler in
/// [`values`](Self::values) and must be rendered as transparent.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoloredRaster<T> {
    width: usize,
    height: usize,
    values: Vec<T>,
    background: Vec<bool>,
    object_values: Vec<(u32, T)>,
    range: OutputRange<T>,
    condition: Condition,
}

impl<T: DisplayPixel> RecoloredRaster<T> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major values; meaningless where `background` is set.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Row-major background flags.
    pub fn background(&self) -> &[bool] {
        &self.background
    }

    /// Rescaled value of a pixel, `None` for background or out of bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = y * self.width + x;
        (!self.background[i]).then(|| self.values[i])
    }

    pub fn is_background(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.background[y * self.width + x]
    }

    /// `(object id, rescaled value)` in ascending id order.
    pub fn object_values(&self) -> &[(u32, T)] {
        &self.object_values
    }

    /// Range the values were rescaled into.
    pub fn range(&self) -> OutputRange<T> {
        self.range
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }
}

// ---------------------------------------------------------------------------
// backmap
// ---------------------------------------------------------------------------

/// Backmap `features` onto `mask` within `range`.
pub fn backmap<T: DisplayPixel>(
    mask: &LabelMask,
    features: &[f64],
    range: OutputRange<T>,
) -> Result<RecoloredRaster<T>, BackmapError> {
    let ids = mask.object_ids();
    if features.len() != ids.len() {
        return Err(BackmapError::ShapeMismatch {
            features: features.len(),
            objects: ids.len(),
        });
    }
    if let Some((index, &value)) = features.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(BackmapError::NonFiniteFeature { index, value });
    }

    let (rescaled, mut condition) = rescale(features, range);
    if ids.is_empty() {
        log::debug!("Mask has no objects, returning background-only raster");
        condition = Condition::EmptyMask;
    } else if condition == Condition::DegenerateRange {
        log::debug!(
            "All {} feature values are equal, mapping to midpoint {:?}",
            features.len(),
            range.midpoint()
        );
    }

    let labels = mask.labels();
    let mut values = vec![T::default(); labels.len()];
    let mut background = vec![true; labels.len()];
    for (i, &label) in labels.iter().enumerate() {
        if label == 0 {
            continue;
        }
        // `ids` holds every nonzero label, so the search always hits.
        if let Ok(k) = ids.binary_search(&label) {
            values[i] = rescaled[k];
            background[i] = false;
        }
    }

    Ok(RecoloredRaster {
        width: mask.width(),
        height: mask.height(),
        values,
        background,
        object_values: ids.into_iter().zip(rescaled).collect(),
        range,
        condition,
    })
}

/// [`backmap`] into the 8-bit `0..=255` range.
pub fn backmap_u8(mask: &LabelMask, features: &[f64]) -> Result<RecoloredRaster<u8>, BackmapError> {
    backmap(mask, features, OutputRange::default())
}

/// Min-max rescale into `range`; equal values collapse to the midpoint.
fn rescale<T: DisplayPixel>(features: &[f64], range: OutputRange<T>) -> (Vec<T>, Condition) {
    if features.is_empty() {
        return (Vec::new(), Condition::Normal);
    }
    let min = features.iter().copied().fold(f64::INFINITY, f64::min);
    let max = features.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == min {
        return (vec![range.midpoint(); features.len()], Condition::DegenerateRange);
    }

    let (lo, hi): (f64, f64) = (range.low.into(), range.high.into());
    // Finite values far apart can overflow `max - min`; halve them first.
    let f = if (max - min).is_finite() { 1.0 } else { 0.5 };
    let span = max * f - min * f;
    let values = features
        .iter()
        .map(|&v| T::from_f64(lo + (v * f - min * f) / span * (hi - lo)))
        .collect();
    (values, Condition::Normal)
}
