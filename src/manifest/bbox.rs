//! Bounding boxes in the canonical left/top/right/bottom form.
//!
//! Documents declare boxes either as `ltwh` (left, top, width, height) or
//! `ltrb` (left, top, right, bottom). Ingestion converts everything to
//! [`BBox`], which always stores absolute pixel corners; export converts back.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ManifestError;

/// Box layout used by a source document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BBoxFormat {
    #[default]
    Ltwh,
    Ltrb,
}

impl BBoxFormat {
    pub fn name(&self) -> &'static str {
        match self {
            BBoxFormat::Ltwh => "ltwh",
            BBoxFormat::Ltrb => "ltrb",
        }
    }
}

impl fmt::Display for BBoxFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for BBoxFormat {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ltwh" => Ok(BBoxFormat::Ltwh),
            "ltrb" => Ok(BBoxFormat::Ltrb),
            other => Err(ManifestError::shape(
                "bbox_format",
                format!("'{}' (expected 'ltwh' or 'ltrb')", other),
            )),
        }
    }
}

/// An axis-aligned box in absolute pixel coordinates.
///
/// Corners are not required to be ordered; a reversed box is carried as-is so
/// that export reproduces the source numbers. Boxes read from integer
/// coordinates are written back as integers.
#[derive(Clone, Copy, Default)]
pub struct BBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    integral: bool,
}

impl PartialEq for BBox {
    fn eq(&self, other: &Self) -> bool {
        self.to_ltrb() == other.to_ltrb()
    }
}

impl BBox {
    /// Creates a box from explicit corners.
    #[inline]
    pub fn from_ltrb(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
            integral: false,
        }
    }

    /// Creates a box from its top-left corner and size.
    #[inline]
    pub fn from_ltwh(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self::from_ltrb(left, top, left + width, top + height)
    }

    /// Reads four numbers laid out in `format`.
    pub fn from_format(format: BBoxFormat, values: &[f64]) -> Result<Self, ManifestError> {
        let [a, b, c, d] = <[f64; 4]>::try_from(values).map_err(|_| {
            ManifestError::shape(
                "bbox",
                format!("expected 4 coordinates, got {}", values.len()),
            )
        })?;
        let bbox = match format {
            BBoxFormat::Ltwh => Self::from_ltwh(a, b, c, d),
            BBoxFormat::Ltrb => Self::from_ltrb(a, b, c, d),
        };
        if !bbox.is_finite() {
            return Err(ManifestError::shape("bbox", "coordinates must be finite"));
        }
        Ok(bbox)
    }

    /// Parses a JSON coordinate list laid out in `format`, remembering whether
    /// every coordinate was an integer.
    pub fn from_json(value: &Value, format: BBoxFormat) -> Result<Self, ManifestError> {
        let items = value
            .as_array()
            .ok_or_else(|| ManifestError::shape("bbox", "bbox must be a list of numbers"))?;
        let coords = items
            .iter()
            .map(|c| {
                c.as_f64()
                    .ok_or_else(|| ManifestError::shape("bbox", "bbox values must be numbers"))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        let integral = items.iter().all(|c| c.is_i64() || c.is_u64());
        Ok(Self::from_format(format, &coords)?.with_integral(integral))
    }

    /// Marks the box as read from integer coordinates.
    pub fn with_integral(mut self, integral: bool) -> Self {
        self.integral = integral;
        self
    }

    #[inline]
    pub fn is_integral(&self) -> bool {
        self.integral
    }

    /// Writes the box laid out in `format` as a JSON list.
    pub fn to_json(&self, format: BBoxFormat) -> Value {
        Value::Array(
            self.to_format(format)
                .iter()
                .map(|&c| json_number(c, self.integral))
                .collect(),
        )
    }

    /// Writes the box laid out in `format`.
    pub fn to_format(&self, format: BBoxFormat) -> [f64; 4] {
        match format {
            BBoxFormat::Ltwh => [self.left, self.top, self.width(), self.height()],
            BBoxFormat::Ltrb => self.to_ltrb(),
        }
    }

    #[inline]
    pub fn to_ltrb(&self) -> [f64; 4] {
        [self.left, self.top, self.right, self.bottom]
    }

    /// May be negative if the box is reversed.
    #[inline]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    /// May be negative if the box is reversed.
    #[inline]
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.left.is_finite()
            && self.top.is_finite()
            && self.right.is_finite()
            && self.bottom.is_finite()
    }

    /// Returns true if left <= right and top <= bottom.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.left <= self.right && self.top <= self.bottom
    }
}

/// Largest magnitude an `f64` carries without losing integer precision.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Writes `value` as a JSON integer when `integral` and the value has no
/// fractional part, otherwise as a float.
pub(crate) fn json_number(value: f64, integral: bool) -> Value {
    if integral && value.fract() == 0.0 && value.abs() <= MAX_EXACT_INTEGER {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

impl fmt::Debug for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BBox")
            .field("left", &self.left)
            .field("top", &self.top)
            .field("right", &self.right)
            .field("bottom", &self.bottom)
            .finish()
    }
}
