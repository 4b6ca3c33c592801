//! Basic geometric types for page coordinates

use serde::{Deserialize, Serialize};

/// Axis-aligned box in page user space, `(x0, y0)` lower-left and
/// `(x1, y1)` upper-right. Serialized as `[x0, y0, x1, y1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    /// Create a box from its corners as given
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Create a box from any two opposite corners
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        Self {
            x0: a.0.min(b.0),
            y0: a.1.min(b.1),
            x1: a.0.max(b.0),
            y1: a.1.max(b.1),
        }
    }

    /// Finite coordinates with strictly positive width and height
    pub fn is_valid(&self) -> bool {
        [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|v| v.is_finite())
            && self.x0 < self.x1
            && self.y0 < self.y1
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Smallest box containing both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Grow degenerate extents to at least `min` in each direction
    pub fn with_min_extent(mut self, min: f64) -> BoundingBox {
        if self.x1 - self.x0 < min {
            self.x1 = self.x0 + min;
        }
        if self.y1 - self.y0 < min {
            self.y1 = self.y0 + min;
        }
        self
    }

    /// Length of the shared x-interval, zero when disjoint
    pub fn horizontal_overlap(&self, other: &BoundingBox) -> f64 {
        (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0)
    }

    /// Distance between the x-intervals, zero when they overlap
    pub fn horizontal_distance(&self, other: &BoundingBox) -> f64 {
        if self.horizontal_overlap(other) > 0.0 {
            0.0
        } else {
            (other.x0 - self.x1).max(self.x0 - other.x1).max(0.0)
        }
    }

    /// Vertical whitespace between `self` and a box below it. Negative
    /// when the boxes overlap vertically.
    pub fn gap_above(&self, below: &BoundingBox) -> f64 {
        self.y0 - below.y1
    }

    pub fn center_y(&self) -> f64 {
        (self.y0 + self.y1) / 2.0
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        BoundingBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        b.to_array()
    }
}
