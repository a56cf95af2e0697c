use serde::{Deserialize, Serialize};

/// A closed interval of trace time in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn span(&self) -> f64 {
        self.end - self.start
    }

    /// Zero, negative, or non-finite width. Every projection through a
    /// degenerate range must bail out instead of dividing by its span.
    pub fn is_degenerate(&self) -> bool {
        let span = self.span();
        !(span.is_finite() && span > 0.0)
    }

    /// Inclusive overlap test against `[start, end]`.
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        start <= self.end && end >= self.start
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }

    pub fn center(&self) -> f64 {
        self.start + self.span() / 2.0
    }
}
