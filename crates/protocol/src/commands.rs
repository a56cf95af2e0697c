use serde::{Deserialize, Serialize};

use crate::shared_str::SharedStr;
use crate::theme::ThemeToken;
use crate::types::{Point, Rect};

/// A single, stateless draw instruction in local surface pixels.
///
/// Views emit a `Vec<RenderCommand>` per pass and front ends replay it onto
/// whatever surface they own (egui painter, terminal buffer, SVG).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RenderCommand {
    /// Reset a region of the surface to the background.
    ClearRect { rect: Rect },

    /// Draw a filled rectangle. `unit_id` identifies the execution unit the
    /// rectangle belongs to, for hover/hit-testing.
    DrawRect {
        rect: Rect,
        color: ThemeToken,
        unit_id: Option<u64>,
    },

    /// Draw a left-aligned text string with its top-left corner at `position`.
    DrawText {
        position: Point,
        text: SharedStr,
        color: ThemeToken,
        font_size: f64,
    },

    /// Draw a stroked line segment.
    DrawLine {
        from: Point,
        to: Point,
        color: ThemeToken,
        width: f64,
    },
}

impl RenderCommand {
    pub fn is_rect(&self) -> bool {
        matches!(self, Self::DrawRect { .. })
    }

    pub fn is_line(&self) -> bool {
        matches!(self, Self::DrawLine { .. })
    }

    /// The same command shifted by `(dx, dy)`, for stacking views that were
    /// rendered in their own local coordinates.
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        let shift_rect = |r: &Rect| Rect::new(r.x + dx, r.y + dy, r.w, r.h);
        let shift_point = |p: &Point| Point::new(p.x + dx, p.y + dy);
        match self {
            Self::ClearRect { rect } => Self::ClearRect {
                rect: shift_rect(rect),
            },
            Self::DrawRect {
                rect,
                color,
                unit_id,
            } => Self::DrawRect {
                rect: shift_rect(rect),
                color: *color,
                unit_id: *unit_id,
            },
            Self::DrawText {
                position,
                text,
                color,
                font_size,
            } => Self::DrawText {
                position: shift_point(position),
                text: text.clone(),
                color: *color,
                font_size: *font_size,
            },
            Self::DrawLine {
                from,
                to,
                color,
                width,
            } => Self::DrawLine {
                from: shift_point(from),
                to: shift_point(to),
                color: *color,
                width: *width,
            },
        }
    }
}
