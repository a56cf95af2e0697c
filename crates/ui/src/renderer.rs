use egui::{Align2, CornerRadius, FontId, Pos2, Rect, Stroke};
use lanescope_protocol::{RenderCommand, ThemeToken};

use crate::theme::{self, ThemeMode};

/// A painted span that can be hovered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitRegion {
    pub rect: Rect,
    pub unit_id: u64,
}

fn to_rect(r: &lanescope_protocol::Rect, offset: Pos2) -> Rect {
    Rect::from_min_size(
        Pos2::new(r.x as f32 + offset.x, r.y as f32 + offset.y),
        egui::vec2(r.w as f32, r.h as f32),
    )
}

fn to_pos(p: &lanescope_protocol::Point, offset: Pos2) -> Pos2 {
    Pos2::new(p.x as f32 + offset.x, p.y as f32 + offset.y)
}

/// Replay `commands` onto `painter`, with `offset` as the surface origin.
///
/// Returns one hit region per drawn span that carries a unit id.
pub fn render_commands(
    painter: &egui::Painter,
    commands: &[RenderCommand],
    offset: Pos2,
    mode: ThemeMode,
) -> Vec<HitRegion> {
    let mut hits = Vec::new();

    for cmd in commands {
        match cmd {
            RenderCommand::ClearRect { rect } => {
                painter.rect_filled(
                    to_rect(rect, offset),
                    CornerRadius::ZERO,
                    theme::resolve(ThemeToken::Background, mode),
                );
            }

            RenderCommand::DrawRect {
                rect,
                color,
                unit_id,
                ..
            } => {
                let r = to_rect(rect, offset);
                // Sub-pixel spans still get a sliver so dense regions stay visible.
                let r = if r.width() < 1.0 {
                    Rect::from_min_size(r.min, egui::vec2(1.0, r.height()))
                } else {
                    r
                };
                if !painter.clip_rect().intersects(r) {
                    continue;
                }
                painter.rect_filled(r, CornerRadius::ZERO, theme::resolve(*color, mode));
                if let Some(id) = unit_id {
                    hits.push(HitRegion { rect: r, unit_id: *id });
                }
            }

            RenderCommand::DrawText {
                position,
                text,
                color,
                font_size,
            } => {
                let size = *font_size as f32;
                if size < 1.0 {
                    continue;
                }
                painter.text(
                    to_pos(position, offset),
                    Align2::LEFT_TOP,
                    text.as_str(),
                    FontId::proportional(size),
                    theme::resolve(*color, mode),
                );
            }

            RenderCommand::DrawLine {
                from,
                to,
                color,
                width,
            } => {
                painter.line_segment(
                    [to_pos(from, offset), to_pos(to, offset)],
                    Stroke::new(*width as f32, theme::resolve(*color, mode)),
                );
            }
        }
    }

    hits
}

/// The unit under `pos`, topmost first.
pub fn hit_test(hits: &[HitRegion], pos: Pos2) -> Option<u64> {
    hits.iter()
        .rev()
        .find(|h| h.rect.contains(pos))
        .map(|h| h.unit_id)
}
