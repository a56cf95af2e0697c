use lanescope_protocol::{Point, Rect, RenderCommand, SharedStr, ThemeToken, UnitId};
use thiserror::Error;

use crate::model::{Lane, StateLabel, TraceModel};
use crate::viewport::ViewportController;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("unknown state {state:?} on unit {unit}")]
    UnknownState { unit: UnitId, state: String },
    #[error("unit {unit} references string {index} outside its batch table")]
    UnresolvedState { unit: UnitId, index: f64 },
    #[error("unit {unit} goes back in time: {end} after {start}")]
    UnorderedEvents { unit: UnitId, start: f64, end: f64 },
}

/// Work done by one pass, for tests and the status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub batches_visited: usize,
    pub lanes_visited: usize,
    pub spans_drawn: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineFrame {
    pub commands: Vec<RenderCommand>,
    pub stats: RenderStats,
}

/// Theme token for a state name, `None` for states outside the table.
pub fn state_token(state: &str) -> Option<ThemeToken> {
    match state {
        "running" => Some(ThemeToken::StateRunning),
        "runnable" | "unscheduled" => Some(ThemeToken::StateRunnable),
        "waiting" => Some(ThemeToken::StateWaiting),
        "notexist" => Some(ThemeToken::StateNotExist),
        "syscall" => Some(ThemeToken::StateSyscall),
        _ => None,
    }
}

/// Render the visible part of the timeline.
///
/// Only batches whose reach overlaps the visible time range and lanes inside
/// the visible lane range are touched, so the work is bounded by what is on
/// screen rather than by trace size. Any schema violation aborts the pass.
pub fn render_timeline(
    model: &TraceModel,
    lanes: &[Lane],
    controller: &ViewportController,
) -> Result<TimelineFrame, RenderError> {
    let (width, height) = controller.size();
    let Some(visible) = controller.visible_time_range() else {
        return Ok(TimelineFrame::default());
    };
    if !(height > 0.0) {
        return Ok(TimelineFrame::default());
    }

    let (scroll_x, scroll_y) = controller.scroll();
    let pitch = controller.lane_pitch();
    let fill = controller.lane_fill_height();
    let lane_range = controller.visible_lanes();
    let lane_range = lane_range.start.min(lanes.len())..lane_range.end.min(lanes.len());
    let to_x = |t: f64| controller.time_to_x(t).map(|x| x - scroll_x);

    let mut frame = TimelineFrame::default();
    frame.commands.push(RenderCommand::ClearRect {
        rect: Rect::new(0.0, 0.0, width, height),
    });

    // Batch starts are non-decreasing, so nothing past this index can overlap.
    let batches = model.batches();
    let candidates = batches.partition_point(|b| b.start <= visible.end);

    for batch in batches[..candidates]
        .iter()
        .filter(|b| b.reaches_into(&visible))
    {
        frame.stats.batches_visited += 1;
        for lane_index in lane_range.clone() {
            let y = lane_index as f64 * pitch - scroll_y;
            for &unit in &lanes[lane_index].units {
                if batch.track(unit).is_none() {
                    continue;
                }
                for span in model.unit_spans(batch.index, unit) {
                    if span.end < span.start {
                        return Err(RenderError::UnorderedEvents {
                            unit,
                            start: span.start,
                            end: span.end,
                        });
                    }
                    if !visible.overlaps(span.start, span.end) {
                        continue;
                    }
                    let color = resolve_color(unit, span.state)?;
                    let (Some(x0), Some(x1)) = (to_x(span.start), to_x(span.end)) else {
                        continue;
                    };
                    let x0 = x0.max(0.0);
                    let x1 = x1.min(width);
                    if x1 <= x0 {
                        continue;
                    }
                    frame.commands.push(RenderCommand::DrawRect {
                        rect: Rect::new(x0, y, x1 - x0, fill),
                        color,
                        unit_id: Some(unit),
                    });
                    frame.stats.spans_drawn += 1;
                }
            }
        }
    }
    frame.stats.lanes_visited = lane_range.len();

    for batch in &batches[..candidates] {
        if !visible.contains(batch.start) {
            continue;
        }
        if let Some(x) = to_x(batch.start) {
            frame.commands.push(RenderCommand::DrawLine {
                from: Point::new(x, 0.0),
                to: Point::new(x, height),
                color: ThemeToken::BatchBoundary,
                width: 1.0,
            });
        }
    }

    Ok(frame)
}

/// Lane names for the visible lane range, one label per lane row.
pub fn render_lane_labels(lanes: &[Lane], controller: &ViewportController) -> Vec<RenderCommand> {
    let (_, scroll_y) = controller.scroll();
    let pitch = controller.lane_pitch();
    let range = controller.visible_lanes();
    let range = range.start.min(lanes.len())..range.end.min(lanes.len());
    let font_size = (controller.lane_fill_height() * 0.9).max(1.0);
    range
        .map(|i| RenderCommand::DrawText {
            position: Point::new(2.0, i as f64 * pitch - scroll_y),
            text: SharedStr::clone(&lanes[i].name),
            color: ThemeToken::TextMuted,
            font_size,
        })
        .collect()
}

fn resolve_color(unit: UnitId, state: &StateLabel) -> Result<ThemeToken, RenderError> {
    match state {
        StateLabel::Named(name) => state_token(name).ok_or_else(|| RenderError::UnknownState {
            unit,
            state: name.to_string(),
        }),
        StateLabel::Unresolved(index) => Err(RenderError::UnresolvedState {
            unit,
            index: *index,
        }),
    }
}
