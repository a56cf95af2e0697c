use lanescope_protocol::{Point, Rect, RenderCommand, SharedStr, ThemeToken};

use crate::ticks::{format_tick_label, generate_time_ticks};
use crate::viewport::ViewportController;

const MAJOR_TICK_HEIGHT: f64 = 6.0;
const FONT_SIZE: f64 = 10.0;

/// Render a time axis ruler for the controller's visible time range.
///
/// `axis_height` is the height of the ruler strip. Tick count is derived from
/// the surface width so labels stay at least `min_tick_spacing` pixels apart.
/// Ticks are positioned relative to the trace origin, matching the timeline.
pub fn render_time_axis(
    controller: &ViewportController,
    axis_height: f64,
    min_tick_spacing: f64,
) -> Vec<RenderCommand> {
    let (width, _) = controller.size();
    let Some(visible) = controller.visible_time_range() else {
        return Vec::new();
    };
    let (Some(origin), Some(scale)) = (controller.trace_range(), controller.scale()) else {
        return Vec::new();
    };
    let target = (width / min_tick_spacing.max(1.0)).floor().max(1.0) as usize;
    // Label relative to the trace start, like a stopwatch.
    let Some(ticks) = generate_time_ticks(
        visible.start - origin.start,
        visible.end - origin.start,
        target,
    ) else {
        return Vec::new();
    };

    let mut commands = Vec::with_capacity(ticks.ticks.len() * 2 + 1);
    commands.push(RenderCommand::DrawRect {
        rect: Rect::new(0.0, 0.0, width, axis_height),
        color: ThemeToken::AxisBackground,
        unit_id: None,
    });

    let offset = visible.start - origin.start;
    for &t in &ticks.ticks {
        let x = (t - offset) * scale;
        // Half a pixel of slack keeps end ticks that land on the edge.
        if x < -0.5 || x > width + 0.5 {
            continue;
        }
        commands.push(RenderCommand::DrawLine {
            from: Point::new(x, axis_height - MAJOR_TICK_HEIGHT),
            to: Point::new(x, axis_height),
            color: ThemeToken::AxisTick,
            width: 1.0,
        });
        commands.push(RenderCommand::DrawText {
            position: Point::new(x + 3.0, 1.0),
            text: SharedStr::from(format_tick_label(t, ticks.interval)),
            color: ThemeToken::AxisLabel,
            font_size: FONT_SIZE.min(axis_height),
        });
    }

    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerConfig;
    use crate::model::TimeRange;

    fn controller(width: f64, trace: (f64, f64)) -> ViewportController {
        let mut vc = ViewportController::new(&ViewerConfig::default());
        vc.resize(width, 100.0);
        vc.sync(Some(TimeRange::new(trace.0, trace.1)), 1);
        vc
    }

    fn labels(cmds: &[RenderCommand]) -> Vec<String> {
        cmds.iter()
            .filter_map(|c| match c {
                RenderCommand::DrawText { text, .. } => Some(text.to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn renders_background_ticks_and_labels() {
        let vc = controller(800.0, (0.0, 1_000_000_000.0));
        let cmds = render_time_axis(&vc, 20.0, 80.0);
        assert!(matches!(
            cmds[0],
            RenderCommand::DrawRect {
                color: ThemeToken::AxisBackground,
                ..
            }
        ));
        // 1 s over 800 px at 80 px spacing: 10 targets, 100 ms interval.
        let text = labels(&cmds);
        assert_eq!(text.len(), 11);
        assert_eq!(text[0], "0ms");
        assert_eq!(text[10], "1000ms");
        assert_eq!(cmds.iter().filter(|c| c.is_line()).count(), 11);
    }

    #[test]
    fn labels_are_relative_to_trace_start() {
        let vc = controller(400.0, (5_000.0, 6_000.0));
        let text = labels(&render_time_axis(&vc, 20.0, 80.0));
        assert_eq!(text.first().map(String::as_str), Some("0ns"));
        assert_eq!(text.last().map(String::as_str), Some("1000ns"));
    }

    #[test]
    fn empty_without_a_time_range() {
        let vc = controller(800.0, (10.0, 10.0));
        assert!(render_time_axis(&vc, 20.0, 80.0).is_empty());
    }
}
