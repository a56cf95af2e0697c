//! Scroll, zoom, and time <-> pixel projection for the timeline.
//!
//! Two coordinate systems compose here. The time window
//! `[start_time, end_time]` sets the zoom: the whole trace is laid out on a
//! virtual content strip `width × trace_span / window_span` pixels wide. The
//! scroll offset is where the surface sits on that strip. Vertically the
//! content is `lane_count × lane_pitch` pixels tall.

use std::ops::Range;

use crate::config::ViewerConfig;
use crate::input::{KeyboardState, PanKey};
use crate::model::TimeRange;

/// Narrowest time window a zoom can reach, in nanoseconds.
const MIN_WINDOW_NS: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct ViewportController {
    window: TimeRange,
    auto_follow: bool,
    scroll_x: f64,
    scroll_y: f64,
    width: f64,
    height: f64,
    lane_pitch: f64,
    lane_fill: f64,
    pan_speed: f64,
    zoom_speed: f64,
    trace: Option<TimeRange>,
    lane_count: usize,
}

impl ViewportController {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            window: TimeRange::new(0.0, 0.0),
            auto_follow: true,
            scroll_x: 0.0,
            scroll_y: 0.0,
            width: 0.0,
            height: 0.0,
            lane_pitch: config.full_lane_height(),
            lane_fill: config.lane_height,
            pan_speed: config.pan_speed,
            zoom_speed: config.zoom_speed,
            trace: None,
            lane_count: 0,
        }
    }

    pub fn window(&self) -> TimeRange {
        self.window
    }

    pub fn is_auto_follow(&self) -> bool {
        self.auto_follow
    }

    pub fn scroll(&self) -> (f64, f64) {
        (self.scroll_x, self.scroll_y)
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn lane_pitch(&self) -> f64 {
        self.lane_pitch
    }

    /// Height of the filled part of a lane, excluding the gap.
    pub fn lane_fill_height(&self) -> f64 {
        self.lane_fill
    }

    pub fn trace_range(&self) -> Option<TimeRange> {
        self.trace
    }

    /// Match the drawing surface size. Called before every draw pass.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
        self.reconcile();
    }

    /// Pick up new trace bounds and lane count after ingestion or regrouping.
    pub fn sync(&mut self, trace: Option<TimeRange>, lane_count: usize) {
        self.trace = trace;
        self.lane_count = lane_count;
        self.reconcile();
    }

    /// Pixels per nanosecond, `None` for a degenerate window or surface.
    pub fn scale(&self) -> Option<f64> {
        if self.window.is_degenerate() || !(self.width > 0.0) {
            return None;
        }
        Some(self.width / self.window.span())
    }

    /// Size of the full virtual content in pixels.
    pub fn content_size(&self) -> (f64, f64) {
        let width = match (self.trace, self.scale()) {
            (Some(trace), Some(scale)) if !trace.is_degenerate() => {
                (trace.span() * scale).max(self.width)
            }
            _ => self.width,
        };
        (width, self.lane_count as f64 * self.lane_pitch)
    }

    /// Content x coordinate of a timestamp.
    pub fn time_to_x(&self, t: f64) -> Option<f64> {
        let origin = self.trace?.start;
        Some((t - origin) * self.scale()?)
    }

    /// Timestamp at a content x coordinate.
    pub fn x_to_time(&self, x: f64) -> Option<f64> {
        let origin = self.trace?.start;
        Some(origin + x / self.scale()?)
    }

    /// Time range covered by the surface at the current scroll offset.
    pub fn visible_time_range(&self) -> Option<TimeRange> {
        let start = self.x_to_time(self.scroll_x)?;
        let end = self.x_to_time(self.scroll_x + self.width)?;
        Some(TimeRange::new(start, end))
    }

    /// Indices of lanes intersecting the surface, clipped to the lane count.
    pub fn visible_lanes(&self) -> Range<usize> {
        if !(self.lane_pitch > 0.0) || !(self.height > 0.0) {
            return 0..0;
        }
        let first = (self.scroll_y / self.lane_pitch).floor().max(0.0) as usize;
        let last = ((self.scroll_y + self.height) / self.lane_pitch).ceil().max(0.0) as usize;
        first.min(self.lane_count)..last.min(self.lane_count)
    }

    pub fn scroll_to(&mut self, x: f64, y: f64) {
        self.scroll_x = x;
        self.scroll_y = y;
        self.clamp_scroll();
        self.window_from_scroll();
    }

    pub fn scroll_by(&mut self, dx: f64, dy: f64) {
        self.scroll_to(self.scroll_x + dx, self.scroll_y + dy);
    }

    /// Scale the time window by `factor` around the visible center.
    /// Values below one zoom in. Disables auto-follow.
    pub fn zoom(&mut self, factor: f64) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let Some(visible) = self.visible_time_range() else {
            return;
        };
        let max_span = self
            .trace
            .filter(|t| !t.is_degenerate())
            .map_or(visible.span(), |t| t.span());
        let span = (visible.span() * factor).clamp(MIN_WINDOW_NS.min(max_span), max_span);
        let center = visible.center();
        self.window = TimeRange::new(center - span / 2.0, center + span / 2.0);
        self.auto_follow = false;
        self.reconcile();
    }

    /// Back to the full trace with auto-follow on and scroll at the origin.
    pub fn reset(&mut self) {
        self.auto_follow = true;
        self.scroll_x = 0.0;
        self.scroll_y = 0.0;
        self.reconcile();
    }

    /// Apply one animation frame of held-key motion. Returns whether the
    /// view moved.
    ///
    /// Panning covers `pan_speed` viewports per second of measured time, so
    /// the speed does not depend on the frame rate.
    pub fn animate(&mut self, keys: &mut KeyboardState, now: f64) -> bool {
        let Some(elapsed) = keys.tick(now) else {
            return false;
        };
        if elapsed <= 0.0 {
            return false;
        }
        let before = (self.scroll_x, self.scroll_y, self.window);

        let dx = self.pan_speed * self.width * elapsed;
        let dy = self.pan_speed * self.height * elapsed;
        let mut move_x = 0.0;
        let mut move_y = 0.0;
        if keys.is_held(PanKey::Backward) {
            move_x -= dx;
        }
        if keys.is_held(PanKey::Forward) {
            move_x += dx;
        }
        if keys.is_held(PanKey::Up) {
            move_y -= dy;
        }
        if keys.is_held(PanKey::Down) {
            move_y += dy;
        }
        if move_x != 0.0 || move_y != 0.0 {
            self.scroll_by(move_x, move_y);
        }

        let doublings = self.zoom_speed * elapsed;
        if keys.is_held(PanKey::ZoomIn) {
            self.zoom(0.5_f64.powf(doublings));
        }
        if keys.is_held(PanKey::ZoomOut) {
            self.zoom(2.0_f64.powf(doublings));
        }

        before != (self.scroll_x, self.scroll_y, self.window)
    }

    /// Restore every invariant after any state change: auto-follow window,
    /// scroll derived from the window, and clamped offsets.
    fn reconcile(&mut self) {
        if self.auto_follow {
            if let Some(trace) = self.trace {
                self.window = trace;
            }
            self.scroll_x = 0.0;
        } else if let Some(x) = self.time_to_x(self.window.start) {
            self.scroll_x = x;
        }
        self.clamp_scroll();
        self.window_from_scroll();
    }

    fn clamp_scroll(&mut self) {
        let (content_w, content_h) = self.content_size();
        self.scroll_x = clamp_offset(self.scroll_x, content_w, self.width);
        self.scroll_y = clamp_offset(self.scroll_y, content_h, self.height);
    }

    /// Keep a manual window equal to what is actually on screen.
    fn window_from_scroll(&mut self) {
        if self.auto_follow {
            return;
        }
        if let Some(visible) = self.visible_time_range() {
            self.window = visible;
        }
    }
}

/// Clamp a scroll offset into `[0, max(0, content - view)]`.
fn clamp_offset(offset: f64, content: f64, view: f64) -> f64 {
    let max = (content - view).max(0.0);
    if offset.is_nan() {
        return 0.0;
    }
    offset.clamp(0.0, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn controller(width: f64, height: f64, lanes: usize, trace: (f64, f64)) -> ViewportController {
        let mut vc = ViewportController::new(&ViewerConfig::default());
        vc.resize(width, height);
        vc.sync(Some(TimeRange::new(trace.0, trace.1)), lanes);
        vc
    }

    fn assert_clamped(vc: &ViewportController) {
        let (cw, ch) = vc.content_size();
        let (w, h) = vc.size();
        let (x, y) = vc.scroll();
        assert!(x >= 0.0 && x <= (cw - w).max(0.0) + EPS, "x={x} cw={cw} w={w}");
        assert!(y >= 0.0 && y <= (ch - h).max(0.0) + EPS, "y={y} ch={ch} h={h}");
    }

    #[test]
    fn auto_follow_tracks_trace_bounds() {
        let mut vc = controller(800.0, 600.0, 10, (0.0, 1_000.0));
        assert_eq!(vc.window(), TimeRange::new(0.0, 1_000.0));
        vc.sync(Some(TimeRange::new(0.0, 5_000.0)), 10);
        assert_eq!(vc.window(), TimeRange::new(0.0, 5_000.0));
        assert_eq!(vc.content_size().0, 800.0);
    }

    #[test]
    fn content_width_scales_with_zoom() {
        let mut vc = controller(800.0, 600.0, 10, (0.0, 1_000.0));
        vc.zoom(0.25);
        assert!(!vc.is_auto_follow());
        assert!((vc.content_size().0 - 3_200.0).abs() < EPS);
        assert!((vc.window().span() - 250.0).abs() < EPS);
        // Zoomed around the center of [0, 1000].
        assert!((vc.window().center() - 500.0).abs() < EPS);
        assert_clamped(&vc);
    }

    #[test]
    fn pixel_round_trip_within_one_pixel() {
        let mut vc = controller(1_000.0, 300.0, 3, (1_000_000.0, 9_000_000.0));
        vc.zoom(0.1);
        let scale = vc.scale().expect("scale");
        for t in [1_000_000.0, 1_234_567.0, 4_999_999.0, 9_000_000.0] {
            let x = vc.time_to_x(t).expect("x");
            let back = vc.x_to_time(x.round()).expect("t");
            assert!((back - t).abs() <= 1.0 / scale, "t={t} back={back}");
        }
    }

    #[test]
    fn degenerate_ranges_project_nothing() {
        let vc = controller(800.0, 600.0, 10, (5.0, 5.0));
        assert!(vc.scale().is_none());
        assert!(vc.time_to_x(5.0).is_none());
        assert!(vc.visible_time_range().is_none());
        assert_eq!(vc.content_size().0, 800.0);

        let empty = controller(0.0, 0.0, 10, (0.0, 100.0));
        assert!(empty.visible_time_range().is_none());
        assert_eq!(empty.visible_lanes(), 0..0);
    }

    #[test]
    fn visible_lane_range() {
        let mut vc = controller(100.0, 55.0, 100, (0.0, 1.0));
        assert_eq!(vc.visible_lanes(), 0..6);
        vc.scroll_to(0.0, 25.0);
        assert_eq!(vc.visible_lanes(), 2..8);
        vc.scroll_to(0.0, 10_000.0);
        assert_eq!(vc.scroll().1, 945.0);
        assert_eq!(vc.visible_lanes(), 94..100);
    }

    #[test]
    fn scroll_clamps_after_pan_resize_and_growth() {
        let mut vc = controller(800.0, 100.0, 50, (0.0, 1_000.0));
        vc.zoom(0.5);
        vc.scroll_by(-1e9, -1e9);
        assert_eq!(vc.scroll(), (0.0, 0.0));
        vc.scroll_by(1e9, 1e9);
        assert_clamped(&vc);
        assert!((vc.scroll().0 - 800.0).abs() < EPS);

        vc.resize(1_200.0, 400.0);
        assert_clamped(&vc);

        vc.sync(Some(TimeRange::new(0.0, 4_000.0)), 5);
        assert_clamped(&vc);
        assert_eq!(vc.scroll().1, 0.0);
    }

    #[test]
    fn manual_window_stays_fixed_while_data_grows() {
        let mut vc = controller(800.0, 100.0, 1, (0.0, 1_000.0));
        vc.zoom(0.5);
        let window = vc.window();
        vc.sync(Some(TimeRange::new(0.0, 10_000.0)), 1);
        assert!((vc.window().start - window.start).abs() < EPS);
        assert!((vc.window().span() - window.span()).abs() < EPS);
    }

    #[test]
    fn held_key_pans_half_a_viewport_per_second() {
        let mut vc = controller(800.0, 100.0, 1, (0.0, 1_000.0));
        vc.zoom(0.1);
        vc.scroll_to(0.0, 0.0);
        let mut keys = KeyboardState::new();
        keys.press(PanKey::Forward);
        assert!(!vc.animate(&mut keys, 10.0));
        assert!(vc.animate(&mut keys, 10.5));
        assert!((vc.scroll().0 - 200.0).abs() < EPS);

        // Same distance split across many frames.
        let mut other = controller(800.0, 100.0, 1, (0.0, 1_000.0));
        other.zoom(0.1);
        other.scroll_to(0.0, 0.0);
        let mut keys2 = KeyboardState::new();
        keys2.press(PanKey::Forward);
        other.animate(&mut keys2, 0.0);
        for i in 1..=30 {
            other.animate(&mut keys2, f64::from(i) / 60.0);
        }
        assert!((other.scroll().0 - 200.0).abs() < 1e-3);

        keys.release(PanKey::Forward);
        assert!(!vc.animate(&mut keys, 20.0));
        assert!((vc.scroll().0 - 200.0).abs() < EPS);
    }

    #[test]
    fn held_zoom_key_halves_window_per_second() {
        let mut vc = controller(800.0, 100.0, 1, (0.0, 1_000.0));
        vc.zoom(0.5);
        let mut keys = KeyboardState::new();
        keys.press(PanKey::ZoomIn);
        vc.animate(&mut keys, 0.0);
        vc.animate(&mut keys, 1.0);
        assert!((vc.window().span() - 250.0).abs() < 1e-6);
    }

    #[test]
    fn zoom_out_is_capped_at_trace_span() {
        let mut vc = controller(800.0, 100.0, 1, (0.0, 1_000.0));
        vc.zoom(0.5);
        vc.zoom(100.0);
        assert!((vc.window().span() - 1_000.0).abs() < EPS);
        assert_eq!(vc.scroll().0, 0.0);
    }

    #[test]
    fn reset_restores_auto_follow() {
        let mut vc = controller(800.0, 100.0, 100, (0.0, 1_000.0));
        vc.zoom(0.2);
        vc.scroll_by(300.0, 50.0);
        vc.reset();
        assert!(vc.is_auto_follow());
        assert_eq!(vc.scroll(), (0.0, 0.0));
        assert_eq!(vc.window(), TimeRange::new(0.0, 1_000.0));
    }
}
