use eframe::egui;
use lanescope_core::model::{GroupBy, Lane, SortKey, TraceModel, reorder};
use lanescope_core::views::{render_lane_labels, render_time_axis, render_timeline};
use lanescope_core::{
    BatchStream, KeyboardState, PanKey, StreamEvent, ViewerConfig, ViewportController,
};
use tracing::{debug, warn};

use crate::fetch::Fetcher;
use crate::renderer::{self, HitRegion};
use crate::theme::ThemeMode;

const AXIS_HEIGHT: f32 = 22.0;
const GUTTER_WIDTH: f32 = 160.0;
/// Same bindings as the terminal viewer: WASD pans and zooms in time, the
/// vertical arrows scroll lanes.
const PAN_KEYS: [(egui::Key, PanKey); 8] = [
    (egui::Key::A, PanKey::Backward),
    (egui::Key::ArrowLeft, PanKey::Backward),
    (egui::Key::D, PanKey::Forward),
    (egui::Key::ArrowRight, PanKey::Forward),
    (egui::Key::W, PanKey::ZoomIn),
    (egui::Key::S, PanKey::ZoomOut),
    (egui::Key::ArrowUp, PanKey::Up),
    (egui::Key::ArrowDown, PanKey::Down),
];

const ALL_PAN_KEYS: [PanKey; 6] = [
    PanKey::Backward,
    PanKey::Forward,
    PanKey::ZoomIn,
    PanKey::ZoomOut,
    PanKey::Up,
    PanKey::Down,
];

/// Mirror polled key state: a pan key is held while any key bound to it is
/// down.
fn mirror_keys(keys: &mut KeyboardState, down: impl Fn(egui::Key) -> bool) {
    for pan in ALL_PAN_KEYS {
        let held = PAN_KEYS
            .iter()
            .any(|&(key, bound)| bound == pan && down(key));
        keys.set_held(pan, held);
    }
}

fn group_label(g: GroupBy) -> &'static str {
    match g {
        GroupBy::Id => "goroutine id",
        GroupBy::Name => "function name",
    }
}

fn sort_label(s: SortKey) -> &'static str {
    match s {
        SortKey::Start => "start time",
        SortKey::Duration => "duration",
        SortKey::Running => "running time",
    }
}

/// Streaming timeline viewer.
pub struct TimelineApp {
    model: TraceModel,
    stream: BatchStream,
    fetcher: Option<Fetcher>,
    lanes: Vec<Lane>,
    lanes_dirty: bool,
    group_by: GroupBy,
    sort_by: SortKey,
    controller: ViewportController,
    keys: KeyboardState,
    min_tick_spacing: f64,
    theme_mode: ThemeMode,
    error: Option<String>,
    hits: Vec<HitRegion>,
}

impl TimelineApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: &ViewerConfig) -> Self {
        let theme_mode = ThemeMode::Dark;
        cc.egui_ctx.set_visuals(theme_mode.visuals());

        let (fetcher, error) = match Fetcher::new(config.endpoint.clone()) {
            Ok(f) => (Some(f), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            model: TraceModel::new(),
            stream: BatchStream::new(),
            fetcher,
            lanes: Vec::new(),
            lanes_dirty: false,
            group_by: config.group_by,
            sort_by: config.sort_by,
            controller: ViewportController::new(config),
            keys: KeyboardState::new(),
            min_tick_spacing: config.min_tick_spacing,
            theme_mode,
            error,
            hits: Vec::new(),
        }
    }

    /// Apply a finished fetch and start the next one.
    fn pump(&mut self, ctx: &egui::Context, now: f64) {
        let Some(fetcher) = &self.fetcher else {
            return;
        };
        if let Some((request, outcome)) = fetcher.take() {
            match self.stream.settle(&mut self.model, request, outcome, now) {
                Ok(StreamEvent::Ingested(summary)) => {
                    debug!(batch = summary.batch, "batch applied");
                    self.lanes_dirty = true;
                    self.error = None;
                }
                Ok(StreamEvent::Finished) => self.error = None,
                Err(err) => {
                    warn!(error = %err, "fetch failed, backing off");
                    self.error = Some(err.to_string());
                }
            }
        }
        if let Some(request) = self.stream.poll(&self.model, now) {
            fetcher.start(request, ctx);
        } else if let Some(at) = self.stream.retry_at()
            && at.is_finite()
        {
            ctx.request_repaint_after(std::time::Duration::from_secs_f64((at - now).max(0.0)));
        }
    }

    fn toolbar(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("lanescope");
            ui.separator();

            let (group_by, sort_by) = (self.group_by, self.sort_by);
            egui::ComboBox::from_label("group")
                .selected_text(group_label(self.group_by))
                .show_ui(ui, |ui| {
                    for g in [GroupBy::Id, GroupBy::Name] {
                        ui.selectable_value(&mut self.group_by, g, group_label(g));
                    }
                });
            egui::ComboBox::from_label("sort")
                .selected_text(sort_label(self.sort_by))
                .show_ui(ui, |ui| {
                    for s in [SortKey::Start, SortKey::Duration, SortKey::Running] {
                        ui.selectable_value(&mut self.sort_by, s, sort_label(s));
                    }
                });
            if (group_by, sort_by) != (self.group_by, self.sort_by) {
                self.lanes_dirty = true;
            }

            ui.separator();
            if ui.button("Reset view").clicked() {
                self.controller.reset();
            }
            let theme_label = match self.theme_mode {
                ThemeMode::Dark => "Light",
                ThemeMode::Light => "Dark",
            };
            if ui.button(theme_label).clicked() {
                self.theme_mode = self.theme_mode.toggled();
                ctx.set_visuals(self.theme_mode.visuals());
            }
        });
    }

    fn status(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if let Some(err) = &self.error {
                ui.colored_label(ui.visuals().error_fg_color, err);
                ui.separator();
            }
            let state = if self.model.is_eof() {
                "complete"
            } else if self.stream.is_in_flight() {
                "loading"
            } else {
                "idle"
            };
            let source = self.fetcher.as_ref().map_or("", Fetcher::base);
            ui.label(format!(
                "{} goroutines in {} lanes, {} batches ({state}) from {source}",
                self.model.unit_count(),
                self.lanes.len(),
                self.model.batches().len(),
            ));
            if !self.controller.is_auto_follow() {
                ui.label("| press 0 to follow the whole trace");
            }
        });
    }

    /// Mirror held keys and advance continuous motion. Returns `true` while
    /// anything is still moving.
    fn handle_keys(&mut self, ctx: &egui::Context, now: f64) -> bool {
        if ctx.wants_keyboard_input() {
            self.keys.release_all();
            return false;
        }
        ctx.input(|i| {
            mirror_keys(&mut self.keys, |key| i.key_down(key));
            if i.key_pressed(egui::Key::Num0) {
                self.controller.reset();
            }
        });
        self.controller.animate(&mut self.keys, now)
    }

    fn timeline(&mut self, ui: &mut egui::Ui) {
        let area = ui.available_rect_before_wrap();
        let response = ui.allocate_rect(area, egui::Sense::click_and_drag());

        let axis_rect = egui::Rect::from_min_max(
            egui::pos2(area.left() + GUTTER_WIDTH, area.top()),
            egui::pos2(area.right(), area.top() + AXIS_HEIGHT),
        );
        let gutter_rect = egui::Rect::from_min_max(
            egui::pos2(area.left(), area.top() + AXIS_HEIGHT),
            egui::pos2(area.left() + GUTTER_WIDTH, area.bottom()),
        );
        let body_rect = egui::Rect::from_min_max(
            egui::pos2(area.left() + GUTTER_WIDTH, area.top() + AXIS_HEIGHT),
            area.max,
        );

        if self.lanes_dirty {
            self.lanes = reorder(&self.model, self.group_by, self.sort_by);
            self.lanes_dirty = false;
        }
        self.controller
            .resize(f64::from(body_rect.width()), f64::from(body_rect.height()));
        self.controller
            .sync(self.model.time_range(), self.lanes.len());

        if response.dragged() {
            let delta = response.drag_delta();
            self.controller
                .scroll_by(-f64::from(delta.x), -f64::from(delta.y));
        }
        let scroll = ui.input(|i| i.smooth_scroll_delta);
        if scroll.y.abs() > 0.1 {
            self.controller.zoom(2.0_f64.powf(-f64::from(scroll.y) * 0.01));
        }
        if scroll.x.abs() > 0.1 {
            self.controller.scroll_by(-f64::from(scroll.x), 0.0);
        }

        let timeline = match render_timeline(&self.model, &self.lanes, &self.controller) {
            Ok(frame) => frame.commands,
            Err(err) => {
                let text = err.to_string();
                if self.error.as_deref() != Some(text.as_str()) {
                    warn!(error = %err, "render pass aborted");
                }
                self.error = Some(text);
                Vec::new()
            }
        };
        let axis = render_time_axis(
            &self.controller,
            f64::from(AXIS_HEIGHT),
            self.min_tick_spacing,
        );
        let labels = render_lane_labels(&self.lanes, &self.controller);

        let painter = ui.painter_at(body_rect);
        self.hits =
            renderer::render_commands(&painter, &timeline, body_rect.min, self.theme_mode);
        let painter = ui.painter_at(axis_rect);
        renderer::render_commands(&painter, &axis, axis_rect.min, self.theme_mode);
        let painter = ui.painter_at(gutter_rect);
        renderer::render_commands(&painter, &labels, gutter_rect.min, self.theme_mode);

        let hovered = response
            .hover_pos()
            .filter(|p| body_rect.contains(*p))
            .and_then(|p| renderer::hit_test(&self.hits, p))
            .and_then(|id| self.model.unit(id));
        if let Some(unit) = hovered {
            let text = format!(
                "goroutine {}\n{}\nrunning {:.3} ms",
                unit.id,
                if unit.name.is_empty() { "(unnamed)" } else { unit.name.as_str() },
                unit.total_running / 1e6,
            );
            response.on_hover_text_at_pointer(text);
        }
    }
}

impl eframe::App for TimelineApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = ctx.input(|i| i.time);
        self.pump(ctx, now);
        let moving = self.handle_keys(ctx, now);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ctx, ui));
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| self.status(ui));
        egui::CentralPanel::default().show(ctx, |ui| self.timeline(ui));

        if moving || self.keys.any_held() {
            ctx.request_repaint();
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.keys.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrows_scroll_lanes_and_wasd_moves_time() {
        let mut keys = KeyboardState::new();
        mirror_keys(&mut keys, |k| k == egui::Key::ArrowUp);
        assert!(keys.is_held(PanKey::Up));
        assert!(!keys.is_held(PanKey::ZoomIn));

        mirror_keys(&mut keys, |k| k == egui::Key::ArrowDown || k == egui::Key::W);
        assert!(!keys.is_held(PanKey::Up));
        assert!(keys.is_held(PanKey::Down));
        assert!(keys.is_held(PanKey::ZoomIn));
        assert!(!keys.is_held(PanKey::ZoomOut));
    }

    #[test]
    fn either_binding_holds_horizontal_pan() {
        let mut keys = KeyboardState::new();
        mirror_keys(&mut keys, |k| k == egui::Key::ArrowLeft);
        assert!(keys.is_held(PanKey::Backward));
        mirror_keys(&mut keys, |k| k == egui::Key::A || k == egui::Key::ArrowLeft);
        assert!(keys.is_held(PanKey::Backward));
        mirror_keys(&mut keys, |_| false);
        assert!(!keys.any_held());
    }

    #[test]
    fn every_pan_key_is_bound() {
        for pan in ALL_PAN_KEYS {
            assert!(
                PAN_KEYS.iter().any(|&(_, bound)| bound == pan),
                "{pan:?} has no key"
            );
        }
    }
}
