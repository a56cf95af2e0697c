//! Terminal-independent viewer state: what the event loop mutates and the
//! painter reads.

use std::collections::HashMap;

use lanescope_core::model::{GroupBy, Lane, SortKey, TraceModel, reorder};
use lanescope_core::views::{
    RenderError, RenderStats, render_lane_labels, render_time_axis, render_timeline,
};
use lanescope_core::{
    BatchStream, FetchRequest, Fetched, KeyboardState, PanKey, SourceError, StreamEvent,
    ViewerConfig, ViewportController,
};
use lanescope_protocol::RenderCommand;
use tracing::{debug, warn};

/// Without key release reports, a key counts as held for this long after its
/// last press or repeat.
const HOLD_WITHOUT_RELEASE: f64 = 0.6;

/// Columns between labelled axis ticks.
const TICK_SPACING_COLS: f64 = 14.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Hold(PanKey),
    Release(PanKey),
    Reset,
    CycleGroup,
    CycleSort,
    Quit,
}

/// Draw commands for one terminal frame, each list in its own area's
/// coordinates.
#[derive(Debug, Default)]
pub struct Frame {
    pub axis: Vec<RenderCommand>,
    pub labels: Vec<RenderCommand>,
    pub timeline: Vec<RenderCommand>,
}

pub struct App {
    model: TraceModel,
    stream: BatchStream,
    lanes: Vec<Lane>,
    lanes_dirty: bool,
    group_by: GroupBy,
    sort_by: SortKey,
    controller: ViewportController,
    keys: KeyboardState,
    /// Last press or repeat per key, used when releases are not reported.
    last_seen: HashMap<PanKey, f64>,
    release_events: bool,
    error: Option<String>,
    stats: RenderStats,
    quit: bool,
}

impl App {
    /// `config` is taken in pixels; lanes are forced to one terminal row.
    pub fn new(config: &ViewerConfig, release_events: bool) -> Self {
        let cells = ViewerConfig {
            lane_height: 1.0,
            lane_gap: 0.0,
            ..config.clone()
        };
        Self {
            model: TraceModel::new(),
            stream: BatchStream::new(),
            lanes: Vec::new(),
            lanes_dirty: false,
            group_by: config.group_by,
            sort_by: config.sort_by,
            controller: ViewportController::new(&cells),
            keys: KeyboardState::new(),
            last_seen: HashMap::new(),
            release_events,
            error: None,
            stats: RenderStats::default(),
            quit: false,
        }
    }

    /// Switch between release-driven and timeout-driven key holding.
    pub fn set_release_events(&mut self, on: bool) {
        self.release_events = on;
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn is_animating(&self) -> bool {
        self.keys.any_held()
    }

    /// Claim the next fetch, honoring the retry delay after a failure.
    pub fn next_request(&mut self, now: f64) -> Option<FetchRequest> {
        self.stream.poll(&self.model, now)
    }

    pub fn on_fetched(
        &mut self,
        request: FetchRequest,
        outcome: Result<Fetched, SourceError>,
        now: f64,
    ) {
        match self.stream.settle(&mut self.model, request, outcome, now) {
            Ok(StreamEvent::Ingested(summary)) => {
                debug!(batch = summary.batch, new_units = summary.new_units, "batch applied");
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

    /// The fetch worker went away; nothing more will arrive.
    pub fn on_source_closed(&mut self) {
        self.error = Some("batch source stopped".into());
        self.stream.suspend();
    }

    pub fn handle(&mut self, action: Action, now: f64) {
        match action {
            Action::Hold(key) => {
                self.keys.press(key);
                self.last_seen.insert(key, now);
            }
            Action::Release(key) => {
                self.keys.release(key);
                self.last_seen.remove(&key);
            }
            Action::Reset => self.controller.reset(),
            Action::CycleGroup => {
                self.group_by = match self.group_by {
                    GroupBy::Id => GroupBy::Name,
                    GroupBy::Name => GroupBy::Id,
                };
                self.lanes_dirty = true;
            }
            Action::CycleSort => {
                self.sort_by = match self.sort_by {
                    SortKey::Start => SortKey::Duration,
                    SortKey::Duration => SortKey::Running,
                    SortKey::Running => SortKey::Start,
                };
                self.lanes_dirty = true;
            }
            Action::Quit => {
                self.keys.release_all();
                self.quit = true;
            }
        }
    }

    /// Advance held-key motion to `now`.
    pub fn tick(&mut self, now: f64) -> bool {
        if !self.release_events {
            let stale: Vec<PanKey> = self
                .last_seen
                .iter()
                .filter(|(_, seen)| now - **seen > HOLD_WITHOUT_RELEASE)
                .map(|(key, _)| *key)
                .collect();
            for key in stale {
                self.handle(Action::Release(key), now);
            }
        }
        self.controller.animate(&mut self.keys, now)
    }

    /// Lay out and render for a timeline area of `width × height` cells.
    ///
    /// On a render error the previous error text is replaced and an empty
    /// timeline is returned rather than a partial one.
    pub fn render(&mut self, width: u16, height: u16) -> Frame {
        if self.lanes_dirty {
            self.lanes = reorder(&self.model, self.group_by, self.sort_by);
            self.lanes_dirty = false;
        }
        self.controller.resize(f64::from(width), f64::from(height));
        self.controller
            .sync(self.model.time_range(), self.lanes.len());

        let timeline = match render_timeline(&self.model, &self.lanes, &self.controller) {
            Ok(frame) => {
                self.stats = frame.stats;
                frame.commands
            }
            Err(err) => {
                self.report_render_error(&err);
                Vec::new()
            }
        };
        Frame {
            axis: render_time_axis(&self.controller, 2.0, TICK_SPACING_COLS),
            labels: render_lane_labels(&self.lanes, &self.controller),
            timeline,
        }
    }

    fn report_render_error(&mut self, err: &RenderError) {
        let text = err.to_string();
        if self.error.as_deref() != Some(text.as_str()) {
            warn!(error = %err, "render pass aborted");
        }
        self.error = Some(text);
    }

    pub fn status_line(&self) -> String {
        let state = if self.model.is_eof() {
            "complete"
        } else if self.stream.is_in_flight() {
            "loading"
        } else {
            "idle"
        };
        let mut line = format!(
            " lanescope | {} units, {} lanes, {} batches ({state}) | group:{:?} sort:{:?} | spans {} | a/d pan  w/s zoom  0 reset  g group  o sort  q quit ",
            self.model.unit_count(),
            self.lanes.len(),
            self.model.batches().len(),
            self.group_by,
            self.sort_by,
            self.stats.spans_drawn,
        );
        if let Some(err) = &self.error {
            line.push_str("| ");
            line.push_str(err);
        }
        line
    }
}
