//! Integration test: stream recorded and synthetic traces through the
//! scheduler into a model, then lay out lanes and render frames.

use lanescope_core::model::{GroupBy, SortKey, TimeRange, TraceModel, reorder};
use lanescope_core::svg::render_svg;
use lanescope_core::views::{render_time_axis, render_timeline};
use lanescope_core::{
    BatchStream, RecordedSource, SyntheticConfig, SyntheticSource, ViewerConfig,
    ViewportController,
};
use lanescope_protocol::{RenderCommand, ThemeToken};

const RECORDED: &str = include_str!("fixtures/three-batches.jsonl");

fn load_recorded() -> TraceModel {
    let mut source = RecordedSource::from_json_str(RECORDED).expect("failed to parse fixture");
    let mut model = TraceModel::new();
    let mut stream = BatchStream::new();
    let ingested = stream
        .drain(&mut source, &mut model)
        .expect("failed to stream fixture");
    assert_eq!(ingested, 3);
    model
}

fn unit_ids(lanes: &[lanescope_core::model::Lane]) -> Vec<Vec<u64>> {
    lanes.iter().map(|l| l.units.clone()).collect()
}

fn span_colors(commands: &[RenderCommand]) -> Vec<ThemeToken> {
    commands
        .iter()
        .filter_map(|c| match c {
            RenderCommand::DrawRect { color, .. } => Some(*color),
            _ => None,
        })
        .collect()
}

#[test]
fn recorded_trace_aggregates_across_batches() {
    let model = load_recorded();
    assert!(model.is_eof());
    assert_eq!(model.time_range(), Some(TimeRange::new(100.0, 400.0)));
    assert_eq!(model.discovery_order(), &[1, 2, 3]);

    let main = model.unit(1).expect("unit 1");
    assert_eq!(main.name, "main.main");
    assert_eq!((main.start, main.end, main.total_running), (100.0, 260.0, 100.0));

    // Names resolve through each batch's own table.
    let conn = model.unit(3).expect("unit 3");
    assert_eq!(conn.name, "net/http.(*conn).serve");
    assert_eq!(conn.total_running, 120.0);

    // The waiting span of unit 2 is closed by its reappearance two batches on.
    let closing: Vec<(f64, f64)> = model
        .unit_spans(0, 2)
        .map(|s| (s.start, s.end))
        .collect();
    assert_eq!(closing, vec![(120.0, 130.0), (130.0, 190.0), (190.0, 310.0)]);
    assert_eq!(model.open_span(2).map(|o| o.start), Some(350.0));
}

#[test]
fn lanes_regroup_and_resort_without_reloading() {
    let model = load_recorded();

    let by_name = reorder(&model, GroupBy::Name, SortKey::Start);
    assert_eq!(unit_ids(&by_name), vec![vec![1], vec![2, 3]]);
    let by_running = reorder(&model, GroupBy::Name, SortKey::Running);
    assert_eq!(unit_ids(&by_running), vec![vec![2, 3], vec![1]]);
    let by_duration = reorder(&model, GroupBy::Name, SortKey::Duration);
    assert_eq!(unit_ids(&by_duration), vec![vec![2, 3], vec![1]]);

    // Units 1 and 2 tie on running time and keep discovery order.
    let by_id = reorder(&model, GroupBy::Id, SortKey::Running);
    assert_eq!(unit_ids(&by_id), vec![vec![3], vec![1], vec![2]]);
}

#[test]
fn full_view_draws_every_closed_span() {
    let model = load_recorded();
    let lanes = reorder(&model, GroupBy::Id, SortKey::Start);
    let mut controller = ViewportController::new(&ViewerConfig::default());
    controller.resize(300.0, 30.0);
    controller.sync(model.time_range(), lanes.len());

    let frame = render_timeline(&model, &lanes, &controller).expect("render");
    assert_eq!(frame.stats.spans_drawn, 8);
    assert_eq!(frame.stats.batches_visited, 3);
    assert_eq!(frame.stats.lanes_visited, 3);
    assert_eq!(frame.commands.iter().filter(|c| c.is_line()).count(), 3);
}

#[test]
fn zoomed_view_finds_spans_reaching_in_from_earlier_batches() {
    let model = load_recorded();
    let lanes = reorder(&model, GroupBy::Id, SortKey::Start);
    let mut controller = ViewportController::new(&ViewerConfig::default());
    controller.resize(300.0, 30.0);
    controller.sync(model.time_range(), lanes.len());

    controller.zoom(0.1);
    let x = controller.time_to_x(215.0).expect("projection");
    controller.scroll_to(x, 0.0);
    let visible = controller.visible_time_range().expect("visible range");
    assert!((visible.start - 215.0).abs() < 1e-9);
    assert!((visible.end - 245.0).abs() < 1e-9);

    let frame = render_timeline(&model, &lanes, &controller).expect("render");
    assert_eq!(frame.stats.batches_visited, 2);
    assert_eq!(
        span_colors(&frame.commands),
        vec![ThemeToken::StateWaiting, ThemeToken::StateRunning]
    );
}

#[test]
fn synthetic_trace_renders_and_exports() {
    let config = SyntheticConfig {
        units: 40,
        batches: 6,
        ..SyntheticConfig::default()
    };
    let mut source = SyntheticSource::new(config);
    let mut model = TraceModel::new();
    let mut stream = BatchStream::new();
    assert_eq!(stream.drain(&mut source, &mut model).expect("drain"), 6);
    assert!(model.unit_count() > 0);

    let lanes = reorder(&model, GroupBy::Name, SortKey::Running);
    let viewer = ViewerConfig::default();
    let mut controller = ViewportController::new(&viewer);
    controller.resize(1_200.0, 400.0);
    controller.sync(model.time_range(), lanes.len());

    let frame = render_timeline(&model, &lanes, &controller).expect("render");
    assert!(frame.stats.spans_drawn > 0);

    let mut commands = frame.commands;
    commands.extend(render_time_axis(&controller, 16.0, viewer.min_tick_spacing));
    let svg = render_svg(&commands, 1_200.0, 400.0);
    assert!(svg.starts_with("<svg"));
    assert!(svg.contains("#a0c4ff"));
}
