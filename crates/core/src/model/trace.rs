//! The aggregated trace model.
//!
//! `TraceModel` is the single writer of trace state: front ends feed it
//! batches through [`TraceModel::ingest`] in arrival order and every other
//! component reads it through `&TraceModel`. History is never reprocessed;
//! each batch is resolved once against its own string table and appended.

use std::collections::{HashMap, HashSet};

use lanescope_protocol::{Batch, SharedStr, UnitId, WireUnit};
use thiserror::Error;
use tracing::{debug, warn};

use super::time::TimeRange;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("batch starting at {start} arrived after end of data")]
    AfterEof { start: f64 },
}

/// Per-unit summary used for lane sorting and grouping.
#[derive(Debug, Clone)]
pub struct UnitSummary {
    pub id: UnitId,
    pub name: SharedStr,
    /// Earliest event timestamp seen for this unit.
    pub start: f64,
    /// Latest event timestamp seen for this unit.
    pub end: f64,
    /// Running sum of the per-batch `running` durations.
    pub total_running: f64,
    named: bool,
}

impl UnitSummary {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A state name resolved at ingestion time.
#[derive(Debug, Clone, PartialEq)]
pub enum StateLabel {
    Named(SharedStr),
    /// The batch referenced an index outside its string table. Kept so the
    /// renderer can report it if the span is ever drawn.
    Unresolved(f64),
}

impl StateLabel {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(s) => Some(s.as_str()),
            Self::Unresolved(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateEvent {
    pub timestamp: f64,
    pub state: StateLabel,
}

/// One unit's events within one batch.
#[derive(Debug, Clone)]
pub struct UnitTrack {
    pub events: Vec<StateEvent>,
    /// Timestamp of the unit's next event in a later batch. Set when the
    /// unit reappears; `None` means the last span of this track is open.
    pub closed_at: Option<f64>,
}

/// An ingested batch with every string index resolved.
#[derive(Debug, Clone)]
pub struct TraceBatch {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    /// Furthest timestamp any span starting in this batch reaches, including
    /// spans closed by later batches.
    reach: f64,
    tracks: HashMap<UnitId, UnitTrack>,
}

impl TraceBatch {
    pub fn track(&self, unit: UnitId) -> Option<&UnitTrack> {
        self.tracks.get(&unit)
    }

    pub fn unit_count(&self) -> usize {
        self.tracks.len()
    }

    /// Whether any span drawn from this batch can intersect `range`. A
    /// bounds check only, no event is touched.
    pub fn reaches_into(&self, range: &TimeRange) -> bool {
        range.overlaps(self.start, self.reach)
    }

    pub fn reach(&self) -> f64 {
        self.reach
    }
}

/// The latest known state of a unit whose end is not known yet.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenSpan {
    pub batch: usize,
    pub start: f64,
    pub state: StateLabel,
}

/// A unit's state over `[start, end)`, derived from the event stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span<'a> {
    pub unit: UnitId,
    pub start: f64,
    pub end: f64,
    pub state: &'a StateLabel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub batch: usize,
    pub new_units: usize,
    pub events: usize,
    pub spans_closed: usize,
}

#[derive(Debug, Default)]
pub struct TraceModel {
    start: Option<f64>,
    end: f64,
    eof: bool,
    units: HashMap<UnitId, UnitSummary>,
    discovery: Vec<UnitId>,
    batches: Vec<TraceBatch>,
    open_spans: HashMap<UnitId, OpenSpan>,
    strings: HashSet<SharedStr>,
}

impl TraceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest event timestamp ever ingested.
    pub fn start(&self) -> Option<f64> {
        self.start
    }

    /// Latest timestamp seen, from events or batch bounds. Also the cursor
    /// for the next fetch.
    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// `[start, end]` once at least one event has been seen.
    pub fn time_range(&self) -> Option<TimeRange> {
        self.start.map(|start| TimeRange::new(start, self.end.max(start)))
    }

    pub fn unit(&self, id: UnitId) -> Option<&UnitSummary> {
        self.units.get(&id)
    }

    pub fn unit_count(&self) -> usize {
        self.discovery.len()
    }

    /// Unit ids in the order they were first observed.
    pub fn discovery_order(&self) -> &[UnitId] {
        &self.discovery
    }

    /// Unit summaries in discovery order.
    pub fn units(&self) -> impl Iterator<Item = &UnitSummary> {
        self.discovery.iter().filter_map(|id| self.units.get(id))
    }

    pub fn batches(&self) -> &[TraceBatch] {
        &self.batches
    }

    pub fn open_span(&self, unit: UnitId) -> Option<&OpenSpan> {
        self.open_spans.get(&unit)
    }

    /// Record that the source has no further batches. Returns `true` the
    /// one time the flag actually flips.
    pub fn mark_eof(&mut self) -> bool {
        if self.eof {
            return false;
        }
        debug!(batches = self.batches.len(), end = self.end, "trace complete");
        self.eof = true;
        true
    }

    /// Merge one batch into the model.
    pub fn ingest(&mut self, batch: Batch) -> Result<IngestSummary, IngestError> {
        if self.eof {
            return Err(IngestError::AfterEof { start: batch.start });
        }
        if !batch.error.is_empty() {
            warn!(error = %batch.error, start = batch.start, "source reported a trace error");
        }

        let index = self.batches.len();
        let mut summary = IngestSummary {
            batch: index,
            ..IngestSummary::default()
        };
        let mut tracks = HashMap::with_capacity(batch.goroutines.len());
        let mut lo = batch.start;
        let mut hi = batch.end;

        for (&id, wire) in &batch.goroutines {
            let Some((first, last)) = wire.time_bounds() else {
                continue;
            };
            let events: Vec<StateEvent> = wire
                .events
                .iter()
                .map(|ev| StateEvent {
                    timestamp: ev.timestamp(),
                    state: self.resolve_state(&batch, ev.state_index()),
                })
                .collect();

            if self.close_open_span(id, events[0].timestamp) {
                summary.spans_closed += 1;
            }
            if let Some(last_event) = events.last() {
                self.open_spans.insert(
                    id,
                    OpenSpan {
                        batch: index,
                        start: last_event.timestamp,
                        state: last_event.state.clone(),
                    },
                );
            }
            if self.observe_unit(id, &batch, wire, first, last) {
                summary.new_units += 1;
            }

            lo = lo.min(first);
            hi = hi.max(last);
            self.start = Some(self.start.map_or(first, |s| s.min(first)));
            summary.events += events.len();
            tracks.insert(
                id,
                UnitTrack {
                    events,
                    closed_at: None,
                },
            );
        }

        self.end = self.end.max(hi);
        self.batches.push(TraceBatch {
            index,
            start: lo,
            end: hi,
            reach: hi,
            tracks,
        });

        debug!(
            batch = index,
            units = batch.goroutines.len(),
            new_units = summary.new_units,
            events = summary.events,
            end = self.end,
            "ingested batch"
        );
        Ok(summary)
    }

    /// Spans of `unit` that start in batch `batch`, in event order.
    ///
    /// The last event's span ends at the unit's first event in a later
    /// batch; while the unit has not reappeared that span is open and not
    /// yielded.
    pub fn unit_spans(&self, batch: usize, unit: UnitId) -> impl Iterator<Item = Span<'_>> {
        let track = self.batches.get(batch).and_then(|b| b.track(unit));
        let events = track.map_or(&[][..], |t| t.events.as_slice());
        let closed_at = track.and_then(|t| t.closed_at);
        events.iter().enumerate().filter_map(move |(i, ev)| {
            let end = events.get(i + 1).map(|next| next.timestamp).or(closed_at)?;
            Some(Span {
                unit,
                start: ev.timestamp,
                end,
                state: &ev.state,
            })
        })
    }

    fn close_open_span(&mut self, unit: UnitId, at: f64) -> bool {
        let Some(open) = self.open_spans.remove(&unit) else {
            return false;
        };
        let Some(batch) = self.batches.get_mut(open.batch) else {
            return false;
        };
        if let Some(track) = batch.tracks.get_mut(&unit) {
            track.closed_at = Some(at);
            batch.reach = batch.reach.max(at);
        }
        true
    }

    /// Update or create the unit's summary. Returns `true` for a new unit.
    fn observe_unit(
        &mut self,
        id: UnitId,
        batch: &Batch,
        wire: &WireUnit,
        first: f64,
        last: f64,
    ) -> bool {
        let name = wire
            .name
            .and_then(|n| batch.string(n))
            .filter(|n| !n.is_empty())
            .map(|n| self.intern(n));

        if let Some(unit) = self.units.get_mut(&id) {
            unit.start = unit.start.min(first);
            unit.end = unit.end.max(last);
            unit.total_running += wire.running;
            if let Some(name) = name.filter(|_| !unit.named) {
                unit.name = name;
                unit.named = true;
            }
            return false;
        }

        let named = name.is_some();
        let name = name.unwrap_or_else(|| SharedStr::from(format!("goroutine {id}")));
        self.units.insert(
            id,
            UnitSummary {
                id,
                name,
                start: first,
                end: last,
                total_running: wire.running,
                named,
            },
        );
        self.discovery.push(id);
        true
    }

    fn resolve_state(&mut self, batch: &Batch, raw: f64) -> StateLabel {
        match batch.string(raw) {
            Some(s) => StateLabel::Named(self.intern(s)),
            None => StateLabel::Unresolved(raw),
        }
    }

    fn intern(&mut self, s: &str) -> SharedStr {
        if let Some(existing) = self.strings.get(s) {
            return existing.clone();
        }
        let shared = SharedStr::from(s);
        self.strings.insert(shared.clone());
        shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanescope_protocol::WireEvent;

    fn batch_json(json: &str) -> Batch {
        serde_json::from_str(json).expect("valid batch json")
    }

    fn first_batch() -> Batch {
        batch_json(
            r#"{"start": 0, "end": 100,
                "goroutines": {"1": {"name": 0, "events": [[0, 0], [50, 1]], "running": 50}},
                "strings": ["worker", "running"]}"#,
        )
    }

    fn second_batch() -> Batch {
        batch_json(r#"{"start": 100, "end": 200, "goroutines": {"1": {"events": [[150, 0]]}}}"#)
    }

    #[test]
    fn lone_event_closes_previous_span() {
        let mut model = TraceModel::new();
        model.ingest(first_batch()).expect("first");
        let summary = model.ingest(second_batch()).expect("second");
        assert_eq!(summary.spans_closed, 1);

        let spans: Vec<_> = model.unit_spans(0, 1).collect();
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].start, spans[0].end), (0.0, 50.0));
        assert_eq!(spans[0].state.name(), Some("worker"));
        assert_eq!((spans[1].start, spans[1].end), (50.0, 150.0));
        assert_eq!(spans[1].state.name(), Some("running"));

        // The event at 150 has no successor yet, and its index does not
        // resolve because the second batch carries no string table.
        assert_eq!(model.unit_spans(1, 1).count(), 0);
        let open = model.open_span(1).expect("open span");
        assert_eq!(open.start, 150.0);
        assert_eq!(open.state, StateLabel::Unresolved(0.0));
    }

    #[test]
    fn bounds_and_running_accumulate() {
        let mut model = TraceModel::new();
        assert!(model.time_range().is_none());
        model.ingest(first_batch()).expect("first");
        model.ingest(second_batch()).expect("second");

        assert_eq!(model.start(), Some(0.0));
        assert_eq!(model.end(), 200.0);
        let unit = model.unit(1).expect("unit 1");
        assert_eq!(unit.name, "worker");
        assert_eq!((unit.start, unit.end), (0.0, 150.0));
        assert_eq!(unit.total_running, 50.0);
        assert_eq!(model.unit_count(), 1);
    }

    #[test]
    fn string_tables_are_batch_local() {
        let mut model = TraceModel::new();
        model
            .ingest(batch_json(
                r#"{"start": 0, "end": 10,
                    "goroutines": {"1": {"name": 0, "events": [[0, 1]]}},
                    "strings": ["main.main", "running"]}"#,
            ))
            .expect("first");
        model
            .ingest(batch_json(
                r#"{"start": 10, "end": 20,
                    "goroutines": {"1": {"events": [[20, 0]]}},
                    "strings": ["syscall"]}"#,
            ))
            .expect("second");

        assert_eq!(
            model.open_span(1).map(|o| o.state.clone()),
            Some(StateLabel::Named(SharedStr::from("syscall")))
        );
        let spans: Vec<_> = model.unit_spans(0, 1).collect();
        assert_eq!(spans[0].state.name(), Some("running"));
    }

    #[test]
    fn empty_batch_only_advances_end() {
        let mut model = TraceModel::new();
        model.ingest(Batch::new(0.0, 500.0)).expect("empty batch");
        assert_eq!(model.end(), 500.0);
        assert!(model.start().is_none());
        assert_eq!(model.batches().len(), 1);
        assert_eq!(model.unit_count(), 0);
    }

    #[test]
    fn eof_flips_once_and_rejects_later_batches() {
        let mut model = TraceModel::new();
        assert!(model.mark_eof());
        assert!(!model.mark_eof());
        assert!(matches!(
            model.ingest(first_batch()),
            Err(IngestError::AfterEof { .. })
        ));
    }

    #[test]
    fn unit_names_are_interned_across_batches() {
        let mut model = TraceModel::new();
        let mut a = Batch::new(0.0, 10.0);
        a.push_event(1, 0.0, "running");
        let mut b = Batch::new(10.0, 20.0);
        b.push_event(2, 15.0, "running");
        model.ingest(a).expect("a");
        model.ingest(b).expect("b");

        let s1 = &model.open_span(1).expect("1").state;
        let s2 = &model.open_span(2).expect("2").state;
        match (s1, s2) {
            (StateLabel::Named(x), StateLabel::Named(y)) => assert!(x.ptr_eq(y)),
            other => panic!("unexpected labels {other:?}"),
        }
    }

    #[test]
    fn unnamed_unit_gets_placeholder_then_real_name() {
        let mut model = TraceModel::new();
        let mut a = Batch::new(0.0, 10.0);
        a.push_event(9, 1.0, "running");
        model.ingest(a).expect("a");
        assert_eq!(model.unit(9).map(|u| u.name.to_string()).as_deref(), Some("goroutine 9"));

        let mut b = Batch::new(10.0, 20.0);
        b.push_event(9, 12.0, "waiting");
        let name = b.intern("net/http.(*conn).serve");
        if let Some(unit) = b.goroutines.get_mut(&9) {
            unit.name = Some(name);
        }
        model.ingest(b).expect("b");
        assert_eq!(
            model.unit(9).map(|u| u.name.to_string()).as_deref(),
            Some("net/http.(*conn).serve")
        );
    }

    #[test]
    fn batch_reach_extends_to_closing_event() {
        let mut model = TraceModel::new();
        let mut a = Batch::new(0.0, 10.0);
        a.push_event(1, 10.0, "running");
        model.ingest(a).expect("a");
        // Unit 1 is absent here; its span stays open.
        let mut b = Batch::new(11.0, 20.0);
        b.push_event(2, 11.0, "running");
        model.ingest(b).expect("b");
        let mut c = Batch::new(21.0, 30.0);
        c.push_event(1, 25.0, "waiting");
        model.ingest(c).expect("c");

        let first = &model.batches()[0];
        assert_eq!(first.reach(), 25.0);
        assert!(first.reaches_into(&TimeRange::new(22.0, 23.0)));
        let spans: Vec<_> = model.unit_spans(0, 1).collect();
        assert_eq!((spans[0].start, spans[0].end), (10.0, 25.0));
    }

    #[test]
    fn unit_without_events_is_ignored() {
        let mut model = TraceModel::new();
        let mut batch = Batch::new(0.0, 10.0);
        batch.goroutines.insert(
            4,
            WireUnit {
                name: None,
                events: Vec::new(),
                running: 3.0,
            },
        );
        batch
            .goroutines
            .insert(5, WireUnit { name: None, events: vec![WireEvent(2.0, 0.0)], running: 0.0 });
        let summary = model.ingest(batch).expect("batch");
        assert_eq!(summary.new_units, 1);
        assert!(model.unit(4).is_none());
    }
}
