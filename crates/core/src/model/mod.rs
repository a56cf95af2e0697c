pub mod lane;
pub mod time;
pub mod trace;

pub use lane::{GroupBy, Lane, SortKey, project_lanes, reorder, sort_lanes};
pub use time::TimeRange;
pub use trace::{
    IngestError, IngestSummary, OpenSpan, Span, StateEvent, StateLabel, TraceBatch, TraceModel,
    UnitSummary, UnitTrack,
};
