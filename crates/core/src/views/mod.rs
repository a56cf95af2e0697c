pub mod time_axis;
pub mod timeline;

pub use time_axis::render_time_axis;
pub use timeline::{
    RenderError, RenderStats, TimelineFrame, render_lane_labels, render_timeline, state_token,
};
