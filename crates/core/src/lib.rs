//! Streaming goroutine timeline: trace aggregation, lane layout, viewport
//! math and draw-command views, independent of any front end.

pub mod config;
pub mod input;
pub mod model;
pub mod source;
pub mod stream;
pub mod svg;
pub mod ticks;
pub mod viewport;
pub mod views;

pub use config::{ConfigError, ViewerConfig};
pub use input::{KeyboardState, PanKey};
pub use source::{
    BatchSource, Fetched, RecordedSource, SourceError, SyntheticConfig, SyntheticSource,
    goroutines_url,
};
pub use stream::{BatchStream, FetchRequest, RETRY_AFTER, StreamError, StreamEvent};
pub use viewport::ViewportController;
