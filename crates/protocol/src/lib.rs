pub mod batch;
pub mod commands;
pub mod shared_str;
pub mod theme;
pub mod types;

pub use batch::{Batch, UnitId, WireEvent, WireUnit};
pub use commands::RenderCommand;
pub use shared_str::SharedStr;
pub use theme::ThemeToken;
pub use types::{Color, Point, Rect};
