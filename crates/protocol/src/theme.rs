use serde::{Deserialize, Serialize};

use crate::types::Color;

/// Semantic color tokens resolved by the renderer's active theme.
///
/// The `State*` tokens are not themeable: every renderer must paint them with
/// [`ThemeToken::fixed_color`] so the timeline looks the same everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThemeToken {
    StateRunning,
    StateRunnable,
    StateWaiting,
    StateNotExist,
    StateSyscall,

    BatchBoundary,

    AxisBackground,
    AxisTick,
    AxisLabel,

    TextMuted,

    Background,
}

impl ThemeToken {
    /// The fixed color of a state token, `None` for themeable tokens.
    pub const fn fixed_color(self) -> Option<Color> {
        match self {
            Self::StateRunning => Some(Color::rgb(0xa0, 0xc4, 0xff)),
            Self::StateRunnable => Some(Color::rgb(0xff, 0xad, 0xad)),
            Self::StateWaiting | Self::StateNotExist => Some(Color::rgb(0xdd, 0xdd, 0xdd)),
            Self::StateSyscall => Some(Color::rgb(0xfd, 0xff, 0xb6)),
            _ => None,
        }
    }
}
