use lanescope_protocol::{Color, ThemeToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeMode {
    Dark,
    Light,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    pub fn visuals(self) -> egui::Visuals {
        match self {
            Self::Dark => dark_visuals(),
            Self::Light => light_visuals(),
        }
    }
}

/// Resolve a token for painting. State tokens ignore the mode.
pub fn resolve(token: ThemeToken, mode: ThemeMode) -> egui::Color32 {
    let c = token.fixed_color().unwrap_or_else(|| match mode {
        ThemeMode::Dark => resolve_dark(token),
        ThemeMode::Light => resolve_light(token),
    });
    egui::Color32::from_rgba_unmultiplied(c.r, c.g, c.b, c.a)
}

fn resolve_dark(token: ThemeToken) -> Color {
    use ThemeToken::*;
    match token {
        BatchBoundary => Color::rgb(0x00, 0x00, 0x00),

        AxisBackground => Color::rgb(0x18, 0x18, 0x25),
        AxisTick => Color::rgb(0x6c, 0x70, 0x86),
        AxisLabel => Color::rgb(0xba, 0xc2, 0xde),

        TextMuted => Color::rgb(0xa6, 0xad, 0xc8),

        Background => Color::rgb(0x11, 0x11, 0x1b),

        // Fixed colors, handled by the caller.
        StateRunning | StateRunnable | StateWaiting | StateNotExist | StateSyscall => {
            Color::rgb(0xff, 0x00, 0xff)
        }
    }
}

fn resolve_light(token: ThemeToken) -> Color {
    use ThemeToken::*;
    match token {
        BatchBoundary => Color::rgb(0, 0, 0),

        AxisBackground => Color::rgb(240, 240, 245),
        AxisTick => Color::rgb(140, 140, 150),
        AxisLabel => Color::rgb(60, 60, 70),

        TextMuted => Color::rgb(100, 100, 110),

        Background => Color::rgb(255, 255, 255),

        StateRunning | StateRunnable | StateWaiting | StateNotExist | StateSyscall => {
            Color::rgb(255, 0, 255)
        }
    }
}

fn dark_visuals() -> egui::Visuals {
    let mut v = egui::Visuals::dark();
    v.panel_fill = egui::Color32::from_rgb(0x18, 0x18, 0x25);
    v.window_fill = egui::Color32::from_rgb(0x1e, 0x1e, 0x2e);
    v.extreme_bg_color = egui::Color32::from_rgb(0x11, 0x11, 0x1b);
    v.widgets.inactive.bg_fill = egui::Color32::from_rgb(0x45, 0x47, 0x5a);
    v.widgets.hovered.bg_fill = egui::Color32::from_rgb(0x58, 0x5b, 0x70);
    v.widgets.active.bg_fill = egui::Color32::from_rgb(0x89, 0xb4, 0xfa);
    v.error_fg_color = egui::Color32::from_rgb(0xf3, 0x8b, 0xa8);
    v
}

fn light_visuals() -> egui::Visuals {
    let mut v = egui::Visuals::light();
    v.panel_fill = egui::Color32::from_rgb(250, 250, 252);
    v.window_fill = egui::Color32::from_rgb(255, 255, 255);
    v.widgets.inactive.bg_fill = egui::Color32::from_rgb(230, 230, 235);
    v.widgets.hovered.bg_fill = egui::Color32::from_rgb(220, 220, 228);
    v.widgets.active.bg_fill = egui::Color32::from_rgb(50, 110, 220);
    v.error_fg_color = egui::Color32::from_rgb(211, 47, 47);
    v
}
