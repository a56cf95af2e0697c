use std::io::{Stdout, stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::{
        self, Event, KeyCode, KeyEvent, KeyEventKind, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
        supports_keyboard_enhancement,
    },
};
use lanescope_core::PanKey;
use lanescope_protocol::{RenderCommand, ThemeToken};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    buffer::{Buffer, Cell},
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Paragraph},
};
use tracing::debug;

use crate::app::{Action, App};
use crate::worker::FetchWorker;

const AXIS_ROWS: u16 = 2;
const MAX_GUTTER: u16 = 24;

fn theme_to_color(token: ThemeToken) -> Color {
    if let Some(c) = token.fixed_color() {
        return Color::Rgb(c.r, c.g, c.b);
    }
    match token {
        ThemeToken::BatchBoundary => Color::Black,
        ThemeToken::AxisBackground => Color::DarkGray,
        ThemeToken::AxisTick => Color::Gray,
        ThemeToken::AxisLabel => Color::White,
        ThemeToken::TextMuted => Color::Gray,
        _ => Color::Black,
    }
}

/// Owns the terminal for the lifetime of the viewer. Raw mode, the
/// alternate screen and keyboard enhancement flags are restored on drop,
/// whichever way the event loop exits.
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    enhanced: bool,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        let mut out = stdout();
        execute!(out, EnterAlternateScreen)?;
        let enhanced = supports_keyboard_enhancement().unwrap_or(false);
        if enhanced {
            execute!(
                out,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        }
        let terminal = Terminal::new(CrosstermBackend::new(out))?;
        Ok(Self { terminal, enhanced })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = execute!(self.terminal.backend_mut(), PopKeyboardEnhancementFlags);
        }
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

pub fn map_key(key: KeyEvent) -> Option<Action> {
    let pan = match key.code {
        KeyCode::Char(c) => PanKey::from_char(c),
        KeyCode::Left => Some(PanKey::Backward),
        KeyCode::Right => Some(PanKey::Forward),
        KeyCode::Up => Some(PanKey::Up),
        KeyCode::Down => Some(PanKey::Down),
        _ => None,
    };
    if let Some(pan) = pan {
        return Some(match key.kind {
            KeyEventKind::Release => Action::Release(pan),
            KeyEventKind::Press | KeyEventKind::Repeat => Action::Hold(pan),
        });
    }
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Char('0') => Some(Action::Reset),
        KeyCode::Char('g') => Some(Action::CycleGroup),
        KeyCode::Char('o') => Some(Action::CycleSort),
        KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
        _ => None,
    }
}

pub fn run(app: &mut App, worker: &FetchWorker) -> Result<()> {
    let mut guard = TerminalGuard::enter()?;
    app.set_release_events(guard.enhanced);
    let clock = Instant::now();

    loop {
        let now = clock.elapsed().as_secs_f64();
        if let Some(request) = app.next_request(now)
            && !worker.submit(request)
        {
            app.on_source_closed();
        }
        while let Some((request, outcome)) = worker.try_recv() {
            app.on_fetched(request, outcome, clock.elapsed().as_secs_f64());
        }
        app.tick(now);

        let size = guard.terminal.size()?;
        let layout = Layout::new(Rect::new(0, 0, size.width, size.height));
        let frame = app.render(layout.timeline.width, layout.timeline.height);
        let status = app.status_line();

        guard.terminal.draw(|f| {
            f.render_widget(
                Paragraph::new(status.as_str())
                    .style(Style::default().fg(Color::White).bg(Color::DarkGray)),
                layout.header,
            );
            f.render_widget(
                Block::default().style(Style::default().bg(Color::Black)),
                layout.body,
            );
            let buf = f.buffer_mut();
            paint(buf, layout.axis, &frame.axis);
            paint(buf, layout.gutter, &frame.labels);
            paint(buf, layout.timeline, &frame.timeline);
        })?;

        if app.should_quit() {
            break;
        }

        let timeout = if app.is_animating() {
            Duration::from_millis(16)
        } else {
            Duration::from_millis(100)
        };
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && let Some(action) = map_key(key)
        {
            debug!(?action, "key");
            app.handle(action, clock.elapsed().as_secs_f64());
        }
    }

    drop(guard);
    Ok(())
}

/// Screen regions: status row, axis above the timeline, label gutter left of
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    header: Rect,
    body: Rect,
    axis: Rect,
    gutter: Rect,
    timeline: Rect,
}

impl Layout {
    fn new(area: Rect) -> Self {
        let header = Rect::new(area.x, area.y, area.width, area.height.min(1));
        let body = Rect::new(
            area.x,
            area.y + header.height,
            area.width,
            area.height.saturating_sub(header.height),
        );
        let gutter_w = (body.width / 4).min(MAX_GUTTER);
        let axis_h = AXIS_ROWS.min(body.height);
        let axis = Rect::new(
            body.x + gutter_w,
            body.y,
            body.width.saturating_sub(gutter_w),
            axis_h,
        );
        let rows = body.height.saturating_sub(axis_h);
        let gutter = Rect::new(body.x, body.y + axis_h, gutter_w, rows);
        let timeline = Rect::new(axis.x, body.y + axis_h, axis.width, rows);
        Self {
            header,
            body,
            axis,
            gutter,
            timeline,
        }
    }
}

/// Rasterize commands into `area`: one column per unit of x, one row per
/// unit of y.
fn paint(buf: &mut Buffer, area: Rect, commands: &[RenderCommand]) {
    for cmd in commands {
        match cmd {
            RenderCommand::ClearRect { rect } => {
                for y in rows(rect.y, rect.h) {
                    for x in cols(rect.x, rect.w) {
                        if let Some(c) = cell_at(buf, area, x, y) {
                            c.set_char(' ').set_bg(Color::Black);
                        }
                    }
                }
            }
            RenderCommand::DrawRect { rect, color, .. } => {
                let bg = theme_to_color(*color);
                for y in rows(rect.y, rect.h) {
                    for x in cols(rect.x, rect.w) {
                        if let Some(c) = cell_at(buf, area, x, y) {
                            c.set_char(' ').set_bg(bg);
                        }
                    }
                }
            }
            RenderCommand::DrawLine {
                from, to, color, ..
            } => {
                let fg = theme_to_color(*color);
                if (from.x - to.x).abs() < 0.5 {
                    for y in rows(from.y.min(to.y), (to.y - from.y).abs()) {
                        if let Some(c) = cell_at(buf, area, from.x.floor(), y) {
                            c.set_char('│').set_fg(fg);
                        }
                    }
                } else {
                    for x in cols(from.x.min(to.x), (to.x - from.x).abs()) {
                        if let Some(c) = cell_at(buf, area, x, from.y.floor()) {
                            c.set_char('─').set_fg(fg);
                        }
                    }
                }
            }
            RenderCommand::DrawText {
                position,
                text,
                color,
                ..
            } => {
                let fg = theme_to_color(*color);
                let y = position.y.floor();
                for (i, ch) in text.chars().enumerate() {
                    if let Some(c) = cell_at(buf, area, position.x.floor() + i as f64, y) {
                        c.set_char(ch).set_fg(fg);
                    }
                }
            }
        }
    }
}

fn cell_at(buf: &mut Buffer, area: Rect, x: f64, y: f64) -> Option<&mut Cell> {
    if x < 0.0 || y < 0.0 || x >= f64::from(area.width) || y >= f64::from(area.height) {
        return None;
    }
    Some(&mut buf[(area.x + x as u16, area.y + y as u16)])
}

/// Cell rows covered by `[y, y + h)`, at least one.
fn rows(y: f64, h: f64) -> impl Iterator<Item = f64> {
    span_cells(y, h)
}

fn cols(x: f64, w: f64) -> impl Iterator<Item = f64> {
    span_cells(x, w)
}

fn span_cells(start: f64, len: f64) -> impl Iterator<Item = f64> {
    let first = start.floor().max(-1.0);
    let last = (start + len).ceil().max(first + 1.0).min(f64::from(u16::MAX));
    (first as i32..last as i32).map(f64::from)
}
