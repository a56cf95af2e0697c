//! Held-key tracking for continuous panning.
//!
//! There is exactly one `KeyboardState` per mounted timeline. Front ends
//! feed it key transitions and call [`KeyboardState::tick`] from their frame
//! loop; when the view goes away they call [`KeyboardState::release_all`] so
//! nothing keeps animating.

use std::collections::BTreeSet;

/// Keys that drive continuous viewport motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PanKey {
    /// `a`: earlier in time.
    Backward,
    /// `d`: later in time.
    Forward,
    /// `w`: narrow the time window.
    ZoomIn,
    /// `s`: widen the time window.
    ZoomOut,
    Up,
    Down,
}

impl PanKey {
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'a' => Some(Self::Backward),
            'd' => Some(Self::Forward),
            'w' => Some(Self::ZoomIn),
            's' => Some(Self::ZoomOut),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeyboardState {
    held: BTreeSet<PanKey>,
    last_tick: Option<f64>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, key: PanKey) {
        self.held.insert(key);
    }

    pub fn release(&mut self, key: PanKey) {
        self.held.remove(&key);
        if self.held.is_empty() {
            self.last_tick = None;
        }
    }

    /// Mirror a polled key state (for frameworks that report "is down").
    pub fn set_held(&mut self, key: PanKey, down: bool) {
        if down {
            self.press(key);
        } else {
            self.release(key);
        }
    }

    pub fn release_all(&mut self) {
        self.held.clear();
        self.last_tick = None;
    }

    pub fn is_held(&self, key: PanKey) -> bool {
        self.held.contains(&key)
    }

    pub fn any_held(&self) -> bool {
        !self.held.is_empty()
    }

    /// Advance the animation clock to `now` (monotonic seconds).
    ///
    /// Returns the seconds elapsed since the previous tick while at least one
    /// key is held, `None` otherwise. The first tick after a press yields
    /// zero, and releasing every key resets the clock, so motion never
    /// carries over between presses.
    pub fn tick(&mut self, now: f64) -> Option<f64> {
        if self.held.is_empty() {
            self.last_tick = None;
            return None;
        }
        let elapsed = self.last_tick.map_or(0.0, |prev| (now - prev).max(0.0));
        self.last_tick = Some(now);
        Some(elapsed)
    }
}
