//! Nice-interval tick selection for the time axis.

/// Tick positions for one axis pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeTicks {
    /// Distance between consecutive ticks, in nanoseconds.
    pub interval: f64,
    /// Tick timestamps, ascending, covering the requested range.
    pub ticks: Vec<f64>,
}

const NS_PER_US: f64 = 1_000.0;
const NS_PER_MS: f64 = 1_000_000.0;
const NS_PER_S: f64 = 1_000_000_000.0;
const NS_PER_MIN: f64 = 60.0 * NS_PER_S;
const NS_PER_HOUR: f64 = 60.0 * NS_PER_MIN;

/// Candidate intervals in nanoseconds: 1-2-5 steps through seconds, then
/// clock-friendly steps up to an hour.
const NICE_INTERVALS: &[f64] = &[
    1.0,
    2.0,
    5.0,
    10.0,
    20.0,
    50.0,
    100.0,
    200.0,
    500.0,
    NS_PER_US,
    2.0 * NS_PER_US,
    5.0 * NS_PER_US,
    10.0 * NS_PER_US,
    20.0 * NS_PER_US,
    50.0 * NS_PER_US,
    100.0 * NS_PER_US,
    200.0 * NS_PER_US,
    500.0 * NS_PER_US,
    NS_PER_MS,
    2.0 * NS_PER_MS,
    5.0 * NS_PER_MS,
    10.0 * NS_PER_MS,
    20.0 * NS_PER_MS,
    50.0 * NS_PER_MS,
    100.0 * NS_PER_MS,
    200.0 * NS_PER_MS,
    500.0 * NS_PER_MS,
    NS_PER_S,
    2.0 * NS_PER_S,
    5.0 * NS_PER_S,
    10.0 * NS_PER_S,
    15.0 * NS_PER_S,
    30.0 * NS_PER_S,
    NS_PER_MIN,
    2.0 * NS_PER_MIN,
    5.0 * NS_PER_MIN,
    10.0 * NS_PER_MIN,
    15.0 * NS_PER_MIN,
    30.0 * NS_PER_MIN,
    NS_PER_HOUR,
];

/// Upper bound on emitted ticks, whatever the caller asks for.
const MAX_TICKS: usize = 1_000;

/// Pick a nice interval giving roughly `target_count` ticks over
/// `[start, end]` and list the ticks.
///
/// The first tick is at or before `start` and the last at or after `end`, so
/// both ends are covered. Returns `None` for an empty or non-finite range.
pub fn generate_time_ticks(start: f64, end: f64, target_count: usize) -> Option<TimeTicks> {
    if !(start.is_finite() && end.is_finite()) || end <= start {
        return None;
    }
    let target = target_count.clamp(1, MAX_TICKS) as f64;
    let interval = nice_interval((end - start) / target);

    let first = (start / interval).floor();
    let last = (end / interval).ceil();
    let count = ((last - first) as usize + 1).min(MAX_TICKS + 1);
    let ticks = (0..count)
        .map(|i| (first + i as f64) * interval)
        .collect();
    Some(TimeTicks { interval, ticks })
}

/// Smallest candidate not below `raw`.
fn nice_interval(raw: f64) -> f64 {
    if let Some(&interval) = NICE_INTERVALS.iter().find(|&&i| i >= raw) {
        return interval;
    }
    // Longer than an hour per tick: fall back to 1-2-5 multiples of hours.
    let hours = raw / NS_PER_HOUR;
    let magnitude = 10.0_f64.powf(hours.log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .into_iter()
        .map(|m| m * magnitude)
        .find(|&s| s >= hours)
        .unwrap_or(10.0 * magnitude);
    step * NS_PER_HOUR
}

/// Label for a tick. The unit follows the interval, so every label on one
/// axis shares a unit.
pub fn format_tick_label(ns: f64, interval: f64) -> String {
    if interval >= NS_PER_MIN {
        let total_secs = (ns / NS_PER_S).round() as i64;
        let (mins, secs) = (total_secs / 60, total_secs % 60);
        if mins >= 60 {
            return format!("{}h{:02}m{:02}s", mins / 60, mins % 60, secs);
        }
        return format!("{mins}m{secs:02}s");
    }
    let (unit, scale) = if interval >= NS_PER_S {
        ("s", NS_PER_S)
    } else if interval >= NS_PER_MS {
        ("ms", NS_PER_MS)
    } else if interval >= NS_PER_US {
        ("µs", NS_PER_US)
    } else {
        ("ns", 1.0)
    };
    let decimals = decimals_for(interval / scale);
    format!("{:.*}{unit}", decimals, ns / scale)
}

/// Decimal places needed to tell adjacent ticks apart.
fn decimals_for(step: f64) -> usize {
    if step >= 1.0 || step <= 0.0 {
        0
    } else {
        (-step.log10().floor()) as usize
    }
}
