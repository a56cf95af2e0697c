//! Wire format of one page of a goroutine trace, as served by
//! `GET /goroutines.json?start=<end>`.
//!
//! The producer encodes every number as a float64, so timestamps and string
//! indices are `f64` here and validated when the batch is ingested.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Stable identifier of an execution unit (goroutine id).
pub type UnitId = u64;

/// One page of trace data.
///
/// `strings` is a symbol table local to this batch: the same index may name
/// different strings in different batches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub id: f64,
    pub start: f64,
    pub end: f64,
    /// Number of state transitions the producer packed into this batch.
    #[serde(default)]
    pub events: u64,
    #[serde(default)]
    pub goroutines: BTreeMap<UnitId, WireUnit>,
    #[serde(default)]
    pub strings: Vec<String>,
    /// Non-empty when the producer hit a decode error after this batch.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(skip)]
    string_ids: HashMap<String, usize>,
}

/// Equality over the wire fields; the intern cache is not part of a batch's
/// value.
impl PartialEq for Batch {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.start == other.start
            && self.end == other.end
            && self.events == other.events
            && self.goroutines == other.goroutines
            && self.strings == other.strings
            && self.error == other.error
    }
}

/// A unit's slice of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireUnit {
    /// Index into the batch string table; absent when the producer did not
    /// attach a name in this batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<f64>,
    #[serde(default)]
    pub events: Vec<WireEvent>,
    /// Nanoseconds spent running within this batch.
    #[serde(default)]
    pub running: f64,
}

/// `[timestampNanos, stateIndex]`: at this instant the unit entered the
/// state named by `strings[stateIndex]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireEvent(pub f64, pub f64);

impl WireEvent {
    pub fn timestamp(&self) -> f64 {
        self.0
    }

    pub fn state_index(&self) -> f64 {
        self.1
    }
}

/// Convert a float-encoded string index to `usize`, rejecting negatives,
/// fractions and non-finite values.
pub fn string_index(raw: f64) -> Option<usize> {
    if raw.is_finite() && raw >= 0.0 && raw.fract() == 0.0 && raw <= f64::from(u32::MAX) {
        Some(raw as usize)
    } else {
        None
    }
}

impl Batch {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            ..Self::default()
        }
    }

    /// Resolve a float-encoded index against this batch's string table.
    pub fn string(&self, raw: f64) -> Option<&str> {
        string_index(raw)
            .and_then(|i| self.strings.get(i))
            .map(String::as_str)
    }

    /// Return the table index of `s`, appending it if needed.
    pub fn intern(&mut self, s: &str) -> f64 {
        if self.string_ids.len() != self.strings.len() {
            self.string_ids = self
                .strings
                .iter()
                .enumerate()
                .map(|(i, s)| (s.clone(), i))
                .collect();
        }
        if let Some(&id) = self.string_ids.get(s) {
            return id as f64;
        }
        let id = self.strings.len();
        self.strings.push(s.to_owned());
        self.string_ids.insert(s.to_owned(), id);
        id as f64
    }

    /// Append a state transition for `unit`, creating its entry on first use.
    pub fn push_event(&mut self, unit: UnitId, timestamp: f64, state: &str) {
        let state = self.intern(state);
        self.goroutines
            .entry(unit)
            .or_default()
            .events
            .push(WireEvent(timestamp, state));
        self.events += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.goroutines.is_empty()
    }
}

impl WireUnit {
    /// Earliest and latest event timestamps, or `None` without events.
    ///
    /// Computed over every event rather than first/last so a producer that
    /// emits a unit's events out of order still yields correct bounds.
    pub fn time_bounds(&self) -> Option<(f64, f64)> {
        self.events.iter().fold(None, |acc, ev| {
            let t = ev.timestamp();
            Some(match acc {
                None => (t, t),
                Some((lo, hi)) => (f64::min(lo, t), f64::max(hi, t)),
            })
        })
    }
}
