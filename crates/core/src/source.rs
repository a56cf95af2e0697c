//! Where batches come from.
//!
//! A source answers one question: "give me the first batch that starts after
//! this timestamp". Running out of batches is an answer, not an error.

use std::collections::BTreeMap;
use std::io::Read;

use lanescope_protocol::{Batch, UnitId, WireUnit};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("malformed batch: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Outcome of one successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Batch(Batch),
    EndOfData,
}

pub trait BatchSource {
    /// Fetch the first batch whose `start` is strictly greater than
    /// `after_end`, or [`Fetched::EndOfData`] if there is none.
    fn next_batch(&mut self, after_end: f64) -> Result<Fetched, SourceError>;
}

impl<S: BatchSource + ?Sized> BatchSource for Box<S> {
    fn next_batch(&mut self, after_end: f64) -> Result<Fetched, SourceError> {
        (**self).next_batch(after_end)
    }
}

/// URL of the batch endpoint for a given cursor. The server parses `start`
/// as an integer, so fractional cursors are floored.
pub fn goroutines_url(base: &str, start: f64) -> String {
    let start = if start.is_finite() { start.floor() as i64 } else { 0 };
    format!("{}/goroutines.json?start={start}", base.trim_end_matches('/'))
}

/// Replays batches previously captured from the endpoint.
#[derive(Debug, Clone, Default)]
pub struct RecordedSource {
    batches: Vec<Batch>,
}

impl RecordedSource {
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches }
    }

    /// Parse a stream of concatenated (or newline-separated) batch documents.
    pub fn from_json_str(src: &str) -> Result<Self, SourceError> {
        let batches = serde_json::Deserializer::from_str(src)
            .into_iter::<Batch>()
            .collect::<Result<Vec<_>, _>>()?;
        debug!(batches = batches.len(), "loaded recorded trace");
        Ok(Self::new(batches))
    }

    pub fn from_reader(mut reader: impl Read) -> Result<Self, SourceError> {
        let mut src = String::new();
        reader.read_to_string(&mut src)?;
        Self::from_json_str(&src)
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl BatchSource for RecordedSource {
    fn next_batch(&mut self, after_end: f64) -> Result<Fetched, SourceError> {
        Ok(self
            .batches
            .iter()
            .find(|b| b.start > after_end)
            .cloned()
            .map_or(Fetched::EndOfData, Fetched::Batch))
    }
}

/// Shape of a generated trace.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub seed: u32,
    pub units: usize,
    pub batches: usize,
    /// Nanoseconds covered by each batch.
    pub batch_span: f64,
    /// Mean time a unit stays in one state, in nanoseconds.
    pub mean_state: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 1234,
            units: 100,
            batches: 20,
            batch_span: 1_000_000.0,
            mean_state: 20_000.0,
        }
    }
}

/// Timestamp of the first generated batch. Non-zero so that the initial
/// `start=0` request finds it.
const SYNTHETIC_EPOCH: f64 = 1_000_000.0;

const NAMES: &[&str] = &[
    "main.main",
    "net/http.(*Server).Serve",
    "net/http.(*conn).serve",
    "runtime.gcBgMarkWorker",
    "database/sql.(*DB).connectionOpener",
    "time.Sleep",
];

/// Deterministic generator of goroutine state machines, paged into batches
/// the same way the trace server pages a real trace.
///
/// Units cycle unscheduled -> running -> waiting / syscall / unscheduled with
/// exponentially distributed state durations.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: Lcg,
    units: Vec<UnitCursor>,
    /// Index of the next batch the generator will produce.
    cursor: usize,
}

#[derive(Debug, Clone)]
struct UnitCursor {
    name: &'static str,
    next_change: f64,
    state: &'static str,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let mut source = Self {
            rng: Lcg::new(config.seed),
            config,
            units: Vec::new(),
            cursor: 0,
        };
        source.rewind();
        source
    }

    /// Start time of batch `index`.
    pub fn batch_start(&self, index: usize) -> f64 {
        SYNTHETIC_EPOCH + index as f64 * self.config.batch_span
    }

    fn rewind(&mut self) {
        self.rng = Lcg::new(self.config.seed);
        self.cursor = 0;
        let spawn_window = self.config.batch_span * self.config.batches as f64 / 2.0;
        let mut units = Vec::with_capacity(self.config.units);
        for i in 0..self.config.units {
            let (name, spawn) = if i == 0 {
                (NAMES[0], 0.0)
            } else {
                let pick = 1 + (self.rng.next_f64() * (NAMES.len() - 1) as f64) as usize;
                let name = NAMES.get(pick).copied().unwrap_or(NAMES[1]);
                (name, self.rng.next_f64() * spawn_window)
            };
            units.push(UnitCursor {
                name,
                next_change: SYNTHETIC_EPOCH + spawn,
                state: next_state(&mut self.rng, None),
            });
        }
        self.units = units;
    }

    /// Produce batch `self.cursor` and advance.
    fn generate(&mut self) -> Batch {
        let start = self.batch_start(self.cursor);
        // Inclusive window, so the next batch starts strictly after our end.
        let end = start + self.config.batch_span - 1.0;
        let mut batch = Batch::new(start, end);
        batch.id = self.cursor as f64;
        // Index 0 is the empty string, as in server-produced batches.
        batch.intern("");
        let mean = self.config.mean_state;

        for (id, unit) in self.units.iter_mut().enumerate() {
            let id = id as UnitId + 1;
            let mut prev: Option<(f64, &str)> = None;
            while unit.next_change <= end {
                let at = unit.next_change.max(start);
                batch.push_event(id, at, unit.state);
                if let Some((prev_at, "running")) = prev {
                    add_running(&mut batch.goroutines, id, at - prev_at);
                }
                prev = Some((at, unit.state));
                unit.next_change = at + exponential(&mut self.rng, mean).max(1.0);
                unit.state = next_state(&mut self.rng, Some(unit.state));
            }
            if let Some((prev_at, "running")) = prev {
                add_running(&mut batch.goroutines, id, end - prev_at);
            }
            if prev.is_some() {
                let name = batch.intern(unit.name);
                if let Some(wire) = batch.goroutines.get_mut(&id) {
                    wire.name = Some(name);
                }
            }
        }
        self.cursor += 1;
        batch
    }
}

fn add_running(goroutines: &mut BTreeMap<UnitId, WireUnit>, id: UnitId, ns: f64) {
    if let Some(wire) = goroutines.get_mut(&id) {
        wire.running += ns.max(0.0);
    }
}

impl BatchSource for SyntheticSource {
    fn next_batch(&mut self, after_end: f64) -> Result<Fetched, SourceError> {
        let span = self.config.batch_span;
        if !(span > 0.0) {
            return Ok(Fetched::EndOfData);
        }
        // First batch index whose start is strictly after the cursor.
        let wanted = if after_end < SYNTHETIC_EPOCH {
            0
        } else {
            ((after_end - SYNTHETIC_EPOCH) / span).floor() as usize + 1
        };
        if wanted >= self.config.batches {
            return Ok(Fetched::EndOfData);
        }
        if wanted < self.cursor {
            self.rewind();
        }
        while self.cursor < wanted {
            self.generate();
        }
        Ok(Fetched::Batch(self.generate()))
    }
}

/// The 32-bit linear congruential generator used for demo data.
#[derive(Debug, Clone, Copy)]
struct Lcg(u32);

impl Lcg {
    fn new(seed: u32) -> Self {
        Self(seed)
    }

    /// Uniform in `[0, 1)`.
    fn next_f64(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        f64::from(self.0) / 4_294_967_296.0
    }
}

fn exponential(rng: &mut Lcg, mean: f64) -> f64 {
    -mean * (1.0 - rng.next_f64()).ln()
}

fn next_state(rng: &mut Lcg, current: Option<&str>) -> &'static str {
    match current {
        Some("running") => {
            let roll = rng.next_f64();
            if roll < 0.1 {
                "syscall"
            } else if roll < 0.2 {
                "unscheduled"
            } else {
                "waiting"
            }
        }
        Some("syscall") => "unscheduled",
        Some("unscheduled") | Some("waiting") => "running",
        _ => "unscheduled",
    }
}
