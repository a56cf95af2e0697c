//! Sequential fetch scheduling.
//!
//! The stream never has more than one request outstanding. Each request is
//! keyed by the model's `end` at the time it was issued, and a completed
//! request frees the slot for the next one. Front ends with asynchronous
//! transports call [`BatchStream::poll`] and [`BatchStream::settle`], which
//! add a backoff after any failed completion; synchronous ones use
//! [`BatchStream::pump`].

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{IngestError, IngestSummary, TraceModel};
use crate::source::{BatchSource, Fetched, SourceError};

/// Seconds [`BatchStream::poll`] holds off after a failed completion.
pub const RETRY_AFTER: f64 = 2.0;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("batch ending at {end} does not advance past {after_end}")]
    Stalled { after_end: f64, end: f64 },
    #[error("completion for a request that is not in flight")]
    StaleRequest,
}

/// An outstanding fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchRequest {
    /// Fetch the first batch starting strictly after this timestamp.
    pub after_end: f64,
    seq: u64,
}

/// What a completed fetch did to the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamEvent {
    Ingested(IngestSummary),
    Finished,
}

#[derive(Debug, Clone, Default)]
pub struct BatchStream {
    in_flight: Option<FetchRequest>,
    issued: u64,
    ingested: usize,
    /// No request is issued before this time, on the caller's clock.
    retry_at: Option<f64>,
}

impl BatchStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// When the backoff after the last failure ends, if one is pending.
    pub fn retry_at(&self) -> Option<f64> {
        self.retry_at
    }

    /// Stop issuing requests for good, e.g. once the transport is gone.
    pub fn suspend(&mut self) {
        self.retry_at = Some(f64::INFINITY);
    }

    /// [`Self::next_request`] gated by the retry backoff. `now` is in
    /// seconds on any monotonic clock the caller also passes to
    /// [`Self::settle`].
    pub fn poll(&mut self, model: &TraceModel, now: f64) -> Option<FetchRequest> {
        if let Some(at) = self.retry_at {
            if now < at {
                return None;
            }
            self.retry_at = None;
        }
        self.next_request(model)
    }

    /// [`Self::complete`], then start a backoff of [`RETRY_AFTER`] seconds
    /// if the completion failed. A stale completion leaves the schedule
    /// alone since the request it answers was already settled.
    pub fn settle(
        &mut self,
        model: &mut TraceModel,
        request: FetchRequest,
        outcome: Result<Fetched, SourceError>,
        now: f64,
    ) -> Result<StreamEvent, StreamError> {
        let result = self.complete(model, request, outcome);
        match &result {
            Ok(_) => self.retry_at = None,
            Err(StreamError::StaleRequest) => {}
            Err(err) => {
                debug!(error = %err, retry_in = RETRY_AFTER, "backing off");
                self.retry_at = Some(now + RETRY_AFTER);
            }
        }
        result
    }

    /// Claim the fetch slot. `None` while a request is outstanding or once
    /// the model has reached end of data.
    pub fn next_request(&mut self, model: &TraceModel) -> Option<FetchRequest> {
        if self.in_flight.is_some() || model.is_eof() {
            return None;
        }
        self.issued += 1;
        let request = FetchRequest {
            after_end: model.end(),
            seq: self.issued,
        };
        debug!(after_end = request.after_end, seq = request.seq, "fetching batch");
        self.in_flight = Some(request);
        Some(request)
    }

    /// Apply the outcome of `request` to the model and free the slot.
    ///
    /// Transport errors are returned unchanged and nothing is scheduled;
    /// see [`Self::settle`] for the variant that backs off.
    pub fn complete(
        &mut self,
        model: &mut TraceModel,
        request: FetchRequest,
        outcome: Result<Fetched, SourceError>,
    ) -> Result<StreamEvent, StreamError> {
        if self.in_flight != Some(request) {
            return Err(StreamError::StaleRequest);
        }
        self.in_flight = None;

        match outcome {
            Err(err) => {
                warn!(error = %err, after_end = request.after_end, "batch fetch failed");
                Err(err.into())
            }
            Ok(Fetched::EndOfData) => {
                if model.mark_eof() {
                    info!(batches = self.ingested, end = model.end(), "reached end of trace");
                }
                Ok(StreamEvent::Finished)
            }
            Ok(Fetched::Batch(batch)) => {
                if batch.end <= request.after_end {
                    return Err(StreamError::Stalled {
                        after_end: request.after_end,
                        end: batch.end,
                    });
                }
                let summary = model.ingest(batch)?;
                self.ingested += 1;
                Ok(StreamEvent::Ingested(summary))
            }
        }
    }

    /// Run one fetch synchronously against `source`. Returns `Ok(None)` when
    /// there is nothing left to fetch.
    pub fn pump<S: BatchSource + ?Sized>(
        &mut self,
        source: &mut S,
        model: &mut TraceModel,
    ) -> Result<Option<StreamEvent>, StreamError> {
        let Some(request) = self.next_request(model) else {
            return Ok(None);
        };
        let outcome = source.next_batch(request.after_end);
        self.complete(model, request, outcome).map(Some)
    }

    /// Pump until end of data.
    pub fn drain<S: BatchSource + ?Sized>(
        &mut self,
        source: &mut S,
        model: &mut TraceModel,
    ) -> Result<usize, StreamError> {
        let before = self.ingested;
        while self.pump(source, model)?.is_some() {}
        Ok(self.ingested - before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanescope_protocol::Batch;

    /// Serves `count` one-event batches, then end of data, recording every
    /// cursor it was asked for.
    struct Scripted {
        count: usize,
        asked: Vec<f64>,
        fail_next: bool,
    }

    impl BatchSource for Scripted {
        fn next_batch(&mut self, after_end: f64) -> Result<Fetched, SourceError> {
            self.asked.push(after_end);
            if std::mem::take(&mut self.fail_next) {
                return Err(SourceError::Status {
                    url: "test".into(),
                    status: 500,
                });
            }
            let index = (after_end / 100.0) as usize;
            if index >= self.count {
                return Ok(Fetched::EndOfData);
            }
            let start = index as f64 * 100.0 + 1.0;
            let mut batch = Batch::new(start, start + 99.0);
            batch.push_event(1, start, "running");
            Ok(Fetched::Batch(batch))
        }
    }

    fn scripted(count: usize) -> Scripted {
        Scripted {
            count,
            asked: Vec::new(),
            fail_next: false,
        }
    }

    #[test]
    fn one_request_at_a_time() {
        let mut stream = BatchStream::new();
        let model = TraceModel::new();
        let first = stream.next_request(&model);
        assert!(first.is_some());
        assert!(stream.next_request(&model).is_none());
        assert!(stream.is_in_flight());
    }

    #[test]
    fn requests_are_keyed_by_model_end() {
        let mut stream = BatchStream::new();
        let mut model = TraceModel::new();
        let mut source = scripted(3);
        assert_eq!(stream.drain(&mut source, &mut model).expect("drain"), 3);
        assert_eq!(source.asked, vec![0.0, 100.0, 200.0, 300.0]);
        assert!(model.is_eof());
        assert_eq!(model.batches().len(), 3);
    }

    #[test]
    fn no_fetch_after_eof() {
        let mut stream = BatchStream::new();
        let mut model = TraceModel::new();
        let mut source = scripted(0);
        assert_eq!(
            stream.pump(&mut source, &mut model).expect("pump"),
            Some(StreamEvent::Finished)
        );
        assert_eq!(stream.pump(&mut source, &mut model).expect("pump"), None);
        assert_eq!(source.asked.len(), 1);
    }

    #[test]
    fn transport_error_frees_the_slot() {
        let mut stream = BatchStream::new();
        let mut model = TraceModel::new();
        let mut source = scripted(1);
        source.fail_next = true;
        assert!(matches!(
            stream.pump(&mut source, &mut model),
            Err(StreamError::Source(SourceError::Status { status: 500, .. }))
        ));
        assert!(!stream.is_in_flight());
        assert!(matches!(
            stream.pump(&mut source, &mut model),
            Ok(Some(StreamEvent::Ingested(_)))
        ));
    }

    #[test]
    fn stale_completion_is_rejected() {
        let mut stream = BatchStream::new();
        let mut model = TraceModel::new();
        let request = stream.next_request(&model).expect("request");
        stream
            .complete(&mut model, request, Ok(Fetched::EndOfData))
            .expect("complete");
        assert!(matches!(
            stream.complete(&mut model, request, Ok(Fetched::EndOfData)),
            Err(StreamError::StaleRequest)
        ));
    }

    #[test]
    fn non_advancing_batch_is_reported() {
        let mut stream = BatchStream::new();
        let mut model = TraceModel::new();
        let mut first = Batch::new(10.0, 50.0);
        first.push_event(1, 10.0, "running");
        model.ingest(first).expect("ingest");
        let request = stream.next_request(&model).expect("request");
        let again = Batch::new(10.0, 50.0);
        assert!(matches!(
            stream.complete(&mut model, request, Ok(Fetched::Batch(again))),
            Err(StreamError::Stalled { .. })
        ));
        assert_eq!(model.batches().len(), 1);
    }

    /// Answers every request with the same batch, which never moves past
    /// the model's end once it has been ingested.
    fn stuck_batch() -> Fetched {
        let mut batch = Batch::new(10.0, 50.0);
        batch.push_event(1, 10.0, "running");
        Fetched::Batch(batch)
    }

    #[test]
    fn stalled_batch_backs_off() {
        let mut stream = BatchStream::new();
        let mut model = TraceModel::new();
        let request = stream.poll(&model, 0.0).expect("request");
        stream
            .settle(&mut model, request, Ok(stuck_batch()), 0.0)
            .expect("first batch");
        assert_eq!(stream.retry_at(), None);

        let request = stream.poll(&model, 1.0).expect("request");
        assert!(matches!(
            stream.settle(&mut model, request, Ok(stuck_batch()), 1.0),
            Err(StreamError::Stalled { .. })
        ));
        assert_eq!(stream.retry_at(), Some(1.0 + RETRY_AFTER));
        assert!(stream.poll(&model, 1.5).is_none());
        assert!(stream.poll(&model, 1.0 + RETRY_AFTER).is_some());
        assert_eq!(stream.retry_at(), None);
    }

    #[test]
    fn rejected_batch_backs_off() {
        let mut stream = BatchStream::new();
        let mut model = TraceModel::new();
        model.mark_eof();
        // Ingest after eof fails inside the model, not the transport.
        let request = FetchRequest {
            after_end: model.end() - 1.0,
            seq: 1,
        };
        stream.in_flight = Some(request);
        let mut late = Batch::new(model.end(), model.end() + 10.0);
        late.push_event(1, model.end(), "running");
        assert!(matches!(
            stream.settle(&mut model, request, Ok(Fetched::Batch(late)), 3.0),
            Err(StreamError::Ingest(_))
        ));
        assert_eq!(stream.retry_at(), Some(3.0 + RETRY_AFTER));
    }

    #[test]
    fn transport_error_backs_off_until_success() {
        let mut stream = BatchStream::new();
        let mut model = TraceModel::new();
        let request = stream.poll(&model, 5.0).expect("request");
        let failure = Err(SourceError::Status {
            url: "test".into(),
            status: 503,
        });
        assert!(stream.settle(&mut model, request, failure, 5.0).is_err());
        assert!(stream.poll(&model, 6.0).is_none());

        let request = stream.poll(&model, 7.5).expect("request");
        stream
            .settle(&mut model, request, Ok(Fetched::EndOfData), 7.5)
            .expect("settle");
        assert_eq!(stream.retry_at(), None);
        assert!(stream.poll(&model, 7.5).is_none(), "eof stops fetching");
    }

    #[test]
    fn stale_settle_keeps_schedule() {
        let mut stream = BatchStream::new();
        let mut model = TraceModel::new();
        let request = stream.poll(&model, 0.0).expect("request");
        stream
            .settle(&mut model, request, Ok(stuck_batch()), 0.0)
            .expect("settle");
        assert!(matches!(
            stream.settle(&mut model, request, Ok(stuck_batch()), 0.0),
            Err(StreamError::StaleRequest)
        ));
        assert_eq!(stream.retry_at(), None);
    }

    #[test]
    fn suspended_stream_never_polls() {
        let mut stream = BatchStream::new();
        let model = TraceModel::new();
        stream.suspend();
        assert!(stream.poll(&model, f64::MAX).is_none());
        assert!(!stream.is_in_flight());
    }
}
