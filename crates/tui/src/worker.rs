use std::io;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread;

use lanescope_core::{BatchSource, FetchRequest, Fetched, SourceError};
use tracing::debug;

type Completion = (FetchRequest, Result<Fetched, SourceError>);

/// Runs a blocking [`BatchSource`] on its own thread so the event loop never
/// waits on the network. Requests are answered in order, one at a time.
pub struct FetchWorker {
    requests: Sender<FetchRequest>,
    completions: Receiver<Completion>,
}

impl FetchWorker {
    pub fn spawn(mut source: Box<dyn BatchSource + Send>) -> io::Result<Self> {
        let (requests, inbox) = channel::<FetchRequest>();
        let (outbox, completions) = channel::<Completion>();
        thread::Builder::new()
            .name("batch-fetch".into())
            .spawn(move || {
                for request in inbox {
                    let outcome = source.next_batch(request.after_end);
                    if outbox.send((request, outcome)).is_err() {
                        break;
                    }
                }
                debug!("fetch worker stopped");
            })?;
        Ok(Self {
            requests,
            completions,
        })
    }

    /// Queue a request. Returns `false` if the worker thread is gone.
    pub fn submit(&self, request: FetchRequest) -> bool {
        self.requests.send(request).is_ok()
    }

    pub fn try_recv(&self) -> Option<Completion> {
        match self.completions.try_recv() {
            Ok(done) => Some(done),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}
