use std::time::Duration;

use lanescope_core::{BatchSource, Fetched, SourceError, goroutines_url};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::debug;

/// Fetches batches from a running trace server.
///
/// The server holds a request open until the batch exists, so reads have no
/// timeout; only connecting does.
pub struct HttpSource {
    client: Client,
    base: String,
}

impl HttpSource {
    pub fn new(base: impl Into<String>) -> Result<Self, SourceError> {
        let base = base.into();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| SourceError::Transport {
                url: base.clone(),
                source: Box::new(e),
            })?;
        Ok(Self { client, base })
    }
}

impl BatchSource for HttpSource {
    fn next_batch(&mut self, after_end: f64) -> Result<Fetched, SourceError> {
        let url = goroutines_url(&self.base, after_end);
        let transport = |e: reqwest::Error| SourceError::Transport {
            url: url.clone(),
            source: Box::new(e),
        };
        let response = self.client.get(&url).send().map_err(transport)?;
        let status = response.status();
        debug!(%url, %status, "batch response");
        match status {
            StatusCode::NOT_FOUND => Ok(Fetched::EndOfData),
            s if s.is_success() => {
                let body = response.bytes().map_err(transport)?;
                Ok(Fetched::Batch(serde_json::from_slice(&body)?))
            }
            s => Err(SourceError::Status {
                url: url.clone(),
                status: s.as_u16(),
            }),
        }
    }
}
