//! One-at-a-time batch fetching for the browser and native builds.
//!
//! A fetch runs off the UI thread and parks its outcome in a shared slot;
//! the next frame picks it up. The stream scheduler guarantees there is
//! never more than one fetch outstanding, so one slot is enough.

use std::sync::{Arc, Mutex};

use lanescope_core::{FetchRequest, Fetched, SourceError, goroutines_url};

pub type Completion = (FetchRequest, Result<Fetched, SourceError>);

pub struct Fetcher {
    base: String,
    slot: Arc<Mutex<Option<Completion>>>,
    #[cfg(not(target_arch = "wasm32"))]
    client: reqwest::blocking::Client,
}

impl Fetcher {
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(base: impl Into<String>) -> Result<Self, SourceError> {
        let base = base.into();
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(5))
            .timeout(None::<std::time::Duration>)
            .build()
            .map_err(|e| SourceError::Transport {
                url: base.clone(),
                source: Box::new(e),
            })?;
        Ok(Self {
            base,
            slot: Arc::default(),
            client,
        })
    }

    #[cfg(target_arch = "wasm32")]
    pub fn new(base: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            base: base.into(),
            slot: Arc::default(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Take a finished fetch, if one is waiting.
    pub fn take(&self) -> Option<Completion> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn start(&self, request: FetchRequest, ctx: &egui::Context) {
        let url = goroutines_url(&self.base, request.after_end);
        let client = self.client.clone();
        let slot = Arc::clone(&self.slot);
        let ctx = ctx.clone();
        std::thread::spawn(move || {
            let outcome = fetch_blocking(&client, &url);
            deliver(&slot, request, outcome);
            ctx.request_repaint();
        });
    }

    #[cfg(target_arch = "wasm32")]
    pub fn start(&self, request: FetchRequest, ctx: &egui::Context) {
        let url = goroutines_url(&self.base, request.after_end);
        let slot = Arc::clone(&self.slot);
        let ctx = ctx.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let outcome = fetch_browser(&url).await;
            deliver(&slot, request, outcome);
            ctx.request_repaint();
        });
    }
}

fn deliver(
    slot: &Mutex<Option<Completion>>,
    request: FetchRequest,
    outcome: Result<Fetched, SourceError>,
) {
    *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some((request, outcome));
}

/// Interpret a finished HTTP exchange. The server answers 404 once the
/// trace has no batch past the requested start.
fn decode(url: &str, status: u16, body: &[u8]) -> Result<Fetched, SourceError> {
    match status {
        404 => Ok(Fetched::EndOfData),
        200..=299 => Ok(Fetched::Batch(serde_json::from_slice(body)?)),
        status => Err(SourceError::Status {
            url: url.to_owned(),
            status,
        }),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn fetch_blocking(client: &reqwest::blocking::Client, url: &str) -> Result<Fetched, SourceError> {
    let transport = |e: reqwest::Error| SourceError::Transport {
        url: url.to_owned(),
        source: Box::new(e),
    };
    let response = client.get(url).send().map_err(transport)?;
    let status = response.status().as_u16();
    let body = response.bytes().map_err(transport)?;
    decode(url, status, &body)
}

#[cfg(target_arch = "wasm32")]
async fn fetch_browser(url: &str) -> Result<Fetched, SourceError> {
    use wasm_bindgen::{JsCast, JsValue};
    use wasm_bindgen_futures::JsFuture;

    let transport = |e: JsValue| SourceError::Transport {
        url: url.to_owned(),
        source: format!("{e:?}").into(),
    };
    let window = web_sys::window().ok_or_else(|| transport(JsValue::from_str("no window")))?;
    let response: web_sys::Response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(transport)?
        .dyn_into()
        .map_err(transport)?;
    let buffer = JsFuture::from(response.array_buffer().map_err(transport)?)
        .await
        .map_err(transport)?;
    let body = js_sys::Uint8Array::new(&buffer).to_vec();
    decode(url, response.status(), &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_ends_the_stream() {
        assert!(matches!(
            decode("u", 404, b"no more"),
            Ok(Fetched::EndOfData)
        ));
    }

    #[test]
    fn success_body_is_a_batch() {
        let body = br#"{"id":0,"start":1,"end":5,"events":0,"goroutines":{},"strings":[""]}"#;
        match decode("u", 200, body) {
            Ok(Fetched::Batch(batch)) => assert_eq!((batch.start, batch.end), (1.0, 5.0)),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn other_statuses_are_errors() {
        assert!(matches!(
            decode("u", 500, b""),
            Err(SourceError::Status { status: 500, .. })
        ));
        assert!(matches!(decode("u", 200, b"{"), Err(SourceError::Decode(_))));
    }

    #[test]
    fn slot_holds_one_completion() {
        let fetcher = Fetcher::new("http://localhost:8080").expect("client");
        assert!(fetcher.take().is_none());
        let mut stream = lanescope_core::BatchStream::new();
        let request = stream
            .next_request(&lanescope_core::model::TraceModel::new())
            .expect("request");
        deliver(&fetcher.slot, request, Ok(Fetched::EndOfData));
        assert!(matches!(fetcher.take(), Some((_, Ok(Fetched::EndOfData)))));
        assert!(fetcher.take().is_none());
    }
}
