//! Browser front end: an egui timeline that streams batches from the
//! server it was loaded from.

mod app;
mod fetch;
mod renderer;
mod theme;

pub use app::TimelineApp;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsCast;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Id of the canvas the host page provides.
#[cfg(target_arch = "wasm32")]
const CANVAS_ID: &str = "lanescope_canvas";

#[cfg(target_arch = "wasm32")]
fn console_error(msg: &str) {
    web_sys::console::error_1(&msg.into());
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let mut config = lanescope_core::ViewerConfig::default();
    // Batches are served by the same origin as the page.
    config.endpoint = window.location().origin()?;
    let canvas = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?
        .get_element_by_id(CANVAS_ID)
        .ok_or_else(|| JsValue::from_str("no canvas element with id 'lanescope_canvas'"))?
        .dyn_into::<web_sys::HtmlCanvasElement>()?;

    web_sys::console::log_1(&format!("lanescope: streaming from {}", config.endpoint).into());
    let web_options = eframe::WebOptions::default();
    wasm_bindgen_futures::spawn_local(async move {
        let started = eframe::WebRunner::new()
            .start(
                canvas,
                web_options,
                Box::new(move |cc| Ok(Box::new(TimelineApp::new(cc, &config)))),
            )
            .await;
        if let Err(e) = started {
            console_error(&format!("lanescope: failed to start eframe: {e:?}"));
        }
    });
    Ok(())
}
