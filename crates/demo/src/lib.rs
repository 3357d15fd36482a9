//! Demo apps for illuminati.
//!
//! The apps live in [`apps`]. Run them in memory with the `demo-snapshot`
//! binary, or in the browser by building this crate for `wasm32` with the
//! `web` feature.
pub mod apps;

#[cfg(feature = "web")]
use wasm_bindgen::prelude::*;

/// Mounts the app named by the `data-app` attribute of `#app`, or the
/// counter.
#[cfg(feature = "web")]
#[wasm_bindgen(start)]
pub fn web_run() -> Result<(), JsValue> {
    use illuminati::{config::Config, web::WebPage, Engine};

    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Trace).map_err(|e| JsValue::from(e.to_string()))?;

    let page = WebPage::new();
    let name = illuminati::web::document()
        .query_selector("#app")?
        .and_then(|el| el.get_attribute("data-app"))
        .unwrap_or_else(|| "counter".to_string());
    let tree = apps::app(&name, &page)
        .ok_or_else(|| JsValue::from(format!("no app called '{name}'")))?;

    let engine = Engine::new(page, Config::default());
    illuminati::web::mount(&engine, "#app", tree).map_err(|e| JsValue::from(e.to_string()))?;
    log::info!("running '{name}'");
    Ok(())
}
