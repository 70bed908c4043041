pub mod core;
pub mod services;
pub mod utils;
#[cfg(target_arch = "wasm32")]
pub mod ui;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use leptos::*;

/// Mounts the browser front-end against the given story backend.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn start(backend_endpoint: String) {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).unwrap_or(());

    let config = crate::core::config::Config {
        backend_endpoint,
        ..Default::default()
    };

    leptos::mount_to_body(move || {
        use crate::ui::App;
        view! { <App config=config.clone()/> }
    });
}
