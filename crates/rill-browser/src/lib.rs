//! Browser layer for rill streaming Markdown views.
//!
//! Provides the `web_sys` implementation of `DomMutator` and the
//! `MarkdownView` class exported to JavaScript. It assumes a
//! `wasm32-unknown-unknown` target environment.
//!
//! - `dom`: `BrowserDom`, node-level mutations on the live document
//! - `renderer`: diagram and math rendering through a host JS function
//! - `clipboard`: `navigator.clipboard` or a host callback
//! - `view`: `MarkdownView`, content setter, tag registration and copy buttons

pub mod clipboard;
pub mod dom;
pub mod renderer;
pub mod view;

pub use clipboard::{JsClipboard, NavigatorClipboard};
pub use dom::BrowserDom;
pub use renderer::JsEffectRenderer;
pub use view::MarkdownView;

use wasm_bindgen::prelude::*;

/// Install the panic hook and route `tracing` output to the console.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    use tracing::Level;
    use tracing::subscriber::set_global_default;
    use tracing_subscriber::Registry;
    use tracing_subscriber::layer::SubscriberExt;

    let console_level = if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let wasm_layer = tracing_wasm::WASMLayer::new(
        tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(console_level)
            .build(),
    );

    // A host may already have installed a subscriber.
    let _ = set_global_default(Registry::default().with(wasm_layer));
}
