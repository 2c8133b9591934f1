//! Browser clipboard implementations.

use js_sys::Function;
use rill_core::ClipboardPlatform;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

/// Writes through `navigator.clipboard.writeText`.
pub struct NavigatorClipboard;

impl ClipboardPlatform for NavigatorClipboard {
    fn write_text(&self, text: &str) {
        let Some(window) = web_sys::window() else {
            tracing::warn!(target: "rill::browser", "no window, clipboard write skipped");
            return;
        };
        let promise = window.navigator().clipboard().write_text(text);
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(e) = JsFuture::from(promise).await {
                tracing::warn!(target: "rill::browser", "Clipboard write failed: {:?}", e);
            }
        });
    }
}

/// Hands copied text to a host callback instead of the system clipboard.
pub struct JsClipboard {
    write: Function,
}

impl JsClipboard {
    pub fn new(write: Function) -> Self {
        Self { write }
    }
}

impl ClipboardPlatform for JsClipboard {
    fn write_text(&self, text: &str) {
        if let Err(e) = self.write.call1(&JsValue::NULL, &JsValue::from_str(text)) {
            tracing::warn!(target: "rill::browser", "Clipboard callback threw: {:?}", e);
        }
    }
}
