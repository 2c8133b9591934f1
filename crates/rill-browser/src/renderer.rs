//! Side-effect rendering through a host JavaScript function.

use async_trait::async_trait;
use js_sys::{Function, Object, Promise, Reflect};
use rill_core::{EffectError, EffectKind, SideEffectRenderer};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::Element;

/// Calls `render(source, element, { kind, display })` on the host.
///
/// `element` is a detached scratch element. The function may draw into it,
/// return markup as a string, or return a promise of either. A throw or
/// rejection becomes the effect's error box.
pub struct JsEffectRenderer {
    render: Function,
}

impl JsEffectRenderer {
    pub fn new(render: Function) -> Self {
        Self { render }
    }
}

fn error_message(error: &JsValue) -> String {
    if let Some(error) = error.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    error
        .as_string()
        .unwrap_or_else(|| "renderer rejected without a message".to_string())
}

fn options(kind: EffectKind) -> Result<Object, JsValue> {
    let options = Object::new();
    Reflect::set(&options, &"kind".into(), &kind.as_str().into())?;
    let display = matches!(kind, EffectKind::Math { display: true });
    Reflect::set(&options, &"display".into(), &display.into())?;
    Ok(options)
}

#[async_trait(?Send)]
impl SideEffectRenderer for JsEffectRenderer {
    async fn render(&self, kind: EffectKind, source: &str) -> Result<String, EffectError> {
        let scratch: Element = web_sys::window()
            .and_then(|window| window.document())
            .and_then(|document| document.create_element("div").ok())
            .ok_or(EffectError::Unavailable("document"))?;
        let options = options(kind).map_err(|e| EffectError::Rejected(error_message(&e)))?;

        let mut value = self
            .render
            .call3(&JsValue::NULL, &source.into(), &scratch, &options)
            .map_err(|e| EffectError::Rejected(error_message(&e)))?;
        if let Some(promise) = value.dyn_ref::<Promise>() {
            value = JsFuture::from(promise.clone())
                .await
                .map_err(|e| EffectError::Rejected(error_message(&e)))?;
        }

        Ok(value.as_string().unwrap_or_else(|| scratch.inner_html()))
    }
}
