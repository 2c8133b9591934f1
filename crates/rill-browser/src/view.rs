//! `MarkdownView` - the streaming view exported to JavaScript.

use std::cell::RefCell;
use std::rc::Rc;

use gloo_events::EventListener;
use gloo_timers::callback::Timeout;
use js_sys::Function;
use rill_core::{EffectJob, SideEffectRenderer, StreamingMarkdown};
use rill_renderer::RenderConfig;
use rill_renderer::utils::escaped;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Element, HtmlElement, Node};

use crate::clipboard::{JsClipboard, NavigatorClipboard};
use crate::dom::BrowserDom;
use crate::renderer::JsEffectRenderer;

type View = StreamingMarkdown<BrowserDom>;

const COPIED_LABEL_MS: u32 = 2000;

/// Streaming Markdown rendered into a host element.
///
/// ```js
/// const view = new MarkdownView(document.getElementById("answer"));
/// view.setEffectRenderer(async (source, el, { kind }) => { ... });
/// for await (const chunk of stream) view.append(chunk);
/// ```
#[wasm_bindgen]
pub struct MarkdownView {
    view: Rc<RefCell<View>>,
    effects: Rc<RefCell<Option<Rc<dyn SideEffectRenderer>>>>,
    _copy_listener: EventListener,
}

#[wasm_bindgen]
impl MarkdownView {
    /// Create a view rendering into `mount`.
    ///
    /// `config` is an optional plain object with `RenderConfig` fields.
    #[wasm_bindgen(constructor)]
    pub fn new(mount: HtmlElement, config: JsValue) -> Result<MarkdownView, JsError> {
        let config: RenderConfig = if config.is_undefined() || config.is_null() {
            RenderConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)
                .map_err(|e| JsError::new(&format!("Invalid config: {}", e)))?
        };
        let dom = BrowserDom::new().map_err(|e| JsError::new(&e.to_string()))?;
        let mount_node: Node = mount.clone().into();
        let view = Rc::new(RefCell::new(
            StreamingMarkdown::new(dom, mount_node, config).with_clipboard(NavigatorClipboard),
        ));

        let copy_listener = {
            let view = view.clone();
            EventListener::new(&mount, "click", move |event| {
                let Some(target) = event
                    .target()
                    .and_then(|target| target.dyn_into::<Element>().ok())
                else {
                    return;
                };
                let Ok(Some(button)) = target.closest(".copy-code-btn") else {
                    return;
                };
                let Ok(view) = view.try_borrow() else {
                    tracing::warn!(target: "rill::browser", "view busy, copy ignored");
                    return;
                };
                if view.copy_code(&button) {
                    show_copied(&button);
                }
            })
        };

        Ok(MarkdownView {
            view,
            effects: Rc::new(RefCell::new(None)),
            _copy_listener: copy_listener,
        })
    }

    /// Replace the whole document.
    #[wasm_bindgen(js_name = setContent)]
    pub fn set_content(&self, content: &str) {
        self.view.borrow_mut().set_content(content);
        self.drain_effects();
    }

    /// Append a streamed chunk.
    pub fn append(&self, chunk: &str) {
        self.view.borrow_mut().push_str(chunk);
        self.drain_effects();
    }

    #[wasm_bindgen(getter)]
    pub fn content(&self) -> String {
        self.view.borrow().source().to_string()
    }

    /// Register `render(text) -> html` for `<name>...</name>` blocks.
    ///
    /// The returned markup is inserted as-is; escape `text` before embedding it.
    #[wasm_bindgen(js_name = registerTag)]
    pub fn register_tag(&self, name: &str, render: Function) -> bool {
        let tag = name.to_string();
        let registered = self.view.borrow_mut().register_tag(name, move |text: &str| {
            match render.call1(&JsValue::NULL, &JsValue::from_str(text)) {
                Ok(html) => html.as_string().unwrap_or_default(),
                Err(e) => {
                    tracing::warn!(target: "rill::browser", tag = %tag, "Tag renderer threw: {:?}", e);
                    escaped(text)
                }
            }
        });
        self.drain_effects();
        registered
    }

    /// Install the diagram/math renderer and run any work queued before it.
    #[wasm_bindgen(js_name = setEffectRenderer)]
    pub fn set_effect_renderer(&self, render: Function) {
        *self.effects.borrow_mut() = Some(Rc::new(JsEffectRenderer::new(render)));
        self.drain_effects();
    }

    /// Send copied code to `write(text)` instead of the system clipboard.
    #[wasm_bindgen(js_name = setClipboard)]
    pub fn set_clipboard(&self, write: Function) {
        self.view.borrow_mut().set_clipboard(JsClipboard::new(write));
    }
}

impl MarkdownView {
    /// Spawn queued side-effect jobs. Jobs stay queued until a renderer is
    /// installed.
    fn drain_effects(&self) {
        let Some(renderer) = self.effects.borrow().clone() else {
            return;
        };
        let jobs = self.view.borrow_mut().take_effects();
        for job in jobs {
            let view = self.view.clone();
            let renderer = renderer.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let result = renderer.render(job.kind, &job.source).await;
                apply_result(&view, &job, result);
            });
        }
    }
}

fn apply_result(
    view: &RefCell<View>,
    job: &EffectJob<Node>,
    result: Result<String, rill_core::EffectError>,
) {
    let Ok(mut view) = view.try_borrow_mut() else {
        tracing::warn!(target: "rill::browser", id = job.id, "view busy, effect result dropped");
        return;
    };
    if let Err(error) = view.resolve_effect(job, result) {
        tracing::warn!(target: "rill::browser", id = job.id, %error, "could not apply effect result");
    }
}

fn show_copied(button: &Element) {
    let Ok(Some(label)) = button.query_selector(".copy-text") else {
        return;
    };
    label.set_text_content(Some("Copied!"));
    Timeout::new(COPIED_LABEL_MS, move || {
        label.set_text_content(Some("Copy"));
    })
    .forget();
}
