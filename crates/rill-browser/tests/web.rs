//! WASM browser tests for rill-browser.
//!
//! Run with: `wasm-pack test --headless --firefox` or `--chrome`

#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use rill_browser::BrowserDom;
use rill_core::{DomMutator, EffectError, EffectKind, EffectOutcome, SideEffectRenderer, StreamingMarkdown};
use rill_renderer::RenderConfig;
use wasm_bindgen::JsCast;
use wasm_bindgen_test::*;
use web_sys::{Element, Node};

wasm_bindgen_test_configure!(run_in_browser);

fn mount() -> Node {
    let document = web_sys::window().unwrap().document().unwrap();
    let div = document.create_element("div").unwrap();
    document.body().unwrap().append_child(&div).unwrap();
    div.into()
}

fn view() -> (StreamingMarkdown<BrowserDom>, Element) {
    let mount = mount();
    let element = mount.clone().dyn_into::<Element>().unwrap();
    let dom = BrowserDom::new().unwrap();
    (StreamingMarkdown::new(dom, mount, RenderConfig::default()), element)
}

struct EchoRenderer;

#[async_trait::async_trait(?Send)]
impl SideEffectRenderer for EchoRenderer {
    async fn render(&self, _kind: EffectKind, source: &str) -> Result<String, EffectError> {
        Ok(format!("<svg data-source=\"{}\"></svg>", source.trim()))
    }
}

// === BrowserDom ===

#[wasm_bindgen_test]
fn markup_with_one_root_is_returned_directly() {
    let mut dom = BrowserDom::new().unwrap();
    let node = dom.create_from_markup("<p>a <em>b</em></p>").unwrap();
    let element = node.dyn_ref::<Element>().unwrap();
    assert_eq!(element.tag_name(), "P");
    assert!(node.parent_node().is_none());
}

#[wasm_bindgen_test]
fn markup_with_several_roots_is_wrapped() {
    let mut dom = BrowserDom::new().unwrap();
    let node = dom.create_from_markup("<p>a</p><p>b</p>").unwrap();
    let element = node.dyn_ref::<Element>().unwrap();
    assert_eq!(element.tag_name(), "DIV");
    assert_eq!(element.child_element_count(), 2);
}

#[wasm_bindgen_test]
fn find_by_attribute_includes_root_and_filters_values() {
    let mut dom = BrowserDom::new().unwrap();
    let node = dom
        .create_from_markup(r#"<div data-slot="outer"><span data-slot="a"></span><span data-slot="b"></span></div>"#)
        .unwrap();
    assert_eq!(dom.find_by_attribute(&node, "data-slot", None).len(), 3);
    let b = dom.find_by_attribute(&node, "data-slot", Some("b"));
    assert_eq!(b.len(), 1);
    assert_eq!(dom.attribute(&b[0], "data-slot").as_deref(), Some("b"));
}

// === StreamingMarkdown over the live DOM ===

#[wasm_bindgen_test]
fn heading_is_patched_in_place() {
    let (mut md, mount) = view();
    md.set_content("# Hello");
    let heading = mount.first_element_child().unwrap();
    md.set_content("# Hello World");
    let after = mount.first_element_child().unwrap();
    assert!(heading.is_same_node(Some(&*after)));
    assert_eq!(after.text_content().unwrap(), "Hello World");
}

#[wasm_bindgen_test]
fn streaming_keeps_earlier_blocks() {
    let (mut md, mount) = view();
    md.set_content("First.\n\n");
    let first = mount.first_element_child().unwrap();
    md.push_str("Second `code`.");
    assert_eq!(mount.child_element_count(), 2);
    assert!(first.is_same_node(mount.first_element_child().as_deref()));
    assert_eq!(
        mount.inner_html(),
        r#"<p>First.</p><p>Second <code class="inline-code">code</code>.</p>"#
    );
}

#[wasm_bindgen_test]
fn text_is_escaped() {
    let (mut md, mount) = view();
    md.set_content(r#"a \<script\> & "b""#);
    assert_eq!(mount.text_content().unwrap(), r#"a <script> & "b""#);
    assert_eq!(mount.query_selector("script").unwrap(), None);
}

#[wasm_bindgen_test]
fn copy_button_reads_raw_code() {
    let copied = Rc::new(RefCell::new(String::new()));
    let sink = copied.clone();
    let (md, mount) = view();
    let mut md = md.with_clipboard(move |text: &str| *sink.borrow_mut() = text.to_string());
    md.set_content("```rust\nlet a = \"<x>\";\n```");
    let button = mount.query_selector(".copy-code-btn").unwrap().unwrap();
    assert!(md.copy_code(&button));
    assert_eq!(*copied.borrow(), "let a = \"<x>\";\n");
}

#[wasm_bindgen_test]
async fn diagram_effect_renders_into_placeholder() {
    let (mut md, mount) = view();
    md.set_content("```mermaid\ngraph TD\n```");
    assert_eq!(md.flush_effects(&EchoRenderer).await, vec![EffectOutcome::Rendered]);
    let diagram = mount.query_selector("[data-effect]").unwrap().unwrap();
    assert_eq!(diagram.get_attribute("data-effect-state").as_deref(), Some("rendered"));
    assert!(diagram.inner_html().contains("graph TD"));
}
